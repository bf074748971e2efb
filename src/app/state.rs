use crate::engine::{FilterState, Projection, ProjectionCache, RecordStore, SortMode};
use crate::loader::{LoadError, LoadOutcome};
use crate::store::SeedRecord;

/// Lifecycle of the record load backing the view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetKind {
    Tag,
    Category,
}

#[derive(Debug, Clone)]
pub struct FacetItem {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone)]
pub struct FacetPicker {
    pub kind: FacetKind,
    pub items: Vec<FacetItem>,
    pub selected_index: usize,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    FacetPicker(FacetPicker),
}

/// Emitted when the user activates a seed. Carries the slug when the
/// record has one so navigation can prefer the pretty route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedActivated {
    pub id: String,
    pub slug: Option<String>,
}

/// Seam between the browser and whatever opens a seed.
pub trait Navigator {
    fn open_seed(&mut self, event: &SeedActivated);
}

#[derive(Debug)]
pub struct AppState {
    pub store: RecordStore,
    pub load: LoadState,
    pub filters: FilterState,
    cache: ProjectionCache,
    pub selected: usize,
    pub search_active: bool,
    pub preview_lines: usize,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
}

impl AppState {
    pub fn new(default_sort: SortMode, preview_lines: usize) -> Self {
        let mut filters = FilterState::default();
        filters.sort = default_sort;
        Self {
            store: RecordStore::default(),
            load: LoadState::Loading,
            filters,
            cache: ProjectionCache::default(),
            selected: 0,
            search_active: false,
            preview_lines,
            status_message: None,
            overlay: None,
        }
    }

    /// Current filtered view over the store, clamping the selection to
    /// the projected list. Served from the cache when neither the store
    /// nor the filters changed since the last call.
    pub fn projection(&mut self) -> &Projection {
        let len = self.cache.projection(&self.store, &self.filters).seeds.len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
        self.cache.cached()
    }

    /// Last computed projection, without refreshing the cache. Valid after
    /// a `projection` call with the same store and filters.
    pub fn cached_projection(&self) -> &Projection {
        self.cache.cached()
    }

    pub fn visible_len(&mut self) -> usize {
        self.projection().seeds.len()
    }

    pub fn selected_seed(&mut self) -> Option<&SeedRecord> {
        let selected = self.selected;
        self.projection().seeds.get(selected)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.load, LoadState::Loading)
    }

    pub fn load_error(&self) -> Option<&str> {
        match &self.load {
            LoadState::Failed { message } => Some(message),
            _ => None,
        }
    }

    pub fn apply_outcome(&mut self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::Loaded(store) => {
                self.store = store;
                self.load = LoadState::Ready;
            }
            LoadOutcome::Failed(LoadError::Seeds(message)) => {
                // The store is kept for the next retry; the view hides it
                // while the load state is Failed.
                self.load = LoadState::Failed { message };
            }
        }
    }

    pub fn begin_refresh(&mut self) {
        self.load = LoadState::Loading;
    }

    /// Message for an empty result list. Distinguishes a store with no
    /// seeds at all from filters that matched nothing. Reads the cached
    /// projection; callers recompute it first via `projection`.
    pub fn empty_message(&self) -> Option<&'static str> {
        if !self.cache.cached().seeds.is_empty() {
            return None;
        }
        if self.store.is_empty() {
            Some("No seeds yet.")
        } else {
            Some("No seeds match your filters.")
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        let len = self.visible_len();
        if len == 0 {
            self.selected = 0;
            return;
        }
        let current = self.selected as isize;
        let next = (current + delta).clamp(0, len as isize - 1);
        self.selected = next as usize;
    }

    pub fn activate_selected(&mut self) -> Option<SeedActivated> {
        self.selected_seed().map(|seed| SeedActivated {
            id: seed.id.clone(),
            slug: seed.slug.clone(),
        })
    }

    pub fn begin_search(&mut self) {
        self.search_active = true;
        self.status_message = None;
    }

    pub fn finish_search(&mut self) {
        self.search_active = false;
    }

    pub fn cancel_search(&mut self) {
        self.search_active = false;
        self.filters.query.clear();
    }

    pub fn push_search_char(&mut self, ch: char) {
        self.filters.query.push(ch);
        self.selected = 0;
    }

    pub fn pop_search_char(&mut self) {
        if self.filters.query.pop().is_some() {
            self.selected = 0;
        }
    }

    pub fn cycle_sort(&mut self) -> SortMode {
        self.filters.cycle_sort();
        self.filters.sort
    }

    pub fn clear_filters(&mut self) {
        self.filters.clear();
        self.selected = 0;
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn open_facet_picker(&mut self, kind: FacetKind) {
        let items = match kind {
            FacetKind::Tag => self
                .store
                .tags
                .iter()
                .map(|tag| FacetItem {
                    id: tag.id.clone(),
                    label: tag.name.clone(),
                    selected: self.filters.selected_tags.contains(&tag.id),
                })
                .collect::<Vec<_>>(),
            FacetKind::Category => self
                .store
                .categories
                .iter()
                .map(|category| FacetItem {
                    id: category.id.clone(),
                    label: category.path.clone(),
                    selected: self.filters.selected_categories.contains(&category.id),
                })
                .collect::<Vec<_>>(),
        };
        self.overlay = Some(OverlayState::FacetPicker(FacetPicker {
            kind,
            items,
            selected_index: 0,
        }));
    }

    pub fn facet_picker(&self) -> Option<&FacetPicker> {
        match self.overlay() {
            Some(OverlayState::FacetPicker(ref picker)) => Some(picker),
            _ => None,
        }
    }

    pub fn facet_picker_mut(&mut self) -> Option<&mut FacetPicker> {
        match self.overlay.as_mut() {
            Some(OverlayState::FacetPicker(ref mut picker)) => Some(picker),
            _ => None,
        }
    }

    pub fn facet_picker_move_selection(&mut self, delta: isize) {
        if let Some(picker) = self.facet_picker_mut() {
            if picker.items.is_empty() {
                picker.selected_index = 0;
                return;
            }
            let len = picker.items.len() as isize;
            let current = picker.selected_index as isize;
            picker.selected_index = (current + delta).clamp(0, len - 1) as usize;
        }
    }

    /// Toggles the highlighted facet. Filters take effect immediately;
    /// closing the picker is not a commit step.
    pub fn facet_picker_toggle(&mut self) {
        let Some(picker) = self.facet_picker_mut() else {
            return;
        };
        let kind = picker.kind;
        let Some(item) = picker.items.get_mut(picker.selected_index) else {
            return;
        };
        let id = item.id.clone();
        let now_selected = match kind {
            FacetKind::Tag => self.filters.toggle_tag(&id),
            FacetKind::Category => self.filters.toggle_category(&id),
        };
        if let Some(item) = self
            .facet_picker_mut()
            .and_then(|picker| picker.items.get_mut(picker.selected_index))
        {
            item.selected = now_selected;
        }
        self.selected = 0;
    }

    /// Labels for the active facet filters, shown as chips above the list.
    pub fn filter_chips(&self) -> Vec<String> {
        let mut chips = Vec::new();
        for id in &self.filters.selected_tags {
            let label = self
                .store
                .tags
                .iter()
                .find(|tag| &tag.id == id)
                .map(|tag| tag.name.clone())
                .unwrap_or_else(|| id.clone());
            chips.push(format!("tag:{label}"));
        }
        for id in &self.filters.selected_categories {
            let label = self
                .store
                .categories
                .iter()
                .find(|category| &category.id == id)
                .map(|category| category.path.clone())
                .unwrap_or_else(|| id.clone());
            chips.push(format!("category:{label}"));
        }
        chips
    }
}
