use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::store::SeedRecord;

/// Raw arrays backing one projection pass. Replaced wholesale by the
/// loader; never mutated while a projection is being derived.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    pub seeds: Vec<SeedRecord>,
    pub tags: Vec<crate::store::Tag>,
    pub categories: Vec<crate::store::Category>,
}

impl RecordStore {
    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "lowercase")]
pub enum SortMode {
    Newest,
    Oldest,
    Alphabetical,
}

impl Default for SortMode {
    fn default() -> Self {
        SortMode::Newest
    }
}

impl SortMode {
    /// Fixed cycle used by the sort toggle: newest → oldest → alphabetical.
    pub fn cycled(self) -> Self {
        match self {
            SortMode::Newest => SortMode::Oldest,
            SortMode::Oldest => SortMode::Alphabetical,
            SortMode::Alphabetical => SortMode::Newest,
        }
    }
}

/// User-controlled filter parameters. Ephemeral, owned by the view, reset
/// on an explicit clear.
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    pub query: String,
    pub selected_tags: IndexSet<String>,
    pub selected_categories: IndexSet<String>,
    pub sort: SortMode,
}

impl FilterState {
    pub fn trimmed_query(&self) -> &str {
        self.query.trim()
    }

    pub fn has_active_filters(&self) -> bool {
        !self.trimmed_query().is_empty()
            || !self.selected_tags.is_empty()
            || !self.selected_categories.is_empty()
    }

    /// Returns true when the tag is selected after the toggle.
    pub fn toggle_tag(&mut self, tag_id: &str) -> bool {
        if self.selected_tags.shift_remove(tag_id) {
            false
        } else {
            self.selected_tags.insert(tag_id.to_string());
            true
        }
    }

    pub fn toggle_category(&mut self, category_id: &str) -> bool {
        if self.selected_categories.shift_remove(category_id) {
            false
        } else {
            self.selected_categories.insert(category_id.to_string());
            true
        }
    }

    pub fn cycle_sort(&mut self) -> SortMode {
        self.sort = self.sort.cycled();
        self.sort
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.selected_tags.clear();
        self.selected_categories.clear();
    }
}

/// Derived, ordered subset of the store plus the pre-filter total. Always a
/// fresh sequence; recomputed, never patched.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    pub seeds: Vec<SeedRecord>,
    pub total: usize,
    pub filtered: bool,
}

impl Projection {
    pub fn matched(&self) -> usize {
        self.seeds.len()
    }

    /// "N of M seeds" while any predicate is active, "M seeds" otherwise.
    pub fn count_label(&self) -> String {
        let noun = if self.total == 1 { "seed" } else { "seeds" };
        if self.filtered {
            format!("{} of {} {}", self.seeds.len(), self.total, noun)
        } else {
            format!("{} {}", self.total, noun)
        }
    }
}

/// Runs the full pipeline: three AND-combined predicates, then the active
/// comparator. Inactive predicates are skipped entirely.
pub fn project(store: &RecordStore, filters: &FilterState) -> Projection {
    let total = store.seeds.len();
    let filtered = filters.has_active_filters();

    let query = filters.trimmed_query().to_lowercase();
    let mut seeds: Vec<SeedRecord> = store
        .seeds
        .iter()
        .filter(|seed| {
            if !query.is_empty() && !matches_query(seed, &query) {
                return false;
            }
            if !filters.selected_tags.is_empty()
                && !seed
                    .tag_refs()
                    .iter()
                    .any(|tag| filters.selected_tags.contains(&tag.id))
            {
                return false;
            }
            if !filters.selected_categories.is_empty()
                && !seed
                    .category_refs()
                    .iter()
                    .any(|cat| filters.selected_categories.contains(&cat.id))
            {
                return false;
            }
            true
        })
        .cloned()
        .collect();

    sort_seeds(&mut seeds, filters.sort);

    Projection {
        seeds,
        total,
        filtered,
    }
}

fn matches_query(seed: &SeedRecord, lowered_query: &str) -> bool {
    if seed.display_body().to_lowercase().contains(lowered_query) {
        return true;
    }
    let tag_names = seed
        .tag_refs()
        .iter()
        .map(|tag| tag.name.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    if tag_names.to_lowercase().contains(lowered_query) {
        return true;
    }
    let category_names = seed
        .category_refs()
        .iter()
        .map(|cat| cat.name.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    category_names.to_lowercase().contains(lowered_query)
}

fn sort_seeds(seeds: &mut [SeedRecord], mode: SortMode) {
    match mode {
        // sort_by is stable, so equal keys keep their relative order
        // within one computation.
        SortMode::Newest => seeds.sort_by(|a, b| {
            compare_created(parse_created(b), parse_created(a))
        }),
        SortMode::Oldest => seeds.sort_by(|a, b| {
            compare_created(parse_created(a), parse_created(b))
        }),
        SortMode::Alphabetical => seeds.sort_by(|a, b| {
            a.display_body()
                .to_lowercase()
                .cmp(&b.display_body().to_lowercase())
        }),
    }
}

/// Unparseable creation timestamps sort after every valid one, under both
/// time-based modes.
fn compare_created(a: Option<OffsetDateTime>, b: Option<OffsetDateTime>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn parse_created(seed: &SeedRecord) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(&seed.created_at, &Rfc3339).ok()
}

/// Value-keyed memoization over the projection pipeline. The fingerprint
/// covers every input the pipeline reads; any change recomputes
/// filter-then-sort from scratch.
#[derive(Debug, Default)]
pub struct ProjectionCache {
    fingerprint: Option<u64>,
    projection: Projection,
}

impl ProjectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection(&mut self, store: &RecordStore, filters: &FilterState) -> &Projection {
        let fingerprint = input_fingerprint(store, filters);
        if self.fingerprint != Some(fingerprint) {
            self.projection = project(store, filters);
            self.fingerprint = Some(fingerprint);
        }
        &self.projection
    }

    pub fn cached(&self) -> &Projection {
        &self.projection
    }
}

fn input_fingerprint(store: &RecordStore, filters: &FilterState) -> u64 {
    let mut hasher = DefaultHasher::new();
    for seed in &store.seeds {
        seed.id.hash(&mut hasher);
        seed.created_at.hash(&mut hasher);
        seed.display_body().hash(&mut hasher);
        for tag in seed.tag_refs() {
            tag.id.hash(&mut hasher);
            tag.name.hash(&mut hasher);
        }
        for cat in seed.category_refs() {
            cat.id.hash(&mut hasher);
            cat.name.hash(&mut hasher);
        }
    }
    filters.trimmed_query().to_lowercase().hash(&mut hasher);
    for tag_id in &filters.selected_tags {
        tag_id.hash(&mut hasher);
    }
    0u8.hash(&mut hasher);
    for category_id in &filters.selected_categories {
        category_id.hash(&mut hasher);
    }
    filters.sort.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CategoryRef, SeedRecord, SeedSnapshot, TagRef};

    fn seed(
        id: &str,
        created_at: &str,
        body: &str,
        tags: &[(&str, &str)],
        categories: &[(&str, &str, &str)],
    ) -> SeedRecord {
        SeedRecord {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            created_at: created_at.to_string(),
            fallback_body: String::new(),
            slug: None,
            snapshot: Some(SeedSnapshot {
                body: body.to_string(),
                captured_at: Some(created_at.to_string()),
                tags: tags
                    .iter()
                    .map(|(id, name)| TagRef {
                        id: id.to_string(),
                        name: name.to_string(),
                    })
                    .collect(),
                categories: categories
                    .iter()
                    .map(|(id, name, path)| CategoryRef {
                        id: id.to_string(),
                        name: name.to_string(),
                        path: path.to_string(),
                    })
                    .collect(),
                metadata: serde_json::Value::Null,
            }),
        }
    }

    fn scenario_store() -> RecordStore {
        RecordStore {
            seeds: vec![
                seed(
                    "seed-1",
                    "2024-01-01T00:00:00Z",
                    "First seed content",
                    &[("tag-work", "work")],
                    &[("cat-work", "work", "/work")],
                ),
                seed(
                    "seed-2",
                    "2024-01-02T00:00:00Z",
                    "Second seed content",
                    &[("tag-personal", "personal")],
                    &[],
                ),
                seed(
                    "seed-3",
                    "2024-01-03T00:00:00Z",
                    "Third seed with work tag",
                    &[("tag-work", "work"), ("tag-important", "important")],
                    &[("cat-work", "work", "/work")],
                ),
            ],
            tags: Vec::new(),
            categories: Vec::new(),
        }
    }

    fn ids(projection: &Projection) -> Vec<&str> {
        projection.seeds.iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn unfiltered_newest_orders_by_created_descending() {
        let store = scenario_store();
        let projection = project(&store, &FilterState::default());
        assert_eq!(ids(&projection), vec!["seed-3", "seed-2", "seed-1"]);
        assert_eq!(projection.matched(), 3);
        assert_eq!(projection.total, 3);
        assert_eq!(projection.count_label(), "3 seeds");
    }

    #[test]
    fn text_predicate_matches_body_tags_and_categories() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.query = "work".to_string();
        let projection = project(&store, &filters);
        assert_eq!(ids(&projection), vec!["seed-3", "seed-1"]);
        assert_eq!(projection.count_label(), "2 of 3 seeds");

        filters.query = "First".to_string();
        let projection = project(&store, &filters);
        assert_eq!(ids(&projection), vec!["seed-1"]);
        assert_eq!(projection.count_label(), "1 of 3 seeds");
    }

    #[test]
    fn query_is_trimmed_and_case_insensitive() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.query = "  WORK  ".to_string();
        let projection = project(&store, &filters);
        assert_eq!(projection.matched(), 2);

        filters.query = "   ".to_string();
        let projection = project(&store, &filters);
        assert_eq!(projection.matched(), 3);
        assert!(!projection.filtered);
    }

    #[test]
    fn tag_toggle_narrows_then_restores() {
        let store = scenario_store();
        let mut filters = FilterState::default();

        assert!(filters.toggle_tag("tag-work"));
        let narrowed = project(&store, &filters);
        assert_eq!(ids(&narrowed), vec!["seed-3", "seed-1"]);

        assert!(!filters.toggle_tag("tag-work"));
        let restored = project(&store, &filters);
        assert_eq!(restored.matched(), 3);
        assert!(!restored.filtered);
    }

    #[test]
    fn category_predicate_uses_any_of_semantics() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.toggle_category("cat-work");
        let projection = project(&store, &filters);
        assert_eq!(ids(&projection), vec!["seed-3", "seed-1"]);
    }

    #[test]
    fn seed_without_facets_never_matches_active_facet_filter() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.toggle_category("cat-work");
        let projection = project(&store, &filters);
        assert!(!projection.seeds.iter().any(|s| s.id == "seed-2"));
    }

    #[test]
    fn predicates_combine_conjunctively() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.query = "work".to_string();
        filters.toggle_tag("tag-important");
        filters.toggle_category("cat-work");
        let projection = project(&store, &filters);
        // Only seed-3 satisfies all three predicates independently.
        assert_eq!(ids(&projection), vec!["seed-3"]);
    }

    #[test]
    fn each_additional_predicate_is_monotone() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        let unfiltered = project(&store, &filters).matched();

        filters.query = "seed".to_string();
        let with_text = project(&store, &filters).matched();
        assert!(with_text <= unfiltered);

        filters.toggle_tag("tag-work");
        let with_tag = project(&store, &filters).matched();
        assert!(with_tag <= with_text);

        filters.toggle_category("cat-work");
        let with_category = project(&store, &filters).matched();
        assert!(with_category <= with_tag);
    }

    #[test]
    fn filtered_count_never_exceeds_total() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.query = "nothing matches this".to_string();
        let projection = project(&store, &filters);
        assert_eq!(projection.matched(), 0);
        assert_eq!(projection.total, 3);
        assert_eq!(projection.count_label(), "0 of 3 seeds");
    }

    #[test]
    fn sort_cycle_reaches_alphabetical_after_two_toggles() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.cycle_sort();
        filters.cycle_sort();
        assert_eq!(filters.sort, SortMode::Alphabetical);
        let projection = project(&store, &filters);
        assert_eq!(ids(&projection), vec!["seed-1", "seed-2", "seed-3"]);
    }

    #[test]
    fn oldest_sorts_ascending_by_created() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.sort = SortMode::Oldest;
        let projection = project(&store, &filters);
        assert_eq!(ids(&projection), vec!["seed-1", "seed-2", "seed-3"]);
    }

    #[test]
    fn malformed_created_sorts_last_in_both_time_modes() {
        let mut store = scenario_store();
        store.seeds.push(seed(
            "seed-bad",
            "not-a-timestamp",
            "Broken clock",
            &[],
            &[],
        ));

        let mut filters = FilterState::default();
        filters.sort = SortMode::Newest;
        let projection = project(&store, &filters);
        assert_eq!(projection.seeds.last().map(|s| s.id.as_str()), Some("seed-bad"));

        filters.sort = SortMode::Oldest;
        let projection = project(&store, &filters);
        assert_eq!(projection.seeds.last().map(|s| s.id.as_str()), Some("seed-bad"));
    }

    #[test]
    fn alphabetical_falls_back_to_fallback_body() {
        let mut without_snapshot = seed("seed-x", "2024-02-01T00:00:00Z", "", &[], &[]);
        without_snapshot.snapshot = None;
        without_snapshot.fallback_body = "zzz trailing entry".to_string();
        let mut store = scenario_store();
        store.seeds.push(without_snapshot);

        let mut filters = FilterState::default();
        filters.sort = SortMode::Alphabetical;
        let projection = project(&store, &filters);
        assert_eq!(projection.seeds.last().map(|s| s.id.as_str()), Some("seed-x"));
    }

    #[test]
    fn projection_is_idempotent_for_unchanged_inputs() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        filters.query = "seed".to_string();
        let first = project(&store, &filters);
        let second = project(&store, &filters);
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.total, second.total);
    }

    #[test]
    fn cache_reuses_output_until_any_input_changes() {
        let store = scenario_store();
        let mut filters = FilterState::default();
        let mut cache = ProjectionCache::new();

        let first = cache.projection(&store, &filters).seeds.len();
        assert_eq!(first, 3);
        // Unchanged inputs hit the cached fingerprint.
        assert_eq!(cache.projection(&store, &filters).seeds.len(), 3);

        filters.query = "First".to_string();
        assert_eq!(cache.projection(&store, &filters).seeds.len(), 1);

        filters.clear();
        assert_eq!(cache.projection(&store, &filters).seeds.len(), 3);
    }

    #[test]
    fn cache_keys_on_record_values_not_identity() {
        let store = scenario_store();
        let filters = FilterState::default();
        let mut cache = ProjectionCache::new();
        cache.projection(&store, &filters);

        // A value-identical clone of the store must not invalidate.
        let clone = store.clone();
        let fingerprint_a = input_fingerprint(&store, &filters);
        let fingerprint_b = input_fingerprint(&clone, &filters);
        assert_eq!(fingerprint_a, fingerprint_b);

        let mut edited = store.clone();
        if let Some(snapshot) = edited.seeds[0].snapshot.as_mut() {
            snapshot.body.push_str(" amended");
        }
        assert_ne!(fingerprint_a, input_fingerprint(&edited, &filters));
    }

    #[test]
    fn clear_resets_every_predicate_but_keeps_sort() {
        let mut filters = FilterState::default();
        filters.query = "work".to_string();
        filters.toggle_tag("tag-work");
        filters.toggle_category("cat-work");
        filters.sort = SortMode::Alphabetical;

        filters.clear();
        assert!(!filters.has_active_filters());
        assert_eq!(filters.sort, SortMode::Alphabetical);
    }

    #[test]
    fn singular_wording_for_single_seed() {
        let store = RecordStore {
            seeds: vec![seed(
                "only",
                "2024-01-01T00:00:00Z",
                "Lone seed",
                &[],
                &[],
            )],
            tags: Vec::new(),
            categories: Vec::new(),
        };
        let projection = project(&store, &FilterState::default());
        assert_eq!(projection.count_label(), "1 seed");

        let mut filters = FilterState::default();
        filters.query = "lone".to_string();
        let projection = project(&store, &filters);
        assert_eq!(projection.count_label(), "1 of 1 seed");
    }
}
