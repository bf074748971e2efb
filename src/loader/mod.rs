use std::sync::Arc;
use std::thread;

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;

use crate::engine::RecordStore;
use crate::store::{Category, SeedRecord, StoreHandle, Tag};

/// Backend the loader pulls records from. The store implements this
/// directly; tests substitute fakes.
pub trait RecordSource: Send + Sync + 'static {
    fn fetch_seeds(&self) -> Result<Vec<SeedRecord>>;
    fn fetch_tags(&self) -> Result<Vec<Tag>>;
    fn fetch_categories(&self) -> Result<Vec<Category>>;
}

impl RecordSource for StoreHandle {
    fn fetch_seeds(&self) -> Result<Vec<SeedRecord>> {
        self.fetch_all_seeds()
    }

    fn fetch_tags(&self) -> Result<Vec<Tag>> {
        self.fetch_all_tags()
    }

    fn fetch_categories(&self) -> Result<Vec<Category>> {
        self.fetch_all_categories()
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("loading seeds failed: {0}")]
    Seeds(String),
}

#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(RecordStore),
    Failed(LoadError),
}

#[derive(Debug)]
struct Envelope {
    generation: u64,
    outcome: LoadOutcome,
}

/// Cross-thread refresh trigger. Cloneable so UI code and background
/// tasks can both request a reload without holding the controller.
#[derive(Clone, Default)]
pub struct RefreshHandle {
    pending: Arc<Mutex<bool>>,
}

impl RefreshHandle {
    pub fn request(&self) {
        *self.pending.lock() = true;
    }

    fn take(&self) -> bool {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Runs record loads on background threads and hands results back on
/// `poll`. Every request gets a generation number; outcomes from
/// superseded requests are dropped so the newest request always wins.
pub struct LoadController<S> {
    source: Arc<S>,
    generation: u64,
    in_flight: bool,
    refresh: RefreshHandle,
    tx: Sender<Envelope>,
    rx: Receiver<Envelope>,
}

impl<S: RecordSource> LoadController<S> {
    pub fn new(source: S) -> Self {
        let (tx, rx) = unbounded();
        Self {
            source: Arc::new(source),
            generation: 0,
            in_flight: false,
            refresh: RefreshHandle::default(),
            tx,
            rx,
        }
    }

    pub fn refresh_handle(&self) -> RefreshHandle {
        self.refresh.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Starts a new load. Any in-flight load keeps running but its
    /// outcome will be discarded.
    pub fn request_refresh(&mut self) {
        self.generation += 1;
        self.in_flight = true;
        let generation = self.generation;
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let outcome = run_load(source.as_ref());
            // The receiver may be gone if the app already shut down.
            let _ = tx.send(Envelope {
                generation,
                outcome,
            });
        });
    }

    /// Drains completed loads, returning the outcome of the newest
    /// request if it has finished. Called once per UI tick.
    pub fn poll(&mut self) -> Option<LoadOutcome> {
        if self.refresh.take() {
            self.request_refresh();
        }
        let mut latest = None;
        while let Ok(envelope) = self.rx.try_recv() {
            if envelope.generation < self.generation {
                tracing::debug!(
                    generation = envelope.generation,
                    current = self.generation,
                    "dropping stale load outcome"
                );
                continue;
            }
            latest = Some(envelope.outcome);
        }
        if latest.is_some() {
            self.in_flight = false;
        }
        latest
    }
}

fn run_load<S: RecordSource + ?Sized>(source: &S) -> LoadOutcome {
    let seeds = match source.fetch_seeds() {
        Ok(seeds) => seeds,
        Err(err) => {
            tracing::error!(?err, "seed load failed");
            return LoadOutcome::Failed(LoadError::Seeds(err.to_string()));
        }
    };
    // Facet lookups are auxiliary; a failure degrades to an empty list
    // rather than blocking the seed list.
    let tags = match source.fetch_tags() {
        Ok(tags) => tags,
        Err(err) => {
            tracing::warn!(?err, "tag load failed, continuing without tags");
            Vec::new()
        }
    };
    let categories = match source.fetch_categories() {
        Ok(categories) => categories,
        Err(err) => {
            tracing::warn!(?err, "category load failed, continuing without categories");
            Vec::new()
        }
    };
    LoadOutcome::Loaded(RecordStore {
        seeds,
        tags,
        categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct FakeSource {
        seeds: Vec<SeedRecord>,
        tags: Vec<Tag>,
        categories: Vec<Category>,
        fail_seeds: bool,
        fail_tags: bool,
        fail_categories: bool,
    }

    impl RecordSource for FakeSource {
        fn fetch_seeds(&self) -> Result<Vec<SeedRecord>> {
            if self.fail_seeds {
                return Err(anyhow!("seed backend unavailable"));
            }
            Ok(self.seeds.clone())
        }

        fn fetch_tags(&self) -> Result<Vec<Tag>> {
            if self.fail_tags {
                return Err(anyhow!("tag backend unavailable"));
            }
            Ok(self.tags.clone())
        }

        fn fetch_categories(&self) -> Result<Vec<Category>> {
            if self.fail_categories {
                return Err(anyhow!("category backend unavailable"));
            }
            Ok(self.categories.clone())
        }
    }

    fn seed(id: &str) -> SeedRecord {
        SeedRecord {
            id: id.to_string(),
            owner_id: "owner-1".to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            fallback_body: format!("seed {id}"),
            slug: None,
            snapshot: None,
        }
    }

    fn poll_until_outcome<S: RecordSource>(controller: &mut LoadController<S>) -> LoadOutcome {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(outcome) = controller.poll() {
                return outcome;
            }
            assert!(Instant::now() < deadline, "load did not complete in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn successful_load_delivers_full_store() {
        let source = FakeSource {
            seeds: vec![seed("seed-1"), seed("seed-2")],
            tags: vec![Tag {
                id: "tag-1".to_string(),
                name: "work".to_string(),
                color: None,
            }],
            ..FakeSource::default()
        };
        let mut controller = LoadController::new(source);
        controller.request_refresh();
        assert!(controller.is_loading());

        match poll_until_outcome(&mut controller) {
            LoadOutcome::Loaded(store) => {
                assert_eq!(store.seeds.len(), 2);
                assert_eq!(store.tags.len(), 1);
                assert!(store.categories.is_empty());
            }
            other => panic!("expected loaded store, got {other:?}"),
        }
        assert!(!controller.is_loading());
    }

    #[test]
    fn seed_failure_reports_error() {
        let source = FakeSource {
            fail_seeds: true,
            ..FakeSource::default()
        };
        let mut controller = LoadController::new(source);
        controller.request_refresh();

        match poll_until_outcome(&mut controller) {
            LoadOutcome::Failed(LoadError::Seeds(message)) => {
                assert!(message.contains("seed backend unavailable"));
            }
            other => panic!("expected seed failure, got {other:?}"),
        }
    }

    #[test]
    fn facet_failures_degrade_to_empty_lists() {
        let source = FakeSource {
            seeds: vec![seed("seed-1")],
            fail_tags: true,
            fail_categories: true,
            ..FakeSource::default()
        };
        let mut controller = LoadController::new(source);
        controller.request_refresh();

        match poll_until_outcome(&mut controller) {
            LoadOutcome::Loaded(store) => {
                assert_eq!(store.seeds.len(), 1);
                assert!(store.tags.is_empty());
                assert!(store.categories.is_empty());
            }
            other => panic!("expected degraded load, got {other:?}"),
        }
    }

    #[test]
    fn stale_outcomes_are_dropped() {
        let mut controller = LoadController::new(FakeSource::default());
        controller.generation = 2;
        controller.in_flight = true;

        controller
            .tx
            .send(Envelope {
                generation: 1,
                outcome: LoadOutcome::Loaded(RecordStore {
                    seeds: vec![seed("stale")],
                    ..RecordStore::default()
                }),
            })
            .unwrap();
        assert!(controller.poll().is_none());
        assert!(controller.is_loading());

        controller
            .tx
            .send(Envelope {
                generation: 2,
                outcome: LoadOutcome::Loaded(RecordStore {
                    seeds: vec![seed("fresh")],
                    ..RecordStore::default()
                }),
            })
            .unwrap();
        match controller.poll() {
            Some(LoadOutcome::Loaded(store)) => assert_eq!(store.seeds[0].id, "fresh"),
            other => panic!("expected fresh store, got {other:?}"),
        }
        assert!(!controller.is_loading());
    }

    #[test]
    fn refresh_handle_triggers_a_load_on_poll() {
        let source = FakeSource {
            seeds: vec![seed("seed-1")],
            ..FakeSource::default()
        };
        let mut controller = LoadController::new(source);
        let handle = controller.refresh_handle();
        handle.request();

        match poll_until_outcome(&mut controller) {
            LoadOutcome::Loaded(store) => assert_eq!(store.seeds.len(), 1),
            other => panic!("expected loaded store, got {other:?}"),
        }
    }
}
