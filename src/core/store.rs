use crate::core::models::{CycleOutcome, ProgressState, Snapshot};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

struct Publication {
    generation: u64,
    snapshot: Arc<Snapshot>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStats {
    pub cycles: u64,
    pub published: u64,
    pub failed: u64,
    pub last_outcome: Option<CycleOutcome>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_published_at: Option<DateTime<Utc>>,
}

/// Point-in-time view of the holder for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub ready: bool,
    pub generation: u64,
    pub packages: usize,
    pub built_at: Option<DateTime<Utc>>,
    pub progress: ProgressState,
    pub stats: RefreshStats,
}

struct HolderInner {
    current: ArcSwapOption<Publication>,
    progress: AtomicU64,
    stats: RwLock<RefreshStats>,
}

/// Shared handle to the published catalog and the progress of the next one.
///
/// Cloning is cheap; every clone points at the same state. The refresh
/// scheduler is the only writer. Reads never wait on a build: `current` is
/// swapped as a whole pointer and the progress pair lives in one atomic word.
#[derive(Clone)]
pub struct CacheHolder {
    inner: Arc<HolderInner>,
}

impl CacheHolder {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HolderInner {
                current: ArcSwapOption::empty(),
                progress: AtomicU64::new(0),
                stats: RwLock::new(RefreshStats::default()),
            }),
        }
    }

    pub fn get(&self) -> Option<Arc<Snapshot>> {
        self.inner
            .current
            .load_full()
            .map(|publication| Arc::clone(&publication.snapshot))
    }

    pub fn is_ready(&self) -> bool {
        self.inner.current.load().is_some()
    }

    /// Number of snapshots published so far; `0` while nothing is available.
    pub fn generation(&self) -> u64 {
        self.inner
            .current
            .load_full()
            .map_or(0, |publication| publication.generation)
    }

    /// Replaces the current snapshot in one step and returns its generation.
    ///
    /// Generations stay unique and gap-free even if several clones publish
    /// at once.
    pub fn publish(&self, snapshot: Arc<Snapshot>) -> u64 {
        let next_generation =
            |current: &Option<Arc<Publication>>| current.as_ref().map_or(0, |p| p.generation) + 1;

        let previous = self.inner.current.rcu(|current| {
            Some(Arc::new(Publication {
                generation: next_generation(current),
                snapshot: Arc::clone(&snapshot),
            }))
        });
        next_generation(&previous)
    }

    pub fn set_progress(&self, current: u32, total: u32) {
        self.inner
            .progress
            .store(ProgressState::new(current, total).pack(), Ordering::Release);
    }

    pub fn reset_progress(&self) {
        self.inner.progress.store(0, Ordering::Release);
    }

    pub fn progress(&self) -> ProgressState {
        ProgressState::unpack(self.inner.progress.load(Ordering::Acquire))
    }

    pub async fn record_outcome(&self, outcome: &CycleOutcome) {
        let now = Utc::now();
        let mut stats = self.inner.stats.write().await;
        stats.cycles += 1;
        match outcome {
            CycleOutcome::Published { .. } => {
                stats.published += 1;
                stats.last_published_at = Some(now);
            }
            CycleOutcome::Discarded | CycleOutcome::Failed(_) => stats.failed += 1,
            CycleOutcome::Abandoned => {}
        }
        stats.last_outcome = Some(outcome.clone());
        stats.last_cycle_at = Some(now);
    }

    pub async fn stats(&self) -> RefreshStats {
        self.inner.stats.read().await.clone()
    }

    pub async fn status(&self) -> CacheStatus {
        let publication = self.inner.current.load_full();
        let stats = self.stats().await;

        CacheStatus {
            ready: publication.is_some(),
            generation: publication.as_ref().map_or(0, |p| p.generation),
            packages: publication.as_ref().map_or(0, |p| p.snapshot.catalog.len()),
            built_at: publication.as_ref().map(|p| p.snapshot.built_at),
            progress: self.progress(),
            stats,
        }
    }
}

impl Default for CacheHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{Catalog, PackageEntry};
    use std::sync::atomic::AtomicBool;

    /// Every package in the catalog carries `marker` so readers can detect
    /// a mix of two snapshots.
    fn marked_snapshot(marker: u64, packages: usize) -> Snapshot {
        let mut catalog = Catalog::new();
        for i in 0..packages {
            catalog.insert(PackageEntry {
                name: format!("org.nuget.pkg{i}"),
                display_name: format!("pkg{i}"),
                source_id: marker.to_string(),
                versions: vec![],
                unity: "2019.1".to_string(),
                frameworks: vec![],
            });
        }
        Snapshot::new(catalog, false)
    }

    fn marker_of(snapshot: &Snapshot) -> u64 {
        let mut markers = snapshot
            .catalog
            .packages()
            .map(|p| p.source_id.parse::<u64>().unwrap());
        let first = markers.next().unwrap();
        assert!(markers.all(|m| m == first), "torn snapshot observed");
        first
    }

    #[test]
    fn test_starts_empty() {
        let holder = CacheHolder::new();
        assert!(holder.get().is_none());
        assert!(!holder.is_ready());
        assert_eq!(holder.generation(), 0);
        assert_eq!(holder.progress(), ProgressState::default());
    }

    #[test]
    fn test_publish_replaces_current() {
        let holder = CacheHolder::new();
        let first = Arc::new(marked_snapshot(1, 3));
        let second = Arc::new(marked_snapshot(2, 3));

        assert_eq!(holder.publish(Arc::clone(&first)), 1);
        assert!(Arc::ptr_eq(&holder.get().unwrap(), &first));

        assert_eq!(holder.publish(Arc::clone(&second)), 2);
        assert!(Arc::ptr_eq(&holder.get().unwrap(), &second));
        assert_eq!(holder.generation(), 2);
    }

    #[test]
    fn test_clones_share_state() {
        let holder = CacheHolder::new();
        let reader = holder.clone();

        holder.publish(Arc::new(marked_snapshot(7, 1)));
        holder.set_progress(3, 9);

        assert!(reader.is_ready());
        assert_eq!(reader.progress(), ProgressState::new(3, 9));
    }

    #[test]
    fn test_progress_set_and_reset() {
        let holder = CacheHolder::new();
        holder.set_progress(0, 120);
        holder.set_progress(64, 120);
        assert_eq!(holder.progress(), ProgressState::new(64, 120));

        holder.reset_progress();
        assert_eq!(holder.progress(), ProgressState::default());
    }

    #[test]
    fn test_concurrent_readers_never_see_torn_or_older_snapshots() {
        const READERS: usize = 8;
        const PUBLISHES: u64 = 500;

        let holder = CacheHolder::new();
        holder.publish(Arc::new(marked_snapshot(0, 16)));
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let holder = holder.clone();
                let done = Arc::clone(&done);
                std::thread::spawn(move || {
                    let mut last_seen = 0;
                    let mut reads = 0u64;
                    while !done.load(Ordering::Acquire) || reads == 0 {
                        let snapshot = holder.get().expect("published before readers start");
                        let marker = marker_of(&snapshot);
                        assert!(marker >= last_seen, "reader went backwards");
                        last_seen = marker;
                        reads += 1;
                    }
                    last_seen
                })
            })
            .collect();

        for marker in 1..=PUBLISHES {
            holder.publish(Arc::new(marked_snapshot(marker, 16)));
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            let last_seen = reader.join().unwrap();
            assert!(last_seen <= PUBLISHES);
        }
        assert_eq!(marker_of(&holder.get().unwrap()), PUBLISHES);
        assert_eq!(holder.generation(), PUBLISHES + 1);
    }

    #[test]
    fn test_concurrent_publishers_get_distinct_generations() {
        const WRITERS: u64 = 4;
        const PER_WRITER: u64 = 250;

        let holder = CacheHolder::new();
        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let holder = holder.clone();
                std::thread::spawn(move || {
                    (0..PER_WRITER)
                        .map(|i| holder.publish(Arc::new(marked_snapshot(w * PER_WRITER + i, 1))))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut generations: Vec<u64> = writers
            .into_iter()
            .flat_map(|writer| writer.join().unwrap())
            .collect();
        generations.sort_unstable();

        let expected: Vec<u64> = (1..=WRITERS * PER_WRITER).collect();
        assert_eq!(generations, expected);
        assert_eq!(holder.generation(), WRITERS * PER_WRITER);
    }

    #[tokio::test]
    async fn test_record_outcome_updates_stats() {
        let holder = CacheHolder::new();

        holder.record_outcome(&CycleOutcome::Failed("boom".into())).await;
        holder.record_outcome(&CycleOutcome::Discarded).await;
        let generation = holder.publish(Arc::new(marked_snapshot(1, 2)));
        holder
            .record_outcome(&CycleOutcome::Published {
                generation,
                packages: 2,
            })
            .await;

        let stats = holder.stats().await;
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.published, 1);
        assert!(stats.last_published_at.is_some());

        let status = holder.status().await;
        assert!(status.ready);
        assert_eq!(status.generation, 1);
        assert_eq!(status.packages, 2);
        assert!(matches!(
            status.stats.last_outcome,
            Some(CycleOutcome::Published { generation: 1, .. })
        ));
    }
}
