use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::segment::Segment;
use crate::store::SegmentStore;
use crate::time::AbsoluteTime;

/// Ordered, in-memory view of the recorded segments.
///
/// The list is held behind an `Arc` and swapped wholesale on refresh, so
/// readers holding a [`SegmentIndex::snapshot`] never observe a partially
/// updated list. Cloning the index shares the same underlying list.
#[derive(Clone)]
pub struct SegmentIndex {
    store: Arc<dyn SegmentStore>,
    segments: Arc<RwLock<Arc<[Segment]>>>,
}

impl std::fmt::Debug for SegmentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentIndex")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl SegmentIndex {
    /// Creates an empty index over `store`. Call [`SegmentIndex::refresh`] to fill it.
    pub fn new(store: Arc<dyn SegmentStore>) -> Self {
        Self {
            store,
            segments: Arc::new(RwLock::new(Arc::from(Vec::new()))),
        }
    }

    /// Creates an index and loads it immediately.
    pub fn open(store: Arc<dyn SegmentStore>) -> Self {
        let index = Self::new(store);
        index.refresh();
        index
    }

    /// Queries the store and returns a sanitized, ordered list.
    ///
    /// Store failures are logged and degrade to an empty list.
    pub fn load(&self) -> Vec<Segment> {
        match self.store.segments() {
            Ok(rows) => sanitize(rows),
            Err(error) => {
                warn!(%error, "segment store unavailable, treating as empty");
                Vec::new()
            }
        }
    }

    /// Re-queries the store and atomically replaces the in-memory list.
    ///
    /// A failing store leaves the current list in place. Returns the number
    /// of indexed segments.
    pub fn refresh(&self) -> usize {
        let rows = match self.store.segments() {
            Ok(rows) => rows,
            Err(error) => {
                warn!(%error, "segment store unavailable, keeping previous index");
                return self.len();
            }
        };
        let loaded: Arc<[Segment]> = Arc::from(sanitize(rows));
        let count = loaded.len();
        let previous = std::mem::replace(&mut *self.segments.write(), loaded);
        if previous.len() != count {
            info!(previous = previous.len(), count, "segment index refreshed");
        }
        count
    }

    /// Consistent view of the list at the time of the call.
    pub fn snapshot(&self) -> Arc<[Segment]> {
        Arc::clone(&self.segments.read())
    }

    /// All segments, cloned.
    pub fn all(&self) -> Vec<Segment> {
        self.snapshot().to_vec()
    }

    pub fn first(&self) -> Option<Segment> {
        self.snapshot().first().cloned()
    }

    pub fn last(&self) -> Option<Segment> {
        self.snapshot().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.segments.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `[first.start_ts, last.end_ts]`, or `None` when empty.
    pub fn time_range(&self) -> Option<(AbsoluteTime, AbsoluteTime)> {
        let segments = self.snapshot();
        Some((segments.first()?.start_ts, segments.last()?.end_ts))
    }

    pub fn get(&self, id: &str) -> Option<Segment> {
        self.snapshot().iter().find(|segment| segment.id == id).cloned()
    }

    /// Chronologically next segment after `id`.
    pub fn next_after(&self, id: &str) -> Option<Segment> {
        let segments = self.snapshot();
        let position = segments.iter().position(|segment| segment.id == id)?;
        segments.get(position + 1).cloned()
    }

    /// Chronologically previous segment before `id`.
    pub fn previous_before(&self, id: &str) -> Option<Segment> {
        let segments = self.snapshot();
        let position = segments.iter().position(|segment| segment.id == id)?;
        position
            .checked_sub(1)
            .and_then(|previous| segments.get(previous))
            .cloned()
    }
}

/// Orders rows by start and drops rows that would break the index invariants.
fn sanitize(mut rows: Vec<Segment>) -> Vec<Segment> {
    rows.retain(|segment| {
        let valid = segment.start_ts.is_finite()
            && segment.end_ts.is_finite()
            && segment.start_ts <= segment.end_ts;
        if !valid {
            warn!(
                segment_id = %segment.id,
                start_ts = segment.start_ts,
                end_ts = segment.end_ts,
                "skipping segment with invalid bounds"
            );
        }
        valid
    });
    rows.sort_by(|left, right| left.start_ts.total_cmp(&right.start_ts));

    let mut accepted: Vec<Segment> = Vec::with_capacity(rows.len());
    for mut segment in rows {
        if segment.fps.is_some_and(|fps| !(fps > 0.0 && fps.is_finite())) {
            warn!(segment_id = %segment.id, fps = ?segment.fps, "ignoring non-positive fps");
            segment.fps = None;
        }
        if let Some(previous) = accepted.last()
            && segment.start_ts < previous.end_ts
        {
            warn!(
                segment_id = %segment.id,
                overlaps = %previous.id,
                "skipping segment overlapping its predecessor"
            );
            continue;
        }
        accepted.push(segment);
    }
    accepted
}


#[cfg(test)]
mod tests {
    use super::SegmentIndex;
    use super::fixtures::MemoryStore;
    use crate::segment::fixtures::segment;

    #[test]
    fn refresh_orders_rows_and_skips_overlaps() {
        let store = MemoryStore::with(vec![
            segment("b", 1_200.0, 1_300.0, 300),
            segment("a", 1_000.0, 1_100.0, 300),
            segment("overlap", 1_250.0, 1_350.0, 300),
            segment("backwards", 2_000.0, 1_900.0, 300),
        ]);
        let index = SegmentIndex::open(store);

        let ids: Vec<String> = index.all().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(index.time_range(), Some((1_000.0, 1_300.0)));
    }

    #[test]
    fn unreachable_store_degrades_to_empty() {
        let store = MemoryStore::with(Vec::new());
        *store.rows.lock() = None;
        let index = SegmentIndex::open(store);

        assert!(index.is_empty());
        assert!(index.first().is_none());
        assert!(index.time_range().is_none());
    }

    #[test]
    fn failed_refresh_keeps_the_previous_list() {
        let store = MemoryStore::with(vec![segment("a", 1_000.0, 1_100.0, 300)]);
        let index = SegmentIndex::open(store.clone());

        *store.rows.lock() = None;

        assert_eq!(index.refresh(), 1);
        assert_eq!(index.first().map(|s| s.id), Some("a".to_string()));
    }

    #[test]
    fn snapshot_taken_before_refresh_is_unchanged() {
        let store = MemoryStore::with(vec![segment("a", 1_000.0, 1_100.0, 300)]);
        let index = SegmentIndex::open(store.clone());
        let before = index.snapshot();

        *store.rows.lock() = Some(vec![
            segment("a", 1_000.0, 1_100.0, 300),
            segment("b", 1_200.0, 1_300.0, 300),
        ]);
        assert_eq!(index.refresh(), 2);

        assert_eq!(before.len(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn neighbors_follow_start_order() {
        let index = SegmentIndex::open(MemoryStore::with(vec![
            segment("a", 1_000.0, 1_100.0, 300),
            segment("b", 1_200.0, 1_300.0, 300),
        ]));

        assert_eq!(index.next_after("a").map(|s| s.id), Some("b".to_string()));
        assert!(index.next_after("b").is_none());
        assert_eq!(index.previous_before("b").map(|s| s.id), Some("a".to_string()));
        assert!(index.previous_before("a").is_none());
        assert!(index.get("zzz").is_none());
    }

    #[test]
    fn non_positive_fps_is_treated_as_unknown() {
        let mut broken = segment("a", 1_000.0, 1_100.0, 300);
        broken.fps = Some(0.0);
        let index = SegmentIndex::open(MemoryStore::with(vec![broken]));

        assert_eq!(index.first().and_then(|s| s.fps), None);
    }
}
