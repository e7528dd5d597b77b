use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::media::StillFrame;
use crate::time::VideoOffset;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StillKey {
    path: PathBuf,
    bucket: i64,
}

#[derive(Debug)]
struct CachedStill {
    frame: StillFrame,
    last_used: u64,
}

/// Decoded stills keyed by segment file and offset bucket, evicting the
/// least recently used entry once full.
///
/// # Example
/// ```
/// use std::sync::Arc;
///
/// use playback_engine::{StillFrame, StillFrameCache};
///
/// let mut cache = StillFrameCache::new(8, 100);
/// cache.insert(
///     "chunks/a.mp4",
///     1.50,
///     StillFrame {
///         width: 2,
///         height: 2,
///         bytes: Arc::from(vec![0; 16]),
///     },
/// );
///
/// assert!(cache.get("chunks/a.mp4", 1.54).is_some());
/// ```
#[derive(Debug)]
pub struct StillFrameCache {
    capacity: usize,
    bucket_ms: i64,
    clock: u64,
    entries: HashMap<StillKey, CachedStill>,
}

impl StillFrameCache {
    /// `capacity` and `bucket_ms` must be positive; config validation
    /// guarantees both.
    pub fn new(capacity: usize, bucket_ms: i64) -> Self {
        assert!(capacity > 0, "still cache capacity must be positive");
        assert!(bucket_ms > 0, "still cache bucket size must be positive");
        Self {
            capacity,
            bucket_ms,
            clock: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: impl AsRef<Path>, offset: VideoOffset) -> bool {
        self.entries.contains_key(&self.key(path.as_ref(), offset))
    }

    /// Returns the still for the offset's bucket and marks it as used.
    pub fn get(&mut self, path: impl AsRef<Path>, offset: VideoOffset) -> Option<StillFrame> {
        let key = self.key(path.as_ref(), offset);
        let stamp = self.tick();
        let cached = self.entries.get_mut(&key)?;
        cached.last_used = stamp;
        Some(cached.frame.clone())
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, offset: VideoOffset, frame: StillFrame) {
        let key = self.key(path.as_ref(), offset);
        let last_used = self.tick();
        self.entries.insert(key, CachedStill { frame, last_used });
        while self.entries.len() > self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, cached)| cached.last_used)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Drops every still whose video file fails `keep`, e.g. after the
    /// recorder pruned old segments. Returns how many entries were removed.
    pub fn retain_paths(&mut self, mut keep: impl FnMut(&Path) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(&key.path));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "dropped stills of removed segments");
        }
        removed
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn key(&self, path: &Path, offset: VideoOffset) -> StillKey {
        let millis = if offset.is_finite() {
            (offset * 1_000.0).round() as i64
        } else {
            0
        };
        StillKey {
            path: path.to_path_buf(),
            bucket: millis.max(0).div_euclid(self.bucket_ms),
        }
    }
}
