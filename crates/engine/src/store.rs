use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::segment::Segment;
use crate::time::AbsoluteTime;

const SEGMENT_COLUMNS: &str = "id, start_ts, end_ts, frame_count, fps, video_path";

/// Read-only, time-ordered source of segment metadata.
pub trait SegmentStore: Send + Sync {
    /// Returns every segment ordered by `start_ts`.
    fn segments(&self) -> Result<Vec<Segment>>;

    /// Returns segments overlapping `[start, end]`, ordered by `start_ts`.
    fn segments_between(&self, start: AbsoluteTime, end: AbsoluteTime) -> Result<Vec<Segment>>;
}

/// Aggregate numbers over the `segments` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub segment_count: u64,
    pub earliest_ts: Option<AbsoluteTime>,
    pub latest_ts: Option<AbsoluteTime>,
    pub total_frames: u64,
    pub total_video_bytes: u64,
}

/// Segment store backed by the recorder's SQLite metadata database.
///
/// Every query opens its own read-only connection: the recorder keeps writing
/// in WAL mode while the viewer reads.
#[derive(Debug, Clone)]
pub struct SqliteSegmentStore {
    database: PathBuf,
    data_root: PathBuf,
}

impl SqliteSegmentStore {
    /// Creates a store reading `database`.
    ///
    /// Relative `video_path` values are resolved against `data_root`.
    pub fn new(database: impl Into<PathBuf>, data_root: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            data_root: data_root.into(),
        }
    }

    /// Path of the metadata database.
    pub fn database(&self) -> &Path {
        &self.database
    }

    /// Finds the segment containing `ts`.
    pub fn segment_at(&self, ts: AbsoluteTime) -> Result<Option<Segment>> {
        self.query_one(
            &format!(
                "SELECT {SEGMENT_COLUMNS} FROM segments
                 WHERE start_ts <= ?1 AND end_ts >= ?1
                 ORDER BY start_ts ASC LIMIT 1"
            ),
            ts,
        )
    }

    /// Finds the first segment starting at or after `ts`.
    pub fn nearest_forward(&self, ts: AbsoluteTime) -> Result<Option<Segment>> {
        self.query_one(
            &format!(
                "SELECT {SEGMENT_COLUMNS} FROM segments
                 WHERE start_ts >= ?1
                 ORDER BY start_ts ASC LIMIT 1"
            ),
            ts,
        )
    }

    /// Finds the last segment ending at or before `ts`.
    pub fn nearest_backward(&self, ts: AbsoluteTime) -> Result<Option<Segment>> {
        self.query_one(
            &format!(
                "SELECT {SEGMENT_COLUMNS} FROM segments
                 WHERE end_ts <= ?1
                 ORDER BY start_ts DESC LIMIT 1"
            ),
            ts,
        )
    }

    /// End of the most recent recording.
    pub fn latest_timestamp(&self) -> Result<Option<AbsoluteTime>> {
        let conn = self.connect()?;
        conn.query_row("SELECT MAX(end_ts) FROM segments", [], |row| {
            row.get::<_, Option<f64>>(0)
        })
        .map_err(|source| EngineError::store(&self.database, source))
    }

    /// Counts and totals for diagnostics.
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.connect()?;
        conn.query_row(
            "SELECT COUNT(*), MIN(start_ts), MAX(end_ts),
                    COALESCE(SUM(frame_count), 0), COALESCE(SUM(file_size_bytes), 0)
             FROM segments",
            [],
            |row| {
                Ok(StoreStats {
                    segment_count: non_negative(row.get::<_, i64>(0)?),
                    earliest_ts: row.get(1)?,
                    latest_ts: row.get(2)?,
                    total_frames: non_negative(row.get::<_, i64>(3)?),
                    total_video_bytes: non_negative(row.get::<_, i64>(4)?),
                })
            },
        )
        .map_err(|source| EngineError::store(&self.database, source))
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open_with_flags(
            &self.database,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| EngineError::store(&self.database, source))
    }

    fn query_one(&self, sql: &str, ts: AbsoluteTime) -> Result<Option<Segment>> {
        let conn = self.connect()?;
        conn.query_row(sql, params![ts], |row| self.row_to_segment(row))
            .optional()
            .map_err(|source| EngineError::store(&self.database, source))
    }

    fn query_many(
        &self,
        sql: &str,
        bounds: Option<(AbsoluteTime, AbsoluteTime)>,
    ) -> Result<Vec<Segment>> {
        let conn = self.connect()?;
        let mut statement = conn
            .prepare(sql)
            .map_err(|source| EngineError::store(&self.database, source))?;
        let rows = match bounds {
            Some((start, end)) => statement
                .query_map(params![start, end], |row| self.row_to_segment(row))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
            None => statement
                .query_map([], |row| self.row_to_segment(row))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>()),
        };
        let segments = rows.map_err(|source| EngineError::store(&self.database, source))?;
        debug!(
            database = %self.database.display(),
            count = segments.len(),
            "loaded segment rows"
        );
        Ok(segments)
    }

    fn row_to_segment(&self, row: &Row<'_>) -> rusqlite::Result<Segment> {
        let id: String = row.get("id")?;
        let frame_count: i64 = row.get("frame_count")?;
        let raw_path: String = row.get("video_path")?;

        if frame_count < 0 {
            warn!(segment_id = %id, frame_count, "negative frame count, treating as empty");
        }

        Ok(Segment {
            frame_count: non_negative(frame_count),
            start_ts: row.get("start_ts")?,
            end_ts: row.get("end_ts")?,
            fps: row.get("fps")?,
            video_path: resolve_video_path(&self.data_root, &raw_path),
            id,
        })
    }
}

impl SegmentStore for SqliteSegmentStore {
    fn segments(&self) -> Result<Vec<Segment>> {
        self.query_many(
            &format!("SELECT {SEGMENT_COLUMNS} FROM segments ORDER BY start_ts ASC"),
            None,
        )
    }

    fn segments_between(&self, start: AbsoluteTime, end: AbsoluteTime) -> Result<Vec<Segment>> {
        self.query_many(
            &format!(
                "SELECT {SEGMENT_COLUMNS} FROM segments
                 WHERE end_ts >= ?1 AND start_ts <= ?2
                 ORDER BY start_ts ASC"
            ),
            Some((start, end)),
        )
    }
}

fn resolve_video_path(data_root: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        data_root.join(path)
    }
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
