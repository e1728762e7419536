//! Append-only, time-ordered results store.
//!
//! Points live in fixed-size chunks of write-once slots. The writer fills
//! the next slot and only then publishes the new length with release
//! ordering; readers load the length with acquire ordering and never look
//! past it, so a reader can never observe a partially written point. The
//! chunk directory lock is only taken for writing when a new chunk is
//! appended.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::column::ColumnInfo;
use crate::table::ResultsTable;
use crate::{ResultsError, ResultsResult};

const CHUNK_LEN: usize = 1024;

type Chunk = Arc<[OnceLock<Arc<RecordedPoint>>]>;

fn new_chunk() -> Chunk {
    (0..CHUNK_LEN).map(|_| OnceLock::new()).collect()
}

/// One recorded time point: the simulation time and one value per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedPoint {
    pub time: f64,
    pub values: Vec<f64>,
}

pub struct ResultsStore {
    columns: Arc<[ColumnInfo]>,
    chunks: RwLock<Vec<Chunk>>,
    len: AtomicUsize,
    /// Writer lock; holds the last recorded time.
    last_time: Mutex<Option<f64>>,
    leased: AtomicBool,
}

impl ResultsStore {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns: columns.into(),
            chunks: RwLock::new(Vec::new()),
            len: AtomicUsize::new(0),
            last_time: Mutex::new(None),
            leased: AtomicBool::new(false),
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a point. Writers outside this crate go through
    /// [`StoreLease::record`].
    ///
    /// Points whose time does not strictly exceed the last recorded time, or
    /// whose value count does not match the columns, are logged and dropped.
    /// Returns whether the point was appended.
    pub(crate) fn record(&self, time: f64, values: Vec<f64>) -> bool {
        let mut last = self
            .last_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if values.len() != self.columns.len() {
            warn!(
                time,
                expected = self.columns.len(),
                actual = values.len(),
                "Point with wrong value count ignored"
            );
            return false;
        }
        if !time.is_finite() {
            warn!(time, "Non-finite time point ignored");
            return false;
        }
        if let Some(prev) = *last {
            if time <= prev {
                warn!(time, last = prev, "Out-of-order time point ignored");
                return false;
            }
        }

        let index = self.len.load(Ordering::Relaxed);
        let chunk = self.chunk_for_write(index / CHUNK_LEN);
        if chunk[index % CHUNK_LEN]
            .set(Arc::new(RecordedPoint { time, values }))
            .is_err()
        {
            warn!(index, "Results slot already written");
            return false;
        }
        self.len.store(index + 1, Ordering::Release);
        *last = Some(time);
        true
    }

    fn chunk_for_write(&self, chunk_index: usize) -> Chunk {
        {
            let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(chunk) = chunks.get(chunk_index) {
                return Arc::clone(chunk);
            }
        }
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        while chunks.len() <= chunk_index {
            chunks.push(new_chunk());
        }
        Arc::clone(&chunks[chunk_index])
    }

    /// All points recorded before the call. Later appends are not visible in
    /// the returned snapshot.
    pub fn snapshot(&self) -> Snapshot {
        let len = self.len.load(Ordering::Acquire);
        let chunks: Vec<Chunk> = self
            .chunks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut points = Vec::with_capacity(len);
        for i in 0..len {
            // Only a concurrent `clear` can leave a published slot missing.
            match chunks.get(i / CHUNK_LEN).and_then(|c| c[i % CHUNK_LEN].get()) {
                Some(p) => points.push(Arc::clone(p)),
                None => break,
            }
        }
        Snapshot {
            columns: Arc::clone(&self.columns),
            points,
        }
    }

    /// Most recently recorded point.
    pub fn latest(&self) -> Option<Arc<RecordedPoint>> {
        let len = self.len.load(Ordering::Acquire);
        let index = len.checked_sub(1)?;
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        chunks
            .get(index / CHUNK_LEN)
            .and_then(|c| c[index % CHUNK_LEN].get())
            .cloned()
    }

    /// Drop every point. Fails while a run holds the store.
    ///
    /// The store counts as leased for the duration of the clear, so no lease
    /// can be taken half way through.
    pub fn clear(&self) -> ResultsResult<()> {
        self.leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ResultsError::StoreInUse)?;
        let mut last = self
            .last_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.len.store(0, Ordering::Release);
        self.chunks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *last = None;
        self.leased.store(false, Ordering::Release);
        debug!("Results store cleared");
        Ok(())
    }

    pub fn is_in_use(&self) -> bool {
        self.leased.load(Ordering::Acquire)
    }

    /// Mark the store as held by a run until the lease is dropped.
    pub fn lease(self: &Arc<Self>) -> ResultsResult<StoreLease> {
        self.leased
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ResultsError::StoreInUse)?;
        Ok(StoreLease {
            store: Arc::clone(self),
        })
    }
}

impl std::fmt::Debug for ResultsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultsStore")
            .field("columns", &self.columns.len())
            .field("len", &self.len())
            .field("in_use", &self.is_in_use())
            .finish()
    }
}

/// Exclusive claim of a store by one run.
#[derive(Debug)]
pub struct StoreLease {
    store: Arc<ResultsStore>,
}

impl StoreLease {
    pub fn store(&self) -> &Arc<ResultsStore> {
        &self.store
    }

    /// Append a point to the held store. Duplicate, out-of-order and
    /// mis-sized points are dropped and return `false`.
    pub fn record(&self, time: f64, values: Vec<f64>) -> bool {
        self.store.record(time, values)
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        self.store.leased.store(false, Ordering::Release);
    }
}

/// Stable view of a prefix of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    columns: Arc<[ColumnInfo]>,
    points: Vec<Arc<RecordedPoint>>,
}

impl Snapshot {
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn points(&self) -> &[Arc<RecordedPoint>] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&RecordedPoint> {
        self.points.last().map(|p| p.as_ref())
    }

    pub fn times(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    /// Position of a column; exact uri first, then case-insensitive.
    pub fn column_index(&self, uri: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.uri == uri)
            .or_else(|| self.columns.iter().position(|c| c.uri.eq_ignore_ascii_case(uri)))
    }

    /// Values of one column over time.
    pub fn column(&self, uri: &str) -> Option<Vec<f64>> {
        let index = self.column_index(uri)?;
        Some(self.points.iter().map(|p| p.values[index]).collect())
    }

    /// Export as a table: a time column followed by the selected columns, or
    /// every column when `selection` is empty.
    pub fn table(&self, selection: &[&str]) -> ResultsResult<ResultsTable> {
        let indices: Vec<usize> = if selection.is_empty() {
            (0..self.columns.len()).collect()
        } else {
            selection
                .iter()
                .map(|uri| {
                    self.column_index(uri)
                        .ok_or_else(|| ResultsError::UnknownColumn {
                            uri: uri.to_string(),
                        })
                })
                .collect::<ResultsResult<_>>()?
        };

        let mut headers = Vec::with_capacity(indices.len() + 1);
        headers.push("time".to_string());
        headers.extend(indices.iter().map(|&i| self.columns[i].uri.clone()));

        let rows = self
            .points
            .iter()
            .map(|p| {
                let mut row = Vec::with_capacity(indices.len() + 1);
                row.push(p.time);
                row.extend(indices.iter().map(|&i| p.values[i]));
                row
            })
            .collect();

        Ok(ResultsTable { headers, rows })
    }
}
