//! Result cache.
//!
//! One [`ResultEntry`] per live query, keyed by `{query_id}_{slug}`. An entry
//! owns a bounded channel of row batches fed by at most one producer and read
//! by whichever continuation request presents the current token.
//!
//! Removal is the single cleanup path: it happens exactly once per entry (the
//! map removal is atomic), closes the buffer, wakes everything waiting on the
//! entry and releases the live-query slot taken at admission.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use sluice_common::{Column, QueryType, Row};
use sluice_error::{ErrorCode, ErrorContext, Result, SluiceError};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use crate::ids::cache_key;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Every row was delivered.
    Exhausted,
    /// The producer or an execution tier failed.
    Failed,
    /// The waiting caller went away.
    Cancelled,
    /// The sweeper found the entry past its deadline.
    Expired,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemovalReason::Exhausted => "exhausted",
            RemovalReason::Failed => "failed",
            RemovalReason::Cancelled => "cancelled",
            RemovalReason::Expired => "expired",
        }
    }
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide count of admitted, not yet removed queries.
#[derive(Debug)]
struct LiveQueryCounter {
    live: Mutex<usize>,
    capacity: usize,
}

impl LiveQueryCounter {
    fn try_acquire(&self) -> std::result::Result<(), usize> {
        let mut live = self.live.lock();
        if *live >= self.capacity {
            return Err(*live);
        }
        *live += 1;
        Ok(())
    }

    fn release(&self) {
        let mut live = self.live.lock();
        *live = live.saturating_sub(1);
    }

    fn live(&self) -> usize {
        *self.live.lock()
    }
}

/// A live-query slot reserved at admission.
///
/// Handing it to [`ResultCache::register`] transfers the slot to the entry;
/// dropping it unregistered gives the slot back.
#[must_use]
#[derive(Debug)]
pub struct Admission {
    counter: Arc<LiveQueryCounter>,
    armed: bool,
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.armed {
            self.counter.release();
        }
    }
}

/// Rows handed out by one drain, and the token for the page after it.
#[derive(Debug)]
pub(crate) struct DrainedPage {
    pub rows: Vec<Row>,
    pub next_token: Option<u64>,
}

/// Rows already received from the channel but not yet handed to a client.
#[derive(Debug)]
struct BufferReader {
    rx: mpsc::Receiver<Vec<Row>>,
    leftover: VecDeque<Row>,
}

#[derive(Debug)]
pub struct ResultEntry {
    query_id: String,
    slug: String,
    query_type: QueryType,
    batch_size: usize,
    deadline: Instant,
    created_at: Instant,
    token: AtomicU64,
    columns: RwLock<Option<Vec<Column>>>,
    error: Mutex<Option<SluiceError>>,
    tier: Mutex<Option<&'static str>>,
    sender: Mutex<Option<mpsc::Sender<Vec<Row>>>>,
    reader: tokio::sync::Mutex<BufferReader>,
    /// Rows in `leftover`, in the channel, or reserved for sending.
    buffered_rows: AtomicUsize,
    /// Rows the current waiter asked for; the producer's drain threshold.
    demand: AtomicUsize,
    delivered_rows: AtomicU64,
    producing: AtomicBool,
    /// The producer is blocked on a full channel.
    parked: AtomicBool,
    producer_attached: AtomicBool,
    closed: AtomicBool,
    /// Producer appended rows, finished, failed, or the entry closed.
    data_ready: Notify,
    /// A reader took rows, or the entry closed.
    drained: Notify,
}

impl ResultEntry {
    pub fn new(
        query_id: impl Into<String>,
        slug: impl Into<String>,
        query_type: QueryType,
        batch_size: usize,
        buffer_capacity: usize,
        deadline: Instant,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(buffer_capacity.max(1));
        Arc::new(Self {
            query_id: query_id.into(),
            slug: slug.into(),
            query_type,
            batch_size: batch_size.max(1),
            deadline,
            created_at: Instant::now(),
            token: AtomicU64::new(0),
            columns: RwLock::new(None),
            error: Mutex::new(None),
            tier: Mutex::new(None),
            sender: Mutex::new(Some(tx)),
            reader: tokio::sync::Mutex::new(BufferReader {
                rx,
                leftover: VecDeque::new(),
            }),
            buffered_rows: AtomicUsize::new(0),
            demand: AtomicUsize::new(batch_size.max(1)),
            delivered_rows: AtomicU64::new(0),
            // A result is pending until the producer says otherwise.
            producing: AtomicBool::new(true),
            parked: AtomicBool::new(false),
            producer_attached: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            data_ready: Notify::new(),
            drained: Notify::new(),
        })
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn key(&self) -> String {
        cache_key(&self.query_id, &self.slug)
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    pub fn token(&self) -> u64 {
        self.token.load(Ordering::Acquire)
    }

    pub fn columns(&self) -> Option<Vec<Column>> {
        self.columns.read().clone()
    }

    pub fn error(&self) -> Option<SluiceError> {
        self.error.lock().clone()
    }

    pub fn tier(&self) -> Option<&'static str> {
        *self.tier.lock()
    }

    pub fn set_tier(&self, tier: &'static str) {
        *self.tier.lock() = Some(tier);
    }

    pub fn buffered_rows(&self) -> usize {
        self.buffered_rows.load(Ordering::Acquire)
    }

    pub fn delivered_rows(&self) -> u64 {
        self.delivered_rows.load(Ordering::Acquire)
    }

    /// True while a result handle is still pending on the producer side.
    pub fn is_producing(&self) -> bool {
        self.producing.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// True while the producer cannot append because the channel is full.
    pub fn is_parked(&self) -> bool {
        self.parked.load(Ordering::Acquire)
    }

    pub fn demand(&self) -> usize {
        self.demand.load(Ordering::Acquire)
    }

    /// Sets how many unread rows the producer fills up to before it pauses.
    /// Wakes a producer paused on a smaller demand.
    pub(crate) fn set_demand(&self, rows: usize) {
        self.demand.store(rows.max(1), Ordering::Release);
        self.drained.notify_waiters();
    }

    fn set_parked(&self, parked: bool) {
        self.parked.store(parked, Ordering::Release);
        if parked {
            self.data_ready.notify_waiters();
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Claims the single producer slot. Only the first call succeeds.
    pub fn attach_producer(self: &Arc<Self>) -> Option<ProducerHandle> {
        if self.producer_attached.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(ProducerHandle {
            entry: self.clone(),
        })
    }

    /// Records `error` unless one is already stored. The first error wins.
    pub fn fail(&self, error: SluiceError) {
        {
            let mut slot = self.error.lock();
            if slot.is_none() {
                *slot = Some(error);
            }
        }
        self.data_ready.notify_waiters();
    }

    /// A waiter may proceed: an error is stored, a page is buffered, the
    /// buffer is full, the producer finished, or the entry is gone.
    ///
    /// A full buffer can hold fewer than `batch_size` rows; the waiter then
    /// takes what is there rather than waiting on a producer that waits on it.
    pub fn is_ready(&self, batch_size: usize) -> bool {
        self.error.lock().is_some()
            || self.buffered_rows() >= batch_size
            || self.is_parked()
            || !self.is_producing()
            || self.is_closed()
    }

    /// More data may follow what has been drained so far.
    pub fn has_more(&self) -> bool {
        self.is_producing() || self.buffered_rows() > 0
    }

    /// Waits until [`is_ready`](Self::is_ready) holds.
    pub async fn wait_ready(&self, batch_size: usize) {
        wait_until(&self.data_ready, || self.is_ready(batch_size)).await
    }

    /// Takes up to `limit` rows in production order and, if more may follow,
    /// advances the token.
    ///
    /// Runs under the reader lock, so concurrent drains of the same entry are
    /// serialized: `expected_token` is re-checked under the lock and a caller
    /// that lost the race gets a token mismatch.
    pub(crate) async fn take_page(&self, expected_token: u64, limit: usize) -> Result<DrainedPage> {
        let mut reader = self.reader.lock().await;

        let current = self.token();
        if current != expected_token {
            return Err(token_mismatch(current, expected_token));
        }

        let mut rows = Vec::with_capacity(limit.min(4096));
        while rows.len() < limit {
            if let Some(row) = reader.leftover.pop_front() {
                rows.push(row);
                continue;
            }
            match reader.rx.try_recv() {
                Ok(batch) => reader.leftover.extend(batch),
                Err(mpsc::error::TryRecvError::Empty)
                    if self.buffered_rows.load(Ordering::Acquire) > rows.len() =>
                {
                    // A batch is reserved but not yet in the channel.
                    match reader.rx.recv().await {
                        Some(batch) => reader.leftover.extend(batch),
                        None => break,
                    }
                }
                Err(_) => break,
            }
        }

        if !rows.is_empty() {
            self.buffered_rows.fetch_sub(rows.len(), Ordering::AcqRel);
            self.delivered_rows
                .fetch_add(rows.len() as u64, Ordering::AcqRel);
        }
        let next_token = self
            .has_more()
            .then(|| self.token.fetch_add(1, Ordering::AcqRel) + 1);
        drop(reader);

        self.drained.notify_waiters();
        Ok(DrainedPage { rows, next_token })
    }

    fn finish_producing(&self) {
        self.producing.store(false, Ordering::Release);
        self.sender.lock().take();
        self.data_ready.notify_waiters();
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.sender.lock().take();
        self.data_ready.notify_waiters();
        self.drained.notify_waiters();
    }

    /// Resolves once the entry has been removed from the cache.
    pub(crate) async fn wait_closed(&self) {
        wait_until(&self.drained, || self.is_closed()).await
    }
}

/// Write side of an entry, held by its one producer.
///
/// Dropping the handle marks the producer finished, whatever way it stopped.
#[derive(Debug)]
pub struct ProducerHandle {
    entry: Arc<ResultEntry>,
}

impl ProducerHandle {
    pub fn entry(&self) -> &Arc<ResultEntry> {
        &self.entry
    }

    pub fn set_columns(&self, columns: Vec<Column>) {
        *self.entry.columns.write() = Some(columns);
        self.entry.data_ready.notify_waiters();
    }

    pub fn fail(&self, error: SluiceError) {
        self.entry.fail(error);
    }

    /// The entry was removed; nothing pushed from now on will be read.
    pub fn is_closed(&self) -> bool {
        self.entry.is_closed()
    }

    /// Appends a batch. Returns `false` once the entry is closed.
    pub async fn push(&self, rows: Vec<Row>) -> bool {
        if rows.is_empty() {
            return !self.is_closed();
        }
        let Some(sender) = self.entry.sender.lock().clone() else {
            return false;
        };

        let permit = match sender.try_reserve() {
            Ok(permit) => permit,
            Err(mpsc::error::TrySendError::Closed(())) => return false,
            Err(mpsc::error::TrySendError::Full(())) => {
                self.entry.set_parked(true);
                let reserved = tokio::select! {
                    permit = sender.reserve() => permit.ok(),
                    _ = self.entry.wait_closed() => None,
                };
                self.entry.set_parked(false);
                match reserved {
                    Some(permit) => permit,
                    None => return false,
                }
            }
        };

        self.entry
            .buffered_rows
            .fetch_add(rows.len(), Ordering::AcqRel);
        permit.send(rows);
        self.entry.data_ready.notify_waiters();
        true
    }

    /// Cooperative backpressure: waits while the unread rows already cover
    /// the current demand.
    pub async fn wait_for_drain(&self) {
        let entry = &self.entry;
        wait_until(&entry.drained, || {
            entry.is_closed() || entry.buffered_rows() < entry.demand()
        })
        .await
    }
}

impl Drop for ProducerHandle {
    fn drop(&mut self) {
        self.entry.finish_producing();
    }
}

/// All live entries plus the live-query counter.
#[derive(Debug)]
pub struct ResultCache {
    entries: DashMap<String, Arc<ResultEntry>>,
    counter: Arc<LiveQueryCounter>,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            counter: Arc::new(LiveQueryCounter {
                live: Mutex::new(0),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.counter.capacity
    }

    pub fn live_queries(&self) -> usize {
        self.counter.live()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reserves a live-query slot, or fails with an admission error.
    pub fn admit(&self) -> Result<Admission> {
        match self.counter.try_acquire() {
            Ok(()) => Ok(Admission {
                counter: self.counter.clone(),
                armed: true,
            }),
            Err(live) => Err(SluiceError::new(
                ErrorCode::CapacityExhausted,
                format!(
                    "Gateway is at capacity ({} of {} live queries)",
                    live, self.counter.capacity
                ),
            )
            .with_context(ErrorContext::Capacity {
                live_queries: live,
                capacity: self.counter.capacity,
            })
            .with_hint("Retry once running queries finish")),
        }
    }

    /// Inserts `entry`, transferring the admission slot to it.
    pub fn register(&self, mut admission: Admission, entry: Arc<ResultEntry>) {
        admission.armed = false;
        self.entries.insert(entry.key(), entry);
    }

    pub fn get(&self, key: &str) -> Option<Arc<ResultEntry>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    /// Removes the entry under `key`. Returns `false` if it was already gone.
    pub fn remove(&self, key: &str, reason: RemovalReason) -> bool {
        let Some((_, entry)) = self.entries.remove(key) else {
            return false;
        };
        entry.close();
        self.counter.release();

        tracing::debug!(
            query_id = %entry.query_id(),
            reason = %reason,
            rows_delivered = entry.delivered_rows(),
            age_ms = entry.age().as_millis() as u64,
            "Removed query from result cache"
        );
        true
    }

    /// Evicts every entry whose deadline is at or before `now`.
    ///
    /// Each evicted entry gets a `QueryExpired` error first, so a caller still
    /// waiting on it fails with a definite reason.
    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let expired: Vec<Arc<ResultEntry>> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now))
            .map(|e| e.value().clone())
            .collect();

        let mut evicted = 0;
        for entry in expired {
            entry.fail(
                SluiceError::new(
                    ErrorCode::QueryExpired,
                    format!("Query {} exceeded its maximum run time", entry.query_id()),
                )
                .with_trace_id(entry.query_id()),
            );
            if self.remove(&entry.key(), RemovalReason::Expired) {
                evicted += 1;
            }
        }
        evicted
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }
}

pub(crate) fn token_mismatch(expected: u64, presented: u64) -> SluiceError {
    SluiceError::new(
        ErrorCode::TokenMismatch,
        format!(
            "Continuation token {} does not match the live query (expected {})",
            presented, expected
        ),
    )
    .with_context(ErrorContext::TokenMismatch {
        expected,
        presented,
    })
    .with_hint("Follow the next_uri from the most recent response")
}

async fn wait_until(notify: &Notify, mut ready: impl FnMut() -> bool) {
    loop {
        let notified = notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if ready() {
            return;
        }
        notified.await;
    }
}
