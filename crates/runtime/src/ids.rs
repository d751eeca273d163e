//! Query ids and slugs.
//!
//! A query id reads `{YYYYmmdd_HHMMSS}_{sequence:05}_{coordinator}`. Ids from one
//! generator never go backwards, even if the wall clock does. The slug is the
//! unguessable half of the cache key.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;

/// Largest sequence number that fits the five-digit field.
pub const MAX_SEQUENCE: u32 = 99_999;

const COORDINATOR_ID_LEN: usize = 5;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug)]
struct IdState {
    second: i64,
    sequence: u32,
}

#[derive(Debug)]
pub struct QueryIdGenerator {
    coordinator_id: String,
    state: Mutex<IdState>,
}

impl Default for QueryIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryIdGenerator {
    /// Generator with a random coordinator id, fixed for its lifetime.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let coordinator_id = (0..COORDINATOR_ID_LEN)
            .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
            .collect::<String>();
        Self::with_coordinator_id(coordinator_id)
    }

    pub fn with_coordinator_id(coordinator_id: impl Into<String>) -> Self {
        Self {
            coordinator_id: coordinator_id.into(),
            state: Mutex::new(IdState {
                second: i64::MIN,
                sequence: 0,
            }),
        }
    }

    pub fn coordinator_id(&self) -> &str {
        &self.coordinator_id
    }

    /// Next id. Waits for the next wall-clock second once the current second's
    /// sequence space is used up.
    pub async fn next_id(&self) -> String {
        loop {
            let now = Utc::now();
            if let Some(id) = self.next_at(now) {
                return id;
            }
            let into_second = now.timestamp_subsec_nanos() as u64;
            let wait = Duration::from_nanos(1_000_000_000u64.saturating_sub(into_second));
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Query id sequence exhausted");
            tokio::time::sleep(wait.max(Duration::from_millis(1))).await;
        }
    }

    /// Id for wall-clock time `now`, or `None` when the sequence is exhausted.
    pub(crate) fn next_at(&self, now: DateTime<Utc>) -> Option<String> {
        let mut state = self.state.lock();

        let second = now.timestamp();
        if second > state.second {
            state.second = second;
            state.sequence = 0;
        } else if state.sequence > MAX_SEQUENCE {
            return None;
        }

        let sequence = state.sequence;
        state.sequence += 1;

        let stamp = DateTime::<Utc>::from_timestamp(state.second, 0).unwrap_or(now);
        Some(format!(
            "{}_{:05}_{}",
            stamp.format("%Y%m%d_%H%M%S"),
            sequence,
            self.coordinator_id
        ))
    }
}

/// 128 random bits, hex-encoded behind a `y` marker.
pub fn new_slug() -> String {
    format!("y{:032x}", rand::random::<u128>())
}

/// Result cache key for a query.
pub fn cache_key(query_id: &str, slug: &str) -> String {
    format!("{}_{}", query_id, slug)
}
