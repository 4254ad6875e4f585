//! In-process counter store.
//!
//! Runs the same algorithms as the Redis scripts while holding a single lock
//! over the whole keyspace, so evaluations are serialised exactly as Redis
//! serialises script execution. Only suitable for a single instance.

use super::{parse_args, CounterScript, CounterStore};
use crate::algorithms::{sliding_window, token_bucket};
use crate::error::{GatekeeperError, Result};
use crate::key_generator::CounterKey;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// Source of the current instant in milliseconds since the epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Stored token-bucket record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketState {
    pub last_refill_ms: u64,
    pub tokens: f64,
}

#[derive(Debug)]
enum Slot {
    /// Marker scores in milliseconds.
    Window(VecDeque<u64>),
    Bucket(BucketState),
}

#[derive(Debug)]
struct Entry {
    slot: Slot,
    expires_at: Option<u64>,
}

/// Keyspace as seen by one evaluation. Expired keys are invisible.
#[derive(Debug, Default)]
pub struct Keyspace {
    now: u64,
    entries: HashMap<String, Entry>,
    /// `(expires_at, key)` ordered by deadline. May hold stale pairs for keys
    /// deleted or re-expired since; those are skipped when reaped.
    expiries: BTreeSet<(u64, String)>,
}

impl Keyspace {
    fn at(&mut self, now: u64) -> &mut Self {
        self.now = now;
        self.reap();
        self
    }

    /// Delete every key whose deadline has passed.
    fn reap(&mut self) {
        while self.expiries.first().is_some_and(|(at, _)| *at <= self.now) {
            let Some((at, key)) = self.expiries.pop_first() else {
                break;
            };
            if self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.expires_at == Some(at))
            {
                self.entries.remove(&key);
            }
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = self.now;
        if self
            .entries
            .get(key)
            .and_then(|entry| entry.expires_at)
            .is_some_and(|at| at <= now)
        {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    /// Drop markers scored at or below `trim` and return how many remain.
    pub(crate) fn prune_window(&mut self, key: &str, trim: u64) -> Result<u64> {
        let remaining = match self.live(key) {
            None => return Ok(0),
            Some(Entry {
                slot: Slot::Window(markers),
                ..
            }) => {
                markers.retain(|score| *score > trim);
                markers.len() as u64
            }
            Some(_) => return Err(GatekeeperError::Store(WRONGTYPE.to_string())),
        };
        // Redis deletes a sorted set once its last member is removed.
        if remaining == 0 {
            self.entries.remove(key);
        }
        Ok(remaining)
    }

    pub(crate) fn add_marker(&mut self, key: &str, score: u64) -> Result<()> {
        if self.live(key).is_none() {
            self.entries.insert(
                key.to_string(),
                Entry {
                    slot: Slot::Window(VecDeque::new()),
                    expires_at: None,
                },
            );
        }
        match self.entries.get_mut(key).map(|entry| &mut entry.slot) {
            Some(Slot::Window(markers)) => {
                markers.push_back(score);
                Ok(())
            }
            _ => Err(GatekeeperError::Store(WRONGTYPE.to_string())),
        }
    }

    pub(crate) fn bucket(&mut self, key: &str) -> Result<Option<BucketState>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Bucket(state),
                ..
            }) => Ok(Some(*state)),
            Some(_) => Err(GatekeeperError::Store(WRONGTYPE.to_string())),
        }
    }

    /// Write a bucket record, keeping any expiration already set.
    pub(crate) fn set_bucket(&mut self, key: &str, state: BucketState) -> Result<()> {
        match self.live(key) {
            None => {
                self.entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Bucket(state),
                        expires_at: None,
                    },
                );
                Ok(())
            }
            Some(Entry {
                slot: Slot::Bucket(current),
                ..
            }) => {
                *current = state;
                Ok(())
            }
            Some(_) => Err(GatekeeperError::Store(WRONGTYPE.to_string())),
        }
    }

    pub(crate) fn expire(&mut self, key: &str, seconds: u64) {
        let at = self.now.saturating_add(seconds.saturating_mul(1000));
        let Some(entry) = self.live(key) else {
            return;
        };
        if let Some(previous) = entry.expires_at.replace(at) {
            self.expiries.remove(&(previous, key.to_string()));
        }
        self.expiries.insert((at, key.to_string()));
    }
}

/// Counter store held in process memory.
pub struct MemoryCounterStore {
    keyspace: Mutex<Keyspace>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            keyspace: Mutex::new(Keyspace::default()),
            clock,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Keyspace>> {
        self.keyspace
            .lock()
            .map_err(|_| GatekeeperError::Internal("Failed to acquire keyspace lock".to_string()))
    }

    /// Live markers for a sliding-window key, without pruning.
    pub fn window_len(&self, key: &str) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut keyspace = self.lock()?;
        match keyspace.at(now).live(key) {
            None => Ok(0),
            Some(Entry {
                slot: Slot::Window(markers),
                ..
            }) => Ok(markers.len()),
            Some(_) => Err(GatekeeperError::Store(WRONGTYPE.to_string())),
        }
    }

    pub fn bucket_state(&self, key: &str) -> Result<Option<BucketState>> {
        let now = self.clock.now_millis();
        let mut keyspace = self.lock()?;
        keyspace.at(now).bucket(key)
    }

    /// Remaining time to live of a key, if it has one.
    pub fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = self.clock.now_millis();
        let mut keyspace = self.lock()?;
        Ok(keyspace
            .at(now)
            .live(key)
            .and_then(|entry| entry.expires_at)
            .map(|at| Duration::from_millis(at.saturating_sub(now))))
    }

    /// Keys currently held, including expired ones not yet reaped.
    pub fn key_count(&self) -> Result<usize> {
        Ok(self.lock()?.entries.len())
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn evaluate(
        &self,
        keys: &[CounterKey],
        args: &[u64],
        script: CounterScript,
    ) -> Result<i64> {
        let rules = parse_args(keys, args)?;
        let now = self.clock.now_millis();
        let mut keyspace = self.lock()?;
        let keyspace = keyspace.at(now);

        match script {
            CounterScript::SlidingWindow => sliding_window::run(keyspace, now, keys, &rules),
            CounterScript::TokenBucket => token_bucket::run(keyspace, now, keys, &rules),
        }
    }

    async fn ping(&self) -> Result<()> {
        self.lock().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
