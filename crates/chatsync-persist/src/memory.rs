//! An in-process [`StateAdapter`] that counts what it is asked to do.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{PersistedState, StateAdapter};
use crate::error::PersistError;
use chatsync_storage::StorageError;

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    states: Mutex<HashMap<String, PersistedState>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    fail_saves: AtomicBool,
    fail_loads: AtomicBool,
    save_delay: Mutex<Option<Duration>>,
    load_delay: Mutex<Option<Duration>>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a stored value.
    pub fn with_state(self, name: &str, version: u32, value: Value) -> Self {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), PersistedState { version, value });
        self
    }

    pub fn stored(&self, name: &str) -> Option<PersistedState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of save calls, failed ones included.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Highest number of saves ever observed running at once.
    pub fn max_concurrent_saves(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Makes every save take `delay` before it lands.
    pub fn set_save_delay(&self, delay: Option<Duration>) {
        *self
            .save_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Makes every load take `delay` before it answers.
    pub fn set_load_delay(&self, delay: Option<Duration>) {
        *self
            .load_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = delay;
    }

    fn injected(what: &str) -> PersistError {
        PersistError::Storage(StorageError::IntegrityError {
            reason: format!("injected {} failure", what),
        })
    }
}

#[async_trait]
impl StateAdapter for MemoryAdapter {
    async fn load(&self, name: &str) -> Result<Option<PersistedState>, PersistError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = *self
            .load_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(Self::injected("load"));
        }
        Ok(self.stored(name))
    }

    async fn save(&self, name: &str, state: &PersistedState) -> Result<(), PersistError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self
            .save_delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = if self.fail_saves.load(Ordering::SeqCst) {
            Err(Self::injected("save"))
        } else {
            self.states
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(name.to_string(), state.clone());
            Ok(())
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn clear(&self, name: &str) -> Result<(), PersistError> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        Ok(())
    }
}
