//! [`PersistedStore`]: an in-memory store kept in sync with a [`StateAdapter`].
//!
//! Lifecycle: `Uninitialized → Hydrating → Hydrated`. Construction enters
//! `Hydrating` and spawns the hydration task. While hydrating, mutations
//! apply in memory but schedule nothing. Once hydrated, every mutation hands
//! a snapshot to the [`FlushScheduler`], which debounces and serializes the
//! writes. Background failures are logged and never reach the mutator.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;

use crate::adapter::{PersistedState, StateAdapter};
use crate::error::PersistError;
use crate::migrate::MigrationChain;
use crate::scheduler::{FlushScheduler, FlushSink, DEFAULT_FLUSH_DELAY};

/// Hydration phase of a [`PersistedStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationPhase {
    Uninitialized,
    Hydrating,
    Hydrated,
}

/// Naming, versioning and timing of one persisted store.
#[derive(Debug, Clone)]
pub struct PersistOptions {
    /// Storage key.
    pub name: String,
    /// Current shape version of the in-memory state.
    pub version: u32,
    /// Steps from older stored versions up to `version`.
    pub migrations: MigrationChain,
    /// Quiet period before a flush.
    pub debounce: Duration,
}

impl PersistOptions {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        PersistOptions {
            name: name.into(),
            version,
            migrations: MigrationChain::new(),
            debounce: DEFAULT_FLUSH_DELAY,
        }
    }

    pub fn with_migrations(mut self, migrations: MigrationChain) -> Self {
        self.migrations = migrations;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// Called with the freshly hydrated state.
pub type RehydrateCallback<S> = Arc<dyn Fn(&S) + Send + Sync>;

/// How a hydration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationOutcome {
    /// Nothing was stored; in-memory state kept.
    Empty,
    /// Stored state loaded as-is.
    Loaded,
    /// Stored state migrated from an older version.
    Migrated { from: u32 },
    /// Loading, migrating or decoding failed; state reset to the default.
    Failed,
}

struct StoreSink {
    adapter: Arc<dyn StateAdapter>,
    options: Arc<RwLock<PersistOptions>>,
}

#[async_trait]
impl<S: Serialize + Send + 'static> FlushSink<S> for StoreSink {
    async fn flush(&self, state: S) -> Result<(), PersistError> {
        let (name, version) = {
            let options = self.options.read().unwrap_or_else(PoisonError::into_inner);
            (options.name.clone(), options.version)
        };
        let value = serde_json::to_value(&state)?;
        self.adapter
            .save(&name, &PersistedState { version, value })
            .await
    }
}

struct Inner<S> {
    state: RwLock<S>,
    default: S,
    options: Arc<RwLock<PersistOptions>>,
    adapter: Arc<dyn StateAdapter>,
    phase: watch::Sender<HydrationPhase>,
    on_rehydrate: RwLock<Option<RehydrateCallback<S>>>,
    hydration: tokio::sync::Mutex<()>,
    scheduler: FlushScheduler<S>,
}

/// A shared in-memory store with debounced persistence.
pub struct PersistedStore<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for PersistedStore<S> {
    fn clone(&self) -> Self {
        PersistedStore {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> PersistedStore<S>
where
    S: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Creates the store and starts hydrating it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(initial: S, adapter: Arc<dyn StateAdapter>, options: PersistOptions) -> Self {
        let store = Self::detached(initial, adapter, options);
        store.start_hydration();
        store
    }

    /// Creates the store without hydrating it. The store stays
    /// `Uninitialized` and never flushes until [`PersistedStore::rehydrate`].
    pub fn detached(initial: S, adapter: Arc<dyn StateAdapter>, options: PersistOptions) -> Self {
        let debounce = options.debounce;
        let options = Arc::new(RwLock::new(options));
        let sink: Arc<dyn FlushSink<S>> = Arc::new(StoreSink {
            adapter: Arc::clone(&adapter),
            options: Arc::clone(&options),
        });
        let (phase, _) = watch::channel(HydrationPhase::Uninitialized);
        PersistedStore {
            inner: Arc::new(Inner {
                state: RwLock::new(initial.clone()),
                default: initial,
                options,
                adapter,
                phase,
                on_rehydrate: RwLock::new(None),
                hydration: tokio::sync::Mutex::new(()),
                scheduler: FlushScheduler::new(sink, debounce),
            }),
        }
    }

    /// Registers a callback run after every hydration.
    pub fn on_rehydrate(&self, callback: impl Fn(&S) + Send + Sync + 'static) {
        *self
            .inner
            .on_rehydrate
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(callback));
    }

    fn start_hydration(&self) {
        self.inner.phase.send_replace(HydrationPhase::Hydrating);
        let store = self.clone();
        tokio::spawn(async move {
            store.rehydrate().await;
        });
    }

    pub fn phase(&self) -> HydrationPhase {
        *self.inner.phase.borrow()
    }

    pub fn has_hydrated(&self) -> bool {
        self.phase() == HydrationPhase::Hydrated
    }

    /// Resolves once the store has finished hydrating.
    pub async fn wait_hydrated(&self) {
        let mut rx = self.inner.phase.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|phase| *phase == HydrationPhase::Hydrated).await;
    }

    /// A snapshot of the current state.
    pub fn get(&self) -> S {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reads the state without cloning it.
    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Mutates the state in place. Once hydrated, schedules a flush.
    pub fn update<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let (result, snapshot) = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let result = f(&mut state);
            (result, state.clone())
        };
        if self.has_hydrated() {
            self.inner.scheduler.schedule(snapshot);
        }
        result
    }

    /// Replaces the whole state. Once hydrated, schedules a flush.
    pub fn set(&self, state: S) {
        self.update(|current| *current = state);
    }

    /// Loads, migrates and installs the stored state, then marks the store
    /// hydrated. Never fails: errors reset the state to its default.
    pub async fn rehydrate(&self) -> HydrationOutcome {
        let _guard = self.inner.hydration.lock().await;
        self.inner.phase.send_replace(HydrationPhase::Hydrating);
        self.inner.scheduler.cancel();

        let options = self
            .inner
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let outcome = match self.load_stored(&options).await {
            Ok(None) => HydrationOutcome::Empty,
            Ok(Some((state, from))) => {
                self.replace_silently(state);
                if from < options.version {
                    HydrationOutcome::Migrated { from }
                } else {
                    HydrationOutcome::Loaded
                }
            }
            Err(err) => {
                tracing::warn!(
                    store = %options.name,
                    error = %err,
                    "hydration failed; using default state"
                );
                self.replace_silently(self.inner.default.clone());
                HydrationOutcome::Failed
            }
        };

        let callback = self
            .inner
            .on_rehydrate
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            self.read(|state| callback(state));
        }

        self.inner.phase.send_replace(HydrationPhase::Hydrated);

        // Write the migrated shape back so storage catches up once.
        if let HydrationOutcome::Migrated { .. } = outcome {
            self.inner.scheduler.schedule(self.get());
        }

        tracing::debug!(store = %options.name, ?outcome, "hydrated");
        outcome
    }

    async fn load_stored(&self, options: &PersistOptions) -> Result<Option<(S, u32)>, PersistError> {
        let Some(stored) = self.inner.adapter.load(&options.name).await? else {
            return Ok(None);
        };
        let value = if stored.version < options.version {
            options
                .migrations
                .migrate(stored.value, stored.version, options.version)?
        } else {
            if stored.version > options.version {
                tracing::warn!(
                    store = %options.name,
                    stored = stored.version,
                    current = options.version,
                    "stored state is newer than this build; loading as-is"
                );
            }
            stored.value
        };
        let state: S = serde_json::from_value(value)?;
        Ok(Some((state, stored.version)))
    }

    fn replace_silently(&self, state: S) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Removes the stored value. In-memory state is untouched.
    pub async fn clear_storage(&self) -> Result<(), PersistError> {
        self.inner.scheduler.cancel();
        let name = self.name();
        self.inner.adapter.clear(&name).await
    }

    /// Adjusts the options; a changed debounce applies to later mutations.
    pub fn set_options(&self, f: impl FnOnce(&mut PersistOptions)) {
        let debounce = {
            let mut options = self
                .inner
                .options
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            f(&mut options);
            options.debounce
        };
        self.inner.scheduler.set_delay(debounce);
    }

    pub fn options(&self) -> PersistOptions {
        self.inner
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn name(&self) -> String {
        self.inner
            .options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name
            .clone()
    }

    /// Flushes any pending state now. Returns whether a flush ran.
    pub async fn flush_now(&self) -> bool {
        self.inner.scheduler.flush_now().await
    }

    /// Number of flushes that reached the adapter successfully.
    pub fn flush_count(&self) -> usize {
        self.inner.scheduler.flush_count()
    }

    /// Number of flushes the adapter rejected.
    pub fn failure_count(&self) -> usize {
        self.inner.scheduler.failure_count()
    }
}
