//! Model to worker-address directory, refreshed from the registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::{RegistryError, WorkerRegistry};

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Failed to refresh workers: {0}")]
    RefreshWorkers(#[source] RegistryError),

    #[error("Failed to list models: {0}")]
    ListModels(#[source] RegistryError),

    #[error("Registry lists no models")]
    EmptyDirectory,

    #[error("Failed to resolve worker for model '{model}': {source}")]
    ResolveAddress {
        model: String,
        #[source]
        source: RegistryError,
    },

    #[error("Model '{0}' is not in the directory")]
    UnknownModel(String),
}

/// One consistent view of the directory. Replaced whole, never edited.
#[derive(Debug, Default)]
pub struct Snapshot {
    models: Vec<String>,
    addresses: HashMap<String, String>,
}

impl Snapshot {
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn address(&self, model: &str) -> Option<&str> {
        self.addresses.get(model).map(String::as_str)
    }
}

/// Outcome history of directory refreshes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshStatus {
    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub model_count: usize,
}

/// Read access to the set of servable models.
pub trait ModelCatalog {
    fn has_model(&self, name: &str) -> bool;
}

pub struct WorkerDirectory {
    registry: Arc<dyn WorkerRegistry>,
    snapshot: RwLock<Arc<Snapshot>>,
    status: Mutex<RefreshStatus>,
}

impl WorkerDirectory {
    /// Create an empty directory. Call [`WorkerDirectory::refresh`] before serving.
    pub fn new(registry: Arc<dyn WorkerRegistry>) -> Self {
        Self {
            registry,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            status: Mutex::new(RefreshStatus::default()),
        }
    }

    /// Rebuild the directory from the registry.
    ///
    /// Either every model resolves and the snapshot is replaced, or the
    /// previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<(), DirectoryError> {
        let result = self.build_snapshot().await;

        match result {
            Ok(snapshot) => {
                let model_count = snapshot.models.len();
                *write_recover(&self.snapshot) = Arc::new(snapshot);

                let mut status = lock_recover(&self.status);
                status.consecutive_failures = 0;
                status.last_success_at = Some(Utc::now());
                status.last_error = None;
                status.model_count = model_count;

                tracing::debug!(models = model_count, "Worker directory refreshed");
                Ok(())
            }
            Err(err) => {
                let mut status = lock_recover(&self.status);
                status.consecutive_failures += 1;
                status.last_failure_at = Some(Utc::now());
                status.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn build_snapshot(&self) -> Result<Snapshot, DirectoryError> {
        self.registry
            .refresh_all_workers()
            .await
            .map_err(DirectoryError::RefreshWorkers)?;

        let models = self
            .registry
            .list_models()
            .await
            .map_err(DirectoryError::ListModels)?;
        if models.is_empty() {
            return Err(DirectoryError::EmptyDirectory);
        }

        let mut addresses = HashMap::with_capacity(models.len());
        for model in &models {
            let address = self
                .registry
                .worker_address(model)
                .await
                .map_err(|source| DirectoryError::ResolveAddress {
                    model: model.clone(),
                    source,
                })?;
            addresses.insert(model.clone(), address);
        }

        Ok(Snapshot { models, addresses })
    }

    /// The current snapshot. Holding it does not block refreshes.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        read_recover(&self.snapshot).clone()
    }

    /// Owned copy of the model list.
    pub fn all_models(&self) -> Vec<String> {
        self.snapshot().models.clone()
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.snapshot().addresses.contains_key(name)
    }

    pub fn worker_address(&self, name: &str) -> Option<String> {
        self.snapshot().address(name).map(str::to_string)
    }

    pub fn refresh_status(&self) -> RefreshStatus {
        lock_recover(&self.status).clone()
    }
}

impl ModelCatalog for WorkerDirectory {
    fn has_model(&self, name: &str) -> bool {
        WorkerDirectory::has_model(self, name)
    }
}

fn read_recover<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(lock = "directory_snapshot", "Lock poisoned, recovering read");
            poisoned.into_inner()
        }
    }
}

fn write_recover<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(lock = "directory_snapshot", "Lock poisoned, recovering write");
            poisoned.into_inner()
        }
    }
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(lock = "directory_status", "Lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Background task refreshing a [`WorkerDirectory`] on a fixed interval.
///
/// The interval restarts once each refresh completes, so slow refreshes
/// never overlap.
pub struct DirectoryWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DirectoryWatcher {
    pub fn spawn(directory: Arc<WorkerDirectory>, interval: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Directory watcher started");
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                if let Err(e) = directory.refresh().await {
                    let status = directory.refresh_status();
                    tracing::error!(
                        error = %e,
                        consecutive_failures = status.consecutive_failures,
                        "Directory refresh failed, keeping previous snapshot"
                    );
                }
            }
            tracing::info!("Directory watcher stopped");
        });

        Self { cancel, handle }
    }

    /// Signal the watcher and wait for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Directory watcher ended abnormally");
        }
    }
}
