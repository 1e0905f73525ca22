//! Test doubles and fixtures shared by unit and integration tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::config::{
    AuthConfig, ChatConfig, Config, LoggingConfig, ModerationConfig, RegistryConfig, ServerConfig,
};
use crate::gateway::{Dispatcher, RegistryError, WorkerDirectory, WorkerRegistry};
use crate::moderation::{Moderation, ModerationError};
use crate::AppState;

/// Config pointing every registry endpoint at `registry_base`.
pub fn test_config(registry_base: &str) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
        },
        auth: AuthConfig::default(),
        chat: ChatConfig::default(),
        registry: RegistryConfig {
            list_models_url: format!("{registry_base}/list_models"),
            get_worker_address_url: format!("{registry_base}/get_worker_address"),
            refresh_all_workers_url: format!("{registry_base}/refresh_all_workers"),
            ..RegistryConfig::default()
        },
        moderation: ModerationConfig::default(),
    }
}

/// In-memory registry whose answers and failures are set by the test.
///
/// A model scripted with an empty address fails resolution the way the
/// HTTP registry does.
#[derive(Debug, Default)]
pub struct ScriptedRegistry {
    models: Mutex<Vec<(String, String)>>,
    fail_refresh: AtomicBool,
    fail_list: AtomicBool,
    refresh_calls: AtomicUsize,
    list_calls: AtomicUsize,
    address_calls: AtomicUsize,
}

impl ScriptedRegistry {
    pub fn new(models: &[(&str, &str)]) -> Self {
        let registry = Self::default();
        registry.set_models(models);
        registry
    }

    pub fn set_models(&self, models: &[(&str, &str)]) {
        let mut guard = self.models.lock().unwrap();
        *guard = models
            .iter()
            .map(|(model, address)| (model.to_string(), address.to_string()))
            .collect();
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn address_calls(&self) -> usize {
        self.address_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerRegistry for ScriptedRegistry {
    async fn refresh_all_workers(&self) -> Result<(), RegistryError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("scripted refresh failure".to_string()));
        }
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, RegistryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("scripted list failure".to_string()));
        }
        let models = self.models.lock().unwrap();
        Ok(models.iter().map(|(model, _)| model.clone()).collect())
    }

    async fn worker_address(&self, model: &str) -> Result<String, RegistryError> {
        self.address_calls.fetch_add(1, Ordering::SeqCst);
        let models = self.models.lock().unwrap();
        match models.iter().find(|(name, _)| name == model) {
            Some((_, address)) if !address.is_empty() => Ok(address.clone()),
            _ => Err(RegistryError::NoAddress(model.to_string())),
        }
    }
}

/// Moderation double that counts calls and can reject everything.
#[derive(Debug, Default)]
pub struct RecordingModeration {
    calls: AtomicUsize,
    reject: AtomicBool,
}

impl RecordingModeration {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reject_all(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }
}

#[async_trait]
impl Moderation for RecordingModeration {
    async fn check_text(&self, _text: &str) -> Result<(), ModerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reject.load(Ordering::SeqCst) {
            return Err(ModerationError::Rejected {
                suggestion: "block".to_string(),
            });
        }
        Ok(())
    }
}

/// Application state over a refreshed directory and the given moderation.
pub async fn test_state(
    config: Config,
    registry: Arc<dyn WorkerRegistry>,
    moderation: Arc<dyn Moderation>,
) -> Arc<AppState> {
    let directory = Arc::new(WorkerDirectory::new(registry));
    directory
        .refresh()
        .await
        .expect("initial directory refresh failed");

    let dispatcher = Dispatcher::new(directory, moderation, &config.chat)
        .expect("failed to build dispatcher");

    Arc::new(AppState {
        config,
        dispatcher: Arc::new(dispatcher),
    })
}

/// HTTP server that answers every request with `status` and a
/// `content-length` of `declared_len`, sends only `body`, then hangs up.
///
/// Returns the server's base URL.
pub async fn spawn_truncating_server(status: u16, declared_len: usize, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let head = format!(
                    "HTTP/1.1 {status} Truncated\r\n\
                     content-type: application/octet-stream\r\n\
                     content-length: {declared_len}\r\n\r\n"
                );
                let _ = socket.write_all(head.as_bytes()).await;
                let _ = socket.write_all(body).await;
                let _ = socket.flush().await;
                // Let the client consume what was sent before the hang-up.
                tokio::time::sleep(Duration::from_millis(50)).await;
            });
        }
    });

    format!("http://{addr}")
}

async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + len {
            return;
        }
    }
}
