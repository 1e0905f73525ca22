pub mod auth;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod models;
pub mod moderation;
pub mod routes;
pub mod test_util;

pub use config::Config;
pub use error::GatewayError;
pub use gateway::{Dispatcher, DirectoryWatcher, HttpWorkerRegistry, WorkerDirectory};
pub use models::chat::{AskRequest, ModelsResponse};

use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Validates, admits and relays chat requests.
    pub dispatcher: Arc<Dispatcher>,
}
