//! Client side of the worker registry.

use async_trait::async_trait;

use model_gateway_common::{ListModelsResponse, WorkerAddressRequest, WorkerAddressResponse};

use super::transport::{RetryingTransport, TransportError, NO_BODY};
use crate::config::RegistryConfig;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Registry returned no address for model '{0}'")]
    NoAddress(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

/// Operations the worker directory needs from the registry.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Ask the registry to re-check every worker.
    async fn refresh_all_workers(&self) -> Result<(), RegistryError>;

    /// Every model some worker currently serves.
    async fn list_models(&self) -> Result<Vec<String>, RegistryError>;

    /// The address of the worker serving `model`. Never empty.
    async fn worker_address(&self, model: &str) -> Result<String, RegistryError>;
}

/// Registry reached over HTTP through a short-timeout transport.
#[derive(Debug, Clone)]
pub struct HttpWorkerRegistry {
    transport: RetryingTransport,
    list_models_url: String,
    get_worker_address_url: String,
    refresh_all_workers_url: String,
}

impl HttpWorkerRegistry {
    pub fn new(config: &RegistryConfig) -> Result<Self, TransportError> {
        Ok(Self {
            transport: RetryingTransport::new(config.timeout(), config.max_retries)?,
            list_models_url: config.list_models_url.clone(),
            get_worker_address_url: config.get_worker_address_url.clone(),
            refresh_all_workers_url: config.refresh_all_workers_url.clone(),
        })
    }
}

#[async_trait]
impl WorkerRegistry for HttpWorkerRegistry {
    async fn refresh_all_workers(&self) -> Result<(), RegistryError> {
        self.transport.post(&self.refresh_all_workers_url, NO_BODY).await?;
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, RegistryError> {
        let resp: ListModelsResponse = self
            .transport
            .post_json(&self.list_models_url, NO_BODY)
            .await?;
        Ok(resp.models)
    }

    async fn worker_address(&self, model: &str) -> Result<String, RegistryError> {
        let request = WorkerAddressRequest {
            model: model.to_string(),
        };
        let resp: WorkerAddressResponse = self
            .transport
            .post_json(&self.get_worker_address_url, Some(&request))
            .await?;

        if resp.address.is_empty() {
            return Err(RegistryError::NoAddress(model.to_string()));
        }
        Ok(resp.address)
    }
}
