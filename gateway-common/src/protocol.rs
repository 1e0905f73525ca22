//! HTTP protocol types for gateway-registry and gateway-worker communication.
//!
//! # Registry
//!
//! The registry (controller) tracks which worker serves which model. The
//! gateway calls three endpoints, all `POST` with JSON bodies:
//!
//! 1. `refresh_all_workers` - no body, asks the registry to re-check workers
//! 2. `list_models` - no body, answers [`ListModelsResponse`]
//! 3. `get_worker_address` - [`WorkerAddressRequest`], answers [`WorkerAddressResponse`]
//!
//! # Workers
//!
//! A generation request is a [`WorkerGenerateRequest`] posted to the
//! resolved worker address. The worker answers with a raw byte stream that
//! the gateway relays to its caller without interpreting it.

use serde::{Deserialize, Serialize};

use crate::QuestionParameters;

/// Response from the registry's model listing endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListModelsResponse {
    #[serde(default)]
    pub models: Vec<String>,
}

/// Request body for resolving a model's worker address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAddressRequest {
    pub model: String,
}

/// Response from the registry's address endpoint.
///
/// An empty address means no worker currently serves the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerAddressResponse {
    #[serde(default)]
    pub address: String,
}

/// Generation payload sent to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerGenerateRequest {
    /// Model name. The field is plural on the wire.
    pub models: String,
    pub prompt: String,
    #[serde(flatten)]
    pub parameters: QuestionParameters,
}
