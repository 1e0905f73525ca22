//! Model Gateway Common Types
//!
//! Wire types shared between the gateway, the worker registry and the
//! inference workers.

pub mod chat;
pub mod protocol;

pub use chat::{QuestionParameters, StopSequences};
pub use protocol::{
    ListModelsResponse, WorkerAddressRequest, WorkerAddressResponse, WorkerGenerateRequest,
};
