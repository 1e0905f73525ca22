//! Dispatch core: worker directory, retrying transport, admission and relay.
//!
//! This module provides:
//! - Worker directory mapping models to worker addresses
//! - Registry client the directory refreshes from
//! - Outbound HTTP with bounded retry
//! - Fail-fast admission control
//! - Chunked stream relay
//! - The dispatcher tying them together per request

pub mod admission;
pub mod directory;
pub mod dispatcher;
pub mod registry;
pub mod relay;
pub mod transport;

pub use admission::{AdmissionController, AdmissionRejected};
pub use directory::{DirectoryError, DirectoryWatcher, ModelCatalog, RefreshStatus, WorkerDirectory};
pub use dispatcher::Dispatcher;
pub use registry::{HttpWorkerRegistry, RegistryError, WorkerRegistry};
pub use relay::{RelayError, StreamRelay};
pub use transport::{RetryPolicy, RetryingTransport, TransportError};
