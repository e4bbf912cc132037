//! Synchronization between the local store and the remote notes API.

mod http;
mod memory;
mod network;
mod orchestrator;
mod remote;
mod resolver;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;
pub use network::{spawn_health_check, Connectivity, NetworkMonitor, SyncTrigger, TriggerReason};
pub use orchestrator::{PassOutcome, SkipReason, SyncOrchestrator, SyncReport};
pub use remote::{RemoteResult, RemoteStore};
pub use resolver::{resolve, Resolution};
