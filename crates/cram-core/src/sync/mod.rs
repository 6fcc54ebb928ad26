//! Sync engine: push dirty records, pull remote changes, resolve with
//! last-write-wins and keep per-entity cursors.

mod entity;
mod error;
mod guard;
mod lock;
mod memory;
mod orchestrator;
mod pull;
mod push;
mod remote;
mod resolver;
mod supabase;

#[cfg(test)]
mod scenarios;

pub use entity::{EntityKind, SyncEntity};
pub use error::{SyncError, SyncResult};
pub use guard::{probe, Connectivity, PreconditionGuard, Readiness, StaticConnectivity};
pub use lock::{try_run, FileLocks, LocalLocks, LockCoordinator, LockGuard};
pub use memory::MemoryRemote;
pub use orchestrator::{run_with_retry, SkipReason, SyncOrchestrator, SyncReport};
pub use pull::{PullOutcome, PullPipeline};
pub use push::{PushOutcome, PushPipeline};
pub use remote::{RemoteStore, UpsertVerdict};
pub use resolver::{resolve, Resolution};
pub use supabase::{pull_query, SupabaseRemote};
