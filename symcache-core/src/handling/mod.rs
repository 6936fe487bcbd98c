//! Checkpoint failure handling: policies, handles and the handler.

pub mod checkpoint;
pub mod handle;
pub mod handler;
pub mod policy;

pub use checkpoint::{Checkpoint, FeedCheckpoint, SymbolCheckpoint};
pub use handle::{FeedHandle, FeedHandleConfig, HandleDefaults, SymbolHandle, SymbolHandleConfig};
pub use handler::{Cause, CheckpointHandler, Fault, HandleRecord, LogNotifier, Notifier};
pub use policy::{BitPolicy, Flag, PolicyError, PolicySpec};
