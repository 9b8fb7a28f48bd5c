//! The evaluation worker: wire protocol, session state, undo history, the
//! worker thread and message subscriptions.

/// Worker thread handle.
mod host;
/// Request and response types.
mod protocol;
/// Undo/redo histories.
mod replay;
/// Session state and dispatch.
mod session;
/// Message listeners.
mod subscription;

pub use host::EvalWorker;
pub use protocol::{
    ActionBindingsRequest, EvalTreeRequest, EvalTreeResponse, EvalTriggerRequest,
    ExpressionRequest, ReplayObjectRequest, ReplayRequest, RequestBody, VersionRequest,
    WorkerRequest, WorkerResponse, encode_response,
};
pub use replay::{ReplayEntity, ReplayEvent, ReplayResult};
pub use session::{CANVAS, EvalSession};
pub use subscription::{ALL_ORIGINS, HubMessage, MessageHub, SubscriptionRegistry};
