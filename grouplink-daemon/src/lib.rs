//! Scheduled reconciliation daemon: settings watcher, scheduler, engine
//! processor and socket server.

mod error;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_cancel, request_full, request_status, request_step, request_stop, send_request,
    DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking, RunSummary};
