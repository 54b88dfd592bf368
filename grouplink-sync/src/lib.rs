//! grouplink sync engine: reconciles group memberships between the CRM and
//! the web platform.
//!
//! Two ways in:
//!
//! - [`job::run_one_step`]: paged, resumable jobs whose progress lives in a
//!   [`batch::Batch`] file and survives restarts;
//! - [`full::run_full`]: one unpaged pass over every linked pair.
//!
//! [`live`] mirrors individual registry writes as they happen, and
//! [`pipeline`] is the shared entrypoint for the CLI and the daemon.
//! [`capabilities`] mirrors CRM permissions as platform capabilities.

pub mod batch;
pub mod capabilities;
pub mod context;
pub mod cursor;
pub mod diff;
mod endpoint;
pub mod error;
pub mod full;
pub mod guard;
pub mod job;
pub mod live;
pub mod outcome;
mod phase;
pub mod pipeline;
pub mod resolver;

pub use batch::{Batch, BatchState, BatchStore, Phase};
pub use capabilities::{capability_name, sync_capabilities, CapabilityReport};
pub use context::{CapabilityProvider, Extensions, IdentityProvider, SyncContext};
pub use cursor::{StepCursor, DEFAULT_STEP_SIZE};
pub use error::{SyncError, SyncResult};
pub use full::{run_full, FullSyncReport, PairReport};
pub use job::{job_cancel, job_exists, jobs_running, run_one_step, JobId, StepProgress};
pub use outcome::{ItemOutcome, OutcomeKind, Tally, WriteAction};
pub use pipeline::{RunOutput, RunScope};
pub use resolver::IdentityResolver;
