//! Paged, resumable reconciliation jobs.
//!
//! A job is one direction of reconciliation with a persisted [`Batch`]. Each
//! call to [`run_one_step`] processes at most one page of memberships and
//! returns; the caller loops until [`StepProgress::finished`].

use std::fmt;
use std::str::FromStr;

use grouplink_core::{Direction, PlatformGroupId};
use serde::Serialize;

use crate::batch::{Batch, BatchState, Phase};
use crate::context::SyncContext;
use crate::diff::IdentityMap;
use crate::endpoint::{CrmEndpoint, Endpoint, PlatformEndpoint};
use crate::error::{SyncError, SyncResult};
use crate::guard::MutationGuard;
use crate::outcome::{ItemOutcome, OutcomeKind};
use crate::phase::{add_missing, group_rows, remove_stale};
use crate::resolver::{Counterpart, IdentityResolver};

/// Scope of jobs started by hand.
pub const SCOPE_MANUAL: &str = "manual";
/// Scope of jobs started by the scheduler.
pub const SCOPE_CRON: &str = "cron";

/// `<scope>_<direction>`, e.g. `manual_crm_to_platform`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    pub direction: Direction,
    pub scope: String,
}

impl JobId {
    pub fn new(direction: Direction, scope: impl Into<String>) -> Self {
        Self {
            direction,
            scope: scope.into(),
        }
    }

    pub fn manual(direction: Direction) -> Self {
        Self::new(direction, SCOPE_MANUAL)
    }

    pub fn cron(direction: Direction) -> Self {
        Self::new(direction, SCOPE_CRON)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.scope, self.direction.slug())
    }
}

impl FromStr for JobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::all()
            .into_iter()
            .find_map(|direction| {
                s.strip_suffix(direction.slug())
                    .and_then(|rest| rest.strip_suffix('_'))
                    .filter(|scope| !scope.is_empty())
                    .map(|scope| JobId::new(direction, scope))
            })
            .ok_or_else(|| format!("'{s}' is not a job identifier (<scope>_<direction>)"))
    }
}

/// Result of one [`run_one_step`] call.
#[derive(Debug, Clone, Serialize)]
pub struct StepProgress {
    pub identifier: String,
    pub direction: Direction,
    /// The job completed and its batch state is gone.
    pub finished: bool,
    /// Phase this step worked on.
    pub phase: Phase,
    pub progress_from: u64,
    pub progress_to: u64,
    /// Rows in the phase's listing when the page was read.
    pub total: u64,
    pub outcomes: Vec<ItemOutcome>,
}

struct Page {
    fetched: u64,
    total: u64,
    outcomes: Vec<ItemOutcome>,
}

/// Process one page of the job's current phase and advance its cursor.
///
/// `step_size` is applied when the job is created and again whenever its
/// cursor sits at the start of a phase; `0` processes each phase in one page.
/// A [`SyncError::RegistryUnavailable`] leaves the cursor where it was.
pub fn run_one_step(ctx: &SyncContext, job: &JobId, step_size: u64) -> SyncResult<StepProgress> {
    let identifier = job.to_string();
    let mut batch = Batch::open(&ctx.batches, &identifier)?;
    let phase = batch.initialise(step_size)?;
    if batch.step_initialise() == 0 {
        batch.step_count_set(step_size)?;
    }
    let limit = batch.step_count_get();
    let offset = batch.step_initialise();
    let fetch_offset = batch.step_fetch_offset();

    if phase == Phase::Terminal {
        batch.delete()?;
        tracing::info!("job '{identifier}' finished");
        return Ok(StepProgress {
            identifier,
            direction: job.direction,
            finished: true,
            phase,
            progress_from: offset,
            progress_to: offset,
            total: 0,
            outcomes: vec![],
        });
    }

    let guard = MutationGuard::new(ctx.crm.events(), ctx.platform.events());
    let mut resolver = IdentityResolver::new(ctx.crm.as_ref(), &ctx.extensions);
    let synced: Vec<PlatformGroupId> = resolver
        .list_synced_groups()?
        .map(|pair| pair.platform_group)
        .collect();
    let crm = CrmEndpoint::new(ctx.crm.as_ref(), guard);
    let platform = PlatformEndpoint::new(ctx.platform.as_ref(), guard, synced);

    tracing::info!(
        "job '{identifier}': processing phase {} rows {offset}..{}",
        phase.number(),
        offset.saturating_add(limit)
    );
    let page = match job.direction {
        Direction::CrmToPlatform => {
            run_page(&crm, &platform, &mut resolver, job.direction, phase, limit, fetch_offset)?
        }
        Direction::PlatformToCrm => {
            run_page(&platform, &crm, &mut resolver, job.direction, phase, limit, fetch_offset)?
        }
    };

    if limit == 0 || page.fetched < limit {
        let next = batch.next()?;
        tracing::info!(
            "job '{identifier}': phase {} complete, next phase {}",
            phase.number(),
            next.number()
        );
    } else {
        let removed = page
            .outcomes
            .iter()
            .filter(|o| o.kind == OutcomeKind::Removed)
            .count() as u64;
        batch.step_next_after_removing(removed)?;
    }

    Ok(StepProgress {
        identifier,
        direction: job.direction,
        finished: false,
        phase,
        progress_from: offset,
        progress_to: offset + page.fetched,
        total: page.total + (offset - fetch_offset),
        outcomes: page.outcomes,
    })
}

fn run_page<Src, Tgt, R>(
    source: &Src,
    target: &Tgt,
    resolver: &mut R,
    direction: Direction,
    phase: Phase,
    limit: u64,
    offset: u64,
) -> SyncResult<Page>
where
    Src: Endpoint,
    Tgt: Endpoint,
    R: Counterpart<Src::Group, Tgt::Group>
        + Counterpart<Tgt::Group, Src::Group>
        + IdentityMap<Src::Member, Tgt::Member, Error = SyncError>,
{
    let mut outcomes = Vec::new();
    match phase {
        Phase::Additive => {
            let rows = source.page(limit, offset)?;
            let total = source.total()?;
            let fetched = rows.len() as u64;
            for (group, members) in group_rows(rows.into_iter().map(|e| (e.group, e.member))) {
                add_missing::<Src, Tgt, R>(
                    direction,
                    group,
                    &members,
                    target,
                    resolver,
                    &mut outcomes,
                )?;
            }
            Ok(Page {
                fetched,
                total,
                outcomes,
            })
        }
        Phase::Subtractive => {
            let rows = target.page(limit, offset)?;
            let total = target.total()?;
            let fetched = rows.len() as u64;
            for (group, members) in group_rows(rows.into_iter().map(|e| (e.group, e.member))) {
                remove_stale::<Src, Tgt, R>(
                    direction,
                    group,
                    &members,
                    source,
                    target,
                    resolver,
                    &mut outcomes,
                )?;
            }
            Ok(Page {
                fetched,
                total,
                outcomes,
            })
        }
        Phase::Terminal => Ok(Page {
            fetched: 0,
            total: 0,
            outcomes,
        }),
    }
}

/// Whether `job` has persisted batch state, i.e. is mid-run.
pub fn job_exists(ctx: &SyncContext, job: &JobId) -> SyncResult<bool> {
    Ok(Batch::open(&ctx.batches, &job.to_string())?.exists())
}

/// Discard `job`'s batch state. Returns `false` when it was not running.
pub fn job_cancel(ctx: &SyncContext, job: &JobId) -> SyncResult<bool> {
    let removed = ctx.batches.remove(&job.to_string())?;
    if removed {
        tracing::info!("job '{job}' cancelled");
    }
    Ok(removed)
}

/// Every running job's state.
pub fn jobs_running(ctx: &SyncContext) -> SyncResult<Vec<BatchState>> {
    ctx.batches.list()
}
