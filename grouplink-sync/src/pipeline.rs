//! Shared engine entrypoint used by the CLI and the daemon.

use std::path::Path;

use grouplink_core::{Direction, Settings};

use crate::context::SyncContext;
use crate::full::{run_full, FullSyncReport};
use crate::job::{run_one_step, JobId, StepProgress};
use crate::live;
use crate::SyncResult;

/// What one engine run should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScope {
    /// One page of a paged job.
    Step { job: JobId, step_size: u64 },
    /// Every linked pair in one go.
    Full(Direction),
}

#[derive(Debug, Clone)]
pub enum RunOutput {
    Step(StepProgress),
    Full(FullSyncReport),
}

/// File-backed context under `home` with the live bridge attached.
pub fn open_at(home: &Path) -> SyncContext {
    let ctx = SyncContext::file_backed(home);
    live::attach(&ctx);
    ctx
}

pub fn run(ctx: &SyncContext, scope: RunScope) -> SyncResult<RunOutput> {
    match scope {
        RunScope::Step { job, step_size } => {
            run_one_step(ctx, &job, step_size).map(RunOutput::Step)
        }
        RunScope::Full(direction) => run_full(ctx, direction).map(RunOutput::Full),
    }
}

/// The run a scheduler tick performs for `settings`.
///
/// A batch count of `0` means a full sync per tick; otherwise each tick is
/// one step of the `cron` job for the configured direction.
pub fn scheduled_scope(settings: &Settings) -> RunScope {
    if settings.batch_count == 0 {
        RunScope::Full(settings.direction)
    } else {
        RunScope::Step {
            job: JobId::cron(settings.direction),
            step_size: settings.batch_count,
        }
    }
}

pub fn scheduled_tick(ctx: &SyncContext, settings: &Settings) -> SyncResult<RunOutput> {
    run(ctx, scheduled_scope(settings))
}

#[cfg(test)]
mod tests {
    use grouplink_core::{CrmRegistry, NewCrmGroup, PlatformRegistry};
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn open_at_attaches_bridge() {
        let home = TempDir::new().expect("home");
        let ctx = open_at(home.path());
        assert!(live::is_attached(&ctx));
    }

    #[test]
    fn pending_crm_group_gets_linked_through_file_context() {
        let home = TempDir::new().expect("home");
        let ctx = open_at(home.path());
        let group = ctx
            .crm
            .group_create(NewCrmGroup {
                name: "Volunteers".to_string(),
                source: "synced-group".to_string(),
                ..NewCrmGroup::default()
            })
            .expect("create");

        let platform_groups = ctx.platform.groups().expect("groups");
        assert_eq!(platform_groups.len(), 1);
        let linked = ctx.crm.group_get(group.id).expect("get").expect("group");
        assert_eq!(linked.source, format!("synced-group-{}", platform_groups[0].id));
    }

    #[test]
    fn scheduled_scope_follows_batch_count() {
        let mut settings = Settings::default();
        settings.batch_count = 0;
        assert_eq!(
            scheduled_scope(&settings),
            RunScope::Full(Direction::CrmToPlatform)
        );
        settings.batch_count = 10;
        settings.direction = Direction::PlatformToCrm;
        assert_eq!(
            scheduled_scope(&settings),
            RunScope::Step {
                job: JobId::cron(Direction::PlatformToCrm),
                step_size: 10
            }
        );
    }

    #[test]
    fn empty_registries_finish_in_three_steps() {
        let home = TempDir::new().expect("home");
        let ctx = open_at(home.path());
        let scope = RunScope::Step {
            job: JobId::manual(Direction::CrmToPlatform),
            step_size: 5,
        };
        let mut steps = 0;
        loop {
            steps += 1;
            match run(&ctx, scope.clone()).expect("step") {
                RunOutput::Step(progress) if progress.finished => break,
                RunOutput::Step(_) => {}
                RunOutput::Full(_) => unreachable!(),
            }
        }
        assert_eq!(steps, 3);
    }
}
