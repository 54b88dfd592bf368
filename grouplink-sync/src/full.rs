//! Unpaged reconciliation of every linked pair in one call.

use grouplink_core::{Direction, PlatformGroupId, SyncedGroupPair};
use serde::Serialize;

use crate::context::SyncContext;
use crate::diff::{self, Additions, IdentityMap, Removals};
use crate::endpoint::{CrmEndpoint, Endpoint, PlatformEndpoint};
use crate::error::{SyncError, SyncResult};
use crate::guard::MutationGuard;
use crate::outcome::{ItemOutcome, Tally};
use crate::phase::{apply_additions, apply_removals};
use crate::resolver::IdentityResolver;

#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub pair: SyncedGroupPair,
    pub outcomes: Vec<ItemOutcome>,
    /// Why the pair was abandoned, when it was.
    pub error: Option<String>,
}

impl PairReport {
    pub fn in_sync(&self) -> bool {
        self.error.is_none() && self.outcomes.iter().all(|o| !o.is_write() && !o.is_failure())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FullSyncReport {
    pub direction: Direction,
    pub pairs: Vec<PairReport>,
}

impl FullSyncReport {
    pub fn outcomes(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.pairs.iter().flat_map(|p| p.outcomes.iter())
    }

    pub fn tally(&self) -> Tally {
        Tally::of(self.outcomes())
    }

    pub fn failed_pairs(&self) -> impl Iterator<Item = &PairReport> {
        self.pairs.iter().filter(|p| p.error.is_some())
    }

    pub fn is_clean(&self) -> bool {
        self.failed_pairs().next().is_none() && self.tally().failed == 0
    }
}

/// Diff and converge every linked pair in `direction`, without batch state.
///
/// A pair whose members cannot be listed is recorded and skipped; an
/// unavailable registry aborts the run.
pub fn run_full(ctx: &SyncContext, direction: Direction) -> SyncResult<FullSyncReport> {
    let guard = MutationGuard::new(ctx.crm.events(), ctx.platform.events());
    let mut resolver = IdentityResolver::new(ctx.crm.as_ref(), &ctx.extensions);
    let pairs: Vec<SyncedGroupPair> = resolver.list_synced_groups()?.collect();
    let synced: Vec<PlatformGroupId> = pairs.iter().map(|p| p.platform_group).collect();
    let crm = CrmEndpoint::new(ctx.crm.as_ref(), guard);
    let platform = PlatformEndpoint::new(ctx.platform.as_ref(), guard, synced);

    tracing::info!("full sync {direction}: {} linked group(s)", pairs.len());
    let mut reports = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let mut outcomes = Vec::new();
        let result = match direction {
            Direction::CrmToPlatform => {
                sync_pair(&crm, &platform, &mut resolver, direction, &pair, &mut outcomes)
            }
            Direction::PlatformToCrm => {
                sync_pair(&platform, &crm, &mut resolver, direction, &pair, &mut outcomes)
            }
        };
        let error = match result {
            Ok(()) => None,
            Err(err) if err.is_retryable() => return Err(err),
            Err(err) => {
                tracing::warn!(
                    "crm group {} / platform group {}: {err}",
                    pair.crm_group,
                    pair.platform_group
                );
                Some(err.to_string())
            }
        };
        let report = PairReport {
            pair,
            outcomes,
            error,
        };
        if report.in_sync() {
            tracing::info!(
                "crm group {} and platform group {} already in sync",
                pair.crm_group,
                pair.platform_group
            );
        }
        reports.push(report);
    }

    Ok(FullSyncReport {
        direction,
        pairs: reports,
    })
}

fn sync_pair<Src, Tgt, R>(
    source: &Src,
    target: &Tgt,
    resolver: &mut R,
    direction: Direction,
    pair: &SyncedGroupPair,
    out: &mut Vec<ItemOutcome>,
) -> SyncResult<()>
where
    Src: Endpoint,
    Tgt: Endpoint,
    R: IdentityMap<Src::Member, Tgt::Member, Error = SyncError>,
{
    let source_group = Src::group_in(pair);
    let target_group = Tgt::group_in(pair);
    let wanted = source.members(source_group)?;
    let existing = target.members(target_group)?;
    let plan = diff::diff(&wanted, &existing, resolver)?;

    let additions = Additions {
        to_add: plan.to_add,
        present: plan.present,
        unmapped: plan.unmapped,
    };
    apply_additions::<Src, Tgt>(direction, source_group, target_group, additions, target, out)?;
    let removals = Removals {
        to_remove: plan.to_remove,
        orphaned: plan.orphaned,
    };
    apply_removals::<Src, Tgt>(direction, source_group, target_group, removals, target, out)
}
