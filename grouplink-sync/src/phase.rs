//! The additive and subtractive halves of reconciliation, shared by paged
//! jobs and full sync.

use grouplink_core::{Direction, RegistryError};

use crate::diff::{self, Additions, IdentityMap, Removals};
use crate::endpoint::Endpoint;
use crate::error::{SyncError, SyncResult};
use crate::outcome::{ItemOutcome, OutcomeKind, WriteAction};
use crate::resolver::Counterpart;

/// Rows of one page, grouped by group in first-seen order.
pub(crate) fn group_rows<G: Copy + Eq, M: Copy>(
    rows: impl IntoIterator<Item = (G, M)>,
) -> Vec<(G, Vec<M>)> {
    let mut grouped: Vec<(G, Vec<M>)> = Vec::new();
    for (group, member) in rows {
        match grouped.iter_mut().find(|(g, _)| *g == group) {
            Some((_, members)) => members.push(member),
            None => grouped.push((group, vec![member])),
        }
    }
    grouped
}

/// Per-item errors become the reason of a failed outcome; unavailability
/// aborts the whole step.
fn item_failure(err: RegistryError) -> SyncResult<String> {
    if matches!(err, RegistryError::Unavailable { .. }) {
        Err(err.into())
    } else {
        Ok(err.to_string())
    }
}

/// Every outcome gets a line at `info` or above, skips included.
fn log_level(kind: &OutcomeKind) -> tracing::Level {
    match kind {
        OutcomeKind::Failed { .. } => tracing::Level::Warn,
        _ => tracing::Level::Info,
    }
}

fn record(out: &mut Vec<ItemOutcome>, outcome: ItemOutcome) {
    tracing::log!(log_level(&outcome.kind), "{outcome}");
    out.push(outcome);
}

/// Phase 0 for one source group: add its mapped members that the target
/// group lacks.
pub(crate) fn add_missing<Src, Tgt, R>(
    direction: Direction,
    source_group: Src::Group,
    members: &[Src::Member],
    target: &Tgt,
    resolver: &mut R,
    out: &mut Vec<ItemOutcome>,
) -> SyncResult<()>
where
    Src: Endpoint,
    Tgt: Endpoint,
    R: Counterpart<Src::Group, Tgt::Group>
        + IdentityMap<Src::Member, Tgt::Member, Error = SyncError>,
{
    let Some(target_group) = resolver.counterpart(source_group)? else {
        for member in members {
            record(
                out,
                ItemOutcome {
                    direction,
                    kind: OutcomeKind::NoCounterpartGroup,
                    source_group: source_group.into(),
                    target_group: None,
                    source_member: Some((*member).into()),
                    target_member: None,
                },
            );
        }
        return Ok(());
    };

    let existing = match target.members(target_group) {
        Ok(existing) => existing,
        Err(err) => {
            let reason = item_failure(err)?;
            for member in members {
                record(
                    out,
                    ItemOutcome {
                        direction,
                        kind: OutcomeKind::Failed {
                            action: WriteAction::ListMembers,
                            reason: reason.clone(),
                        },
                        source_group: source_group.into(),
                        target_group: Some(target_group.into()),
                        source_member: Some((*member).into()),
                        target_member: None,
                    },
                );
            }
            return Ok(());
        }
    };

    let plan = diff::additions(members, &existing, resolver)?;
    apply_additions::<Src, Tgt>(direction, source_group, target_group, plan, target, out)
}

/// Phase 1 for one target group: remove members whose source identity is no
/// longer in the linked source group.
pub(crate) fn remove_stale<Src, Tgt, R>(
    direction: Direction,
    target_group: Tgt::Group,
    members: &[Tgt::Member],
    source: &Src,
    target: &Tgt,
    resolver: &mut R,
    out: &mut Vec<ItemOutcome>,
) -> SyncResult<()>
where
    Src: Endpoint,
    Tgt: Endpoint,
    R: Counterpart<Tgt::Group, Src::Group>
        + IdentityMap<Src::Member, Tgt::Member, Error = SyncError>,
{
    let Some(source_group) = resolver.counterpart(target_group)? else {
        tracing::debug!(
            "{} group {target_group} is not linked; its members are left alone",
            Tgt::SIDE
        );
        return Ok(());
    };

    let wanted = match source.members(source_group) {
        Ok(wanted) => wanted,
        Err(err) => {
            let reason = item_failure(err)?;
            for member in members {
                record(
                    out,
                    ItemOutcome {
                        direction,
                        kind: OutcomeKind::Failed {
                            action: WriteAction::ListMembers,
                            reason: reason.clone(),
                        },
                        source_group: source_group.into(),
                        target_group: Some(target_group.into()),
                        source_member: None,
                        target_member: Some((*member).into()),
                    },
                );
            }
            return Ok(());
        }
    };

    let plan = diff::removals(&wanted, members, resolver)?;
    apply_removals::<Src, Tgt>(direction, source_group, target_group, plan, target, out)
}

pub(crate) fn apply_additions<Src: Endpoint, Tgt: Endpoint>(
    direction: Direction,
    source_group: Src::Group,
    target_group: Tgt::Group,
    plan: Additions<Src::Member, Tgt::Member>,
    target: &Tgt,
    out: &mut Vec<ItemOutcome>,
) -> SyncResult<()> {
    let row = |kind, source_member: Option<u64>, target_member: Option<u64>| ItemOutcome {
        direction,
        kind,
        source_group: source_group.into(),
        target_group: Some(target_group.into()),
        source_member,
        target_member,
    };

    for member in plan.unmapped {
        record(out, row(OutcomeKind::Unresolved, Some(member.into()), None));
    }
    for (s, t) in plan.present {
        record(out, row(OutcomeKind::AlreadyPresent, Some(s.into()), Some(t.into())));
    }
    for (s, t) in plan.to_add {
        let kind = match target.add_member(target_group, t) {
            Ok(()) => OutcomeKind::Added,
            Err(err) => OutcomeKind::Failed {
                action: WriteAction::Add,
                reason: item_failure(err)?,
            },
        };
        record(out, row(kind, Some(s.into()), Some(t.into())));
    }
    Ok(())
}

pub(crate) fn apply_removals<Src: Endpoint, Tgt: Endpoint>(
    direction: Direction,
    source_group: Src::Group,
    target_group: Tgt::Group,
    plan: Removals<Src::Member, Tgt::Member>,
    target: &Tgt,
    out: &mut Vec<ItemOutcome>,
) -> SyncResult<()> {
    let row = |kind, source_member: Option<u64>, target_member: Option<u64>| ItemOutcome {
        direction,
        kind,
        source_group: source_group.into(),
        target_group: Some(target_group.into()),
        source_member,
        target_member,
    };

    for member in plan.orphaned {
        record(out, row(OutcomeKind::Preserved, None, Some(member.into())));
    }
    for (s, t) in plan.to_remove {
        let kind = match target.remove_member(target_group, t) {
            Ok(()) => OutcomeKind::Removed,
            Err(err) => OutcomeKind::Failed {
                action: WriteAction::Remove,
                reason: item_failure(err)?,
            },
        };
        record(out, row(kind, Some(s.into()), Some(t.into())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(OutcomeKind::Added, tracing::Level::Info)]
    #[case(OutcomeKind::Removed, tracing::Level::Info)]
    #[case(OutcomeKind::AlreadyPresent, tracing::Level::Info)]
    #[case(OutcomeKind::Unresolved, tracing::Level::Info)]
    #[case(OutcomeKind::Preserved, tracing::Level::Info)]
    #[case(OutcomeKind::NoCounterpartGroup, tracing::Level::Info)]
    #[case(
        OutcomeKind::Failed { action: WriteAction::Remove, reason: "blocked".to_string() },
        tracing::Level::Warn
    )]
    fn every_outcome_logs_at_info_or_above(
        #[case] kind: OutcomeKind,
        #[case] expected: tracing::Level,
    ) {
        let level = log_level(&kind);
        assert_eq!(level, expected);
        assert!(level <= tracing::Level::Info);
    }

    #[test]
    fn rows_group_in_first_seen_order() {
        let grouped = group_rows(vec![(2, 'a'), (1, 'b'), (2, 'c')]);
        assert_eq!(grouped, vec![(2, vec!['a', 'c']), (1, vec!['b'])]);
    }

    #[test]
    fn unavailable_aborts_other_errors_are_reasons() {
        use grouplink_core::Side;
        assert!(item_failure(RegistryError::unavailable(Side::Crm, "down")).is_err());
        let reason = item_failure(RegistryError::not_found(Side::Platform, "group 3")).unwrap();
        assert!(reason.contains("group 3"));
    }
}
