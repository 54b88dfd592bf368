//! Per-item results of a reconciliation step.

use std::fmt;

use grouplink_core::{Direction, Side};
use serde::{Deserialize, Serialize};

/// Registry write (or read) an item failed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteAction {
    Add,
    Remove,
    ListMembers,
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteAction::Add => write!(f, "add"),
            WriteAction::Remove => write!(f, "remove"),
            WriteAction::ListMembers => write!(f, "list members of"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeKind {
    Added,
    AlreadyPresent,
    Removed,
    /// Source member with no identity on the target side.
    Unresolved,
    /// Target member with no identity on the source side; left in place.
    Preserved,
    /// Source row whose group has no counterpart.
    NoCounterpartGroup,
    Failed { action: WriteAction, reason: String },
}

/// What happened to one membership row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub direction: Direction,
    #[serde(flatten)]
    pub kind: OutcomeKind,
    pub source_group: u64,
    pub target_group: Option<u64>,
    pub source_member: Option<u64>,
    pub target_member: Option<u64>,
}

impl ItemOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.kind, OutcomeKind::Failed { .. })
    }

    /// Whether the step changed a registry for this item.
    pub fn is_write(&self) -> bool {
        matches!(self.kind, OutcomeKind::Added | OutcomeKind::Removed)
    }
}

struct Member(Side, Option<u64>);

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.1 {
            Some(id) => write!(f, "{} {id}", self.0.member_label()),
            None => write!(f, "{} ?", self.0.member_label()),
        }
    }
}

impl fmt::Display for ItemOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.direction.source();
        let target = self.direction.target();
        let from = Member(source, self.source_member);
        let to = Member(target, self.target_member);
        let tg = self.target_group.unwrap_or_default();
        let sg = self.source_group;
        match &self.kind {
            OutcomeKind::Added => write!(f, "Added {to} to {target} group {tg} ({from})"),
            OutcomeKind::AlreadyPresent => {
                write!(f, "{to} is already in {target} group {tg}; skipped")
            }
            OutcomeKind::Removed => write!(f, "Removed {to} from {target} group {tg}"),
            OutcomeKind::Unresolved => {
                write!(f, "{from} in {source} group {sg} has no {target} identity; skipped")
            }
            OutcomeKind::Preserved => write!(
                f,
                "{to} in {target} group {tg} has no {source} identity; left in place"
            ),
            OutcomeKind::NoCounterpartGroup => {
                write!(f, "{source} group {sg} has no synced {target} group; skipped")
            }
            OutcomeKind::Failed { action, reason } => write!(
                f,
                "Failed to {action} {to} in {target} group {tg}: {reason}"
            ),
        }
    }
}

/// Counts per outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub added: usize,
    pub already_present: usize,
    pub removed: usize,
    pub unresolved: usize,
    pub preserved: usize,
    pub no_counterpart: usize,
    pub failed: usize,
}

impl Tally {
    pub fn of<'a>(outcomes: impl IntoIterator<Item = &'a ItemOutcome>) -> Self {
        let mut tally = Tally::default();
        for outcome in outcomes {
            tally.record(outcome);
        }
        tally
    }

    pub fn record(&mut self, outcome: &ItemOutcome) {
        match outcome.kind {
            OutcomeKind::Added => self.added += 1,
            OutcomeKind::AlreadyPresent => self.already_present += 1,
            OutcomeKind::Removed => self.removed += 1,
            OutcomeKind::Unresolved => self.unresolved += 1,
            OutcomeKind::Preserved => self.preserved += 1,
            OutcomeKind::NoCounterpartGroup => self.no_counterpart += 1,
            OutcomeKind::Failed { .. } => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: Tally) {
        self.added += other.added;
        self.already_present += other.already_present;
        self.removed += other.removed;
        self.unresolved += other.unresolved;
        self.preserved += other.preserved;
        self.no_counterpart += other.no_counterpart;
        self.failed += other.failed;
    }
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} added, {} removed, {} already present, {} unresolved, {} preserved, {} failed",
            self.added,
            self.removed,
            self.already_present,
            self.unresolved,
            self.preserved,
            self.failed
        )
    }
}
