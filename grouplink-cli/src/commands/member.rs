use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use grouplink_core::{
    ContactId, CrmGroupId, CrmRegistry, MembershipStatus, PlatformGroupId, PlatformRegistry,
    Side, UserId,
};

use super::{home, open};
use crate::SideArg;

#[derive(Subcommand, Debug)]
pub enum MemberCommand {
    /// Add a contact (crm) or user (platform) to a group.
    Add(MemberArgs),
    /// Remove a contact (crm) or user (platform) from a group.
    Remove(MemberArgs),
}

#[derive(Args, Debug)]
pub struct MemberArgs {
    #[arg(long)]
    pub side: SideArg,
    #[arg(long)]
    pub group: u64,
    /// Contact ID on the crm side, User ID on the platform side.
    #[arg(long)]
    pub member: u64,
}

pub fn run(command: MemberCommand) -> Result<()> {
    let home = home()?;
    let ctx = open(&home);
    let (args, adding) = match command {
        MemberCommand::Add(args) => (args, true),
        MemberCommand::Remove(args) => (args, false),
    };
    let MemberArgs {
        side,
        group,
        member,
    } = args;

    match (side.0, adding) {
        (Side::Crm, true) => {
            ctx.crm
                .membership_create(CrmGroupId(group), ContactId(member), MembershipStatus::Added)
        }
        (Side::Crm, false) => ctx.crm.membership_create(
            CrmGroupId(group),
            ContactId(member),
            MembershipStatus::Removed,
        ),
        (Side::Platform, true) => ctx.platform.member_add(UserId(member), PlatformGroupId(group)),
        (Side::Platform, false) => ctx
            .platform
            .member_delete(UserId(member), PlatformGroupId(group)),
    }
    .with_context(|| format!("failed to update {side} group {group}"))?;

    let verb = if adding { "added" } else { "removed" };
    println!(
        "{verb} {} {member} {} {side} group {group}",
        side.0.member_label(),
        if adding { "to" } else { "from" },
    );
    Ok(())
}
