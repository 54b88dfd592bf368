//! `grouplink group`: administer groups in either registry.
//!
//! Writes go through the live bridge, so a synced group created, renamed or
//! deleted here is mirrored on the other side.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use grouplink_core::marker::MARKER;
use grouplink_core::{
    CrmGroupId, CrmGroupUpdate, CrmRegistry, GroupMarker, NewCrmGroup, NewPlatformGroup,
    PlatformGroupId, PlatformGroupUpdate, PlatformRegistry, Side,
};
use grouplink_sync::SyncContext;
use tabled::{settings::Style, Table, Tabled};

use super::{home, open};
use crate::SideArg;

#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// List groups, with their sync link.
    List {
        /// Only list one registry's groups.
        #[arg(long)]
        side: Option<SideArg>,
    },
    /// Create a group.
    Create(CreateArgs),
    /// Rename or redescribe a group.
    Update(UpdateArgs),
    /// Delete a group.
    Delete {
        #[arg(long)]
        side: SideArg,
        #[arg(long)]
        id: u64,
    },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub side: SideArg,
    #[arg(long)]
    pub name: String,
    /// CRM display title; defaults to the name.
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
    /// Create and link a counterpart group on the other side.
    #[arg(long)]
    pub sync: bool,
}

#[derive(Args, Debug)]
pub struct UpdateArgs {
    #[arg(long)]
    pub side: SideArg,
    #[arg(long)]
    pub id: u64,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Tabled)]
struct CrmRow {
    id: u64,
    name: String,
    title: String,
    #[tabled(rename = "linked to")]
    linked: String,
}

#[derive(Tabled)]
struct PlatformRow {
    id: u64,
    name: String,
    description: String,
}

pub fn run(command: GroupCommand) -> Result<()> {
    let home = home()?;
    let ctx = open(&home);
    match command {
        GroupCommand::List { side } => list(&ctx, side.map(|s| s.0)),
        GroupCommand::Create(args) => create(&ctx, args),
        GroupCommand::Update(args) => update(&ctx, args),
        GroupCommand::Delete { side, id } => {
            match side.0 {
                Side::Crm => ctx.crm.group_delete(CrmGroupId(id)),
                Side::Platform => ctx.platform.group_delete(PlatformGroupId(id)),
            }
            .with_context(|| format!("failed to delete {side} group {id}"))?;
            println!("deleted {side} group {id}");
            Ok(())
        }
    }
}

fn list(ctx: &SyncContext, side: Option<Side>) -> Result<()> {
    if side != Some(Side::Platform) {
        let groups = ctx.crm.groups_synced().context("failed to list crm groups")?;
        println!("CRM groups flagged for sync: {}", groups.len());
        let rows: Vec<CrmRow> = groups
            .into_iter()
            .map(|g| CrmRow {
                id: g.id.into(),
                name: g.name,
                title: g.title,
                linked: match GroupMarker::parse(&g.source) {
                    Ok(GroupMarker::Linked(id)) => format!("platform group {id}"),
                    Ok(GroupMarker::Pending) => "pending".to_string(),
                    Err(_) => "malformed marker".to_string(),
                },
            })
            .collect();
        if !rows.is_empty() {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    if side != Some(Side::Crm) {
        let groups = ctx
            .platform
            .groups()
            .context("failed to list platform groups")?;
        println!("Platform groups: {}", groups.len());
        let rows: Vec<PlatformRow> = groups
            .into_iter()
            .map(|g| PlatformRow {
                id: g.id.into(),
                name: g.name,
                description: g.description.unwrap_or_default(),
            })
            .collect();
        if !rows.is_empty() {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}

fn create(ctx: &SyncContext, args: CreateArgs) -> Result<()> {
    match args.side.0 {
        Side::Crm => {
            let group = ctx
                .crm
                .group_create(NewCrmGroup {
                    title: args.title.unwrap_or_else(|| args.name.clone()),
                    name: args.name,
                    description: args.description,
                    source: if args.sync {
                        MARKER.to_string()
                    } else {
                        String::new()
                    },
                    group_types: Vec::new(),
                })
                .context("failed to create crm group")?;
            println!("created crm group {}", group.id);
            // The bridge has linked it by now when it was flagged.
            if let Some(linked) = ctx.crm.group_get(group.id)? {
                if let Ok(GroupMarker::Linked(id)) = GroupMarker::parse(&linked.source) {
                    println!("linked to platform group {id}");
                }
            }
        }
        Side::Platform => {
            let group = ctx
                .platform
                .group_create(NewPlatformGroup {
                    name: args.name,
                    description: args.description,
                    sync: args.sync,
                })
                .context("failed to create platform group")?;
            println!("created platform group {}", group.id);
            let marker = GroupMarker::Linked(group.id).to_string();
            if let Some(crm_group) = ctx.crm.group_find_by_marker(&marker)? {
                println!("linked to crm group {}", crm_group.id);
            }
        }
    }
    Ok(())
}

fn update(ctx: &SyncContext, args: UpdateArgs) -> Result<()> {
    let id = args.id;
    match args.side.0 {
        Side::Crm => {
            ctx.crm
                .group_update(
                    CrmGroupId(id),
                    CrmGroupUpdate {
                        name: args.name,
                        title: args.title,
                        description: args.description.map(Some),
                        ..CrmGroupUpdate::default()
                    },
                )
                .with_context(|| format!("failed to update crm group {id}"))?;
        }
        Side::Platform => {
            ctx.platform
                .group_update(
                    PlatformGroupId(id),
                    PlatformGroupUpdate {
                        name: args.name.or(args.title),
                        description: args.description.map(Some),
                    },
                )
                .with_context(|| format!("failed to update platform group {id}"))?;
        }
    }
    println!("updated {} group {id}", args.side);
    Ok(())
}
