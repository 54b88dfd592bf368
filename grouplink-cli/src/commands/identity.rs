use anyhow::{Context, Result};
use clap::Subcommand;
use grouplink_core::{ContactId, UserId};

use super::{home, open};

#[derive(Subcommand, Debug)]
pub enum IdentityCommand {
    /// Match a CRM contact to a platform user. The user joins the platform
    /// groups linked to the contact's synced CRM groups.
    Link {
        #[arg(long)]
        contact: u64,
        #[arg(long)]
        user: u64,
    },
}

pub fn run(command: IdentityCommand) -> Result<()> {
    let home = home()?;
    let ctx = open(&home);
    match command {
        IdentityCommand::Link { contact, user } => {
            ctx.crm
                .identity_link(ContactId(contact), UserId(user))
                .with_context(|| format!("failed to link contact {contact} to user {user}"))?;
            println!("linked Contact ID {contact} to User ID {user}");
        }
    }
    Ok(())
}
