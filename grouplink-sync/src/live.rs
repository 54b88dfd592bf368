//! Live event bridge: mirrors single registry writes to the other side as
//! they happen.
//!
//! [`attach`] registers one handler per reaction on each registry's event
//! hub. Handlers hold weak references to the registries and never fail the
//! write that triggered them; errors are logged. Every mirrored write is made
//! with the opposite handler suppressed, so a change never echoes back.

use std::sync::{Arc, Weak};

use grouplink_core::{
    ContactId, CrmEvent, CrmGroup, CrmGroupId, CrmGroupType, CrmGroupUpdate, CrmRegistry,
    GroupMarker, HandlerId, MembershipStatus, NewCrmGroup, NewPlatformGroup, PlatformEvent,
    PlatformGroup, PlatformGroupId, PlatformGroupUpdate, PlatformRegistry, Side, UserId,
};

use crate::capabilities;
use crate::context::{Extensions, SyncContext};
use crate::error::SyncResult;
use crate::guard::MutationGuard;
use crate::resolver::IdentityResolver;

pub const CRM_MEMBERSHIP_ADDED: HandlerId = HandlerId("crm.membership.added");
pub const CRM_MEMBERSHIP_REMOVED: HandlerId = HandlerId("crm.membership.removed");
pub const CRM_GROUP_CREATED: HandlerId = HandlerId("crm.group.created");
pub const CRM_GROUP_UPDATED: HandlerId = HandlerId("crm.group.updated");
pub const CRM_GROUP_DELETED: HandlerId = HandlerId("crm.group.deleted");
pub const CRM_IDENTITY_LINKED: HandlerId = HandlerId("crm.identity.linked");
pub const CRM_PERMISSIONS_CHANGED: HandlerId = HandlerId("crm.permissions.changed");

pub const PLATFORM_MEMBERSHIP_ADDED: HandlerId = HandlerId("platform.membership.added");
pub const PLATFORM_MEMBERSHIP_REMOVED: HandlerId = HandlerId("platform.membership.removed");
pub const PLATFORM_GROUP_CREATED: HandlerId = HandlerId("platform.group.created");
pub const PLATFORM_GROUP_UPDATED: HandlerId = HandlerId("platform.group.updated");
pub const PLATFORM_GROUP_DELETED: HandlerId = HandlerId("platform.group.deleted");

type Reaction<E> = fn(&Live, &E) -> SyncResult<()>;

const CRM_REACTIONS: [(HandlerId, Reaction<CrmEvent>); 7] = [
    (CRM_MEMBERSHIP_ADDED, crm_membership_added),
    (CRM_MEMBERSHIP_REMOVED, crm_membership_removed),
    (CRM_GROUP_CREATED, crm_group_created),
    (CRM_GROUP_UPDATED, crm_group_updated),
    (CRM_GROUP_DELETED, crm_group_deleted),
    (CRM_IDENTITY_LINKED, crm_identity_linked),
    (CRM_PERMISSIONS_CHANGED, crm_permissions_changed),
];

const PLATFORM_REACTIONS: [(HandlerId, Reaction<PlatformEvent>); 5] = [
    (PLATFORM_MEMBERSHIP_ADDED, platform_membership_added),
    (PLATFORM_MEMBERSHIP_REMOVED, platform_membership_removed),
    (PLATFORM_GROUP_CREATED, platform_group_created),
    (PLATFORM_GROUP_UPDATED, platform_group_updated),
    (PLATFORM_GROUP_DELETED, platform_group_deleted),
];

/// Register every bridge handler on both registries' hubs.
///
/// Handlers capture `ctx.extensions` as they are now. Attaching twice
/// replaces the earlier registrations, which is how
/// [`SyncContext::with_extensions`] hands new providers to the bridge.
pub fn attach(ctx: &SyncContext) {
    let links = Links {
        crm: Arc::downgrade(&ctx.crm),
        platform: Arc::downgrade(&ctx.platform),
        extensions: ctx.extensions.clone(),
    };
    for (id, reaction) in CRM_REACTIONS {
        let links = links.clone();
        ctx.crm.events().register(
            id,
            Arc::new(move |event: &CrmEvent| links.react(id, reaction, event)),
        );
    }
    for (id, reaction) in PLATFORM_REACTIONS {
        let links = links.clone();
        ctx.platform.events().register(
            id,
            Arc::new(move |event: &PlatformEvent| links.react(id, reaction, event)),
        );
    }
    tracing::debug!("live bridge attached");
}

/// Remove every bridge handler.
pub fn detach(ctx: &SyncContext) {
    for (id, _) in CRM_REACTIONS {
        ctx.crm.events().deregister(id);
    }
    for (id, _) in PLATFORM_REACTIONS {
        ctx.platform.events().deregister(id);
    }
    tracing::debug!("live bridge detached");
}

pub fn is_attached(ctx: &SyncContext) -> bool {
    CRM_REACTIONS
        .iter()
        .all(|(id, _)| ctx.crm.events().is_registered(*id))
        && PLATFORM_REACTIONS
            .iter()
            .all(|(id, _)| ctx.platform.events().is_registered(*id))
}

#[derive(Clone)]
struct Links {
    crm: Weak<dyn CrmRegistry>,
    platform: Weak<dyn PlatformRegistry>,
    extensions: Extensions,
}

impl Links {
    fn react<E>(&self, id: HandlerId, reaction: Reaction<E>, event: &E) {
        let (Some(crm), Some(platform)) = (self.crm.upgrade(), self.platform.upgrade()) else {
            return;
        };
        let live = Live {
            crm,
            platform,
            extensions: &self.extensions,
        };
        if let Err(err) = reaction(&live, event) {
            tracing::warn!("live sync handler '{id}' failed: {err}");
        }
    }
}

struct Live<'a> {
    crm: Arc<dyn CrmRegistry>,
    platform: Arc<dyn PlatformRegistry>,
    extensions: &'a Extensions,
}

impl Live<'_> {
    fn guard(&self) -> MutationGuard<'_> {
        MutationGuard::new(self.crm.events(), self.platform.events())
    }

    fn resolver(&self) -> IdentityResolver<'_> {
        IdentityResolver::new(self.crm.as_ref(), self.extensions)
    }
}

// ---------------------------------------------------------------------------
// CRM → platform
// ---------------------------------------------------------------------------

fn crm_membership_added(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    let CrmEvent::MembershipAdded { group, contacts } = event else {
        return Ok(());
    };
    let mut resolver = live.resolver();
    let Some(platform_group) = resolver.platform_group_for(*group)? else {
        return Ok(());
    };
    for contact in contacts {
        let Some(user) = resolver.user_for_contact(*contact)? else {
            tracing::info!(
                "Contact ID {contact} has no platform user; not added to group {platform_group}"
            );
            continue;
        };
        live.guard()
            .with_suppressed(Side::Platform, PLATFORM_MEMBERSHIP_ADDED, || {
                live.platform.member_add(user, platform_group)
            })?;
        tracing::info!("Added User ID {user} to platform group {platform_group}");
    }
    Ok(())
}

fn crm_membership_removed(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    let CrmEvent::MembershipRemoved { group, contacts } = event else {
        return Ok(());
    };
    let mut resolver = live.resolver();
    let Some(platform_group) = resolver.platform_group_for(*group)? else {
        return Ok(());
    };
    for contact in contacts {
        let Some(user) = resolver.user_for_contact(*contact)? else {
            continue;
        };
        live.guard()
            .with_suppressed(Side::Platform, PLATFORM_MEMBERSHIP_REMOVED, || {
                live.platform.member_delete(user, platform_group)
            })?;
        tracing::info!("Removed User ID {user} from platform group {platform_group}");
    }
    Ok(())
}

/// A group flagged with the pending marker gets a platform counterpart and
/// is relinked to it.
fn link_pending(live: &Live, group: &CrmGroup) -> SyncResult<()> {
    if GroupMarker::parse(&group.source) != Ok(GroupMarker::Pending) {
        return Ok(());
    }
    let guard = live.guard();
    let created = guard.with_suppressed(Side::Platform, PLATFORM_GROUP_CREATED, || {
        live.platform.group_create(NewPlatformGroup {
            name: group.title.clone(),
            description: group.description.clone(),
            sync: false,
        })
    })?;

    let mut group_types = group.group_types.clone();
    if !group_types.contains(&CrmGroupType::AccessControl) {
        group_types.push(CrmGroupType::AccessControl);
    }
    guard.with_suppressed(Side::Crm, CRM_GROUP_UPDATED, || {
        live.crm.group_update(
            group.id,
            CrmGroupUpdate {
                source: Some(GroupMarker::Linked(created.id).to_string()),
                group_types: Some(group_types),
                ..CrmGroupUpdate::default()
            },
        )
    })?;
    tracing::info!("crm group {} linked to new platform group {}", group.id, created.id);
    Ok(())
}

fn crm_group_created(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    match event {
        CrmEvent::GroupCreated { group } => link_pending(live, group),
        _ => Ok(()),
    }
}

fn crm_group_updated(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    let CrmEvent::GroupUpdated { group } = event else {
        return Ok(());
    };
    let Some(platform_group) = GroupMarker::parse(&group.source).ok().and_then(|m| m.linked())
    else {
        return link_pending(live, group);
    };
    live.guard()
        .with_suppressed(Side::Platform, PLATFORM_GROUP_UPDATED, || {
            live.platform.group_update(
                platform_group,
                PlatformGroupUpdate {
                    name: Some(group.title.clone()),
                    description: Some(group.description.clone()),
                },
            )
        })?;
    Ok(())
}

fn crm_group_deleted(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    let CrmEvent::GroupDeleted { group } = event else {
        return Ok(());
    };
    let Some(platform_group) = GroupMarker::parse(&group.source).ok().and_then(|m| m.linked())
    else {
        return Ok(());
    };
    live.guard()
        .with_suppressed(Side::Platform, PLATFORM_GROUP_DELETED, || {
            live.platform.group_delete(platform_group)
        })?;
    tracing::info!("deleted platform group {platform_group} with crm group {}", group.id);
    Ok(())
}

fn crm_identity_linked(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    let CrmEvent::IdentityLinked { contact, user } = event else {
        return Ok(());
    };
    let mut resolver = live.resolver();
    for group in live.crm.groups_for_contact(*contact)? {
        let Some(platform_group) = resolver.platform_group_for(group.id)? else {
            continue;
        };
        live.guard()
            .with_suppressed(Side::Platform, PLATFORM_MEMBERSHIP_ADDED, || {
                live.platform.member_add(*user, platform_group)
            })?;
        tracing::info!("Added User ID {user} to platform group {platform_group}");
    }
    Ok(())
}

/// New permissions show up as capabilities straight away. Deletion is left
/// to providers that allow it.
fn crm_permissions_changed(live: &Live, event: &CrmEvent) -> SyncResult<()> {
    if !matches!(event, CrmEvent::PermissionsChanged { .. }) {
        return Ok(());
    }
    capabilities::sync_between(
        live.crm.as_ref(),
        live.platform.as_ref(),
        live.extensions,
        false,
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// platform → CRM
// ---------------------------------------------------------------------------

fn matched_contact(
    resolver: &mut IdentityResolver<'_>,
    group: PlatformGroupId,
    user: UserId,
) -> SyncResult<Option<(CrmGroupId, ContactId)>> {
    let Some(crm_group) = resolver.crm_group_for(group)? else {
        return Ok(None);
    };
    let Some(contact) = resolver.contact_for_user(user)? else {
        tracing::info!("User ID {user} has no crm contact; crm group {crm_group} unchanged");
        return Ok(None);
    };
    Ok(Some((crm_group, contact)))
}

fn platform_membership_added(live: &Live, event: &PlatformEvent) -> SyncResult<()> {
    let PlatformEvent::MembershipAdded { group, user } = event else {
        return Ok(());
    };
    let Some((crm_group, contact)) = matched_contact(&mut live.resolver(), *group, *user)? else {
        return Ok(());
    };
    live.guard()
        .with_suppressed(Side::Crm, CRM_MEMBERSHIP_ADDED, || {
            live.crm
                .membership_create(crm_group, contact, MembershipStatus::Added)
        })?;
    tracing::info!("Added Contact ID {contact} to crm group {crm_group}");
    Ok(())
}

fn platform_membership_removed(live: &Live, event: &PlatformEvent) -> SyncResult<()> {
    let PlatformEvent::MembershipRemoved { group, user } = event else {
        return Ok(());
    };
    let Some((crm_group, contact)) = matched_contact(&mut live.resolver(), *group, *user)? else {
        return Ok(());
    };
    let active = live
        .crm
        .membership_get(crm_group, contact)?
        .is_some_and(MembershipStatus::is_active);
    if !active {
        return Ok(());
    }
    live.guard()
        .with_suppressed(Side::Crm, CRM_MEMBERSHIP_REMOVED, || {
            live.crm
                .membership_create(crm_group, contact, MembershipStatus::Removed)
        })?;
    tracing::info!("Removed Contact ID {contact} from crm group {crm_group}");
    Ok(())
}

fn platform_group_created(live: &Live, event: &PlatformEvent) -> SyncResult<()> {
    let PlatformEvent::GroupCreated { group, sync: true } = event else {
        return Ok(());
    };
    let created = live
        .guard()
        .with_suppressed(Side::Crm, CRM_GROUP_CREATED, || {
            live.crm.group_create(crm_group_from(group))
        })?;
    tracing::info!("platform group {} linked to new crm group {}", group.id, created.id);
    Ok(())
}

fn crm_group_from(group: &PlatformGroup) -> NewCrmGroup {
    NewCrmGroup {
        name: group.name.clone(),
        title: group.name.clone(),
        description: group.description.clone(),
        source: GroupMarker::Linked(group.id).to_string(),
        group_types: vec![CrmGroupType::AccessControl],
    }
}

fn platform_group_updated(live: &Live, event: &PlatformEvent) -> SyncResult<()> {
    let PlatformEvent::GroupUpdated { group } = event else {
        return Ok(());
    };
    let Some(crm_group) = live.resolver().crm_group_for(group.id)? else {
        return Ok(());
    };
    live.guard()
        .with_suppressed(Side::Crm, CRM_GROUP_UPDATED, || {
            live.crm.group_update(
                crm_group,
                CrmGroupUpdate {
                    name: Some(group.name.clone()),
                    title: Some(group.name.clone()),
                    description: Some(group.description.clone()),
                    ..CrmGroupUpdate::default()
                },
            )
        })?;
    Ok(())
}

fn platform_group_deleted(live: &Live, event: &PlatformEvent) -> SyncResult<()> {
    let PlatformEvent::GroupDeleted { group } = event else {
        return Ok(());
    };
    let Some(crm_group) = live.resolver().crm_group_for(group.id)? else {
        return Ok(());
    };
    live.guard()
        .with_suppressed(Side::Crm, CRM_GROUP_DELETED, || {
            live.crm.group_delete(crm_group)
        })?;
    tracing::info!("deleted crm group {crm_group} with platform group {}", group.id);
    Ok(())
}
