//! Live bridge: external writes propagate, engine writes do not echo.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::World;
use grouplink_core::{
    ContactId, CrmGroupType, CrmGroupUpdate, CrmRegistry, Direction, MembershipStatus,
    NewCrmGroup, NewPlatformGroup, PlatformRegistry, UserId,
};
use grouplink_sync::{live, run_full, IdentityProvider, SyncContext};

fn attached() -> World {
    let w = World::new();
    live::attach(&w.ctx);
    w
}

#[test]
fn crm_membership_changes_reach_platform() {
    let w = attached();
    let (contact, _) = w.person(1);
    w.crm_add(w.crm_group, contact);
    assert_eq!(w.platform_members(w.platform_group), vec![101]);

    w.crm
        .inner
        .membership_create(w.crm_group, contact, MembershipStatus::Removed)
        .expect("remove");
    assert!(w.platform_members(w.platform_group).is_empty());
}

#[test]
fn platform_membership_changes_reach_crm() {
    let w = attached();
    let (contact, user) = w.person(2);
    w.platform_add(w.platform_group, user);
    assert_eq!(w.crm_members(w.crm_group), vec![2]);

    w.platform
        .inner
        .member_delete(user, w.platform_group)
        .expect("delete");
    assert_eq!(
        w.crm.inner.membership_get(w.crm_group, contact).unwrap(),
        Some(MembershipStatus::Removed)
    );
}

#[test]
fn pending_crm_group_creates_and_links_platform_group() {
    let w = attached();
    let group = w
        .ctx
        .crm
        .group_create(NewCrmGroup {
            name: "volunteers".to_string(),
            title: "Volunteers".to_string(),
            source: "synced-group".to_string(),
            ..NewCrmGroup::default()
        })
        .expect("create");

    let linked = w.ctx.crm.group_get(group.id).unwrap().expect("group");
    let platform_id = linked.source.trim_start_matches("synced-group-");
    let platform_group = w
        .ctx
        .platform
        .group_read(platform_id.parse::<u64>().expect("linked id").into())
        .unwrap()
        .expect("platform group");
    assert_eq!(platform_group.name, "Volunteers");
    assert!(linked.group_types.contains(&CrmGroupType::AccessControl));
}

#[test]
fn flagged_platform_group_creates_crm_group() {
    let w = attached();
    let created = w
        .ctx
        .platform
        .group_create(NewPlatformGroup {
            name: "Editors".to_string(),
            description: Some("Site editors".to_string()),
            sync: true,
        })
        .expect("create");

    let crm_group = w
        .ctx
        .crm
        .group_find_by_marker(&format!("synced-group-{}", created.id))
        .unwrap()
        .expect("crm group");
    assert_eq!(crm_group.title, "Editors");
    assert_eq!(crm_group.description.as_deref(), Some("Site editors"));
}

#[test]
fn group_renames_and_deletes_follow_the_link() {
    let w = attached();
    w.ctx
        .crm
        .group_update(
            w.crm_group,
            CrmGroupUpdate {
                title: Some("All staff".to_string()),
                ..CrmGroupUpdate::default()
            },
        )
        .expect("rename");
    let platform_group = w.ctx.platform.group_read(w.platform_group).unwrap().expect("group");
    assert_eq!(platform_group.name, "All staff");

    w.ctx.platform.group_delete(w.platform_group).expect("delete");
    assert!(w.ctx.crm.group_get(w.crm_group).unwrap().is_none());
}

#[test]
fn identity_link_adds_user_to_synced_groups() {
    let w = attached();
    w.crm_add(w.crm_group, ContactId(8));
    assert!(w.platform_members(w.platform_group).is_empty());

    w.ctx.crm.identity_link(ContactId(8), UserId(108)).expect("link");
    assert_eq!(w.platform_members(w.platform_group), vec![108]);
}

#[test]
fn engine_writes_do_not_echo() {
    let w = World::new();
    let (_, user) = w.person(1);
    w.platform_add(w.platform_group, user);
    live::attach(&w.ctx);

    run_full(&w.ctx, Direction::PlatformToCrm).expect("full");

    assert_eq!(w.crm_members(w.crm_group), vec![1]);
    assert_eq!(w.platform.adds.load(Ordering::SeqCst), 0);
    assert!(live::is_attached(&w.ctx));
}

#[test]
fn detach_stops_mirroring() {
    let w = attached();
    live::detach(&w.ctx);
    assert!(!live::is_attached(&w.ctx));
    let (contact, _) = w.person(3);
    w.crm_add(w.crm_group, contact);
    assert!(w.platform_members(w.platform_group).is_empty());
}

#[test]
fn handler_failures_do_not_fail_the_write() {
    let w = attached();
    let (contact, _) = w.person(4);
    w.platform.set_offline(true);
    w.crm_add(w.crm_group, contact);
    w.platform.set_offline(false);
    assert_eq!(w.crm_members(w.crm_group), vec![4]);
    assert!(w.platform_members(w.platform_group).is_empty());
}

#[test]
fn registered_provider_matches_unlinked_contacts() {
    struct Offset;
    impl IdentityProvider for Offset {
        fn user_for_contact(
            &self,
            contact: ContactId,
        ) -> grouplink_core::RegistryResult<Option<UserId>> {
            Ok(Some(UserId(contact.0 + 500)))
        }
    }

    let w = World::new();
    let mut extensions = grouplink_sync::Extensions::new();
    extensions.register_identity_provider(Arc::new(Offset));
    let ctx: SyncContext = w.ctx.clone().with_extensions(extensions);
    live::attach(&ctx);

    w.crm_add(w.crm_group, ContactId(5));
    assert_eq!(w.platform_members(w.platform_group), vec![505]);
}

#[test]
fn providers_registered_after_attach_reach_the_bridge() {
    struct Offset;
    impl IdentityProvider for Offset {
        fn user_for_contact(
            &self,
            contact: ContactId,
        ) -> grouplink_core::RegistryResult<Option<UserId>> {
            Ok(Some(UserId(contact.0 + 700)))
        }
    }

    let w = attached();
    let mut extensions = grouplink_sync::Extensions::new();
    extensions.register_identity_provider(Arc::new(Offset));
    let ctx: SyncContext = w.ctx.clone().with_extensions(extensions);
    assert!(live::is_attached(&ctx));

    w.crm_add(w.crm_group, ContactId(6));
    assert_eq!(w.platform_members(w.platform_group), vec![706]);
}

#[test]
fn permission_changes_create_capabilities() {
    let w = attached();

    w.crm
        .inner
        .permissions_set(["access CiviCRM", "edit groups"])
        .expect("permissions");
    assert_eq!(
        w.platform.inner.capabilities().expect("capabilities"),
        vec!["access_civicrm".to_string(), "edit_groups".to_string()]
    );

    w.crm.inner.permissions_set(["access CiviCRM"]).expect("permissions");
    assert_eq!(w.platform.inner.capabilities().expect("capabilities").len(), 2);
}
