//! Shared fixtures for engine integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use grouplink_core::{
    ContactId, CrmEvent, CrmGroup, CrmGroupId, CrmGroupUpdate, CrmRegistry, CrmStore, EventHub,
    MembershipEdge, MembershipStatus, NewCrmGroup, NewPlatformGroup, PlatformEvent, PlatformGroup,
    PlatformGroupId, PlatformGroupUpdate, PlatformRegistry, PlatformStore, RegistryError,
    RegistryResult, Side, UserId,
};
use grouplink_sync::{BatchStore, SyncContext};
use parking_lot::Mutex;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Platform registry wrapper that can go offline or reject chosen writes.
pub struct FlakyPlatform {
    pub inner: PlatformStore,
    pub offline: AtomicBool,
    pub reject_adds: Mutex<HashSet<UserId>>,
    pub reject_deletes: Mutex<HashSet<UserId>>,
    /// `member_add` calls made through the wrapper.
    pub adds: AtomicUsize,
}

impl FlakyPlatform {
    pub fn new() -> Self {
        Self {
            inner: PlatformStore::in_memory(),
            offline: AtomicBool::new(false),
            reject_adds: Mutex::new(HashSet::new()),
            reject_deletes: Mutex::new(HashSet::new()),
            adds: AtomicUsize::new(0),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn reject_add(&self, user: UserId) {
        self.reject_adds.lock().insert(user);
    }

    pub fn reject_delete(&self, user: UserId) {
        self.reject_deletes.lock().insert(user);
    }

    fn check(&self) -> RegistryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RegistryError::unavailable(Side::Platform, "simulated outage"))
        } else {
            Ok(())
        }
    }
}

impl PlatformRegistry for FlakyPlatform {
    fn group_create(&self, group: NewPlatformGroup) -> RegistryResult<PlatformGroup> {
        self.check()?;
        self.inner.group_create(group)
    }

    fn group_read(&self, id: PlatformGroupId) -> RegistryResult<Option<PlatformGroup>> {
        self.check()?;
        self.inner.group_read(id)
    }

    fn group_update(
        &self,
        id: PlatformGroupId,
        changes: PlatformGroupUpdate,
    ) -> RegistryResult<PlatformGroup> {
        self.check()?;
        self.inner.group_update(id, changes)
    }

    fn group_delete(&self, id: PlatformGroupId) -> RegistryResult<()> {
        self.check()?;
        self.inner.group_delete(id)
    }

    fn groups(&self) -> RegistryResult<Vec<PlatformGroup>> {
        self.check()?;
        self.inner.groups()
    }

    fn member_exists(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<bool> {
        self.check()?;
        self.inner.member_exists(user, group)
    }

    fn member_add(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<()> {
        self.check()?;
        self.adds.fetch_add(1, Ordering::SeqCst);
        if self.reject_adds.lock().contains(&user) {
            return Err(RegistryError::Rejected {
                side: Side::Platform,
                reason: format!("user {user} is blocked"),
            });
        }
        self.inner.member_add(user, group)
    }

    fn member_delete(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<()> {
        self.check()?;
        if self.reject_deletes.lock().contains(&user) {
            return Err(RegistryError::Rejected {
                side: Side::Platform,
                reason: format!("user {user} is protected"),
            });
        }
        self.inner.member_delete(user, group)
    }

    fn group_members(&self, group: PlatformGroupId) -> RegistryResult<Vec<UserId>> {
        self.check()?;
        self.inner.group_members(group)
    }

    fn memberships_page(
        &self,
        groups: &[PlatformGroupId],
        limit: u64,
        offset: u64,
    ) -> RegistryResult<Vec<MembershipEdge<PlatformGroupId, UserId>>> {
        self.check()?;
        self.inner.memberships_page(groups, limit, offset)
    }

    fn memberships_count(&self, groups: &[PlatformGroupId]) -> RegistryResult<u64> {
        self.check()?;
        self.inner.memberships_count(groups)
    }

    fn capabilities(&self) -> RegistryResult<Vec<String>> {
        self.check()?;
        self.inner.capabilities()
    }

    fn capability_create(&self, name: &str) -> RegistryResult<bool> {
        self.check()?;
        self.inner.capability_create(name)
    }

    fn capability_delete(&self, name: &str) -> RegistryResult<bool> {
        self.check()?;
        self.inner.capability_delete(name)
    }

    fn capability_snapshot(&self) -> RegistryResult<Vec<String>> {
        self.check()?;
        self.inner.capability_snapshot()
    }

    fn capability_snapshot_store(&self, names: &[String]) -> RegistryResult<()> {
        self.check()?;
        self.inner.capability_snapshot_store(names)
    }

    fn events(&self) -> &EventHub<PlatformEvent> {
        self.inner.events()
    }
}

/// CRM wrapper that can go offline.
pub struct FlakyCrm {
    pub inner: CrmStore,
    pub offline: AtomicBool,
}

impl FlakyCrm {
    pub fn new() -> Self {
        Self {
            inner: CrmStore::in_memory(),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> RegistryResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RegistryError::unavailable(Side::Crm, "simulated outage"))
        } else {
            Ok(())
        }
    }
}

impl CrmRegistry for FlakyCrm {
    fn group_get(&self, id: CrmGroupId) -> RegistryResult<Option<CrmGroup>> {
        self.check()?;
        self.inner.group_get(id)
    }

    fn group_find_by_marker(&self, marker: &str) -> RegistryResult<Option<CrmGroup>> {
        self.check()?;
        self.inner.group_find_by_marker(marker)
    }

    fn groups_synced(&self) -> RegistryResult<Vec<CrmGroup>> {
        self.check()?;
        self.inner.groups_synced()
    }

    fn groups_for_contact(&self, contact: ContactId) -> RegistryResult<Vec<CrmGroup>> {
        self.check()?;
        self.inner.groups_for_contact(contact)
    }

    fn group_create(&self, group: NewCrmGroup) -> RegistryResult<CrmGroup> {
        self.check()?;
        self.inner.group_create(group)
    }

    fn group_update(&self, id: CrmGroupId, changes: CrmGroupUpdate) -> RegistryResult<CrmGroup> {
        self.check()?;
        self.inner.group_update(id, changes)
    }

    fn group_delete(&self, id: CrmGroupId) -> RegistryResult<()> {
        self.check()?;
        self.inner.group_delete(id)
    }

    fn membership_get(
        &self,
        group: CrmGroupId,
        contact: ContactId,
    ) -> RegistryResult<Option<MembershipStatus>> {
        self.check()?;
        self.inner.membership_get(group, contact)
    }

    fn membership_create(
        &self,
        group: CrmGroupId,
        contact: ContactId,
        status: MembershipStatus,
    ) -> RegistryResult<()> {
        self.check()?;
        self.inner.membership_create(group, contact, status)
    }

    fn membership_list(&self, group: CrmGroupId) -> RegistryResult<Vec<ContactId>> {
        self.check()?;
        self.inner.membership_list(group)
    }

    fn memberships_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> RegistryResult<Vec<MembershipEdge<CrmGroupId, ContactId>>> {
        self.check()?;
        self.inner.memberships_page(limit, offset)
    }

    fn memberships_count(&self) -> RegistryResult<u64> {
        self.check()?;
        self.inner.memberships_count()
    }

    fn contact_for_login(&self, user: UserId) -> RegistryResult<Option<ContactId>> {
        self.check()?;
        self.inner.contact_for_login(user)
    }

    fn login_for_contact(&self, contact: ContactId) -> RegistryResult<Option<UserId>> {
        self.check()?;
        self.inner.login_for_contact(contact)
    }

    fn identity_link(&self, contact: ContactId, user: UserId) -> RegistryResult<()> {
        self.check()?;
        self.inner.identity_link(contact, user)
    }

    fn permissions(&self) -> RegistryResult<Vec<String>> {
        self.check()?;
        self.inner.permissions()
    }

    fn events(&self) -> &EventHub<CrmEvent> {
        self.inner.events()
    }
}

/// Two registries, a batch directory and one linked pair of groups.
pub struct World {
    pub home: TempDir,
    pub crm: Arc<FlakyCrm>,
    pub platform: Arc<FlakyPlatform>,
    pub ctx: SyncContext,
    pub crm_group: CrmGroupId,
    pub platform_group: PlatformGroupId,
}

impl World {
    pub fn new() -> Self {
        init_logging();
        let home = TempDir::new().expect("home");
        let crm = Arc::new(FlakyCrm::new());
        let platform = Arc::new(FlakyPlatform::new());
        let ctx = SyncContext::new(
            crm.clone(),
            platform.clone(),
            BatchStore::at(home.path()),
        );
        let (crm_group, platform_group) = link_pair(&ctx, "Staff");
        Self {
            home,
            crm,
            platform,
            ctx,
            crm_group,
            platform_group,
        }
    }

    /// Contact `n` matched to user `100 + n`.
    pub fn person(&self, n: u64) -> (ContactId, UserId) {
        let pair = (ContactId(n), UserId(100 + n));
        self.crm.inner.identity_link(pair.0, pair.1).expect("link");
        pair
    }

    pub fn crm_add(&self, group: CrmGroupId, contact: ContactId) {
        self.crm
            .inner
            .membership_create(group, contact, MembershipStatus::Added)
            .expect("crm add");
    }

    pub fn platform_add(&self, group: PlatformGroupId, user: UserId) {
        self.platform.inner.member_add(user, group).expect("platform add");
    }

    pub fn crm_members(&self, group: CrmGroupId) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .crm
            .inner
            .membership_list(group)
            .expect("crm members")
            .into_iter()
            .map(u64::from)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn platform_members(&self, group: PlatformGroupId) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .platform
            .inner
            .group_members(group)
            .expect("platform members")
            .into_iter()
            .map(u64::from)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Create a platform group and a CRM group carrying its marker.
pub fn link_pair(ctx: &SyncContext, name: &str) -> (CrmGroupId, PlatformGroupId) {
    let platform_group = ctx
        .platform
        .group_create(NewPlatformGroup {
            name: name.to_string(),
            ..NewPlatformGroup::default()
        })
        .expect("platform group");
    let crm_group = ctx
        .crm
        .group_create(NewCrmGroup {
            name: name.to_string(),
            source: format!("synced-group-{}", platform_group.id),
            ..NewCrmGroup::default()
        })
        .expect("crm group");
    (crm_group.id, platform_group.id)
}
