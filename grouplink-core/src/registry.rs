//! The narrow operations the engine needs from each registry.
//!
//! Both traits are object safe; the engine holds them as
//! `Arc<dyn CrmRegistry>` / `Arc<dyn PlatformRegistry>`. Paged listings use
//! `limit == 0` to mean "no limit".

use crate::error::RegistryResult;
use crate::events::{CrmEvent, EventHub, PlatformEvent};
use crate::types::{
    ContactId, CrmGroup, CrmGroupId, CrmGroupUpdate, MembershipEdge, MembershipStatus,
    NewCrmGroup, NewPlatformGroup, PlatformGroup, PlatformGroupId, PlatformGroupUpdate, UserId,
};

/// Registry A: the authoritative CRM-like store.
pub trait CrmRegistry: Send + Sync {
    fn group_get(&self, id: CrmGroupId) -> RegistryResult<Option<CrmGroup>>;

    /// First group whose `source` equals `marker` exactly.
    fn group_find_by_marker(&self, marker: &str) -> RegistryResult<Option<CrmGroup>>;

    /// Every group whose `source` contains the sync marker, ordered by id.
    fn groups_synced(&self) -> RegistryResult<Vec<CrmGroup>>;

    /// Groups in which `contact` is an active member, ordered by id.
    fn groups_for_contact(&self, contact: ContactId) -> RegistryResult<Vec<CrmGroup>>;

    fn group_create(&self, group: NewCrmGroup) -> RegistryResult<CrmGroup>;

    fn group_update(&self, id: CrmGroupId, changes: CrmGroupUpdate) -> RegistryResult<CrmGroup>;

    /// Delete a group and all of its group contacts.
    fn group_delete(&self, id: CrmGroupId) -> RegistryResult<()>;

    fn membership_get(
        &self,
        group: CrmGroupId,
        contact: ContactId,
    ) -> RegistryResult<Option<MembershipStatus>>;

    /// Create or update a group contact with `status`.
    fn membership_create(
        &self,
        group: CrmGroupId,
        contact: ContactId,
        status: MembershipStatus,
    ) -> RegistryResult<()>;

    /// Active members of `group`, in insertion order.
    fn membership_list(&self, group: CrmGroupId) -> RegistryResult<Vec<ContactId>>;

    /// Active memberships of synced groups, ordered by group then insertion.
    fn memberships_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> RegistryResult<Vec<MembershipEdge<CrmGroupId, ContactId>>>;

    fn memberships_count(&self) -> RegistryResult<u64>;

    /// Contact matched to a login account.
    fn contact_for_login(&self, user: UserId) -> RegistryResult<Option<ContactId>>;

    /// Login account matched to a contact.
    fn login_for_contact(&self, contact: ContactId) -> RegistryResult<Option<UserId>>;

    /// Record that `contact` and `user` are the same person.
    fn identity_link(&self, contact: ContactId, user: UserId) -> RegistryResult<()>;

    /// Names of the permissions currently enabled, in registry order.
    fn permissions(&self) -> RegistryResult<Vec<String>>;

    fn events(&self) -> &EventHub<CrmEvent>;
}

/// Registry B: the web-platform group store.
pub trait PlatformRegistry: Send + Sync {
    fn group_create(&self, group: NewPlatformGroup) -> RegistryResult<PlatformGroup>;

    fn group_read(&self, id: PlatformGroupId) -> RegistryResult<Option<PlatformGroup>>;

    fn group_update(
        &self,
        id: PlatformGroupId,
        changes: PlatformGroupUpdate,
    ) -> RegistryResult<PlatformGroup>;

    /// Delete a group and all of its memberships.
    fn group_delete(&self, id: PlatformGroupId) -> RegistryResult<()>;

    fn groups(&self) -> RegistryResult<Vec<PlatformGroup>>;

    fn member_exists(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<bool>;

    /// Add `user` to `group`. Succeeds without change when already a member.
    fn member_add(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<()>;

    /// Remove `user` from `group`. Succeeds without change when absent.
    fn member_delete(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<()>;

    fn group_members(&self, group: PlatformGroupId) -> RegistryResult<Vec<UserId>>;

    /// Memberships of `groups`, ordered by group then insertion.
    fn memberships_page(
        &self,
        groups: &[PlatformGroupId],
        limit: u64,
        offset: u64,
    ) -> RegistryResult<Vec<MembershipEdge<PlatformGroupId, UserId>>>;

    fn memberships_count(&self, groups: &[PlatformGroupId]) -> RegistryResult<u64>;

    /// Every capability the platform knows, sorted.
    fn capabilities(&self) -> RegistryResult<Vec<String>>;

    /// Returns `false` when the capability already existed.
    fn capability_create(&self, name: &str) -> RegistryResult<bool>;

    /// Returns `false` when there was nothing to delete.
    fn capability_delete(&self, name: &str) -> RegistryResult<bool>;

    /// Capability names recorded by the last sync that was allowed to
    /// delete, or empty when none was recorded.
    fn capability_snapshot(&self) -> RegistryResult<Vec<String>>;

    fn capability_snapshot_store(&self, names: &[String]) -> RegistryResult<()>;

    fn events(&self) -> &EventHub<PlatformEvent>;
}

/// Apply `limit`/`offset` to an already ordered listing.
pub fn page<T>(items: impl IntoIterator<Item = T>, limit: u64, offset: u64) -> Vec<T> {
    let skipped = items.into_iter().skip(offset as usize);
    if limit == 0 {
        skipped.collect()
    } else {
        skipped.take(limit as usize).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::page;

    #[test]
    fn zero_limit_means_everything_after_offset() {
        assert_eq!(page(1..=5, 0, 2), vec![3, 4, 5]);
    }

    #[test]
    fn limit_caps_page() {
        assert_eq!(page(1..=5, 2, 0), vec![1, 2]);
        assert_eq!(page(1..=5, 2, 4), vec![5]);
        assert!(page(1..=5, 2, 6).is_empty());
    }
}
