//! One registry seen as a source or target of membership rows.
//!
//! Both directions run the same phase code; an [`Endpoint`] hides which
//! registry calls list, add and remove a membership on its side. Writes are
//! made with the live bridge's mirror handler for that side suppressed.

use std::fmt;
use std::hash::Hash;

use grouplink_core::{
    ContactId, CrmGroupId, CrmRegistry, MembershipEdge, MembershipStatus, PlatformGroupId,
    PlatformRegistry, RegistryResult, Side, SyncedGroupPair, UserId,
};

use crate::guard::MutationGuard;
use crate::live;

pub(crate) trait Endpoint {
    type Group: Copy + Eq + Hash + Into<u64> + fmt::Display;
    type Member: Copy + Eq + Hash + Into<u64> + fmt::Display;

    const SIDE: Side;

    /// This side's group of a linked pair.
    fn group_in(pair: &SyncedGroupPair) -> Self::Group;

    /// Active memberships of synced groups, ordered by group.
    fn page(&self, limit: u64, offset: u64)
        -> RegistryResult<Vec<MembershipEdge<Self::Group, Self::Member>>>;

    fn total(&self) -> RegistryResult<u64>;

    fn members(&self, group: Self::Group) -> RegistryResult<Vec<Self::Member>>;

    fn add_member(&self, group: Self::Group, member: Self::Member) -> RegistryResult<()>;

    fn remove_member(&self, group: Self::Group, member: Self::Member) -> RegistryResult<()>;
}

pub(crate) struct CrmEndpoint<'a> {
    registry: &'a dyn CrmRegistry,
    guard: MutationGuard<'a>,
}

impl<'a> CrmEndpoint<'a> {
    pub(crate) fn new(registry: &'a dyn CrmRegistry, guard: MutationGuard<'a>) -> Self {
        Self { registry, guard }
    }
}

impl Endpoint for CrmEndpoint<'_> {
    type Group = CrmGroupId;
    type Member = ContactId;

    const SIDE: Side = Side::Crm;

    fn group_in(pair: &SyncedGroupPair) -> CrmGroupId {
        pair.crm_group
    }

    fn page(&self, limit: u64, offset: u64) -> RegistryResult<Vec<MembershipEdge<CrmGroupId, ContactId>>> {
        self.registry.memberships_page(limit, offset)
    }

    fn total(&self) -> RegistryResult<u64> {
        self.registry.memberships_count()
    }

    fn members(&self, group: CrmGroupId) -> RegistryResult<Vec<ContactId>> {
        self.registry.membership_list(group)
    }

    fn add_member(&self, group: CrmGroupId, member: ContactId) -> RegistryResult<()> {
        self.guard.with_suppressed(Side::Crm, live::CRM_MEMBERSHIP_ADDED, || {
            self.registry
                .membership_create(group, member, MembershipStatus::Added)
        })
    }

    fn remove_member(&self, group: CrmGroupId, member: ContactId) -> RegistryResult<()> {
        self.guard.with_suppressed(Side::Crm, live::CRM_MEMBERSHIP_REMOVED, || {
            self.registry
                .membership_create(group, member, MembershipStatus::Removed)
        })
    }
}

pub(crate) struct PlatformEndpoint<'a> {
    registry: &'a dyn PlatformRegistry,
    guard: MutationGuard<'a>,
    synced: Vec<PlatformGroupId>,
}

impl<'a> PlatformEndpoint<'a> {
    /// `synced` limits paging to the platform groups of linked pairs.
    pub(crate) fn new(
        registry: &'a dyn PlatformRegistry,
        guard: MutationGuard<'a>,
        synced: Vec<PlatformGroupId>,
    ) -> Self {
        Self {
            registry,
            guard,
            synced,
        }
    }
}

impl Endpoint for PlatformEndpoint<'_> {
    type Group = PlatformGroupId;
    type Member = UserId;

    const SIDE: Side = Side::Platform;

    fn group_in(pair: &SyncedGroupPair) -> PlatformGroupId {
        pair.platform_group
    }

    fn page(&self, limit: u64, offset: u64) -> RegistryResult<Vec<MembershipEdge<PlatformGroupId, UserId>>> {
        self.registry.memberships_page(&self.synced, limit, offset)
    }

    fn total(&self) -> RegistryResult<u64> {
        self.registry.memberships_count(&self.synced)
    }

    fn members(&self, group: PlatformGroupId) -> RegistryResult<Vec<UserId>> {
        self.registry.group_members(group)
    }

    fn add_member(&self, group: PlatformGroupId, member: UserId) -> RegistryResult<()> {
        self.guard
            .with_suppressed(Side::Platform, live::PLATFORM_MEMBERSHIP_ADDED, || {
                self.registry.member_add(member, group)
            })
    }

    fn remove_member(&self, group: PlatformGroupId, member: UserId) -> RegistryResult<()> {
        self.guard
            .with_suppressed(Side::Platform, live::PLATFORM_MEMBERSHIP_REMOVED, || {
                self.registry.member_delete(member, group)
            })
    }
}
