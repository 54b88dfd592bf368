//! Maps groups and identities across the two registries.
//!
//! A resolver lives for one engine invocation and memoises every lookup it
//! makes, including misses, so a page of rows never asks the registry the
//! same question twice.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use grouplink_core::{
    marker::MarkerError, Authority, ContactId, CrmGroup, CrmGroupId, CrmRegistry, GroupMarker,
    PlatformGroupId, SyncedGroupPair, UserId,
};

use crate::context::Extensions;
use crate::diff::IdentityMap;
use crate::error::{SyncError, SyncResult};

/// A group on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupRef {
    Crm(CrmGroupId),
    Platform(PlatformGroupId),
}

/// A member identity on either side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityRef {
    Contact(ContactId),
    User(UserId),
}

pub struct IdentityResolver<'a> {
    crm: &'a dyn CrmRegistry,
    extensions: &'a Extensions,
    platform_groups: HashMap<CrmGroupId, Option<PlatformGroupId>>,
    /// Which CRM group holds each platform group, read once per resolver.
    claims: Option<HashMap<PlatformGroupId, CrmGroupId>>,
    users: HashMap<ContactId, Option<UserId>>,
    contacts: HashMap<UserId, Option<ContactId>>,
}

impl<'a> IdentityResolver<'a> {
    pub fn new(crm: &'a dyn CrmRegistry, extensions: &'a Extensions) -> Self {
        Self {
            crm,
            extensions,
            platform_groups: HashMap::new(),
            claims: None,
            users: HashMap::new(),
            contacts: HashMap::new(),
        }
    }

    /// The counterpart of `group` on the other side, if it is synced.
    pub fn resolve_group(&mut self, group: GroupRef) -> SyncResult<Option<GroupRef>> {
        Ok(match group {
            GroupRef::Crm(id) => self.platform_group_for(id)?.map(GroupRef::Platform),
            GroupRef::Platform(id) => self.crm_group_for(id)?.map(GroupRef::Crm),
        })
    }

    /// The counterpart of `identity` on the other side, if matched.
    pub fn resolve_identity(&mut self, identity: IdentityRef) -> SyncResult<Option<IdentityRef>> {
        Ok(match identity {
            IdentityRef::Contact(id) => self.user_for_contact(id)?.map(IdentityRef::User),
            IdentityRef::User(id) => self.contact_for_user(id)?.map(IdentityRef::Contact),
        })
    }

    /// The platform group `group` is linked to. A CRM group whose marker
    /// names a platform group already claimed by a lower CRM group resolves
    /// to nothing.
    pub fn platform_group_for(&mut self, group: CrmGroupId) -> SyncResult<Option<PlatformGroupId>> {
        if let Some(hit) = self.platform_groups.get(&group) {
            return Ok(*hit);
        }
        let mut linked = match self.crm.group_get(group)? {
            Some(found) => linked_platform_group(group, &found.source),
            None => None,
        };
        if let Some(platform_group) = linked {
            let holder = self.crm_group_for(platform_group)?;
            if holder != Some(group) {
                tracing::warn!(
                    "crm group {group} claims platform group {platform_group} held by {}; skipped",
                    holder.map_or_else(|| "no group".to_string(), |id| format!("crm group {id}"))
                );
                linked = None;
            }
        }
        self.platform_groups.insert(group, linked);
        Ok(linked)
    }

    pub fn crm_group_for(&mut self, group: PlatformGroupId) -> SyncResult<Option<CrmGroupId>> {
        if self.claims.is_none() {
            let links = winning_links(self.crm.groups_synced()?);
            self.claims = Some(links.into_iter().map(|(crm, platform)| (platform, crm)).collect());
        }
        Ok(self
            .claims
            .as_ref()
            .and_then(|claims| claims.get(&group).copied()))
    }

    pub fn user_for_contact(&mut self, contact: ContactId) -> SyncResult<Option<UserId>> {
        if let Some(hit) = self.users.get(&contact) {
            return Ok(*hit);
        }
        let mut found = self.crm.login_for_contact(contact)?;
        if found.is_none() {
            for provider in self.extensions.identity_providers() {
                found = provider.user_for_contact(contact)?;
                if found.is_some() {
                    break;
                }
            }
        }
        self.users.insert(contact, found);
        Ok(found)
    }

    pub fn contact_for_user(&mut self, user: UserId) -> SyncResult<Option<ContactId>> {
        if let Some(hit) = self.contacts.get(&user) {
            return Ok(*hit);
        }
        let mut found = self.crm.contact_for_login(user)?;
        if found.is_none() {
            for provider in self.extensions.identity_providers() {
                found = provider.contact_for_user(user)?;
                if found.is_some() {
                    break;
                }
            }
        }
        self.contacts.insert(user, found);
        Ok(found)
    }

    /// Every linked pair, re-read from the CRM on each call.
    ///
    /// Pending and malformed markers are skipped. When two CRM groups claim
    /// the same platform group the lower id wins.
    pub fn list_synced_groups(&mut self) -> SyncResult<impl Iterator<Item = SyncedGroupPair>> {
        let links = winning_links(self.crm.groups_synced()?);
        let mut claims = HashMap::with_capacity(links.len());
        for &(crm_group, platform_group) in &links {
            self.platform_groups.insert(crm_group, Some(platform_group));
            claims.insert(platform_group, crm_group);
        }
        self.claims = Some(claims);
        Ok(links
            .into_iter()
            .map(|(crm_group, platform_group)| SyncedGroupPair {
                crm_group,
                platform_group,
                authority: Authority::Crm,
            }))
    }
}

/// Linked `(crm, platform)` groups in listing order. A platform group
/// claimed twice stays with the first claimant.
fn winning_links(groups: Vec<CrmGroup>) -> Vec<(CrmGroupId, PlatformGroupId)> {
    let mut holders: HashMap<PlatformGroupId, CrmGroupId> = HashMap::new();
    let mut links = Vec::new();
    for group in groups {
        let Some(platform_group) = linked_platform_group(group.id, &group.source) else {
            continue;
        };
        match holders.entry(platform_group) {
            Entry::Occupied(holder) => tracing::warn!(
                "crm group {} also claims platform group {platform_group} (held by {}); skipped",
                group.id,
                holder.get()
            ),
            Entry::Vacant(slot) => {
                slot.insert(group.id);
                links.push((group.id, platform_group));
            }
        }
    }
    links
}

fn linked_platform_group(group: CrmGroupId, source: &str) -> Option<PlatformGroupId> {
    match GroupMarker::parse(source) {
        Ok(marker) => marker.linked(),
        Err(MarkerError::Malformed(raw)) => {
            tracing::debug!("crm group {group} has malformed sync marker '{raw}'");
            None
        }
        Err(MarkerError::Absent(_)) => None,
    }
}

impl IdentityMap<ContactId, UserId> for IdentityResolver<'_> {
    type Error = SyncError;

    fn forward(&mut self, source: ContactId) -> SyncResult<Option<UserId>> {
        self.user_for_contact(source)
    }

    fn inverse(&mut self, target: UserId) -> SyncResult<Option<ContactId>> {
        self.contact_for_user(target)
    }
}

impl IdentityMap<UserId, ContactId> for IdentityResolver<'_> {
    type Error = SyncError;

    fn forward(&mut self, source: UserId) -> SyncResult<Option<ContactId>> {
        self.contact_for_user(source)
    }

    fn inverse(&mut self, target: ContactId) -> SyncResult<Option<UserId>> {
        self.user_for_contact(target)
    }
}

/// Group lookup from one side's id type to the other's.
pub trait Counterpart<S, T> {
    fn counterpart(&mut self, id: S) -> SyncResult<Option<T>>;
}

impl Counterpart<CrmGroupId, PlatformGroupId> for IdentityResolver<'_> {
    fn counterpart(&mut self, id: CrmGroupId) -> SyncResult<Option<PlatformGroupId>> {
        self.platform_group_for(id)
    }
}

impl Counterpart<PlatformGroupId, CrmGroupId> for IdentityResolver<'_> {
    fn counterpart(&mut self, id: PlatformGroupId) -> SyncResult<Option<CrmGroupId>> {
        self.crm_group_for(id)
    }
}
