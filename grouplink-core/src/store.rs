//! YAML file-backed implementations of both registry traits.
//!
//! A store either lives purely in memory or mirrors one YAML document on
//! disk. File-backed stores re-read the document before every operation and
//! write it back atomically after every mutation, so several processes (CLI
//! invocations, the daemon) observe each other's writes. A document that
//! cannot be read or parsed makes the registry *unavailable*; the engine
//! retries later instead of acting on partial data.
//!
//! Events are emitted after the write is durable and after the store lock is
//! released, so handlers are free to call back into either store.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, RegistryResult};
use crate::events::{CrmEvent, EventHub, PlatformEvent};
use crate::marker;
use crate::paths::{self, write_atomic};
use crate::registry::{page, CrmRegistry, PlatformRegistry};
use crate::types::{
    ContactId, CrmGroup, CrmGroupId, CrmGroupUpdate, MembershipEdge, MembershipStatus,
    NewCrmGroup, NewPlatformGroup, PlatformGroup, PlatformGroupId, PlatformGroupUpdate, Side,
    UserId,
};

// ---------------------------------------------------------------------------
// 1. Backing document
// ---------------------------------------------------------------------------

struct Backing<D> {
    side: Side,
    path: Option<PathBuf>,
    state: Mutex<D>,
}

impl<D> Backing<D>
where
    D: Default + Serialize + DeserializeOwned,
{
    fn new(side: Side, path: Option<PathBuf>) -> Self {
        Self {
            side,
            path,
            state: Mutex::new(D::default()),
        }
    }

    fn refresh(&self, state: &mut D) -> RegistryResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !path.exists() {
            *state = D::default();
            return Ok(());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RegistryError::unavailable(self.side, format!("cannot read {}: {e}", path.display()))
        })?;
        *state = serde_yaml::from_str(&contents).map_err(|e| {
            RegistryError::unavailable(self.side, format!("cannot parse {}: {e}", path.display()))
        })?;
        Ok(())
    }

    fn persist(&self, state: &D) -> RegistryResult<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        let yaml = serde_yaml::to_string(state)?;
        write_atomic(path, &yaml).map_err(|e| {
            RegistryError::unavailable(self.side, format!("cannot write {}: {e}", path.display()))
        })
    }

    fn read<R>(&self, f: impl FnOnce(&D) -> RegistryResult<R>) -> RegistryResult<R> {
        let mut state = self.state.lock();
        self.refresh(&mut *state)?;
        f(&*state)
    }

    /// Read-modify-write. Nothing is persisted when `f` fails.
    fn write<R>(&self, f: impl FnOnce(&mut D) -> RegistryResult<R>) -> RegistryResult<R> {
        let mut state = self.state.lock();
        self.refresh(&mut *state)?;
        let result = f(&mut *state)?;
        self.persist(&*state)?;
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// 2. Registry A store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupContact {
    group_id: CrmGroupId,
    contact_id: ContactId,
    status: MembershipStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityMatch {
    contact_id: ContactId,
    user_id: UserId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CrmDocument {
    #[serde(default)]
    next_group_id: u64,
    #[serde(default)]
    groups: Vec<CrmGroup>,
    #[serde(default)]
    group_contacts: Vec<GroupContact>,
    #[serde(default)]
    matches: Vec<IdentityMatch>,
    #[serde(default)]
    permissions: Vec<String>,
}

impl CrmDocument {
    fn group(&self, id: CrmGroupId) -> Option<&CrmGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    fn require_group(&self, id: CrmGroupId) -> RegistryResult<&CrmGroup> {
        self.group(id)
            .ok_or_else(|| RegistryError::not_found(Side::Crm, format!("group {id}")))
    }

    fn allocate_id(&mut self) -> CrmGroupId {
        let highest = self.groups.iter().map(|g| g.id.0).max().unwrap_or(0);
        self.next_group_id = self.next_group_id.max(highest + 1);
        let id = CrmGroupId(self.next_group_id);
        self.next_group_id += 1;
        id
    }

    fn synced_group_ids(&self) -> Vec<CrmGroupId> {
        let mut ids: Vec<CrmGroupId> = self
            .groups
            .iter()
            .filter(|g| marker::is_synced_source(&g.source))
            .map(|g| g.id)
            .collect();
        ids.sort();
        ids
    }

    fn active_edges(&self) -> Vec<MembershipEdge<CrmGroupId, ContactId>> {
        let synced = self.synced_group_ids();
        let mut edges: Vec<_> = self
            .group_contacts
            .iter()
            .filter(|gc| gc.status.is_active() && synced.contains(&gc.group_id))
            .map(|gc| MembershipEdge {
                group: gc.group_id,
                member: gc.contact_id,
            })
            .collect();
        edges.sort_by_key(|edge| edge.group);
        edges
    }
}

/// File-backed Registry A.
pub struct CrmStore {
    backing: Backing<CrmDocument>,
    events: EventHub<CrmEvent>,
}

impl CrmStore {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::new(Side::Crm, None),
            events: EventHub::new(),
        }
    }

    pub fn open_path(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::new(Side::Crm, Some(path.into())),
            events: EventHub::new(),
        }
    }

    /// `<home>/.grouplink/registries/crm.yaml`
    pub fn open_at(home: &Path) -> Self {
        Self::open_path(paths::crm_store_path_at(home))
    }

    pub fn path(&self) -> Option<&Path> {
        self.backing.path.as_deref()
    }

    /// Replace the enabled permissions. Duplicates and blank names are
    /// dropped; an unchanged set emits nothing.
    pub fn permissions_set<I, S>(&self, names: I) -> RegistryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let wanted: Vec<String> = names
            .into_iter()
            .map(Into::into)
            .filter(|name| !name.trim().is_empty() && seen.insert(name.clone()))
            .collect();
        let changed = self.backing.write(|doc| {
            if doc.permissions == wanted {
                return Ok(false);
            }
            doc.permissions = wanted.clone();
            Ok(true)
        })?;
        if changed {
            self.emit_all(vec![CrmEvent::PermissionsChanged {
                permissions: wanted,
            }]);
        }
        Ok(())
    }

    /// All groups, ordered by id.
    pub fn groups(&self) -> RegistryResult<Vec<CrmGroup>> {
        self.backing.read(|doc| {
            let mut groups = doc.groups.clone();
            groups.sort_by_key(|g| g.id);
            Ok(groups)
        })
    }

    fn emit_all(&self, events: Vec<CrmEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }
}

impl CrmRegistry for CrmStore {
    fn group_get(&self, id: CrmGroupId) -> RegistryResult<Option<CrmGroup>> {
        self.backing.read(|doc| Ok(doc.group(id).cloned()))
    }

    fn group_find_by_marker(&self, marker: &str) -> RegistryResult<Option<CrmGroup>> {
        self.backing.read(|doc| {
            let mut matching: Vec<&CrmGroup> =
                doc.groups.iter().filter(|g| g.source == marker).collect();
            matching.sort_by_key(|g| g.id);
            Ok(matching.first().map(|g| (*g).clone()))
        })
    }

    fn groups_synced(&self) -> RegistryResult<Vec<CrmGroup>> {
        self.backing.read(|doc| {
            let mut groups: Vec<CrmGroup> = doc
                .groups
                .iter()
                .filter(|g| marker::is_synced_source(&g.source))
                .cloned()
                .collect();
            groups.sort_by_key(|g| g.id);
            Ok(groups)
        })
    }

    fn groups_for_contact(&self, contact: ContactId) -> RegistryResult<Vec<CrmGroup>> {
        self.backing.read(|doc| {
            let ids: HashSet<CrmGroupId> = doc
                .group_contacts
                .iter()
                .filter(|gc| gc.contact_id == contact && gc.status.is_active())
                .map(|gc| gc.group_id)
                .collect();
            let mut groups: Vec<CrmGroup> = doc
                .groups
                .iter()
                .filter(|g| ids.contains(&g.id))
                .cloned()
                .collect();
            groups.sort_by_key(|g| g.id);
            Ok(groups)
        })
    }

    fn group_create(&self, group: NewCrmGroup) -> RegistryResult<CrmGroup> {
        if group.name.trim().is_empty() && group.title.trim().is_empty() {
            return Err(RegistryError::Rejected {
                side: Side::Crm,
                reason: "a group needs a name or a title".to_string(),
            });
        }
        let created = self.backing.write(|doc| {
            let id = doc.allocate_id();
            let title = if group.title.trim().is_empty() {
                group.name.clone()
            } else {
                group.title
            };
            let name = if group.name.trim().is_empty() {
                title.clone()
            } else {
                group.name
            };
            let created = CrmGroup {
                id,
                name,
                title,
                description: group.description,
                source: group.source,
                group_types: group.group_types,
                is_active: true,
            };
            doc.groups.push(created.clone());
            Ok(created)
        })?;
        tracing::debug!("crm group {} created", created.id);
        self.emit_all(vec![CrmEvent::GroupCreated {
            group: created.clone(),
        }]);
        Ok(created)
    }

    fn group_update(&self, id: CrmGroupId, changes: CrmGroupUpdate) -> RegistryResult<CrmGroup> {
        let updated = self.backing.write(|doc| {
            let Some(group) = doc.groups.iter_mut().find(|g| g.id == id) else {
                return Err(RegistryError::not_found(Side::Crm, format!("group {id}")));
            };
            if let Some(name) = changes.name {
                group.name = name;
            }
            if let Some(title) = changes.title {
                group.title = title;
            }
            if let Some(description) = changes.description {
                group.description = description;
            }
            if let Some(source) = changes.source {
                group.source = source;
            }
            if let Some(group_types) = changes.group_types {
                group.group_types = group_types;
            }
            Ok(group.clone())
        })?;
        self.emit_all(vec![CrmEvent::GroupUpdated {
            group: updated.clone(),
        }]);
        Ok(updated)
    }

    fn group_delete(&self, id: CrmGroupId) -> RegistryResult<()> {
        let deleted = self.backing.write(|doc| {
            let group = doc.require_group(id)?.clone();
            doc.groups.retain(|g| g.id != id);
            doc.group_contacts.retain(|gc| gc.group_id != id);
            Ok(group)
        })?;
        self.emit_all(vec![CrmEvent::GroupDeleted { group: deleted }]);
        Ok(())
    }

    fn membership_get(
        &self,
        group: CrmGroupId,
        contact: ContactId,
    ) -> RegistryResult<Option<MembershipStatus>> {
        self.backing.read(|doc| {
            Ok(doc
                .group_contacts
                .iter()
                .find(|gc| gc.group_id == group && gc.contact_id == contact)
                .map(|gc| gc.status))
        })
    }

    fn membership_create(
        &self,
        group: CrmGroupId,
        contact: ContactId,
        status: MembershipStatus,
    ) -> RegistryResult<()> {
        let event = self.backing.write(|doc| {
            doc.require_group(group)?;
            let was_active = match doc
                .group_contacts
                .iter_mut()
                .find(|gc| gc.group_id == group && gc.contact_id == contact)
            {
                Some(existing) => {
                    let was_active = existing.status.is_active();
                    existing.status = status;
                    was_active
                }
                None => {
                    doc.group_contacts.push(GroupContact {
                        group_id: group,
                        contact_id: contact,
                        status,
                    });
                    false
                }
            };
            Ok(match (was_active, status.is_active()) {
                (false, true) => Some(CrmEvent::MembershipAdded {
                    group,
                    contacts: vec![contact],
                }),
                (true, false) => Some(CrmEvent::MembershipRemoved {
                    group,
                    contacts: vec![contact],
                }),
                _ => None,
            })
        })?;
        self.emit_all(event.into_iter().collect());
        Ok(())
    }

    fn membership_list(&self, group: CrmGroupId) -> RegistryResult<Vec<ContactId>> {
        self.backing.read(|doc| {
            doc.require_group(group)?;
            Ok(doc
                .group_contacts
                .iter()
                .filter(|gc| gc.group_id == group && gc.status.is_active())
                .map(|gc| gc.contact_id)
                .collect())
        })
    }

    fn memberships_page(
        &self,
        limit: u64,
        offset: u64,
    ) -> RegistryResult<Vec<MembershipEdge<CrmGroupId, ContactId>>> {
        self.backing
            .read(|doc| Ok(page(doc.active_edges(), limit, offset)))
    }

    fn memberships_count(&self) -> RegistryResult<u64> {
        self.backing.read(|doc| Ok(doc.active_edges().len() as u64))
    }

    fn contact_for_login(&self, user: UserId) -> RegistryResult<Option<ContactId>> {
        self.backing.read(|doc| {
            Ok(doc
                .matches
                .iter()
                .find(|m| m.user_id == user)
                .map(|m| m.contact_id))
        })
    }

    fn login_for_contact(&self, contact: ContactId) -> RegistryResult<Option<UserId>> {
        self.backing.read(|doc| {
            Ok(doc
                .matches
                .iter()
                .find(|m| m.contact_id == contact)
                .map(|m| m.user_id))
        })
    }

    fn identity_link(&self, contact: ContactId, user: UserId) -> RegistryResult<()> {
        let changed = self.backing.write(|doc| {
            let already = doc
                .matches
                .iter()
                .any(|m| m.contact_id == contact && m.user_id == user);
            if already {
                return Ok(false);
            }
            doc.matches
                .retain(|m| m.contact_id != contact && m.user_id != user);
            doc.matches.push(IdentityMatch {
                contact_id: contact,
                user_id: user,
            });
            Ok(true)
        })?;
        if changed {
            self.emit_all(vec![CrmEvent::IdentityLinked { contact, user }]);
        }
        Ok(())
    }

    fn permissions(&self) -> RegistryResult<Vec<String>> {
        self.backing.read(|doc| Ok(doc.permissions.clone()))
    }

    fn events(&self) -> &EventHub<CrmEvent> {
        &self.events
    }
}

// ---------------------------------------------------------------------------
// 3. Registry B store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserGroup {
    group_id: PlatformGroupId,
    user_id: UserId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PlatformDocument {
    #[serde(default)]
    next_group_id: u64,
    #[serde(default)]
    groups: Vec<PlatformGroup>,
    #[serde(default)]
    memberships: Vec<UserGroup>,
    #[serde(default)]
    capabilities: BTreeSet<String>,
    #[serde(default)]
    capability_snapshot: Vec<String>,
}

impl PlatformDocument {
    fn group(&self, id: PlatformGroupId) -> Option<&PlatformGroup> {
        self.groups.iter().find(|g| g.id == id)
    }

    fn require_group(&self, id: PlatformGroupId) -> RegistryResult<&PlatformGroup> {
        self.group(id)
            .ok_or_else(|| RegistryError::not_found(Side::Platform, format!("group {id}")))
    }

    fn allocate_id(&mut self) -> PlatformGroupId {
        let highest = self.groups.iter().map(|g| g.id.0).max().unwrap_or(0);
        self.next_group_id = self.next_group_id.max(highest + 1);
        let id = PlatformGroupId(self.next_group_id);
        self.next_group_id += 1;
        id
    }

    fn is_member(&self, user: UserId, group: PlatformGroupId) -> bool {
        self.memberships
            .iter()
            .any(|m| m.group_id == group && m.user_id == user)
    }

    fn edges_in(&self, groups: &[PlatformGroupId]) -> Vec<MembershipEdge<PlatformGroupId, UserId>> {
        let wanted: HashSet<PlatformGroupId> = groups.iter().copied().collect();
        let mut edges: Vec<_> = self
            .memberships
            .iter()
            .filter(|m| wanted.contains(&m.group_id))
            .map(|m| MembershipEdge {
                group: m.group_id,
                member: m.user_id,
            })
            .collect();
        edges.sort_by_key(|edge| edge.group);
        edges
    }
}

/// File-backed Registry B.
pub struct PlatformStore {
    backing: Backing<PlatformDocument>,
    events: EventHub<PlatformEvent>,
}

impl PlatformStore {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::new(Side::Platform, None),
            events: EventHub::new(),
        }
    }

    pub fn open_path(path: impl Into<PathBuf>) -> Self {
        Self {
            backing: Backing::new(Side::Platform, Some(path.into())),
            events: EventHub::new(),
        }
    }

    /// `<home>/.grouplink/registries/platform.yaml`
    pub fn open_at(home: &Path) -> Self {
        Self::open_path(paths::platform_store_path_at(home))
    }

    pub fn path(&self) -> Option<&Path> {
        self.backing.path.as_deref()
    }

    fn emit_all(&self, events: Vec<PlatformEvent>) {
        for event in &events {
            self.events.emit(event);
        }
    }
}

impl PlatformRegistry for PlatformStore {
    fn group_create(&self, group: NewPlatformGroup) -> RegistryResult<PlatformGroup> {
        if group.name.trim().is_empty() {
            return Err(RegistryError::Rejected {
                side: Side::Platform,
                reason: "a group needs a name".to_string(),
            });
        }
        let sync = group.sync;
        let created = self.backing.write(|doc| {
            let created = PlatformGroup {
                id: doc.allocate_id(),
                name: group.name,
                description: group.description,
            };
            doc.groups.push(created.clone());
            Ok(created)
        })?;
        tracing::debug!("platform group {} created", created.id);
        self.emit_all(vec![PlatformEvent::GroupCreated {
            group: created.clone(),
            sync,
        }]);
        Ok(created)
    }

    fn group_read(&self, id: PlatformGroupId) -> RegistryResult<Option<PlatformGroup>> {
        self.backing.read(|doc| Ok(doc.group(id).cloned()))
    }

    fn group_update(
        &self,
        id: PlatformGroupId,
        changes: PlatformGroupUpdate,
    ) -> RegistryResult<PlatformGroup> {
        let updated = self.backing.write(|doc| {
            let Some(group) = doc.groups.iter_mut().find(|g| g.id == id) else {
                return Err(RegistryError::not_found(Side::Platform, format!("group {id}")));
            };
            if let Some(name) = changes.name {
                group.name = name;
            }
            if let Some(description) = changes.description {
                group.description = description;
            }
            Ok(group.clone())
        })?;
        self.emit_all(vec![PlatformEvent::GroupUpdated {
            group: updated.clone(),
        }]);
        Ok(updated)
    }

    fn group_delete(&self, id: PlatformGroupId) -> RegistryResult<()> {
        let deleted = self.backing.write(|doc| {
            let group = doc.require_group(id)?.clone();
            doc.groups.retain(|g| g.id != id);
            doc.memberships.retain(|m| m.group_id != id);
            Ok(group)
        })?;
        self.emit_all(vec![PlatformEvent::GroupDeleted { group: deleted }]);
        Ok(())
    }

    fn groups(&self) -> RegistryResult<Vec<PlatformGroup>> {
        self.backing.read(|doc| {
            let mut groups = doc.groups.clone();
            groups.sort_by_key(|g| g.id);
            Ok(groups)
        })
    }

    fn member_exists(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<bool> {
        self.backing.read(|doc| Ok(doc.is_member(user, group)))
    }

    fn member_add(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<()> {
        let added = self.backing.write(|doc| {
            doc.require_group(group)?;
            if doc.is_member(user, group) {
                return Ok(false);
            }
            doc.memberships.push(UserGroup {
                group_id: group,
                user_id: user,
            });
            Ok(true)
        })?;
        if added {
            self.emit_all(vec![PlatformEvent::MembershipAdded { group, user }]);
        }
        Ok(())
    }

    fn member_delete(&self, user: UserId, group: PlatformGroupId) -> RegistryResult<()> {
        let removed = self.backing.write(|doc| {
            let before = doc.memberships.len();
            doc.memberships
                .retain(|m| !(m.group_id == group && m.user_id == user));
            Ok(doc.memberships.len() != before)
        })?;
        if removed {
            self.emit_all(vec![PlatformEvent::MembershipRemoved { group, user }]);
        }
        Ok(())
    }

    fn group_members(&self, group: PlatformGroupId) -> RegistryResult<Vec<UserId>> {
        self.backing.read(|doc| {
            doc.require_group(group)?;
            Ok(doc
                .memberships
                .iter()
                .filter(|m| m.group_id == group)
                .map(|m| m.user_id)
                .collect())
        })
    }

    fn memberships_page(
        &self,
        groups: &[PlatformGroupId],
        limit: u64,
        offset: u64,
    ) -> RegistryResult<Vec<MembershipEdge<PlatformGroupId, UserId>>> {
        self.backing
            .read(|doc| Ok(page(doc.edges_in(groups), limit, offset)))
    }

    fn memberships_count(&self, groups: &[PlatformGroupId]) -> RegistryResult<u64> {
        self.backing.read(|doc| Ok(doc.edges_in(groups).len() as u64))
    }

    fn capabilities(&self) -> RegistryResult<Vec<String>> {
        self.backing
            .read(|doc| Ok(doc.capabilities.iter().cloned().collect()))
    }

    fn capability_create(&self, name: &str) -> RegistryResult<bool> {
        if name.trim().is_empty() {
            return Err(RegistryError::Rejected {
                side: Side::Platform,
                reason: "a capability needs a name".to_string(),
            });
        }
        self.backing
            .write(|doc| Ok(doc.capabilities.insert(name.to_string())))
    }

    fn capability_delete(&self, name: &str) -> RegistryResult<bool> {
        self.backing.write(|doc| Ok(doc.capabilities.remove(name)))
    }

    fn capability_snapshot(&self) -> RegistryResult<Vec<String>> {
        self.backing.read(|doc| Ok(doc.capability_snapshot.clone()))
    }

    fn capability_snapshot_store(&self, names: &[String]) -> RegistryResult<()> {
        self.backing.write(|doc| {
            doc.capability_snapshot = names.to_vec();
            Ok(())
        })
    }

    fn events(&self) -> &EventHub<PlatformEvent> {
        &self.events
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
