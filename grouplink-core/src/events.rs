//! Change notifications emitted by the registries.
//!
//! Each registry owns an [`EventHub`]. Handlers register under a
//! [`HandlerId`]; a handler can be taken out of the hub temporarily with
//! [`EventHub::suppress`] and is put back when the returned
//! [`Suppression`] is dropped.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::{
    ContactId, CrmGroup, CrmGroupId, PlatformGroup, PlatformGroupId, UserId,
};

/// Stable name of a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub &'static str);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Registry A notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrmEvent {
    GroupCreated { group: CrmGroup },
    GroupUpdated { group: CrmGroup },
    GroupDeleted { group: CrmGroup },
    /// Contacts became active members (new rows or rejoins).
    MembershipAdded {
        group: CrmGroupId,
        contacts: Vec<ContactId>,
    },
    /// Contacts stopped being active members.
    MembershipRemoved {
        group: CrmGroupId,
        contacts: Vec<ContactId>,
    },
    /// A contact was matched to a login account.
    IdentityLinked { contact: ContactId, user: UserId },
    /// The set of enabled permissions changed.
    PermissionsChanged { permissions: Vec<String> },
}

/// Registry B notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    GroupCreated { group: PlatformGroup, sync: bool },
    GroupUpdated { group: PlatformGroup },
    GroupDeleted { group: PlatformGroup },
    MembershipAdded { group: PlatformGroupId, user: UserId },
    MembershipRemoved { group: PlatformGroupId, user: UserId },
}

pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registration<E> {
    id: HandlerId,
    handler: Handler<E>,
}

/// Ordered list of handlers for one registry.
pub struct EventHub<E> {
    registrations: Mutex<Vec<Registration<E>>>,
}

impl<E> Default for EventHub<E> {
    fn default() -> Self {
        Self {
            registrations: Mutex::new(Vec::new()),
        }
    }
}

impl<E> EventHub<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `id`, replacing any handler with the same id.
    pub fn register(&self, id: HandlerId, handler: Handler<E>) {
        let mut registrations = self.registrations.lock();
        registrations.retain(|r| r.id != id);
        registrations.push(Registration { id, handler });
    }

    /// Remove and return the handler registered under `id`.
    pub fn deregister(&self, id: HandlerId) -> Option<Handler<E>> {
        let mut registrations = self.registrations.lock();
        let index = registrations.iter().position(|r| r.id == id)?;
        Some(registrations.remove(index).handler)
    }

    pub fn is_registered(&self, id: HandlerId) -> bool {
        self.registrations.lock().iter().any(|r| r.id == id)
    }

    pub fn handler_ids(&self) -> Vec<HandlerId> {
        self.registrations.lock().iter().map(|r| r.id).collect()
    }

    /// Take `id` out of the hub until the returned guard is dropped.
    pub fn suppress(&self, id: HandlerId) -> Suppression<'_, E> {
        let parked = self.deregister(id);
        Suppression {
            hub: self,
            id,
            parked,
        }
    }

    /// Deliver `event` to every registered handler.
    ///
    /// The handler list is snapshotted first, so handlers may register,
    /// deregister or write to registries without deadlocking the hub.
    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = self
            .registrations
            .lock()
            .iter()
            .map(|r| Arc::clone(&r.handler))
            .collect();
        for handler in handlers {
            handler(event);
        }
    }
}

impl<E> fmt::Debug for EventHub<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.handler_ids())
            .finish()
    }
}

/// Scoped handler removal; restores the handler on drop, including during
/// unwinding.
#[must_use = "the handler is restored as soon as the suppression is dropped"]
pub struct Suppression<'a, E> {
    hub: &'a EventHub<E>,
    id: HandlerId,
    parked: Option<Handler<E>>,
}

impl<E> Suppression<'_, E> {
    /// Whether a handler was actually removed.
    pub fn is_active(&self) -> bool {
        self.parked.is_some()
    }
}

impl<E> Drop for Suppression<'_, E> {
    fn drop(&mut self) {
        if let Some(handler) = self.parked.take() {
            self.hub.register(self.id, handler);
        }
    }
}
