//! The application context handed to every engine operation.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use grouplink_core::{
    ContactId, CrmRegistry, CrmStore, PlatformRegistry, PlatformStore, RegistryResult, UserId,
};

use crate::batch::BatchStore;
use crate::live;

/// Extra identity matching consulted after the CRM's own match table.
///
/// Both lookups default to "no match" so a provider may implement only
/// one direction.
pub trait IdentityProvider: Send + Sync {
    fn user_for_contact(&self, _contact: ContactId) -> RegistryResult<Option<UserId>> {
        Ok(None)
    }

    fn contact_for_user(&self, _user: UserId) -> RegistryResult<Option<ContactId>> {
        Ok(None)
    }
}

/// Adjusts the capability set derived from CRM permissions.
pub trait CapabilityProvider: Send + Sync {
    /// Called with the derived names; the returned list is what gets synced.
    fn adjust_capabilities(&self, capabilities: Vec<String>) -> Vec<String> {
        capabilities
    }

    /// Let a sync delete capabilities whose permission went away.
    fn allow_delete_missing(&self) -> bool {
        false
    }
}

/// Explicitly registered engine extensions.
#[derive(Default, Clone)]
pub struct Extensions {
    identity_providers: Vec<Arc<dyn IdentityProvider>>,
    capability_providers: Vec<Arc<dyn CapabilityProvider>>,
}

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Providers are consulted in registration order.
    pub fn register_identity_provider(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.identity_providers.push(provider);
    }

    pub fn identity_providers(&self) -> &[Arc<dyn IdentityProvider>] {
        &self.identity_providers
    }

    /// Providers adjust the capability list in registration order.
    pub fn register_capability_provider(&mut self, provider: Arc<dyn CapabilityProvider>) {
        self.capability_providers.push(provider);
    }

    pub fn capability_providers(&self) -> &[Arc<dyn CapabilityProvider>] {
        &self.capability_providers
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("identity_providers", &self.identity_providers.len())
            .field("capability_providers", &self.capability_providers.len())
            .finish()
    }
}

/// Both registries, the batch store and the registered extensions.
#[derive(Clone)]
pub struct SyncContext {
    pub crm: Arc<dyn CrmRegistry>,
    pub platform: Arc<dyn PlatformRegistry>,
    pub batches: BatchStore,
    pub extensions: Extensions,
}

impl SyncContext {
    pub fn new(
        crm: Arc<dyn CrmRegistry>,
        platform: Arc<dyn PlatformRegistry>,
        batches: BatchStore,
    ) -> Self {
        Self {
            crm,
            platform,
            batches,
            extensions: Extensions::new(),
        }
    }

    /// File-backed registries and batch state under `<home>/.grouplink/`.
    pub fn file_backed(home: &Path) -> Self {
        Self::new(
            Arc::new(CrmStore::open_at(home)),
            Arc::new(PlatformStore::open_at(home)),
            BatchStore::at(home),
        )
    }

    /// Replace the registered extensions. An attached live bridge is
    /// re-attached so its handlers see the new providers too.
    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        if live::is_attached(&self) {
            live::attach(&self);
        }
        self
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("batches", &self.batches.dir())
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}
