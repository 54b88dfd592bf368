//! CRM permissions mirrored as platform capabilities.
//!
//! Each enabled permission becomes one capability named by
//! [`capability_name`]. Syncing only ever creates capabilities unless
//! deletion is enabled, either per call or by a registered
//! [`CapabilityProvider`](crate::context::CapabilityProvider). Deletion is
//! limited to names an earlier deleting sync recorded in the platform's
//! capability snapshot, so capabilities the platform defines itself are
//! never touched.

use std::collections::HashSet;

use grouplink_core::{CrmRegistry, PlatformRegistry};
use serde::Serialize;

use crate::context::{Extensions, SyncContext};
use crate::error::SyncResult;

/// Longest capability name produced from a permission.
pub const MAX_CAPABILITY_LEN: usize = 63;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilityReport {
    pub created: Vec<String>,
    pub deleted: Vec<String>,
    /// Wanted capabilities that already existed.
    pub unchanged: usize,
}

impl CapabilityReport {
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

/// `"Access CiviCRM"` → `"access_civicrm"`.
///
/// Lowercased, each run of characters outside `[a-z0-9]` collapsed to one
/// `_`, then cut to [`MAX_CAPABILITY_LEN`].
pub fn capability_name(permission: &str) -> String {
    let mut name = String::with_capacity(permission.len());
    let mut gap = false;
    for c in permission.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if gap {
                name.push('_');
                gap = false;
            }
            name.push(c);
        } else if !name.is_empty() || c == '_' {
            gap = true;
        }
    }
    if gap {
        name.push('_');
    }
    name.truncate(MAX_CAPABILITY_LEN);
    name
}

/// The capability names the platform should carry right now.
pub fn wanted_capabilities(
    crm: &dyn CrmRegistry,
    extensions: &Extensions,
) -> SyncResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut wanted: Vec<String> = crm
        .permissions()?
        .iter()
        .map(|permission| capability_name(permission))
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect();
    for provider in extensions.capability_providers() {
        wanted = provider.adjust_capabilities(wanted);
    }
    Ok(wanted)
}

/// Create every wanted capability the platform lacks and, when deletion is
/// enabled, delete the ones that went away since the last snapshot.
pub fn sync_capabilities(ctx: &SyncContext, delete_missing: bool) -> SyncResult<CapabilityReport> {
    sync_between(
        ctx.crm.as_ref(),
        ctx.platform.as_ref(),
        &ctx.extensions,
        delete_missing,
    )
}

pub(crate) fn sync_between(
    crm: &dyn CrmRegistry,
    platform: &dyn PlatformRegistry,
    extensions: &Extensions,
    delete_missing: bool,
) -> SyncResult<CapabilityReport> {
    let wanted = wanted_capabilities(crm, extensions)?;
    let mut report = CapabilityReport::default();

    for name in &wanted {
        if platform.capability_create(name)? {
            tracing::info!("created capability '{name}'");
            report.created.push(name.clone());
        } else {
            report.unchanged += 1;
        }
    }

    let delete_missing = delete_missing
        || extensions
            .capability_providers()
            .iter()
            .any(|provider| provider.allow_delete_missing());
    if delete_missing {
        let keep: HashSet<&str> = wanted.iter().map(String::as_str).collect();
        for name in platform.capability_snapshot()? {
            if keep.contains(name.as_str()) {
                continue;
            }
            if platform.capability_delete(&name)? {
                tracing::info!("deleted capability '{name}'");
                report.deleted.push(name);
            }
        }
        platform.capability_snapshot_store(&wanted)?;
    }

    tracing::debug!(
        "capability sync: {} created, {} deleted, {} unchanged",
        report.created.len(),
        report.deleted.len(),
        report.unchanged
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use grouplink_core::{CrmStore, PlatformStore};
    use rstest::rstest;

    use super::*;
    use crate::context::CapabilityProvider;

    #[rstest]
    #[case("access CiviCRM", "access_civicrm")]
    #[case("  edit all contacts ", "edit_all_contacts")]
    #[case("CiviCRM: access CiviMail", "civicrm_access_civimail")]
    #[case("view event info!", "view_event_info_")]
    #[case("***", "")]
    fn names_are_lowercased_and_collapsed(#[case] permission: &str, #[case] expected: &str) {
        assert_eq!(capability_name(permission), expected);
    }

    #[test]
    fn long_names_are_cut() {
        let name = capability_name(&"a".repeat(100));
        assert_eq!(name.len(), MAX_CAPABILITY_LEN);
    }

    fn stores(permissions: &[&str]) -> (CrmStore, PlatformStore) {
        let crm = CrmStore::in_memory();
        crm.permissions_set(permissions.iter().copied()).unwrap();
        (crm, PlatformStore::in_memory())
    }

    #[test]
    fn creates_only_what_is_missing() {
        let (crm, platform) = stores(&["access CiviCRM", "Access CiviCRM", "edit groups"]);
        platform.capability_create("edit_groups").unwrap();

        let report = sync_between(&crm, &platform, &Extensions::new(), false).unwrap();

        assert_eq!(report.created, vec!["access_civicrm".to_string()]);
        assert_eq!(report.unchanged, 1);
        let again = sync_between(&crm, &platform, &Extensions::new(), false).unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn missing_capabilities_stay_unless_deletion_is_enabled() {
        let (crm, platform) = stores(&["access CiviCRM", "edit groups"]);
        sync_between(&crm, &platform, &Extensions::new(), false).unwrap();
        crm.permissions_set(["access CiviCRM"]).unwrap();

        let kept = sync_between(&crm, &platform, &Extensions::new(), false).unwrap();
        assert!(kept.deleted.is_empty());
        assert!(platform.capabilities().unwrap().contains(&"edit_groups".to_string()));
    }

    #[test]
    fn first_deleting_sync_only_records_the_snapshot() {
        let (crm, platform) = stores(&["access CiviCRM"]);
        platform.capability_create("edit_posts").unwrap();

        let first = sync_between(&crm, &platform, &Extensions::new(), true).unwrap();
        assert!(first.deleted.is_empty());
        assert_eq!(
            platform.capability_snapshot().unwrap(),
            vec!["access_civicrm".to_string()]
        );

        crm.permissions_set(Vec::<String>::new()).unwrap();
        let second = sync_between(&crm, &platform, &Extensions::new(), true).unwrap();
        assert_eq!(second.deleted, vec!["access_civicrm".to_string()]);
        assert_eq!(platform.capabilities().unwrap(), vec!["edit_posts".to_string()]);
        assert!(platform.capability_snapshot().unwrap().is_empty());
    }

    struct Extra;

    impl CapabilityProvider for Extra {
        fn adjust_capabilities(&self, mut capabilities: Vec<String>) -> Vec<String> {
            capabilities.retain(|name| name != "administer_civicrm");
            capabilities.push("view_reports".to_string());
            capabilities
        }

        fn allow_delete_missing(&self) -> bool {
            true
        }
    }

    #[test]
    fn providers_adjust_the_list_and_can_enable_deletion() {
        let (crm, platform) = stores(&["access CiviCRM", "administer CiviCRM"]);
        let mut extensions = Extensions::new();
        extensions.register_capability_provider(Arc::new(Extra));

        let report = sync_between(&crm, &platform, &extensions, false).unwrap();
        assert_eq!(
            report.created,
            vec!["access_civicrm".to_string(), "view_reports".to_string()]
        );
        assert_eq!(
            platform.capability_snapshot().unwrap(),
            vec!["access_civicrm".to_string(), "view_reports".to_string()]
        );
    }
}
