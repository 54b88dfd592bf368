//! Filesystem layout and atomic write helpers.
//!
//! # Storage layout
//!
//! ```text
//! ~/.grouplink/
//!   settings.yaml           (mode 0600)
//!   registries/
//!     crm.yaml              (Registry A file store, mode 0600)
//!     platform.yaml         (Registry B file store, mode 0600)
//!   batches/
//!     <identifier>.json     (batch state, one per job)
//! ```
//!
//! # API pattern
//!
//! Path helpers take an explicit `home`; tests always pass a `TempDir`.
//! [`home`] resolves the real home directory for the binaries.

use std::path::{Path, PathBuf};

use crate::error::RegistryError;

/// `<home>/.grouplink/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".grouplink")
}

/// `<home>/.grouplink/registries/`
pub fn registries_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("registries")
}

/// `<home>/.grouplink/registries/crm.yaml`
pub fn crm_store_path_at(home: &Path) -> PathBuf {
    registries_dir_at(home).join("crm.yaml")
}

/// `<home>/.grouplink/registries/platform.yaml`
pub fn platform_store_path_at(home: &Path) -> PathBuf {
    registries_dir_at(home).join("platform.yaml")
}

/// `<home>/.grouplink/settings.yaml`
pub fn settings_path_at(home: &Path) -> PathBuf {
    root_at(home).join("settings.yaml")
}

/// `<home>/.grouplink/batches/`
pub fn batches_dir_at(home: &Path) -> PathBuf {
    root_at(home).join("batches")
}

/// The current user's home directory.
pub fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}

/// Atomically replace `path` with `contents`.
///
/// Write flow: parent dir (mode `0700`) → `<name>.tmp` sibling →
/// `chmod 0600` → `rename`. The `.tmp` file lives next to the target so the
/// rename never crosses filesystems.
pub fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp = tmp_path(path);
    std::fs::write(&tmp, contents)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, path)
}

/// `<path>.tmp`, the staging file used by [`write_atomic`].
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
