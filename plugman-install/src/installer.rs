//! Placing VM binaries into the plugin directory.
//!
//! Install flow: download into `tmp/` → verify SHA-256 → copy to a
//! `.plugman.tmp` sibling of the target → `chmod 0755` → `rename` → run the
//! optional install script.

use std::path::{Path, PathBuf};
use std::process::Command;

use plugman_core::VmDefinition;

use crate::error::{io_err, InstallError};
use crate::fetch::{verify_sha256, Fetch, HttpFetcher};

/// File-system side of installing and removing a VM binary.
pub trait Installer {
    /// Place the binary for `vm` in the plugin directory and return its path.
    fn install(&self, vm: &VmDefinition) -> Result<PathBuf, InstallError>;

    /// Delete the binary named `vm_id`. Returns `false` when there was none.
    fn remove(&self, vm_id: &str) -> Result<bool, InstallError>;
}

/// Installs binaries named after the VM id into `plugin_dir`.
#[derive(Debug, Clone)]
pub struct VmInstaller<F = HttpFetcher> {
    plugin_dir: PathBuf,
    tmp_dir: PathBuf,
    fetcher: F,
}

impl<F: Fetch> VmInstaller<F> {
    pub fn new(plugin_dir: impl Into<PathBuf>, tmp_dir: impl Into<PathBuf>, fetcher: F) -> Self {
        Self {
            plugin_dir: plugin_dir.into(),
            tmp_dir: tmp_dir.into(),
            fetcher,
        }
    }

    pub fn plugin_dir(&self) -> &Path {
        &self.plugin_dir
    }

    /// Where the binary for `vm_id` lives once installed.
    pub fn binary_path(&self, vm_id: &str) -> Result<PathBuf, InstallError> {
        if vm_id.is_empty()
            || vm_id == "."
            || vm_id == ".."
            || vm_id.contains(['/', '\\', '\0'])
        {
            return Err(InstallError::InvalidVmId {
                id: vm_id.to_owned(),
            });
        }
        Ok(self.plugin_dir.join(vm_id))
    }

    fn run_install_script(&self, script: &str, binary: &Path) -> Result<(), InstallError> {
        tracing::info!(script, binary = %binary.display(), "running install script");
        let status = Command::new("sh")
            .arg("-c")
            .arg(script)
            .env("PLUGIN_PATH", binary)
            .env("PLUGIN_DIR", &self.plugin_dir)
            .current_dir(&self.plugin_dir)
            .status()
            .map_err(|e| io_err(&self.plugin_dir, e))?;
        if !status.success() {
            return Err(InstallError::Script {
                script: script.to_owned(),
                status,
            });
        }
        Ok(())
    }
}

impl<F: Fetch> Installer for VmInstaller<F> {
    fn install(&self, vm: &VmDefinition) -> Result<PathBuf, InstallError> {
        if vm.url.is_empty() {
            return Err(InstallError::MissingArtifact {
                alias: vm.alias.clone(),
            });
        }
        let target = self.binary_path(&vm.id)?;

        std::fs::create_dir_all(&self.tmp_dir).map_err(|e| io_err(&self.tmp_dir, e))?;
        let staging = self.tmp_dir.join(format!("{}.download", vm.id));
        let staged = self.fetcher.fetch(&vm.url, &staging).and_then(|()| {
            if vm.sha256.is_empty() {
                tracing::warn!(vm = %vm.alias, "no checksum published; skipping verification");
                Ok(())
            } else {
                verify_sha256(&staging, &vm.sha256)
            }
        });
        if let Err(err) = staged {
            let _ = std::fs::remove_file(&staging);
            return Err(err);
        }

        // Staging may sit on another filesystem; copy next to the target so
        // the final rename stays atomic.
        std::fs::create_dir_all(&self.plugin_dir).map_err(|e| io_err(&self.plugin_dir, e))?;
        let tmp = self.plugin_dir.join(format!("{}.plugman.tmp", vm.id));
        let placed = std::fs::copy(&staging, &tmp)
            .map_err(|e| io_err(&tmp, e))
            .and_then(|_| set_executable(&tmp))
            .and_then(|()| std::fs::rename(&tmp, &target).map_err(|e| io_err(&target, e)));
        let _ = std::fs::remove_file(&staging);
        if let Err(err) = placed {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }
        tracing::info!(vm = %vm.alias, path = %target.display(), "placed binary");

        if !vm.install_script.is_empty() {
            self.run_install_script(&vm.install_script, &target)?;
        }
        Ok(target)
    }

    fn remove(&self, vm_id: &str) -> Result<bool, InstallError> {
        let path = self.binary_path(vm_id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "removed binary");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(path, e)),
        }
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), InstallError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), InstallError> {
    Ok(())
}
