//! # plugman-install
//!
//! Installing VM binaries from stored definitions.
//!
//! [`install`] / [`uninstall`] act on one qualified VM name, [`upgrade_vm`],
//! [`upgrade_all`] and [`upgrade_repository`] reinstall outdated VMs, and
//! [`join_subnet`] installs a subnet's VMs before notifying the node through
//! its admin API.

pub mod admin;
pub mod error;
pub mod fetch;
pub mod install;
pub mod installer;
pub mod subnet;
pub mod upgrade;

pub use admin::{AdminApi, AdminClient};
pub use error::{AdminError, InstallError};
pub use fetch::{Fetch, HttpFetcher};
pub use install::{install, uninstall, InstallOutcome, UninstallOutcome};
pub use installer::{Installer, VmInstaller};
pub use subnet::{join_subnet, JoinReport};
pub use upgrade::{upgrade_all, upgrade_repository, upgrade_vm, UpgradeOutcome, UpgradeReport};
