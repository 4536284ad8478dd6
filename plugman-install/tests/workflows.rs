//! Install, uninstall, upgrade and join-subnet against a real store and a
//! temp plugin directory. Artifacts are served from `file://` URLs.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use plugman_core::{
    CommitHash, CoreError, Definition, InstalledStore, KvStore, QualifiedName, RepositoryStore,
    SubnetDefinition, Version, VmDefinition,
};
use plugman_install::{
    install, join_subnet, uninstall, upgrade_all, upgrade_repository, upgrade_vm, AdminApi,
    AdminError, HttpFetcher, InstallError, InstallOutcome, UninstallOutcome, UpgradeOutcome,
    VmInstaller,
};
use sha2::{Digest, Sha256};
use tempfile::TempDir;

struct Env {
    root: TempDir,
    store: KvStore,
    installer: VmInstaller,
}

impl Env {
    fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let store = KvStore::open(&root.path().join("db")).expect("open");
        let installer = VmInstaller::new(
            root.path().join("plugins"),
            root.path().join("tmp"),
            HttpFetcher::new(Duration::from_secs(5)),
        );
        Self {
            root,
            store,
            installer,
        }
    }

    fn plugin(&self, id: &str) -> PathBuf {
        self.root.path().join("plugins").join(id)
    }

    /// Write an artifact with `content` and return a definition pointing at it.
    fn vm(&self, alias: &str, id: &str, version: Version, content: &[u8]) -> VmDefinition {
        let artifact = self.root.path().join(format!("{id}-{version}.bin"));
        std::fs::write(&artifact, content).unwrap();
        VmDefinition {
            id: id.into(),
            alias: alias.into(),
            homepage: String::new(),
            description: String::new(),
            maintainers: vec![],
            install_script: String::new(),
            url: format!("file://{}", artifact.display()),
            sha256: hex::encode(Sha256::digest(content)),
            version,
        }
    }

    fn define_vm(&self, repository: &str, vm: VmDefinition) {
        let repository = repository.parse().unwrap();
        self.store
            .update(|txn| {
                RepositoryStore::new(&repository).vms().put(
                    txn,
                    &vm.alias.clone(),
                    &Definition {
                        definition: vm,
                        commit: CommitHash::from_bytes([1; 20]),
                    },
                )
            })
            .unwrap();
    }

    fn drop_vm(&self, repository: &str, alias: &str) {
        let repository = repository.parse().unwrap();
        self.store
            .update(|txn| RepositoryStore::new(&repository).vms().delete(txn, alias))
            .unwrap();
    }

    fn installed_version(&self, name: &QualifiedName) -> Option<Version> {
        self.store
            .view(|txn| InstalledStore::new().get_opt(txn, name))
            .unwrap()
            .map(|info| info.version)
    }
}

fn name(literal: &str) -> QualifiedName {
    literal.parse().expect("qualified name")
}

fn read(path: &Path) -> Vec<u8> {
    std::fs::read(path).expect("read plugin")
}

// ---------------------------------------------------------------------------
// install / uninstall
// ---------------------------------------------------------------------------

#[test]
fn install_then_reinstall_is_skipped() {
    let env = Env::new();
    env.define_vm("org/core", env.vm("evm", "evm-id", Version::new(1, 0, 0), b"v1"));

    let outcome = install(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    assert!(matches!(outcome, InstallOutcome::Installed { .. }), "{outcome:?}");
    assert_eq!(read(&env.plugin("evm-id")), b"v1");
    assert_eq!(
        env.installed_version(&name("org/core:evm")),
        Some(Version::new(1, 0, 0))
    );

    let again = install(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    assert!(matches!(again, InstallOutcome::AlreadyInstalled { .. }));
}

#[test]
fn install_of_undefined_vm_is_not_found() {
    let env = Env::new();
    let err = install(&env.store, &env.installer, &name("org/core:ghost")).unwrap_err();
    assert!(
        matches!(&err, InstallError::Core(e) if e.is_not_found()),
        "got: {err}"
    );
}

#[test]
fn failed_install_writes_no_record() {
    let env = Env::new();
    let mut vm = env.vm("evm", "evm-id", Version::new(1, 0, 0), b"v1");
    vm.sha256 = "0".repeat(64);
    env.define_vm("org/core", vm);

    let err = install(&env.store, &env.installer, &name("org/core:evm")).unwrap_err();
    assert!(matches!(err, InstallError::ChecksumMismatch { .. }));
    assert_eq!(env.installed_version(&name("org/core:evm")), None);
}

#[test]
fn uninstall_removes_binary_and_record() {
    let env = Env::new();
    env.define_vm("org/core", env.vm("evm", "evm-id", Version::new(1, 0, 0), b"v1"));
    install(&env.store, &env.installer, &name("org/core:evm")).unwrap();

    let outcome = uninstall(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    assert_eq!(
        outcome,
        UninstallOutcome::Uninstalled {
            name: name("org/core:evm"),
            removed_binary: true
        }
    );
    assert!(!env.plugin("evm-id").exists());
    assert_eq!(env.installed_version(&name("org/core:evm")), None);

    let again = uninstall(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    assert!(matches!(again, UninstallOutcome::NotInstalled { .. }));
}

// ---------------------------------------------------------------------------
// upgrade
// ---------------------------------------------------------------------------

#[test]
fn upgrade_reinstalls_only_newer_definitions() {
    let env = Env::new();
    env.define_vm("org/core", env.vm("evm", "evm-id", Version::new(1, 0, 0), b"v1"));
    env.define_vm("org/core", env.vm("spaces", "spaces-id", Version::new(0, 1, 0), b"s1"));
    install(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    install(&env.store, &env.installer, &name("org/core:spaces")).unwrap();

    env.define_vm("org/core", env.vm("evm", "evm-id", Version::new(1, 1, 0), b"v2"));

    let reports = upgrade_all(&env.store, &env.installer).unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(
        reports[0].outcome,
        UpgradeOutcome::Upgraded {
            from: Version::new(1, 0, 0),
            to: Version::new(1, 1, 0)
        }
    );
    assert_eq!(
        reports[1].outcome,
        UpgradeOutcome::UpToDate {
            version: Version::new(0, 1, 0)
        }
    );
    assert_eq!(read(&env.plugin("evm-id")), b"v2");
    assert_eq!(
        env.installed_version(&name("org/core:evm")),
        Some(Version::new(1, 1, 0))
    );
}

#[test]
fn upgrade_skips_vms_whose_definition_disappeared() {
    let env = Env::new();
    env.define_vm("org/core", env.vm("evm", "evm-id", Version::new(1, 0, 0), b"v1"));
    install(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    env.drop_vm("org/core", "evm");

    let report = upgrade_vm(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    assert!(matches!(
        report.outcome,
        UpgradeOutcome::DefinitionMissing { .. }
    ));
    assert_eq!(read(&env.plugin("evm-id")), b"v1");
}

#[test]
fn upgrade_of_uninstalled_vm_reports_not_installed() {
    let env = Env::new();
    let report = upgrade_vm(&env.store, &env.installer, &name("org/core:evm")).unwrap();
    assert_eq!(report.outcome, UpgradeOutcome::NotInstalled);
}

#[test]
fn upgrade_repository_leaves_other_repositories_alone() {
    let env = Env::new();
    env.define_vm("org/one", env.vm("evm", "one-evm", Version::new(1, 0, 0), b"one-v1"));
    env.define_vm("org/two", env.vm("evm", "two-evm", Version::new(1, 0, 0), b"two-v1"));
    install(&env.store, &env.installer, &name("org/one:evm")).unwrap();
    install(&env.store, &env.installer, &name("org/two:evm")).unwrap();

    env.define_vm("org/one", env.vm("evm", "one-evm", Version::new(2, 0, 0), b"one-v2"));
    env.define_vm("org/two", env.vm("evm", "two-evm", Version::new(2, 0, 0), b"two-v2"));

    let reports =
        upgrade_repository(&env.store, &env.installer, &"org/one".parse().unwrap()).unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].upgraded());
    assert_eq!(read(&env.plugin("one-evm")), b"one-v2");
    assert_eq!(read(&env.plugin("two-evm")), b"two-v1");
}

// ---------------------------------------------------------------------------
// join-subnet
// ---------------------------------------------------------------------------

/// Records admin calls; answers every call with the configured result.
struct FakeAdmin {
    offline: bool,
    calls: RefCell<Vec<String>>,
}

impl FakeAdmin {
    fn new(offline: bool) -> Self {
        Self {
            offline,
            calls: RefCell::new(Vec::new()),
        }
    }

    fn answer(&self, call: String) -> Result<(), AdminError> {
        self.calls.borrow_mut().push(call);
        if self.offline {
            Err(AdminError::Offline {
                endpoint: self.endpoint().to_owned(),
            })
        } else {
            Ok(())
        }
    }
}

impl AdminApi for FakeAdmin {
    fn load_vms(&self) -> Result<(), AdminError> {
        self.answer("admin.loadVMs".into())
    }

    fn whitelist_subnet(&self, subnet_id: &str) -> Result<(), AdminError> {
        self.answer(format!("admin.whitelistSubnet {subnet_id}"))
    }

    fn endpoint(&self) -> &str {
        "127.0.0.1:9650/ext/admin"
    }
}

fn define_subnet(env: &Env, repository: &str, alias: &str, vms: &[&str]) {
    let repository = repository.parse().unwrap();
    let subnet = SubnetDefinition {
        id: format!("{alias}-subnet-id"),
        alias: alias.into(),
        homepage: String::new(),
        description: String::new(),
        maintainers: vec![],
        vms: vms.iter().map(|v| v.to_string()).collect(),
        version: Version::new(1, 0, 0),
    };
    env.store
        .update(|txn| {
            RepositoryStore::new(&repository).subnets().put(
                txn,
                alias,
                &Definition {
                    definition: subnet,
                    commit: CommitHash::from_bytes([1; 20]),
                },
            )
        })
        .unwrap();
}

#[test]
fn join_subnet_installs_vms_then_notifies_node() {
    let env = Env::new();
    env.define_vm("org/core", env.vm("spacesvm", "spaces-id", Version::new(1, 0, 0), b"s"));
    define_subnet(&env, "org/core", "spaces", &["spacesvm"]);
    let admin = FakeAdmin::new(false);

    let report = join_subnet(&env.store, &env.installer, &admin, &name("org/core:spaces")).unwrap();

    assert_eq!(report.subnet_id, "spaces-subnet-id");
    assert_eq!(report.vms.len(), 1);
    assert!(!report.load_deferred && !report.whitelist_deferred);
    assert!(env.plugin("spaces-id").exists());
    assert_eq!(
        *admin.calls.borrow(),
        vec![
            "admin.loadVMs".to_string(),
            "admin.whitelistSubnet spaces-subnet-id".to_string()
        ]
    );
}

#[test]
fn join_subnet_with_offline_node_still_succeeds() {
    let env = Env::new();
    env.define_vm("org/core", env.vm("spacesvm", "spaces-id", Version::new(1, 0, 0), b"s"));
    define_subnet(&env, "org/core", "spaces", &["spacesvm"]);
    let admin = FakeAdmin::new(true);

    let report = join_subnet(&env.store, &env.installer, &admin, &name("org/core:spaces")).unwrap();
    assert!(report.load_deferred);
    assert!(report.whitelist_deferred);
    assert!(env.plugin("spaces-id").exists());
}

#[test]
fn join_subnet_fails_when_a_vm_is_undefined() {
    let env = Env::new();
    define_subnet(&env, "org/core", "spaces", &["missing-vm"]);
    let admin = FakeAdmin::new(false);

    let err = join_subnet(&env.store, &env.installer, &admin, &name("org/core:spaces")).unwrap_err();
    assert!(matches!(&err, InstallError::Core(CoreError::NotFound { .. })), "got: {err}");
    assert!(admin.calls.borrow().is_empty());
}
