//! End-to-end runs of the `plugman` binary against a local git repository.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
use predicates::prelude::*;
use tempfile::TempDir;

struct Fixture {
    home: TempDir,
    upstream: TempDir,
    repo: Repository,
}

impl Fixture {
    fn new() -> Self {
        let home = TempDir::new().unwrap();
        let upstream = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(upstream.path(), &opts).unwrap();

        let fixture = Self {
            home,
            upstream,
            repo,
        };
        let evm = fixture.artifact("evm.bin", b"evm binary");
        fixture.write("vms/evm.yaml", &vm_yaml("evm", "evmID", "1.0.0", &evm));
        fixture.write(
            "subnets/evmnet.yaml",
            "subnet:\n  id: evmnetID\n  alias: evmnet\n  vms:\n    - evm\n",
        );
        fixture.commit("initial");

        let config = format!(
            "directory: {}\nplugin-dir: {}\ndefault-repository:\n  alias: org/core\n  url: {}\n  branch: main\n",
            fixture.state().display(),
            fixture.plugins().display(),
            fixture.upstream.path().display(),
        );
        std::fs::write(fixture.config_file(), config).unwrap();
        fixture
    }

    fn state(&self) -> PathBuf {
        self.home.path().join("state")
    }

    fn plugins(&self) -> PathBuf {
        self.home.path().join("plugins")
    }

    fn config_file(&self) -> PathBuf {
        self.home.path().join("plugman.yaml")
    }

    fn artifact(&self, name: &str, content: &[u8]) -> String {
        let path = self.home.path().join(name);
        std::fs::write(&path, content).unwrap();
        format!("file://{}", path.display())
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.upstream.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn commit(&self, message: &str) {
        let mut index = self.repo.index().unwrap();
        index.add_all(["*"], IndexAddOption::DEFAULT, None).unwrap();
        index.update_all(["*"], None).unwrap();
        index.write().unwrap();
        let tree = self.repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = Signature::now("plugman", "plugman@localhost").unwrap();
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .unwrap();
    }

    fn plugman(&self) -> Command {
        let mut cmd = Command::cargo_bin("plugman").unwrap();
        cmd.env("HOME", self.home.path())
            .env("NO_COLOR", "1")
            .env_remove("RUST_LOG")
            .arg("--config-file")
            .arg(self.config_file());
        cmd
    }
}

fn vm_yaml(alias: &str, id: &str, version: &str, url: &str) -> String {
    format!("vm:\n  id: {id}\n  alias: {alias}\n  url: \"{url}\"\n  version: \"{version}\"\n")
}

fn missing(path: &Path) -> String {
    path.join("does-not-exist").display().to_string()
}

#[test]
fn list_repositories_shows_the_bootstrapped_default() {
    let fx = Fixture::new();

    let output = fx
        .plugman()
        .args(["list-repositories", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["alias"], "org/core");
    assert_eq!(rows[0]["branch"], "main");
    assert!(rows[0]["commit"].is_string());
}

#[test]
fn list_repositories_renders_a_table() {
    let fx = Fixture::new();
    fx.plugman()
        .arg("list-repositories")
        .assert()
        .success()
        .stdout(predicate::str::contains("org/core").and(predicate::str::contains("last sync")));
}

#[test]
fn update_dry_run_reports_without_applying() {
    let fx = Fixture::new();
    fx.plugman().arg("list-repositories").assert().success();

    fx.write("vms/spaces.yaml", &vm_yaml("spaces", "spacesID", "1.0.0", "file:///dev/null"));
    fx.commit("add spaces");

    fx.plugman()
        .args(["update", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run]").and(predicate::str::contains("vm spaces")));

    fx.plugman()
        .args(["install", "spaces"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    fx.plugman()
        .args(["update", "--repository", "org/core"])
        .assert()
        .success()
        .stdout(predicate::str::contains("vm spaces"));
}

#[test]
fn install_and_uninstall_by_alias() {
    let fx = Fixture::new();
    let binary = fx.plugins().join("evmID");

    fx.plugman()
        .args(["install", "evm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("installed org/core:evm 1.0.0"));
    assert_eq!(std::fs::read(&binary).unwrap(), b"evm binary");

    fx.plugman()
        .args(["install", "org/core:evm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already installed"));

    fx.plugman()
        .args(["uninstall", "evm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("uninstalled org/core:evm"));
    assert!(!binary.exists());
}

#[test]
fn update_then_upgrade_picks_up_new_version() {
    let fx = Fixture::new();
    fx.plugman().args(["install", "evm"]).assert().success();

    let v2 = fx.artifact("evm-2.bin", b"evm v2");
    fx.write("vms/evm.yaml", &vm_yaml("evm", "evmID", "1.1.0", &v2));
    fx.commit("evm 1.1.0");

    // The pass rebuilds installed VMs of the synced repository.
    fx.plugman()
        .arg("update")
        .assert()
        .success()
        .stdout(predicate::str::contains("upgraded org/core:evm 1.0.0 -> 1.1.0"));
    assert_eq!(std::fs::read(fx.plugins().join("evmID")).unwrap(), b"evm v2");

    fx.plugman()
        .arg("upgrade")
        .assert()
        .success()
        .stdout(predicate::str::contains("org/core:evm 1.1.0 is up to date"));
}

#[test]
fn default_repository_cannot_be_removed() {
    let fx = Fixture::new();
    fx.plugman()
        .args(["remove-repository", "org/core"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required repository"));
}

#[test]
fn add_and_remove_repository() {
    let fx = Fixture::new();
    let url = missing(fx.home.path());

    fx.plugman()
        .args(["add-repository", "org/extra", &url])
        .assert()
        .success()
        .stdout(predicate::str::contains("added org/extra"));
    fx.plugman()
        .args(["add-repository", "org/extra", &url])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already tracked"));

    fx.plugman()
        .args(["remove-repository", "org/extra"])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed org/extra"));
    fx.plugman()
        .args(["list-repositories", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org/extra").not());
}

#[test]
fn update_fails_overall_when_one_repository_fails() {
    let fx = Fixture::new();
    let url = missing(fx.home.path());
    fx.plugman()
        .args(["add-repository", "org/broken", &url])
        .assert()
        .success();

    fx.plugman()
        .arg("update")
        .assert()
        .failure()
        .stdout(predicate::str::contains("org/core"))
        .stderr(predicate::str::contains("org/broken"));
}

#[test]
fn join_subnet_with_offline_node_still_succeeds() {
    let fx = Fixture::new();
    fx.plugman()
        .args(["--admin-api-endpoint", "127.0.0.1:1/ext/admin"])
        .args(["join-subnet", "evmnet"])
        .assert()
        .success()
        .stdout(predicate::str::contains("offline").and(predicate::str::contains("evmnetID")));
    assert!(fx.plugins().join("evmID").is_file());
}

#[test]
fn malformed_config_file_is_rejected() {
    let fx = Fixture::new();
    std::fs::write(fx.config_file(), "no-such-key: 1\n").unwrap();
    fx.plugman()
        .arg("list-repositories")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load config"));
}
