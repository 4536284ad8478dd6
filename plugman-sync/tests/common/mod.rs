#![allow(dead_code)]

use std::path::{Path, PathBuf};

use git2::{IndexAddOption, Repository, RepositoryInitOptions, Signature};
use plugman_core::CommitHash;
use tempfile::TempDir;

pub const BRANCH: &str = "main";

/// A local repository standing in for a plugin repository's remote.
pub struct Upstream {
    dir: TempDir,
    repo: Repository,
}

impl Upstream {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("upstream dir");
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(BRANCH);
        let repo = Repository::init_opts(dir.path(), &opts).expect("init upstream");
        Self { dir, repo }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        self.dir.path().display().to_string()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write upstream file");
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.dir.path().join(relative)).expect("remove upstream file");
    }

    /// Stage everything in the tree and commit it on `main`.
    pub fn commit(&self, message: &str) -> CommitHash {
        let mut index = self.repo.index().expect("index");
        index
            .add_all(["*"], IndexAddOption::DEFAULT, None)
            .expect("add all");
        index.update_all(["*"], None).expect("update all");
        index.write().expect("write index");
        let tree = self
            .repo
            .find_tree(index.write_tree().expect("write tree"))
            .expect("find tree");

        let signature = Signature::now("plugman", "plugman@localhost").expect("signature");
        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<_> = parent.iter().collect();
        let oid = self
            .repo
            .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .expect("commit");
        CommitHash::from_slice(oid.as_bytes()).expect("sha1 oid")
    }

    pub fn add_vm(&self, alias: &str, id: &str, version: &str, url: &str) {
        self.write(&format!("vms/{alias}.yaml"), &vm_yaml(alias, id, version, url));
    }

    pub fn add_subnet(&self, alias: &str, id: &str, vms: &[&str]) {
        self.write(&format!("subnets/{alias}.yaml"), &subnet_yaml(alias, id, vms));
    }
}

pub fn vm_yaml(alias: &str, id: &str, version: &str, url: &str) -> String {
    format!(
        "vm:\n  id: {id}\n  alias: {alias}\n  homepage: https://example.com/{alias}\n  \
         description: {alias} test vm\n  url: \"{url}\"\n  version: \"{version}\"\n"
    )
}

pub fn subnet_yaml(alias: &str, id: &str, vms: &[&str]) -> String {
    let mut yaml = format!("subnet:\n  id: {id}\n  alias: {alias}\n  vms:\n");
    for vm in vms {
        yaml.push_str(&format!("    - {vm}\n"));
    }
    yaml
}

/// Write a fake VM binary and return its `file://` URL.
pub fn artifact(dir: &Path, name: &str, content: &[u8]) -> String {
    let path: PathBuf = dir.join(name);
    std::fs::write(&path, content).expect("write artifact");
    format!("file://{}", path.display())
}
