//! The `Manager` facade: one handle per process owning the store and the
//! collaborators every command needs.

use std::path::Path;
use std::time::Duration;

use plugman_core::{
    AliasRegistry, Config, Credentials, KvStore, QualifiedName, RepoAlias, RepositoryStore,
    SourceInfo, SourceList,
};
use plugman_install::{
    AdminApi, AdminClient, HttpFetcher, InstallOutcome, Installer, JoinReport, UninstallOutcome,
    UpgradeReport, VmInstaller,
};

use crate::engine::{Cancellation, RepositoryReport, SyncEngine, SyncSummary};
use crate::error::{io_err, SyncError};
use crate::git::{Git2Mirror, GitMirror};
use crate::pipeline::{self, SyncScope};

/// What `remove-repository` deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedRepository {
    pub alias: RepoAlias,
    /// Aliases of the VM and subnet definitions that were dropped.
    pub definitions: Vec<String>,
    /// Alias-registry entries the repository was pruned from.
    pub registry_entries: Vec<String>,
}

pub struct Manager {
    config: Config,
    store: KvStore,
    credentials: Option<Credentials>,
    git: Box<dyn GitMirror>,
    installer: Box<dyn Installer>,
    admin: Box<dyn AdminApi>,
    cancel: Cancellation,
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.config)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Open the store under `config.directory` with the production git,
    /// installer and admin-API implementations.
    pub fn open(config: Config) -> Result<Self, SyncError> {
        let timeout = Duration::from_secs(config.http_timeout_secs);
        let installer = VmInstaller::new(
            config.plugin_dir.clone(),
            config.tmp_dir(),
            HttpFetcher::new(timeout),
        );
        let admin = AdminClient::new(config.admin_api_endpoint.clone(), timeout);
        Self::with_components(config, Box::new(Git2Mirror), Box::new(installer), Box::new(admin))
    }

    /// Like [`Manager::open`] with explicit collaborators.
    pub fn with_components(
        config: Config,
        git: Box<dyn GitMirror>,
        installer: Box<dyn Installer>,
        admin: Box<dyn AdminApi>,
    ) -> Result<Self, SyncError> {
        let credentials = config.credentials()?;
        let store = KvStore::open(&config.db_dir())?;
        Ok(Self {
            config,
            store,
            credentials,
            git,
            installer,
            admin,
            cancel: Cancellation::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    /// Token that cancels any pass started through this manager.
    pub fn cancellation(&self) -> Cancellation {
        self.cancel.clone()
    }

    fn engine(&self) -> SyncEngine<'_> {
        SyncEngine::new(
            &self.store,
            self.git.as_ref(),
            self.installer.as_ref(),
            self.config.repositories_dir(),
        )
        .with_credentials(self.credentials.clone())
        .with_cancellation(self.cancel.clone())
    }

    // -----------------------------------------------------------------------
    // Repositories
    // -----------------------------------------------------------------------

    /// Make sure the default repository is tracked and has been synced once.
    /// Returns the pass report when a first sync ran.
    pub fn bootstrap(&self) -> Result<Option<RepositoryReport>, SyncError> {
        let default = &self.config.default_repository;
        let sources = SourceList::new();

        let info = SourceInfo::new(default.alias.clone(), &default.url, &default.branch);
        if self.store.update(|txn| sources.add(txn, info))? {
            tracing::info!(repository = %default.alias, "registered default repository");
        }

        let current = self.store.view(|txn| sources.get(txn, &default.alias))?;
        if current.is_synced() {
            return Ok(None);
        }
        tracing::info!(repository = %default.alias, "default repository never synced; syncing");
        self.engine().sync_repository(&default.alias, false).map(Some)
    }

    /// Start tracking `alias` at `url`/`branch`. Nothing is fetched until the
    /// next `update`.
    pub fn add_repository(&self, alias: &str, url: &str, branch: &str) -> Result<SourceInfo, SyncError> {
        let alias: RepoAlias = alias.parse()?;
        let info = SourceInfo::new(alias.clone(), url, branch);
        let sources = SourceList::new();
        if !self.store.update(|txn| sources.add(txn, info.clone()))? {
            return Err(SyncError::AlreadyTracked { alias });
        }
        tracing::info!(repository = %alias, url, branch, "added repository");
        Ok(info)
    }

    /// Stop tracking `alias`: drop its definitions, prune it from the alias
    /// registry, forget its source entry and delete its working tree.
    pub fn remove_repository(&self, alias: &str) -> Result<RemovedRepository, SyncError> {
        let alias: RepoAlias = alias.parse()?;
        if alias == self.config.default_repository.alias {
            return Err(SyncError::RequiredRepository { alias });
        }

        let sources = SourceList::new();
        let (definitions, registry_entries) = self.store.update(|txn| {
            sources.get(txn, &alias)?;
            let definitions = RepositoryStore::new(&alias).clear(txn)?;
            let registry_entries = AliasRegistry::new().purge_repository(txn, &alias)?;
            sources.remove(txn, &alias)?;
            Ok::<_, SyncError>((definitions, registry_entries))
        })?;

        let tree = alias.working_tree(&self.config.repositories_dir());
        remove_tree(&tree)?;
        tracing::info!(
            repository = %alias,
            definitions = definitions.len(),
            "removed repository"
        );

        Ok(RemovedRepository {
            alias,
            definitions,
            registry_entries,
        })
    }

    /// Tracked repositories ordered by alias.
    pub fn list_repositories(&self) -> Result<Vec<SourceInfo>, SyncError> {
        Ok(self.store.view(|txn| SourceList::new().list(txn))?)
    }

    /// Sync `scope`. Per-repository failures are in the summary; use
    /// [`SyncSummary::into_result`] to turn them into an error.
    pub fn update(&self, scope: SyncScope, dry_run: bool) -> Result<SyncSummary, SyncError> {
        pipeline::run(&self.engine(), scope, dry_run)
    }

    // -----------------------------------------------------------------------
    // Plugins
    // -----------------------------------------------------------------------

    /// Resolve a bare or qualified plugin name.
    pub fn resolve(&self, name: &str) -> Result<QualifiedName, SyncError> {
        Ok(self.store.view(|txn| AliasRegistry::new().resolve(txn, name))?)
    }

    pub fn install(&self, name: &str) -> Result<InstallOutcome, SyncError> {
        let name = self.resolve(name)?;
        Ok(plugman_install::install(&self.store, self.installer.as_ref(), &name)?)
    }

    pub fn uninstall(&self, name: &str) -> Result<UninstallOutcome, SyncError> {
        let name = self.resolve(name)?;
        Ok(plugman_install::uninstall(&self.store, self.installer.as_ref(), &name)?)
    }

    /// Upgrade one VM, or every installed VM when `name` is `None`.
    pub fn upgrade(&self, name: Option<&str>) -> Result<Vec<UpgradeReport>, SyncError> {
        let installer = self.installer.as_ref();
        let reports = match name {
            Some(name) => {
                let name = self.resolve(name)?;
                vec![plugman_install::upgrade_vm(&self.store, installer, &name)?]
            }
            None => plugman_install::upgrade_all(&self.store, installer)?,
        };
        Ok(reports)
    }

    pub fn join_subnet(&self, name: &str) -> Result<JoinReport, SyncError> {
        let name = self.resolve(name)?;
        Ok(plugman_install::join_subnet(
            &self.store,
            self.installer.as_ref(),
            self.admin.as_ref(),
            &name,
        )?)
    }
}

fn remove_tree(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(path, e)),
    }
}
