//! plugman core library: domain types, typed key-value storage and the
//! stores built on it.
//!
//! - [`types`]: definitions, names, commit hashes, versions
//! - [`kv`]: [`KvStore`] and namespaced [`Storage`]
//! - [`sources`], [`registry`], [`repository`], [`installed`]: the stores
//! - [`config`]: [`Config`] and [`Credentials`]

pub mod config;
pub mod error;
pub mod installed;
pub mod kv;
pub mod paths;
pub mod registry;
pub mod repository;
pub mod sources;
pub mod types;

pub use config::{Config, Credentials, Overrides, RepositoryConfig};
pub use error::CoreError;
pub use installed::InstalledStore;
pub use kv::{KeyValue, KeyValueMut, KvStore, Namespace, ReadTxn, Storage, WriteTxn};
pub use registry::AliasRegistry;
pub use repository::RepositoryStore;
pub use sources::SourceList;
pub use types::{
    CommitHash, Definition, DefinitionKind, InstallInfo, Plugin, QualifiedName, RepoAlias,
    RepoList, SourceInfo, SubnetDefinition, Version, VmDefinition, valid_plugin_alias,
};
