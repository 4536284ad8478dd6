//! Domain types for plugin definitions, tracked repositories and installs.
//!
//! Everything persisted in the store is serializable via serde; definition
//! files read from repository working trees are YAML.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Separates a repository alias from a plugin alias: `org/repo:plugin`.
pub const QUALIFIED_NAME_DELIMITER: char = ':';

/// Separates organization from repository: `org/repo`.
pub const ALIAS_DELIMITER: char = '/';

// ---------------------------------------------------------------------------
// Commit hashes
// ---------------------------------------------------------------------------

/// A 160-bit git object id. [`CommitHash::ZERO`] means "no history".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CommitHash([u8; 20]);

impl CommitHash {
    pub const ZERO: CommitHash = CommitHash([0; 20]);

    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Build from a raw slice; `None` unless it is exactly 20 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 20]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// First seven hex digits, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(7);
        hex
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for CommitHash {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidCommit {
            value: s.to_owned(),
        };
        let bytes = hex::decode(s).map_err(|_| invalid())?;
        Self::from_slice(&bytes).ok_or_else(invalid)
    }
}

impl Serialize for CommitHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CommitHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Semantic versions
// ---------------------------------------------------------------------------

/// A `major.minor.patch` version. Ordering is major, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidVersion {
            value: s.to_owned(),
        };
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let mut parts = digits.split('.').map(|p| p.parse::<u64>());
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch)), None) => {
                Ok(Self::new(major, minor, patch))
            }
            _ => Err(invalid()),
        }
    }
}

/// Definition files spell versions either as a mapping or as a literal.
#[derive(Deserialize)]
#[serde(untagged)]
enum VersionCompat {
    Structured {
        major: u64,
        #[serde(default)]
        minor: u64,
        #[serde(default)]
        patch: u64,
    },
    Literal(String),
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match VersionCompat::deserialize(deserializer)? {
            VersionCompat::Structured {
                major,
                minor,
                patch,
            } => Ok(Self::new(major, minor, patch)),
            VersionCompat::Literal(s) => s.parse().map_err(D::Error::custom),
        }
    }
}

// ---------------------------------------------------------------------------
// Names
// ---------------------------------------------------------------------------

/// A repository alias in `organization/repository` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoAlias {
    organization: String,
    repository: String,
}

impl RepoAlias {
    pub fn organization(&self) -> &str {
        &self.organization
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// `<root>/<organization>/<repository>`, where the git mirror lives.
    pub fn working_tree(&self, root: &Path) -> PathBuf {
        root.join(&self.organization).join(&self.repository)
    }
}

impl FromStr for RepoAlias {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidAlias {
            alias: s.to_owned(),
        };
        let (organization, repository) = s.split_once(ALIAS_DELIMITER).ok_or_else(invalid)?;
        if !valid_segment(organization) || !valid_segment(repository) {
            return Err(invalid());
        }
        Ok(Self {
            organization: organization.to_owned(),
            repository: repository.to_owned(),
        })
    }
}

/// True when `alias` can name a plugin: one non-empty segment with no
/// delimiter, NUL or whitespace, so both its bare and qualified forms parse.
pub fn valid_plugin_alias(alias: &str) -> bool {
    valid_segment(alias)
}

fn valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.chars().any(|c| {
            c == ALIAS_DELIMITER || c == QUALIFIED_NAME_DELIMITER || c == '\0' || c.is_whitespace()
        })
}

impl TryFrom<String> for RepoAlias {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RepoAlias> for String {
    fn from(alias: RepoAlias) -> Self {
        alias.to_string()
    }
}

impl fmt::Display for RepoAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.organization, ALIAS_DELIMITER, self.repository)
    }
}

/// A fully qualified plugin name: `organization/repository:alias`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    pub repository: RepoAlias,
    pub plugin: String,
}

impl QualifiedName {
    pub fn new(repository: RepoAlias, plugin: impl Into<String>) -> Self {
        Self {
            repository,
            plugin: plugin.into(),
        }
    }

    /// True when `name` carries a repository qualifier.
    pub fn is_qualified(name: &str) -> bool {
        name.contains(QUALIFIED_NAME_DELIMITER)
    }
}

impl FromStr for QualifiedName {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidName { name: s.to_owned() };
        let (repository, plugin) = s.split_once(QUALIFIED_NAME_DELIMITER).ok_or_else(invalid)?;
        if plugin.is_empty() || plugin.contains(QUALIFIED_NAME_DELIMITER) {
            return Err(invalid());
        }
        Ok(Self::new(repository.parse()?, plugin))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.repository, QUALIFIED_NAME_DELIMITER, self.plugin)
    }
}

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

/// The closed set of definition categories a repository can publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Vm,
    Subnet,
}

impl DefinitionKind {
    /// Directory inside a repository working tree holding this category.
    pub fn dir_name(self) -> &'static str {
        match self {
            DefinitionKind::Vm => "vms",
            DefinitionKind::Subnet => "subnets",
        }
    }

    /// Top-level key of a definition file for this category.
    pub fn file_key(self) -> &'static str {
        match self {
            DefinitionKind::Vm => "vm",
            DefinitionKind::Subnet => "subnet",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_key())
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::VmDefinition {}
    impl Sealed for super::SubnetDefinition {}
}

/// Capability shared by every definition payload.
pub trait Plugin:
    Serialize + DeserializeOwned + Clone + PartialEq + fmt::Debug + sealed::Sealed
{
    const KIND: DefinitionKind;

    fn alias(&self) -> &str;
}

/// A virtual machine plugin as published under `<repo>/vms/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmDefinition {
    pub id: String,
    pub alias: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maintainers: Vec<String>,
    /// Optional post-install hook, run with `sh`.
    #[serde(default)]
    pub install_script: String,
    /// Download location of the plugin binary.
    #[serde(default)]
    pub url: String,
    /// Hex SHA-256 of the artifact at `url`.
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub version: Version,
}

impl Plugin for VmDefinition {
    const KIND: DefinitionKind = DefinitionKind::Vm;

    fn alias(&self) -> &str {
        &self.alias
    }
}

/// A subnet as published under `<repo>/subnets/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetDefinition {
    pub id: String,
    pub alias: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub maintainers: Vec<String>,
    /// Aliases of the VMs (in the same repository) the subnet runs.
    #[serde(default)]
    pub vms: Vec<String>,
    #[serde(default)]
    pub version: Version,
}

impl Plugin for SubnetDefinition {
    const KIND: DefinitionKind = DefinitionKind::Subnet;

    fn alias(&self) -> &str {
        &self.alias
    }
}

/// A definition tagged with the repository commit it was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Definition<T> {
    pub definition: T,
    pub commit: CommitHash,
}

// ---------------------------------------------------------------------------
// Store records
// ---------------------------------------------------------------------------

/// A tracked source repository and its last synced commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub alias: RepoAlias,
    pub url: String,
    pub branch: String,
    /// [`CommitHash::ZERO`] until the first successful sync.
    pub commit: CommitHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl SourceInfo {
    pub fn new(alias: RepoAlias, url: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            alias,
            url: url.into(),
            branch: branch.into(),
            commit: CommitHash::ZERO,
            synced_at: None,
        }
    }

    pub fn is_synced(&self) -> bool {
        !self.commit.is_zero()
    }
}

/// The repositories defining a plugin under one bare alias.
/// e.g. `foo/x:evm`, `bar/y:evm` => `evm: [bar/y, foo/x]`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RepoList {
    pub repositories: BTreeSet<RepoAlias>,
}

impl RepoList {
    /// Returns `false` if the repository was already listed.
    pub fn insert(&mut self, repository: RepoAlias) -> bool {
        self.repositories.insert(repository)
    }

    /// Returns `false` if the repository was not listed.
    pub fn remove(&mut self, repository: &RepoAlias) -> bool {
        self.repositories.remove(repository)
    }

    pub fn contains(&self, repository: &RepoAlias) -> bool {
        self.repositories.contains(repository)
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }
}

/// An installed VM binary, keyed in the store by its qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallInfo {
    pub id: String,
    pub version: Version,
    /// Repository commit of the definition the binary was installed from.
    pub commit: CommitHash,
    pub installed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
