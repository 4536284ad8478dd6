use std::path::{Path, PathBuf};

pub const PLUGMAN_DIR: &str = ".plugman";
pub const CONFIG_FILE: &str = "config.yaml";

pub fn plugman_root(home: &Path) -> PathBuf {
    home.join(PLUGMAN_DIR)
}

pub fn default_config_path(home: &Path) -> PathBuf {
    plugman_root(home).join(CONFIG_FILE)
}

pub fn db_dir(directory: &Path) -> PathBuf {
    directory.join("db")
}

pub fn repositories_dir(directory: &Path) -> PathBuf {
    directory.join("repositories")
}

pub fn tmp_dir(directory: &Path) -> PathBuf {
    directory.join("tmp")
}

pub fn default_plugin_dir(home: &Path) -> PathBuf {
    home.join(".avalanchego").join("plugins")
}
