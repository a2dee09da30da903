use std::{path::PathBuf, sync::OnceLock};

use directories::ProjectDirs;

pub const ASSET_DIR_ENV: &str = "GIT_ENGINE_ASSET_DIR";

/// Directory holding the engine's database and config file.
///
/// `GIT_ENGINE_ASSET_DIR` overrides the platform data directory. Debug builds
/// fall back to `dev_assets/` in the working directory so development runs
/// never touch a real installation.
pub fn asset_dir() -> PathBuf {
    static DIR: OnceLock<PathBuf> = OnceLock::new();
    DIR.get_or_init(|| {
        if let Some(dir) = std::env::var_os(ASSET_DIR_ENV) {
            return PathBuf::from(dir);
        }
        if cfg!(debug_assertions) {
            return PathBuf::from("dev_assets");
        }
        match ProjectDirs::from("dev", "git-engine", "git-engine") {
            Some(dirs) => dirs.data_dir().to_path_buf(),
            None => {
                tracing::warn!("No platform data directory available, using ./git-engine");
                PathBuf::from("git-engine")
            }
        }
    })
    .clone()
}

pub fn config_path() -> PathBuf {
    asset_dir().join("config.json")
}

pub fn database_path() -> PathBuf {
    asset_dir().join("db.sqlite")
}
