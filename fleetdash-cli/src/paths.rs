//! Platform-specific directory paths.
//!
//! Uses XDG on Linux, standard locations on macOS/Windows.

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use directories::ProjectDirs;

const QUALIFIER: &str = "dev";
const ORGANIZATION: &str = "fleetdash";
const APPLICATION: &str = "fleetdash";

/// Get project directories, or None if home directory cannot be determined.
fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

/// Get the data directory for the cache and call log databases.
///
/// - Linux: `$XDG_DATA_HOME/fleetdash` or `~/.local/share/fleetdash`
/// - macOS: `~/Library/Application Support/dev.fleetdash.fleetdash`
/// - Windows: `C:\Users\<User>\AppData\Roaming\fleetdash\fleetdash\data`
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the cache directory, where logs go.
pub fn cache_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Get the config directory.
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default path of the settings file.
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Default path of the durable cache database.
pub fn store_db() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("fleet_cache.db"))
}

/// Default path of the call log database.
pub fn call_log_db() -> Option<PathBuf> {
    data_dir().map(|dir| dir.join("api_calls.db"))
}

const LATEST_LOG: &str = "latest.log";
const ARCHIVE_PREFIX: &str = "fleetdash-";

/// Get the path to the latest log file.
pub fn log_file() -> Option<PathBuf> {
    cache_dir().map(|dir| dir.join(LATEST_LOG))
}

/// Moves `latest.log` in `dir` aside under a timestamped name, then
/// deletes all but the newest `keep` archives.
pub fn rotate_logs(dir: &Path, keep: usize) -> io::Result<()> {
    let latest = dir.join(LATEST_LOG);
    if latest.exists() {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        fs::rename(&latest, dir.join(format!("{ARCHIVE_PREFIX}{stamp}.log")))?;
    }

    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| is_archive(path))
        .collect();
    // Timestamped names sort oldest first
    archives.sort();

    let excess = archives.len().saturating_sub(keep);
    for path in &archives[..excess] {
        fs::remove_file(path)?;
    }
    Ok(())
}

fn is_archive(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(ARCHIVE_PREFIX) && name.ends_with(".log"))
}
