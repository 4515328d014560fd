use std::path::PathBuf;

use directories::ProjectDirs;

const PROJECT_ROOT: &str = env!("CARGO_MANIFEST_DIR");

/// Environment variable naming the storage location.
pub const DATABASE_ENV: &str = "KANBAN_DB";

const DEFAULT_DATABASE_FILE: &str = "kanban.db";

/// Directory holding the application's data files.
///
/// Debug builds keep everything under `dev_assets/` in the workspace; release builds use
/// the platform data directory. The directory is not created here.
pub fn asset_dir() -> PathBuf {
    if cfg!(debug_assertions) {
        return PathBuf::from(PROJECT_ROOT).join("../../dev_assets");
    }
    match ProjectDirs::from("dev", "kanban", "kanban") {
        Some(dirs) => dirs.data_dir().to_path_buf(),
        None => {
            tracing::warn!("No home directory available, using working directory for data");
            PathBuf::from(".")
        }
    }
    // ✔ macOS → ~/Library/Application Support/dev.kanban.kanban
    // ✔ Linux → ~/.local/share/kanban   (respects XDG_DATA_HOME)
    // ✔ Windows → %APPDATA%\kanban\kanban
}

/// Get the database file path.
///
/// Respects the `KANBAN_DB` environment variable. Accepts `sqlite:///abs/path`,
/// `sqlite://path` or a plain path, with tilde expansion.
///
/// Default: `{asset_dir}/kanban.db`
pub fn database_path() -> PathBuf {
    match std::env::var(DATABASE_ENV) {
        Ok(value) if !value.trim().is_empty() => database_path_from_uri(value.trim()),
        _ => asset_dir().join(DEFAULT_DATABASE_FILE),
    }
}

/// Strip an optional `sqlite:` URI scheme and expand `~`.
pub fn database_path_from_uri(uri: &str) -> PathBuf {
    let raw = uri
        .strip_prefix("sqlite:///")
        .map(|rest| format!("/{rest}"))
        .or_else(|| uri.strip_prefix("sqlite://").map(str::to_string))
        .or_else(|| uri.strip_prefix("sqlite:").map(str::to_string))
        .unwrap_or_else(|| uri.to_string());
    crate::path::expand_tilde(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_database_path_default() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::remove_var(DATABASE_ENV) };
        let path = database_path();
        assert!(path.ends_with("kanban.db"));
    }

    #[test]
    #[serial]
    fn test_database_path_env_override() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::set_var(DATABASE_ENV, "/custom/path/test.db") };
        let path = database_path();
        unsafe { env::remove_var(DATABASE_ENV) };
        assert_eq!(path, PathBuf::from("/custom/path/test.db"));
    }

    #[test]
    #[serial]
    fn test_database_path_sqlite_uri() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::set_var(DATABASE_ENV, "sqlite:///var/lib/kanban.db") };
        let path = database_path();
        unsafe { env::remove_var(DATABASE_ENV) };
        assert_eq!(path, PathBuf::from("/var/lib/kanban.db"));
    }

    #[test]
    #[serial]
    fn test_database_path_tilde_expansion() {
        // SAFETY: Tests run serially via #[serial] attribute
        unsafe { env::set_var(DATABASE_ENV, "~/kanban/db.sqlite") };
        let path = database_path();
        unsafe { env::remove_var(DATABASE_ENV) };
        assert!(!path.to_string_lossy().contains('~'));
        assert!(path.is_absolute());
    }

    #[test]
    fn test_database_path_from_relative_uri() {
        assert_eq!(
            database_path_from_uri("sqlite://kanban.db"),
            PathBuf::from("kanban.db")
        );
        assert_eq!(database_path_from_uri("data/k.db"), PathBuf::from("data/k.db"));
    }
}
