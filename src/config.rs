use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Clinsight";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Env var pointing at an explicit pipeline config file.
pub const CONFIG_ENV_VAR: &str = "CLINSIGHT_CONFIG";

/// Env var enabling the per-document diagnostic dump.
pub const DUMP_DIR_ENV_VAR: &str = "CLINSIGHT_DUMP_DIR";

const CONFIG_FILE_NAME: &str = "config.json";

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "clinsight_lib=info,warn"
}

/// Per-user configuration directory (`~/.config/clinsight` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("clinsight"))
}

/// Resolve the config file location.
///
/// `CLINSIGHT_CONFIG` wins; otherwise `config.json` under [`config_dir`].
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Base directory for diagnostic dumps, when enabled.
pub fn dump_base_dir() -> Option<PathBuf> {
    std::env::var(DUMP_DIR_ENV_VAR)
        .ok()
        .filter(|d| !d.trim().is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_dir_is_app_scoped() {
        if let Some(dir) = config_dir() {
            assert!(dir.ends_with("clinsight"));
        }
    }

    #[test]
    fn default_filter_targets_crate() {
        assert!(default_log_filter().starts_with("clinsight_lib="));
    }

    #[test]
    fn app_name_is_clinsight() {
        assert_eq!(APP_NAME, "Clinsight");
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }
}
