//! Application paths for config and state.

use directories::ProjectDirs;
use std::path::PathBuf;

/// Application paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config: PathBuf,
    pub data: PathBuf,
}

impl AppPaths {
    /// Platform directories for folio, falling back to dot-directories under
    /// the home directory.
    #[must_use]
    pub fn new() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("dev", "folio", "folio") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                data: proj_dirs.data_dir().to_path_buf(),
            }
        } else {
            let home = directories::BaseDirs::new()
                .map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_path_buf());
            Self {
                config: home.join(".config/folio"),
                data: home.join(".local/share/folio"),
            }
        }
    }

    /// Rooted at an explicit directory (tests, portable installs).
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config"),
            data: root.join("data"),
        }
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Quota, cooldown and attempt-log database.
    #[must_use]
    pub fn state_db_file(&self) -> PathBuf {
        self.data.join("folio-state.sqlite")
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.data)?;
        Ok(())
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooted_paths_nest_under_root() {
        let paths = AppPaths::rooted("/tmp/folio-root");
        assert_eq!(
            paths.config_file(),
            PathBuf::from("/tmp/folio-root/config/config.toml")
        );
        assert_eq!(
            paths.state_db_file(),
            PathBuf::from("/tmp/folio-root/data/folio-state.sqlite")
        );
    }

    #[test]
    fn ensure_dirs_creates_both() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted(dir.path());
        paths.ensure_dirs().unwrap();
        assert!(paths.config.is_dir());
        assert!(paths.data.is_dir());
    }
}
