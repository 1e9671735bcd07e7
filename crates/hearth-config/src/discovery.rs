//! Where config files live and how their layers stack.
//!
//! Two layers, user then project, the later one winning section by section.
//! A layer that fails to parse is skipped with a warning, so a typo in
//! `hearth.toml` never locks the user out of `hearth config`.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::{ConfigError, HearthConfig, Result};

/// Environment variable that replaces the user config directory.
pub const CONFIG_DIR_ENV: &str = "HEARTH_CONFIG_DIR";

/// File name inside the user config directory.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Per-directory override file.
pub const PROJECT_CONFIG_FILE: &str = "hearth.toml";

pub(crate) const APP_NAME: &str = "hearth";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    User,
    Project,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::User => "user",
            Layer::Project => "project",
        })
    }
}

/// One config file that was looked for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigSource {
    pub layer: Layer,
    pub path: PathBuf,
    pub loaded: bool,
}

/// The merged config and how it was put together.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: HearthConfig,
    /// Lowest precedence first.
    pub sources: Vec<ConfigSource>,
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    fn stack(&mut self, layer: Layer, path: PathBuf) {
        let loaded = path.is_file()
            && match read_config(&path) {
                Ok(config) => {
                    self.config.merge(config);
                    true
                }
                Err(e) => {
                    self.warnings
                        .push(format!("Skipped {} config {}: {}", layer, path.display(), e));
                    false
                }
            };
        self.sources.push(ConfigSource {
            layer,
            path,
            loaded,
        });
    }
}

/// Discover and merge the user and project layers.
///
/// `config_dir` stands in for the user config directory. The project layer
/// is `hearth.toml` in `project_dir`, or in the working directory.
pub fn load_config(project_dir: Option<&Path>, config_dir: Option<&Path>) -> LoadedConfig {
    let mut loaded = LoadedConfig {
        config: HearthConfig::new(),
        sources: Vec::new(),
        warnings: Vec::new(),
    };

    let user = config_dir
        .map(|dir| dir.join(USER_CONFIG_FILE))
        .or_else(user_config_path);
    if let Some(path) = user {
        loaded.stack(Layer::User, path);
    }
    let project = project_dir.unwrap_or(Path::new(".")).join(PROJECT_CONFIG_FILE);
    loaded.stack(Layer::Project, project);

    loaded
}

/// Parse and validate one config file.
pub fn read_config(path: &Path) -> Result<HearthConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    HearthConfig::from_toml(&contents)
}

/// Write `config` as TOML, creating parent directories.
pub fn save_config(config: &HearthConfig, path: &Path) -> Result<()> {
    let write_err = |path: &Path, source| ConfigError::WriteFile {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| write_err(parent, e))?;
    }
    std::fs::write(path, config.to_toml()?).map_err(|e| write_err(path, e))
}

/// `$HEARTH_CONFIG_DIR/config.toml`, else the platform config dir
/// (`~/.config/hearth/config.toml` on Linux).
pub fn user_config_path() -> Option<PathBuf> {
    let dir = match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::config_dir()?.join(APP_NAME),
    };
    Some(dir.join(USER_CONFIG_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loaded_layers(loaded: &LoadedConfig) -> Vec<Layer> {
        loaded
            .sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.layer)
            .collect()
    }

    #[test]
    fn test_no_files_gives_defaults() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        let loaded = load_config(Some(project.path()), Some(user.path()));

        assert_eq!(loaded.config, HearthConfig::new());
        assert_eq!(loaded.sources.len(), 2);
        assert_eq!(loaded.sources[0].layer, Layer::User);
        assert!(loaded_layers(&loaded).is_empty());
        assert!(loaded.warnings.is_empty());
    }

    #[test]
    fn test_project_layer_wins() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(
            user.path().join(USER_CONFIG_FILE),
            "[selector]\nmax_pii = 1\n[decay]\nhalflife_days = 14.0\n",
        )
        .unwrap();
        std::fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            "[selector]\nmax_pii = 3\n",
        )
        .unwrap();

        let loaded = load_config(Some(project.path()), Some(user.path()));
        assert_eq!(loaded.config.selector().max_pii, 3);
        assert_eq!(loaded.config.decay().halflife_days, 14.0);
        assert_eq!(loaded_layers(&loaded), vec![Layer::User, Layer::Project]);
    }

    #[test]
    fn test_broken_layer_is_skipped_with_warning() {
        let user = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(user.path().join(USER_CONFIG_FILE), "[selector\nbroken").unwrap();
        std::fs::write(
            project.path().join(PROJECT_CONFIG_FILE),
            "[decay]\nhalflife_days = 7.0\n",
        )
        .unwrap();

        let loaded = load_config(Some(project.path()), Some(user.path()));
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].starts_with("Skipped user config"));
        assert_eq!(loaded_layers(&loaded), vec![Layer::Project]);
        assert_eq!(loaded.config.decay().halflife_days, 7.0);
    }

    #[test]
    fn test_save_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(USER_CONFIG_FILE);
        let config = HearthConfig::from_toml("[embedding]\ndimensions = 64").unwrap();

        save_config(&config, &path).unwrap();
        assert_eq!(read_config(&path).unwrap(), config);
        assert!(matches!(
            read_config(&dir.path().join("nope.toml")),
            Err(ConfigError::ReadFile { .. })
        ));
    }
}
