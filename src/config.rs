//! `hubsim.toml` plus environment and command-line overrides.
//!
//! Precedence, lowest first: built-in defaults, config file, `HUBSIM_*`
//! environment variables, CLI flags.

use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};

use crate::storage::Store;
use crate::storage::owners::OwnerInput;

pub const MEMORY_DATABASE: &str = ":memory:";

const ENV_DATABASE: &str = "HUBSIM_DATABASE";
const ENV_HOST: &str = "HUBSIM_HOST";
const ENV_PORT: &str = "HUBSIM_PORT";
const ENV_UI_DIR: &str = "HUBSIM_UI_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubsimConfig {
    /// SQLite file, or `:memory:`
    pub database: String,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_dir: Option<PathBuf>,
    /// Seed built-in types, association types and pipelines into an empty database
    pub seed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owners: Vec<OwnerInput>,
}

impl Default for HubsimConfig {
    fn default() -> Self {
        Self {
            database: default_database_path_in(Path::new(".")).display().to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            ui_dir: None,
            seed: true,
            owners: Vec::new(),
        }
    }
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub database: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub ui_dir: Option<PathBuf>,
}

impl HubsimConfig {
    /// Defaults overlaid with the config file when it exists
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Ok(load_config(path)?.unwrap_or_default())
    }

    /// Apply `HUBSIM_*` variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = database;
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = port
                .parse()
                .map_err(|_| anyhow::anyhow!("{} must be a port number, got {:?}", ENV_PORT, port))?;
        }
        if let Some(ui_dir) = lookup(ENV_UI_DIR) {
            self.ui_dir = Some(PathBuf::from(ui_dir));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(database) = overrides.database {
            self.database = database;
        }
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if overrides.ui_dir.is_some() {
            self.ui_dir = overrides.ui_dir;
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == MEMORY_DATABASE
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("could not resolve {}:{}", self.host, self.port))
    }

    /// Open the configured database, creating its directory first
    pub fn open_store(&self) -> anyhow::Result<Store> {
        let store = if self.is_in_memory() {
            Store::open_in_memory_with(self.seed)?
        } else {
            let path = PathBuf::from(&self.database);
            ensure_db_dir(&path)?;
            Store::open_with(&path, self.seed)?
        };
        Ok(store)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("hubsim.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".hubsim").join("hubsim.db")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<HubsimConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: HubsimConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &HubsimConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Keep the `.hubsim/` data directory out of version control
pub fn ensure_gitignore(project_root: &Path) -> anyhow::Result<()> {
    let gitignore_path = project_root.join(".gitignore");
    let entry = ".hubsim/";

    let mut content = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    if content.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    content.push_str(entry);
    content.push('\n');
    std::fs::write(&gitignore_path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HubsimConfig::load(Some(&dir.path().join("hubsim.toml"))).unwrap();
        assert_eq!(config, HubsimConfig::default());
        assert!(config.seed);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_file_env_and_cli_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubsim.toml");
        std::fs::write(
            &path,
            r#"
database = "crm.db"
host = "0.0.0.0"
port = 9000
seed = false

[[owners]]
email = "sam@example.com"
first_name = "Sam"
"#,
        )
        .unwrap();

        let mut config = HubsimConfig::load(Some(&path)).unwrap();
        assert_eq!(config.database, "crm.db");
        assert!(!config.seed);
        assert_eq!(config.owners[0].first_name, "Sam");

        let env: HashMap<&str, &str> = [("HUBSIM_PORT", "9100"), ("HUBSIM_DATABASE", ":memory:")]
            .into_iter()
            .collect();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.port, 9100);
        assert!(config.is_in_memory());

        config.apply_overrides(Overrides {
            port: Some(9200),
            ..Default::default()
        });
        assert_eq!(config.port, 9200);
        assert_eq!(config.host, "0.0.0.0");
    }

    #[test]
    fn test_bad_env_port() {
        let mut config = HubsimConfig::default();
        let err = config
            .apply_env(|key| (key == "HUBSIM_PORT").then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("HUBSIM_PORT"));
    }

    #[test]
    fn test_write_config_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hubsim.toml");
        let config = HubsimConfig::default();

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();
        assert_eq!(HubsimConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_open_store_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = HubsimConfig {
            database: dir.path().join("nested").join("hubsim.db").display().to_string(),
            ..Default::default()
        };
        let store = config.open_store().unwrap();
        assert!(store.stats().unwrap().object_types > 0);
        assert!(dir.path().join("nested").exists());
    }

    #[test]
    fn test_gitignore_entry_added_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".gitignore"), "target").unwrap();
        ensure_gitignore(dir.path()).unwrap();
        ensure_gitignore(dir.path()).unwrap();
        let content = std::fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(content, "target\n.hubsim/\n");
    }
}
