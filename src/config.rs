use std::fs;
use std::path::{Component, Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateError, Result};

pub const DEFAULT_TABLE_PREFIX: &str = "wp";
pub const DEFAULT_STORAGE_HOST: &str = ".amazonaws.com/";

/// How page bodies are stored on the target side.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum ContentMode {
    #[default]
    Flat,
    Blocks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegacyConfig {
    pub database: PathBuf,
    #[serde(default = "default_table_prefix")]
    pub table_prefix: String,
    /// Overrides `options.siteurl` when the legacy site moved domains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_url: Option<String>,
    /// Substrings that mark a URL as living in remote object storage.
    #[serde(default = "default_storage_hosts")]
    pub storage_hosts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub store: PathBuf,
    /// Base folder target file paths are made relative to.
    pub site_root: PathBuf,
    /// Directory holding the copied legacy uploads; must sit under `site_root`.
    pub uploads_dir: PathBuf,
    #[serde(default)]
    pub root_parent_id: u64,
    #[serde(default)]
    pub content_mode: ContentMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Features {
    #[serde(default)]
    pub events: bool,
    #[serde(default)]
    pub forms: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    pub legacy: LegacyConfig,
    pub target: TargetConfig,
    /// Slug of the legacy navigation menu that decides page order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_menu: Option<String>,
    #[serde(default)]
    pub features: Features,
}

/// Drop `.` components so `./assets` and `assets` compare equal.
pub(crate) fn lexical(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn default_table_prefix() -> String {
    DEFAULT_TABLE_PREFIX.to_string()
}

fn default_storage_hosts() -> Vec<String> {
    vec![DEFAULT_STORAGE_HOST.to_string()]
}

impl MigrationConfig {
    /// Read a YAML config; relative paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: Self = serde_yaml::from_str(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Starter configuration written by `wpgraft init`.
    pub fn starter(legacy_db: &Path) -> Self {
        Self {
            legacy: LegacyConfig {
                database: legacy_db.to_path_buf(),
                table_prefix: default_table_prefix(),
                site_url: None,
                storage_hosts: default_storage_hosts(),
            },
            target: TargetConfig {
                store: PathBuf::from("site.db"),
                site_root: PathBuf::from("."),
                uploads_dir: PathBuf::from("assets/Uploads"),
                root_parent_id: 0,
                content_mode: ContentMode::Flat,
            },
            navigation_menu: None,
            features: Features::default(),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.legacy.database,
            &mut self.target.store,
            &mut self.target.site_root,
            &mut self.target.uploads_dir,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let prefix = &self.legacy.table_prefix;
        if prefix.is_empty()
            || !prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(MigrateError::InvalidConfig(format!(
                "table_prefix '{prefix}' must be non-empty ASCII alphanumeric/underscore"
            )));
        }
        if let Some(url) = &self.legacy.site_url
            && url.trim().is_empty()
        {
            return Err(MigrateError::InvalidConfig(
                "site_url must not be blank when set".into(),
            ));
        }
        if self.legacy.storage_hosts.iter().any(|h| h.trim().is_empty()) {
            return Err(MigrateError::InvalidConfig(
                "storage_hosts entries must not be blank".into(),
            ));
        }
        if !lexical(&self.target.uploads_dir).starts_with(lexical(&self.target.site_root)) {
            return Err(MigrateError::InvalidConfig(format!(
                "uploads_dir '{}' must be inside site_root '{}'",
                self.target.uploads_dir.display(),
                self.target.site_root.display()
            )));
        }
        if matches!(&self.navigation_menu, Some(slug) if slug.trim().is_empty()) {
            return Err(MigrateError::InvalidConfig(
                "navigation_menu must name a menu slug or be omitted".into(),
            ));
        }
        Ok(())
    }

    /// Full table name for a bare WordPress table (`posts` -> `wp_posts`).
    pub fn table(&self, name: &str) -> String {
        format!("{}_{}", self.legacy.table_prefix, name)
    }

    /// Path of the lock file guarding the target store during a run.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self
            .target
            .store
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.target.store.with_file_name(name)
    }
}
