//! Configuration registry - the live set of build configurations.
//!
//! Declared settings come from the manifest; rebuild flags survive between
//! invocations in `.mbuild/configurations.json`, next to the settings
//! fingerprint they were recorded for.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::collaborators::ConfigurationRegistry;
use crate::core::{BuildConfiguration, ConfigId};
use crate::util::fs;

/// Persisted per-configuration flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StoredFlags {
    needs_rebuild: bool,
    needs_full_rebuild: bool,
    fingerprint: String,
}

/// In-memory registry backed by an optional flag store on disk.
#[derive(Debug)]
pub struct ConfigurationSet {
    configs: Mutex<BTreeMap<ConfigId, BuildConfiguration>>,

    /// Flag store location (None = nothing is persisted)
    state_path: Option<PathBuf>,
}

impl ConfigurationSet {
    /// A registry that keeps everything in memory.
    pub fn in_memory(configs: impl IntoIterator<Item = BuildConfiguration>) -> Self {
        ConfigurationSet {
            configs: Mutex::new(configs.into_iter().map(|c| (c.id.clone(), c)).collect()),
            state_path: None,
        }
    }

    /// Load persisted flags for `configs` from `state_path`.
    ///
    /// A configuration whose declared settings changed since its flags were
    /// stored is marked as needing a rebuild.
    pub fn load(
        configs: impl IntoIterator<Item = BuildConfiguration>,
        state_path: &Path,
    ) -> Result<Self> {
        let stored: BTreeMap<ConfigId, StoredFlags> = if state_path.exists() {
            let contents = fs::read_to_string(state_path)?;
            serde_json::from_str(&contents).with_context(|| {
                format!("failed to parse configuration state: {}", state_path.display())
            })?
        } else {
            BTreeMap::new()
        };

        let mut map = BTreeMap::new();
        for mut cfg in configs {
            if let Some(flags) = stored.get(&cfg.id) {
                cfg.needs_rebuild = flags.needs_rebuild;
                cfg.needs_full_rebuild = flags.needs_full_rebuild;
                if flags.fingerprint != cfg.settings_fingerprint() {
                    tracing::debug!("settings of {} changed; rebuild required", cfg.id);
                    cfg.needs_rebuild = true;
                }
            }
            map.insert(cfg.id.clone(), cfg);
        }

        let set = ConfigurationSet {
            configs: Mutex::new(map),
            state_path: Some(state_path.to_path_buf()),
        };
        set.save()?;
        Ok(set)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<ConfigId, BuildConfiguration>>> {
        self.configs
            .lock()
            .map_err(|_| anyhow!("configuration registry lock poisoned"))
    }

    /// Write the flag store.
    pub fn save(&self) -> Result<()> {
        let Some(ref path) = self.state_path else {
            return Ok(());
        };

        let stored: BTreeMap<ConfigId, StoredFlags> = self
            .lock()?
            .values()
            .map(|cfg| {
                (
                    cfg.id.clone(),
                    StoredFlags {
                        needs_rebuild: cfg.needs_rebuild,
                        needs_full_rebuild: cfg.needs_full_rebuild,
                        fingerprint: cfg.settings_fingerprint(),
                    },
                )
            })
            .collect();

        let json = serde_json::to_string_pretty(&stored)?;
        fs::write_string(path, &json)
    }

    /// Insert or overwrite a whole configuration.
    pub fn replace(&self, cfg: BuildConfiguration) -> Result<()> {
        self.lock()?.insert(cfg.id.clone(), cfg);
        self.save()
    }

    /// Every configuration, sorted by id.
    pub fn all(&self) -> Vec<BuildConfiguration> {
        self.lock()
            .map(|configs| configs.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl ConfigurationRegistry for ConfigurationSet {
    fn get(&self, id: &ConfigId) -> Option<BuildConfiguration> {
        self.lock().ok()?.get(id).cloned()
    }

    fn list(&self) -> Vec<ConfigId> {
        self.lock()
            .map(|configs| configs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn update(&self, cfg: &BuildConfiguration) -> Result<()> {
        {
            let mut configs = self.lock()?;
            let entry = configs
                .get_mut(&cfg.id)
                .ok_or_else(|| anyhow!("unknown configuration `{}`", cfg.id))?;
            entry.needs_rebuild = cfg.needs_rebuild;
            entry.needs_full_rebuild = cfg.needs_full_rebuild;
        }
        self.save()
    }
}
