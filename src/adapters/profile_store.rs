//! INI-file profile store.

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config::ProfileStore;
use crate::domain::error::TraderError;
use crate::ports::profile_store_port::ProfileStorePort;
use configparser::ini::Ini;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

pub struct IniProfileStore {
    path: PathBuf,
}

impl IniProfileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ProfileStorePort for IniProfileStore {
    /// A missing file loads as the built-in defaults.
    fn load(&self) -> Result<ProfileStore, TraderError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no profile store, using defaults");
            return Ok(ProfileStore::default());
        }
        let config = FileConfigAdapter::from_file(&self.path)?;
        ProfileStore::from_config(&config)
    }

    fn save(&self, store: &ProfileStore) -> Result<(), TraderError> {
        let mut ini = Ini::new();
        for (section, entries) in store.to_sections() {
            for (key, value) in entries {
                ini.set(&section, &key, Some(value));
            }
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        ini.write(&self.path)?;
        info!(path = %self.path.display(), profiles = store.len(), "profile store written");
        Ok(())
    }
}
