use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::control::error::{ControlError, Result};
use crate::control::types::UserId;

pub const DEFAULT_PASSWORD: &str = "change_me";

/// Stato persistito tra un riavvio e l'altro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedState {
    pub allowed_users: Vec<UserId>,
    pub password: String,
    pub current_directories: BTreeMap<UserId, PathBuf>,
}

impl Default for PersistedState {
    fn default() -> Self {
        Self {
            allowed_users: Vec::new(),
            password: DEFAULT_PASSWORD.to_string(),
            current_directories: BTreeMap::new(),
        }
    }
}

/// Allow-list, password condivisa e directory di lavoro per utente.
///
/// Lo stato vive in memoria; ogni modifica viene riscritta subito sul file JSON
/// (se presente).
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    state: RwLock<PersistedState>,
}

impl StateStore {
    /// Carica lo stato da `path`, creandolo con i valori predefiniti se manca.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                ControlError::InvalidInput(format!("Corrupted state file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("State file {:?} not found, creating defaults", path);
                let state = PersistedState::default();
                save_json(&path, &state)?;
                state
            }
            Err(e) => return Err(ControlError::from_io(&path, e)),
        };
        Ok(Self {
            path: Some(path),
            state: RwLock::new(state),
        })
    }

    #[cfg(test)]
    pub fn in_memory(state: PersistedState) -> Self {
        Self {
            path: None,
            state: RwLock::new(state),
        }
    }

    fn update<T>(&self, change: impl FnOnce(&mut PersistedState) -> T) -> Result<T> {
        let mut state = self.state.write();
        let result = change(&mut state);
        if let Some(path) = &self.path {
            if let Err(e) = save_json(path, &*state) {
                error!("Failed to save state to {:?}: {}", path, e);
                return Err(e);
            }
        }
        Ok(result)
    }

    pub fn is_allowed(&self, user: &UserId) -> bool {
        self.state.read().allowed_users.contains(user)
    }

    /// Aggiunge `user` all'allow-list; `false` se c'era già.
    pub fn allow(&self, user: &UserId) -> Result<bool> {
        if self.is_allowed(user) {
            return Ok(false);
        }
        info!("Allowing user {}", user);
        self.update(|state| {
            state.allowed_users.push(user.clone());
            true
        })
    }

    pub fn revoke(&self, user: &UserId) -> Result<bool> {
        if !self.is_allowed(user) {
            return Ok(false);
        }
        info!("Revoking user {}", user);
        self.update(|state| {
            state.allowed_users.retain(|u| u != user);
            true
        })
    }

    pub fn allowed_users(&self) -> Vec<UserId> {
        self.state.read().allowed_users.clone()
    }

    pub fn verify_password(&self, candidate: &str) -> bool {
        self.state.read().password == candidate
    }

    pub fn change_password(&self, password: &str) -> Result<()> {
        let password = password.trim();
        if password.is_empty() {
            return Err(ControlError::InvalidInput(
                "Password cannot be empty.".to_string(),
            ));
        }
        self.update(|state| state.password = password.to_string())?;
        info!("Password changed");
        Ok(())
    }

    pub fn current_dir(&self, user: &UserId) -> Option<PathBuf> {
        self.state.read().current_directories.get(user).cloned()
    }

    /// Registra la directory di lavoro; il percorso vuoto (vista delle radici)
    /// la azzera.
    pub fn set_current_dir(&self, user: &UserId, dir: &Path) -> Result<()> {
        if self.current_dir(user).as_deref() == Some(dir) {
            return Ok(());
        }
        self.update(|state| {
            if dir.as_os_str().is_empty() {
                state.current_directories.remove(user);
            } else {
                state
                    .current_directories
                    .insert(user.clone(), dir.to_path_buf());
            }
        })
    }
}

fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| ControlError::from_io(parent, e))?;
    }
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| ControlError::InvalidInput(format!("Cannot serialize state: {e}")))?;
    fs::write(path, content).map_err(|e| ControlError::from_io(path, e))
}
