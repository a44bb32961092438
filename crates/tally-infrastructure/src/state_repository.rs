//! Persisted-state repository implementation.
//!
//! Keeps an in-memory copy of the settings record and writes through to the
//! settings file. Reads are served from memory; saves run in a blocking task
//! so file I/O never stalls the timer loop.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use tally_core::error::{Result, TallyError};
use tally_core::state::{PersistedState, StateRepository};

use crate::paths::AppPaths;
use crate::storage::AtomicTomlFile;

/// `StateRepository` over the settings file.
#[derive(Clone)]
pub struct StateRepositoryImpl {
    /// In-memory copy of the persisted record.
    state: Arc<Mutex<PersistedState>>,
    /// File handle for write-through persistence.
    file: Arc<AtomicTomlFile<PersistedState>>,
}

impl StateRepositoryImpl {
    /// Creates a repository over the default settings file location,
    /// loading the current record if one exists.
    pub fn new() -> Result<Self> {
        let path = AppPaths::settings_file()
            .map_err(|e| TallyError::config(format!("failed to resolve settings path: {}", e)))?;
        Self::with_settings_file(path)
    }

    /// Creates a repository over an explicit settings file path.
    pub fn with_settings_file(path: PathBuf) -> Result<Self> {
        let file = AtomicTomlFile::new(path);
        let initial = file.load()?.unwrap_or_default();

        Ok(Self {
            state: Arc::new(Mutex::new(initial)),
            file: Arc::new(file),
        })
    }

    /// Updates the in-memory record and writes it through to disk.
    async fn save_state(&self, state: PersistedState) -> Result<()> {
        {
            let mut state_lock = self.state.lock().await;
            *state_lock = state.clone();
        }

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || file.save(&state))
            .await
            .map_err(|e| TallyError::internal(format!("failed to join save task: {}", e)))?
    }
}

#[async_trait::async_trait]
impl StateRepository for StateRepositoryImpl {
    async fn get_state(&self) -> Result<PersistedState> {
        Ok(self.state.lock().await.clone())
    }

    async fn get_cached_balance(&self) -> Option<f64> {
        let state = self.state.lock().await;
        state.cached_balance_minutes
    }

    async fn set_cached_balance(&self, minutes: f64) -> Result<()> {
        let mut state = self.state.lock().await.clone();
        state.cached_balance_minutes = Some(minutes);
        self.save_state(state).await
    }

    async fn clear_cached_balance(&self) -> Result<()> {
        let mut state = self.state.lock().await.clone();
        state.cached_balance_minutes = None;
        self.save_state(state).await
    }

    async fn get_auth_token(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.auth_token.clone()
    }

    async fn set_auth_token(&self, token: String) -> Result<()> {
        let mut state = self.state.lock().await.clone();
        state.auth_token = Some(token);
        self.save_state(state).await
    }

    async fn clear_auth_token(&self) -> Result<()> {
        let mut state = self.state.lock().await.clone();
        state.auth_token = None;
        self.save_state(state).await
    }
}
