use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::intent::IntentExtractor;
use crate::services::ai::responder::ToolResponder;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub extractor: Box<dyn IntentExtractor>,
    pub responder: Box<dyn ToolResponder>,
}

impl AppState {
    /// Locks the slot store. Never hold the guard across an `.await`.
    pub fn db(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))
    }
}
