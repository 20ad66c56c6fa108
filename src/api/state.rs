use crate::detect::AnomalyEngine;
use crate::storage::SqliteStore;

#[derive(Clone)]
pub struct AppState {
    pub store: SqliteStore,
    pub engine: AnomalyEngine<SqliteStore>,
}

impl AppState {
    pub fn new(engine: AnomalyEngine<SqliteStore>) -> Self {
        Self {
            store: engine.store().clone(),
            engine,
        }
    }
}
