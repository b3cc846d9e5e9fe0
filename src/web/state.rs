//! Shared state for the dashboard server

use crate::analytics::load_engine;
use crate::cli::DashboardConfig;
use crate::scoring::{ComparisonSettings, ScoreEngine};
use crate::store::FileRatingStore;

/// Everything a handler needs; the store is re-read on every request
pub struct AppState {
    pub store: FileRatingStore,
    pub config: DashboardConfig,
}

impl AppState {
    pub fn new(config: DashboardConfig, store: FileRatingStore) -> Self {
        Self { store, config }
    }

    pub fn comparison_settings(&self) -> ComparisonSettings {
        self.config.scoring.comparison()
    }

    /// Engine for the current rubric; the rubric may change between requests
    pub async fn engine(&self) -> ScoreEngine {
        load_engine(&self.store, self.config.scoring.scale).await
    }
}
