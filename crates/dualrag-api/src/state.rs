use std::sync::Arc;
use std::time::Instant;

use dualrag_core::config::Settings;
use dualrag_hybrid::DualRetriever;
use dualrag_vector::RefreshScheduler;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub retriever: Arc<DualRetriever>,
    /// Refreshes the local guidance index.
    pub scheduler: RefreshScheduler,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings, retriever: DualRetriever, scheduler: RefreshScheduler) -> Self {
        Self {
            settings: Arc::new(settings),
            retriever: Arc::new(retriever),
            scheduler,
            started_at: Instant::now(),
        }
    }
}
