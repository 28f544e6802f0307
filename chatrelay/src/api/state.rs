use std::sync::Arc;

use crate::citations::{CitationCache, SlotStorage};
use crate::config::Config;
use crate::db::DatabaseBackend;
use crate::services::ChatTurnController;
use crate::upstream::ChatUpstream;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: Arc<dyn DatabaseBackend>,
    pub upstream: Arc<dyn ChatUpstream>,
    pub citations: Arc<CitationCache>,
    pub chat: ChatTurnController,
}

impl AppState {
    pub fn new<B>(
        config: Config,
        backend: Arc<B>,
        upstream: Arc<dyn ChatUpstream>,
        slots: Arc<dyn SlotStorage>,
    ) -> Self
    where
        B: DatabaseBackend + 'static,
    {
        let config = Arc::new(config);
        let citations = Arc::new(CitationCache::new(slots, &config.citation_cache));
        let chat = ChatTurnController::new(
            backend.clone(),
            upstream.clone(),
            citations.clone(),
            &config.relay,
        );

        Self {
            config,
            db: backend,
            upstream,
            citations,
            chat,
        }
    }
}
