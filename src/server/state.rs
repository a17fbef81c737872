use axum::extract::FromRef;

use crate::store::MarketStore;
use std::sync::Arc;
use std::time::Instant;

use super::backups::BackupService;
use super::ServerConfig;

pub type GuardedMarketStore = Arc<dyn MarketStore>;
pub type GuardedBackupService = Arc<BackupService>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub market_store: GuardedMarketStore,
    pub backups: GuardedBackupService,
    pub hash: String,
}

impl ServerState {
    pub fn new(config: ServerConfig, market_store: GuardedMarketStore, hash: String) -> Self {
        let backups = Arc::new(BackupService::new(market_store.clone(), &config));
        ServerState {
            config,
            start_time: Instant::now(),
            market_store,
            backups,
            hash,
        }
    }
}

impl FromRef<ServerState> for GuardedMarketStore {
    fn from_ref(input: &ServerState) -> Self {
        input.market_store.clone()
    }
}

impl FromRef<ServerState> for GuardedBackupService {
    fn from_ref(input: &ServerState) -> Self {
        input.backups.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
