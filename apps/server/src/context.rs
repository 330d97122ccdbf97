//! Service wiring for the server.

use anyhow::Context;
use std::sync::Arc;

use migraineme_core::sync::{OutboxRepositoryTrait, SyncStateRepositoryTrait};
use migraineme_health_sync::{
    BackendClient, HealthBackend, HealthSource, HealthSyncRuntime, HttpHealthSource, JobScheduler,
    PullWorker, PushWorker, RecoveryService, StaticTokenProvider, SupabaseTokenProvider,
    SyncStatusService, TokenProvider,
};
use migraineme_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, OutboxRepository, SyncStateRepository,
};

use crate::config::{AuthConfig, Config};

pub struct AppState {
    pub runtime: HealthSyncRuntime,
    pub recovery: RecoveryService,
    pub status: SyncStatusService,
}

impl AppState {
    pub fn from_parts(
        outbox: Arc<dyn OutboxRepositoryTrait>,
        sync_state: Arc<dyn SyncStateRepositoryTrait>,
        backend: Arc<dyn HealthBackend>,
        tokens: Arc<dyn TokenProvider>,
        source: Arc<dyn HealthSource>,
    ) -> Self {
        let scheduler = JobScheduler::new();
        let push = PushWorker::new(outbox.clone(), sync_state.clone(), backend, tokens);
        let pull = PullWorker::new(source, outbox.clone(), sync_state.clone());

        Self {
            runtime: HealthSyncRuntime::new(scheduler.clone(), Arc::new(push), Arc::new(pull)),
            recovery: RecoveryService::new(outbox.clone(), sync_state.clone()),
            status: SyncStatusService::new(outbox, sync_state, scheduler),
        }
    }
}

fn token_provider(config: &Config) -> anyhow::Result<Arc<dyn TokenProvider>> {
    let provider: Arc<dyn TokenProvider> = match &config.auth {
        AuthConfig::RefreshToken {
            refresh_token,
            user_id,
        } => Arc::new(SupabaseTokenProvider::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            refresh_token,
            user_id.as_deref(),
        )?),
        AuthConfig::AccessToken {
            access_token,
            user_id,
        } => Arc::new(StaticTokenProvider::new(access_token.clone(), user_id.clone())),
    };
    Ok(provider)
}

pub fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let data_dir = config.data_dir.to_string_lossy().to_string();
    let db_path = init(&data_dir).context("Failed to prepare data directory")?;
    run_migrations(&db_path).context("Failed to run database migrations")?;
    let pool = create_pool(&db_path).context("Failed to open database pool")?;
    let writer = spawn_writer(pool.as_ref().clone());
    tracing::info!("Database ready at {}", db_path);

    let outbox = Arc::new(OutboxRepository::new(pool.clone(), writer.clone()));
    let sync_state = Arc::new(SyncStateRepository::new(pool, writer));
    let backend = Arc::new(BackendClient::new(
        &config.supabase_url,
        &config.supabase_anon_key,
        &config.health_source_name,
    )?);
    let source = Arc::new(HttpHealthSource::new(&config.health_bridge_url)?);

    Ok(Arc::new(AppState::from_parts(
        outbox,
        sync_state,
        backend,
        token_provider(config)?,
        source,
    )))
}
