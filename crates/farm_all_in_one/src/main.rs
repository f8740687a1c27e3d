mod config;

use anyhow::Context;
use common::auth::{JwtConfig, JwtIdentityProvider};
use common::blob::{BlobStore, NatsObjectBlobStore};
use common::memory::{InMemoryBlobStore, InMemoryDirectory, InMemoryFarmStore};
use common::postgres::{
    run_migrations, PostgresAssignmentRepository, PostgresChatMessageRepository, PostgresClient,
    PostgresDeviceRepository, PostgresFarmDirectory, PostgresServiceRequestRepository,
    PostgresVisitRecordRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::{BlobBackend, ServiceConfig, StorageBackend};
use farm_api::{AppState, FarmAdapters, FarmApi};
use farm_runner::Runner;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&config.telemetry())
    {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        storage_backend = ?config.storage_backend,
        blob_backend = ?config.blob_backend,
        "Starting farm-all-in-one service"
    );
    debug!(
        http_host = %config.http_host,
        http_port = config.http_port,
        max_attachment_bytes = config.max_attachment_bytes,
        "Configuration loaded"
    );

    let startup_timeout = Duration::from_secs(config.startup_timeout_secs);
    let adapters = match tokio::time::timeout(startup_timeout, build_adapters(&config)).await {
        Ok(Ok(adapters)) => adapters,
        Ok(Err(e)) => {
            error!("Failed to initialize storage: {:#}", e);
            shutdown_telemetry(telemetry_providers);
            return ExitCode::FAILURE;
        }
        Err(_) => {
            error!("Storage initialization timed out after {:?}", startup_timeout);
            shutdown_telemetry(telemetry_providers);
            return ExitCode::FAILURE;
        }
    };

    let identity_provider = Arc::new(JwtIdentityProvider::new(JwtConfig::new(
        config.jwt_secret.clone(),
        config.jwt_expiration_hours,
    )));
    let state = AppState::new(adapters, identity_provider, config.max_attachment_bytes);
    let farm_api = FarmApi::new(state, config.http());

    Runner::new()
        .with_named_process("farm_api", farm_api.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            shutdown_telemetry(telemetry_providers);
            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.closer_timeout_secs))
        .run()
        .await
}

async fn build_adapters(config: &ServiceConfig) -> anyhow::Result<FarmAdapters> {
    let blob_store = build_blob_store(config).await?;

    match config.storage_backend {
        StorageBackend::Postgres => {
            info!("Initializing PostgreSQL...");
            let client = PostgresClient::from_config(&config.postgres())?;
            client.ping().await.context("PostgreSQL is unreachable")?;

            if config.postgres_run_migrations {
                let applied = run_migrations(&client).await?;
                info!(applied, "PostgreSQL migrations complete");
            }

            Ok(FarmAdapters {
                devices: Arc::new(PostgresDeviceRepository::new(client.clone())),
                assignments: Arc::new(PostgresAssignmentRepository::new(client.clone())),
                service_requests: Arc::new(PostgresServiceRequestRepository::new(client.clone())),
                chat_messages: Arc::new(PostgresChatMessageRepository::new(client.clone())),
                visit_records: Arc::new(PostgresVisitRecordRepository::new(client.clone())),
                directory: Arc::new(PostgresFarmDirectory::new(client)),
                blob_store,
            })
        }
        StorageBackend::Memory => {
            warn!("Using in-memory storage; records are lost on restart");
            let directory = InMemoryDirectory::new();
            for (animal_id, owner_id) in config.seeded_animals() {
                directory.add_animal(animal_id, owner_id).await;
            }
            for user_id in config.seeded_veterinarians() {
                directory.add_veterinarian(user_id).await;
            }

            let store = Arc::new(InMemoryFarmStore::new());
            Ok(FarmAdapters {
                devices: store.clone(),
                assignments: store.clone(),
                service_requests: store.clone(),
                chat_messages: store.clone(),
                visit_records: store,
                directory: Arc::new(directory),
                blob_store,
            })
        }
    }
}

async fn build_blob_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn BlobStore>> {
    match config.blob_backend {
        BlobBackend::Nats => {
            info!("Initializing NATS object store...");
            let store =
                NatsObjectBlobStore::connect(&config.nats_url, &config.nats_object_store_bucket)
                    .await?;
            Ok(Arc::new(store))
        }
        BlobBackend::Memory => {
            warn!("Using in-memory attachment storage");
            Ok(Arc::new(InMemoryBlobStore::new()))
        }
    }
}
