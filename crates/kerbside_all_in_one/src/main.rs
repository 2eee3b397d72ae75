mod config;
mod migrations;

use common::domain::{PersistenceGateway, RealtimeCache};
use common::postgres::{PostgresClient, PostgresConfig, PostgresPersistenceGateway};
use common::realtime::{run_expiry_sweeper, FieldMapCache};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig, TelemetryProviders};
use ingestion_worker::domain::MqttSubscriberConfig;
use ingestion_worker::{IngestionWorker, IngestionWorkerConfig};
use kerbside_runner::Runner;
use realtime_api::{RealtimeApi, RealtimeApiConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::ServiceConfig;
use crate::migrations::MigrationRunner;

#[tokio::main]
async fn main() {
    // Initialize configuration and tracing
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> = match init_telemetry(&TelemetryConfig {
        service_name: config.otel_service_name.clone(),
        otel_endpoint: config.otel_endpoint.clone(),
        otel_enabled: config.otel_enabled,
        log_level: config.log_level.clone(),
    }) {
        Ok(providers) => providers,
        Err(e) => {
            eprintln!("Failed to initialize telemetry: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        "Starting kerbside-all-in-one service"
    );
    debug!("Configuration: {:?}", config);

    let topic_delimiter = match config.topic_delimiter() {
        Ok(delimiter) => delimiter,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let postgres_client = match initialize_postgres(&config).await {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to initialize PostgreSQL: {}", e);
            std::process::exit(1);
        }
    };

    let gateway: Arc<dyn PersistenceGateway> =
        Arc::new(PostgresPersistenceGateway::new(postgres_client));
    let field_map_cache = Arc::new(FieldMapCache::new(config.cache_ttl()));
    let cache: Arc<dyn RealtimeCache> = field_map_cache.clone();

    let ingestion_worker = IngestionWorker::new(
        Arc::clone(&gateway),
        Arc::clone(&cache),
        IngestionWorkerConfig {
            topic_delimiter,
            topic_prefix: config.mqtt_topic_prefix.clone(),
            mqtt: MqttSubscriberConfig {
                broker_url: config.mqtt_broker_url.clone(),
                client_id: config.mqtt_client_id.clone(),
                subscribe_filter: config.mqtt_subscribe_filter.clone(),
                keep_alive_secs: config.mqtt_keep_alive_secs,
                retry_delay_secs: config.mqtt_retry_delay_secs,
                max_retry_attempts: config.mqtt_max_retry_attempts,
                max_in_flight: config.mqtt_max_in_flight,
            },
        },
    );

    let realtime_api = RealtimeApi::new(
        gateway,
        cache,
        RealtimeApiConfig {
            host: config.http_host.clone(),
            port: config.http_port,
        },
    );

    let sweep_interval = config.cache_sweep_interval();

    Runner::new()
        .with_boxed_process("ingestion_worker", ingestion_worker.into_runner_process())
        .with_boxed_process("realtime_api", realtime_api.into_runner_process())
        .with_process("snapshot_sweeper", move |ctx| {
            run_expiry_sweeper(field_map_cache, sweep_interval, ctx)
        })
        .with_closer(move || async move {
            info!("Running cleanup tasks...");

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10))
        .run_and_exit()
        .await;
}

async fn initialize_postgres(config: &ServiceConfig) -> anyhow::Result<PostgresClient> {
    info!("Initializing PostgreSQL...");
    if config.postgres_run_migrations {
        run_postgres_migrations(config).await?;
    }

    let client = PostgresClient::new(&PostgresConfig {
        host: config.postgres_host.clone(),
        port: config.postgres_port,
        database: config.postgres_database.clone(),
        username: config.postgres_username.clone(),
        password: config.postgres_password.clone(),
        max_pool_size: config.postgres_max_connections,
    })?;
    client.ping().await?;
    Ok(client)
}

async fn run_postgres_migrations(config: &ServiceConfig) -> anyhow::Result<()> {
    let postgres_dsn = format!(
        "postgres://{}:{}@{}:{}/{}?sslmode=disable",
        config.postgres_username,
        config.postgres_password,
        config.postgres_host,
        config.postgres_port,
        config.postgres_database
    );
    MigrationRunner::postgres(
        config.postgres_goose_binary_path.clone(),
        config.postgres_migrations_dir.clone(),
        postgres_dsn,
    )
    .run_migrations()
    .await
}
