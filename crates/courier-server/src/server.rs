/*
 *  Copyright 2025-2026 Courier Contributors
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Wires the database, transport, pipeline and gateway together.

use anyhow::{Context, Result};
use courier::channel::memory::MemoryBroker;
use courier::{CourierConfig, Database, NotifierRouter, Pipeline, PipelineChannels, StoreError};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerArgs;
use crate::routes::{create_router, AppState};

fn build_channels(args: &ServerArgs, config: &CourierConfig) -> Result<PipelineChannels> {
    match &args.kafka_bootstrap_servers {
        Some(bootstrap) => kafka_channels(args, bootstrap, config),
        None => {
            warn!("KAFKA_BOOTSTRAP_SERVERS not set; using an in-process broker (messages are not durable)");
            Ok(PipelineChannels::memory(&MemoryBroker::new(), config))
        }
    }
}

#[cfg(feature = "kafka")]
fn kafka_channels(
    args: &ServerArgs,
    bootstrap: &str,
    config: &CourierConfig,
) -> Result<PipelineChannels> {
    info!("Connecting to Kafka at {}", bootstrap);
    PipelineChannels::kafka(
        bootstrap,
        &args.kafka_client_id,
        &args.kafka_auto_offset_reset,
        config,
    )
    .context("Failed to create Kafka channels")
}

#[cfg(not(feature = "kafka"))]
fn kafka_channels(
    _args: &ServerArgs,
    _bootstrap: &str,
    _config: &CourierConfig,
) -> Result<PipelineChannels> {
    Err(crate::config::ConfigError::KafkaUnavailable.into())
}

/// Creates the pool and migrates, retrying while the database is
/// unreachable. The pool connects lazily, so the migration is the first
/// real connection.
async fn connect_database(args: &ServerArgs, pool_size: u32) -> Result<Database> {
    let url = args.database_url.as_str();
    let name = args.database_name.as_str();

    args.startup_backoff()
        .retry("Database connection", move || async move {
            let database = Database::new(url, name, pool_size)?;
            database.run_migrations().await?;
            Ok::<_, StoreError>(database)
        })
        .await
        .context("Failed to connect to the database and run migrations")
}

/// Binds the gateway listener. The host may be a name such as `localhost`.
pub async fn bind_listener(args: &ServerArgs) -> Result<TcpListener> {
    let (host, port) = args.bind_target();
    TcpListener::bind((host, port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", host, port))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Runs the pipeline and the gateway until interrupted.
pub async fn run(args: ServerArgs) -> Result<()> {
    let config = args.pipeline_config()?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let database = connect_database(&args, config.db_pool_size()).await?;

    let channels = build_channels(&args, &config)?;
    let pipeline = Pipeline::start(
        config,
        database,
        channels,
        NotifierRouter::with_default_senders(),
    )
    .context("Failed to start pipeline")?;

    let app = create_router(AppState {
        submitter: pipeline.submitter(),
        metrics: Some(metrics),
    })
    .layer(TraceLayer::new_for_http());

    let listener = bind_listener(&args).await?;
    info!("courierd listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error");

    info!("Stopping pipeline");
    let stopped = pipeline.stop().await.context("Failed to stop pipeline");

    served?;
    stopped
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;

    fn args(extra: &[&str]) -> ServerArgs {
        let mut argv = vec!["courierd"];
        argv.extend_from_slice(extra);
        ServerArgs::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    #[serial]
    async fn test_bind_listener_resolves_host_names() {
        let listener = bind_listener(&args(&["--host", "localhost", "--port", "0"]))
            .await
            .unwrap();
        assert!(listener.local_addr().unwrap().ip().is_loopback());
    }

    #[tokio::test]
    #[serial]
    async fn test_connect_database_migrates_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courierd.db");
        let args = args(&["--database-url", path.to_str().unwrap()]);

        let database = connect_database(&args, 1).await.unwrap();
        let dal = courier::DAL::new(database);
        assert_eq!(dal.notifications().count().await.unwrap(), 0);
    }

    #[tokio::test]
    #[serial]
    async fn test_connect_database_gives_up_on_unusable_url() {
        let args = args(&[
            "--database-url",
            "mysql://localhost/courier",
            "--startup-retries",
            "1",
            "--startup-backoff-ms",
            "1",
        ]);
        assert!(connect_database(&args, 1).await.is_err());
    }
}
