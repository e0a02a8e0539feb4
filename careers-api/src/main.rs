use careers_common::snowflake::{ProcessId, WorkerId};
use careers_db::client::{DbClient, DbError};
use serde::Deserialize;
use server::{ServerState, media::MediaStore};
use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod server;

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error setting up database: {0}")]
    Database(#[from] DbError),
    #[error("Error creating media root: {0}")]
    MediaRoot(std::io::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    #[serde(default = "default_database_url")]
    database_url: String,
    #[serde(default = "default_database_max_connections")]
    database_max_connections: u32,
    #[serde(default = "default_media_root")]
    media_root: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
}

fn default_database_url() -> String {
    "sqlite://careers.db".to_owned()
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_media_root() -> PathBuf {
    PathBuf::from("media")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "careers_api=debug,\
                careers_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=warn"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(%err, "Could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db_client = DbClient::connect(
        &env.database_url,
        env.database_max_connections,
        env.worker_id,
        env.process_id,
    )
    .await?;

    tokio::fs::create_dir_all(&env.media_root)
        .await
        .map_err(InitError::MediaRoot)?;

    let db_client = Arc::new(db_client);
    let state = ServerState {
        db_client: Arc::clone(&db_client),
        media: Arc::new(MediaStore::new(env.media_root)),
    };
    let app = server::app(state, env.max_upload_bytes);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    db_client.close().await;
    info!("Database closed");

    Ok(())
}
