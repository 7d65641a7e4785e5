use crate::media::{MediaError, MediaStore};
use devsphere_common::snowflake::{ProcessId, WorkerId};
use devsphere_db::client::{DbClient, DbError};
use serde::Deserialize;
use sqlx::postgres::PgPoolOptions;
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error connecting to the database: {0}")]
    DatabaseConnect(sqlx::Error),
    #[error("Error preparing the database: {0}")]
    Database(#[from] DbError),
    #[error("DATABASE_URL must be set")]
    MissingDatabaseUrl,
    #[error("Error preparing the media directory: {0}")]
    Media(#[from] MediaError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Env {
    #[serde(default = "default_server_address")]
    pub server_address: IpAddr,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    pub database_url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_media_dir")]
    pub media_dir: PathBuf,
    #[serde(default = "default_media_public_url")]
    pub media_public_url: String,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    #[serde(default)]
    pub worker_id: WorkerId,
    #[serde(default)]
    pub process_id: ProcessId,
}

fn default_server_address() -> IpAddr {
    Ipv4Addr::UNSPECIFIED.into()
}

fn default_server_port() -> u16 {
    5000
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_media_dir() -> PathBuf {
    "./media".into()
}

fn default_media_public_url() -> String {
    "http://localhost:5000/media".to_owned()
}

fn default_max_upload_bytes() -> usize {
    50 * 1024 * 1024
}

pub fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "devsphere_api=debug,devsphere_db=debug,devsphere_common=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

impl Env {
    /// Connects to PostgreSQL and migrates it, or falls back to the memory backend without a URL.
    pub async fn db_client(&self) -> Result<DbClient, InitError> {
        let Some(database_url) = &self.database_url else {
            warn!("DATABASE_URL is not set, keeping all data in memory");
            return Ok(DbClient::in_memory(self.worker_id, self.process_id));
        };

        let db_client = self.postgres_client(database_url).await?;
        db_client.migrate().await?;

        Ok(db_client)
    }

    /// Connects to the configured PostgreSQL database, which must be set.
    pub async fn require_postgres(&self) -> Result<DbClient, InitError> {
        let database_url = self
            .database_url
            .as_deref()
            .ok_or(InitError::MissingDatabaseUrl)?;

        self.postgres_client(database_url).await
    }

    async fn postgres_client(&self, database_url: &str) -> Result<DbClient, InitError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.database_max_connections)
            .connect(database_url)
            .await
            .map_err(InitError::DatabaseConnect)?;
        info!("Connected to the database");

        Ok(DbClient::new(pool, self.worker_id, self.process_id))
    }

    pub async fn media_store(&self) -> Result<MediaStore, InitError> {
        let media_store = MediaStore::new(self.media_dir.clone(), &self.media_public_url);
        media_store.prepare().await?;

        Ok(media_store)
    }
}
