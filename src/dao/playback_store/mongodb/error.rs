use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save playback state at revision {revision}")]
    SaveState {
        revision: u64,
        #[source]
        source: MongoError,
    },
    #[error("failed to load playback state")]
    LoadState {
        #[source]
        source: MongoError,
    },
    #[error("failed to save history entry `{id}`")]
    SaveHistory {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list history entries")]
    ListHistory {
        #[source]
        source: MongoError,
    },
    #[error("history document `{doc_id}` has an invalid identifier")]
    InvalidDocId { doc_id: String },
    #[error("history entry `{id}` does not exist")]
    MissingHistory { id: Uuid },
}
