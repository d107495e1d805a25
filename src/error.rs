use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("No usable records: all {cities} cities were skipped")]
    NoUsableRecords { cities: usize },
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failure to obtain a usable payload for one city.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("malformed JSON response: {0}")]
    Malformed(#[from] serde_json::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err)
        } else if err.is_connect() {
            FetchError::Connect(err)
        } else {
            FetchError::Transport(err)
        }
    }
}

/// The provider payload no longer matches the shape the transformer reads.
///
/// Unlike [`FetchError`] this is not transient: it usually means the provider
/// changed its contract, so it is logged at error level.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("missing field `{0}`")]
    MissingField(String),

    #[error("payload does not match expected shape: {0}")]
    Invalid(String),

    #[error("field `{field}` value {value} out of range {min}..={max}")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Failure to persist a batch.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("store connection failed: {0}")]
    Connect(#[source] sqlx::Error),

    #[error("store write failed: {0}")]
    Write(#[source] sqlx::Error),
}
