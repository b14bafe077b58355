use thiserror::Error;

/// Crate-local result alias, matching the pack's convention of pairing a
/// `thiserror` enum with a `type Result<T> = ...` alias at the boundary.
pub type Result<T> = std::result::Result<T, Error>;

/// The stage at which a backend operation failed, carried alongside the
/// originating error so callers can log with context without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NewTx,
    Get,
    Upsert,
    Delete,
    Commit,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::NewTx => "new_tx",
            Stage::Get => "get",
            Stage::Upsert => "upsert",
            Stage::Delete => "delete",
            Stage::Commit => "commit",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid bar length: end - start = {delta_ms}ms does not match second/minute/day")]
    InvalidBarLength { delta_ms: i64 },

    #[error("store operation failed at stage {stage}: {source}")]
    Backend {
        stage: Stage,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to parse input: {0}")]
    Parse(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub fn backend(stage: Stage, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Backend {
            stage,
            source: Box::new(source),
        }
    }
}
