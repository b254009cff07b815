use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `audiencelink`.
///
/// Each subsystem defines its own error variant. Host applications can match
/// on these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum SdkError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Durable storage ──────────────────────────────────────────────────
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    // ── Hit queue ────────────────────────────────────────────────────────
    #[error("queue: {0}")]
    Queue(#[from] QueueError),

    // ── HTTP transport ───────────────────────────────────────────────────
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Storage errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("open failed: {0}")]
    Open(String),

    #[error("read failed for key {key}: {message}")]
    Read { key: String, message: String },

    #[error("write failed for key {key}: {message}")]
    Write { key: String, message: String },

    #[error("rusqlite: {0}")]
    Sqlite(String),
}

// ─── Queue errors ────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("enqueue failed: {0}")]
    Enqueue(String),

    #[error("persisted hit is malformed: {0}")]
    MalformedHit(String),

    #[error("worker stopped: {0}")]
    Worker(String),
}

// ─── Transport errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("client build failed: {0}")]
    ClientBuild(String),
}

// ─── Convenience re-exports ──────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, SdkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_displays_correctly() {
        let err = SdkError::Config(ConfigError::Validation("empty server".into()));
        assert!(err.to_string().contains("validation failed"));
    }

    #[test]
    fn storage_write_displays_key() {
        let err = SdkError::Storage(StorageError::Write {
            key: "uuid".into(),
            message: "disk full".into(),
        });
        assert!(err.to_string().contains("uuid"));
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn anyhow_interop() {
        let anyhow_err = anyhow::anyhow!("something went wrong");
        let sdk_err: SdkError = anyhow_err.into();
        assert!(sdk_err.to_string().contains("something went wrong"));
    }

    #[test]
    fn malformed_hit_displays_correctly() {
        let err = SdkError::Queue(QueueError::MalformedHit("not json".into()));
        assert!(err.to_string().contains("malformed"));
    }
}
