//! Error types for the Scout Engine core library.
//!
//! Each module has its own error enum to provide clear error boundaries.
//! The library uses `thiserror` for structured, typed errors.

/// Errors related to configuration loading, parsing, and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required configuration field is absent.
    #[error("missing required config field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration field has an unacceptable value.
    #[error("invalid value for config field '{field}': {message}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// A description of why the value is invalid.
        message: String,
    },

    /// The configuration file does not exist at the specified path.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// The path that was searched.
        path: String,
    },

    /// TOML deserialization failed.
    #[error("failed to parse config file: {source}")]
    ParseError {
        /// The underlying TOML parse error.
        #[source]
        source: toml::de::Error,
    },
}

/// The five error kinds the engine distinguishes at adapter/runtime boundaries (spec §7).
///
/// Adapters convert raw library exceptions into one of these kinds at their
/// boundary; nothing downstream of an adapter should see a raw `reqwest::Error`
/// or similar.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// HTTP timeout, 5xx, or connection reset. Recovered locally where sensible;
    /// otherwise reported. Never promoted to a whole-Executor retry.
    #[error("transient network error: {message}")]
    TransientNetwork {
        /// Details about the failure.
        message: String,
    },

    /// HTTP 404 from a source (e.g. a deleted subreddit). Surfaced as an empty
    /// fetch plus a user-visible note; does not trigger retry.
    #[error("source not found: {message}")]
    NotFound {
        /// Details about what was not found.
        message: String,
    },

    /// HTTP 429 or a provider-specific equivalent. The run is abandoned; the
    /// scheduler retries on its next fire, not this layer.
    #[error("rate limited{}", match .retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    })]
    RateLimited {
        /// Seconds to wait before retrying, if provided by the source.
        retry_after_secs: Option<u64>,
    },

    /// The model returned output that does not conform to the declared schema.
    /// Abandons retries — perturbing the input is assumed to be futile.
    #[error("structured output failure: {message}")]
    StructuredOutputFailure {
        /// Details about the parse failure.
        message: String,
    },

    /// A required credential or config value is absent. Propagates upward.
    #[error("configuration missing: {field}")]
    ConfigurationMissing {
        /// The name of the missing configuration field.
        field: String,
    },
}

impl AdapterError {
    /// Whether this error kind should suppress the Executor's retry loop
    /// (spec §4.E.6 and §7: only `StructuredOutputFailure` does this).
    pub fn suppresses_retry(&self) -> bool {
        matches!(self, AdapterError::StructuredOutputFailure { .. })
    }
}

/// Errors from interacting with LLM providers (Anthropic, Google-style).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// HTTP request to the LLM endpoint failed.
    #[error("LLM HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// LLM API returned an error response.
    #[error("LLM API error (status {status}): {message}")]
    Api {
        /// The HTTP status code.
        status: u16,
        /// The error message from the API.
        message: String,
    },

    /// LLM provider rate limit hit.
    #[error("LLM rate limited, retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// LLM response did not conform to the declared structured-output schema.
    #[error("structured output failure: {0}")]
    StructuredOutputFailure(String),

    /// No LLM provider configured.
    #[error("no LLM provider configured")]
    NotConfigured,
}

impl From<LlmError> for AdapterError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::RateLimited { retry_after_secs } => AdapterError::RateLimited {
                retry_after_secs: Some(retry_after_secs),
            },
            LlmError::StructuredOutputFailure(message) => {
                AdapterError::StructuredOutputFailure { message }
            }
            LlmError::NotConfigured => AdapterError::ConfigurationMissing {
                field: "llm.provider".to_string(),
            },
            other => AdapterError::TransientNetwork {
                message: other.to_string(),
            },
        }
    }
}

/// Errors from SQLite storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to connect to SQLite database.
    #[error("database connection error: {source}")]
    Connection {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// Database migration failed.
    #[error("database migration error: {source}")]
    Migration {
        /// The underlying migration error.
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    /// A database query failed.
    #[error("database query error: {source}")]
    Query {
        /// The underlying SQLx error.
        #[source]
        source: sqlx::Error,
    },

    /// A uniqueness invariant was violated (e.g. duplicate scout name).
    #[error("uniqueness violation: {message}")]
    AlreadyExists {
        /// Details about the conflicting value.
        message: String,
    },

    /// The referenced row does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Details about what was not found.
        message: String,
    },
}

/// Errors from workflow (Scout Executor) operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Source adapter error.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Storage-layer error.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// LLM provider error.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Invalid scout configuration for the requested operation.
    #[error("invalid scout configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled cooperatively between step boundaries.
    #[error("run cancelled")]
    Cancelled,
}

/// Errors from the scheduler (cron dispatch, PID lock, job registration).
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expr}': {source}")]
    InvalidCron {
        /// The offending expression.
        expr: String,
        /// The underlying parse error.
        #[source]
        source: cron::error::Error,
    },

    /// Another live instance already holds the scheduler PID lock.
    #[error("scheduler already running (pid {pid})")]
    AlreadyRunning {
        /// The PID recorded in the lock file.
        pid: u32,
    },

    /// Failed to read or write the PID lock file.
    #[error("PID lock file error: {message}")]
    LockFile {
        /// Details about the failure.
        message: String,
    },

    /// Underlying storage error while loading scouts.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from the Review Bus.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    /// The draft is not in the expected state for this transition.
    #[error("draft {draft_id} is not in {expected} state")]
    InvalidState {
        /// The draft's id.
        draft_id: i64,
        /// The state the transition required.
        expected: String,
    },

    /// The draft's platform has no registered publisher.
    #[error("no publisher registered for platform '{platform}'")]
    NoPublisher {
        /// The platform name.
        platform: String,
    },

    /// Publishing failed; draft is left in `reviewing`.
    #[error("publish failed: {message}")]
    PublishFailed {
        /// Details about the failure.
        message: String,
    },

    /// Publisher authentication failed (distinguishable from rate limiting per spec §6).
    #[error("publisher authentication failed: {message}")]
    AuthFailed {
        /// Details about the failure.
        message: String,
    },

    /// Publisher rate limit hit (distinguishable from auth failure per spec §6).
    #[error("publisher rate limited: {message}")]
    RateLimited {
        /// Details about the failure.
        message: String,
    },

    /// Storage error surfaced while transitioning a draft.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// LLM error surfaced while refining a draft.
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_missing_field_message() {
        let err = ConfigError::MissingField {
            field: "llm.api_key".to_string(),
        };
        assert_eq!(err.to_string(), "missing required config field: llm.api_key");
    }

    #[test]
    fn adapter_error_rate_limited_with_retry() {
        let err = AdapterError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert_eq!(err.to_string(), "rate limited, retry after 30s");
    }

    #[test]
    fn adapter_error_rate_limited_without_retry() {
        let err = AdapterError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn only_structured_output_failure_suppresses_retry() {
        assert!(AdapterError::StructuredOutputFailure {
            message: "bad json".into()
        }
        .suppresses_retry());
        assert!(!AdapterError::TransientNetwork {
            message: "timeout".into()
        }
        .suppresses_retry());
        assert!(!AdapterError::NotFound {
            message: "gone".into()
        }
        .suppresses_retry());
        assert!(!AdapterError::RateLimited {
            retry_after_secs: None
        }
        .suppresses_retry());
        assert!(!AdapterError::ConfigurationMissing {
            field: "x".into()
        }
        .suppresses_retry());
    }

    #[test]
    fn llm_structured_output_failure_maps_to_adapter_kind() {
        let llm_err = LlmError::StructuredOutputFailure("not a list".to_string());
        let adapter_err: AdapterError = llm_err.into();
        assert!(adapter_err.suppresses_retry());
    }

    #[test]
    fn llm_not_configured_maps_to_configuration_missing() {
        let adapter_err: AdapterError = LlmError::NotConfigured.into();
        assert!(matches!(
            adapter_err,
            AdapterError::ConfigurationMissing { .. }
        ));
    }

    #[test]
    fn scheduler_already_running_message() {
        let err = SchedulerError::AlreadyRunning { pid: 4242 };
        assert_eq!(err.to_string(), "scheduler already running (pid 4242)");
    }

    #[test]
    fn review_invalid_state_message() {
        let err = ReviewError::InvalidState {
            draft_id: 7,
            expected: "pending_review".to_string(),
        };
        assert_eq!(err.to_string(), "draft 7 is not in pending_review state");
    }
}
