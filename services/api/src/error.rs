//! services/api/src/error.rs
//!
//! Errors that stop the `api` binary from starting or serving.
//!
//! Request-time failures never reach this type: handlers turn `WorkflowError` into a
//! status and message through `web::rest::reject`.

use crate::config::ConfigError;
use manuscript_core::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A malformed environment variable.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The user table could not be read, parsed (`USERS_SEED`) or seeded.
    #[error("Credential store error: {0}")]
    Port(#[from] PortError),

    /// Binding `BIND_ADDRESS` or serving connections failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A setting accepted by the config loader but rejected by a library, such as `CORS_ORIGIN`.
    #[error("Startup error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::users::parse_user_table;

    #[test]
    fn bad_seed_table_names_the_credential_store() {
        let err: ApiError = parse_user_table("not json").unwrap_err().into();
        assert!(matches!(err, ApiError::Port(PortError::Unexpected(_))));
        assert!(err.to_string().starts_with("Credential store error: Invalid user table"));
    }

    #[test]
    fn config_errors_keep_the_variable_name() {
        let err: ApiError =
            ConfigError::InvalidValue("SESSION_TTL_HOURS".into(), "'x' is not a number".into())
                .into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Invalid value for the environment variable SESSION_TTL_HOURS: 'x' is not a number"
        );
    }
}
