use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Could not initialize the daemon. {0}")]
    InitializeError(String),
    #[error("An error occurred in the engine backend. {0}")]
    BackendError(String),
    #[error("Invalid daemon configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the daemon. {0}")]
    IOError(#[from] std::io::Error),
}
