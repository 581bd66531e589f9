use thiserror::Error;

#[derive(Debug, Error)]
pub enum LineError {
    #[error("Unknown line: {0}")]
    UnknownLine(u32),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
    #[error("Interrupt registration failed: {0}")]
    InterruptRegistrationFailed(String),
    #[error("Hardware error: {0}")]
    Hardware(String),
    #[error("Configuration error: {0}")]
    Config(String),
}
