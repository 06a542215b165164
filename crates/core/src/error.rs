#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid endpoint '{input}': {reason}")]
    InvalidEndpoint { input: String, reason: String },

    #[error("Command line is empty")]
    EmptyCommand,

    #[error("Unterminated quote in command line: {0}")]
    UnterminatedQuote(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}
