use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}
