use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown split '{0}' (expected train, val or test)")]
    UnknownSplit(String),
    #[error("unknown unmapped-code policy '{0}' (expected drop or tag)")]
    UnknownPolicy(String),
    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;
