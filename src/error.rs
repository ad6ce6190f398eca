use thiserror::Error;

/// Failure to parse a structural selector from the catalog.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,
    #[error("unexpected character '{found}' at offset {offset} in `{selector}`")]
    Unexpected {
        selector: String,
        found: char,
        offset: usize,
    },
    #[error("unterminated attribute selector in `{0}`")]
    Unterminated(String),
}

/// Failure answering an inbound message.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Unknown action")]
    UnknownAction,
    #[error("Malformed message: {0}")]
    Malformed(String),
    #[error("Blocker not initialized")]
    NotInitialized,
}
