use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("batch of {len} operations exceeds the store limit of {max}")]
    BatchTooLarge { len: usize, max: usize },
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A multi-batch cascade failed after some of its batches were committed.
    ///
    /// Re-running the same cascade finishes the work: every chunk query only matches the
    /// children that still reference the parent.
    #[error(
        "cascade from {parent} partially applied ({committed_batches} batches committed), \
         re-run the cascade to finish: {source}"
    )]
    PartialCascade {
        parent: String,
        committed_batches: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub fn is_partial_cascade(&self) -> bool {
        matches!(self, Error::PartialCascade { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}
