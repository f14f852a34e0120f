use thiserror::Error;

/// Error kinds surfaced by the store.
///
/// `NotFound` and end-of-iteration are not represented here: per the
/// store's contract they are normal outcomes, not failures, and are
/// surfaced as `Option::None` from `Store::get`/`Store::next_record`.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("allocation too large: {0} bytes")]
    Alloc(String),
}

pub type Result<T> = std::result::Result<T, DbError>;
