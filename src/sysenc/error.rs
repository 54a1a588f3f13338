use thiserror::Error;

pub type SysencResult<T> = Result<T, SysencError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SysencError {
    #[error("can't encode a nil value")]
    Nil,
    /// The value contains a field with no byte representation, such as a pointer.
    #[error("{0} has no fixed byte representation")]
    NotEncodable(&'static str),
    #[error("buffer of {actual} bytes doesn't match destination layout of {expected} bytes")]
    LayoutMismatch { expected: usize, actual: usize },
    #[error("value encodes to {actual} bytes, want {expected}")]
    SizeMismatch { expected: usize, actual: usize },
}
