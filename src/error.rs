use std::io;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("need a data file and a .tbi or .csi index for {}", .0.display())]
    MissingIndex(PathBuf),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("reference sequence not found: {0}")]
    UnknownContig(String),

    #[error("iterator error: {0}")]
    Iterator(String),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("source is closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(inner) => inner,
            Error::MissingIndex(_) => io::Error::new(io::ErrorKind::NotFound, e),
            Error::InvalidRange(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            Error::Iterator(_) | Error::InvalidIndex(_) => {
                io::Error::new(io::ErrorKind::InvalidData, e)
            }
            Error::Closed => io::Error::new(io::ErrorKind::BrokenPipe, e),
            other => io::Error::other(other),
        }
    }
}
