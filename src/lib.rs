pub mod config;
pub mod error;
mod fetch;
pub mod formats;
pub mod pipe;
pub mod pool;
pub mod source;
pub mod storage;
pub mod types;

pub use config::{Config, SourceOptions, UnknownContigPolicy};
pub use error::{Error, Result};
pub use pipe::StreamPipe;
pub use source::IndexedSource;
