use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpoofmonError {
    #[error("bogon prefix file not specified")]
    MissingBogonFile,

    #[error("prefix file {}: {}", path.display(), source)]
    PrefixFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record size mismatch: expected {expected} bytes, got {got}")]
    RecordSize { expected: usize, got: usize },

    #[error("output sink closed while records were pending")]
    SinkClosed,

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SpoofmonError>;
