use thiserror::Error;

use crate::header::Version;

#[derive(Debug, Error)]
pub enum Error {
    #[error("malformed point record: {0}")]
    MalformedRecord(String),
    #[error("field `{field}` cannot be stored in point layout {layout}: {reason}")]
    FieldOutOfRange {
        field: &'static str,
        layout: u8,
        reason: String,
    },
    #[error("unsupported point layout {0}")]
    UnsupportedLayout(u8),
    #[error("point layout {layout} is not allowed in LAS {version}")]
    LayoutNotInVersion { layout: u8, version: Version },
    #[error("unsupported LAS version {0}")]
    UnsupportedVersion(Version),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("{count} points do not fit LAS {version}")]
    TooManyPoints { count: u64, version: Version },
    #[error("point index {index} is beyond the {count} points in the stream")]
    SeekOutOfRange { index: u64, count: u64 },
    #[error("stream has been finalized")]
    StreamClosed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn out_of_range(field: &'static str, layout: u8, reason: impl Into<String>) -> Self {
        Error::FieldOutOfRange {
            field,
            layout,
            reason: reason.into(),
        }
    }
}
