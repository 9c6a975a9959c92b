use std::path::PathBuf;

use cohort_core::CoreError;
use cohort_core::Guid;
use snafu::Snafu;

pub type Result<T, E = ArchiveError> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArchiveError {
    #[snafu(display("archive I/O on {}: {}", path.display(), source))]
    Io { path: PathBuf, source: std::io::Error },

    #[snafu(display("{} is not a valid archive file: {}", path.display(), source))]
    Decode { path: PathBuf, source: serde_json::Error },

    #[snafu(display("failed to encode archive content: {}", source))]
    Encode { source: serde_json::Error },

    #[snafu(display("type {name} is already in the archive"))]
    DuplicateTypeName { name: String },

    #[snafu(display("type name '{name}' contains blanks"))]
    BlankTypeName { name: String },

    #[snafu(display("guid {guid} is already used in the archive by {existing}"))]
    DuplicateGuid { guid: Guid, existing: String },

    #[snafu(display("invalid archive content: {}", source))]
    InvalidContent { source: CoreError },
}

impl From<ArchiveError> for CoreError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::InvalidContent { source } => source,
            ArchiveError::DuplicateTypeName { .. }
            | ArchiveError::BlankTypeName { .. }
            | ArchiveError::DuplicateGuid { .. } => CoreError::invalid("archive", err.to_string()),
            ArchiveError::Io { .. } | ArchiveError::Decode { .. } | ArchiveError::Encode { .. } => {
                CoreError::storage(err)
            }
        }
    }
}
