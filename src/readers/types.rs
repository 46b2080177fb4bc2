use thiserror::Error;

use crate::profiles::ProfilesData;

pub trait DataReader {
    fn read_profiles(&self) -> Result<ProfilesData, ReadError>;
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("cannot open {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("inconsistent profiles in {path}: {reason}")]
    Invalid { path: String, reason: String },
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FileError {
    #[error("unknown file type: {0}")]
    UnknownFileType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Json,
}
