use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::SampleMap;
use crate::platform::ValidationIssues;

#[derive(Debug, Error, Diagnostic)]
pub enum UploadError {
    #[error("path {0} must be a directory")]
    NotADirectory(PathBuf),

    #[error("failed to read {path}: {message}")]
    PathError { path: PathBuf, message: String },

    #[error("found {role} file and single end file for sample '{sample}': {path}, {conflicting:?}")]
    #[diagnostic(help("a sample is either paired-end (_R1/_R2) or single-end, never both"))]
    MixedRole {
        sample: String,
        role: &'static str,
        path: PathBuf,
        conflicting: Vec<PathBuf>,
    },

    #[error("mismatch in R1 and R2 file count for sample '{sample}': {first} != {second}")]
    UnbalancedPair {
        sample: String,
        first: usize,
        second: usize,
    },

    #[error("mismatched lane numbers for sample '{sample}': {first} and {second}")]
    LaneMismatch {
        sample: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("project '{0}' not found")]
    #[diagnostic(help("make sure the project is created on the website"))]
    ProjectNotFound(String),

    #[error("metadata validation failed")]
    MetadataValidationFailed(ValidationIssues),

    #[error("failed to create samples: {0}")]
    RemoteCreateFailed(String),

    #[error("failed to upload {path}: {message}")]
    TransferFailed { path: PathBuf, message: String },

    #[error("failed to mark sample '{sample}' as uploaded: {message}")]
    MarkUploadedFailed { sample: String, message: String },

    #[error("no local file for sample '{sample}' matches remote file {remote_path}")]
    UnmatchedInputFile { sample: String, remote_path: String },

    #[error("remote file {remote_path} of sample '{sample}' matches several local files: {candidates:?}")]
    AmbiguousInputFile {
        sample: String,
        remote_path: String,
        candidates: Vec<PathBuf>,
    },

    #[error("invalid sample arguments: {0}")]
    InvalidSampleArgs(String),

    #[error("platform request failed: {0}")]
    PlatformHttp(String),

    #[error("platform returned status {status}: {message}")]
    PlatformStatus { status: u16, message: String },

    #[error("failed to read metadata CSV {path}: {message}")]
    MetadataCsv { path: PathBuf, message: String },

    #[error("invalid metadatum '{0}', expected name=value")]
    InvalidMetadatum(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("no access token configured")]
    #[diagnostic(help("set `token` in the config file or SAMPLE_UPLOADER_TOKEN"))]
    MissingToken,
}

impl UploadError {
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            UploadError::NotADirectory(_)
                | UploadError::PathError { .. }
                | UploadError::MixedRole { .. }
                | UploadError::UnbalancedPair { .. }
                | UploadError::LaneMismatch { .. }
        )
    }
}

/// Discovery error together with whatever grouping was built before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PartialDiscovery {
    pub partial: SampleMap,
    pub error: UploadError,
}

impl From<PartialDiscovery> for UploadError {
    fn from(value: PartialDiscovery) -> Self {
        value.error
    }
}
