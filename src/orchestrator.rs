use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::domain::{SampleFiles, SampleMap, SampleOptions};
use crate::error::UploadError;
use crate::geo;
use crate::metadata::{self, Metadata};
use crate::platform::{CreatedSamples, Issue, PlatformClient, SampleStatus};
use crate::upload::{RemoteUploader, UploaderFactory};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Everything one upload run needs from the caller.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub samples: SampleMap,
    pub cli_metadata: Metadata,
    pub project_name: String,
    pub metadata_csv: Option<PathBuf>,
    pub options: SampleOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResult {
    pub project_id: u64,
    pub samples: Vec<UploadedSample>,
    pub locations_matched: usize,
    pub validation_warnings: Vec<Issue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedSample {
    pub name: String,
    pub id: u64,
    pub status: SampleStatus,
    pub files: Vec<String>,
    pub uploaded_at: String,
}

pub struct UploadOrchestrator<P: PlatformClient, F: UploaderFactory> {
    platform: P,
    uploaders: F,
}

impl<P: PlatformClient, F: UploaderFactory> UploadOrchestrator<P, F> {
    pub fn new(platform: P, uploaders: F) -> Self {
        Self {
            platform,
            uploaders,
        }
    }

    /// Runs the whole batch. Every step finishes before the next starts and
    /// the first failure ends the run. Samples already marked uploaded stay
    /// that way; nothing is rolled back.
    pub fn run(
        &self,
        request: UploadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<UploadResult, UploadError> {
        let UploadRequest {
            samples,
            cli_metadata,
            project_name,
            metadata_csv,
            options,
        } = request;

        emit(sink, format!("phase=Resolve; project {project_name}"));
        let project_id = self.platform.resolve_project(&project_name)?;
        tracing::info!(project = %project_name, project_id, "resolved project");

        emit(sink, "phase=Metadata; reconciling sample metadata".to_string());
        let csv_metadata = metadata_csv
            .as_deref()
            .map(metadata::read_csv)
            .transpose()?;
        let mut effective = metadata::reconcile(&samples, csv_metadata, &cli_metadata);
        let locations_matched = geo::apply_location_suggestions(&self.platform, &mut effective)?;

        emit(sink, "phase=Validate; validating metadata".to_string());
        let issues = self
            .platform
            .validate_metadata(project_id, &samples, &effective)?;
        if issues.has_errors() {
            tracing::info!(errors = issues.errors.len(), "metadata validation failed");
            return Err(UploadError::MetadataValidationFailed(issues));
        }

        emit(sink, format!("phase=Create; creating {} samples", samples.len()));
        let CreatedSamples {
            credentials,
            samples: remote_samples,
        } = self
            .platform
            .create_samples(project_id, &samples, &effective, &options)
            .map_err(|err| match err {
                UploadError::RemoteCreateFailed(_) => err,
                other => UploadError::RemoteCreateFailed(other.to_string()),
            })?;
        let uploader = self.uploaders.new_uploader(credentials)?;

        let mut uploaded = Vec::with_capacity(remote_samples.len());
        for mut remote in remote_samples {
            let files = samples.get(&remote.name).ok_or_else(|| {
                UploadError::RemoteCreateFailed(format!(
                    "platform returned unknown sample '{}'",
                    remote.name
                ))
            })?;

            let mut transferred = Vec::with_capacity(remote.input_files.len());
            for target in &remote.input_files {
                let local = resolve_local_file(&remote.name, files, &target.remote_path)?;
                let start = Instant::now();
                uploader
                    .upload_file(local, &target.remote_path, target.transfer_token.as_deref())
                    .map_err(|err| match err {
                        UploadError::TransferFailed { .. } => err,
                        other => UploadError::TransferFailed {
                            path: local.to_path_buf(),
                            message: other.to_string(),
                        },
                    })?;
                sink.event(ProgressEvent {
                    message: format!("phase=Upload; {} -> {}", local.display(), target.remote_path),
                    elapsed: Some(start.elapsed()),
                });
                transferred.push(local.display().to_string());
            }
            remote.status = SampleStatus::FilesUploaded;

            self.platform
                .mark_uploaded(remote.id, &remote.name)
                .map_err(|err| UploadError::MarkUploadedFailed {
                    sample: remote.name.clone(),
                    message: err.to_string(),
                })?;
            remote.status = SampleStatus::MarkedUploaded;
            tracing::info!(sample = %remote.name, id = remote.id, "sample uploaded");
            emit(sink, format!("phase=Complete; {} uploaded", remote.name));

            uploaded.push(UploadedSample {
                name: remote.name,
                id: remote.id,
                status: remote.status,
                files: transferred,
                uploaded_at: chrono::Utc::now().to_rfc3339(),
            });
        }
        drop(uploader);

        Ok(UploadResult {
            project_id,
            samples: uploaded,
            locations_matched,
            validation_warnings: issues.warnings,
        })
    }
}

/// Finds the local file a remote target was registered for, by base file
/// name. Candidates are searched first reads, second reads, single reads,
/// reference fasta, then primer bed; more than one hit is an error.
pub fn resolve_local_file<'a>(
    sample: &str,
    files: &'a SampleFiles,
    remote_path: &str,
) -> Result<&'a Path, UploadError> {
    let target = remote_path.rsplit('/').next().unwrap_or(remote_path);
    let mut hits = files
        .match_candidates()
        .into_iter()
        .flat_map(|candidates| candidates.iter())
        .filter(|path| path.file_name() == Some(OsStr::new(target)));

    let first = hits.next().ok_or_else(|| UploadError::UnmatchedInputFile {
        sample: sample.to_string(),
        remote_path: remote_path.to_string(),
    })?;
    let others: Vec<PathBuf> = hits.cloned().collect();
    if !others.is_empty() {
        let mut candidates = vec![first.clone()];
        candidates.extend(others);
        return Err(UploadError::AmbiguousInputFile {
            sample: sample.to_string(),
            remote_path: remote_path.to_string(),
            candidates,
        });
    }
    Ok(first.as_path())
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::SampleReads;

    #[test]
    fn resolves_by_base_name_in_role_order() {
        let files = SampleFiles::new(SampleReads::paired(
            vec![PathBuf::from("run1/a_R1.fq.gz")],
            vec![PathBuf::from("run1/a_R2.fq.gz")],
        ));
        let local = resolve_local_file("a", &files, "s3://bucket/samples/9/fastqs/a_R2.fq.gz")
            .unwrap();
        assert_eq!(local, Path::new("run1/a_R2.fq.gz"));
    }

    #[test]
    fn colliding_base_names_are_ambiguous() {
        let mut files = SampleFiles::new(SampleReads::single(vec![PathBuf::from("x/a.fa")]));
        files.reference_fasta = vec![PathBuf::from("refs/a.fa")];
        let err = resolve_local_file("a", &files, "bucket/a.fa").unwrap_err();
        assert_matches!(err, UploadError::AmbiguousInputFile { candidates, .. } if candidates.len() == 2);
    }

    #[test]
    fn unknown_target_is_reported() {
        let files = SampleFiles::new(SampleReads::single(vec![PathBuf::from("a.fq")]));
        let err = resolve_local_file("a", &files, "bucket/b.fq").unwrap_err();
        assert_matches!(err, UploadError::UnmatchedInputFile { .. });
    }
}
