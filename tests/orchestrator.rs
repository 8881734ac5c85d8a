use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;

use sample_uploader::domain::{SampleFiles, SampleMap, SampleOptions, SampleReads, Workflow};
use sample_uploader::error::UploadError;
use sample_uploader::metadata::{Metadata, SamplesMetadata};
use sample_uploader::orchestrator::{
    ProgressEvent, ProgressSink, UploadOrchestrator, UploadRequest,
};
use sample_uploader::platform::{
    CreatedSamples, InputFileTarget, Issue, LocationSuggestion, PlatformClient, RemoteSample,
    SampleStatus, ValidationIssues,
};
use sample_uploader::upload::{Credentials, RemoteUploader, UploaderFactory};

struct NoopSink;

impl ProgressSink for NoopSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct MockPlatform {
    calls: Mutex<Vec<String>>,
    validated: Mutex<Option<SamplesMetadata>>,
    validation_errors: Vec<Issue>,
    fail_locations: bool,
    fail_mark: bool,
}

impl MockPlatform {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PlatformClient for MockPlatform {
    fn resolve_project(&self, name: &str) -> Result<u64, UploadError> {
        self.record(format!("resolve {name}"));
        if name == "missing" {
            return Err(UploadError::ProjectNotFound(name.to_string()));
        }
        Ok(42)
    }

    fn search_locations(&self, query: &str) -> Result<Vec<LocationSuggestion>, UploadError> {
        self.record(format!("locations {query}"));
        if self.fail_locations {
            return Err(UploadError::PlatformStatus {
                status: 502,
                message: "location service unavailable".to_string(),
            });
        }
        Ok(vec![LocationSuggestion {
            name: format!("{query}, California, USA"),
            geo_level: Some("city".to_string()),
            country_name: Some("USA".to_string()),
            state_name: Some("California".to_string()),
            subdivision_name: None,
            city_name: Some(query.to_string()),
            extra: serde_json::Map::new(),
        }])
    }

    fn validate_metadata(
        &self,
        project_id: u64,
        _samples: &SampleMap,
        metadata: &SamplesMetadata,
    ) -> Result<ValidationIssues, UploadError> {
        self.record(format!("validate {project_id}"));
        *self.validated.lock().unwrap() = Some(metadata.clone());
        Ok(ValidationIssues {
            errors: self.validation_errors.clone(),
            warnings: vec![Issue::Message("Collection Date is in the future".to_string())],
        })
    }

    fn create_samples(
        &self,
        project_id: u64,
        samples: &SampleMap,
        _metadata: &SamplesMetadata,
        options: &SampleOptions,
    ) -> Result<CreatedSamples, UploadError> {
        self.record(format!("create {project_id} {}", options.workflow));
        let samples = samples
            .iter()
            .enumerate()
            .map(|(index, (name, files))| {
                let id = 100 + index as u64;
                RemoteSample {
                    id,
                    name: name.clone(),
                    project_id,
                    input_files: files
                        .all_files()
                        .map(|path| InputFileTarget {
                            remote_path: format!(
                                "s3://bucket/samples/{id}/fastqs/{}",
                                path.file_name().unwrap().to_string_lossy()
                            ),
                            transfer_token: Some(format!("upload-{id}")),
                        })
                        .collect(),
                    status: SampleStatus::Created,
                }
            })
            .collect();
        Ok(CreatedSamples {
            credentials: Credentials {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: "session".to_string(),
                expiration: None,
            },
            samples,
        })
    }

    fn mark_uploaded(&self, sample_id: u64, sample_name: &str) -> Result<(), UploadError> {
        self.record(format!("mark {sample_id} {sample_name}"));
        if self.fail_mark {
            return Err(UploadError::PlatformStatus {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(())
    }
}

type TransferLog = Arc<Mutex<Vec<(PathBuf, String)>>>;

#[derive(Default)]
struct MockUploaders {
    log: TransferLog,
    fail_on: Option<PathBuf>,
}

struct MockUploader {
    log: TransferLog,
    fail_on: Option<PathBuf>,
}

impl UploaderFactory for MockUploaders {
    type Uploader = MockUploader;

    fn new_uploader(&self, credentials: Credentials) -> Result<MockUploader, UploadError> {
        assert_eq!(credentials.access_key_id, "AKIA");
        Ok(MockUploader {
            log: self.log.clone(),
            fail_on: self.fail_on.clone(),
        })
    }
}

impl RemoteUploader for MockUploader {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        transfer_token: Option<&str>,
    ) -> Result<(), UploadError> {
        assert!(transfer_token.is_some());
        if self.fail_on.as_deref() == Some(local_path) {
            return Err(UploadError::PlatformHttp("connection reset".to_string()));
        }
        self.log
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), remote_path.to_string()));
        Ok(())
    }
}

fn samples() -> SampleMap {
    let mut map = SampleMap::new();
    map.insert(
        "paired".to_string(),
        SampleFiles::new(SampleReads::paired(
            vec![PathBuf::from("in/paired_R1.fq.gz")],
            vec![PathBuf::from("in/paired_R2.fq.gz")],
        )),
    );
    map.insert(
        "single".to_string(),
        SampleFiles::new(SampleReads::single(vec![PathBuf::from("in/x/single.fa")])),
    );
    map
}

fn request() -> UploadRequest {
    UploadRequest {
        samples: samples(),
        cli_metadata: Metadata::from_pairs([
            ("Host Organism".to_string(), "Human".to_string()),
            ("Collection Location v2".to_string(), "Berkeley".to_string()),
        ]),
        project_name: "Surveillance".to_string(),
        metadata_csv: None,
        options: SampleOptions::new(Workflow::ShortReadMngs),
    }
}

#[test]
fn uploads_every_file_then_marks_each_sample() {
    let platform = MockPlatform::default();
    let uploaders = MockUploaders::default();
    let log = uploaders.log.clone();
    let orchestrator = UploadOrchestrator::new(platform, uploaders);

    let result = orchestrator.run(request(), &NoopSink).unwrap();

    assert_eq!(result.project_id, 42);
    assert_eq!(result.samples.len(), 2);
    assert!(
        result
            .samples
            .iter()
            .all(|sample| sample.status == SampleStatus::MarkedUploaded)
    );
    assert_eq!(result.validation_warnings.len(), 1);
    assert_eq!(result.locations_matched, 2);

    let transfers = log.lock().unwrap().clone();
    assert_eq!(
        transfers,
        vec![
            (
                PathBuf::from("in/paired_R1.fq.gz"),
                "s3://bucket/samples/100/fastqs/paired_R1.fq.gz".to_string()
            ),
            (
                PathBuf::from("in/paired_R2.fq.gz"),
                "s3://bucket/samples/100/fastqs/paired_R2.fq.gz".to_string()
            ),
            (
                PathBuf::from("in/x/single.fa"),
                "s3://bucket/samples/101/fastqs/single.fa".to_string()
            ),
        ]
    );
}

#[test]
fn steps_run_in_order_and_locations_are_looked_up_once() {
    let platform = Arc::new(MockPlatform::default());
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), MockUploaders::default());
    orchestrator.run(request(), &NoopSink).unwrap();

    assert_eq!(
        platform.calls(),
        vec![
            "resolve Surveillance",
            "locations Berkeley",
            "validate 42",
            "create 42 short-read-mngs",
            "mark 100 paired",
            "mark 101 single",
        ]
    );
}

#[test]
fn csv_superset_is_trimmed_and_missing_samples_get_cli_metadata() {
    let temp = tempfile::tempdir().unwrap();
    let csv = temp.path().join("metadata.csv");
    fs::write(
        &csv,
        "Sample Name,Host Organism,Sample Type\n\
         paired,Mosquito,Whole Body\n\
         not-on-disk,Human,Serum\n",
    )
    .unwrap();

    let platform = Arc::new(MockPlatform::default());
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), MockUploaders::default());
    let mut request = request();
    request.metadata_csv = Some(csv);
    request.cli_metadata = Metadata::from_pairs([("Nucleotide Type".to_string(), "RNA".to_string())]);
    orchestrator.run(request, &NoopSink).unwrap();

    let validated = platform.validated.lock().unwrap().clone().unwrap();
    assert_eq!(validated.keys().collect::<Vec<_>>(), vec!["paired", "single"]);
    assert_eq!(validated["paired"].host_genome(), Some("Mosquito"));
    assert_eq!(validated["paired"].get_str("Nucleotide Type"), Some("RNA"));
    assert_eq!(validated["single"].len(), 1);
    assert_eq!(validated["single"].get_str("Nucleotide Type"), Some("RNA"));
}

#[test]
fn validation_failure_stops_before_creating_samples() {
    let platform = Arc::new(MockPlatform {
        validation_errors: vec![Issue::Message("Host Organism is required".to_string())],
        ..MockPlatform::default()
    });
    let uploaders = MockUploaders::default();
    let log = uploaders.log.clone();
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), uploaders);

    let err = orchestrator.run(request(), &NoopSink).unwrap_err();
    assert_matches!(err, UploadError::MetadataValidationFailed(issues) if issues.errors.len() == 1);
    assert!(!platform.calls().iter().any(|call| call.starts_with("create")));
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn unknown_project_stops_everything() {
    let platform = Arc::new(MockPlatform::default());
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), MockUploaders::default());
    let mut request = request();
    request.project_name = "missing".to_string();

    let err = orchestrator.run(request, &NoopSink).unwrap_err();
    assert_matches!(err, UploadError::ProjectNotFound(_));
    assert_eq!(platform.calls(), vec!["resolve missing"]);
}

#[test]
fn location_lookup_failure_stops_before_validation() {
    let platform = Arc::new(MockPlatform {
        fail_locations: true,
        ..MockPlatform::default()
    });
    let uploaders = MockUploaders::default();
    let log = uploaders.log.clone();
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), uploaders);

    let err = orchestrator.run(request(), &NoopSink).unwrap_err();
    assert_matches!(err, UploadError::PlatformStatus { status: 502, .. });
    assert_eq!(platform.calls(), vec!["resolve Surveillance", "locations Berkeley"]);
    assert!(platform.validated.lock().unwrap().is_none());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn transfer_failure_aborts_without_rollback() {
    let platform = Arc::new(MockPlatform::default());
    let uploaders = MockUploaders {
        fail_on: Some(PathBuf::from("in/x/single.fa")),
        ..MockUploaders::default()
    };
    let log = uploaders.log.clone();
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), uploaders);

    let err = orchestrator.run(request(), &NoopSink).unwrap_err();
    assert_matches!(err, UploadError::TransferFailed { path, .. } if path == Path::new("in/x/single.fa"));
    let calls = platform.calls();
    assert!(calls.contains(&"mark 100 paired".to_string()));
    assert!(!calls.contains(&"mark 101 single".to_string()));
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn mark_failure_is_fatal() {
    let platform = Arc::new(MockPlatform {
        fail_mark: true,
        ..MockPlatform::default()
    });
    let orchestrator = UploadOrchestrator::new(SharedPlatform(platform.clone()), MockUploaders::default());

    let err = orchestrator.run(request(), &NoopSink).unwrap_err();
    assert_matches!(err, UploadError::MarkUploadedFailed { sample, .. } if sample == "paired");
    assert_eq!(
        platform.calls().iter().filter(|call| call.starts_with("mark")).count(),
        1
    );
}

struct SharedPlatform(Arc<MockPlatform>);

impl PlatformClient for SharedPlatform {
    fn resolve_project(&self, name: &str) -> Result<u64, UploadError> {
        self.0.resolve_project(name)
    }

    fn search_locations(&self, query: &str) -> Result<Vec<LocationSuggestion>, UploadError> {
        self.0.search_locations(query)
    }

    fn validate_metadata(
        &self,
        project_id: u64,
        samples: &SampleMap,
        metadata: &SamplesMetadata,
    ) -> Result<ValidationIssues, UploadError> {
        self.0.validate_metadata(project_id, samples, metadata)
    }

    fn create_samples(
        &self,
        project_id: u64,
        samples: &SampleMap,
        metadata: &SamplesMetadata,
        options: &SampleOptions,
    ) -> Result<CreatedSamples, UploadError> {
        self.0.create_samples(project_id, samples, metadata, options)
    }

    fn mark_uploaded(&self, sample_id: u64, sample_name: &str) -> Result<(), UploadError> {
        self.0.mark_uploaded(sample_id, sample_name)
    }
}
