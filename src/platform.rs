use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::PlatformConfig;
use crate::domain::{SampleFiles, SampleMap, SampleOptions};
use crate::error::UploadError;
use crate::metadata::{MetadataTable, SamplesMetadata};
use crate::upload::Credentials;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssues {
    #[serde(default)]
    pub errors: Vec<Issue>,
    #[serde(default)]
    pub warnings: Vec<Issue>,
}

impl ValidationIssues {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Issue {
    Message(String),
    Table {
        caption: String,
        #[serde(default)]
        headers: Vec<String>,
        #[serde(default)]
        rows: Vec<Vec<Value>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSuggestion {
    pub name: String,
    #[serde(default)]
    pub geo_level: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub subdivision_name: Option<String>,
    #[serde(default)]
    pub city_name: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Upload destination for one local file, as handed out by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InputFileTarget {
    #[serde(rename = "s3_path")]
    pub remote_path: String,
    #[serde(rename = "multipart_upload_id", default)]
    pub transfer_token: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SampleStatus {
    #[default]
    Created,
    FilesUploaded,
    MarkedUploaded,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteSample {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub project_id: u64,
    #[serde(default)]
    pub input_files: Vec<InputFileTarget>,
    #[serde(skip)]
    pub status: SampleStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreatedSamples {
    pub credentials: Credentials,
    pub samples: Vec<RemoteSample>,
}

pub trait PlatformClient: Send + Sync {
    fn resolve_project(&self, name: &str) -> Result<u64, UploadError>;
    fn search_locations(&self, query: &str) -> Result<Vec<LocationSuggestion>, UploadError>;
    fn validate_metadata(
        &self,
        project_id: u64,
        samples: &SampleMap,
        metadata: &SamplesMetadata,
    ) -> Result<ValidationIssues, UploadError>;
    fn create_samples(
        &self,
        project_id: u64,
        samples: &SampleMap,
        metadata: &SamplesMetadata,
        options: &SampleOptions,
    ) -> Result<CreatedSamples, UploadError>;
    fn mark_uploaded(&self, sample_id: u64, sample_name: &str) -> Result<(), UploadError>;
}

#[derive(Clone)]
pub struct PlatformHttpClient {
    client: Client,
    base_url: String,
}

impl PlatformHttpClient {
    pub fn new(config: &PlatformConfig) -> Result<Self, UploadError> {
        let token = config.token.as_deref().ok_or(UploadError::MissingToken)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sample-uploader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| UploadError::PlatformHttp(err.to_string()))?,
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|err| UploadError::PlatformHttp(err.to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| UploadError::PlatformHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, UploadError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        tracing::warn!(status, attempt, "retrying platform request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        tracing::warn!(error = %err, attempt, "retrying platform request");
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(UploadError::PlatformHttp(err.to_string()));
                }
            }
        }
    }

    // Creating samples is not idempotent; a repeat would register the batch twice.
    fn send_once(request: RequestBuilder) -> Result<Response, UploadError> {
        request
            .send()
            .map_err(|err| UploadError::PlatformHttp(err.to_string()))
    }

    fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, UploadError> {
        let response = Self::check_status(response)?;
        response
            .json()
            .map_err(|err| UploadError::PlatformHttp(err.to_string()))
    }

    fn check_status(response: Response) -> Result<Response, UploadError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "platform request failed".to_string());
        Err(UploadError::PlatformStatus { status, message })
    }
}

#[derive(Deserialize)]
struct ProjectsResponse {
    projects: Vec<ProjectEntry>,
}

#[derive(Deserialize)]
struct ProjectEntry {
    id: u64,
    name: String,
}

#[derive(Deserialize)]
struct ValidationResponse {
    #[serde(default)]
    issues: ValidationIssues,
}

impl PlatformClient for PlatformHttpClient {
    fn resolve_project(&self, name: &str) -> Result<u64, UploadError> {
        let url = self.url("/projects.json");
        let response =
            self.send_with_retries(|| self.client.get(&url).query(&[("basic", "true")]))?;
        let projects: ProjectsResponse = Self::read_json(response)?;
        projects
            .projects
            .into_iter()
            .find(|project| project.name == name)
            .map(|project| project.id)
            .ok_or_else(|| UploadError::ProjectNotFound(name.to_string()))
    }

    fn search_locations(&self, query: &str) -> Result<Vec<LocationSuggestion>, UploadError> {
        let url = self.url("/locations/external_search");
        let response = self.send_with_retries(|| self.client.get(&url).query(&[("query", query)]))?;
        Self::read_json(response)
    }

    fn validate_metadata(
        &self,
        project_id: u64,
        samples: &SampleMap,
        metadata: &SamplesMetadata,
    ) -> Result<ValidationIssues, UploadError> {
        let url = self.url("/metadata/validate_csv_for_new_samples.json");
        let body = json!({
            "metadata": MetadataTable::from_samples(metadata),
            "samples": samples
                .keys()
                .map(|name| json!({ "name": name, "project_id": project_id }))
                .collect::<Vec<_>>(),
        });
        let response = self.send_with_retries(|| self.client.post(&url).json(&body))?;
        let validation: ValidationResponse = Self::read_json(response)?;
        Ok(validation.issues)
    }

    fn create_samples(
        &self,
        project_id: u64,
        samples: &SampleMap,
        metadata: &SamplesMetadata,
        options: &SampleOptions,
    ) -> Result<CreatedSamples, UploadError> {
        let url = self.url("/samples/bulk_upload_with_metadata.json");
        let body = create_samples_body(project_id, samples, metadata, options);
        let response = Self::send_once(self.client.post(&url).json(&body))?;
        Self::read_json(response)
    }

    fn mark_uploaded(&self, sample_id: u64, sample_name: &str) -> Result<(), UploadError> {
        let url = self.url(&format!("/samples/{sample_id}.json"));
        let body = json!({
            "sample": { "id": sample_id, "name": sample_name, "status": "uploaded" },
        });
        let response = self.send_with_retries(|| self.client.put(&url).json(&body))?;
        Self::check_status(response)?;
        Ok(())
    }
}

pub fn create_samples_body(
    project_id: u64,
    samples: &SampleMap,
    metadata: &SamplesMetadata,
    options: &SampleOptions,
) -> Value {
    let samples = samples
        .iter()
        .map(|(name, files)| {
            let mut sample = json!({
                "name": name,
                "project_id": project_id,
                "input_files_attributes": input_file_attributes(files),
                "status": "created",
                "workflows": [options.workflow.as_str()],
            });
            if let Some(host) = metadata.get(name).and_then(|m| m.host_genome()) {
                sample["host_genome_name"] = json!(host);
            }
            if let Some(technology) = options.technology {
                sample["technology"] = json!(technology.wire_name());
            }
            if let Some(protocol) = options.wetlab_protocol {
                sample["wetlab_protocol"] = json!(protocol.wire_name());
            }
            sample
        })
        .collect::<Vec<_>>();

    json!({
        "samples": samples,
        "metadata": metadata,
        "client": env!("CARGO_PKG_VERSION"),
    })
}

fn input_file_attributes(files: &SampleFiles) -> Vec<Value> {
    let reads = files
        .first_reads()
        .iter()
        .chain(files.second_reads())
        .chain(files.single_reads())
        .map(|path| (path, "fastq"));
    let reference = files
        .reference_fasta
        .iter()
        .map(|path| (path, "reference_sequence"));
    let primer = files.primer_bed.iter().map(|path| (path, "primer_bed"));

    reads
        .chain(reference)
        .chain(primer)
        .map(|(path, file_type)| {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            json!({
                "name": name,
                "parts": name,
                "source": name,
                "source_type": "local",
                "upload_client": "cli",
                "file_type": file_type,
            })
        })
        .collect()
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
