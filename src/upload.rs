use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::{Body, Client, Response};
use reqwest::header::{AUTHORIZATION, ETAG, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;

use crate::error::UploadError;
use crate::sigv4::{self, AMZ_DATE_FORMAT, CanonicalRequest, Signer, UNSIGNED_PAYLOAD};

pub const DEFAULT_PART_SIZE: u64 = 16 * 1024 * 1024;

/// Short-lived transfer credentials for a single upload batch.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    #[serde(default)]
    pub expiration: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &"<redacted>")
            .field("expiration", &self.expiration)
            .finish()
    }
}

/// Moves one local file to one remote destination. Each call blocks until
/// the transfer has finished or failed.
pub trait RemoteUploader {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        transfer_token: Option<&str>,
    ) -> Result<(), UploadError>;
}

/// Builds an uploader bound to one batch of credentials. The uploader owns
/// them, so they are released when it is dropped.
pub trait UploaderFactory {
    type Uploader: RemoteUploader;

    fn new_uploader(&self, credentials: Credentials) -> Result<Self::Uploader, UploadError>;
}

#[derive(Debug, Clone)]
pub struct HttpUploaderFactory {
    endpoint: String,
    region: String,
    connect_timeout: Duration,
    part_size: u64,
}

impl HttpUploaderFactory {
    /// Transfers only bound connection setup by `connect_timeout`; a large
    /// file may take as long as it needs once connected.
    pub fn new(endpoint: &str, region: &str, connect_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
            connect_timeout,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size.max(1);
        self
    }
}

impl UploaderFactory for HttpUploaderFactory {
    type Uploader = HttpUploader;

    fn new_uploader(&self, credentials: Credentials) -> Result<HttpUploader, UploadError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sample-uploader/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| UploadError::PlatformHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(self.connect_timeout)
            // The blocking client otherwise caps every request at 30 s.
            .timeout(None::<Duration>)
            .build()
            .map_err(|err| UploadError::PlatformHttp(err.to_string()))?;

        Ok(HttpUploader {
            client,
            endpoint: self.endpoint.clone(),
            region: self.region.clone(),
            part_size: self.part_size,
            credentials,
        })
    }
}

/// Path-style object store client signing every request with the batch
/// credentials. Files with a transfer token are sent as parts of that
/// multipart upload and then completed; others go up in one PUT.
pub struct HttpUploader {
    client: Client,
    endpoint: String,
    region: String,
    part_size: u64,
    credentials: Credentials,
}

impl HttpUploader {
    /// Encoded `/bucket/key` path for an `s3://bucket/key` destination.
    fn object_path(remote_path: &str) -> String {
        let key = remote_path.strip_prefix("s3://").unwrap_or(remote_path);
        format!("/{}", sigv4::uri_encode(key.trim_start_matches('/'), true))
    }

    fn send_signed(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        payload_hash: &str,
        body: Body,
    ) -> Result<Response, String> {
        let query = sigv4::canonical_query(query);
        let mut url = format!("{}{path}", self.endpoint);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query);
        }
        let url = reqwest::Url::parse(&url).map_err(|err| err.to_string())?;
        let host = url.host_str().ok_or("transfer endpoint has no host")?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let amz_date = chrono::Utc::now().format(AMZ_DATE_FORMAT).to_string();
        let mut headers = BTreeMap::from([
            ("host".to_string(), host),
            ("x-amz-content-sha256".to_string(), payload_hash.to_string()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ]);
        if !self.credentials.session_token.is_empty() {
            headers.insert(
                "x-amz-security-token".to_string(),
                self.credentials.session_token.clone(),
            );
        }
        let signer = Signer {
            access_key_id: &self.credentials.access_key_id,
            secret_access_key: &self.credentials.secret_access_key,
            region: &self.region,
        };
        let authorization = signer.authorization(
            &CanonicalRequest {
                method: method.as_str(),
                path,
                query: &query,
                headers: &headers,
                payload_hash,
            },
            &amz_date,
        );

        let mut request = self.client.request(method, url).body(body);
        for (name, value) in headers.iter().filter(|(name, _)| name.as_str() != "host") {
            let mut value = HeaderValue::from_str(value).map_err(|err| err.to_string())?;
            value.set_sensitive(name == "x-amz-security-token");
            request = request.header(name.as_str(), value);
        }
        let mut authorization = HeaderValue::from_str(&authorization).map_err(|err| err.to_string())?;
        authorization.set_sensitive(true);

        let response = request
            .header(AUTHORIZATION, authorization)
            .send()
            .map_err(|err| err.to_string())?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(format!("status {status}: {body}"));
        }
        Ok(response)
    }

    fn put_object(&self, file: File, size: u64, path: &str) -> Result<(), String> {
        self.send_signed(
            Method::PUT,
            path,
            &[],
            UNSIGNED_PAYLOAD,
            Body::sized(file, size),
        )?;
        Ok(())
    }

    fn upload_parts(
        &self,
        mut file: File,
        size: u64,
        path: &str,
        upload_id: &str,
    ) -> Result<(), String> {
        let mut etags = Vec::new();
        let mut remaining = size;
        let mut part_number = 1u32;
        loop {
            let len = remaining.min(self.part_size);
            let mut part = Vec::with_capacity(len as usize);
            file.by_ref()
                .take(len)
                .read_to_end(&mut part)
                .map_err(|err| err.to_string())?;
            if part.len() as u64 != len {
                return Err("file shrank while uploading".to_string());
            }

            let number = part_number.to_string();
            let hash = sigv4::sha256_hex(&part);
            let response = self.send_signed(
                Method::PUT,
                path,
                &[("partNumber", &number), ("uploadId", upload_id)],
                &hash,
                Body::from(part),
            )?;
            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| format!("no ETag returned for part {part_number}"))?;
            tracing::debug!(path, part = part_number, bytes = len, "uploaded part");
            etags.push((part_number, etag.to_string()));

            remaining -= len;
            if remaining == 0 {
                break;
            }
            part_number += 1;
        }

        let body = complete_multipart_body(&etags);
        let hash = sigv4::sha256_hex(body.as_bytes());
        let response = self.send_signed(
            Method::POST,
            path,
            &[("uploadId", upload_id)],
            &hash,
            Body::from(body),
        )?;
        // Completion can fail after the 200 status line has been sent.
        let text = response.text().map_err(|err| err.to_string())?;
        if text.contains("<Error>") {
            return Err(format!("completing multipart upload failed: {text}"));
        }
        Ok(())
    }
}

fn complete_multipart_body(etags: &[(u32, String)]) -> String {
    let parts: String = etags
        .iter()
        .map(|(number, etag)| format!("<Part><PartNumber>{number}</PartNumber><ETag>{etag}</ETag></Part>"))
        .collect();
    format!("<CompleteMultipartUpload>{parts}</CompleteMultipartUpload>")
}

impl RemoteUploader for HttpUploader {
    fn upload_file(
        &self,
        local_path: &Path,
        remote_path: &str,
        transfer_token: Option<&str>,
    ) -> Result<(), UploadError> {
        let transfer_error = |message: String| UploadError::TransferFailed {
            path: local_path.to_path_buf(),
            message,
        };

        let file = File::open(local_path).map_err(|err| transfer_error(err.to_string()))?;
        let size = file
            .metadata()
            .map_err(|err| transfer_error(err.to_string()))?
            .len();
        let path = Self::object_path(remote_path);

        tracing::debug!(path = %local_path.display(), remote_path, size, "uploading file");
        let outcome = match transfer_token {
            Some(upload_id) => self.upload_parts(file, size, &path, upload_id),
            None => self.put_object(file, size, &path),
        };
        outcome.map_err(transfer_error)
    }
}
