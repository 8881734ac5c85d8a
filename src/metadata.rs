use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::SampleMap;
use crate::error::UploadError;

pub const SAMPLE_NAME_COLUMN: &str = "Sample Name";
pub const HOST_ORGANISM_FIELD: &str = "Host Organism";

/// Metadata fields of one sample, keyed by field display name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, Value>);

pub type SamplesMetadata = BTreeMap<String, Metadata>;

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect(),
        )
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.0.iter_mut()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merges `overrides` on top of `self`; overriding values win.
    pub fn fuse(&self, overrides: &Metadata) -> Metadata {
        let mut fused = self.0.clone();
        for (name, value) in &overrides.0 {
            fused.insert(name.clone(), value.clone());
        }
        Metadata(fused)
    }

    pub fn host_genome(&self) -> Option<&str> {
        self.get_str(HOST_ORGANISM_FIELD)
    }
}

/// Parses a `name=value` command-line metadatum.
pub fn parse_metadatum(raw: &str) -> Result<(String, String), UploadError> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| UploadError::InvalidMetadatum(raw.to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(UploadError::InvalidMetadatum(raw.to_string()));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Reads per-sample metadata from a CSV whose header contains a
/// `Sample Name` column. Empty cells are left out.
pub fn read_csv(path: &Path) -> Result<SamplesMetadata, UploadError> {
    let csv_error = |message: String| UploadError::MetadataCsv {
        path: path.to_path_buf(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|err| csv_error(err.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|err| csv_error(err.to_string()))?
        .clone();
    let name_index = headers
        .iter()
        .position(|header| is_sample_name_column(header))
        .ok_or_else(|| csv_error(format!("missing '{SAMPLE_NAME_COLUMN}' column")))?;

    let mut samples = SamplesMetadata::new();
    for record in reader.records() {
        let record = record.map_err(|err| csv_error(err.to_string()))?;
        let Some(name) = record.get(name_index).filter(|name| !name.is_empty()) else {
            continue;
        };
        let mut metadata = Metadata::new();
        for (index, (header, value)) in headers.iter().zip(record.iter()).enumerate() {
            if index == name_index || value.is_empty() {
                continue;
            }
            metadata.insert(header, Value::String(value.to_string()));
        }
        samples.insert(name.to_string(), metadata);
    }
    Ok(samples)
}

fn is_sample_name_column(header: &str) -> bool {
    header.eq_ignore_ascii_case(SAMPLE_NAME_COLUMN) || header.eq_ignore_ascii_case("sample_name")
}

/// Produces the effective metadata: exactly one entry per discovered sample,
/// CSV rows for unknown samples dropped, command-line values on top.
pub fn reconcile(
    samples: &SampleMap,
    csv_metadata: Option<SamplesMetadata>,
    cli_metadata: &Metadata,
) -> SamplesMetadata {
    let mut metadata = csv_metadata.unwrap_or_default();
    metadata.retain(|name, _| samples.contains_key(name));
    for name in samples.keys() {
        metadata.entry(name.clone()).or_default();
    }
    for value in metadata.values_mut() {
        *value = value.fuse(cli_metadata);
    }
    metadata
}

/// Tabular form used by the platform's metadata validation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl MetadataTable {
    pub fn from_samples(metadata: &SamplesMetadata) -> Self {
        let fields: BTreeSet<&String> = metadata.values().flat_map(|m| m.0.keys()).collect();
        let mut headers = vec![SAMPLE_NAME_COLUMN.to_string()];
        headers.extend(fields.iter().map(|field| field.to_string()));

        let rows = metadata
            .iter()
            .map(|(name, sample)| {
                let mut row = vec![Value::String(name.clone())];
                row.extend(fields.iter().map(|field| {
                    sample
                        .get(field.as_str())
                        .cloned()
                        .unwrap_or_else(|| Value::String(String::new()))
                }));
                row
            })
            .collect();

        Self { headers, rows }
    }
}
