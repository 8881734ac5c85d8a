use std::collections::HashMap;

use crate::error::UploadError;
use crate::metadata::SamplesMetadata;
use crate::platform::{LocationSuggestion, PlatformClient};

pub const COLLECTION_LOCATION_FIELDS: &[&str] = &["Collection Location", "Collection Location v2"];

/// Replaces free-text collection locations with the platform's best
/// location match. Each distinct query is looked up once; locations with no
/// match are left as typed.
pub fn apply_location_suggestions<P: PlatformClient + ?Sized>(
    platform: &P,
    metadata: &mut SamplesMetadata,
) -> Result<usize, UploadError> {
    let mut cache: HashMap<String, Option<LocationSuggestion>> = HashMap::new();
    let mut replaced = 0usize;

    for (sample, fields) in metadata.iter_mut() {
        for (field, value) in fields.iter_mut() {
            if !COLLECTION_LOCATION_FIELDS.contains(&field.as_str()) {
                continue;
            }
            let Some(query) = value.as_str().map(str::trim).filter(|q| !q.is_empty()) else {
                continue;
            };
            let query = query.to_string();
            let suggestion = match cache.get(&query) {
                Some(hit) => hit.clone(),
                None => {
                    let found = platform.search_locations(&query)?.into_iter().next();
                    cache.insert(query.clone(), found.clone());
                    found
                }
            };
            match suggestion {
                Some(location) => {
                    tracing::debug!(sample = %sample, query = %query, suggestion = %location.name, "location matched");
                    *value = serde_json::to_value(&location)
                        .map_err(|err| UploadError::PlatformHttp(err.to_string()))?;
                    replaced += 1;
                }
                None => {
                    tracing::warn!(sample = %sample, query = %query, "no location match, keeping value as typed");
                }
            }
        }
    }
    Ok(replaced)
}
