//! Request DTOs for the cache HTTP API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::Value;

use crate::cache::{MAX_KEY_LENGTH, MAX_TAGS_PER_ENTRY, MAX_VALUE_SIZE};
use crate::keys::ParamValue;

/// Request body for PUT /entries
#[derive(Debug, Clone, Deserialize)]
pub struct SetEntryRequest {
    /// The cache key
    pub key: String,
    /// Any JSON value
    pub value: Value,
    /// Optional TTL in seconds (server default if omitted)
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Tags to invalidate the entry by
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SetEntryRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        if self.key.len() > MAX_KEY_LENGTH {
            return Some(format!(
                "Key exceeds maximum length of {} bytes",
                MAX_KEY_LENGTH
            ));
        }
        if self.value.to_string().len() > MAX_VALUE_SIZE {
            return Some(format!(
                "Value exceeds maximum size of {} bytes",
                MAX_VALUE_SIZE
            ));
        }
        if self.ttl == Some(0) {
            return Some("TTL must be at least 1 second".to_string());
        }
        validate_tags(&self.tags)
    }
}

/// Request body for POST /invalidate/keys
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateKeysRequest {
    #[serde(default)]
    pub keys: Vec<String>,
}

/// Request body for POST /invalidate/tags
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateTagsRequest {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Request body for POST /keys
#[derive(Debug, Clone, Deserialize)]
pub struct DeriveKeyRequest {
    /// Operation name
    pub name: String,
    /// Parameters, omitted or null for none
    #[serde(default)]
    pub params: Option<ParamValue>,
}

impl DeriveKeyRequest {
    pub fn validate(&self) -> Option<String> {
        if self.name.is_empty() {
            return Some("Name cannot be empty".to_string());
        }
        None
    }
}

fn validate_tags(tags: &[String]) -> Option<String> {
    if tags.len() > MAX_TAGS_PER_ENTRY {
        return Some(format!(
            "Entry exceeds maximum of {} tags",
            MAX_TAGS_PER_ENTRY
        ));
    }
    if tags.iter().any(|tag| tag.is_empty()) {
        return Some("Tags cannot be empty".to_string());
    }
    None
}
