//! Cache Presets
//!
//! Fixed table of freshness classes. Each preset pairs a revalidation window
//! with a tag builder that derives invalidation tags from call parameters.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::CacheError;
use crate::keys::ParamValue;

/// Freshness class for a cached computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePreset {
    /// Per-user notification feeds
    Realtime,
    /// Frequently changing lists
    Short,
    /// Per-user profile and policy lists
    Medium,
    /// Per-entity detail views
    Long,
    /// System-wide settings
    Static,
    /// Anything keyed by a user
    User,
    /// Anything keyed by a policy
    Policy,
}

impl CachePreset {
    /// Every preset, in table order.
    pub const ALL: [CachePreset; 7] = [
        CachePreset::Realtime,
        CachePreset::Short,
        CachePreset::Medium,
        CachePreset::Long,
        CachePreset::Static,
        CachePreset::User,
        CachePreset::Policy,
    ];

    /// The freshness classes, shortest window first.
    pub const ORDERED: [CachePreset; 5] = [
        CachePreset::Realtime,
        CachePreset::Short,
        CachePreset::Medium,
        CachePreset::Long,
        CachePreset::Static,
    ];

    pub fn revalidate_seconds(self) -> u64 {
        match self {
            CachePreset::Realtime => 5,
            CachePreset::Short => 60,
            CachePreset::Medium => 300,
            CachePreset::Long => 3_600,
            CachePreset::Static => 86_400,
            CachePreset::User => 300,
            CachePreset::Policy => 1_800,
        }
    }

    pub fn revalidate(self) -> Duration {
        Duration::from_secs(self.revalidate_seconds())
    }

    pub fn name(self) -> &'static str {
        match self {
            CachePreset::Realtime => "realtime",
            CachePreset::Short => "short",
            CachePreset::Medium => "medium",
            CachePreset::Long => "long",
            CachePreset::Static => "static",
            CachePreset::User => "user",
            CachePreset::Policy => "policy",
        }
    }

    // == Tag Builder ==
    /// Builds the invalidation tags for a call with `params`.
    ///
    /// Per-entity presets read `userId` or `policyId` from the top-level
    /// parameter map. Only the policy presets also accept a plain `id`, so a
    /// policy lookup by `id` is never tagged as a user. When the id is absent
    /// the coarse class tag is used instead, so the entry can still be
    /// invalidated.
    pub fn tags(self, params: Option<&ParamValue>) -> Vec<String> {
        match self {
            CachePreset::Realtime => {
                scoped("notifications", "notifications", id_field(params, &["userId"]))
            }
            CachePreset::Short => vec!["lists".to_string()],
            CachePreset::Medium | CachePreset::User => {
                scoped("user", "users", id_field(params, &["userId"]))
            }
            CachePreset::Long | CachePreset::Policy => {
                scoped("policy", "policies", id_field(params, &["policyId", "id"]))
            }
            CachePreset::Static => vec!["settings".to_string()],
        }
    }
}

/// `{prefix}:{id}` when an id is known, else the coarse class tag.
fn scoped(prefix: &str, coarse: &str, id: Option<String>) -> Vec<String> {
    match id {
        Some(id) => vec![format!("{prefix}:{id}")],
        None => vec![coarse.to_string()],
    }
}

/// First of `fields` present in the top-level params, rendered as a tag fragment.
fn id_field(params: Option<&ParamValue>, fields: &[&str]) -> Option<String> {
    let params = params?;
    fields
        .iter()
        .find_map(|field| params.get(field))
        .and_then(ParamValue::as_tag_fragment)
}

impl fmt::Display for CachePreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CachePreset {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CachePreset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CacheError::InvalidRequest(format!("Unknown cache preset: {s}")))
    }
}
