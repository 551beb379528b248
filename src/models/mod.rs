//! Request and Response models for the cache HTTP API
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{DeriveKeyRequest, InvalidateKeysRequest, InvalidateTagsRequest, SetEntryRequest};
pub use responses::{
    DeleteResponse, EntryResponse, ErrorResponse, HealthResponse, InvalidateResponse, KeyResponse,
    PresetResponse, SetResponse, StatsResponse,
};
