//! API Module
//!
//! HTTP handlers and routing for the shared tag cache.
//!
//! # Endpoints
//! - `PUT /entries` - Store a value with TTL and tags
//! - `GET /entries/:key` - Retrieve a live value with its tags
//! - `DELETE /entries/:key` - Delete a key
//! - `POST /invalidate/keys` - Expire entries by key
//! - `POST /invalidate/tags` - Expire entries by tag
//! - `POST /keys` - Derive the cache key for a name and params
//! - `GET /presets` - List cache presets
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
