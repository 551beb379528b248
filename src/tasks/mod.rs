//! Background Tasks Module
//!
//! # Tasks
//! - Expiry cleanup: purges expired entries and their tag-index references

mod cleanup;

pub use cleanup::spawn_cleanup_task;
