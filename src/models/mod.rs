//! Core data models for the gateway.
//!
//! Buckets and objects are owned by the backing object store; these types
//! describe them at the HTTP boundary and in listings.

pub mod bucket;
pub mod object;
