//! Dynamic DNS record management
//!
//! This module provides the storage and resolution core:
//! * Record data model with per-type validation and wire conversion
//! * Thread-safe record store with atomic JSON persistence and auto-reload
//! * Zone-aware query resolution with CNAME chasing
//!
//! # Module Structure
//!
//! * `record` - Record data model, validation, wire conversion
//! * `protocol` - Query types and the typed answer representation
//! * `store` - Concurrency-safe record store with durable persistence
//! * `resolve` - Resolution engine (zone matching, CNAME chasing, SOA synthesis)
//! * `errors` - Error taxonomy shared across the module

/// Error types for store and resolution operations
pub mod errors;

/// Query types and typed resource record representation
pub mod protocol;

/// Record data model with per-type validation
pub mod record;

/// Zone-aware resolution engine
pub mod resolve;

/// Thread-safe record store with atomic JSON persistence
pub mod store;


#[cfg(test)]
mod resolve_test;
