//! dynrec
//!
//! A concurrency-safe dynamic DNS record store with durable JSON persistence,
//! plus the resolution engine that answers queries against it.
//!
//! # Features
//!
//! * In-memory record index served under a reader/writer lock
//! * Atomic on-disk persistence (temp file + rename) that never blocks readers
//! * Background reconciliation of external file edits without lost updates
//! * Mutation policies (sync, create-only, update-only, upsert-only)
//! * Zone-aware resolution with CNAME chasing and synthesized SOA authority
//!
//! # Architecture
//!
//! Everything lives under the `dns` module. Transport layers (REST, gRPC,
//! wire-format DNS servers), authentication, and configuration parsing are
//! external consumers of [`dns::store::RecordStore`] and
//! [`dns::resolve::Resolver`].

/// Record store and resolution engine
pub mod dns;
