//! Bulk operations core - shared types library.
//!
//! This crate provides the types shared by the bulk operation tools:
//! - `admin` - Admin API client, rate-limited executor, ledger, batch runner
//! - `cli` - Command-line front-end for the batch jobs and exports
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no file I/O, no
//! HTTP clients. Hashing lives here because idempotency keys are part of the
//! data model.
//!
//! # Modules
//!
//! - [`types`] - Keys, ledger entries, work items, throttle readings, emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
