//! Bulk operations against the Shopify Admin GraphQL API.
//!
//! The crate is organised around one engine:
//!
//! - [`executor`] wraps a single GraphQL call with throttle-aware retries.
//! - [`runner`] joins input rows against a resource lookup, skips work the
//!   [`ledger`] already records as done, and submits the rest in bounded
//!   concurrent batches.
//! - [`jobs`] supply the mutation payload shapes (translations, tags, handle
//!   overrides, deletions).
//! - [`fetch`] exports paginated resources through the same executor.
//!
//! # Security
//!
//! This crate handles the HIGH PRIVILEGE Admin API token and, when refreshing
//! sessions, the app's OAuth client secret. Neither is ever logged.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod config;
pub mod executor;
pub mod fetch;
pub mod input;
pub mod jobs;
pub mod ledger;
pub mod report;
pub mod runner;
pub mod shopify;

pub use executor::{CallFailure, CallOutcome, Executor, RetryPolicy};
pub use ledger::{LedgerError, LedgerStats, ProgressLedger};
pub use runner::{BatchRunner, FieldMapping, FieldSource, FingerprintPolicy, Row, RunnerConfig, RunnerError, Summary};
pub use shopify::{AdminClient, AdminShopifyError, ApiLink, GraphQLTransport};
