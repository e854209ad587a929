//! Core types for the bulk operation tools.
//!
//! This module provides type-safe wrappers for the concepts the batch
//! runner and its ledger are built on.

pub mod email;
pub mod key;
pub mod ledger;
pub mod resource;
pub mod throttle;
pub mod work;

pub use email::{DomainBlocklist, Email, EmailError};
pub use key::*;
pub use ledger::{IdempotencyKey, LEDGER_VERSION, ProgressEntry, ProgressFile, ProgressStatus};
pub use resource::{CANONICAL_LOCALE, ResourceLookup, TranslatableContent, TranslatableResource};
pub use throttle::ThrottleReading;
pub use work::{PayloadField, WorkItem};
