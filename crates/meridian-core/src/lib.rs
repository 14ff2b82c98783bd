//! # meridian-core
//!
//! Core abstractions for the Meridian compute-job marketplace.
//!
//! This crate provides the foundational types used across all Meridian
//! components:
//!
//! - **Identifiers**: Strongly-typed, ULID-backed IDs for jobs, users, and
//!   billing entities
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured-logging initialization
//!
//! ## Example
//!
//! ```rust
//! use meridian_core::{JobId, UserId};
//!
//! let job = JobId::generate();
//! let owner = UserId::generate();
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

pub use error::{Error, Result};
pub use id::{AccountId, EntryId, EventId, JobId, UserId};
