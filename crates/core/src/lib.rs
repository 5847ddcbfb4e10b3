//! `jobwire-core`: job domain building blocks.
//!
//! This crate contains **pure domain** types (no broker or transport concerns):
//! identifiers, the validated job payload, and the domain error model.

pub mod error;
pub mod id;
pub mod payload;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, UserId};
pub use payload::{JobPayload, JobRequest};
