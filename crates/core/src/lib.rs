//! `stockkeep-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the decide/apply aggregate traits
//! the inventory domain is written against.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use error::DomainError;
pub use id::{MovementId, ProductId, UserId, VariantId};
