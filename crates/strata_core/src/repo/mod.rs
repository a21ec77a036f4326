//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define layer-oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories only operate on connections at the latest schema version.
//! - Repository APIs return semantic errors (`NodeNotFound`) in addition to DB
//!   transport errors.

pub mod layer_repo;
