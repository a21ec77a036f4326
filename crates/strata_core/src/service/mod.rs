//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate layer repository calls into taxonomy and unit use cases.
//! - Keep presentation layers decoupled from storage details.

pub mod graph;
pub mod taxonomy_service;
pub mod unit_service;
