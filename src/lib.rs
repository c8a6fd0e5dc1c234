//! archfix - architecture smells and guarded refactors for Python projects
//!
//! Builds the import graph of a Python project, detects architectural
//! smells, ranks them into an explainable patch plan, and applies that plan
//! behind a policy gate with backup, verification and automatic rollback.

pub mod apply;
pub mod cli;
pub mod config;
pub mod detectors;
pub mod error;
pub mod graph;
pub mod history;
pub mod learning;
pub mod models;
pub mod pipeline;
pub mod planner;
pub mod policy;
pub mod python;
pub mod scoring;

pub use error::{ArchError, ArchResult};
