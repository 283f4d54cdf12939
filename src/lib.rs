//! Confidence-pack benchmark library
//!
//! Exercises a deployed question-answering endpoint with categorized inputs, aggregates
//! correctness and latency across repeated runs, and evaluates fixed release-readiness gates.

pub mod benchmark;
pub mod config;
pub mod error;
pub mod executor;
pub mod pack;
pub mod persist;
pub mod report;
pub mod runner;
