//! Shared utilities for cvtailor integration tests.
//!
//! - `TestHarness` wires a processor to an in-memory database and fakes
//! - `fakes` holds the blob store, OCR engine and completion client doubles

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{RecordingStore, TestHarness};

/// A plain-text resume comfortably above the minimum extraction length.
pub const JANE_DOE_RESUME: &str = "Jane Doe\n\
Senior Backend Engineer\n\
jane.doe@example.com | Berlin\n\
\n\
Experience\n\
- Acme Corp (2019-2024): built payment APIs in Rust and Go, led a team of four.\n\
- Initech (2015-2019): maintained PostgreSQL clusters and on-call tooling.\n\
\n\
Skills: Rust, Tokio, SQL, Kubernetes, observability.\n";

pub const JOB_DESCRIPTION: &str =
    "We are hiring a Staff Engineer to own our Rust payment platform and mentor engineers.";
