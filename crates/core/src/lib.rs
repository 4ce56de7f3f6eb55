//! Domain model for the texture-generation client.
//!
//! Pure types and rules with no I/O: job and result payloads, the
//! per-job polling state machine, the variation store, generation
//! session bookkeeping, subscription quotas, resolutions, and
//! reference-image checks. The HTTP side lives in `texgen-client`.

pub mod error;
pub mod job;
pub mod lifecycle;
pub mod reference;
pub mod resolution;
pub mod session;
pub mod subscription;
pub mod types;
pub mod variation;
