//! `regionfuse-recon`: region record fusion engine.
//!
//! Pure engine crate: receives pre-loaded survey extracts, boundary records
//! and an optional ancillary table, returns one fused record per boundary
//! region plus a run report. No CLI or IO dependencies.

pub mod config;
pub mod derived;
pub mod engine;
pub mod error;
pub mod identity;
pub mod matcher;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod numeric;
pub mod states;
pub mod summary;

pub use config::FusionConfig;
pub use engine::{run, run_at};
pub use error::FusionError;
pub use identity::{canonicalize, IdentityError, RegionId};
pub use model::{FusionInput, FusionResult, RawExtract, RawRow, RawValue, RecordKind};
