//! Generation execution: the provider seam and the single-attempt executor.

pub mod executor;
pub mod provider;

pub use executor::{AttemptOutcome, GenerationExecutor};
pub use provider::{Artifact, ArtifactMetadata, GenerationCtx, GenerationProvider, Resolution};
