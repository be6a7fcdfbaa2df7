//! Artifact naming.
//!
//! Every stage output lives at a path derived only from the target root, the
//! scan's subject and base name, and the stage. Resumption relies on this:
//! a scan is recognized as complete by the existence of its final path alone.

mod namer;

pub use namer::{Artifact, ArtifactNamer, ARTIFACT_EXTENSION};
