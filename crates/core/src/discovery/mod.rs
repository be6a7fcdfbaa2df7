//! Discovery of raw scans under a class-labeled source tree.
//!
//! Expected layout:
//!
//! ```text
//! <source_root>/<class>/<subject>/.../<scan file>
//! ```
//!
//! Scan files must all sit at the same configured depth. A scan found at any
//! other depth is reported as a malformed layout rather than dropped, so a
//! shrinking corpus never goes unnoticed.

mod error;
mod types;
mod walker;

pub use error::DiscoveryError;
pub use types::{DiscoveryConfig, Scan};
pub use walker::discover;
