//! Content cooking pipeline.
//!
//! A cook run turns the raw content of a draft branch into segment-sharded
//! artifacts published under a target branch:
//!
//! 1. [`SnapshotManager`] copies every raw collection of the source branch
//!    into the target's `_reference` and `_working` branches and checksums it.
//! 2. [`CookOrchestrator`] runs one cooker per [`cookline_model::ArtifactKind`]
//!    against the source branch. Entities resolve inheritance
//!    ([`resolve_inheritance`]) and evaluate derived values in the formula
//!    sandbox; offers are expanded with AB-test and event variants
//!    ([`expand_variants`]) first; events are expanded into occurrences
//!    ([`expand_occurrences`]); flows wait for the cooked entities.
//! 3. [`ArtifactPublisher`] writes the artifacts and the checksum record, but
//!    only when every cooker succeeded.
//!
//! The first error aborts the run. Previously published artifacts stay live.

pub mod config;
pub mod cookers;
pub mod error;
pub mod inheritance;
pub mod links;
pub mod orchestrator;
pub mod publisher;
pub mod schedule;
pub mod snapshot;
pub mod variants;

pub use config::{CookConfig, EventsConfig, RunConfig, SnapshotConfig};
pub use cookers::{CookContext, CookedContent};
pub use error::{CookError, CookResult};
pub use inheritance::{resolve_inheritance, NodeIndex};
pub use links::{find_link, remove_function_link, set_function_link, LinkEditor};
pub use orchestrator::{Collaborators, CookOrchestrator, CookReport, CookRequest};
pub use publisher::ArtifactPublisher;
pub use schedule::{expand_occurrences, Occurrence};
pub use snapshot::SnapshotManager;
pub use variants::expand_variants;
