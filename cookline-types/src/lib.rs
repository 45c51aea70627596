//! Core type definitions for cookline.
//!
//! This crate defines the identifiers every pipeline stage agrees on:
//! - Game, branch and segment identifiers (with branch state suffixes)
//! - Cook run identifiers (UUID v7)
//! - Checksum records used as a cheap change-detection signal
//!
//! Content records themselves (entities, offers, events, ...) live in
//! `cookline-model`.

mod checksum;
mod ids;

pub use checksum::{ChecksumRecord, canonical_checksum, utf16_checksum};
pub use ids::{BranchName, BranchState, EVERYONE_SEGMENT, GameId, RunId, SegmentId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid branch name: {0}")]
    InvalidBranch(String),

    #[error("invalid checksum key: {0}")]
    InvalidChecksumKey(String),
}
