// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for collective I/O coordination
//!
//! Native I/O failures never show up here: they travel inside `Ok` values as the
//! native sentinels (`None` handles, `EOF`, negative codes). These variants only
//! describe failures of the coordination itself.

use crate::registry::SlotId;

/// Coordination error type
#[derive(thiserror::Error, Debug)]
pub enum CollectiveError {
    #[error("not a member of a process group")]
    NotJoined,
    #[error("already a member of a process group")]
    AlreadyJoined,
    #[error("a process group needs at least one member")]
    EmptyGroup,
    #[error("rank {rank} is outside a group of {size}")]
    RankOutOfRange { rank: usize, size: usize },
    #[error("too many open distributed files (capacity {capacity})")]
    RegistryOverflow { capacity: usize },
    #[error("stale distributed handle {0}")]
    StaleHandle(SlotId),
    #[error("process group aborted with code {code}")]
    Aborted { code: i32 },
    #[error("lockstep violation: coordinator is in {expected}, this member is in {found}")]
    Divergence { expected: String, found: String },
    #[error("distributed payload of {needed} bytes does not fit a {available} byte buffer")]
    PayloadTooLarge { needed: usize, available: usize },
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type CollectiveResult<T> = Result<T, CollectiveError>;
