// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Communication substrate consumed by the collective I/O layer
//!
//! The layer needs four collective primitives (rank, size, broadcast, barrier)
//! plus the ability to carve out a private context and to abort the group. Any
//! transport can provide them; two implementations ship here:
//!
//! - [`SingleProcess`]: a group of one, for jobs that run without a launcher
//! - [`LocalGroup`]: an in-process group whose members are threads
//!
//! # Synchronization
//!
//! `broadcast`, `barrier` and `duplicate` are collective: they complete on no
//! member until every member of the group has called them, in the same order.
//! There is no timeout.

mod local;

pub use local::{LocalEndpoint, LocalGroup};

use std::cell::Cell;

use crate::error::{CollectiveError, CollectiveResult};

/// Collective communication primitives of a process group.
#[cfg_attr(test, mockall::automock)]
pub trait Communicator: Send {
    /// Rank of the calling member (`0..size`)
    fn rank(&self) -> usize;

    /// Number of members in the group
    fn size(&self) -> usize;

    /// One-to-many distribution. On `root`, `payload` is sent unchanged; on every
    /// other member it is replaced by the root's bytes. Blocks until all members
    /// have participated.
    fn broadcast(&self, payload: &mut Vec<u8>, root: usize) -> CollectiveResult<()>;

    /// All-to-all rendezvous.
    fn barrier(&self) -> CollectiveResult<()>;

    /// Allocate a private context over the same members. Collective.
    fn duplicate(&self) -> CollectiveResult<Box<dyn Communicator>>;

    /// Terminate the whole group with `code`. Launcher-backed substrates end the
    /// job; in-process substrates release every blocked member with
    /// [`CollectiveError::Aborted`].
    fn abort(&self, code: i32);
}

/// A group with a single member
#[derive(Debug, Default)]
pub struct SingleProcess {
    aborted: Cell<Option<i32>>,
}

impl SingleProcess {
    pub fn new() -> Self {
        Self::default()
    }

    fn check(&self) -> CollectiveResult<()> {
        match self.aborted.get() {
            Some(code) => Err(CollectiveError::Aborted { code }),
            None => Ok(()),
        }
    }
}

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast(&self, _payload: &mut Vec<u8>, root: usize) -> CollectiveResult<()> {
        self.check()?;
        if root != 0 {
            return Err(CollectiveError::RankOutOfRange {
                rank: root,
                size: 1,
            });
        }
        Ok(())
    }

    fn barrier(&self) -> CollectiveResult<()> {
        self.check()
    }

    fn duplicate(&self) -> CollectiveResult<Box<dyn Communicator>> {
        self.check()?;
        Ok(Box::new(SingleProcess::new()))
    }

    fn abort(&self, code: i32) {
        self.aborted.set(Some(code));
    }
}
