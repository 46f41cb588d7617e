// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Named distribution primitives over the group's private context
//!
//! Every method here is a blocking collective call. `publish` on the coordinator
//! and `receive` on the other members are the two halves of one broadcast, so a
//! member must call exactly one of them wherever the coordinator calls the other.

use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, trace};

use crate::comm::Communicator;
use crate::error::{CollectiveError, CollectiveResult};
use crate::types::Op;

/// Coordinator-rooted broadcast and barrier for one group membership
pub struct Distributor {
    comm: Box<dyn Communicator>,
    coordinator: usize,
    verify_lockstep: bool,
    abort_code: i32,
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("rank", &self.comm.rank())
            .field("size", &self.comm.size())
            .field("coordinator", &self.coordinator)
            .field("verify_lockstep", &self.verify_lockstep)
            .finish()
    }
}

impl Distributor {
    pub fn new(
        comm: Box<dyn Communicator>,
        coordinator: usize,
        verify_lockstep: bool,
        abort_code: i32,
    ) -> CollectiveResult<Self> {
        let size = comm.size();
        if coordinator >= size {
            return Err(CollectiveError::RankOutOfRange {
                rank: coordinator,
                size,
            });
        }
        Ok(Self {
            comm,
            coordinator,
            verify_lockstep,
            abort_code,
        })
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    pub fn coordinator(&self) -> usize {
        self.coordinator
    }

    pub fn is_coordinator(&self) -> bool {
        self.comm.rank() == self.coordinator
    }

    /// Send a typed value from the coordinator. Blocks until every member has
    /// entered the matching [`Distributor::receive`].
    pub fn publish<T: Serialize>(&self, value: &T) -> CollectiveResult<()> {
        let mut payload = serde_json::to_vec(value)?;
        self.broadcast(&mut payload)
    }

    /// Receive the coordinator's typed value. Blocking.
    pub fn receive<T: DeserializeOwned>(&self) -> CollectiveResult<T> {
        let mut payload = Vec::new();
        self.broadcast(&mut payload)?;
        Ok(serde_json::from_slice(&payload)?)
    }

    /// Send raw bytes from the coordinator, exactly `bytes.len()` of them. Blocking.
    pub fn publish_bytes(&self, bytes: &[u8]) -> CollectiveResult<()> {
        let mut payload = bytes.to_vec();
        self.broadcast(&mut payload)
    }

    /// Receive the coordinator's raw bytes. Blocking.
    pub fn receive_bytes(&self) -> CollectiveResult<Vec<u8>> {
        let mut payload = Vec::new();
        self.broadcast(&mut payload)?;
        Ok(payload)
    }

    /// Group-wide rendezvous. Blocking.
    pub fn barrier(&self) -> CollectiveResult<()> {
        trace!(rank = self.rank(), "barrier");
        self.comm.barrier()
    }

    /// Terminate the whole group
    pub fn abort(&self, code: i32) {
        self.comm.abort(code);
    }

    pub fn abort_code(&self) -> i32 {
        self.abort_code
    }

    /// Confirm the coordinator is about to run the same operation as this member.
    ///
    /// No-op unless lockstep verification is on. On mismatch the group is aborted
    /// and [`CollectiveError::Divergence`] is returned.
    pub fn checkpoint(&self, op: Op) -> CollectiveResult<()> {
        if !self.verify_lockstep {
            return Ok(());
        }
        if self.is_coordinator() {
            return self.publish(&op);
        }
        let expected: Op = self.receive()?;
        if expected != op {
            error!(
                rank = self.rank(),
                %expected,
                found = %op,
                "members left lockstep, aborting group"
            );
            self.abort(self.abort_code);
            return Err(CollectiveError::Divergence {
                expected: expected.to_string(),
                found: op.to_string(),
            });
        }
        Ok(())
    }

    fn broadcast(&self, payload: &mut Vec<u8>) -> CollectiveResult<()> {
        self.comm.broadcast(payload, self.coordinator)?;
        trace!(rank = self.rank(), bytes = payload.len(), "distributed");
        Ok(())
    }
}
