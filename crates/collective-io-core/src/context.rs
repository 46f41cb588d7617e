// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Group membership and the interception toggle

use tracing::{debug, info};

use crate::comm::Communicator;
use crate::config::IoConfig;
use crate::distribute::Distributor;
use crate::error::{CollectiveError, CollectiveResult};

/// Per-process view of the group: who we are and whether interception is on.
///
/// Distribution only happens while the context is both joined and enabled.
#[derive(Debug, Default)]
pub struct GroupContext {
    distributor: Option<Distributor>,
    enabled: bool,
}

impl GroupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the group behind `world`. Collective: allocates a private context
    /// with `world.duplicate()`, so every member must call it.
    pub fn join(&mut self, world: &dyn Communicator, config: &IoConfig) -> CollectiveResult<()> {
        if self.distributor.is_some() {
            return Err(CollectiveError::AlreadyJoined);
        }
        let size = world.size();
        if size == 0 {
            return Err(CollectiveError::EmptyGroup);
        }
        if config.coordinator >= size {
            return Err(CollectiveError::RankOutOfRange {
                rank: config.coordinator,
                size,
            });
        }

        let private = world.duplicate()?;
        let distributor = Distributor::new(
            private,
            config.coordinator,
            config.verify_lockstep,
            config.abort_code,
        )?;
        self.enabled = config.enable_on_join;
        info!(
            rank = distributor.rank(),
            size = distributor.size(),
            coordinator = config.coordinator,
            enabled = self.enabled,
            "joined collective I/O group"
        );
        self.distributor = Some(distributor);
        Ok(())
    }

    /// Release the private context. A no-op outside a group.
    pub fn leave(&mut self) {
        if let Some(distributor) = self.distributor.take() {
            info!(rank = distributor.rank(), "left collective I/O group");
        }
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
        debug!(rank = self.rank(), "collective I/O enabled");
    }

    pub fn disable(&mut self) {
        self.enabled = false;
        debug!(rank = self.rank(), "collective I/O disabled");
    }

    pub fn is_initialized(&self) -> bool {
        self.distributor.is_some()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Joined and enabled
    pub fn is_active(&self) -> bool {
        self.enabled && self.distributor.is_some()
    }

    pub fn rank(&self) -> usize {
        self.distributor.as_ref().map_or(0, Distributor::rank)
    }

    pub fn size(&self) -> usize {
        self.distributor.as_ref().map_or(1, Distributor::size)
    }

    pub fn distributor(&self) -> CollectiveResult<&Distributor> {
        self.distributor.as_ref().ok_or(CollectiveError::NotJoined)
    }
}
