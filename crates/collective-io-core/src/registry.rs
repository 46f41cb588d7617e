// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bounded table of distributed file handles
//!
//! Every member of a group runs the same sequence of `register`/`retire` calls, and
//! slot allocation only depends on that sequence, so the same open yields the same
//! `SlotId` on every member.

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::error::{CollectiveError, CollectiveResult};

/// Default number of concurrently open distributed handles
pub const DEFAULT_CAPACITY: usize = 32;

/// Arena index plus generation of a registered handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId {
    pub index: u32,
    pub generation: u32,
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Result of looking a handle up in the registry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Distributed(SlotId),
    Local,
}

#[derive(Clone, Debug, Default)]
struct Slot {
    generation: u32,
    live: bool,
}

/// Fixed-capacity registry of distributed handles
#[derive(Debug)]
pub struct HandleRegistry {
    capacity: usize,
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HandleRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live distributed handles
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Allocate a slot for a freshly opened distributed handle.
    ///
    /// Overflow is reported to the caller, which must abort the whole group: a
    /// member that kept going with a partial registration would desynchronize.
    pub fn register(&mut self) -> CollectiveResult<SlotId> {
        if self.live >= self.capacity {
            error!(capacity = self.capacity, "distributed handle registry is full");
            return Err(CollectiveError::RegistryOverflow {
                capacity: self.capacity,
            });
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.live = true;
        self.live += 1;

        let id = SlotId {
            index,
            generation: slot.generation,
        };
        debug!(slot = %id, live = self.live, "registered distributed handle");
        Ok(id)
    }

    /// Release the slot of a closed handle. Order of retirement does not matter.
    pub fn retire(&mut self, id: SlotId) -> CollectiveResult<()> {
        if !self.contains(id) {
            return Err(CollectiveError::StaleHandle(id));
        }
        let slot = &mut self.slots[id.index as usize];
        slot.live = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        debug!(slot = %id, live = self.live, "retired distributed handle");
        Ok(())
    }

    /// True when `id` names a live slot of the current generation
    pub fn contains(&self, id: SlotId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.live && slot.generation == id.generation)
    }

    pub fn classify(&self, id: Option<SlotId>) -> Classification {
        match id {
            Some(id) if self.contains(id) => Classification::Distributed(id),
            _ => Classification::Local,
        }
    }

    /// Forget every slot. Ids handed out before the call become stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            slot.live = false;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index as u32);
        }
        self.live = 0;
    }
}
