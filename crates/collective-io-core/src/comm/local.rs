// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-process process group: every member is a thread holding one endpoint

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use tracing::{trace, warn};

use super::Communicator;
use crate::error::{CollectiveError, CollectiveResult};

/// One collective call in progress on a context
#[derive(Debug, Default)]
struct Round {
    payload: Option<Vec<u8>>,
    arrived: usize,
    departed: usize,
}

#[derive(Debug, Default)]
struct ChannelState {
    rounds: HashMap<u64, Round>,
    aborted: Option<i32>,
}

/// Rendezvous point shared by the endpoints of one communication context
#[derive(Debug)]
struct Channel {
    size: usize,
    state: Mutex<ChannelState>,
    wake: Condvar,
}

impl Channel {
    fn new(size: usize, aborted: Option<i32>) -> Self {
        Self {
            size,
            state: Mutex::new(ChannelState {
                rounds: HashMap::new(),
                aborted,
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join round `round`, optionally contributing the payload, and wait until
    /// every member has arrived and a payload is present.
    fn exchange(&self, round: u64, contribution: Option<Vec<u8>>) -> CollectiveResult<Vec<u8>> {
        let mut state = self.lock();
        if let Some(code) = state.aborted {
            return Err(CollectiveError::Aborted { code });
        }

        let entry = state.rounds.entry(round).or_default();
        if contribution.is_some() {
            entry.payload = contribution;
        }
        entry.arrived += 1;
        self.wake.notify_all();

        // A completed round is delivered even if the group aborted meanwhile
        loop {
            let complete = state
                .rounds
                .get(&round)
                .is_some_and(|r| r.arrived == self.size && r.payload.is_some());
            if complete {
                break;
            }
            if let Some(code) = state.aborted {
                return Err(CollectiveError::Aborted { code });
            }
            state = self.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        let size = self.size;
        let mut payload = Vec::new();
        let mut finished = false;
        if let Some(entry) = state.rounds.get_mut(&round) {
            payload = entry.payload.clone().unwrap_or_default();
            entry.departed += 1;
            finished = entry.departed == size;
        }
        if finished {
            state.rounds.remove(&round);
        }
        Ok(payload)
    }

    fn abort(&self, code: i32) {
        let mut state = self.lock();
        if state.aborted.is_none() {
            state.aborted = Some(code);
        }
        self.wake.notify_all();
    }
}

#[derive(Debug)]
struct Fabric {
    size: usize,
    aborted: Mutex<Option<i32>>,
    contexts: Mutex<HashMap<Vec<u64>, Arc<Channel>>>,
}

impl Fabric {
    fn channel(&self, context: &[u64]) -> Arc<Channel> {
        // Read the abort flag under the contexts lock: `abort` sets the flag
        // before walking the contexts, so a new channel sees one or the other.
        let mut contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        let aborted = *self.aborted.lock().unwrap_or_else(PoisonError::into_inner);
        contexts
            .entry(context.to_vec())
            .or_insert_with(|| Arc::new(Channel::new(self.size, aborted)))
            .clone()
    }

    fn abort(&self, code: i32) {
        {
            let mut aborted = self.aborted.lock().unwrap_or_else(PoisonError::into_inner);
            if aborted.is_none() {
                *aborted = Some(code);
            }
        }
        let contexts = self.contexts.lock().unwrap_or_else(PoisonError::into_inner);
        for channel in contexts.values() {
            channel.abort(code);
        }
    }
}

/// An in-process process group of a fixed size.
///
/// ```rust,ignore
/// let group = LocalGroup::new(4)?;
/// let handles: Vec<_> = group
///     .endpoints()
///     .into_iter()
///     .map(|endpoint| std::thread::spawn(move || run_member(endpoint)))
///     .collect();
/// ```
#[derive(Clone, Debug)]
pub struct LocalGroup {
    fabric: Arc<Fabric>,
}

impl LocalGroup {
    pub fn new(size: usize) -> CollectiveResult<Self> {
        if size == 0 {
            return Err(CollectiveError::EmptyGroup);
        }
        Ok(Self {
            fabric: Arc::new(Fabric {
                size,
                aborted: Mutex::new(None),
                contexts: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn size(&self) -> usize {
        self.fabric.size
    }

    /// Endpoint of `rank` on the world context
    pub fn endpoint(&self, rank: usize) -> CollectiveResult<LocalEndpoint> {
        if rank >= self.fabric.size {
            return Err(CollectiveError::RankOutOfRange {
                rank,
                size: self.fabric.size,
            });
        }
        let context = Vec::new();
        Ok(LocalEndpoint {
            fabric: self.fabric.clone(),
            channel: self.fabric.channel(&context),
            context,
            rank,
            round: Cell::new(0),
            duplicates: Cell::new(0),
        })
    }

    /// One world endpoint per rank, in rank order
    pub fn endpoints(&self) -> Vec<LocalEndpoint> {
        (0..self.fabric.size).filter_map(|rank| self.endpoint(rank).ok()).collect()
    }

    /// Abort the group from outside any member, releasing every blocked member
    pub fn abort(&self, code: i32) {
        warn!(code, "aborting process group");
        self.fabric.abort(code);
    }

    /// Abort code, once any member aborted the group
    pub fn aborted(&self) -> Option<i32> {
        *self.fabric.aborted.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A member's handle on one context of a [`LocalGroup`]
#[derive(Debug)]
pub struct LocalEndpoint {
    fabric: Arc<Fabric>,
    channel: Arc<Channel>,
    context: Vec<u64>,
    rank: usize,
    round: Cell<u64>,
    duplicates: Cell<u64>,
}

impl LocalEndpoint {
    fn next_round(&self) -> u64 {
        let round = self.round.get();
        self.round.set(round + 1);
        round
    }
}

impl Communicator for LocalEndpoint {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.fabric.size
    }

    fn broadcast(&self, payload: &mut Vec<u8>, root: usize) -> CollectiveResult<()> {
        if root >= self.fabric.size {
            return Err(CollectiveError::RankOutOfRange {
                rank: root,
                size: self.fabric.size,
            });
        }
        let round = self.next_round();
        let contribution = (self.rank == root).then(|| payload.clone());
        let received = self.channel.exchange(round, contribution)?;
        trace!(rank = self.rank, root, round, bytes = received.len(), "broadcast complete");
        if self.rank != root {
            *payload = received;
        }
        Ok(())
    }

    fn barrier(&self) -> CollectiveResult<()> {
        let round = self.next_round();
        self.channel.exchange(round, Some(Vec::new()))?;
        trace!(rank = self.rank, round, "barrier complete");
        Ok(())
    }

    fn duplicate(&self) -> CollectiveResult<Box<dyn Communicator>> {
        let sequence = self.duplicates.get();
        self.duplicates.set(sequence + 1);
        let mut context = self.context.clone();
        context.push(sequence);

        let channel = self.fabric.channel(&context);
        self.barrier()?;
        Ok(Box::new(LocalEndpoint {
            fabric: self.fabric.clone(),
            channel,
            context,
            rank: self.rank,
            round: Cell::new(0),
            duplicates: Cell::new(0),
        }))
    }

    fn abort(&self, code: i32) {
        warn!(rank = self.rank, code, "aborting process group");
        self.fabric.abort(code);
    }
}
