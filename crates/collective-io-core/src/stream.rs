// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::registry::SlotId;

/// Stream handed out by [`CollectiveIo::fopen`](crate::CollectiveIo::fopen).
///
/// A distributed stream only holds a native handle on the coordinator. Other
/// members hold a placeholder that can be classified but never reaches native I/O.
#[derive(Debug)]
pub struct Stream<H> {
    kind: StreamKind<H>,
}

#[derive(Debug)]
pub(crate) enum StreamKind<H> {
    Local(H),
    Distributed { slot: SlotId, native: Option<H> },
}

impl<H> Stream<H> {
    pub(crate) fn local(handle: H) -> Self {
        Self {
            kind: StreamKind::Local(handle),
        }
    }

    pub(crate) fn distributed(slot: SlotId, native: Option<H>) -> Self {
        Self {
            kind: StreamKind::Distributed { slot, native },
        }
    }

    pub(crate) fn kind(&self) -> &StreamKind<H> {
        &self.kind
    }

    pub(crate) fn into_kind(self) -> StreamKind<H> {
        self.kind
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self.kind, StreamKind::Distributed { .. })
    }

    /// Registry slot of a distributed stream
    pub fn slot(&self) -> Option<SlotId> {
        match self.kind {
            StreamKind::Distributed { slot, .. } => Some(slot),
            StreamKind::Local(_) => None,
        }
    }

    /// True when this member holds a real native handle
    pub fn has_native(&self) -> bool {
        match &self.kind {
            StreamKind::Local(_) => true,
            StreamKind::Distributed { native, .. } => native.is_some(),
        }
    }
}
