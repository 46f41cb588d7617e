// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Collective read-only file I/O for a group of cooperating processes
//!
//! One member of the group, the coordinator, performs the real read of a shared
//! input file and every other member receives the identical result through a
//! broadcast instead of touching storage. Writes and any stream not opened for
//! pure reading stay local to each member.
//!
//! The entry point is [`CollectiveIo`], which wraps a [`NativeIo`] provider and
//! exposes the usual buffered stream catalog (`fopen`, `fgets`, `fread`, `fseek`,
//! `fstat`, ...) with native return conventions.
//!
//! # Caller obligation: lockstep
//!
//! Every call on a distributed stream, and every pure-read `fopen` or `stat` while
//! interception is active, is a blocking collective operation. All members must
//! issue the same sequence of such calls, on the same streams, in the same order.
//! A member that skips or reorders one leaves the rest of the group waiting
//! forever; there is no timeout. Setting `verify-lockstep` in [`IoConfig`] turns
//! such a divergence into an aborted group and a [`CollectiveError::Divergence`].
//!
//! Members must also share the binary layout of the C library's `fpos_t`: the
//! position record of [`CollectiveIo::fgetpos`] is passed along verbatim.
//! File metadata is not affected, it travels field by field as [`FileStatus`].

pub mod comm;
pub mod config;
pub mod context;
pub mod distribute;
pub mod error;
pub mod io;
pub mod native;
pub mod registry;
pub mod status;
pub mod stream;
pub mod types;


#[cfg(test)]
mod test_scenarios;


pub use comm::{Communicator, LocalEndpoint, LocalGroup, SingleProcess};
pub use config::IoConfig;
pub use context::GroupContext;
pub use distribute::Distributor;
pub use error::{CollectiveError, CollectiveResult};
pub use io::CollectiveIo;
pub use native::{LibcStdio, NativeIo, StdioFile, EOF};
pub use registry::{Classification, HandleRegistry, SlotId};
pub use status::FileStatus;
pub use stream::Stream;
pub use types::{BufferMode, Op, OpenMode, StreamPosition};
