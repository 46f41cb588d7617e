// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Metadata queries

use std::path::Path;

use libc::c_int;
use tracing::trace;

use super::CollectiveIo;
use crate::error::CollectiveResult;
use crate::native::NativeIo;
use crate::status::FileStatus;
use crate::stream::Stream;
use crate::types::Op;

impl<N: NativeIo> CollectiveIo<N> {
    /// Status of `path`. While the context is active only the coordinator asks
    /// the filesystem and every member gets its return code and record.
    pub fn stat(&self, path: &Path, status: &mut FileStatus) -> CollectiveResult<c_int> {
        if !self.context.is_active() {
            return Ok(self.native.stat(path, status));
        }
        let distributor = self.context.distributor()?;
        distributor.checkpoint(Op::Stat)?;
        let (code, record) = if distributor.is_coordinator() {
            let mut record = *status;
            let code = self.native.stat(path, &mut record);
            distributor.publish(&(code, record))?;
            (code, record)
        } else {
            distributor.receive::<(c_int, FileStatus)>()?
        };
        trace!(rank = distributor.rank(), path = %path.display(), code, "distributed stat");
        if code == 0 {
            *status = record;
        }
        Ok(code)
    }

    /// Status of an open stream
    pub fn fstat(&self, stream: &Stream<N::Handle>, status: &mut FileStatus) -> CollectiveResult<c_int> {
        let current = *status;
        let (code, record) = self.shared(stream, Op::Fstat, |native, handle| {
            let mut record = current;
            let code = native.fstat(handle, &mut record);
            (code, record)
        })?;
        if code == 0 {
            *status = record;
        }
        Ok(code)
    }
}
