// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Status, positioning, buffering and locking interceptors

use libc::{c_int, c_long};

use super::CollectiveIo;
use crate::error::CollectiveResult;
use crate::native::NativeIo;
use crate::stream::Stream;
use crate::types::{BufferMode, Op, StreamPosition};

impl<N: NativeIo> CollectiveIo<N> {
    pub fn setbuf(&self, stream: &Stream<N::Handle>, buffered: bool) -> CollectiveResult<()> {
        self.coordinator_only(stream, Op::Setbuf, |native, handle| native.setbuf(handle, buffered))
    }

    pub fn setvbuf(&self, stream: &Stream<N::Handle>, mode: BufferMode, size: usize) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Setvbuf, |native, handle| native.setvbuf(handle, mode, size))
    }

    pub fn flockfile(&self, stream: &Stream<N::Handle>) -> CollectiveResult<()> {
        self.coordinator_only(stream, Op::Flockfile, |native, handle| native.flockfile(handle))
    }

    pub fn funlockfile(&self, stream: &Stream<N::Handle>) -> CollectiveResult<()> {
        self.coordinator_only(stream, Op::Funlockfile, |native, handle| native.funlockfile(handle))
    }

    pub fn ferror(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Ferror, |native, handle| native.ferror(handle))
    }

    pub fn feof(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Feof, |native, handle| native.feof(handle))
    }

    pub fn clearerr(&self, stream: &Stream<N::Handle>) -> CollectiveResult<()> {
        self.coordinator_only(stream, Op::Clearerr, |native, handle| native.clearerr(handle))
    }

    pub fn fseek(&self, stream: &Stream<N::Handle>, offset: c_long, whence: c_int) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Fseek, |native, handle| native.fseek(handle, offset, whence))
    }

    pub fn rewind(&self, stream: &Stream<N::Handle>) -> CollectiveResult<()> {
        self.coordinator_only(stream, Op::Rewind, |native, handle| native.rewind(handle))
    }

    pub fn ungetc(&self, c: c_int, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Ungetc, |native, handle| native.ungetc(c, handle))
    }

    pub fn fflush(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Fflush, |native, handle| native.fflush(handle))
    }

    /// Store the current position in `pos`. On a distributed stream every member
    /// receives the coordinator's position record.
    pub fn fgetpos(&self, stream: &Stream<N::Handle>, pos: &mut StreamPosition) -> CollectiveResult<c_int> {
        let current = *pos;
        let (code, position) = self.shared(stream, Op::Fgetpos, |native, handle| {
            let mut position = current;
            let code = native.fgetpos(handle, &mut position);
            (code, position)
        })?;
        if code == 0 {
            *pos = position;
        }
        Ok(code)
    }

    /// Restore a position. Members pass the record they got from `fgetpos`; only
    /// the coordinator's copy reaches the native call.
    pub fn fsetpos(&self, stream: &Stream<N::Handle>, pos: &StreamPosition) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Fsetpos, |native, handle| native.fsetpos(handle, pos))
    }

    pub fn ftell(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_long> {
        self.shared(stream, Op::Ftell, |native, handle| native.ftell(handle))
    }
}
