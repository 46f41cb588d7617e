// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Native buffered I/O provider
//!
//! [`NativeIo`] exposes the C library's stream catalog with its own return
//! conventions: `None` for a failed open, `EOF` (-1) for exhausted reads, and
//! zero/non-zero status codes. The collective layer forwards these values unchanged.

mod stdio;

pub use stdio::{LibcStdio, StdioFile};

use std::path::Path;

use libc::{c_int, c_long};

use crate::status::FileStatus;
use crate::types::{BufferMode, StreamPosition};

/// End-of-file / failure sentinel of the character reads
pub const EOF: c_int = -1;

/// `fseek` origins
pub const SEEK_SET: c_int = 0;
pub const SEEK_CUR: c_int = 1;
pub const SEEK_END: c_int = 2;

/// Buffered stream operations of the platform's C library
pub trait NativeIo {
    /// Open stream
    type Handle;

    fn fopen(&self, path: &Path, mode: &str) -> Option<Self::Handle>;
    fn fclose(&self, handle: Self::Handle) -> c_int;

    /// `buffered == false` switches the stream to unbuffered; `true` restores
    /// full buffering with a library-owned buffer.
    fn setbuf(&self, handle: &Self::Handle, buffered: bool);
    fn setvbuf(&self, handle: &Self::Handle, mode: BufferMode, size: usize) -> c_int;
    fn flockfile(&self, handle: &Self::Handle);
    fn funlockfile(&self, handle: &Self::Handle);

    fn ferror(&self, handle: &Self::Handle) -> c_int;
    fn feof(&self, handle: &Self::Handle) -> c_int;
    fn clearerr(&self, handle: &Self::Handle);

    fn fseek(&self, handle: &Self::Handle, offset: c_long, whence: c_int) -> c_int;
    fn rewind(&self, handle: &Self::Handle);
    fn ungetc(&self, c: c_int, handle: &Self::Handle) -> c_int;
    fn fflush(&self, handle: &Self::Handle) -> c_int;
    fn fgetpos(&self, handle: &Self::Handle, pos: &mut StreamPosition) -> c_int;
    fn fsetpos(&self, handle: &Self::Handle, pos: &StreamPosition) -> c_int;
    fn ftell(&self, handle: &Self::Handle) -> c_long;

    fn getc(&self, handle: &Self::Handle) -> c_int;
    fn getc_unlocked(&self, handle: &Self::Handle) -> c_int;
    fn fgetc(&self, handle: &Self::Handle) -> c_int;
    /// Read one line into `buf`, NUL terminated. `false` on end-of-file or error
    /// before any byte was read.
    fn fgets(&self, handle: &Self::Handle, buf: &mut [u8]) -> bool;
    /// Read up to `buf.len() / size` items; returns the number of whole items
    fn fread(&self, handle: &Self::Handle, size: usize, buf: &mut [u8]) -> usize;
    fn fwrite(&self, handle: &Self::Handle, size: usize, buf: &[u8]) -> usize;

    fn stat(&self, path: &Path, status: &mut FileStatus) -> c_int;
    fn fstat(&self, handle: &Self::Handle, status: &mut FileStatus) -> c_int;
}
