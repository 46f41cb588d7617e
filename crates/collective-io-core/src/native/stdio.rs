// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! `NativeIo` over the C library's `FILE*` streams

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::ptr::NonNull;

use libc::{c_char, c_int, c_long, c_void, FILE};
use tracing::trace;

use super::NativeIo;
use crate::status::FileStatus;
use crate::types::{BufferMode, StreamPosition};

// Declared here so `fpos_t` stays opaque and the locking entry points are
// available on every libc target
extern "C" {
    fn getc(stream: *mut FILE) -> c_int;
    fn getc_unlocked(stream: *mut FILE) -> c_int;
    fn flockfile(stream: *mut FILE);
    fn funlockfile(stream: *mut FILE);
    fn ferror(stream: *mut FILE) -> c_int;
    fn feof(stream: *mut FILE) -> c_int;
    fn clearerr(stream: *mut FILE);
    fn fgetpos(stream: *mut FILE, pos: *mut c_void) -> c_int;
    fn fsetpos(stream: *mut FILE, pos: *const c_void) -> c_int;
}

/// Open C stream. Only [`LibcStdio::fclose`] releases it.
#[derive(Debug)]
pub struct StdioFile(NonNull<FILE>);

// A FILE carries its own lock
unsafe impl Send for StdioFile {}

impl StdioFile {
    fn as_ptr(&self) -> *mut FILE {
        self.0.as_ptr()
    }
}

/// The process's C library
#[derive(Clone, Copy, Debug, Default)]
pub struct LibcStdio;

impl LibcStdio {
    pub fn new() -> Self {
        Self
    }
}

fn c_path(path: &Path) -> Option<CString> {
    CString::new(path.as_os_str().as_bytes()).ok()
}

fn zeroed_stat() -> libc::stat {
    // SAFETY: `struct stat` is plain old data, all-zero is a valid value
    unsafe { std::mem::zeroed() }
}

/// `fgets` takes an `int` length; longer buffers are used up to `c_int::MAX`
fn fgets_limit(len: usize) -> c_int {
    c_int::try_from(len).unwrap_or(c_int::MAX)
}

impl NativeIo for LibcStdio {
    type Handle = StdioFile;

    fn fopen(&self, path: &Path, mode: &str) -> Option<StdioFile> {
        let path_c = c_path(path)?;
        let mode_c = CString::new(mode).ok()?;
        // SAFETY: both arguments are valid NUL-terminated strings
        let raw = unsafe { libc::fopen(path_c.as_ptr(), mode_c.as_ptr()) };
        trace!(path = %path.display(), mode, ok = !raw.is_null(), "fopen");
        NonNull::new(raw).map(StdioFile)
    }

    fn fclose(&self, handle: StdioFile) -> c_int {
        // SAFETY: the handle came from fopen and is consumed here
        unsafe { libc::fclose(handle.as_ptr()) }
    }

    fn setbuf(&self, handle: &StdioFile, buffered: bool) {
        // SAFETY: a null buffer asks the library to manage buffering itself
        unsafe {
            if buffered {
                libc::setvbuf(handle.as_ptr(), std::ptr::null_mut(), BufferMode::Full.raw(), libc::BUFSIZ as usize);
            } else {
                libc::setbuf(handle.as_ptr(), std::ptr::null_mut());
            }
        }
    }

    fn setvbuf(&self, handle: &StdioFile, mode: BufferMode, size: usize) -> c_int {
        // SAFETY: live stream, library-owned buffer
        unsafe { libc::setvbuf(handle.as_ptr(), std::ptr::null_mut(), mode.raw(), size) }
    }

    fn flockfile(&self, handle: &StdioFile) {
        // SAFETY: live stream
        unsafe { flockfile(handle.as_ptr()) }
    }

    fn funlockfile(&self, handle: &StdioFile) {
        // SAFETY: live stream
        unsafe { funlockfile(handle.as_ptr()) }
    }

    fn ferror(&self, handle: &StdioFile) -> c_int {
        // SAFETY: live stream
        unsafe { ferror(handle.as_ptr()) }
    }

    fn feof(&self, handle: &StdioFile) -> c_int {
        // SAFETY: live stream
        unsafe { feof(handle.as_ptr()) }
    }

    fn clearerr(&self, handle: &StdioFile) {
        // SAFETY: live stream
        unsafe { clearerr(handle.as_ptr()) }
    }

    fn fseek(&self, handle: &StdioFile, offset: c_long, whence: c_int) -> c_int {
        // SAFETY: live stream
        unsafe { libc::fseek(handle.as_ptr(), offset, whence) }
    }

    fn rewind(&self, handle: &StdioFile) {
        // SAFETY: live stream
        unsafe { libc::rewind(handle.as_ptr()) }
    }

    fn ungetc(&self, c: c_int, handle: &StdioFile) -> c_int {
        // SAFETY: live stream
        unsafe { libc::ungetc(c, handle.as_ptr()) }
    }

    fn fflush(&self, handle: &StdioFile) -> c_int {
        // SAFETY: live stream
        unsafe { libc::fflush(handle.as_ptr()) }
    }

    fn fgetpos(&self, handle: &StdioFile, pos: &mut StreamPosition) -> c_int {
        // SAFETY: StreamPosition is aligned storage at least as large as fpos_t
        unsafe { fgetpos(handle.as_ptr(), pos.as_mut_ptr().cast()) }
    }

    fn fsetpos(&self, handle: &StdioFile, pos: &StreamPosition) -> c_int {
        // SAFETY: as for fgetpos
        unsafe { fsetpos(handle.as_ptr(), pos.as_ptr().cast()) }
    }

    fn ftell(&self, handle: &StdioFile) -> c_long {
        // SAFETY: live stream
        unsafe { libc::ftell(handle.as_ptr()) }
    }

    fn getc(&self, handle: &StdioFile) -> c_int {
        // SAFETY: live stream
        unsafe { getc(handle.as_ptr()) }
    }

    fn getc_unlocked(&self, handle: &StdioFile) -> c_int {
        // SAFETY: live stream; callers hold the lock or run single-threaded
        unsafe { getc_unlocked(handle.as_ptr()) }
    }

    fn fgetc(&self, handle: &StdioFile) -> c_int {
        // SAFETY: live stream
        unsafe { libc::fgetc(handle.as_ptr()) }
    }

    fn fgets(&self, handle: &StdioFile, buf: &mut [u8]) -> bool {
        let len = fgets_limit(buf.len());
        if len < 1 {
            return false;
        }
        // SAFETY: fgets writes at most `len <= buf.len()` bytes including the terminator
        let line = unsafe { libc::fgets(buf.as_mut_ptr().cast::<c_char>(), len, handle.as_ptr()) };
        !line.is_null()
    }

    fn fread(&self, handle: &StdioFile, size: usize, buf: &mut [u8]) -> usize {
        if size == 0 {
            return 0;
        }
        // SAFETY: at most `buf.len()` bytes are written
        unsafe { libc::fread(buf.as_mut_ptr().cast::<c_void>(), size, buf.len() / size, handle.as_ptr()) }
    }

    fn fwrite(&self, handle: &StdioFile, size: usize, buf: &[u8]) -> usize {
        if size == 0 {
            return 0;
        }
        // SAFETY: at most `buf.len()` bytes are read
        unsafe { libc::fwrite(buf.as_ptr().cast::<c_void>(), size, buf.len() / size, handle.as_ptr()) }
    }

    fn stat(&self, path: &Path, status: &mut FileStatus) -> c_int {
        let Some(path_c) = c_path(path) else {
            return -1;
        };
        let mut st = zeroed_stat();
        // SAFETY: valid path string and out-pointer
        let rc = unsafe { libc::stat(path_c.as_ptr(), &mut st) };
        if rc == 0 {
            *status = FileStatus::from(&st);
        }
        rc
    }

    fn fstat(&self, handle: &StdioFile, status: &mut FileStatus) -> c_int {
        let mut st = zeroed_stat();
        // SAFETY: live stream and valid out-pointer
        let rc = unsafe { libc::fstat(libc::fileno(handle.as_ptr()), &mut st) };
        if rc == 0 {
            *status = FileStatus::from(&st);
        }
        rc
    }
}
