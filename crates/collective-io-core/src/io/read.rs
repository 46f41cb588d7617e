// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Character, line and block transfers
//!
//! Bulk reads distribute the outcome first and then only the bytes the
//! coordinator actually produced.

use libc::c_int;

use super::{CollectiveIo, Route};
use crate::distribute::Distributor;
use crate::error::{CollectiveError, CollectiveResult};
use crate::native::NativeIo;
use crate::stream::Stream;
use crate::types::Op;

/// Length of the NUL-terminated string at the start of `buf`
fn terminated_len(buf: &[u8]) -> usize {
    buf.iter().position(|&b| b == 0).unwrap_or(buf.len())
}

fn adopt(distributor: &Distributor, buf: &mut [u8], reserve: usize) -> CollectiveResult<usize> {
    let bytes = distributor.receive_bytes()?;
    if bytes.len() + reserve > buf.len() {
        return Err(CollectiveError::PayloadTooLarge {
            needed: bytes.len() + reserve,
            available: buf.len(),
        });
    }
    buf[..bytes.len()].copy_from_slice(&bytes);
    Ok(bytes.len())
}

impl<N: NativeIo> CollectiveIo<N> {
    pub fn getc(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Getc, |native, handle| native.getc(handle))
    }

    pub fn getc_unlocked(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::GetcUnlocked, |native, handle| native.getc_unlocked(handle))
    }

    pub fn fgetc(&self, stream: &Stream<N::Handle>) -> CollectiveResult<c_int> {
        self.shared(stream, Op::Fgetc, |native, handle| native.fgetc(handle))
    }

    /// Read one line into `buf` (NUL terminated, as natively) and return the line
    /// up to, not including, the NUL. `Ok(None)` is the native failure/end-of-file result.
    pub fn fgets<'b>(&self, stream: &Stream<N::Handle>, buf: &'b mut [u8]) -> CollectiveResult<Option<&'b [u8]>> {
        match self.route(stream, Op::Fgets)? {
            Route::Local(handle) => {
                if !self.native.fgets(handle, buf) {
                    return Ok(None);
                }
                let len = terminated_len(buf);
                Ok(Some(&buf[..len]))
            }
            Route::Coordinator(handle, distributor) => {
                let ok = self.native.fgets(handle, buf);
                distributor.publish(&ok)?;
                if !ok {
                    return Ok(None);
                }
                let len = terminated_len(buf);
                distributor.publish_bytes(&buf[..len])?;
                Ok(Some(&buf[..len]))
            }
            Route::Member(distributor) => {
                let ok: bool = distributor.receive()?;
                if !ok {
                    return Ok(None);
                }
                let len = adopt(distributor, buf, 1)?;
                buf[len] = 0;
                Ok(Some(&buf[..len]))
            }
        }
    }

    /// Read up to `buf.len() / size` items of `size` bytes; returns the item count.
    pub fn fread(&self, stream: &Stream<N::Handle>, size: usize, buf: &mut [u8]) -> CollectiveResult<usize> {
        match self.route(stream, Op::Fread)? {
            Route::Local(handle) => Ok(self.native.fread(handle, size, buf)),
            Route::Coordinator(handle, distributor) => {
                let count = self.native.fread(handle, size, buf);
                distributor.publish(&count)?;
                if count > 0 {
                    distributor.publish_bytes(&buf[..count * size])?;
                }
                Ok(count)
            }
            Route::Member(distributor) => {
                let count: usize = distributor.receive()?;
                if count > 0 {
                    adopt(distributor, buf, 0)?;
                }
                Ok(count)
            }
        }
    }

    /// Write `buf.len() / size` items. On a distributed stream only the
    /// coordinator writes and the item count is shared.
    pub fn fwrite(&self, stream: &Stream<N::Handle>, size: usize, buf: &[u8]) -> CollectiveResult<usize> {
        self.shared(stream, Op::Fwrite, |native, handle| native.fwrite(handle, size, buf))
    }
}
