// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core value types shared by the interceptors and the native providers

use serde::{Deserialize, Serialize};

/// Intercepted operation, used for tracing and lockstep verification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Fopen,
    Fclose,
    Setbuf,
    Setvbuf,
    Flockfile,
    Funlockfile,
    Ferror,
    Feof,
    Clearerr,
    Fseek,
    Rewind,
    Ungetc,
    Fflush,
    Fgetpos,
    Fsetpos,
    Ftell,
    Getc,
    GetcUnlocked,
    Fgetc,
    Fgets,
    Fread,
    Fwrite,
    Stat,
    Fstat,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Fopen => "fopen",
            Op::Fclose => "fclose",
            Op::Setbuf => "setbuf",
            Op::Setvbuf => "setvbuf",
            Op::Flockfile => "flockfile",
            Op::Funlockfile => "funlockfile",
            Op::Ferror => "ferror",
            Op::Feof => "feof",
            Op::Clearerr => "clearerr",
            Op::Fseek => "fseek",
            Op::Rewind => "rewind",
            Op::Ungetc => "ungetc",
            Op::Fflush => "fflush",
            Op::Fgetpos => "fgetpos",
            Op::Fsetpos => "fsetpos",
            Op::Ftell => "ftell",
            Op::Getc => "getc",
            Op::GetcUnlocked => "getc_unlocked",
            Op::Fgetc => "fgetc",
            Op::Fgets => "fgets",
            Op::Fread => "fread",
            Op::Fwrite => "fwrite",
            Op::Stat => "stat",
            Op::Fstat => "fstat",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `fopen` mode string
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenMode {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub update: bool,
}

impl OpenMode {
    /// Interpret a native mode string (`"r"`, `"rb"`, `"w+"`, `"a"`, ...)
    pub fn parse(mode: &str) -> Self {
        let mut parsed = OpenMode::default();
        match mode.as_bytes().first() {
            Some(b'r') => parsed.read = true,
            Some(b'w') => parsed.write = true,
            Some(b'a') => parsed.append = true,
            _ => {}
        }
        parsed.update = mode.contains('+');
        parsed
    }

    /// Read access without any write capability. Only these opens can be distributed.
    pub fn is_pure_read(&self) -> bool {
        self.read && !self.update
    }
}

/// Buffering discipline for `setvbuf`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BufferMode {
    Full,
    Line,
    Unbuffered,
}

impl BufferMode {
    /// The `_IOFBF` / `_IOLBF` / `_IONBF` value of the C library
    pub fn raw(self) -> libc::c_int {
        match self {
            BufferMode::Full => libc::_IOFBF,
            BufferMode::Line => libc::_IOLBF,
            BufferMode::Unbuffered => libc::_IONBF,
        }
    }

    pub fn from_raw(raw: libc::c_int) -> Option<Self> {
        match raw {
            libc::_IOFBF => Some(BufferMode::Full),
            libc::_IOLBF => Some(BufferMode::Line),
            libc::_IONBF => Some(BufferMode::Unbuffered),
            _ => None,
        }
    }
}

/// Size of the opaque position storage, large enough for `fpos_t` on every
/// supported platform
pub const POSITION_BYTES: usize = 32;

/// Opaque stream position as filled by `fgetpos`.
///
/// The bytes are native layout; they only mean something to a member with the
/// same C library as the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(C, align(8))]
pub struct StreamPosition {
    raw: [u8; POSITION_BYTES],
}

impl Default for StreamPosition {
    fn default() -> Self {
        Self {
            raw: [0; POSITION_BYTES],
        }
    }
}

impl StreamPosition {
    pub fn from_bytes(raw: [u8; POSITION_BYTES]) -> Self {
        Self { raw }
    }

    pub fn as_bytes(&self) -> &[u8; POSITION_BYTES] {
        &self.raw
    }

    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.raw.as_mut_ptr()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.raw.as_ptr()
    }
}
