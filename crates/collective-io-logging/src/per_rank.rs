// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One log file per group member
//!
//! A member thread announces its rank with [`set_member_rank`]; every event it
//! emits afterwards goes to `<component>.rank-<n>.log` in the log directory.
//! Threads that never announce a rank write to `<component>.log`.

use std::cell::Cell;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

thread_local! {
    static MEMBER_RANK: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Tag the calling thread as the member with `rank`
pub fn set_member_rank(rank: Option<usize>) {
    MEMBER_RANK.with(|cell| cell.set(rank));
}

/// Rank announced by the calling thread, if any
pub fn member_rank() -> Option<usize> {
    MEMBER_RANK.with(Cell::get)
}

/// Log file of `rank` for `component` inside `dir`
pub fn rank_log_path(dir: &Path, component: &str, rank: usize) -> PathBuf {
    dir.join(format!("{component}.rank-{rank}.log"))
}

/// `MakeWriter` that picks the file from the calling thread's member rank
pub struct PerRankWriter {
    dir: PathBuf,
    component: String,
    files: Mutex<HashMap<Option<usize>, Arc<File>>>,
}

impl PerRankWriter {
    pub fn new(dir: impl Into<PathBuf>, component: &str) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            component: component.to_string(),
            files: Mutex::new(HashMap::new()),
        })
    }

    fn path_for(&self, rank: Option<usize>) -> PathBuf {
        match rank {
            Some(rank) => rank_log_path(&self.dir, &self.component, rank),
            None => self.dir.join(format!("{}.log", self.component)),
        }
    }

    fn file_for(&self, rank: Option<usize>) -> io::Result<Arc<File>> {
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = files.get(&rank) {
            return Ok(Arc::clone(file));
        }
        let file = Arc::new(fs::OpenOptions::new().create(true).append(true).open(self.path_for(rank))?);
        files.insert(rank, Arc::clone(&file));
        Ok(file)
    }
}

/// Destination of a single event
pub enum RankWriter {
    File(Arc<File>),
    /// The member's file could not be opened
    Stderr(io::Stderr),
}

impl Write for RankWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            RankWriter::File(file) => (&**file).write(buf),
            RankWriter::Stderr(stderr) => stderr.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            RankWriter::File(file) => (&**file).flush(),
            RankWriter::Stderr(stderr) => stderr.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for PerRankWriter {
    type Writer = RankWriter;

    fn make_writer(&'a self) -> Self::Writer {
        match self.file_for(member_rank()) {
            Ok(file) => RankWriter::File(file),
            Err(_) => RankWriter::Stderr(io::stderr()),
        }
    }
}
