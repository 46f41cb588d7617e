// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use std::path::PathBuf;

use anyhow::{ensure, Result};
use clap::{Args, ValueEnum};
use collective_io_core::{
    CollectiveIo, CollectiveResult, Communicator, FileStatus, IoConfig, LibcStdio, LocalEndpoint, EOF,
};

use crate::group::{run_members, settle};

/// How `read` consumes the file
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReadMode {
    /// `fread` in chunks
    #[default]
    Block,
    /// `fgets` line by line
    Line,
    /// `fgetc` one byte at a time
    Char,
}

#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Number of group members
    #[arg(long, default_value_t = 4)]
    pub ranks: usize,
    #[arg(long, value_enum, default_value_t = ReadMode::Block)]
    pub mode: ReadMode,
    /// Buffer size in bytes for block and line reads
    #[arg(long, default_value_t = 4096)]
    pub chunk: usize,
    /// Every member reads the file itself
    #[arg(long)]
    pub no_intercept: bool,
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct StatArgs {
    /// Number of group members
    #[arg(long, default_value_t = 4)]
    pub ranks: usize,
    pub path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    /// Number of group members
    #[arg(long, default_value_t = 4)]
    pub ranks: usize,
    /// Directory receiving one file per member
    #[arg(long)]
    pub dir: PathBuf,
    #[arg(long, default_value = "out")]
    pub prefix: String,
}

/// What one member saw while reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRead {
    pub rank: usize,
    pub opened: bool,
    pub distributed: bool,
    pub bytes: Vec<u8>,
    pub close_code: i32,
}

fn joined(world: &LocalEndpoint, config: &IoConfig) -> CollectiveResult<CollectiveIo<LibcStdio>> {
    let mut io = CollectiveIo::new(LibcStdio::new(), config.clone());
    io.join(world)?;
    Ok(io)
}

pub fn collect_reads(args: &ReadArgs, config: &IoConfig) -> Result<Vec<MemberRead>> {
    ensure!(args.chunk >= 2, "--chunk must be at least 2 bytes");

    let results = run_members(args.ranks, config.abort_code, |world| {
        let mut io = joined(&world, config)?;
        if args.no_intercept {
            io.disable();
        }
        let mut report = MemberRead {
            rank: world.rank(),
            opened: false,
            distributed: false,
            bytes: Vec::new(),
            close_code: 0,
        };
        let Some(stream) = io.fopen(&args.path, "rb")? else {
            return Ok(report);
        };
        report.opened = true;
        report.distributed = stream.is_distributed();

        match args.mode {
            ReadMode::Block => {
                let mut chunk = vec![0u8; args.chunk];
                loop {
                    let count = io.fread(&stream, 1, &mut chunk)?;
                    if count == 0 {
                        break;
                    }
                    report.bytes.extend_from_slice(&chunk[..count]);
                }
            }
            ReadMode::Line => {
                let mut line = vec![0u8; args.chunk];
                while let Some(content) = io.fgets(&stream, &mut line)? {
                    report.bytes.extend_from_slice(content);
                }
            }
            ReadMode::Char => loop {
                let c = io.fgetc(&stream)?;
                if c == EOF {
                    break;
                }
                report.bytes.push(c as u8);
            },
        }

        report.close_code = io.fclose(stream)?;
        io.leave();
        Ok(report)
    })?;

    Ok(settle(results)?)
}

pub fn read(args: &ReadArgs, config: &IoConfig) -> Result<()> {
    let reports = collect_reads(args, config)?;
    let reference = reports.iter().find(|r| r.rank == config.coordinator).map(|r| r.bytes.clone());

    for report in &reports {
        let matches = reference.as_ref() == Some(&report.bytes);
        println!(
            "RANK={}\tOPENED={}\tDISTRIBUTED={}\tBYTES={}\tMATCHES={}\tCLOSE={}",
            report.rank,
            report.opened,
            report.distributed,
            report.bytes.len(),
            matches,
            report.close_code
        );
    }
    let all_match = reports.iter().all(|r| reference.as_ref() == Some(&r.bytes));
    println!("IDENTICAL={all_match}");
    ensure!(reports.iter().all(|r| r.opened), "{:?} could not be opened", args.path);
    Ok(())
}

pub fn collect_stats(args: &StatArgs, config: &IoConfig) -> Result<Vec<(i32, FileStatus)>> {
    let results = run_members(args.ranks, config.abort_code, |world| {
        let mut io = joined(&world, config)?;
        let mut status = FileStatus::default();
        let code = io.stat(&args.path, &mut status)?;
        io.leave();
        Ok((code, status))
    })?;

    Ok(settle(results)?)
}

pub fn stat(args: &StatArgs, config: &IoConfig) -> Result<()> {
    let records = collect_stats(args, config)?;
    for (rank, (code, status)) in records.iter().enumerate() {
        println!(
            "RANK={rank}\tRC={code}\tSIZE={}\tMODE={:o}\tINO={}\tMTIME={}",
            status.size, status.mode, status.ino, status.mtime
        );
    }
    ensure!(records.iter().all(|(code, _)| *code == 0), "stat of {:?} failed", args.path);
    Ok(())
}

pub fn write_outputs(args: &WriteArgs, config: &IoConfig) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(&args.dir)?;

    let results = run_members(args.ranks, config.abort_code, |world| {
        let mut io = joined(&world, config)?;
        let path = args.dir.join(format!("{}.rank-{}.txt", args.prefix, world.rank()));
        let Some(stream) = io.fopen(&path, "w")? else {
            tracing::error!(?path, "cannot create output file");
            return Ok(None);
        };
        let line = format!("rank {} of {}\n", world.rank(), world.size());
        let written = io.fwrite(&stream, 1, line.as_bytes())?;
        let code = io.fclose(stream)?;
        io.leave();
        Ok((written == line.len() && code == 0).then_some(path))
    })?;

    let paths = settle(results)?;
    ensure!(paths.iter().all(Option::is_some), "some members could not write their output");
    Ok(paths.into_iter().flatten().collect())
}

pub fn write(args: &WriteArgs, config: &IoConfig) -> Result<()> {
    for (rank, path) in write_outputs(args, config)?.iter().enumerate() {
        println!("RANK={rank}\tPATH={}", path.display());
    }
    Ok(())
}
