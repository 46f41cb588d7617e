// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Whole-group behaviour over the in-memory provider, one thread per member

use std::path::Path;

use crate::comm::{Communicator, LocalEndpoint, LocalGroup, SingleProcess};
use crate::config::IoConfig;
use crate::error::CollectiveError;
use crate::native::{NativeIo, EOF, SEEK_END, SEEK_SET};
use crate::status::FileStatus;
use crate::testing::memory_stdio::{MemoryFs, MemoryStdio};
use crate::testing::run_group;
use crate::types::{BufferMode, StreamPosition};
use crate::CollectiveIo;

const INPUT: &str = "/data/input.txt";

fn fixture(content: &str) -> MemoryFs {
    let fs = MemoryFs::new();
    fs.insert(INPUT, content);
    fs
}

fn joined(world: &LocalEndpoint, fs: &MemoryFs, config: IoConfig) -> CollectiveIo<MemoryStdio> {
    let mut io = CollectiveIo::new(MemoryStdio::new(fs.clone()), config);
    io.join(world).unwrap();
    io
}

#[test]
fn scenario_a_four_members_see_the_same_lines() {
    let group = LocalGroup::new(4).unwrap();
    let fs = fixture("first line\nsecond line\n");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        assert!(stream.is_distributed());

        let mut lines = Vec::new();
        let mut buf = [0u8; 64];
        for _ in 0..3 {
            lines.push(io.fgets(&stream, &mut buf).unwrap().map(<[u8]>::to_vec));
        }
        assert_eq!(io.fclose(stream).unwrap(), 0);
        (world.rank(), lines, io.native().total_calls())
    });

    for (rank, lines, native_calls) in results {
        assert_eq!(
            lines,
            vec![
                Some(b"first line\n".to_vec()),
                Some(b"second line\n".to_vec()),
                None
            ],
            "rank {rank}"
        );
        if rank == 0 {
            assert_eq!(native_calls, 5);
        } else {
            assert_eq!(native_calls, 0, "rank {rank} touched storage");
        }
    }
}

#[test]
fn scenario_b_thirty_third_open_aborts_the_group() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("x");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let mut streams = Vec::new();
        for _ in 0..32 {
            streams.push(io.fopen(Path::new(INPUT), "r").unwrap().unwrap());
        }
        let overflow = io.fopen(Path::new(INPUT), "r");
        (world.rank(), overflow, io.native().open_streams(), io.registry().len())
    });

    for (rank, overflow, open_streams, live) in results {
        assert!(
            matches!(overflow, Err(CollectiveError::RegistryOverflow { capacity: 32 })),
            "rank {rank}: {overflow:?}"
        );
        assert_eq!(live, 32);
        assert_eq!(open_streams, if rank == 0 { 32 } else { 0 });
    }
    assert_eq!(group.aborted(), Some(-1));
}

#[test]
fn scenario_c_per_rank_writes_stay_independent() {
    let group = LocalGroup::new(4).unwrap();
    let fs = MemoryFs::new();
    let shared = fs.clone();
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let path = format!("/out/rank-{}.txt", world.rank());
        let stream = io.fopen(Path::new(&path), "w").unwrap().unwrap();
        assert!(!stream.is_distributed());

        let content = format!("written by rank {}\n", world.rank());
        let written = io.fwrite(&stream, 1, content.as_bytes()).unwrap();
        assert_eq!(io.fclose(stream).unwrap(), 0);
        (written, content.len(), io.native().total_calls(), io.registry().is_empty())
    });

    for (written, expected, native_calls, registry_empty) in results {
        assert_eq!(written, expected);
        assert_eq!(native_calls, 3);
        assert!(registry_empty);
    }
    for rank in 0..4 {
        let content = shared.read(Path::new(&format!("/out/rank-{rank}.txt"))).unwrap();
        assert_eq!(content, format!("written by rank {rank}\n").into_bytes());
    }
}

#[test]
fn scenario_d_fstat_matches_the_coordinator() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("0123456789");
    let direct = {
        let probe = MemoryStdio::new(fs.clone());
        let mut status = FileStatus::default();
        assert_eq!(probe.stat(Path::new(INPUT), &mut status), 0);
        status
    };
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let mut by_handle = FileStatus::default();
        let rc_handle = io.fstat(&stream, &mut by_handle).unwrap();
        let mut by_path = FileStatus::default();
        let rc_path = io.stat(Path::new(INPUT), &mut by_path).unwrap();
        let mut missing = FileStatus::default();
        let rc_missing = io.stat(Path::new("/data/absent"), &mut missing).unwrap();
        io.fclose(stream).unwrap();
        (rc_handle, by_handle, rc_path, by_path, rc_missing, missing)
    });

    for (rc_handle, by_handle, rc_path, by_path, rc_missing, missing) in results {
        assert_eq!(rc_handle, 0);
        assert_eq!(by_handle, direct);
        assert_eq!(rc_path, 0);
        assert_eq!(by_path, direct);
        assert_eq!(rc_missing, -1);
        assert_eq!(missing, FileStatus::default());
    }
}

#[test]
fn missing_file_fails_identically_everywhere() {
    let group = LocalGroup::new(4).unwrap();
    let fs = MemoryFs::new();
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new("/nope"), "r").unwrap();
        (world.rank(), stream.is_none(), io.registry().len(), io.native().total_calls())
    });
    for (rank, failed, live, native_calls) in results {
        assert!(failed);
        assert_eq!(live, 0);
        assert_eq!(native_calls, u64::from(rank == 0));
    }
}

#[test]
fn disabled_interception_reads_independently() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("a\nb\n");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        io.disable();
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let distributed = stream.is_distributed();
        let mut buf = [0u8; 8];
        let first = io.fgets(&stream, &mut buf).unwrap().map(<[u8]>::to_vec);
        let second = io.fgets(&stream, &mut buf).unwrap().map(<[u8]>::to_vec);
        io.fclose(stream).unwrap();
        (distributed, first, second, io.native().call_count("fgets"))
    });
    for (distributed, first, second, fgets_calls) in results {
        assert!(!distributed);
        assert_eq!(first.as_deref(), Some(&b"a\n"[..]));
        assert_eq!(second.as_deref(), Some(&b"b\n"[..]));
        assert_eq!(fgets_calls, 2);
    }
}

#[test]
fn reopen_reads_identical_content() {
    for intercept in [true, false] {
        let group = LocalGroup::new(3).unwrap();
        let fs = fixture("abcdefghij");
        let results = run_group(&group, move |world| {
            let mut io = joined(&world, &fs, IoConfig::default());
            if !intercept {
                io.disable();
            }
            let mut rounds = Vec::new();
            for _ in 0..2 {
                let stream = io.fopen(Path::new(INPUT), "rb").unwrap().unwrap();
                let mut buf = [0u8; 4];
                let count = io.fread(&stream, 1, &mut buf).unwrap();
                io.fclose(stream).unwrap();
                rounds.push((count, buf));
            }
            rounds
        });
        for rounds in results {
            assert_eq!(rounds[0], (4, *b"abcd"), "intercept={intercept}");
            assert_eq!(rounds[0], rounds[1]);
        }
    }
}

#[test]
fn out_of_order_close_keeps_members_in_step() {
    let group = LocalGroup::new(2).unwrap();
    let fs = fixture("data");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let first = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let second = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let second_slot = second.slot();

        io.fclose(first).unwrap();
        assert_eq!(io.fgetc(&second).unwrap(), i32::from(b'd'));
        let third = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let slots = (second_slot, third.slot());
        io.fclose(second).unwrap();
        io.fclose(third).unwrap();
        (slots, io.registry().len())
    });
    assert_eq!(results[0].0, results[1].0);
    for (_, live) in results {
        assert_eq!(live, 0);
    }
}

#[test]
fn positioning_follows_the_coordinator() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("0123456789");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();

        let mut seen = Vec::new();
        seen.push(i64::from(io.fseek(&stream, 3, SEEK_SET).unwrap()));
        seen.push(io.ftell(&stream).unwrap());
        let mut pos = StreamPosition::default();
        seen.push(i64::from(io.fgetpos(&stream, &mut pos).unwrap()));
        seen.push(i64::from(io.getc(&stream).unwrap()));
        seen.push(i64::from(io.ungetc(i32::from(b'z'), &stream).unwrap()));
        seen.push(i64::from(io.getc_unlocked(&stream).unwrap()));
        seen.push(i64::from(io.fsetpos(&stream, &pos).unwrap()));
        seen.push(i64::from(io.fgetc(&stream).unwrap()));
        io.rewind(&stream).unwrap();
        seen.push(io.ftell(&stream).unwrap());
        seen.push(i64::from(io.fseek(&stream, 0, SEEK_END).unwrap()));
        seen.push(i64::from(io.fgetc(&stream).unwrap()));
        seen.push(i64::from(io.feof(&stream).unwrap()));
        io.clearerr(&stream).unwrap();
        seen.push(i64::from(io.feof(&stream).unwrap()));
        seen.push(i64::from(io.fflush(&stream).unwrap()));
        io.fclose(stream).unwrap();
        (world.rank(), seen, pos, io.native().total_calls())
    });

    let expected = vec![
        0,
        3,
        0,
        i64::from(b'3'),
        i64::from(b'z'),
        i64::from(b'z'),
        0,
        i64::from(b'3'),
        0,
        0,
        i64::from(EOF),
        1,
        0,
        0,
    ];
    let coordinator_pos = results[0].2;
    for (rank, seen, pos, native_calls) in results {
        assert_eq!(seen, expected, "rank {rank}");
        assert_eq!(pos, coordinator_pos);
        if rank != 0 {
            assert_eq!(native_calls, 0);
        }
    }
}

#[test]
fn partial_block_read_carries_only_produced_bytes() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("0123456789");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let mut buf = [b'#'; 16];
        let first = io.fread(&stream, 4, &mut buf).unwrap();
        let second = io.fread(&stream, 4, &mut buf[..4]).unwrap();
        let eof = io.feof(&stream).unwrap();
        io.fclose(stream).unwrap();
        (world.rank(), first, second, eof, buf)
    });
    for (rank, first, second, eof, buf) in results {
        assert_eq!(first, 2);
        assert_eq!(second, 0);
        assert_eq!(eof, 1);
        assert_eq!(&buf[..8], b"01234567");
        if rank != 0 {
            assert!(buf[8..].iter().all(|&b| b == b'#'), "rank {rank} got unproduced bytes");
        }
    }
}

#[test]
fn buffering_and_locking_run_on_the_coordinator_only() {
    let group = LocalGroup::new(2).unwrap();
    let fs = fixture("x");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let rc = io.setvbuf(&stream, BufferMode::Line, 512).unwrap();
        io.setbuf(&stream, false).unwrap();
        io.flockfile(&stream).unwrap();
        io.funlockfile(&stream).unwrap();
        let calls = ["setvbuf", "setbuf", "flockfile", "funlockfile"].map(|op| io.native().call_count(op));
        io.fclose(stream).unwrap();
        (world.rank(), rc, calls)
    });
    for (rank, rc, calls) in results {
        assert_eq!(rc, 0);
        let expected = u64::from(rank == 0);
        assert_eq!(calls, [expected; 4], "rank {rank}");
    }
}

#[test]
fn error_flag_and_close_code_come_from_the_coordinator() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("read only");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        if world.rank() == 0 {
            io.native().fail("fclose");
        }
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let written = io.fwrite(&stream, 1, b"nope").unwrap();
        let error = io.ferror(&stream).unwrap();
        io.clearerr(&stream).unwrap();
        let cleared = io.ferror(&stream).unwrap();
        let close = io.fclose(stream).unwrap();
        (written, error, cleared, close, io.registry().len())
    });
    for (written, error, cleared, close, live) in results {
        assert_eq!((written, error, cleared), (0, 1, 0));
        assert_eq!(close, EOF);
        assert_eq!(live, 0);
    }
}

#[test]
fn classification_is_fixed_at_open() {
    let group = LocalGroup::new(2).unwrap();
    let fs = fixture("xy");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let distributed = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        io.disable();
        let c = io.fgetc(&distributed).unwrap();
        let local = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let local_c = io.fgetc(&local).unwrap();
        io.fclose(local).unwrap();
        io.fclose(distributed).unwrap();
        (world.rank(), c, local_c, io.native().call_count("fgetc"))
    });
    for (rank, c, local_c, fgetc_calls) in results {
        assert_eq!(c, i32::from(b'x'));
        assert_eq!(local_c, i32::from(b'x'));
        assert_eq!(fgetc_calls, if rank == 0 { 2 } else { 1 });
    }
}

#[test]
fn member_buffer_too_small_for_the_line() {
    let group = LocalGroup::new(2).unwrap();
    let fs = fixture("a longer line\n");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let mut big = [0u8; 64];
        let mut small = [0u8; 4];
        let buf: &mut [u8] = if world.rank() == 0 { &mut big } else { &mut small };
        io.fgets(&stream, buf).map(|line| line.map(<[u8]>::to_vec))
    });
    assert_eq!(results[0].as_ref().unwrap().as_deref(), Some(&b"a longer line\n"[..]));
    assert!(matches!(
        results[1],
        Err(CollectiveError::PayloadTooLarge { needed: 15, available: 4 })
    ));
}

#[test]
fn lockstep_violation_is_reported_when_verifying() {
    let group = LocalGroup::new(3).unwrap();
    let fs = fixture("line\n");
    let config = IoConfig {
        verify_lockstep: true,
        ..Default::default()
    };
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, config.clone());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let mut buf = [0u8; 16];
        if world.rank() == 1 {
            io.fgetc(&stream).map(|_| ())
        } else {
            io.fgets(&stream, &mut buf).map(|_| ())
        }
    });
    assert!(matches!(results[0], Err(CollectiveError::Aborted { code: -1 })));
    assert!(matches!(
        &results[1],
        Err(CollectiveError::Divergence { expected, found }) if expected == "fgets" && found == "fgetc"
    ));
    assert!(matches!(results[2], Err(CollectiveError::Aborted { code: -1 })));
    assert_eq!(group.aborted(), Some(-1));
}

#[test]
fn leaving_makes_open_streams_stale() {
    let group = LocalGroup::new(2).unwrap();
    let fs = fixture("abc");
    let results = run_group(&group, move |world| {
        let mut io = joined(&world, &fs, IoConfig::default());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        io.leave();
        let read = io.fgetc(&stream);
        let close = io.fclose(stream);
        (read, close, io.native().open_streams(), io.context().is_initialized())
    });
    for (read, close, open_streams, initialized) in results {
        assert!(matches!(read, Err(CollectiveError::StaleHandle(_))));
        assert!(matches!(close, Err(CollectiveError::StaleHandle(_))));
        assert_eq!(open_streams, 0);
        assert!(!initialized);
    }
}

#[test]
fn first_open_joins_when_configured() {
    let group = LocalGroup::new(2).unwrap();
    let fs = fixture("q");
    let config = IoConfig {
        join_on_first_open: true,
        ..Default::default()
    };
    let results = run_group(&group, move |world| {
        let rank = world.rank();
        let mut io = CollectiveIo::with_world(MemoryStdio::new(fs.clone()), config.clone(), Box::new(world));
        assert!(!io.context().is_initialized());
        let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
        let c = io.fgetc(&stream).unwrap();
        io.fclose(stream).unwrap();
        (rank, io.context().is_active(), as_char(c), io.native().total_calls())
    });
    for (rank, active, c, native_calls) in results {
        assert!(active);
        assert_eq!(c, 'q');
        assert_eq!(native_calls, if rank == 0 { 3 } else { 0 });
    }
}

fn as_char(c: i32) -> char {
    char::from(u8::try_from(c).unwrap_or(b'?'))
}

#[test]
fn unjoined_io_is_purely_local() {
    let fs = fixture("solo\n");
    let mut io = CollectiveIo::new(MemoryStdio::new(fs), IoConfig::default());
    let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
    assert!(!stream.is_distributed());
    let mut buf = [0u8; 16];
    assert_eq!(io.fgets(&stream, &mut buf).unwrap(), Some(&b"solo\n"[..]));
    let mut status = FileStatus::default();
    assert_eq!(io.stat(Path::new(INPUT), &mut status).unwrap(), 0);
    assert_eq!(status.size, 5);
    assert_eq!(io.fclose(stream).unwrap(), 0);
}

#[test]
fn single_process_group_distributes_to_itself() {
    let fs = fixture("12345");
    let mut io = CollectiveIo::new(MemoryStdio::new(fs), IoConfig::default());
    io.join(&SingleProcess::new()).unwrap();
    let stream = io.fopen(Path::new(INPUT), "r").unwrap().unwrap();
    assert!(stream.is_distributed());
    assert!(stream.has_native());
    let mut buf = [0u8; 8];
    assert_eq!(io.fread(&stream, 1, &mut buf).unwrap(), 5);
    assert_eq!(&buf[..5], b"12345");
    assert_eq!(io.fclose(stream).unwrap(), 0);
    assert!(io.registry().is_empty());
}

#[test]
fn write_modes_are_never_distributed() {
    let fs = fixture("seed");
    let mut io = CollectiveIo::new(MemoryStdio::new(fs), IoConfig::default());
    io.join(&SingleProcess::new()).unwrap();
    for mode in ["r+", "w", "a", "w+"] {
        let stream = io.fopen(Path::new(INPUT), mode).unwrap().unwrap();
        assert!(!stream.is_distributed(), "{mode}");
        io.fclose(stream).unwrap();
    }
    assert!(io.registry().is_empty());
}
