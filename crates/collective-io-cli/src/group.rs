// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Runs one thread per group member

use std::panic::{self, AssertUnwindSafe};

use anyhow::{anyhow, Result};
use collective_io_core::{CollectiveError, CollectiveResult, Communicator, LocalEndpoint, LocalGroup};
use collective_io_logging::{rank_span, set_member_rank};

/// Form a group of `ranks` members and run `body` on each of them.
///
/// Results come back in rank order. A member that fails or panics aborts the
/// group so the others return instead of waiting on it.
pub fn run_members<T, F>(ranks: usize, abort_code: i32, body: F) -> Result<Vec<CollectiveResult<T>>>
where
    T: Send,
    F: Fn(LocalEndpoint) -> CollectiveResult<T> + Sync,
{
    let group = LocalGroup::new(ranks)?;
    let size = group.size();
    let body = &body;
    let group_ref = &group;

    std::thread::scope(|scope| {
        let handles: Vec<_> = group
            .endpoints()
            .into_iter()
            .map(|endpoint| {
                scope.spawn(move || {
                    let rank = endpoint.rank();
                    set_member_rank(Some(rank));
                    let span = rank_span(rank, size);
                    let _entered = span.enter();

                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(endpoint)));
                    match &outcome {
                        Ok(Err(err)) => {
                            tracing::error!(rank, error = %err, "member failed");
                            if !matches!(err, CollectiveError::Aborted { .. }) {
                                group_ref.abort(abort_code);
                            }
                        }
                        Err(_) => {
                            tracing::error!(rank, "member panicked");
                            group_ref.abort(abort_code);
                        }
                        Ok(Ok(_)) => {}
                    }
                    set_member_rank(None);
                    outcome
                })
            })
            .collect();

        handles
            .into_iter()
            .enumerate()
            .map(|(rank, handle)| match handle.join() {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(_)) | Err(_) => Err(anyhow!("member {rank} panicked")),
            })
            .collect()
    })
}

/// Collect the members' values, or the error that explains the failure.
///
/// A member's own failure is preferred over the `Aborted` it caused elsewhere.
pub fn settle<T>(results: Vec<CollectiveResult<T>>) -> CollectiveResult<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut aborted = None;
    let mut cause = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(err @ CollectiveError::Aborted { .. }) => {
                aborted.get_or_insert(err);
            }
            Err(err) => {
                cause.get_or_insert(err);
            }
        }
    }
    match cause.or(aborted) {
        Some(err) => Err(err),
        None => Ok(values),
    }
}
