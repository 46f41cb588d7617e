// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Collective interceptors over a [`NativeIo`] provider
//!
//! Each interceptor classifies its stream first. Local streams go straight to
//! the provider on every member. Distributed streams run the provider on the
//! coordinator only and hand its result to everybody else.

mod meta;
mod query;
mod read;

use std::path::Path;

use libc::c_int;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, trace, warn};

use crate::comm::Communicator;
use crate::config::IoConfig;
use crate::context::GroupContext;
use crate::distribute::Distributor;
use crate::error::{CollectiveError, CollectiveResult};
use crate::native::NativeIo;
use crate::registry::HandleRegistry;
use crate::stream::{Stream, StreamKind};
use crate::types::{Op, OpenMode};

/// Where a call on a given stream runs
pub(crate) enum Route<'a, H> {
    /// Every member performs the call on its own handle
    Local(&'a H),
    /// This member performs the call and distributes the result
    Coordinator(&'a H, &'a Distributor),
    /// This member adopts the coordinator's result
    Member(&'a Distributor),
}

/// Collective buffered I/O for one member of a process group
pub struct CollectiveIo<N: NativeIo> {
    native: N,
    config: IoConfig,
    context: GroupContext,
    registry: HandleRegistry,
    world: Option<Box<dyn Communicator>>,
}

impl<N: NativeIo> CollectiveIo<N> {
    pub fn new(native: N, config: IoConfig) -> Self {
        let registry = HandleRegistry::new(config.registry_capacity);
        Self {
            native,
            config,
            context: GroupContext::new(),
            registry,
            world: None,
        }
    }

    /// Like [`CollectiveIo::new`], keeping `world` for [`CollectiveIo::join_world`]
    /// and for joining on the first open when the config asks for it.
    pub fn with_world(native: N, config: IoConfig, world: Box<dyn Communicator>) -> Self {
        let mut io = Self::new(native, config);
        io.world = Some(world);
        io
    }

    /// Join the group behind `world`. Collective.
    pub fn join(&mut self, world: &dyn Communicator) -> CollectiveResult<()> {
        self.context.join(world, &self.config)
    }

    /// Join the group given to [`CollectiveIo::with_world`]. Collective.
    pub fn join_world(&mut self) -> CollectiveResult<()> {
        let world = self.world.as_deref().ok_or(CollectiveError::NotJoined)?;
        self.context.join(world, &self.config)
    }

    /// Leave the group. Distributed streams still open become stale.
    pub fn leave(&mut self) {
        if !self.registry.is_empty() {
            warn!(
                rank = self.context.rank(),
                open = self.registry.len(),
                "leaving group with distributed streams still open"
            );
        }
        self.registry.clear();
        self.context.leave();
    }

    pub fn enable(&mut self) {
        self.context.enable();
    }

    pub fn disable(&mut self) {
        self.context.disable();
    }

    pub fn context(&self) -> &GroupContext {
        &self.context
    }

    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    /// Open `path`.
    ///
    /// Pure-read opens while the context is active are distributed: the coordinator
    /// opens, every member learns whether that worked, the stream is registered
    /// on every member and a barrier closes the call. Everything else is a plain
    /// local open. `Ok(None)` is the native open failure.
    pub fn fopen(&mut self, path: &Path, mode: &str) -> CollectiveResult<Option<Stream<N::Handle>>> {
        if !self.context.is_initialized() && self.config.join_on_first_open && self.world.is_some() {
            debug!("joining group on first open");
            self.join_world()?;
        }

        if !(self.context.is_active() && OpenMode::parse(mode).is_pure_read()) {
            return Ok(self.native.fopen(path, mode).map(Stream::local));
        }

        let distributor = self.context.distributor()?;
        distributor.checkpoint(Op::Fopen)?;
        let (opened, native) = if distributor.is_coordinator() {
            let handle = self.native.fopen(path, mode);
            let opened = handle.is_some();
            if let Err(err) = distributor.publish(&opened) {
                if let Some(handle) = handle {
                    self.native.fclose(handle);
                }
                return Err(err);
            }
            (opened, handle)
        } else {
            (distributor.receive::<bool>()?, None)
        };

        let stream = if opened {
            match self.registry.register() {
                Ok(slot) => Some(Stream::distributed(slot, native)),
                Err(err) => {
                    if let Some(handle) = native {
                        self.native.fclose(handle);
                    }
                    distributor.abort(self.config.abort_code);
                    return Err(err);
                }
            }
        } else {
            None
        };

        distributor.barrier()?;
        debug!(
            rank = distributor.rank(),
            path = %path.display(),
            mode,
            opened,
            slot = ?stream.as_ref().and_then(Stream::slot),
            "distributed open"
        );
        Ok(stream)
    }

    /// Close `stream`. A distributed stream is closed by the coordinator and its
    /// slot is retired on every member; the coordinator's return code is shared.
    pub fn fclose(&mut self, stream: Stream<N::Handle>) -> CollectiveResult<c_int> {
        match stream.into_kind() {
            StreamKind::Local(handle) => Ok(self.native.fclose(handle)),
            StreamKind::Distributed { slot, native } => {
                if !self.registry.contains(slot) {
                    if let Some(handle) = native {
                        self.native.fclose(handle);
                    }
                    return Err(CollectiveError::StaleHandle(slot));
                }
                let distributor = self.context.distributor()?;
                distributor.checkpoint(Op::Fclose)?;
                let code = match native {
                    Some(handle) => {
                        let code = self.native.fclose(handle);
                        distributor.publish(&code)?;
                        code
                    }
                    None => distributor.receive()?,
                };
                self.registry.retire(slot)?;
                debug!(rank = distributor.rank(), %slot, code, "distributed close");
                Ok(code)
            }
        }
    }

    /// Classify `stream` for `op`, running the lockstep check on distributed ones.
    pub(crate) fn route<'a>(
        &'a self,
        stream: &'a Stream<N::Handle>,
        op: Op,
    ) -> CollectiveResult<Route<'a, N::Handle>> {
        match stream.kind() {
            StreamKind::Local(handle) => Ok(Route::Local(handle)),
            StreamKind::Distributed { slot, native } => {
                if !self.registry.contains(*slot) {
                    return Err(CollectiveError::StaleHandle(*slot));
                }
                let distributor = self.context.distributor()?;
                distributor.checkpoint(op)?;
                trace!(rank = distributor.rank(), %op, %slot, "distributed call");
                Ok(match native {
                    Some(handle) => Route::Coordinator(handle, distributor),
                    None => Route::Member(distributor),
                })
            }
        }
    }

    /// Run `call` where the stream says, sharing its return value on distributed streams
    pub(crate) fn shared<T, F>(&self, stream: &Stream<N::Handle>, op: Op, call: F) -> CollectiveResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&N, &N::Handle) -> T,
    {
        match self.route(stream, op)? {
            Route::Local(handle) => Ok(call(&self.native, handle)),
            Route::Coordinator(handle, distributor) => {
                let value = call(&self.native, handle);
                distributor.publish(&value)?;
                Ok(value)
            }
            Route::Member(distributor) => distributor.receive(),
        }
    }

    /// Run `call` where the stream says. Members of a distributed stream skip it.
    pub(crate) fn coordinator_only<F>(&self, stream: &Stream<N::Handle>, op: Op, call: F) -> CollectiveResult<()>
    where
        F: FnOnce(&N, &N::Handle),
    {
        match self.route(stream, op)? {
            Route::Local(handle) | Route::Coordinator(handle, _) => call(&self.native, handle),
            Route::Member(_) => {}
        }
        Ok(())
    }
}
