//! Sandbox contract and the shared boot handle.
//!
//! A sandbox takes whole-project mount snapshots, runs commands against the
//! mounted files, and announces when a dev server starts listening.

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    error::{Error, Result},
    tree::MountSnapshot,
};

/// Lines of combined stdout/stderr from a sandbox process
pub type OutputStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// A dev server is listening
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// An isolated environment the project is mounted into
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Replace the sandbox's files with `snapshot`
    async fn mount(&self, snapshot: &MountSnapshot) -> Result<()>;

    /// Start `command` with `args` in the mounted project
    async fn spawn(&self, command: &str, args: &[String]) -> Result<Box<dyn SandboxProcess>>;

    /// Receive a notification each time a server starts listening
    fn subscribe_ready(&self) -> broadcast::Receiver<ServerReady>;
}

/// A process running inside a sandbox
#[async_trait]
pub trait SandboxProcess: Send {
    /// Take the output stream; `None` after the first call
    fn take_output(&mut self) -> Option<OutputStream>;

    /// Wait for the process to exit and return its exit code
    async fn wait(&mut self) -> Result<i32>;

    /// Terminate the process
    async fn kill(&mut self) -> Result<()>;
}

/// Boots a sandbox; may be slow and may fail
#[async_trait]
pub trait SandboxBooter: Send + Sync {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>>;
}

/// Lifecycle of a `SandboxHandle`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxState {
    Uninitialized,
    Booting,
    Ready,
    TornDown,
}

enum Slot {
    Uninitialized,
    Booting,
    Ready(Arc<dyn Sandbox>),
    TornDown,
}

impl Slot {
    fn state(&self) -> SandboxState {
        match self {
            Slot::Uninitialized => SandboxState::Uninitialized,
            Slot::Booting => SandboxState::Booting,
            Slot::Ready(_) => SandboxState::Ready,
            Slot::TornDown => SandboxState::TornDown,
        }
    }
}

/// Shared handle that boots the sandbox lazily, at most once at a time.
///
/// Concurrent `get` calls during a boot wait for that boot instead of starting
/// another. A failed boot leaves the handle uninitialized so the next caller
/// retries. After `teardown` every `get` fails.
pub struct SandboxHandle {
    booter: Arc<dyn SandboxBooter>,
    slot: Mutex<Slot>,
    boot_lock: tokio::sync::Mutex<()>,
}

impl SandboxHandle {
    pub fn new(booter: Arc<dyn SandboxBooter>) -> Self {
        Self {
            booter,
            slot: Mutex::new(Slot::Uninitialized),
            boot_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> SandboxState {
        self.slot.lock().state()
    }

    /// The booted sandbox, if there is one
    fn ready(&self) -> Result<Option<Arc<dyn Sandbox>>> {
        match &*self.slot.lock() {
            Slot::Ready(sandbox) => Ok(Some(Arc::clone(sandbox))),
            Slot::TornDown => Err(Error::Sandbox("sandbox has been torn down".to_string())),
            Slot::Uninitialized | Slot::Booting => Ok(None),
        }
    }

    /// Get the sandbox, booting it if needed.
    pub async fn get(&self) -> Result<Arc<dyn Sandbox>> {
        if let Some(sandbox) = self.ready()? {
            return Ok(sandbox);
        }

        let _boot = self.boot_lock.lock().await;
        // Another caller may have finished booting while we waited.
        if let Some(sandbox) = self.ready()? {
            return Ok(sandbox);
        }

        *self.slot.lock() = Slot::Booting;
        tracing::info!("booting sandbox");

        match self.booter.boot().await {
            Ok(sandbox) => {
                let mut slot = self.slot.lock();
                if matches!(*slot, Slot::TornDown) {
                    return Err(Error::Sandbox("sandbox was torn down while booting".to_string()));
                }
                *slot = Slot::Ready(Arc::clone(&sandbox));
                tracing::info!("sandbox ready");
                Ok(sandbox)
            }
            Err(e) => {
                let mut slot = self.slot.lock();
                if !matches!(*slot, Slot::TornDown) {
                    *slot = Slot::Uninitialized;
                }
                tracing::warn!("sandbox boot failed: {}", e);
                Err(e)
            }
        }
    }

    /// Drop the sandbox for good.
    pub fn teardown(&self) {
        *self.slot.lock() = Slot::TornDown;
        tracing::debug!("sandbox torn down");
    }
}
