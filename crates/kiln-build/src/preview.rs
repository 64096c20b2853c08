//! Live preview: mount the project, install dependencies, run the dev server.
//!
//! Each `resync` starts a new generation. The previous generation is cancelled
//! and must release the sandbox (its processes killed) before the new one
//! mounts, so generations never overlap.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use futures::StreamExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    events::BuildEvent,
    sandbox::{SandboxHandle, SandboxProcess, ServerReady},
    tree::MountSnapshot,
};

/// A program plus its arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Parse a whitespace-separated command line; `None` if it is blank
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let program = parts.next()?;
        Some(Self {
            program: program.to_string(),
            args: parts.map(str::to_string).collect(),
        })
    }

    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Commands a preview generation runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub install: CommandSpec,
    pub dev: CommandSpec,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            install: CommandSpec::new("npm", &["install"]),
            dev: CommandSpec::new("npm", &["run", "dev"]),
        }
    }
}

/// Where the current generation stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewStatus {
    Idle,
    Mounting { generation: u64 },
    Installing { generation: u64 },
    Starting { generation: u64 },
    Ready { generation: u64, port: u16, url: String },
    Failed { generation: u64, message: String },
}

/// Drives sandbox generations for a session
pub struct PreviewRunner {
    sandbox: Arc<SandboxHandle>,
    config: PreviewConfig,
    events: broadcast::Sender<BuildEvent>,
    generation: AtomicU64,
    current: Mutex<Option<CancellationToken>>,
    status: Mutex<PreviewStatus>,
    /// Held by a generation for as long as it uses the sandbox
    run_lock: tokio::sync::Mutex<()>,
}

impl PreviewRunner {
    pub fn new(
        sandbox: Arc<SandboxHandle>,
        config: PreviewConfig,
        events: broadcast::Sender<BuildEvent>,
    ) -> Arc<Self> {
        Arc::new(Self {
            sandbox,
            config,
            events,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            status: Mutex::new(PreviewStatus::Idle),
            run_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn status(&self) -> PreviewStatus {
        self.status.lock().clone()
    }

    pub fn sandbox(&self) -> &Arc<SandboxHandle> {
        &self.sandbox
    }

    /// Start a new generation for `snapshot`, superseding the current one.
    ///
    /// Returns immediately with the generation number; progress is reported
    /// through `BuildEvent`s.
    pub fn resync(self: &Arc<Self>, snapshot: MountSnapshot) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let token = CancellationToken::new();
        if let Some(previous) = self.current.lock().replace(token.clone()) {
            previous.cancel();
        }

        tracing::debug!(generation, entries = snapshot.entry_count(), "preview resync");
        let runner = Arc::clone(self);
        tokio::spawn(async move {
            runner.run_generation(generation, snapshot, token).await;
        });
        generation
    }

    /// Cancel the current generation, killing its processes.
    pub fn shutdown(&self) {
        if let Some(token) = self.current.lock().take() {
            token.cancel();
        }
    }

    fn set_status(&self, status: PreviewStatus) {
        *self.status.lock() = status;
    }

    fn emit(&self, event: BuildEvent) {
        let _ = self.events.send(event);
    }

    fn fail(&self, generation: u64, message: String) {
        tracing::warn!(generation, "preview failed: {}", message);
        self.set_status(PreviewStatus::Failed {
            generation,
            message: message.clone(),
        });
        self.emit(BuildEvent::PreviewFailed { generation, message });
    }

    async fn run_generation(&self, generation: u64, snapshot: MountSnapshot, cancel: CancellationToken) {
        let _running = tokio::select! {
            _ = cancel.cancelled() => return,
            guard = self.run_lock.lock() => guard,
        };
        if cancel.is_cancelled() {
            return;
        }

        self.set_status(PreviewStatus::Mounting { generation });
        self.emit(BuildEvent::PreviewMounting { generation });

        let sandbox = match self.sandbox.get().await {
            Ok(sandbox) => sandbox,
            Err(e) => return self.fail(generation, e.detail()),
        };
        if let Err(e) = sandbox.mount(&snapshot).await {
            return self.fail(generation, e.detail());
        }

        // Subscribe before anything runs so an early announcement is not missed.
        let mut ready = sandbox.subscribe_ready();

        self.set_status(PreviewStatus::Installing { generation });
        let install = &self.config.install;
        let mut process = match sandbox.spawn(&install.program, &install.args).await {
            Ok(process) => process,
            Err(e) => return self.fail(generation, e.detail()),
        };
        self.forward_output(generation, process.as_mut());

        let exit_code = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = process.kill().await;
                return;
            }
            code = process.wait() => code,
        };
        match exit_code {
            Ok(0) => {}
            Ok(code) => {
                return self.fail(generation, format!("Installation failed with exit code {}", code));
            }
            Err(e) => return self.fail(generation, e.detail()),
        }

        self.set_status(PreviewStatus::Starting { generation });
        let dev = &self.config.dev;
        let mut server = match sandbox.spawn(&dev.program, &dev.args).await {
            Ok(process) => process,
            Err(e) => return self.fail(generation, e.detail()),
        };
        self.forward_output(generation, server.as_mut());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = server.kill().await;
                    return;
                }
                code = server.wait() => {
                    let message = match code {
                        Ok(code) => format!("Dev server exited with code {}", code),
                        Err(e) => e.detail(),
                    };
                    return self.fail(generation, message);
                }
                announced = ready.recv() => match announced {
                    Ok(ServerReady { port, url }) => {
                        tracing::info!(generation, port, url = %url, "preview ready");
                        self.set_status(PreviewStatus::Ready { generation, port, url: url.clone() });
                        self.emit(BuildEvent::PreviewReady { generation, port, url });
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = server.kill().await;
                        return self.fail(generation, "Sandbox closed before the server was ready".to_string());
                    }
                },
            }
        }

        // Keep the server alive until superseded.
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = server.kill().await;
                tracing::debug!(generation, "preview generation stopped");
            }
            code = server.wait() => {
                tracing::warn!(generation, "dev server exited: {:?}", code.map_err(|e| e.detail()));
            }
        }
    }

    fn forward_output(&self, generation: u64, process: &mut dyn SandboxProcess) {
        let Some(mut output) = process.take_output() else {
            return;
        };
        let events = self.events.clone();
        tokio::spawn(async move {
            while let Some(line) = output.next().await {
                tracing::debug!(generation, "{}", line);
                let _ = events.send(BuildEvent::PreviewOutput { generation, line });
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::mock::{MockBooter, MockSandbox, Script};
    use crate::tree::FileTree;
    use crate::step::Step;

    fn snapshot() -> MountSnapshot {
        FileTree::new()
            .apply(&Step::create_file("package.json", "{}"))
            .to_mount_snapshot()
    }

    fn runner(sandbox: Arc<MockSandbox>) -> (Arc<PreviewRunner>, broadcast::Receiver<BuildEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let handle = Arc::new(SandboxHandle::new(MockBooter::new(sandbox)));
        (PreviewRunner::new(handle, PreviewConfig::default(), tx), rx)
    }

    async fn next_terminal(rx: &mut broadcast::Receiver<BuildEvent>) -> BuildEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if event.is_preview_terminal() {
                return event;
            }
        }
    }

    #[test]
    fn test_command_spec() {
        let spec = CommandSpec::parse("  pnpm run   dev ").unwrap();
        assert_eq!(spec.program, "pnpm");
        assert_eq!(spec.args, vec!["run", "dev"]);
        assert_eq!(spec.display(), "pnpm run dev");
        assert!(CommandSpec::parse("   ").is_none());
        assert_eq!(PreviewConfig::default().dev.display(), "npm run dev");
    }

    #[tokio::test]
    async fn test_install_then_dev_then_ready() {
        let sandbox = MockSandbox::npm();
        let (runner, mut rx) = runner(sandbox.clone());

        let generation = runner.resync(snapshot());
        match next_terminal(&mut rx).await {
            BuildEvent::PreviewReady { generation: g, port, url } => {
                assert_eq!(g, generation);
                assert_eq!(port, 5173);
                assert_eq!(url, "http://localhost:5173");
            }
            other => panic!("unexpected event: {:?}", other),
        }

        assert_eq!(sandbox.mounts.lock().len(), 1);
        assert_eq!(*sandbox.spawned.lock(), vec!["npm install", "npm run dev"]);
        assert!(matches!(runner.status(), PreviewStatus::Ready { port: 5173, .. }));
    }

    #[tokio::test]
    async fn test_install_failure_never_starts_dev() {
        let sandbox = MockSandbox::new([("npm install", Script::exits(1))]);
        let (runner, mut rx) = runner(sandbox.clone());

        runner.resync(snapshot());
        match next_terminal(&mut rx).await {
            BuildEvent::PreviewFailed { message, .. } => assert!(message.contains("Installation failed")),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(*sandbox.spawned.lock(), vec!["npm install"]);
    }

    #[tokio::test]
    async fn test_resync_supersedes_running_generation() {
        let sandbox = MockSandbox::npm();
        let (runner, mut rx) = runner(sandbox.clone());

        let first = runner.resync(snapshot());
        assert!(matches!(next_terminal(&mut rx).await, BuildEvent::PreviewReady { generation, .. } if generation == first));

        let second = runner.resync(snapshot());
        assert!(matches!(next_terminal(&mut rx).await, BuildEvent::PreviewReady { generation, .. } if generation == second));

        assert_eq!(sandbox.kills.load(Ordering::SeqCst), 1);
        assert_eq!(sandbox.mounts.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_kills_server() {
        let sandbox = MockSandbox::npm();
        let (runner, mut rx) = runner(sandbox.clone());

        runner.resync(snapshot());
        next_terminal(&mut rx).await;

        runner.shutdown();
        for _ in 0..100 {
            if sandbox.kills.load(Ordering::SeqCst) == 1 {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("dev server was not killed");
    }
}
