//! Directory-backed sandbox: projects are written to disk and commands run as
//! local processes.

use std::{
    path::{Component, Path, PathBuf},
    process::Stdio,
    sync::{
        Arc, LazyLock,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use kiln_build::{
    Error, MountEntry, MountSnapshot, OutputStream, Result, Sandbox, SandboxBooter, SandboxProcess,
    ServerReady,
};
use regex::Regex;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    process::{Child, Command},
    sync::{broadcast, mpsc},
};
use tokio_stream::wrappers::UnboundedReceiverStream;

static ANSI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]").expect("ansi pattern is valid"));

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]|[A-Za-z0-9.-]+):(\d{2,5})")
        .expect("url pattern is valid")
});

/// Find the first local server URL in a line of process output
pub fn detect_server(line: &str) -> Option<ServerReady> {
    let clean = ANSI_PATTERN.replace_all(line, "");
    let captures = URL_PATTERN.captures(&clean)?;
    let port = captures[1].parse::<u16>().ok()?;
    Some(ServerReady {
        port,
        url: captures[0].to_string(),
    })
}

/// A sandbox rooted at a local directory
pub struct LocalSandbox {
    root: PathBuf,
    ready: broadcast::Sender<ServerReady>,
}

impl LocalSandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let (ready, _) = broadcast::channel(16);
        Self {
            root: root.into(),
            ready,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn mount(&self, snapshot: &MountSnapshot) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create {}: {}", self.root.display(), e)))?;
        write_entries(&self.root, snapshot.entries()).await?;
        tracing::debug!(root = %self.root.display(), entries = snapshot.entry_count(), "mounted snapshot");
        Ok(())
    }

    async fn spawn(&self, command: &str, args: &[String]) -> Result<Box<dyn SandboxProcess>> {
        let mut child = Command::new(command)
            .args(args)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Sandbox(format!("Failed to spawn {}: {}", command, e)))?;

        tracing::debug!(command, ?args, pid = child.id(), "spawned sandbox process");

        let (tx, rx) = mpsc::unbounded_channel();
        let announced = Arc::new(AtomicBool::new(false));
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone(), self.ready.clone(), Arc::clone(&announced));
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx, self.ready.clone(), announced);
        }

        Ok(Box::new(LocalProcess {
            child,
            output: Some(Box::pin(UnboundedReceiverStream::new(rx))),
        }))
    }

    fn subscribe_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.ready.subscribe()
    }
}

fn write_entries<'a>(
    dir: &'a Path,
    entries: &'a std::collections::BTreeMap<String, MountEntry>,
) -> futures::future::BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        for (name, entry) in entries {
            if !is_plain_name(name) {
                return Err(Error::Sandbox(format!("Refusing to write outside the workspace: {}", name)));
            }
            let path = dir.join(name);
            match entry {
                MountEntry::File { contents } => {
                    tokio::fs::write(&path, contents).await.map_err(|e| {
                        Error::Sandbox(format!("Failed to write {}: {}", path.display(), e))
                    })?;
                }
                MountEntry::Directory(children) => {
                    tokio::fs::create_dir_all(&path).await.map_err(|e| {
                        Error::Sandbox(format!("Failed to create {}: {}", path.display(), e))
                    })?;
                    write_entries(&path, children).await?;
                }
            }
        }
        Ok(())
    })
}

/// A single normal path component, so joining it stays inside `dir`
fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Pump lines from a pipe into the output channel, announcing the first server URL
fn forward_lines<R>(
    reader: R,
    tx: mpsc::UnboundedSender<String>,
    ready: broadcast::Sender<ServerReady>,
    announced: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !announced.load(Ordering::Acquire) {
                if let Some(server) = detect_server(&line) {
                    if !announced.swap(true, Ordering::AcqRel) {
                        tracing::info!(port = server.port, url = %server.url, "server listening");
                        let _ = ready.send(server);
                    }
                }
            }
            // Keep draining even with no reader so the process never blocks on a full pipe.
            let _ = tx.send(line);
        }
    });
}

/// A local child process
pub struct LocalProcess {
    child: Child,
    output: Option<OutputStream>,
}

#[async_trait]
impl SandboxProcess for LocalProcess {
    fn take_output(&mut self) -> Option<OutputStream> {
        self.output.take()
    }

    async fn wait(&mut self) -> Result<i32> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to wait for process: {}", e)))?;
        Ok(status.code().unwrap_or(-1))
    }

    async fn kill(&mut self) -> Result<()> {
        self.child
            .kill()
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to kill process: {}", e)))
    }
}

/// Boots a `LocalSandbox` in a workspace directory
pub struct LocalBooter {
    root: PathBuf,
}

impl LocalBooter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl SandboxBooter for LocalBooter {
    async fn boot(&self) -> Result<Arc<dyn Sandbox>> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Sandbox(format!("Failed to create {}: {}", self.root.display(), e)))?;
        tracing::info!(root = %self.root.display(), "local sandbox booted");
        Ok(Arc::new(LocalSandbox::new(self.root.clone())))
    }
}
