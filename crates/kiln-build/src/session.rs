//! Build session: the reconciliation loop between model responses, the project
//! tree and the preview sandbox.

use std::sync::Arc;

use kiln_ai::{ChatContext, ChatRequest, Message};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    backend::Backend,
    conversation::Conversation,
    error::{Error, Result},
    events::BuildEvent,
    handle::SessionHandle,
    preview::{PreviewConfig, PreviewRunner, PreviewStatus},
    prompts,
    sandbox::SandboxHandle,
    step::{self, Step, StepKind},
    tree::{FileTree, MountSnapshot},
};

/// Working directory reported to the chat service, the same one the system
/// instruction names
pub const DEFAULT_WORKING_DIRECTORY: &str = prompts::WORK_DIR;

/// Project type reported when the template does not reveal one
pub const DEFAULT_PROJECT_TYPE: &str = "react";

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Nothing requested yet
    Uninitialized,
    /// Waiting for the template endpoint
    TemplateRequested,
    /// Starter files applied, waiting for the first chat response
    AwaitingFirstPlan,
    /// Ready for follow-up prompts
    Interactive,
}

struct SessionState {
    phase: SessionPhase,
    conversation: Conversation,
    project_type: String,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: SessionPhase::Uninitialized,
            conversation: Conversation::new(),
            project_type: DEFAULT_PROJECT_TYPE.to_string(),
        }
    }
}

/// Result of applying the pending batch
struct BatchResult {
    changed: bool,
    files: usize,
    commands: Vec<String>,
    snapshot: Option<MountSnapshot>,
}

/// One user's build session.
///
/// All methods take `&self`; state sits behind a lock that is never held across
/// an await. At most one template or chat round-trip runs at a time, and a
/// second caller gets `Error::Busy` instead of waiting.
pub struct BuildSession {
    backend: Arc<dyn Backend>,
    preview: Option<Arc<PreviewRunner>>,
    state: Mutex<SessionState>,
    handle: SessionHandle,
    events: broadcast::Sender<BuildEvent>,
    working_directory: String,
}

impl BuildSession {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (events, _) = broadcast::channel(1000);
        Self {
            backend,
            preview: None,
            state: Mutex::new(SessionState::new()),
            handle: SessionHandle::new(),
            events,
            working_directory: DEFAULT_WORKING_DIRECTORY.to_string(),
        }
    }

    /// Mirror the project into `sandbox` whenever the tree changes
    pub fn with_sandbox(mut self, sandbox: Arc<SandboxHandle>, config: PreviewConfig) -> Self {
        self.preview = Some(PreviewRunner::new(sandbox, config, self.events.clone()));
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.events.subscribe()
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn id(&self) -> &str {
        self.handle.id()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_loading(&self) -> bool {
        self.handle.is_loading()
    }

    /// Every step parsed so far, with its status
    pub fn steps(&self) -> Vec<Step> {
        self.state.lock().conversation.steps.clone()
    }

    pub fn tree(&self) -> FileTree {
        self.state.lock().conversation.tree.clone()
    }

    /// Chat history as sent to the backend
    pub fn messages(&self) -> Vec<Message> {
        self.state.lock().conversation.messages.clone()
    }

    /// The tree in mount format
    pub fn snapshot(&self) -> MountSnapshot {
        self.state.lock().conversation.tree.to_mount_snapshot()
    }

    /// Last round-trip error, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.state.lock().conversation.error.clone()
    }

    pub fn project_type(&self) -> String {
        self.state.lock().project_type.clone()
    }

    pub fn preview_status(&self) -> Option<PreviewStatus> {
        self.preview.as_ref().map(|p| p.status())
    }

    fn emit(&self, event: BuildEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_phase(&self, phase: SessionPhase) {
        self.state.lock().phase = phase;
        tracing::info!(session = self.id(), phase = ?phase, "phase changed");
        self.emit(BuildEvent::PhaseChanged { phase });
    }

    fn ensure_phase(&self, expected: SessionPhase) -> Result<()> {
        let actual = self.phase();
        if actual != expected {
            return Err(Error::InvalidPhase { expected, actual });
        }
        Ok(())
    }

    /// Start the project from the user's first prompt.
    ///
    /// Requests a template, applies its starter files, then asks for the first
    /// plan and applies that too. Returns the number of steps added. If anything
    /// fails the session returns to `Uninitialized` so `start` can be retried.
    pub async fn start(&self, prompt: &str) -> Result<usize> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(Error::EmptyPrompt);
        }

        let _loading = self.handle.begin()?;
        self.ensure_phase(SessionPhase::Uninitialized)?;

        match self.run_start(prompt).await {
            Ok(count) => {
                self.state.lock().conversation.error = None;
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(session = self.id(), "start failed: {}", e);
                if let Some(preview) = &self.preview {
                    preview.shutdown();
                }
                {
                    let mut state = self.state.lock();
                    *state = SessionState::new();
                    state.conversation.error = Some(e.detail());
                }
                self.emit(BuildEvent::Error { message: e.detail() });
                self.set_phase(SessionPhase::Uninitialized);
                Err(e)
            }
        }
    }

    async fn run_start(&self, prompt: &str) -> Result<usize> {
        self.set_phase(SessionPhase::TemplateRequested);
        let bundle = self.backend.template(prompt).await?;

        let starter = bundle
            .ui_prompts
            .first()
            .ok_or_else(|| Error::Upstream("Template has no starter files".to_string()))?;
        let starter_steps = step::parse(starter);
        let mut added = starter_steps.len();
        {
            let mut state = self.state.lock();
            if let Some(kind) = bundle.project_kind() {
                state.project_type = kind.to_string();
            }
            state.conversation.push_steps(starter_steps);
        }
        self.emit(BuildEvent::StepsAdded { count: added });
        self.set_phase(SessionPhase::AwaitingFirstPlan);
        self.apply_pending();

        let messages: Vec<Message> = bundle
            .prompts
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(prompt))
            .map(Message::user)
            .collect();
        let response = self.backend.chat(self.chat_request(messages.clone())).await?;

        let plan = step::parse(&response.response);
        added += plan.len();
        let count = plan.len();
        {
            let mut state = self.state.lock();
            state.conversation.messages = messages;
            state
                .conversation
                .messages
                .push(Message::assistant(response.response));
            state.conversation.push_steps(plan);
        }
        self.emit(BuildEvent::StepsAdded { count });
        self.set_phase(SessionPhase::Interactive);
        self.apply_pending();

        Ok(added)
    }

    /// Send a follow-up prompt and apply the steps in the reply.
    ///
    /// Blank prompts are ignored. Returns the number of steps added.
    pub async fn submit(&self, prompt: &str) -> Result<usize> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Ok(0);
        }

        let _loading = self.handle.begin()?;
        self.ensure_phase(SessionPhase::Interactive)?;

        let mut messages = self.messages();
        messages.push(Message::user(prompt));

        let response = match self.backend.chat(self.chat_request(messages)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(session = self.id(), "chat failed: {}", e);
                self.state.lock().conversation.error = Some(e.detail());
                self.emit(BuildEvent::Error { message: e.detail() });
                return Err(e);
            }
        };

        let plan = step::parse(&response.response);
        let count = plan.len();
        {
            let mut state = self.state.lock();
            let conversation = &mut state.conversation;
            conversation.messages.push(Message::user(prompt));
            conversation.messages.push(Message::assistant(response.response));
            conversation.push_steps(plan);
            conversation.error = None;
        }
        self.emit(BuildEvent::StepsAdded { count });
        self.apply_pending();

        Ok(count)
    }

    fn chat_request(&self, messages: Vec<Message>) -> ChatRequest {
        let state = self.state.lock();
        ChatRequest {
            messages,
            context: Some(ChatContext {
                working_directory: Some(self.working_directory.clone()),
                project_type: Some(state.project_type.clone()),
                active_files: state.conversation.tree.file_paths(),
            }),
        }
    }

    /// Apply every pending step in one pass, then mark the whole history
    /// completed. Resyncs the preview if the tree changed.
    fn apply_pending(&self) {
        let Some(batch) = self.apply_batch() else {
            return;
        };

        for command in batch.commands {
            self.emit(BuildEvent::CommandQueued { command });
        }
        if !batch.changed {
            return;
        }

        self.emit(BuildEvent::TreeUpdated { files: batch.files });
        if let (Some(preview), Some(snapshot)) = (&self.preview, batch.snapshot) {
            preview.resync(snapshot);
        }
    }

    fn apply_batch(&self) -> Option<BatchResult> {
        let mut state = self.state.lock();
        let conversation = &mut state.conversation;
        if !conversation.has_pending() {
            return None;
        }

        let pending: Vec<Step> = conversation.pending_steps().cloned().collect();
        let (tree, changed) = std::mem::take(&mut conversation.tree).apply_all(&pending);
        conversation.tree = tree;
        conversation.complete_all();

        let mut commands = Vec::new();
        for step in &pending {
            match step.kind() {
                StepKind::RunCommand => commands.push(step.payload().unwrap_or_default().to_string()),
                StepKind::Other(kind) => {
                    tracing::debug!(step = step.id(), kind = %kind, "ignoring unhandled action");
                }
                StepKind::CreateFile | StepKind::CreateFolder => {}
            }
        }

        let files = conversation.tree.file_paths().len();
        tracing::debug!(
            session = self.handle.id(),
            applied = pending.len(),
            changed,
            files,
            "applied step batch"
        );

        let snapshot = (changed && !conversation.tree.is_empty())
            .then(|| conversation.tree.to_mount_snapshot());
        Some(BatchResult {
            changed,
            files,
            commands,
            snapshot,
        })
    }

    /// Discard the conversation, steps and tree and return to `Uninitialized`.
    pub fn reset(&self) -> Result<()> {
        let _loading = self.handle.begin()?;
        if let Some(preview) = &self.preview {
            preview.shutdown();
        }
        *self.state.lock() = SessionState::new();
        self.set_phase(SessionPhase::Uninitialized);
        Ok(())
    }

    /// Stop the preview and tear down the sandbox.
    pub fn shutdown(&self) {
        self.handle.shutdown();
        if let Some(preview) = &self.preview {
            preview.shutdown();
            preview.sandbox().teardown();
        }
        tracing::info!(session = self.id(), "session shut down");
    }
}
