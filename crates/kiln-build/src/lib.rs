//! kiln-build: turn model responses into a running project
//!
//! Model output is parsed into steps, steps are applied to an in-memory file
//! tree, and every change to the tree is mirrored into a preview sandbox that
//! installs dependencies and serves the project.

pub mod backend;
pub mod chat;
pub mod conversation;
pub mod error;
pub mod events;
pub mod handle;
pub mod preview;
pub mod prompts;
pub mod sandbox;
pub mod session;
pub mod step;
pub mod template;
pub mod tree;

pub use backend::{Backend, DirectBackend, HttpBackend};
pub use chat::ChatService;
pub use conversation::Conversation;
pub use error::{Error, Result};
pub use events::BuildEvent;
pub use handle::SessionHandle;
pub use preview::{CommandSpec, PreviewConfig, PreviewRunner, PreviewStatus};
pub use sandbox::{
    OutputStream, Sandbox, SandboxBooter, SandboxHandle, SandboxProcess, SandboxState, ServerReady,
};
pub use session::{BuildSession, SessionPhase};
pub use step::{Artifact, Step, StepKind, StepStatus};
pub use template::{ProjectKind, TemplateBundle, TemplateSelector};
pub use tree::{ApplyOutcome, FileTree, FileTreeNode, MountEntry, MountSnapshot};
