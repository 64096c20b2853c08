//! Build event types

use serde::{Deserialize, Serialize};

use crate::session::SessionPhase;

/// Events emitted while a session drives the project forward
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// The session moved to a new phase
    PhaseChanged { phase: SessionPhase },

    /// A response was parsed into new pending steps
    StepsAdded { count: usize },

    /// A batch of steps changed the project tree
    TreeUpdated { files: usize },

    /// A batch contained a shell command for the sandbox
    CommandQueued { command: String },

    /// A new preview generation is mounting the project
    PreviewMounting { generation: u64 },

    /// A line of output from a sandbox process
    PreviewOutput { generation: u64, line: String },

    /// The preview generation could not be started
    PreviewFailed { generation: u64, message: String },

    /// The dev server is listening
    PreviewReady { generation: u64, port: u16, url: String },

    /// A round-trip failed
    Error { message: String },
}

impl BuildEvent {
    /// Whether this event ends a preview generation
    pub fn is_preview_terminal(&self) -> bool {
        matches!(
            self,
            BuildEvent::PreviewReady { .. } | BuildEvent::PreviewFailed { .. }
        )
    }
}
