//! Console rendering for sessions: event lines, the file tree, the step list.

use kiln_build::{BuildEvent, FileTree, FileTreeNode, PreviewStatus, SessionPhase, Step, StepKind};
use tokio::{sync::broadcast, task::JoinHandle};

use crate::utils::truncate_chars;

/// One console line for an event, or `None` if it should stay quiet
pub fn format_event(event: &BuildEvent, verbose: bool) -> Option<String> {
    match event {
        BuildEvent::PhaseChanged { phase } => verbose.then(|| format!("[{}]", phase_label(*phase))),
        BuildEvent::StepsAdded { count } => (*count > 0).then(|| format!("[+{} steps]", count)),
        BuildEvent::TreeUpdated { files } => Some(format!("[Project: {} files]", files)),
        BuildEvent::CommandQueued { command } => Some(format!("[Command: {}]", command)),
        BuildEvent::PreviewMounting { generation } => {
            Some(format!("[Preview #{}: installing dependencies...]", generation))
        }
        BuildEvent::PreviewOutput { line, .. } => {
            verbose.then(|| format!("  | {}", truncate_chars(line, 200)))
        }
        BuildEvent::PreviewFailed { generation, message } => {
            Some(format!("[Preview #{} failed: {}]", generation, message))
        }
        BuildEvent::PreviewReady { url, .. } => Some(format!("[Preview ready: {}]", url)),
        BuildEvent::Error { message } => Some(format!("Error: {}", message)),
    }
}

/// Print session events until the channel closes
pub fn spawn_event_printer(mut receiver: broadcast::Receiver<BuildEvent>, verbose: bool) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(line) = format_event(&event, verbose) {
                        match event {
                            BuildEvent::Error { .. } | BuildEvent::PreviewFailed { .. } => eprintln!("{}", line),
                            _ => println!("{}", line),
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

pub fn phase_label(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Uninitialized => "waiting for a prompt",
        SessionPhase::TemplateRequested => "choosing a template",
        SessionPhase::AwaitingFirstPlan => "planning",
        SessionPhase::Interactive => "ready",
    }
}

pub fn preview_label(status: &PreviewStatus) -> String {
    match status {
        PreviewStatus::Idle => "idle".to_string(),
        PreviewStatus::Mounting { .. } => "mounting".to_string(),
        PreviewStatus::Installing { .. } => "installing".to_string(),
        PreviewStatus::Starting { .. } => "starting".to_string(),
        PreviewStatus::Ready { url, .. } => format!("ready at {}", url),
        PreviewStatus::Failed { message, .. } => format!("failed: {}", message),
    }
}

/// Draw the tree with box characters, in insertion order
pub fn render_tree(tree: &FileTree) -> String {
    fn walk(nodes: &[FileTreeNode], prefix: &str, out: &mut String) {
        for (i, node) in nodes.iter().enumerate() {
            let last = i + 1 == nodes.len();
            let branch = if last { "└── " } else { "├── " };
            out.push_str(prefix);
            out.push_str(branch);
            out.push_str(node.name());
            if node.is_folder() {
                out.push('/');
            }
            out.push('\n');

            let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
            walk(node.children(), &child_prefix, out);
        }
    }

    if tree.is_empty() {
        return "(no files)\n".to_string();
    }
    let mut out = String::new();
    walk(tree.roots(), "", &mut out);
    out
}

/// The step list with completion marks
pub fn render_steps(steps: &[Step]) -> String {
    if steps.is_empty() {
        return "(no steps)\n".to_string();
    }

    steps
        .iter()
        .map(|step| {
            let mark = if step.is_pending() { " " } else { "x" };
            let detail = match step.kind() {
                StepKind::RunCommand => format!(": {}", step.payload().unwrap_or_default()),
                _ => String::new(),
            };
            format!("[{}] {}{}\n", mark, step.title(), detail)
        })
        .collect()
}
