//! Slash commands for interactive mode

use kiln_build::{BuildSession, FileTree, FileTreeNode, Step};

use crate::{ui, utils};

/// Result of executing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Discard the project and start over
    Reset,
    /// Show a message to the user (not sent to the model)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, session: &BuildSession) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "files" | "f" | "tree" => CommandResult::Message(ui::render_tree(&session.tree())),

        "steps" => CommandResult::Message(ui::render_steps(&session.steps())),

        "show" | "cat" => show_file(session, args),

        "status" | "s" => CommandResult::Message(status_message(session)),

        "reset" | "clear" | "c" => CommandResult::Reset,

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

fn show_file(session: &BuildSession, path: &str) -> CommandResult {
    if path.is_empty() {
        return CommandResult::Message("Usage: /show <path>".to_string());
    }

    let tree = session.tree();
    let message = match tree.find(path) {
        Some(node) => match node.content() {
            Some(content) => utils::number_lines(content),
            None => ui::render_tree(&subtree(node)),
        },
        None => format!("No such file: {}", path),
    };
    CommandResult::Message(message)
}

/// A tree holding just `node`'s children, for listing a folder
fn subtree(node: &FileTreeNode) -> FileTree {
    let prefix = node.path().len() + 1;
    node.children()
        .iter()
        .flat_map(|child| steps_for(child, prefix))
        .fold(FileTree::new(), |tree, step| tree.apply(&step))
}

fn steps_for(node: &FileTreeNode, prefix: usize) -> Vec<Step> {
    let path = node.path().get(prefix..).unwrap_or_default().to_string();
    match node.content() {
        Some(content) => vec![Step::create_file(path, content)],
        None => std::iter::once(Step::create_folder(path))
            .chain(node.children().iter().flat_map(|c| steps_for(c, prefix)))
            .collect(),
    }
}

fn status_message(session: &BuildSession) -> String {
    let steps = session.steps();
    let done = steps.iter().filter(|s| !s.is_pending()).count();
    let mut lines = vec![
        format!("Session:  {}", session.id()),
        format!("Phase:    {}", ui::phase_label(session.phase())),
        format!("Project:  {}", session.project_type()),
        format!("Files:    {}", session.tree().file_paths().len()),
        format!("Steps:    {}/{} completed", done, steps.len()),
        format!("Messages: {}", session.messages().len()),
    ];
    if let Some(status) = session.preview_status() {
        lines.push(format!("Preview:  {}", ui::preview_label(&status)));
    }
    if let Some(error) = session.last_error() {
        lines.push(format!("Error:    {}", error));
    }
    lines.join("\n")
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?        Show this help message
  /files, /f           Show the project tree
  /steps               List every step and whether it was applied
  /show <path>         Print a file (or list a folder)
  /status, /s          Show session, project and preview status
  /reset, /c           Discard the project and start over
  /quit, /exit, /q     Exit kiln

The first prompt picks a template and builds the project.
Every later prompt asks for changes to it."#
        .to_string()
}
