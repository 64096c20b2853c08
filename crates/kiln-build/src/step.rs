//! Step markup parsing
//!
//! Model output carries its edits inside one artifact container:
//!
//! ```text
//! <boltArtifact id="todo-app" title="Todo app">
//!   <boltAction type="file" filePath="src/App.tsx">export default ...</boltAction>
//!   <boltAction type="shell">npm run dev</boltAction>
//! </boltArtifact>
//! ```
//!
//! Parsing never fails. Text without a complete container yields no steps, and
//! actions with missing attributes yield degenerate steps that the file tree
//! skips. A self-closing action (`<boltAction ... />`) has an empty payload.
//! Action tags are flat: a payload that contains a literal `</boltAction>` ends
//! the action early.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::LazyLock};

/// Name of the outer container tag
pub const ARTIFACT_TAG: &str = "boltArtifact";
/// Name of the action tag nested in the container
pub const ACTION_TAG: &str = "boltAction";

static ARTIFACT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)<{ARTIFACT_TAG}\b([^>]*)>(.*?)</{ARTIFACT_TAG}>"))
        .expect("artifact pattern is valid")
});

static ACTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?s)<{ACTION_TAG}\b([^>]*?)(?:/\s*>|>(.*?)</{ACTION_TAG}>)"))
        .expect("action pattern is valid")
});

static ATTRIBUTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][\w-]*)\s*=\s*"([^"]*)""#).expect("attribute pattern is valid")
});

/// What a step asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "kind", rename_all = "snake_case")]
pub enum StepKind {
    CreateFile,
    CreateFolder,
    RunCommand,
    /// An action kind this version does not understand, kept verbatim
    Other(String),
}

impl StepKind {
    /// Map an action's `type` attribute onto a kind
    pub fn from_attribute(kind: &str) -> Self {
        match kind {
            "file" => StepKind::CreateFile,
            "folder" | "directory" => StepKind::CreateFolder,
            "shell" => StepKind::RunCommand,
            other => StepKind::Other(other.to_string()),
        }
    }
}

/// Lifecycle of a step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Completed,
}

/// One instruction extracted from model output.
///
/// Constructed only through the kind-specific constructors, so a `CreateFile`
/// always has a path and a payload and a `RunCommand` never has a path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    id: usize,
    title: String,
    kind: StepKind,
    path: Option<String>,
    payload: Option<String>,
    status: StepStatus,
}

impl Step {
    /// A file write; `path` may be empty when the model omitted it
    pub fn create_file(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: 0,
            title: format!("Create {}", path),
            kind: StepKind::CreateFile,
            path: Some(path),
            payload: Some(content.into()),
            status: StepStatus::Pending,
        }
    }

    /// A folder creation
    pub fn create_folder(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id: 0,
            title: format!("Create folder {}", path),
            kind: StepKind::CreateFolder,
            path: Some(path),
            payload: None,
            status: StepStatus::Pending,
        }
    }

    /// A shell command to run in the sandbox
    pub fn run_command(command: impl Into<String>) -> Self {
        Self {
            id: 0,
            title: "Run command".to_string(),
            kind: StepKind::RunCommand,
            path: None,
            payload: Some(command.into()),
            status: StepStatus::Pending,
        }
    }

    /// An unrecognized action, inner text preserved verbatim
    pub fn other(kind: impl Into<String>, path: Option<String>, payload: impl Into<String>) -> Self {
        let kind = kind.into();
        Self {
            id: 0,
            title: format!("Unhandled action '{}'", kind),
            kind: StepKind::Other(kind),
            path,
            payload: Some(payload.into()),
            status: StepStatus::Pending,
        }
    }

    fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// 1-based position inside the response it came from
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.status == StepStatus::Pending
    }

    pub(crate) fn mark_completed(&mut self) {
        self.status = StepStatus::Completed;
    }
}

/// The parsed container: its attributes plus the steps inside it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Option<String>,
    pub title: Option<String>,
    pub steps: Vec<Step>,
}

/// Parse model output into steps, in document order.
pub fn parse(text: &str) -> Vec<Step> {
    parse_artifact(text)
        .map(|artifact| artifact.steps)
        .unwrap_or_default()
}

/// Parse the first artifact container in `text`, if there is a complete one.
pub fn parse_artifact(text: &str) -> Option<Artifact> {
    let captures = ARTIFACT_PATTERN.captures(text)?;
    let mut attributes = parse_attributes(captures.get(1).map_or("", |m| m.as_str()));
    let body = captures.get(2).map_or("", |m| m.as_str());

    let steps: Vec<Step> = ACTION_PATTERN
        .captures_iter(body)
        .enumerate()
        .map(|(index, action)| {
            let attrs = parse_attributes(action.get(1).map_or("", |m| m.as_str()));
            let inner = action.get(2).map_or("", |m| m.as_str());
            build_step(attrs, inner).with_id(index + 1)
        })
        .collect();

    tracing::debug!(count = steps.len(), "parsed artifact steps");

    Some(Artifact {
        id: attributes.remove("id"),
        title: attributes.remove("title"),
        steps,
    })
}

fn build_step(mut attrs: HashMap<String, String>, inner: &str) -> Step {
    let kind = attrs
        .remove("type")
        .or_else(|| attrs.remove("kind"))
        .unwrap_or_default();
    let path = attrs.remove("filePath").or_else(|| attrs.remove("path"));
    let payload = inner.trim();

    match StepKind::from_attribute(&kind) {
        StepKind::CreateFile => Step::create_file(path.unwrap_or_default(), payload),
        StepKind::CreateFolder => Step::create_folder(path.unwrap_or_default()),
        StepKind::RunCommand => Step::run_command(payload),
        StepKind::Other(kind) => Step::other(kind, path, payload),
    }
}

fn parse_attributes(raw: &str) -> HashMap<String, String> {
    ATTRIBUTE_PATTERN
        .captures_iter(raw)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(actions: &str) -> String {
        format!("<boltArtifact id=\"p\" title=\"Project\">{}</boltArtifact>", actions)
    }

    #[test]
    fn test_empty_input_has_no_steps() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn test_prose_without_container_has_no_steps() {
        let text = "Sure! Here is how you would build it: first create a folder.";
        assert!(parse(text).is_empty());
        assert!(parse_artifact(text).is_none());
    }

    #[test]
    fn test_unclosed_container_has_no_steps() {
        let text = "<boltArtifact id=\"x\"><boltAction type=\"shell\">ls</boltAction>";
        assert!(parse(text).is_empty());
    }

    #[test]
    fn test_artifact_attributes() {
        let artifact = parse_artifact(&wrap("")).unwrap();
        assert_eq!(artifact.id.as_deref(), Some("p"));
        assert_eq!(artifact.title.as_deref(), Some("Project"));
        assert!(artifact.steps.is_empty());
    }

    #[test]
    fn test_steps_keep_document_order() {
        let text = format!(
            "Intro prose.\n{}\nOutro.",
            wrap(
                r#"
  <boltAction type="folder" filePath="src"></boltAction>
  <boltAction type="file" filePath="src/index.js">console.log(1)</boltAction>
  <boltAction type="shell">npm install</boltAction>
"#
            )
        );
        let steps = parse(&text);

        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].kind(), &StepKind::CreateFolder);
        assert_eq!(steps[0].path(), Some("src"));
        assert_eq!(steps[1].kind(), &StepKind::CreateFile);
        assert_eq!(steps[1].path(), Some("src/index.js"));
        assert_eq!(steps[1].payload(), Some("console.log(1)"));
        assert_eq!(steps[2].kind(), &StepKind::RunCommand);
        assert_eq!(steps[2].path(), None);
        assert_eq!(steps[2].payload(), Some("npm install"));

        let ids: Vec<usize> = steps.iter().map(Step::id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(steps.iter().all(Step::is_pending));
    }

    #[test]
    fn test_self_closing_action_does_not_swallow_the_next() {
        let steps = parse(&wrap(
            r#"<boltAction type="folder" filePath="public"/><boltAction type="file" filePath="src/a.js">x</boltAction><boltAction type="folder" filePath="assets" /><boltAction type="shell">npm install</boltAction>"#,
        ));

        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].kind(), &StepKind::CreateFolder);
        assert_eq!(steps[0].path(), Some("public"));
        assert_eq!(steps[1].path(), Some("src/a.js"));
        assert_eq!(steps[1].payload(), Some("x"));
        assert_eq!(steps[2].path(), Some("assets"));
        assert_eq!(steps[3].payload(), Some("npm install"));

        let ids: Vec<usize> = steps.iter().map(Step::id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_self_closing_file_has_empty_payload() {
        let steps = parse(&wrap(r#"<boltAction type="file" filePath=".gitkeep"/>"#));
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].path(), Some(".gitkeep"));
        assert_eq!(steps[0].payload(), Some(""));
    }

    #[test]
    fn test_payload_is_literal_apart_from_padding() {
        let content = "import React from 'react';\n\nconst a = x < 3 && y > 2 ? \"&amp;\" : '';";
        let text = wrap(&format!(
            "<boltAction type=\"file\" filePath=\"src/a.tsx\">\n{}\n  </boltAction>",
            content
        ));
        let steps = parse(&text);
        assert_eq!(steps[0].payload(), Some(content));
    }

    #[test]
    fn test_unknown_kind_becomes_other() {
        let steps = parse(&wrap(r#"<boltAction kind="frobnicate">  twiddle the knobs </boltAction>"#));

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].kind(), &StepKind::Other("frobnicate".into()));
        assert_eq!(steps[0].payload(), Some("twiddle the knobs"));
    }

    #[test]
    fn test_missing_attributes_give_degenerate_steps() {
        let steps = parse(&wrap(
            r#"<boltAction type="file">orphan</boltAction><boltAction>no kind</boltAction>"#,
        ));

        assert_eq!(steps[0].kind(), &StepKind::CreateFile);
        assert_eq!(steps[0].path(), Some(""));
        assert_eq!(steps[0].payload(), Some("orphan"));
        assert_eq!(steps[1].kind(), &StepKind::Other(String::new()));
    }

    #[test]
    fn test_alternate_attribute_names() {
        let steps = parse(&wrap(r#"<boltAction kind="file" path="a.txt">hi</boltAction>"#));
        assert_eq!(steps[0].kind(), &StepKind::CreateFile);
        assert_eq!(steps[0].path(), Some("a.txt"));
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let steps = parse(&wrap(r#"<boltAction filePath="b.txt" type="file">b</boltAction>"#));
        assert_eq!(steps[0].path(), Some("b.txt"));
        assert_eq!(steps[0].kind(), &StepKind::CreateFile);
    }

    #[test]
    fn test_only_first_container_is_read() {
        let text = format!(
            "{}{}",
            wrap(r#"<boltAction type="shell">one</boltAction>"#),
            wrap(r#"<boltAction type="shell">two</boltAction>"#)
        );
        let steps = parse(&text);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].payload(), Some("one"));
    }

    #[test]
    fn test_titles() {
        assert_eq!(Step::create_file("src/App.tsx", "").title(), "Create src/App.tsx");
        assert_eq!(Step::run_command("npm i").title(), "Run command");
    }
}
