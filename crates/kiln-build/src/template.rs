//! Project template selection

use std::{fmt, sync::Arc};

use kiln_ai::TextGenerator;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    prompts,
};

/// The two starter projects a prompt can map to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectKind {
    Node,
    React,
}

impl ProjectKind {
    /// Interpret the classifier's answer; anything but an exact word is rejected
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim().to_lowercase().as_str() {
            "node" => Some(ProjectKind::Node),
            "react" => Some(ProjectKind::React),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectKind::Node => "node",
            ProjectKind::React => "react",
        }
    }

    /// The starter artifact for this kind
    pub fn template(&self) -> &'static str {
        match self {
            ProjectKind::Node => prompts::NODE_TEMPLATE,
            ProjectKind::React => prompts::REACT_TEMPLATE,
        }
    }

    /// Prompts to seed the first chat turn with, plus the artifact to apply
    pub fn bundle(&self) -> TemplateBundle {
        let files = prompts::project_files_prompt(self.template());
        let prompts = match self {
            ProjectKind::React => vec![prompts::BASE_PROMPT.to_string(), files],
            ProjectKind::Node => vec![files],
        };
        TemplateBundle {
            prompts,
            ui_prompts: vec![self.template().to_string()],
        }
    }
}

impl fmt::Display for ProjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the template endpoint returns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateBundle {
    /// Seed messages for the first chat turn
    pub prompts: Vec<String>,
    /// Step markup for the starter files; the first entry is applied
    pub ui_prompts: Vec<String>,
}

impl TemplateBundle {
    /// Guess the project kind from the starter markup
    pub fn project_kind(&self) -> Option<ProjectKind> {
        let first = self.ui_prompts.first()?;
        [ProjectKind::React, ProjectKind::Node]
            .into_iter()
            .find(|kind| kind.template() == first)
    }
}

/// Classifies prompts with a text generator
#[derive(Clone)]
pub struct TemplateSelector {
    generator: Arc<dyn TextGenerator>,
}

impl TemplateSelector {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Ask the generator which kind of project `prompt` describes.
    pub async fn classify(&self, prompt: &str) -> Result<ProjectKind> {
        let question = format!("{}{}", prompt, prompts::CLASSIFY_SUFFIX);
        let answer = self.generator.generate(&question).await?;

        match ProjectKind::from_answer(&answer) {
            Some(kind) => {
                tracing::info!(kind = %kind, "classified project");
                Ok(kind)
            }
            None => {
                tracing::warn!(answer = %answer.trim(), "prompt did not classify as node or react");
                Err(Error::Forbidden)
            }
        }
    }

    /// Classify `prompt` and return the matching bundle.
    pub async fn select(&self, prompt: &str) -> Result<TemplateBundle> {
        Ok(self.classify(prompt).await?.bundle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiln_ai::{TextEvent, TextEventStream};

    struct Answer(&'static str);

    #[async_trait]
    impl TextGenerator for Answer {
        async fn stream(&self, _prompt: &str) -> kiln_ai::Result<TextEventStream> {
            let events = vec![
                TextEvent::Delta { text: self.0.to_string() },
                TextEvent::Done { finish_reason: None },
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    fn selector(answer: &'static str) -> TemplateSelector {
        TemplateSelector::new(Arc::new(Answer(answer)))
    }

    #[test]
    fn test_from_answer_normalizes() {
        assert_eq!(ProjectKind::from_answer("  React\n"), Some(ProjectKind::React));
        assert_eq!(ProjectKind::from_answer("NODE"), Some(ProjectKind::Node));
        assert_eq!(ProjectKind::from_answer("react."), None);
        assert_eq!(ProjectKind::from_answer("python"), None);
    }

    #[tokio::test]
    async fn test_react_bundle() {
        let bundle = selector("react").select("a todo app").await.unwrap();

        assert_eq!(bundle.prompts.len(), 2);
        assert_eq!(bundle.prompts[0], prompts::BASE_PROMPT);
        assert!(bundle.prompts[1].starts_with(
            "Here is an artifact that contains all files of the project visible to you."
        ));
        assert!(bundle.prompts[1].contains(prompts::REACT_TEMPLATE));
        assert!(bundle.prompts[1].ends_with("  - package-lock.json\n"));
        assert_eq!(bundle.ui_prompts, vec![prompts::REACT_TEMPLATE.to_string()]);
        assert_eq!(bundle.project_kind(), Some(ProjectKind::React));
    }

    #[tokio::test]
    async fn test_node_bundle_has_no_design_prompt() {
        let bundle = selector("node\n").select("a cli").await.unwrap();
        assert_eq!(bundle.prompts.len(), 1);
        assert!(bundle.prompts[0].contains(prompts::NODE_TEMPLATE));
        assert_eq!(bundle.project_kind(), Some(ProjectKind::Node));
    }

    #[tokio::test]
    async fn test_other_answer_is_forbidden() {
        let err = selector("django").select("a blog").await.unwrap_err();
        assert!(err.is_forbidden());
    }

    #[test]
    fn test_bundle_wire_shape() {
        let json = serde_json::to_value(ProjectKind::Node.bundle()).unwrap();
        assert!(json["prompts"].is_array());
        assert!(json["uiPrompts"].is_array());
    }
}
