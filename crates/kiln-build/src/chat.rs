//! Chat completion service.
//!
//! Flattens a role-tagged conversation plus its environment context into one
//! prompt for a text generator, with the system instruction always first.

use std::sync::Arc;

use kiln_ai::{ChatContext, ChatRequest, ChatResponse, Message, Role, TextGenerator};

use crate::{
    error::{Error, Result},
    prompts,
};

/// Project type reported when the caller does not name one
pub const UNKNOWN_PROJECT_TYPE: &str = "unknown";

/// Answers chat requests with a text generator
#[derive(Clone)]
pub struct ChatService {
    generator: Arc<dyn TextGenerator>,
    system_prompt: String,
}

impl ChatService {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            system_prompt: prompts::system_prompt(),
        }
    }

    /// Replace the injected system instruction
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Complete the conversation and echo back the context that was used.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse> {
        let context = fill_context_defaults(request.context.unwrap_or_default());

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(Message::system(self.system_prompt.as_str()));
        messages.extend(request.messages);

        let prompt = format_conversation(&messages, &context);
        tracing::debug!(
            messages = messages.len(),
            prompt_len = prompt.len(),
            project_type = context.project_type.as_deref().unwrap_or_default(),
            "chat request"
        );

        let response = self.generator.generate(&prompt).await?;
        if response.is_empty() {
            return Err(Error::Upstream("No response generated".to_string()));
        }

        Ok(ChatResponse { response, context })
    }
}

/// Fill in the working directory, project type and active files if missing.
pub fn fill_context_defaults(mut context: ChatContext) -> ChatContext {
    if context.working_directory.as_deref().is_none_or(str::is_empty) {
        context.working_directory = std::env::current_dir()
            .ok()
            .map(|dir| dir.display().to_string());
    }
    if context.project_type.as_deref().is_none_or(str::is_empty) {
        context.project_type = Some(UNKNOWN_PROJECT_TYPE.to_string());
    }
    context
}

/// Render the conversation as a single prompt.
///
/// The environment block comes first, then each message; system messages are
/// fenced and the rest are prefixed with their upper-cased role. Sections are
/// separated by a blank line.
pub fn format_conversation(messages: &[Message], context: &ChatContext) -> String {
    let mut parts = vec!["=== Environment Context ===".to_string()];
    if let Some(dir) = context.working_directory.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format!("Working Directory: {}", dir));
    }
    if let Some(kind) = context.project_type.as_deref().filter(|k| !k.is_empty()) {
        parts.push(format!("Project Type: {}", kind));
    }
    if !context.active_files.is_empty() {
        parts.push("Active Files:".to_string());
        parts.extend(context.active_files.iter().map(|f| format!("- {}", f)));
    }

    parts.extend(messages.iter().map(|msg| match msg.role {
        Role::System => format!("[System Instruction]\n{}\n[End System Instruction]", msg.content),
        role => format!("{}: {}", role.as_str().to_uppercase(), msg.content),
    }));

    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kiln_ai::{TextEvent, TextEventStream};
    use parking_lot::Mutex;

    /// Replies with a fixed text and remembers the last prompt
    struct CannedGenerator {
        reply: String,
        last_prompt: Mutex<Option<String>>,
    }

    impl CannedGenerator {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                last_prompt: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn stream(&self, prompt: &str) -> kiln_ai::Result<TextEventStream> {
            *self.last_prompt.lock() = Some(prompt.to_string());
            let events = vec![
                TextEvent::Delta { text: self.reply.clone() },
                TextEvent::Done { finish_reason: Some("STOP".into()) },
            ];
            Ok(Box::pin(futures::stream::iter(events)))
        }
    }

    #[test]
    fn test_format_conversation() {
        let context = ChatContext {
            working_directory: Some("/app".into()),
            project_type: Some("react".into()),
            active_files: vec!["src/App.tsx".into(), "package.json".into()],
        };
        let messages = vec![
            Message::system("be terse"),
            Message::user("make a clock"),
            Message::assistant("ok"),
        ];

        let text = format_conversation(&messages, &context);
        assert_eq!(
            text,
            "=== Environment Context ===\n\nWorking Directory: /app\n\nProject Type: react\n\n\
             Active Files:\n\n- src/App.tsx\n\n- package.json\n\n\
             [System Instruction]\nbe terse\n[End System Instruction]\n\n\
             USER: make a clock\n\nASSISTANT: ok"
        );
    }

    #[test]
    fn test_format_omits_empty_active_files() {
        let context = ChatContext {
            working_directory: Some("/app".into()),
            project_type: Some("node".into()),
            active_files: vec![],
        };
        let text = format_conversation(&[Message::user("hi")], &context);
        assert!(!text.contains("Active Files"));
        assert!(text.ends_with("USER: hi"));
    }

    #[test]
    fn test_context_defaults() {
        let context = fill_context_defaults(ChatContext::default());
        assert!(context.working_directory.is_some());
        assert_eq!(context.project_type.as_deref(), Some(UNKNOWN_PROJECT_TYPE));
        assert!(context.active_files.is_empty());

        let kept = fill_context_defaults(ChatContext {
            working_directory: Some("/w".into()),
            project_type: Some("react".into()),
            active_files: vec!["a".into()],
        });
        assert_eq!(kept.working_directory.as_deref(), Some("/w"));
        assert_eq!(kept.project_type.as_deref(), Some("react"));
    }

    #[tokio::test]
    async fn test_system_instruction_comes_first() {
        let generator = CannedGenerator::new("<boltArtifact></boltArtifact>");
        let service = ChatService::new(generator.clone()).with_system_prompt("SYSTEM RULES");

        let response = service
            .chat(ChatRequest {
                messages: vec![Message::user("build it")],
                context: None,
            })
            .await
            .unwrap();

        assert_eq!(response.response, "<boltArtifact></boltArtifact>");
        assert_eq!(response.context.project_type.as_deref(), Some("unknown"));

        let prompt = generator.last_prompt.lock().clone().unwrap();
        let system_at = prompt.find("[System Instruction]\nSYSTEM RULES").unwrap();
        let user_at = prompt.find("USER: build it").unwrap();
        assert!(system_at < user_at);
    }

    #[tokio::test]
    async fn test_empty_output_is_upstream_failure() {
        let service = ChatService::new(CannedGenerator::new(""));
        let err = service.chat(ChatRequest::default()).await.unwrap_err();
        assert!(matches!(err, Error::Upstream(ref m) if m == "No response generated"));
    }
}
