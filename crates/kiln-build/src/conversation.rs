//! Conversation state: messages, parsed steps, and the project tree.

use kiln_ai::Message;

use crate::{step::Step, tree::FileTree};

/// Conversation state: messages, steps, and the tree they produced.
///
/// Append-only apart from `reset`, which replaces everything at once.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    /// Chat history, without the injected system instruction
    pub messages: Vec<Message>,
    /// Every step parsed so far, across all responses
    pub steps: Vec<Step>,
    /// Current project tree
    pub tree: FileTree,
    /// Last error
    pub error: Option<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly parsed steps; they arrive pending.
    pub fn push_steps(&mut self, steps: Vec<Step>) -> usize {
        let count = steps.len();
        self.steps.extend(steps);
        count
    }

    /// Steps not yet applied to the tree, in order
    pub fn pending_steps(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter().filter(|s| s.is_pending())
    }

    pub fn has_pending(&self) -> bool {
        self.steps.iter().any(Step::is_pending)
    }

    /// Mark every step in history completed
    pub fn complete_all(&mut self) {
        for step in &mut self.steps {
            step.mark_completed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_then_complete() {
        let mut conv = Conversation::new();
        assert_eq!(conv.push_steps(vec![Step::create_folder("src"), Step::run_command("ls")]), 2);
        assert!(conv.has_pending());
        assert_eq!(conv.pending_steps().count(), 2);

        conv.complete_all();
        assert!(!conv.has_pending());

        conv.push_steps(vec![Step::create_file("a.txt", "a")]);
        assert_eq!(conv.pending_steps().count(), 1);
    }
}
