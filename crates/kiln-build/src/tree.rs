//! In-memory project tree built by applying steps.
//!
//! Paths are relative and slash-separated with no leading slash: a root node's
//! path is its name, a child's path is `parent/name`. Sibling names are unique.
//! Steps whose path has a `.` or `..` segment are skipped.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::step::{Step, StepKind};

/// A file or folder in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileTreeNode {
    File {
        name: String,
        path: String,
        content: String,
    },
    Folder {
        name: String,
        path: String,
        /// Insertion order
        children: Vec<FileTreeNode>,
    },
}

impl FileTreeNode {
    fn folder(name: &str, path: String) -> Self {
        Self::Folder {
            name: name.to_string(),
            path,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::File { name, .. } | Self::Folder { name, .. } => name,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::File { path, .. } | Self::Folder { path, .. } => path,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder { .. })
    }

    /// Children of a folder; empty for files
    pub fn children(&self) -> &[FileTreeNode] {
        match self {
            Self::Folder { children, .. } => children,
            Self::File { .. } => &[],
        }
    }

    /// File content; `None` for folders
    pub fn content(&self) -> Option<&str> {
        match self {
            Self::File { content, .. } => Some(content),
            Self::Folder { .. } => None,
        }
    }
}

/// What applying one step did to the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new node was added at the step's path
    Created,
    /// An existing file got new content
    Updated,
    /// The node already matched the step
    Unchanged,
    /// The step kind does not touch the tree (commands, unknown actions)
    Ignored,
    /// The step could not be applied; the tree is untouched
    Skipped(String),
}

impl ApplyOutcome {
    /// Whether the tree differs from before the step
    pub fn changed(&self) -> bool {
        matches!(self, ApplyOutcome::Created | ApplyOutcome::Updated)
    }
}

/// The project forest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    roots: Vec<FileTreeNode>,
}

impl FileTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one step and hand back the resulting tree.
    pub fn apply(self, step: &Step) -> Self {
        self.apply_with_outcome(step).0
    }

    /// Apply one step, reporting what changed.
    pub fn apply_with_outcome(mut self, step: &Step) -> (Self, ApplyOutcome) {
        let outcome = match step.kind() {
            StepKind::CreateFile => {
                let content = step.payload().unwrap_or_default();
                self.upsert(step.path().unwrap_or_default(), Some(content))
            }
            StepKind::CreateFolder => self.upsert(step.path().unwrap_or_default(), None),
            StepKind::RunCommand | StepKind::Other(_) => ApplyOutcome::Ignored,
        };

        if let ApplyOutcome::Skipped(ref reason) = outcome {
            tracing::warn!(step = step.id(), title = step.title(), "skipping step: {}", reason);
        }

        (self, outcome)
    }

    /// Apply steps in order, returning the tree and whether anything changed.
    pub fn apply_all<'a>(self, steps: impl IntoIterator<Item = &'a Step>) -> (Self, bool) {
        steps.into_iter().fold((self, false), |(tree, changed), step| {
            let (tree, outcome) = tree.apply_with_outcome(step);
            (tree, changed || outcome.changed())
        })
    }

    /// Upsert a file (`content` is `Some`) or folder at `path`.
    fn upsert(&mut self, path: &str, content: Option<&str>) -> ApplyOutcome {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some((last, parents)) = segments.split_last() else {
            return ApplyOutcome::Skipped(format!("empty path '{}'", path));
        };
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "." | "..") || s.contains('\\')) {
            return ApplyOutcome::Skipped(format!("unsafe segment '{}' in '{}'", bad, path));
        }

        // Validate the whole walk first so a conflict leaves the tree untouched.
        let mut level: &[FileTreeNode] = &self.roots;
        for segment in parents {
            match level.iter().find(|n| n.name() == *segment) {
                Some(FileTreeNode::Folder { children, .. }) => level = children.as_slice(),
                Some(FileTreeNode::File { path, .. }) => {
                    return ApplyOutcome::Skipped(format!("'{}' is a file, not a folder", path));
                }
                None => break,
            }
        }

        let mut current_path = String::new();
        let mut level = &mut self.roots;
        for segment in parents {
            push_segment(&mut current_path, segment);
            let index = match level.iter().position(|n| n.name() == *segment) {
                Some(index) => index,
                None => {
                    level.push(FileTreeNode::folder(segment, current_path.clone()));
                    level.len() - 1
                }
            };
            level = match &mut level[index] {
                FileTreeNode::Folder { children, .. } => children,
                FileTreeNode::File { path, .. } => {
                    return ApplyOutcome::Skipped(format!("'{}' is a file, not a folder", path));
                }
            };
        }

        push_segment(&mut current_path, last);
        let Some(index) = level.iter().position(|n| n.name() == *last) else {
            level.push(match content {
                Some(content) => FileTreeNode::File {
                    name: last.to_string(),
                    path: current_path,
                    content: content.to_string(),
                },
                None => FileTreeNode::folder(last, current_path),
            });
            return ApplyOutcome::Created;
        };

        match (&mut level[index], content) {
            (FileTreeNode::File { content: old, .. }, Some(content)) => {
                if old.as_str() == content {
                    ApplyOutcome::Unchanged
                } else {
                    *old = content.to_string();
                    ApplyOutcome::Updated
                }
            }
            (FileTreeNode::Folder { .. }, None) => ApplyOutcome::Unchanged,
            (FileTreeNode::Folder { .. }, Some(_)) => {
                ApplyOutcome::Skipped(format!("'{}' is a folder, not a file", current_path))
            }
            (FileTreeNode::File { .. }, None) => {
                ApplyOutcome::Skipped(format!("'{}' is a file, not a folder", current_path))
            }
        }
    }

    pub fn roots(&self) -> &[FileTreeNode] {
        &self.roots
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Look up a node by path; empty segments are ignored like in `apply`
    pub fn find(&self, path: &str) -> Option<&FileTreeNode> {
        let mut level: &[FileTreeNode] = &self.roots;
        let mut found = None;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            let node = level.iter().find(|n| n.name() == segment)?;
            level = node.children();
            found = Some(node);
        }
        found
    }

    /// Paths of every file, depth-first in insertion order
    pub fn file_paths(&self) -> Vec<String> {
        fn walk(nodes: &[FileTreeNode], out: &mut Vec<String>) {
            for node in nodes {
                match node {
                    FileTreeNode::File { path, .. } => out.push(path.clone()),
                    FileTreeNode::Folder { children, .. } => walk(children, out),
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.roots, &mut out);
        out
    }

    /// Total number of files and folders
    pub fn node_count(&self) -> usize {
        fn count(nodes: &[FileTreeNode]) -> usize {
            nodes.iter().map(|n| 1 + count(n.children())).sum()
        }
        count(&self.roots)
    }

    /// Project the tree into the nested structure a sandbox mounts.
    pub fn to_mount_snapshot(&self) -> MountSnapshot {
        MountSnapshot(project(&self.roots))
    }
}

fn push_segment(path: &mut String, segment: &str) {
    if !path.is_empty() {
        path.push('/');
    }
    path.push_str(segment);
}

fn project(nodes: &[FileTreeNode]) -> BTreeMap<String, MountEntry> {
    nodes
        .iter()
        .map(|node| {
            let entry = match node {
                FileTreeNode::File { content, .. } => MountEntry::File {
                    contents: content.clone(),
                },
                FileTreeNode::Folder { children, .. } => MountEntry::Directory(project(children)),
            };
            (node.name().to_string(), entry)
        })
        .collect()
}

/// One entry of a mount snapshot.
///
/// Serializes as `{"file": {"contents": ...}}` or `{"directory": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountEntry {
    File { contents: String },
    Directory(BTreeMap<String, MountEntry>),
}

/// Owned, read-only copy of the tree in the sandbox's mount format
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MountSnapshot(pub BTreeMap<String, MountEntry>);

impl MountSnapshot {
    pub fn entries(&self) -> &BTreeMap<String, MountEntry> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of entries at every depth
    pub fn entry_count(&self) -> usize {
        fn count(entries: &BTreeMap<String, MountEntry>) -> usize {
            entries
                .values()
                .map(|e| match e {
                    MountEntry::File { .. } => 1,
                    MountEntry::Directory(children) => 1 + count(children),
                })
                .sum()
        }
        count(&self.0)
    }

    /// Every file as `(relative path, contents)`, sorted by path
    pub fn files(&self) -> Vec<(String, &str)> {
        fn walk<'a>(
            prefix: &str,
            entries: &'a BTreeMap<String, MountEntry>,
            out: &mut Vec<(String, &'a str)>,
        ) {
            for (name, entry) in entries {
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{}/{}", prefix, name)
                };
                match entry {
                    MountEntry::File { contents } => out.push((path, contents)),
                    MountEntry::Directory(children) => walk(&path, children, out),
                }
            }
        }

        let mut out = Vec::new();
        walk("", &self.0, &mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(steps: &[Step]) -> FileTree {
        steps.iter().fold(FileTree::new(), |tree, step| tree.apply(step))
    }

    /// Sibling names unique, every path equals ancestors joined by '/'.
    fn assert_invariants(tree: &FileTree) {
        fn check(nodes: &[FileTreeNode], parent: &str) {
            let mut names: Vec<&str> = nodes.iter().map(FileTreeNode::name).collect();
            names.sort_unstable();
            let before = names.len();
            names.dedup();
            assert_eq!(before, names.len(), "duplicate sibling under '{}'", parent);

            for node in nodes {
                let expected = if parent.is_empty() {
                    node.name().to_string()
                } else {
                    format!("{}/{}", parent, node.name())
                };
                assert_eq!(node.path(), expected);
                check(node.children(), node.path());
            }
        }
        check(tree.roots(), "");
    }

    #[test]
    fn test_file_content_round_trips() {
        let content = "fn main() {\n    println!(\"<hi> & bye\");\n}";
        let tree = FileTree::new().apply(&Step::create_file("main.rs", content));
        assert_eq!(tree.find("main.rs").unwrap().content(), Some(content));
    }

    #[test]
    fn test_folder_then_file() {
        let tree = build(&[
            Step::create_folder("src"),
            Step::create_file("src/index.js", "console.log(1)"),
        ]);

        assert_eq!(tree.roots().len(), 1);
        let src = &tree.roots()[0];
        assert_eq!(src.name(), "src");
        assert!(src.is_folder());
        assert_eq!(src.children().len(), 1);
        assert_eq!(src.children()[0].name(), "index.js");
        assert_eq!(src.children()[0].path(), "src/index.js");
        assert_eq!(src.children()[0].content(), Some("console.log(1)"));
    }

    #[test]
    fn test_overwrite_keeps_single_node() {
        let (tree, first) = FileTree::new().apply_with_outcome(&Step::create_file("a.txt", "v1"));
        let (tree, second) = tree.apply_with_outcome(&Step::create_file("a.txt", "v2"));

        assert_eq!(first, ApplyOutcome::Created);
        assert_eq!(second, ApplyOutcome::Updated);
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.find("a.txt").unwrap().content(), Some("v2"));
    }

    #[test]
    fn test_same_content_is_unchanged() {
        let tree = FileTree::new().apply(&Step::create_file("a.txt", "v1"));
        let (_, outcome) = tree.apply_with_outcome(&Step::create_file("a.txt", "v1"));
        assert_eq!(outcome, ApplyOutcome::Unchanged);
    }

    #[test]
    fn test_create_folder_is_idempotent() {
        let step = Step::create_folder("src/components");
        let once = FileTree::new().apply(&step);
        let (twice, outcome) = once.clone().apply_with_outcome(&step);

        assert_eq!(once, twice);
        assert_eq!(outcome, ApplyOutcome::Unchanged);
        assert_eq!(twice.node_count(), 2);
    }

    #[test]
    fn test_intermediate_folders_are_created() {
        let tree = FileTree::new().apply(&Step::create_file("src/components/ui/Button.tsx", "x"));
        assert!(tree.find("src").unwrap().is_folder());
        assert!(tree.find("src/components/ui").unwrap().is_folder());
        assert_eq!(tree.node_count(), 4);
        assert_invariants(&tree);
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let tree = FileTree::new().apply(&Step::create_file("/src//main.ts/", "x"));
        assert_eq!(tree.file_paths(), vec!["src/main.ts"]);
    }

    #[test]
    fn test_degenerate_path_is_skipped() {
        let (tree, outcome) = FileTree::new().apply_with_outcome(&Step::create_file("", "x"));
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));
        assert!(tree.is_empty());

        let (tree, outcome) = tree.apply_with_outcome(&Step::create_folder("///"));
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));
        assert!(tree.is_empty());
    }

    #[test]
    fn test_dot_segments_are_skipped() {
        let steps = crate::step::parse(
            r#"<boltArtifact id="a" title="A"><boltAction type="file" filePath="../escaped.txt">pwned</boltAction></boltArtifact>"#,
        );
        let (tree, outcome) = FileTree::new().apply_with_outcome(&steps[0]);
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));
        assert!(tree.is_empty());

        for path in ["src/../../etc/passwd", "./a.txt", "src/.", "a\\..\\b.txt"] {
            let (tree, outcome) = FileTree::new().apply_with_outcome(&Step::create_file(path, "x"));
            assert!(matches!(outcome, ApplyOutcome::Skipped(_)), "{}", path);
            assert!(tree.is_empty(), "{}", path);
        }
        let (tree, _) = FileTree::new().apply_with_outcome(&Step::create_folder(".."));
        assert!(tree.is_empty());

        // Dots inside a name are fine
        let tree = FileTree::new().apply(&Step::create_file(".env.local", "x"));
        assert_eq!(tree.file_paths(), vec![".env.local"]);
    }

    #[test]
    fn test_commands_and_unknown_steps_leave_tree_alone() {
        let tree = FileTree::new().apply(&Step::create_file("a.txt", "a"));
        let before = tree.clone();

        let (tree, outcome) = tree.apply_with_outcome(&Step::run_command("npm install"));
        assert_eq!(outcome, ApplyOutcome::Ignored);
        let (tree, outcome) =
            tree.apply_with_outcome(&Step::other("frobnicate", None, "twiddle"));
        assert_eq!(outcome, ApplyOutcome::Ignored);

        assert_eq!(tree, before);
    }

    #[test]
    fn test_type_conflicts_are_skipped_without_mutation() {
        let tree = build(&[Step::create_file("a", "file"), Step::create_folder("dir")]);
        let before = tree.clone();

        let (tree, outcome) = tree.apply_with_outcome(&Step::create_file("a/b.txt", "x"));
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));
        let (tree, outcome) = tree.apply_with_outcome(&Step::create_file("dir", "x"));
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));
        let (tree, outcome) = tree.apply_with_outcome(&Step::create_folder("a"));
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));

        assert_eq!(tree, before);
    }

    #[test]
    fn test_conflict_deep_in_path_does_not_create_prefix_folders() {
        let tree = FileTree::new().apply(&Step::create_file("x/y", "file"));
        let (tree, outcome) = tree.apply_with_outcome(&Step::create_file("x/y/z/w.txt", "x"));
        assert!(matches!(outcome, ApplyOutcome::Skipped(_)));
        assert_eq!(tree.node_count(), 2);
    }

    #[test]
    fn test_children_keep_insertion_order() {
        let tree = build(&[
            Step::create_file("z.txt", ""),
            Step::create_file("a.txt", ""),
            Step::create_file("m/b.txt", ""),
            Step::create_file("m/a.txt", ""),
        ]);
        assert_eq!(tree.file_paths(), vec!["z.txt", "a.txt", "m/b.txt", "m/a.txt"]);
    }

    #[test]
    fn test_invariants_hold_after_mixed_sequence() {
        let tree = build(&[
            Step::create_folder("src"),
            Step::create_file("src/index.ts", "1"),
            Step::create_file("src/index.ts", "2"),
            Step::create_folder("src/lib"),
            Step::create_file("src/lib/util.ts", "u"),
            Step::create_file("src/lib", "conflict"),
            Step::create_folder("src"),
            Step::create_file("package.json", "{}"),
            Step::create_file("/src/lib/util.ts", "u2"),
        ]);

        assert_invariants(&tree);
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.find("src/lib/util.ts").unwrap().content(), Some("u2"));
    }

    #[test]
    fn test_apply_all_reports_change() {
        let steps = vec![Step::create_folder("src"), Step::run_command("ls")];
        let (tree, changed) = FileTree::new().apply_all(&steps);
        assert!(changed);

        let (_, changed) = tree.apply_all(&steps);
        assert!(!changed);
    }

    #[test]
    fn test_mount_snapshot_wire_shape() {
        let tree = build(&[
            Step::create_file("package.json", "{}"),
            Step::create_file("src/main.tsx", "render()"),
            Step::create_folder("public"),
        ]);
        let json = serde_json::to_value(tree.to_mount_snapshot()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "package.json": { "file": { "contents": "{}" } },
                "src": { "directory": { "main.tsx": { "file": { "contents": "render()" } } } },
                "public": { "directory": {} }
            })
        );
    }

    #[test]
    fn test_mount_snapshot_is_total() {
        let tree = build(&[
            Step::create_file("a/b/c/d/e.txt", "deep"),
            Step::create_file("a/x.txt", "x"),
            Step::create_folder("empty"),
            Step::create_file("root.txt", "r"),
        ]);
        let snapshot = tree.to_mount_snapshot();

        assert_eq!(snapshot.entry_count(), tree.node_count());

        let mut expected = tree.file_paths();
        expected.sort();
        let files: Vec<String> = snapshot.files().into_iter().map(|(p, _)| p).collect();
        assert_eq!(files, expected);

        let MountEntry::Directory(a) = &snapshot.entries()["a"] else {
            panic!("a should be a directory");
        };
        let MountEntry::Directory(b) = &a["b"] else {
            panic!("a/b should be a directory");
        };
        assert!(matches!(b["c"], MountEntry::Directory(_)));
    }
}
