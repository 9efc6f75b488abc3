//! Static-site browser sandbox
//!
//! Writes the file tree under `root_dir/<run id>/` for a static file server
//! rooted at `root_dir` and answering on `base_url`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use super::{BrowserSandbox, FileNode, FileTree, PreviewOutput, SandboxError};
use crate::config::BrowserSandboxConfig;

pub struct StaticSiteSandbox {
    config: BrowserSandboxConfig,
}

impl StaticSiteSandbox {
    pub fn new(config: BrowserSandboxConfig) -> Self {
        Self { config }
    }

    fn preview_url(&self, run_id: &str, has_index: bool) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        if has_index {
            format!("{}/{}/index.html", base, run_id)
        } else {
            format!("{}/{}/", base, run_id)
        }
    }
}

/// Reject names that would escape the run directory
fn checked_name(name: &str) -> Result<&Path, SandboxError> {
    let path = Path::new(name);
    let safe = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(path)
    } else {
        Err(SandboxError::InvalidFileTree(format!("illegal path: {:?}", name)))
    }
}

/// Flatten the tree into (relative path, contents) pairs: a directory's own
/// files in key order, then its subdirectories
fn flatten(tree: &FileTree) -> Result<Vec<(PathBuf, &str)>, SandboxError> {
    let mut files = Vec::new();
    let mut stack: Vec<(PathBuf, &FileTree)> = vec![(PathBuf::new(), tree)];

    while let Some((prefix, dir)) = stack.pop() {
        let mut subdirs = Vec::new();
        for (name, node) in dir {
            let path = prefix.join(checked_name(name)?);
            match node {
                FileNode::File(contents) => files.push((path, contents.as_str())),
                FileNode::Directory(children) => subdirs.push((path, children)),
            }
        }
        // Reverse so the first subdirectory is popped first
        stack.extend(subdirs.into_iter().rev());
    }

    Ok(files)
}

#[async_trait]
impl BrowserSandbox for StaticSiteSandbox {
    async fn serve(&self, files: FileTree, commands: Vec<String>) -> Result<PreviewOutput, SandboxError> {
        let entries = flatten(&files)?;
        let run_id = Uuid::new_v4().to_string();
        let run_dir = self.config.root_dir.join(&run_id);
        tokio::fs::create_dir_all(&run_dir).await?;

        let mut written = Vec::with_capacity(entries.len());
        for (relative, contents) in entries {
            let target = run_dir.join(&relative);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, contents).await?;
            written.push(relative.to_string_lossy().replace('\\', "/"));
        }

        if !commands.is_empty() {
            tracing::debug!(
                "[SANDBOX] Static site sandbox has no runtime, skipping {} setup command(s)",
                commands.len()
            );
        }

        let has_index = written.iter().any(|p| p == "index.html");
        Ok(PreviewOutput {
            url: self.preview_url(&run_id, has_index),
            files: written,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sandbox(root: &Path) -> StaticSiteSandbox {
        StaticSiteSandbox::new(BrowserSandboxConfig {
            root_dir: root.to_path_buf(),
            base_url: "http://preview.local/".to_string(),
        })
    }

    #[tokio::test]
    async fn test_serve_writes_nested_tree() {
        let root = tempfile::tempdir().unwrap();
        let tree: FileTree = serde_json::from_value(json!({
            "index.html": "<h1>hi</h1>",
            "assets": { "app.js": "console.log(1)", "css": { "site.css": "body{}" } }
        }))
        .unwrap();

        let preview = sandbox(root.path()).serve(tree, vec!["npm install".into()]).await.unwrap();

        assert!(preview.url.starts_with("http://preview.local/"));
        assert!(preview.url.ends_with("/index.html"));
        assert_eq!(
            preview.files,
            vec!["index.html", "assets/app.js", "assets/css/site.css"]
        );

        let run_id = preview.url.split('/').nth(3).unwrap();
        let written = std::fs::read_to_string(root.path().join(run_id).join("assets/css/site.css")).unwrap();
        assert_eq!(written, "body{}");
    }

    #[tokio::test]
    async fn test_serve_without_index_points_at_directory() {
        let root = tempfile::tempdir().unwrap();
        let mut tree = FileTree::new();
        tree.insert("bridge.js".into(), FileNode::File("//".into()));

        let preview = sandbox(root.path()).serve(tree, Vec::new()).await.unwrap();
        assert!(preview.url.ends_with('/'));
    }

    #[tokio::test]
    async fn test_serve_rejects_escaping_paths() {
        let root = tempfile::tempdir().unwrap();
        let mut tree = FileTree::new();
        tree.insert("../evil.sh".into(), FileNode::File("rm -rf /".into()));

        let err = sandbox(root.path()).serve(tree, Vec::new()).await.unwrap_err();
        assert!(matches!(err, SandboxError::InvalidFileTree(_)));
    }
}
