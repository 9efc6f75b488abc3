//! Local process sandbox
//!
//! Each run gets its own scratch directory under the configured work dir. The
//! script is written there and executed with the matching interpreter, bounded
//! by the configured timeout.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::{ProcessSandbox, SandboxError, ScriptOutput};
use crate::config::ProcessSandboxConfig;

pub struct LocalProcessSandbox {
    config: ProcessSandboxConfig,
}

impl LocalProcessSandbox {
    pub fn new(config: ProcessSandboxConfig) -> Self {
        Self { config }
    }

    fn interpreter(&self, language: &str) -> Result<(&str, &'static str), SandboxError> {
        match language.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok((self.config.python_bin.as_str(), "py")),
            "node" | "javascript" | "js" => Ok((self.config.node_bin.as_str(), "js")),
            "bash" | "sh" | "shell" => Ok((self.config.bash_bin.as_str(), "sh")),
            other => Err(SandboxError::UnsupportedLanguage(other.to_string())),
        }
    }

    fn scratch_root(&self) -> PathBuf {
        self.config
            .work_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

/// Files the script left behind, excluding the script itself
async fn collect_artifacts(dir: &Path, script_name: &str) -> Result<Vec<String>, SandboxError> {
    let mut artifacts = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name() == script_name {
            continue;
        }
        if entry.file_type().await?.is_file() {
            artifacts.push(entry.path().to_string_lossy().to_string());
        }
    }
    artifacts.sort();
    Ok(artifacts)
}

/// First stdout line that is a bare http(s) URL
pub(crate) fn announced_url(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .find(|line| {
            (line.starts_with("http://") || line.starts_with("https://"))
                && !line.contains(char::is_whitespace)
        })
        .map(String::from)
}

async fn remove_run_dir(run_dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(run_dir).await {
        tracing::warn!("[SANDBOX] Failed to remove {}: {}", run_dir.display(), e);
    }
}

impl LocalProcessSandbox {
    async fn run_in(
        &self,
        run_dir: &Path,
        program: &str,
        script_name: &str,
        script: &str,
    ) -> Result<std::process::Output, SandboxError> {
        let script_path = run_dir.join(script_name);
        tokio::fs::write(&script_path, script).await?;

        let timeout_secs = self.config.timeout_secs;
        let output = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            Command::new(program)
                .arg(&script_path)
                .current_dir(run_dir)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SandboxError::Timeout(timeout_secs))??;
        Ok(output)
    }
}

#[async_trait]
impl ProcessSandbox for LocalProcessSandbox {
    async fn run_script(&self, language: &str, script: &str) -> Result<ScriptOutput, SandboxError> {
        let (program, extension) = self.interpreter(language)?;

        let run_dir = self.scratch_root().join(format!("factory-run-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&run_dir).await?;
        let script_name = format!("script.{}", extension);

        tracing::debug!(
            "[SANDBOX] Running {} script in {} with {}",
            language,
            run_dir.display(),
            program
        );

        // Every error path below leaves no scratch directory behind
        let output = match self.run_in(&run_dir, program, &script_name, script).await {
            Ok(output) => output,
            Err(e) => {
                remove_run_dir(&run_dir).await;
                return Err(e);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            remove_run_dir(&run_dir).await;
            return Err(SandboxError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }

        let artifacts = match collect_artifacts(&run_dir, &script_name).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                remove_run_dir(&run_dir).await;
                return Err(e);
            }
        };
        if artifacts.is_empty() {
            remove_run_dir(&run_dir).await;
        }

        Ok(ScriptOutput {
            url: announced_url(&stdout),
            stdout,
            stderr,
            exit_code: output.status.code(),
            artifacts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox(dir: &Path, timeout_secs: u64) -> LocalProcessSandbox {
        LocalProcessSandbox::new(ProcessSandboxConfig {
            timeout_secs,
            work_dir: Some(dir.to_path_buf()),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_bash_script_output_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let output = sandbox(dir.path(), 10)
            .run_script("bash", "echo hello\necho http://localhost:9000\necho data > result.txt\n")
            .await
            .unwrap();

        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.starts_with("hello"));
        assert_eq!(output.url.as_deref(), Some("http://localhost:9000"));
        assert_eq!(output.artifacts.len(), 1);
        assert!(output.artifacts[0].ends_with("result.txt"));
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(dir.path(), 10)
            .run_script("bash", "echo broken >&2\nexit 3\n")
            .await
            .unwrap_err();

        match err {
            SandboxError::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert!(stderr.contains("broken"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(dir.path(), 1)
            .run_script("bash", "sleep 5\n")
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(1)));
    }

    fn leftover_run_dirs(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("factory-run-"))
            })
            .collect()
    }

    #[tokio::test]
    async fn test_failed_runs_leave_no_scratch_dirs() {
        let dir = tempfile::tempdir().unwrap();

        let err = sandbox(dir.path(), 1).run_script("bash", "sleep 5\n").await.unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(1)));
        assert!(leftover_run_dirs(dir.path()).is_empty());

        let missing = LocalProcessSandbox::new(ProcessSandboxConfig {
            bash_bin: "/definitely/missing/bash".to_string(),
            work_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        let err = missing.run_script("bash", "echo hi\n").await.unwrap_err();
        assert!(matches!(err, SandboxError::Io(_)));
        assert!(leftover_run_dirs(dir.path()).is_empty());

        let err = sandbox(dir.path(), 10).run_script("bash", "exit 2\n").await.unwrap_err();
        assert!(matches!(err, SandboxError::NonZeroExit { .. }));
        assert!(leftover_run_dirs(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_language() {
        let dir = tempfile::tempdir().unwrap();
        let err = sandbox(dir.path(), 1).run_script("cobol", "DISPLAY 'HI'").await.unwrap_err();
        assert!(matches!(err, SandboxError::UnsupportedLanguage(_)));
    }

    #[test]
    fn test_announced_url() {
        assert_eq!(announced_url("starting\n  https://api.local/x  \n"), Some("https://api.local/x".into()));
        assert_eq!(announced_url("listening on http://a b"), None);
    }
}
