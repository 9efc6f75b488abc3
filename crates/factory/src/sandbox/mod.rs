//! Execution capabilities
//!
//! Two families exist: a process sandbox that runs scripts and a browser
//! sandbox that serves a file tree and hands back a preview URL. Agents only
//! ever see them through a [`CapabilityHandle`].

pub mod browser;
pub mod policy;
pub mod process;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use browser::StaticSiteSandbox;
pub use policy::{choose_capability, Requirements};
pub use process::LocalProcessSandbox;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("Script timed out after {0}s")]
    Timeout(u64),
    #[error("Script exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
    #[error("Invalid file tree: {0}")]
    InvalidFileTree(String),
}

/// Which capability family a task runs against
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum CapabilityClass {
    #[serde(alias = "e2b")]
    ProcessSandbox,
    #[serde(alias = "webcontainer")]
    BrowserSandbox,
}

impl CapabilityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapabilityClass::ProcessSandbox => "process-sandbox",
            CapabilityClass::BrowserSandbox => "browser-sandbox",
        }
    }
}

impl fmt::Display for CapabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CapabilityClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process-sandbox" | "process_sandbox" | "process" | "e2b" => {
                Ok(CapabilityClass::ProcessSandbox)
            }
            "browser-sandbox" | "browser_sandbox" | "browser" | "webcontainer" => {
                Ok(CapabilityClass::BrowserSandbox)
            }
            other => Err(format!("Unknown sandbox type: {}", other)),
        }
    }
}

/// Result of running a script in a process sandbox
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub artifacts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A served file tree
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviewOutput {
    pub url: String,
    /// Relative paths written, in traversal order
    pub files: Vec<String>,
}

/// Nested file tree: strings are file contents, maps are directories
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FileNode {
    File(String),
    Directory(FileTree),
}

pub type FileTree = BTreeMap<String, FileNode>;

#[async_trait]
pub trait ProcessSandbox: Send + Sync {
    async fn run_script(&self, language: &str, script: &str) -> Result<ScriptOutput, SandboxError>;
}

#[async_trait]
pub trait BrowserSandbox: Send + Sync {
    /// Write `files` and make them reachable. `commands` are setup steps the
    /// backend may run before serving; backends without a runtime ignore them.
    async fn serve(&self, files: FileTree, commands: Vec<String>) -> Result<PreviewOutput, SandboxError>;
}

/// The capability instance resolved for one task
#[derive(Clone)]
pub enum CapabilityHandle {
    Process(Arc<dyn ProcessSandbox>),
    Browser(Arc<dyn BrowserSandbox>),
}

impl CapabilityHandle {
    pub fn class(&self) -> CapabilityClass {
        match self {
            CapabilityHandle::Process(_) => CapabilityClass::ProcessSandbox,
            CapabilityHandle::Browser(_) => CapabilityClass::BrowserSandbox,
        }
    }

    pub fn as_process(&self) -> Option<&Arc<dyn ProcessSandbox>> {
        match self {
            CapabilityHandle::Process(sandbox) => Some(sandbox),
            CapabilityHandle::Browser(_) => None,
        }
    }

    pub fn as_browser(&self) -> Option<&Arc<dyn BrowserSandbox>> {
        match self {
            CapabilityHandle::Browser(sandbox) => Some(sandbox),
            CapabilityHandle::Process(_) => None,
        }
    }
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityHandle({})", self.class())
    }
}

/// One instance of each capability family, held by the engine
#[derive(Clone)]
pub struct Capabilities {
    pub process: Arc<dyn ProcessSandbox>,
    pub browser: Arc<dyn BrowserSandbox>,
}

impl Capabilities {
    pub fn new(process: Arc<dyn ProcessSandbox>, browser: Arc<dyn BrowserSandbox>) -> Self {
        Self { process, browser }
    }

    pub fn from_config(config: &crate::config::FactoryConfig) -> Self {
        Self {
            process: Arc::new(LocalProcessSandbox::new(config.process_sandbox.clone())),
            browser: Arc::new(StaticSiteSandbox::new(config.browser_sandbox.clone())),
        }
    }

    pub fn handle(&self, class: CapabilityClass) -> CapabilityHandle {
        match class {
            CapabilityClass::ProcessSandbox => CapabilityHandle::Process(self.process.clone()),
            CapabilityClass::BrowserSandbox => CapabilityHandle::Browser(self.browser.clone()),
        }
    }
}
