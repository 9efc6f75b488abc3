//! Capability selection policy

use serde::{Deserialize, Serialize};

use super::CapabilityClass;
use crate::workflow::types::DataMap;

/// What a task needs from its execution environment
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Requirements {
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub requires_ui_feedback: bool,
    #[serde(default)]
    pub requires_offline: bool,
    #[serde(default)]
    pub is_data_sensitive: bool,
}

impl Requirements {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Default::default()
        }
    }

    /// Read requirements from task input. Returns `None` without a `language` key.
    pub fn from_input(input: &DataMap) -> Option<Self> {
        let language = input.get("language")?.as_str()?.to_string();
        let flag = |key: &str| input.get(key).and_then(|v| v.as_bool()).unwrap_or(false);
        Some(Self {
            language,
            requires_ui_feedback: flag("requires_ui_feedback"),
            requires_offline: flag("requires_offline"),
            is_data_sensitive: flag("is_data_sensitive"),
        })
    }
}

/// First match wins. Sensitive data is checked before UI feedback so it never
/// reaches the browser sandbox.
pub fn choose_capability(req: &Requirements) -> CapabilityClass {
    let language = req.language.trim().to_ascii_lowercase();

    if matches!(language.as_str(), "python" | "bash") {
        return CapabilityClass::ProcessSandbox;
    }
    if req.is_data_sensitive {
        return CapabilityClass::ProcessSandbox;
    }
    if req.requires_ui_feedback {
        return CapabilityClass::BrowserSandbox;
    }
    if req.requires_offline {
        return CapabilityClass::BrowserSandbox;
    }
    if matches!(language.as_str(), "node" | "javascript") {
        return CapabilityClass::BrowserSandbox;
    }
    CapabilityClass::ProcessSandbox
}
