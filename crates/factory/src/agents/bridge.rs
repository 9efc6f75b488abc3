use async_trait::async_trait;
use serde_json::json;

use super::{input_str, output, Agent, AgentContext, AgentError};
use crate::sandbox::{CapabilityHandle, FileNode, FileTree};
use crate::workflow::types::{DataMap, TaskState};

/// Client-side glue that talks to the backend from the served frontend
pub fn bridge_js(backend_url: &str) -> String {
    format!(
        r#"
const BACKEND_URL = '{backend_url}';

export async function backendHealth() {{
  const res = await fetch(`${{BACKEND_URL}}/health`);
  if (!res.ok) throw new Error('Backend unreachable');
  const data = await res.json();
  document.getElementById('backend-response').innerText = JSON.stringify(data);
  return data;
}}

export function startHealthStream() {{
  const evt = new EventSource(`${{BACKEND_URL}}/health/stream`);
  evt.onmessage = (e) => {{
    document.getElementById('backend-response').innerText = e.data;
  }};
  evt.onerror = (err) => console.error('SSE error', err);
}}

export function setupHotReload() {{
  if (import.meta.hot) {{
    import.meta.hot.accept(() => window.location.reload());
  }}
}}
"#,
        backend_url = backend_url.replace('\'', "\\'")
    )
}

/// Links a served frontend to a running backend.
///
/// Needs `frontend_url` and `backend_url` in its input, normally injected from
/// the frontend and backend tasks it depends on.
pub struct BridgeAgent;

#[async_trait]
impl Agent for BridgeAgent {
    fn name(&self) -> &str {
        "BridgeAgent"
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        ctx.log(format!("Executing bridge task: {}", task.description)).await;

        let (Some(frontend_url), Some(backend_url)) =
            (input_str(task, "frontend_url"), input_str(task, "backend_url"))
        else {
            return Err(AgentError::MissingInput(
                "BridgeAgent requires 'frontend_url' and 'backend_url' in input_data".to_string(),
            ));
        };

        let script = bridge_js(backend_url);
        let mut out = output(json!({
            "message": "bridge.js generated linking frontend & backend",
            "frontend_url": frontend_url,
            "backend_url": backend_url,
            "artifacts": [script],
        }));

        // Publishing the file is best effort
        if let CapabilityHandle::Browser(sandbox) = ctx.capability() {
            let mut files = FileTree::new();
            files.insert("bridge.js".to_string(), FileNode::File(script.clone()));
            match sandbox.serve(files, Vec::new()).await {
                Ok(preview) => {
                    out.insert("bridge_url".to_string(), json!(preview.url));
                }
                Err(e) => {
                    ctx.log_at("warning", format!("Failed to write bridge.js via sandbox: {}", e))
                        .await;
                }
            }
        }

        ctx.log("Bridge task completed").await;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Capabilities, CapabilityClass};
    use crate::state::EventType;
    use crate::test_utils::{context_with, fake_capabilities, task_state, FakeBrowserSandbox};
    use std::sync::Arc;

    #[test]
    fn test_bridge_js_contents() {
        let js = bridge_js("http://api.local");
        assert!(js.contains("const BACKEND_URL = 'http://api.local';"));
        assert!(js.contains("export async function backendHealth()"));
        assert!(js.contains("new EventSource(`${BACKEND_URL}/health/stream`)"));
        assert!(js.contains("export function setupHotReload()"));
    }

    #[tokio::test]
    async fn test_requires_both_urls() {
        let (ctx, _) = context_with("BridgeAgent", fake_capabilities().handle(CapabilityClass::BrowserSandbox));
        let task = task_state("Bridge", "link", json!({"frontend_url": "http://ui"}));

        let err = BridgeAgent.run(&ctx, &task).await.unwrap_err();
        assert!(err.to_string().contains("'frontend_url' and 'backend_url'"));
    }

    #[tokio::test]
    async fn test_generates_and_publishes_bridge() {
        let browser = Arc::new(FakeBrowserSandbox::new("http://preview.local"));
        let caps = Capabilities::new(fake_capabilities().process, browser.clone());
        let (ctx, _) = context_with("BridgeAgent", caps.handle(CapabilityClass::BrowserSandbox));
        let task = task_state(
            "Bridge",
            "link",
            json!({"frontend_url": "http://ui", "backend_url": "http://api"}),
        );

        let out = BridgeAgent.run(&ctx, &task).await.unwrap();
        let artifacts = out.get("artifacts").and_then(|v| v.as_array()).unwrap();
        assert!(artifacts[0].as_str().unwrap().contains("'http://api'"));
        assert!(out.contains_key("bridge_url"));
        assert!(browser.served().await[0].contains_key("bridge.js"));
    }

    #[tokio::test]
    async fn test_write_failure_is_not_fatal() {
        let browser = Arc::new(FakeBrowserSandbox::failing());
        let caps = Capabilities::new(fake_capabilities().process, browser);
        let (ctx, events) = context_with("BridgeAgent", caps.handle(CapabilityClass::BrowserSandbox));
        let task = task_state(
            "Bridge",
            "link",
            json!({"frontend_url": "http://ui", "backend_url": "http://api"}),
        );

        let out = BridgeAgent.run(&ctx, &task).await.unwrap();
        assert!(!out.contains_key("bridge_url"));

        let warnings: Vec<_> = events
            .get_history(&ctx.workflow_id, Some(EventType::TaskProgress))
            .await
            .unwrap()
            .into_iter()
            .filter(|e| e.payload_str("level") == Some("warning"))
            .collect();
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_process_capability_skips_publishing() {
        let (ctx, _) = context_with("BridgeAgent", fake_capabilities().handle(CapabilityClass::ProcessSandbox));
        let task = task_state(
            "Bridge",
            "link",
            json!({"frontend_url": "http://ui", "backend_url": "http://api"}),
        );

        let out = BridgeAgent.run(&ctx, &task).await.unwrap();
        assert_eq!(out.get("message"), Some(&json!("bridge.js generated linking frontend & backend")));
        assert!(!out.contains_key("bridge_url"));
    }
}
