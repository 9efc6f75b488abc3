use async_trait::async_trait;
use serde_json::json;

use super::{output, Agent, AgentContext, AgentError};
use crate::sandbox::{FileNode, FileTree};
use crate::workflow::types::{DataMap, TaskState};

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Page with a slot for backend responses, wired to `bridge.js`
pub fn index_html(title: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <title>Task</title>
  </head>
  <body>
    <h1>{}</h1>
    <div id="backend-response"></div>
    <script type="module" src="bridge.js"></script>
  </body>
</html>"#,
        escape_html(title)
    )
}

/// Builds a page for the task and serves it from the browser sandbox
pub struct FrontendDeveloperAgent;

#[async_trait]
impl Agent for FrontendDeveloperAgent {
    fn name(&self) -> &str {
        "FrontendDeveloperAgent"
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        let sandbox = ctx.browser()?;

        let mut files = FileTree::new();
        files.insert("index.html".to_string(), FileNode::File(index_html(&task.description)));

        ctx.log("Serving file tree from browser sandbox").await;
        let preview = sandbox.serve(files, vec!["serve".to_string()]).await?;
        ctx.log(format!("Preview available at {}", preview.url)).await;

        Ok(output(json!({
            "message": format!("Task '{}' executed. URL: {}", task.description, preview.url),
            "url": preview.url,
            "files": preview.files,
            "artifacts": [preview.url],
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::{Capabilities, CapabilityClass};
    use crate::test_utils::{context_with, fake_capabilities, task_state, FakeBrowserSandbox};
    use std::sync::Arc;

    #[test]
    fn test_index_html_escapes_title() {
        let html = index_html("<Dashboard> & stats");
        assert!(html.contains("<h1>&lt;Dashboard&gt; &amp; stats</h1>"));
        assert!(html.contains(r#"<div id="backend-response"></div>"#));
        assert!(html.contains(r#"src="bridge.js""#));
    }

    #[tokio::test]
    async fn test_serves_page_and_returns_url() {
        let browser = Arc::new(FakeBrowserSandbox::new("http://preview.local"));
        let caps = Capabilities::new(fake_capabilities().process, browser.clone());
        let (ctx, _) = context_with("FrontendDeveloperAgent", caps.handle(CapabilityClass::BrowserSandbox));
        let task = task_state("FrontendDevelopment", "Build dashboard", json!({}));

        let out = FrontendDeveloperAgent.run(&ctx, &task).await.unwrap();
        let url = out.get("url").and_then(|v| v.as_str()).unwrap();
        assert!(url.starts_with("http://preview.local/"));
        assert_eq!(out.get("artifacts"), Some(&json!([url])));

        let served = browser.served().await;
        assert_eq!(served.len(), 1);
        assert!(served[0].contains_key("index.html"));
    }

    #[tokio::test]
    async fn test_needs_browser_capability() {
        let (ctx, _) = context_with(
            "FrontendDeveloperAgent",
            fake_capabilities().handle(CapabilityClass::ProcessSandbox),
        );
        let task = task_state("FrontendDevelopment", "Build dashboard", json!({}));
        assert!(matches!(
            FrontendDeveloperAgent.run(&ctx, &task).await,
            Err(AgentError::CapabilityMismatch { .. })
        ));
    }
}
