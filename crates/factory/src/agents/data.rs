//! Knowledge graph writes
//!
//! The action is read from the task description: mentioning an edge creates an
//! edge, mentioning a node (or storing/recording something) creates a node.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{input_str, output, Agent, AgentContext, AgentError};
use crate::knowledge::{EdgeType, KnowledgeStore, NodeType};
use crate::workflow::types::{DataMap, TaskState};

const NODE_WORDS: [&str; 5] = ["node", "store", "save", "record", "remember"];

#[derive(Debug, PartialEq)]
enum DataAction {
    CreateNode,
    CreateEdge,
}

/// Whole-word match, tolerating a plural "s"
fn mentions(words: &[String], word: &str) -> bool {
    words
        .iter()
        .any(|w| w == word || w.strip_suffix('s') == Some(word))
}

fn action_for(description: &str) -> Option<DataAction> {
    let words: Vec<String> = description
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if mentions(&words, "edge") {
        Some(DataAction::CreateEdge)
    } else if NODE_WORDS.iter().any(|w| mentions(&words, w)) {
        Some(DataAction::CreateNode)
    } else {
        None
    }
}

pub struct DataAgent {
    knowledge: Arc<dyn KnowledgeStore>,
}

impl DataAgent {
    pub fn new(knowledge: Arc<dyn KnowledgeStore>) -> Self {
        Self { knowledge }
    }

    async fn create_node(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        let (Some(node_type), Some(content)) =
            (input_str(task, "node_type"), input_str(task, "content"))
        else {
            return Err(AgentError::MissingInput(
                "Missing 'node_type' or 'content' in input_data".to_string(),
            ));
        };

        let node_type: NodeType = node_type.parse()?;
        let node = self
            .knowledge
            .create_node(node_type, content, Some(task.id.as_str()))
            .await?;
        ctx.log(format!("Created {} node {}", node.node_type, node.id)).await;

        Ok(output(json!({
            "message": format!("Successfully created memory node {}", node.id),
            "node_id": node.id,
            "artifacts": [node.id],
        })))
    }

    async fn create_edge(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        let (Some(source), Some(target), Some(edge_type)) = (
            input_str(task, "source_id"),
            input_str(task, "target_id"),
            input_str(task, "edge_type"),
        ) else {
            return Err(AgentError::MissingInput(
                "Missing 'source_id', 'target_id' or 'edge_type' in input_data".to_string(),
            ));
        };

        let edge_type: EdgeType = edge_type.parse()?;
        let edge = self.knowledge.create_edge(source, target, edge_type).await?;
        ctx.log(format!("Linked {} -[{}]-> {}", source, edge.edge_type, target)).await;

        Ok(output(json!({
            "message": format!("Successfully created edge {}", edge.id),
            "edge_id": edge.id,
            "artifacts": [edge.id],
        })))
    }
}

#[async_trait]
impl Agent for DataAgent {
    fn name(&self) -> &str {
        "DataAgent"
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        ctx.log(format!("Executing task: {}", task.description)).await;

        match action_for(&task.description) {
            Some(DataAction::CreateNode) => self.create_node(ctx, task).await,
            Some(DataAction::CreateEdge) => self.create_edge(ctx, task).await,
            None => Err(AgentError::Unsupported {
                agent: self.name().to_string(),
                action: task.description.clone(),
            }),
        }
    }
}
