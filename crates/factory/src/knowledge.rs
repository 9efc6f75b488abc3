//! Knowledge graph used by the Data department

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq)]
pub enum KnowledgeError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Unknown edge type: {0}")]
    UnknownEdgeType(String),
    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Concept,
    CodeSnippet,
    File,
    UserRequest,
    AgentAction,
    Error,
    PlanStep,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Concept => "CONCEPT",
            NodeType::CodeSnippet => "CODE_SNIPPET",
            NodeType::File => "FILE",
            NodeType::UserRequest => "USER_REQUEST",
            NodeType::AgentAction => "AGENT_ACTION",
            NodeType::Error => "ERROR",
            NodeType::PlanStep => "PLAN_STEP",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CONCEPT" => Ok(NodeType::Concept),
            "CODE_SNIPPET" => Ok(NodeType::CodeSnippet),
            "FILE" => Ok(NodeType::File),
            "USER_REQUEST" => Ok(NodeType::UserRequest),
            "AGENT_ACTION" => Ok(NodeType::AgentAction),
            "ERROR" => Ok(NodeType::Error),
            "PLAN_STEP" => Ok(NodeType::PlanStep),
            _ => Err(KnowledgeError::UnknownNodeType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeType {
    RelatesTo,
    DependsOn,
    Generates,
    Fixes,
    ConflictsWith,
    Clarifies,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::RelatesTo => "RELATES_TO",
            EdgeType::DependsOn => "DEPENDS_ON",
            EdgeType::Generates => "GENERATES",
            EdgeType::Fixes => "FIXES",
            EdgeType::ConflictsWith => "CONFLICTS_WITH",
            EdgeType::Clarifies => "CLARIFIES",
        }
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EdgeType {
    type Err = KnowledgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RELATES_TO" => Ok(EdgeType::RelatesTo),
            "DEPENDS_ON" => Ok(EdgeType::DependsOn),
            "GENERATES" => Ok(EdgeType::Generates),
            "FIXES" => Ok(EdgeType::Fixes),
            "CONFLICTS_WITH" => Ok(EdgeType::ConflictsWith),
            "CLARIFIES" => Ok(EdgeType::Clarifies),
            _ => Err(KnowledgeError::UnknownEdgeType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryNode {
    pub id: String,
    pub node_type: NodeType,
    pub content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn create_node(
        &self,
        node_type: NodeType,
        content: &str,
        task_id: Option<&str>,
    ) -> Result<MemoryNode, KnowledgeError>;

    /// Fails with `NodeNotFound` unless both endpoints exist
    async fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
    ) -> Result<MemoryEdge, KnowledgeError>;

    async fn get_node(&self, id: &str) -> Option<MemoryNode>;

    /// Edges leaving `node_id`
    async fn edges_from(&self, node_id: &str) -> Vec<MemoryEdge>;
}

#[derive(Default)]
pub struct InMemoryKnowledgeStore {
    nodes: RwLock<HashMap<String, MemoryNode>>,
    edges: RwLock<Vec<MemoryEdge>>,
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn create_node(
        &self,
        node_type: NodeType,
        content: &str,
        task_id: Option<&str>,
    ) -> Result<MemoryNode, KnowledgeError> {
        let node = MemoryNode {
            id: format!("memory_node:{}", Uuid::new_v4()),
            node_type,
            content: content.to_string(),
            metadata: HashMap::new(),
            task_id: task_id.map(String::from),
            created_at: Utc::now(),
        };
        self.nodes.write().await.insert(node.id.clone(), node.clone());
        Ok(node)
    }

    async fn create_edge(
        &self,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
    ) -> Result<MemoryEdge, KnowledgeError> {
        {
            let nodes = self.nodes.read().await;
            for id in [source_id, target_id] {
                if !nodes.contains_key(id) {
                    return Err(KnowledgeError::NodeNotFound(id.to_string()));
                }
            }
        }

        let edge = MemoryEdge {
            id: format!("{}:{}", edge_type.as_str().to_ascii_lowercase(), Uuid::new_v4()),
            source_id: source_id.to_string(),
            target_id: target_id.to_string(),
            edge_type,
            weight: 1.0,
            created_at: Utc::now(),
        };
        self.edges.write().await.push(edge.clone());
        Ok(edge)
    }

    async fn get_node(&self, id: &str) -> Option<MemoryNode> {
        self.nodes.read().await.get(id).cloned()
    }

    async fn edges_from(&self, node_id: &str) -> Vec<MemoryEdge> {
        self.edges
            .read()
            .await
            .iter()
            .filter(|e| e.source_id == node_id)
            .cloned()
            .collect()
    }
}
