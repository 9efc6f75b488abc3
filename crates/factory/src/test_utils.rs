use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::agents::{output, Agent, AgentContext, AgentError, AgentRegistry, Department};
use crate::sandbox::process::announced_url;
use crate::sandbox::{
    BrowserSandbox, Capabilities, CapabilityClass, CapabilityHandle, FileTree, PreviewOutput,
    ProcessSandbox, SandboxError, ScriptOutput,
};
use crate::state::{EventBus, InMemoryEventStore, InMemoryWorkflowStore};
use crate::workflow::engine::Engine;
use crate::workflow::types::{DataMap, TaskState};

pub(crate) const TEST_WORKFLOW: &str = "w-test";

/// Shared record of which tasks ran, in order
#[derive(Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) async fn record(&self, task_id: &str) {
        self.0.lock().await.push(task_id.to_string());
    }

    pub(crate) async fn entries(&self) -> Vec<String> {
        self.0.lock().await.clone()
    }
}

pub(crate) fn task_state(department: &str, description: &str, input: Value) -> TaskState {
    TaskState {
        id: "t1".to_string(),
        department: department.to_string(),
        description: description.to_string(),
        status: Default::default(),
        input_data: serde_json::from_value(input).unwrap_or_default(),
        output_data: DataMap::new(),
        started_at: None,
        completed_at: None,
    }
}

pub(crate) fn memory_bus() -> EventBus {
    EventBus::new(Arc::new(InMemoryEventStore::new()), 64)
}

pub(crate) fn context_with(agent_name: &str, capability: CapabilityHandle) -> (AgentContext, EventBus) {
    let events = memory_bus();
    let ctx = AgentContext::new(TEST_WORKFLOW, "t1", agent_name, capability, events.clone());
    (ctx, events)
}

pub(crate) fn context_for(agent_name: &str) -> (AgentContext, EventBus) {
    context_with(agent_name, fake_capabilities().handle(CapabilityClass::ProcessSandbox))
}

pub(crate) fn fake_capabilities() -> Capabilities {
    Capabilities::new(
        Arc::new(FakeProcessSandbox::replying("")),
        Arc::new(FakeBrowserSandbox::new("http://preview.test")),
    )
}

/// Process sandbox that echoes a canned stdout and records calls
pub(crate) struct FakeProcessSandbox {
    stdout: String,
    error: Mutex<Option<SandboxError>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeProcessSandbox {
    pub(crate) fn replying(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            error: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails the first call with `error`
    pub(crate) fn erroring(error: SandboxError) -> Self {
        Self {
            error: Mutex::new(Some(error)),
            ..Self::replying("")
        }
    }

    pub(crate) async fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl ProcessSandbox for FakeProcessSandbox {
    async fn run_script(&self, language: &str, script: &str) -> Result<ScriptOutput, SandboxError> {
        self.calls
            .lock()
            .await
            .push((language.to_string(), script.to_string()));
        if let Some(error) = self.error.lock().await.take() {
            return Err(error);
        }
        Ok(ScriptOutput {
            stdout: self.stdout.clone(),
            stderr: String::new(),
            exit_code: Some(0),
            artifacts: Vec::new(),
            url: announced_url(&self.stdout),
        })
    }
}

/// Browser sandbox that records served trees and numbers its sites
pub(crate) struct FakeBrowserSandbox {
    base_url: String,
    fail: bool,
    counter: AtomicUsize,
    served: Mutex<Vec<FileTree>>,
}

impl FakeBrowserSandbox {
    pub(crate) fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            fail: false,
            counter: AtomicUsize::new(0),
            served: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("http://preview.test")
        }
    }

    pub(crate) async fn served(&self) -> Vec<FileTree> {
        self.served.lock().await.clone()
    }
}

#[async_trait]
impl BrowserSandbox for FakeBrowserSandbox {
    async fn serve(&self, files: FileTree, _commands: Vec<String>) -> Result<PreviewOutput, SandboxError> {
        if self.fail {
            return Err(SandboxError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        let site = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let written = files.keys().cloned().collect();
        self.served.lock().await.push(files);
        Ok(PreviewOutput {
            url: format!("{}/site-{}/index.html", self.base_url, site),
            files: written,
        })
    }
}

enum Behaviour {
    Succeed(DataMap),
    Fail(String),
    Panic,
}

/// Agent with a fixed result that records the task state it was given
pub(crate) struct ScriptedAgent {
    name: String,
    behaviour: Behaviour,
    log_line: Option<String>,
    seen: Arc<Mutex<Vec<TaskState>>>,
    journal: Option<Journal>,
}

impl ScriptedAgent {
    fn with_behaviour(name: &str, behaviour: Behaviour) -> Self {
        Self {
            name: name.to_string(),
            behaviour,
            log_line: None,
            seen: Arc::new(Mutex::new(Vec::new())),
            journal: None,
        }
    }

    pub(crate) fn succeeding(name: &str, result: Value) -> Self {
        Self::with_behaviour(name, Behaviour::Succeed(output(result)))
    }

    pub(crate) fn failing(name: &str, error: &str) -> Self {
        Self::with_behaviour(name, Behaviour::Fail(error.to_string()))
    }

    pub(crate) fn panicking(name: &str) -> Self {
        Self::with_behaviour(name, Behaviour::Panic)
    }

    pub(crate) fn with_log(mut self, line: &str) -> Self {
        self.log_line = Some(line.to_string());
        self
    }

    pub(crate) fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Handle on the task states this agent has received
    pub(crate) fn seen(&self) -> Arc<Mutex<Vec<TaskState>>> {
        self.seen.clone()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &AgentContext, task: &TaskState) -> Result<DataMap, AgentError> {
        self.seen.lock().await.push(task.clone());
        if let Some(journal) = &self.journal {
            journal.record(&task.id).await;
        }
        if let Some(line) = &self.log_line {
            ctx.log(line.as_str()).await;
        }
        match &self.behaviour {
            Behaviour::Succeed(result) => Ok(result.clone()),
            Behaviour::Fail(error) => Err(AgentError::Failed(error.clone())),
            Behaviour::Panic => panic!("scripted panic in {}", self.name),
        }
    }
}

/// Engine over in-memory stores and fake sandboxes
pub(crate) struct EngineFixture {
    pub engine: Engine,
    pub store: Arc<InMemoryWorkflowStore>,
    pub events: EventBus,
}

pub(crate) fn engine_fixture(agents: Vec<(Department, Arc<dyn Agent>)>) -> EngineFixture {
    engine_fixture_with(agents, fake_capabilities())
}

pub(crate) fn engine_fixture_with(
    agents: Vec<(Department, Arc<dyn Agent>)>,
    capabilities: Capabilities,
) -> EngineFixture {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let events = memory_bus();
    let mut registry = AgentRegistry::new();
    for (department, agent) in agents {
        registry.register(department, agent);
    }
    let engine = Engine::new(store.clone(), events.clone(), registry, capabilities);
    EngineFixture {
        engine,
        store,
        events,
    }
}
