//! In-test mock adapters and scripted agents shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use uuid::Uuid;

use agentflow_types::error::RepositoryError;
use agentflow_types::message::WorkflowMessage;
use agentflow_types::page::{Page, PageRequest};
use agentflow_types::workflow::{ExecutionStatus, JsonMap, WorkflowExecution, WorkflowRecord};

use crate::agent::{Agent, AgentCapabilities, AgentContext, AgentRegistry, AgentResult, BoxAgent};
use crate::coordination::state_store::{CoordinationError, ExecutionStateStore};
use crate::queue::{Delivery, ExecutionQueue, QueueError};
use crate::repository::WorkflowRepository;

pub fn json_map(value: Value) -> JsonMap {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn registry(agents: Vec<BoxAgent>) -> Arc<AgentRegistry> {
    Arc::new(AgentRegistry::new(agents))
}

/// Poll `cond` until it holds, panicking after five seconds.
pub async fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Succeeds with its config as outputs.
pub struct EchoAgent(&'static str);

impl EchoAgent {
    pub fn new(agent_type: &'static str) -> Self {
        Self(agent_type)
    }
}

impl Agent for EchoAgent {
    fn agent_type(&self) -> &str {
        self.0
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::new(self.0, "echoes its config")
    }

    async fn execute(&self, ctx: &AgentContext) -> AgentResult {
        AgentResult::success(ctx.config.clone(), Duration::ZERO)
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyAgent {
    agent_type: &'static str,
    failures: usize,
    calls: Arc<AtomicUsize>,
}

impl FlakyAgent {
    pub fn new(agent_type: &'static str, failures: usize) -> Self {
        Self {
            agent_type,
            failures,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Agent for FlakyAgent {
    fn agent_type(&self) -> &str {
        self.agent_type
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::new(self.agent_type, "fails a fixed number of times")
    }

    async fn execute(&self, _ctx: &AgentContext) -> AgentResult {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            AgentResult::failure(format!("attempt {call} failed"), Duration::ZERO)
        } else {
            let mut outputs = JsonMap::new();
            outputs.insert("attempts".to_string(), Value::from(call));
            AgentResult::success(outputs, Duration::ZERO)
        }
    }
}

pub struct PanicAgent;

impl Agent for PanicAgent {
    fn agent_type(&self) -> &str {
        "panic"
    }

    fn capabilities(&self) -> AgentCapabilities {
        AgentCapabilities::new("panic", "always panics")
    }

    async fn execute(&self, _ctx: &AgentContext) -> AgentResult {
        panic!("scripted panic")
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RepoState {
    workflows: Vec<WorkflowRecord>,
    executions: Vec<WorkflowExecution>,
    history: Vec<WorkflowExecution>,
}

/// Repository that keeps every saved execution snapshot.
#[derive(Default)]
pub struct MemoryRepo {
    state: Mutex<RepoState>,
    fail_saves: AtomicBool,
    fail_gets: AtomicBool,
}

impl MemoryRepo {
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn history(&self) -> Vec<WorkflowExecution> {
        self.lock().history.clone()
    }

    pub fn execution(&self, id: &Uuid) -> Option<WorkflowExecution> {
        self.lock().executions.iter().find(|e| e.id == *id).cloned()
    }

    pub fn workflow_count(&self) -> usize {
        self.lock().workflows.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RepoState> {
        self.state.lock().unwrap()
    }

    fn check_gets(&self) -> Result<(), RepositoryError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("injected read failure".to_string()));
        }
        Ok(())
    }
}

fn newest_first<T: Clone>(items: Vec<&T>, page: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let slice = items
        .into_iter()
        .rev()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect();
    Page::new(slice, page, total)
}

impl WorkflowRepository for MemoryRepo {
    async fn save_workflow(&self, workflow: &WorkflowRecord) -> Result<(), RepositoryError> {
        let mut state = self.lock();
        if state
            .workflows
            .iter()
            .any(|w| w.name == workflow.name && w.version == workflow.version)
        {
            return Err(RepositoryError::Conflict("name and version taken".to_string()));
        }
        state.workflows.push(workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<WorkflowRecord>, RepositoryError> {
        self.check_gets()?;
        Ok(self.lock().workflows.iter().find(|w| w.id == *id).cloned())
    }

    async fn find_workflow_by_name_and_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<WorkflowRecord>, RepositoryError> {
        Ok(self
            .lock()
            .workflows
            .iter()
            .find(|w| w.name == name && w.version == version)
            .cloned())
    }

    async fn list_workflows(&self, page: PageRequest) -> Result<Page<WorkflowRecord>, RepositoryError> {
        let state = self.lock();
        Ok(newest_first(state.workflows.iter().collect(), page))
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.lock();
        let before = state.workflows.len();
        state.workflows.retain(|w| w.id != *id);
        state.executions.retain(|e| e.workflow_id != *id);
        Ok(state.workflows.len() != before)
    }

    async fn save_execution(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("injected write failure".to_string()));
        }
        let mut state = self.lock();
        match state.executions.iter_mut().find(|e| e.id == execution.id) {
            Some(existing) => *existing = execution.clone(),
            None => state.executions.push(execution.clone()),
        }
        state.history.push(execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<WorkflowExecution>, RepositoryError> {
        self.check_gets()?;
        Ok(self.execution(id))
    }

    async fn list_executions(
        &self,
        workflow_id: &Uuid,
        page: PageRequest,
    ) -> Result<Page<WorkflowExecution>, RepositoryError> {
        let state = self.lock();
        let matching = state
            .executions
            .iter()
            .filter(|e| e.workflow_id == *workflow_id)
            .collect();
        Ok(newest_first(matching, page))
    }

    async fn list_executions_by_status(
        &self,
        status: ExecutionStatus,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        Ok(self
            .lock()
            .executions
            .iter()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// State store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail_sets: AtomicBool,
}

impl MemoryStateStore {
    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    pub fn len_with_prefix(&self, prefix: &str) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, (_, exp))| k.starts_with(prefix) && *exp > now)
            .count()
    }
}

impl ExecutionStateStore for MemoryStateStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CoordinationError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        if entries.get(key).is_some_and(|(_, exp)| *exp > now) {
            return Ok(false);
        }
        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), CoordinationError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<i64, CoordinationError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap();
        let current = entries
            .get(key)
            .filter(|(_, exp)| *exp > now)
            .and_then(|(v, _)| v.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + 1;
        entries.insert(key.to_string(), (next.to_string(), now + ttl));
        Ok(next)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinationError> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(CoordinationError::Store("injected failure".to_string()));
        }
        let expires = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), (value.to_string(), expires));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .unwrap()
            .get(key)
            .filter(|(_, exp)| *exp > now)
            .map(|(v, _)| v.clone()))
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkflowMessage>,
    published: Vec<WorkflowMessage>,
    dead_letters: Vec<WorkflowMessage>,
    acked: Vec<String>,
}

/// Single-partition queue that records everything published and acked.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    fail_enqueues: AtomicBool,
}

impl MemoryQueue {
    pub fn fail_enqueues(&self, fail: bool) {
        self.fail_enqueues.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<WorkflowMessage> {
        self.state.lock().unwrap().published.clone()
    }

    pub fn dead_letters(&self) -> Vec<WorkflowMessage> {
        self.state.lock().unwrap().dead_letters.clone()
    }

    pub fn acked(&self) -> Vec<String> {
        self.state.lock().unwrap().acked.clone()
    }
}

impl ExecutionQueue for MemoryQueue {
    async fn enqueue(&self, message: &WorkflowMessage) -> Result<(), QueueError> {
        if self.fail_enqueues.load(Ordering::SeqCst) {
            return Err(QueueError::Storage("injected failure".to_string()));
        }
        let mut state = self.state.lock().unwrap();
        state.pending.push_back(message.clone());
        state.published.push(message.clone());
        Ok(())
    }

    async fn dead_letter(&self, message: &WorkflowMessage) -> Result<(), QueueError> {
        self.state.lock().unwrap().dead_letters.push(message.clone());
        Ok(())
    }

    async fn next_delivery(&self, _partition: Option<u32>) -> Result<Option<Delivery>, QueueError> {
        let message = self.state.lock().unwrap().pending.pop_front();
        Ok(message.map(|message| Delivery {
            receipt: Uuid::now_v7().to_string(),
            partition: 0,
            delivery_count: 1,
            message,
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.state.lock().unwrap().acked.push(delivery.receipt.clone());
        Ok(())
    }

    fn partitions(&self) -> u32 {
        1
    }
}
