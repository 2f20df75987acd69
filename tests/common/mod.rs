//! Shared fixtures for integration tests: a scriptable provider client and
//! scheduler/plan builders.

#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use cascade_core::config::EngineConfig;
use cascade_core::models::{Plan, Step};
use cascade_core::providers::{ProviderClient, ProviderError, ProviderRegistry, ProviderRequest, ProviderResponse};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

type Reply = Result<ProviderResponse, ProviderError>;

/// Provider client whose replies are scripted per call or per unit id
///
/// Unscripted calls succeed with `"{provider}:{unit_id}"` as output.
pub struct MockProvider {
    name: String,
    script: Mutex<VecDeque<Reply>>,
    per_unit: Mutex<HashMap<String, VecDeque<Reply>>>,
    always_fail: Mutex<Option<ProviderError>>,
    panic_on: Mutex<Option<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Duration,
    available: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(VecDeque::new()),
            per_unit: Mutex::new(HashMap::new()),
            always_fail: Mutex::new(None),
            panic_on: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
            available: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replies consumed in call order, before per-unit scripts
    pub fn with_script(self, replies: Vec<Reply>) -> Self {
        *self.script.lock() = replies.into();
        self
    }

    /// Every call for `unit_id` fails with `error`
    pub fn failing_unit(self, unit_id: &str, error: ProviderError) -> Self {
        self.per_unit
            .lock()
            .insert(unit_id.to_string(), VecDeque::from(vec![Err(error); 16]));
        self
    }

    pub fn always_failing(self, error: ProviderError) -> Self {
        *self.always_fail.lock() = Some(error);
        self
    }

    pub fn panicking_on(self, unit_id: &str) -> Self {
        *self.panic_on.lock() = Some(unit_id.to_string());
        self
    }

    pub fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn recover(&self) {
        *self.always_fail.lock() = None;
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn calls_for(&self, unit_id: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.unit_id == unit_id).count()
    }

    pub fn unit_ids(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.unit_id.clone()).collect()
    }

    pub fn prompt_for(&self, unit_id: &str) -> Option<String> {
        self.requests
            .lock()
            .iter()
            .find(|r| r.unit_id == unit_id)
            .map(|r| r.prompt.clone())
    }

    pub fn estimate_for(&self, unit_id: &str) -> Option<u64> {
        self.requests
            .lock()
            .iter()
            .find(|r| r.unit_id == unit_id)
            .map(|r| r.estimated_tokens)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, request: &ProviderRequest) -> Reply {
        if let Some(error) = self.always_fail.lock().clone() {
            return Err(error);
        }
        if let Some(reply) = self.script.lock().pop_front() {
            return reply;
        }
        if let Some(reply) = self
            .per_unit
            .lock()
            .get_mut(&request.unit_id)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        Ok(ProviderResponse::new(format!("{}:{}", self.name, request.unit_id)).with_usage(100, 50, 0.01))
    }
}

#[async_trait]
impl ProviderClient for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().push(request.clone());
        if self.panic_on.lock().as_deref() == Some(request.unit_id.as_str()) {
            panic!("mock provider exploded on {}", request.unit_id);
        }

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.next_reply(request)
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

/// Registry over the default catalog with the given clients registered
pub fn registry_with(providers: &[Arc<MockProvider>]) -> ProviderRegistry {
    let registry = ProviderRegistry::default();
    for provider in providers {
        registry.register(Arc::clone(provider) as Arc<dyn ProviderClient>);
    }
    registry
}

pub fn test_config() -> EngineConfig {
    EngineConfig::for_testing()
}

pub fn plan(task_id: &str, steps: Vec<Step>) -> Plan {
    Plan::new(task_id, format!("integration plan {task_id}"), steps)
}

/// Root step `a` with two dependents `b` and `c`
pub fn fan_out_steps() -> Vec<Step> {
    vec![
        Step::new("a", "create the data model"),
        Step::new("b", "write the service layer").with_dependencies(["a"]),
        Step::new("c", "write the tests").with_dependencies(["a"]),
    ]
}

pub fn server_error() -> ProviderError {
    ProviderError::http(500, "internal server error")
}

pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("cascade_core=debug")
        .with_test_writer()
        .try_init();
}
