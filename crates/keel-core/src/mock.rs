//! In-memory deployer, waiter and verification service used by the unit tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::deployer::Deployer;
use crate::error::{Error, Result};
use crate::registry::ArtifactSpec;
use crate::types::{Address, DeploymentRecord, B256};
use crate::verifier::{ServiceResponse, VerificationRequest, VerificationService};
use crate::waiter::PropagationWaiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Deploy(String),
    Wait,
    Verify(String),
}

/// Ordered log of every call made to the mocks, shared between them
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn deploys(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Deploy(name) => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn verifies(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Verify(name) => Some(name),
                _ => None,
            })
            .collect()
    }
}

// =============================================================================
// Deployer
// =============================================================================

pub struct MockDeployer {
    log: EventLog,
    failing: HashSet<String>,
    delay: Duration,
    deployed: Mutex<u8>,
    args: Mutex<HashMap<String, Vec<serde_json::Value>>>,
}

impl MockDeployer {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            failing: HashSet::new(),
            delay: Duration::ZERO,
            deployed: Mutex::new(0),
            args: Mutex::new(HashMap::new()),
        }
    }

    /// Reject the creation transaction of `name`
    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Address the n-th successful deployment (0-based) receives
    pub fn address_for(index: u8) -> Address {
        Address::repeat_byte(index + 1)
    }
}

#[async_trait]
impl Deployer for MockDeployer {
    async fn deploy(
        &self,
        spec: &ArtifactSpec,
        resolved_args: &[serde_json::Value],
    ) -> Result<DeploymentRecord> {
        self.log.push(Event::Deploy(spec.name.clone()));
        self.args
            .lock()
            .unwrap()
            .insert(spec.name.clone(), resolved_args.to_vec());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.contains(&spec.name) {
            return Err(Error::deployment(&spec.name, "insufficient funds for gas"));
        }

        let index = {
            let mut deployed = self.deployed.lock().unwrap();
            let index = *deployed;
            *deployed += 1;
            index
        };

        Ok(DeploymentRecord::confirmed(
            spec,
            resolved_args.to_vec(),
            Self::address_for(index),
            B256::repeat_byte(index + 1),
            Some(100 + index as u64),
        ))
    }
}

// =============================================================================
// Waiter
// =============================================================================

pub struct MockWaiter {
    log: EventLog,
}

impl MockWaiter {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl PropagationWaiter for MockWaiter {
    async fn wait(&self) {
        self.log.push(Event::Wait);
    }
}

// =============================================================================
// Verification service
// =============================================================================

#[derive(Debug, Clone)]
pub enum VerifyBehavior {
    AlreadyVerified,
    Reject(String),
    /// Report "not indexed" this many times, then verify
    NotIndexedTimes(u32),
    Hang(Duration),
}

#[derive(Default)]
pub struct MockVerificationService {
    log: EventLog,
    behaviors: HashMap<String, VerifyBehavior>,
    remember: bool,
    verified: Mutex<HashSet<Address>>,
    calls: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<VerificationRequest>>,
}

impl MockVerificationService {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            ..Default::default()
        }
    }

    pub fn with(mut self, name: &str, behavior: VerifyBehavior) -> Self {
        self.behaviors.insert(name.to_string(), behavior);
        self
    }

    /// Answer "already verified" for addresses verified earlier
    pub fn remembering(mut self) -> Self {
        self.remember = true;
        self
    }

    pub fn calls_for(&self, name: &str) -> u32 {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn requests(&self) -> Vec<VerificationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VerificationService for MockVerificationService {
    async fn submit(&self, request: &VerificationRequest) -> Result<ServiceResponse> {
        self.log.push(Event::Verify(request.name.clone()));
        self.requests.lock().unwrap().push(request.clone());
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(request.name.clone()).or_insert(0);
            *count += 1;
            *count
        };

        match self.behaviors.get(&request.name) {
            Some(VerifyBehavior::AlreadyVerified) => return Ok(ServiceResponse::AlreadyVerified),
            Some(VerifyBehavior::Reject(reason)) => {
                return Ok(ServiceResponse::Rejected(reason.clone()))
            }
            Some(VerifyBehavior::NotIndexedTimes(times)) if call <= *times => {
                return Err(Error::NotIndexed(request.contract_address.to_string()))
            }
            Some(VerifyBehavior::Hang(duration)) => tokio::time::sleep(*duration).await,
            _ => {}
        }

        if self.remember && !self.verified.lock().unwrap().insert(request.contract_address) {
            return Ok(ServiceResponse::AlreadyVerified);
        }

        Ok(ServiceResponse::Verified)
    }
}
