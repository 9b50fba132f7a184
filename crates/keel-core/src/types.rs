use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Error;
use crate::registry::ArtifactSpec;

/// Re-export alloy types for convenience
pub use alloy::primitives::{Address, B256};

// =============================================================================
// Exit Codes
// =============================================================================

/// Every deployment confirmed and no verification failed
pub const EXIT_SUCCESS: u8 = 0;
/// Fatal failure: configuration, deployment, deadline or cancellation
pub const EXIT_FAILURE: u8 = 1;
/// Every deployment confirmed but at least one verification failed
pub const EXIT_VERIFICATION_FAILED: u8 = 2;

// =============================================================================
// Deployment State
// =============================================================================

/// A confirmed deployment of one artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub source_locator: String,
    /// Constructor arguments exactly as deployed
    pub resolved_args: Vec<serde_json::Value>,
    pub address: Address,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub confirmed: bool,
}

impl DeploymentRecord {
    /// Build a confirmed record for `spec`
    pub fn confirmed(
        spec: &ArtifactSpec,
        resolved_args: Vec<serde_json::Value>,
        address: Address,
        tx_hash: B256,
        block_number: Option<u64>,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            source_locator: spec.source_locator.clone(),
            resolved_args,
            address,
            tx_hash,
            block_number,
            confirmed: true,
        }
    }
}

/// Deployment records of one run, in deployment order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState {
    records: Vec<DeploymentRecord>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DeploymentRecord) {
        self.records.push(record);
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.get(name).map(|r| r.address)
    }

    pub fn last(&self) -> Option<&DeploymentRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DeploymentRecord> {
        self.records.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.name.as_str()).collect()
    }
}

impl From<Vec<DeploymentRecord>> for RunState {
    fn from(records: Vec<DeploymentRecord>) -> Self {
        Self { records }
    }
}

impl<'a> IntoIterator for &'a RunState {
    type Item = &'a DeploymentRecord;
    type IntoIter = std::slice::Iter<'a, DeploymentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// =============================================================================
// Verification
// =============================================================================

/// Outcome of submitting one artifact for source verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status", content = "reason")]
pub enum VerificationOutcome {
    Verified,
    AlreadyVerified,
    Failed(String),
}

impl VerificationOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, VerificationOutcome::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Verified => "verified",
            VerificationOutcome::AlreadyVerified => "already-verified",
            VerificationOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for VerificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationOutcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub name: String,
    pub address: Address,
    pub outcome: VerificationOutcome,
}

// =============================================================================
// Run Stages
// =============================================================================

/// Where a failed run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailedStage {
    Validating,
    Deploying(usize),
    Propagating,
    Verifying(usize),
}

impl fmt::Display for FailedStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailedStage::Validating => write!(f, "validation"),
            FailedStage::Deploying(i) => write!(f, "deployment #{}", i),
            FailedStage::Propagating => write!(f, "propagation"),
            FailedStage::Verifying(i) => write!(f, "verification #{}", i),
        }
    }
}

/// State of the orchestrator's run
#[derive(Debug)]
pub enum RunStage {
    Idle,
    Deploying(usize),
    Propagating,
    Verifying(usize),
    Done,
    Failed { stage: FailedStage, cause: Error },
}

impl RunStage {
    pub fn is_done(&self) -> bool {
        matches!(self, RunStage::Done)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunStage::Failed { .. })
    }
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStage::Idle => write!(f, "idle"),
            RunStage::Deploying(i) => write!(f, "deploying #{}", i),
            RunStage::Propagating => write!(f, "propagating"),
            RunStage::Verifying(i) => write!(f, "verifying #{}", i),
            RunStage::Done => write!(f, "done"),
            RunStage::Failed { stage, cause } => write!(f, "failed during {}: {}", stage, cause),
        }
    }
}

/// Final report of a run
#[derive(Debug)]
pub struct RunReport {
    pub stage: RunStage,
    pub deployments: RunState,
    pub verifications: Vec<VerificationResult>,
}

impl RunReport {
    pub fn failed_verifications(&self) -> impl Iterator<Item = &VerificationResult> {
        self.verifications.iter().filter(|v| v.outcome.is_failed())
    }

    /// Process exit status for this report
    pub fn exit_code(&self) -> u8 {
        match &self.stage {
            RunStage::Done if self.failed_verifications().next().is_some() => {
                EXIT_VERIFICATION_FAILED
            }
            RunStage::Done => EXIT_SUCCESS,
            _ => EXIT_FAILURE,
        }
    }
}
