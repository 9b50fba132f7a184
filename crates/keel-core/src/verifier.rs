//! Source verification
//!
//! [`VerificationService`] is the seam to the external explorer API.
//! [`Verifier`] bounds each submission with a timeout, retries transient
//! failures and maps the service's answer onto a [`VerificationOutcome`].
//! It never returns an error: a verification problem is recorded, not fatal.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;

use crate::error::{Error, Result};
use crate::retry::RetryConfig;
use crate::types::{Address, DeploymentRecord, VerificationOutcome, VerificationResult};

/// Default bound on a single submission, status polling included
pub const DEFAULT_VERIFICATION_TIMEOUT: Duration = Duration::from_secs(180);

/// What gets sent to the verification service
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub name: String,
    pub contract_address: Address,
    /// Exactly the arguments the contract was deployed with, in order
    pub constructor_arguments: Vec<serde_json::Value>,
    pub source_locator: String,
}

impl From<&DeploymentRecord> for VerificationRequest {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            name: record.name.clone(),
            contract_address: record.address,
            constructor_arguments: record.resolved_args.clone(),
            source_locator: record.source_locator.clone(),
        }
    }
}

/// Answer of the verification service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceResponse {
    Verified,
    AlreadyVerified,
    Rejected(String),
}

#[async_trait]
pub trait VerificationService: Send + Sync {
    /// Submit one contract and wait for the service's verdict.
    ///
    /// Transient conditions should come back as retryable errors
    /// (see [`Error::is_retryable`]); definitive refusals as
    /// [`ServiceResponse::Rejected`].
    async fn submit(&self, request: &VerificationRequest) -> Result<ServiceResponse>;
}

#[async_trait]
impl<S: VerificationService + ?Sized> VerificationService for Box<S> {
    async fn submit(&self, request: &VerificationRequest) -> Result<ServiceResponse> {
        (**self).submit(request).await
    }
}

pub struct Verifier<S> {
    service: S,
    retry: RetryConfig,
    timeout: Duration,
}

impl<S: VerificationService> Verifier<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            retry: RetryConfig::default(),
            timeout: DEFAULT_VERIFICATION_TIMEOUT,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Verify one deployed artifact
    pub async fn verify(
        &self,
        name: &str,
        address: Address,
        resolved_args: &[serde_json::Value],
        source_locator: &str,
    ) -> VerificationResult {
        let request = VerificationRequest {
            name: name.to_string(),
            contract_address: address,
            constructor_arguments: resolved_args.to_vec(),
            source_locator: source_locator.to_string(),
        };
        self.verify_request(&request).await
    }

    /// Verify a recorded deployment with the arguments it was deployed with
    pub async fn verify_record(&self, record: &DeploymentRecord) -> VerificationResult {
        self.verify_request(&VerificationRequest::from(record)).await
    }

    async fn verify_request(&self, request: &VerificationRequest) -> VerificationResult {
        let timeout = self.timeout;
        let service = &self.service;

        let response = (|| async move {
            match tokio::time::timeout(timeout, service.submit(request)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(timeout)),
            }
        })
        .retry(self.retry.to_backoff_builder())
        .when(|e| e.is_retryable())
        .notify(|err, dur| {
            tracing::debug!(
                artifact = %request.name,
                error = %err,
                delay = ?dur,
                "Retrying verification"
            );
        })
        .await;

        let outcome = match response {
            Ok(ServiceResponse::Verified) => VerificationOutcome::Verified,
            Ok(ServiceResponse::AlreadyVerified) => VerificationOutcome::AlreadyVerified,
            Ok(ServiceResponse::Rejected(reason)) => VerificationOutcome::Failed(reason),
            Err(e) => VerificationOutcome::Failed(e.to_string()),
        };

        match &outcome {
            VerificationOutcome::Failed(reason) => tracing::warn!(
                artifact = %request.name,
                address = %request.contract_address,
                %reason,
                "Verification failed"
            ),
            other => tracing::info!(
                artifact = %request.name,
                address = %request.contract_address,
                outcome = %other,
                "Verification finished"
            ),
        }

        VerificationResult {
            name: request.name.clone(),
            address: request.contract_address,
            outcome,
        }
    }
}
