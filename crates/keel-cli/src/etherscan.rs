//! Etherscan-compatible source verification client
//!
//! Submits the standard JSON compiler input of an artifact's build-info and
//! polls the returned GUID until the explorer leaves its pending queue.
//!
//! A queued GUID is kept until the explorer answers it, so a retried
//! submission for the same address resumes polling instead of posting the
//! source code again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use keel_core::{
    Address, Error, RetryConfig, ServiceResponse, VerificationRequest, VerificationService,
};
use serde::Deserialize;

use crate::artifact::ArtifactLoader;
use crate::config::VerifierConfig;

const PENDING: &str = "Pending in queue";
const PASS: &str = "Pass - Verified";
const NOT_INDEXED: &str = "Unable to locate ContractCode";

/// Delay between two status checks of a submitted GUID
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Envelope of every explorer API answer
#[derive(Debug, Clone, Deserialize)]
struct ApiResponse {
    status: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: String,
}

/// What a submission returned
#[derive(Debug, Clone, PartialEq, Eq)]
enum Submission {
    Queued(String),
    Answered(ServiceResponse),
}

pub struct EtherscanClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    loader: Arc<dyn ArtifactLoader>,
    poll_interval: Duration,
    /// Backoff for failed status checks of one GUID
    status_retry: RetryConfig,
    /// GUIDs the explorer accepted but has not answered yet
    queued: Mutex<HashMap<Address, String>>,
}

impl EtherscanClient {
    pub fn new(config: &VerifierConfig, loader: Arc<dyn ArtifactLoader>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            loader,
            poll_interval: DEFAULT_POLL_INTERVAL,
            status_retry: RetryConfig::default(),
            queued: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.status_retry = retry;
        self
    }

    fn queued_guid(&self, address: Address) -> Option<String> {
        self.queued
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .cloned()
    }

    fn set_queued(&self, address: Address, guid: Option<String>) {
        let mut queued = self.queued.lock().unwrap_or_else(PoisonError::into_inner);
        match guid {
            Some(guid) => queued.insert(address, guid),
            None => queued.remove(&address),
        };
    }

    /// Build the `verifysourcecode` form for a request
    fn submission_form(&self, request: &VerificationRequest) -> keel_core::Result<Vec<(&'static str, String)>> {
        let artifact = self
            .loader
            .load(&request.source_locator)
            .map_err(|e| Error::Verification(e.to_string()))?;
        let build_info = self
            .loader
            .build_info(&request.source_locator)
            .map_err(|e| Error::Verification(e.to_string()))?;

        let encoded_args = artifact.encode_constructor_args(&request.constructor_arguments)?;
        let source_code = serde_json::to_string(&build_info.input)?;

        Ok(vec![
            ("apikey", self.api_key.clone()),
            ("module", "contract".to_string()),
            ("action", "verifysourcecode".to_string()),
            ("contractaddress", request.contract_address.to_checksum(None)),
            ("sourceCode", source_code),
            ("codeformat", "solidity-standard-json-input".to_string()),
            ("contractname", request.source_locator.clone()),
            ("compilerversion", build_info.compiler_version()),
            // the explorer API spells it this way
            ("constructorArguements", hex::encode(encoded_args)),
        ])
    }

    async fn send_submission(&self, form: &[(&'static str, String)]) -> keel_core::Result<ApiResponse> {
        let response = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("Verification request failed: {}", e)))?;

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| Error::Rpc(format!("Invalid verification response: {}", e)))
    }

    async fn check_status(&self, guid: &str) -> keel_core::Result<ApiResponse> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("apikey", self.api_key.as_str()),
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .send()
            .await
            .map_err(|e| Error::Rpc(format!("Status request failed: {}", e)))?;

        response
            .json::<ApiResponse>()
            .await
            .map_err(|e| Error::Rpc(format!("Invalid status response: {}", e)))
    }
}

#[async_trait]
impl VerificationService for EtherscanClient {
    async fn submit(&self, request: &VerificationRequest) -> keel_core::Result<ServiceResponse> {
        let address = request.contract_address;

        let guid = match self.queued_guid(address) {
            Some(guid) => {
                tracing::debug!(artifact = %request.name, guid = %guid, "Resuming status checks");
                guid
            }
            None => {
                let form = self.submission_form(request)?;
                let answer = self.send_submission(&form).await?;

                match classify_submission(&answer, request)? {
                    Submission::Answered(response) => return Ok(response),
                    Submission::Queued(guid) => {
                        tracing::debug!(artifact = %request.name, guid = %guid, "Verification queued");
                        self.set_queued(address, Some(guid.clone()));
                        guid
                    }
                }
            }
        };

        let response = poll_status(
            || self.check_status(&guid),
            self.poll_interval,
            self.status_retry.to_backoff_builder(),
        )
        .await?;

        self.set_queued(address, None);
        Ok(response)
    }
}

/// Check a queued GUID every `interval` until the explorer answers it.
///
/// Transient failures of a single check are retried with `backoff`; the
/// submission itself is never repeated here.
async fn poll_status<F, Fut>(
    mut check: F,
    interval: Duration,
    backoff: ExponentialBuilder,
) -> keel_core::Result<ServiceResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = keel_core::Result<ApiResponse>>,
{
    let mut attempt = || {
        let status = check();
        async move { classify_status(&status.await?) }
    };

    loop {
        tokio::time::sleep(interval).await;

        let answer = (&mut attempt)
            .retry(backoff)
            .when(|e| e.is_retryable())
            .notify(|err, dur| {
                tracing::debug!(error = %err, delay = ?dur, "Retrying verification status");
            })
            .await?;

        if let Some(response) = answer {
            return Ok(response);
        }
    }
}

fn is_already_verified(result: &str) -> bool {
    result.to_lowercase().contains("already verified")
}

fn is_rate_limited(response: &ApiResponse) -> bool {
    response.result.to_lowercase().contains("rate limit")
}

fn classify_submission(
    response: &ApiResponse,
    request: &VerificationRequest,
) -> keel_core::Result<Submission> {
    if response.status == "1" {
        return Ok(Submission::Queued(response.result.clone()));
    }

    if is_already_verified(&response.result) {
        return Ok(Submission::Answered(ServiceResponse::AlreadyVerified));
    }

    if response.result.contains(NOT_INDEXED) {
        return Err(Error::NotIndexed(request.contract_address.to_string()));
    }

    if is_rate_limited(response) {
        return Err(Error::Rpc(response.result.clone()));
    }

    Ok(Submission::Answered(ServiceResponse::Rejected(format!(
        "{}: {}",
        response.message, response.result
    ))))
}

/// `None` while the submission is still queued
fn classify_status(response: &ApiResponse) -> keel_core::Result<Option<ServiceResponse>> {
    if response.result == PENDING {
        return Ok(None);
    }

    if response.result == PASS {
        return Ok(Some(ServiceResponse::Verified));
    }

    if is_already_verified(&response.result) {
        return Ok(Some(ServiceResponse::AlreadyVerified));
    }

    if is_rate_limited(response) {
        return Err(Error::Rpc(response.result.clone()));
    }

    Ok(Some(ServiceResponse::Rejected(response.result.clone())))
}
