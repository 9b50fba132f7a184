//! Contract creation through an alloy provider

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use color_eyre::eyre::{eyre, Result};
use keel_core::{ArtifactSpec, Deployer, DeploymentRecord, Error, RetryConfig};

use crate::artifact::ArtifactLoader;
use crate::config::NetworkConfig;

/// Deploys artifacts with a single signing key and fixed gas settings
pub struct AlloyDeployer {
    provider: DynProvider,
    from: Address,
    loader: Arc<dyn ArtifactLoader>,
    gas_limit: u64,
    gas_price: u128,
    retry: RetryConfig,
    confirmation_timeout: Duration,
}

impl AlloyDeployer {
    pub fn new(
        network: &NetworkConfig,
        private_key: &str,
        loader: Arc<dyn ArtifactLoader>,
    ) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| eyre!("Invalid private key: {}", e))?;
        let from = signer.address();

        let url: Url = network
            .rpc_url
            .parse()
            .map_err(|e| eyre!("Invalid RPC URL '{}': {}", network.rpc_url, e))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        Ok(Self {
            provider,
            from,
            loader,
            gas_limit: network.gas_limit,
            gas_price: network.gas_price,
            retry: RetryConfig::default(),
            confirmation_timeout: Duration::from_secs(300),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    /// Address of the signing account
    pub fn from(&self) -> Address {
        self.from
    }

    /// Poll for the receipt of `tx_hash` until it appears or the confirmation timeout expires
    async fn wait_for_receipt(
        &self,
        spec: &ArtifactSpec,
        tx_hash: B256,
    ) -> keel_core::Result<TransactionReceipt> {
        let provider = &self.provider;

        let fetch = || async move {
            match provider.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => Ok(receipt),
                Ok(None) => Err(Error::Pending(tx_hash.to_string())),
                Err(e) => Err(Error::Rpc(e.to_string())),
            }
        };

        poll_until_ready(fetch, self.retry.to_polling_builder(), self.confirmation_timeout)
            .await
            .unwrap_or_else(|| {
                Err(Error::ConfirmationTimeout {
                    artifact: spec.name.clone(),
                    tx_hash: tx_hash.to_string(),
                })
            })
    }
}

/// Retry `fetch` while it fails with a retryable error.
///
/// The attempt count is unbounded, so `timeout` alone ends the wait. Returns
/// `None` when it expires.
async fn poll_until_ready<T, F, Fut>(
    fetch: F,
    backoff: ExponentialBuilder,
    timeout: Duration,
) -> Option<keel_core::Result<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = keel_core::Result<T>>,
{
    let poll = fetch
        .retry(backoff)
        .when(|e| e.is_retryable())
        .notify(|err, dur| {
            tracing::debug!(error = %err, delay = ?dur, "Waiting for receipt");
        });

    tokio::time::timeout(timeout, poll).await.ok()
}

/// Creation bytecode followed by the ABI-encoded constructor arguments
pub fn creation_data(
    loader: &dyn ArtifactLoader,
    spec: &ArtifactSpec,
    resolved_args: &[serde_json::Value],
) -> keel_core::Result<Bytes> {
    let artifact = loader
        .load(&spec.source_locator)
        .map_err(|e| Error::deployment(&spec.name, e))?;

    let code = artifact.creation_code()?;
    if code.is_empty() {
        return Err(Error::deployment(
            &spec.name,
            "artifact has no creation code (interface or abstract contract?)",
        ));
    }

    let encoded = artifact.encode_constructor_args(resolved_args)?;
    Ok(code.with_constructor_args(&encoded))
}

#[async_trait]
impl Deployer for AlloyDeployer {
    async fn deploy(
        &self,
        spec: &ArtifactSpec,
        resolved_args: &[serde_json::Value],
    ) -> keel_core::Result<DeploymentRecord> {
        let data = creation_data(self.loader.as_ref(), spec, resolved_args)?;

        // CREATE transaction - no 'to' address
        let tx = TransactionRequest::default()
            .with_from(self.from)
            .with_deploy_code(data)
            .with_gas_limit(self.gas_limit)
            .with_gas_price(self.gas_price);

        // Sent exactly once; only the receipt lookup is retried
        let pending = self
            .provider
            .send_transaction(tx)
            .await
            .map_err(|e| Error::deployment(&spec.name, format!("transaction rejected: {}", e)))?;
        let tx_hash = *pending.tx_hash();

        tracing::info!(artifact = %spec.name, tx = %tx_hash, "Creation transaction sent");

        let receipt = self.wait_for_receipt(spec, tx_hash).await?;

        if !receipt.status() {
            return Err(Error::deployment(
                &spec.name,
                format!("transaction {} reverted", tx_hash),
            ));
        }

        let address = receipt.contract_address.ok_or_else(|| {
            Error::deployment(
                &spec.name,
                format!("receipt of {} has no contract address", tx_hash),
            )
        })?;

        tracing::info!(
            artifact = %spec.name,
            address = %address,
            block = ?receipt.block_number,
            "Deployment confirmed"
        );

        Ok(DeploymentRecord::confirmed(
            spec,
            resolved_args.to_vec(),
            address,
            tx_hash,
            receipt.block_number,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::tests::{write_artifact, SWAP_ABI};
    use crate::artifact::HardhatArtifactLoader;
    use keel_core::retry::DEFAULT_MAX_RETRIES;
    use keel_core::ArgRef;
    use std::sync::atomic::{AtomicU32, Ordering};

    const ANVIL_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn network() -> NetworkConfig {
        NetworkConfig {
            name: "local".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            gas_limit: 21_000_000,
            gas_price: 80_000_000_000,
            verifier: None,
        }
    }

    #[test]
    fn test_creation_data_appends_args() {
        let temp = tempfile::tempdir().unwrap();
        write_artifact(temp.path(), "contracts/Swap.sol", "Swap", SWAP_ABI, "0x6080");
        let loader = HardhatArtifactLoader::new(temp.path());

        let spec = ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap").with_args(vec![
            ArgRef::address_of("France"),
            ArgRef::address_of("Brasil"),
        ]);
        let args = vec![
            serde_json::json!(Address::repeat_byte(1).to_checksum(None)),
            serde_json::json!(Address::repeat_byte(2).to_checksum(None)),
        ];

        let data = creation_data(&loader, &spec, &args).unwrap();

        assert_eq!(data.len(), 2 + 64);
        assert_eq!(&data[..2], &[0x60, 0x80]);
        assert_eq!(&data[2 + 12..2 + 32], Address::repeat_byte(1).as_slice());
        assert_eq!(&data[2 + 44..], Address::repeat_byte(2).as_slice());
    }

    #[test]
    fn test_creation_data_rejects_wrong_arity() {
        let temp = tempfile::tempdir().unwrap();
        write_artifact(temp.path(), "contracts/Swap.sol", "Swap", SWAP_ABI, "0x6080");
        let loader = HardhatArtifactLoader::new(temp.path());

        let spec = ArtifactSpec::new("Swap", "contracts/Swap.sol:Swap");
        let err = creation_data(&loader, &spec, &[]).unwrap_err();
        assert!(matches!(err, Error::Abi(_)));
    }

    #[test]
    fn test_creation_data_rejects_empty_code() {
        let temp = tempfile::tempdir().unwrap();
        write_artifact(temp.path(), "contracts/IToken.sol", "IToken", "[]", "0x");
        let loader = HardhatArtifactLoader::new(temp.path());

        let spec = ArtifactSpec::new("IToken", "contracts/IToken.sol:IToken");
        let err = creation_data(&loader, &spec, &[]).unwrap_err();
        assert!(matches!(err, Error::Deployment { .. }));
    }

    #[test]
    fn test_missing_artifact_is_deployment_error() {
        let temp = tempfile::tempdir().unwrap();
        let loader = HardhatArtifactLoader::new(temp.path());

        let spec = ArtifactSpec::new("France", "contracts/Tokens.sol:France");
        let err = creation_data(&loader, &spec, &[]).unwrap_err();
        assert!(err.to_string().contains("France"));
    }

    #[test]
    fn test_new_derives_sender() {
        let loader = Arc::new(HardhatArtifactLoader::new("artifacts"));
        let deployer = AlloyDeployer::new(&network(), ANVIL_KEY, loader).unwrap();

        assert_eq!(
            deployer.from(),
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
                .parse::<Address>()
                .unwrap()
        );
    }

    fn fast_polling() -> ExponentialBuilder {
        RetryConfig::default()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
            .to_polling_builder()
    }

    #[tokio::test]
    async fn test_receipt_poll_outlasts_retry_budget() {
        let attempts = AtomicU32::new(0);
        // Far more pending answers than the default retry budget allows
        let pending_rounds = DEFAULT_MAX_RETRIES * 4;

        let fetch = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < pending_rounds {
                    Err(Error::Pending("0xabc".to_string()))
                } else {
                    Ok(attempt)
                }
            }
        };

        let result = poll_until_ready(fetch, fast_polling(), Duration::from_secs(10)).await;

        assert_eq!(result.unwrap().unwrap(), pending_rounds);
        assert_eq!(attempts.load(Ordering::SeqCst), pending_rounds + 1);
    }

    #[tokio::test]
    async fn test_receipt_poll_with_zero_retries_still_waits() {
        let attempts = AtomicU32::new(0);
        let polling = RetryConfig::default()
            .with_max_attempts(0)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
            .to_polling_builder();

        let fetch = || {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(Error::Rpc("connection reset".to_string()))
                } else {
                    Ok(())
                }
            }
        };

        let result = poll_until_ready(fetch, polling, Duration::from_secs(10)).await;
        assert!(matches!(result, Some(Ok(()))));
    }

    #[tokio::test]
    async fn test_receipt_poll_ends_at_timeout() {
        let fetch = || async { Err::<(), _>(Error::Pending("0xabc".to_string())) };

        let result = poll_until_ready(fetch, fast_polling(), Duration::from_millis(50)).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_receipt_poll_stops_on_fatal_error() {
        let attempts = AtomicU32::new(0);
        let fetch = || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Error::Abi("bad receipt".to_string())) }
        };

        let result = poll_until_ready(fetch, fast_polling(), Duration::from_secs(10)).await;

        assert!(matches!(result, Some(Err(Error::Abi(_)))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_new_rejects_bad_key() {
        let loader = Arc::new(HardhatArtifactLoader::new("artifacts"));
        assert!(AlloyDeployer::new(&network(), "0x1234", loader).is_err());
    }
}
