use alloy::primitives::{Address, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::transports::http::reqwest::Url;
use color_eyre::eyre::Result;

/// Chain facts read before broadcasting
#[derive(Debug, Clone, Copy)]
pub struct Preflight {
    pub chain_id: u64,
    pub balance: U256,
}

/// Fetch the chain ID and the deployer's balance from an RPC endpoint
pub async fn preflight(rpc_url: &str, deployer: Address) -> Result<Preflight> {
    let url: Url = rpc_url.parse()?;
    let provider = ProviderBuilder::new().connect_http(url);
    let chain_id = provider.get_chain_id().await?;
    let balance = provider.get_balance(deployer).await?;
    Ok(Preflight { chain_id, balance })
}

/// Upper bound on the fees of `count` deployments at fixed gas settings
pub fn max_cost(gas_limit: u64, gas_price: u128, count: usize) -> U256 {
    U256::from(gas_limit) * U256::from(gas_price) * U256::from(count)
}
