use async_trait::async_trait;

use crate::error::Result;
use crate::registry::ArtifactSpec;
use crate::types::DeploymentRecord;

/// Submits contract creation transactions.
///
/// Implementations must only return once the creation is confirmed. Any
/// error is fatal to the run: later artifacts may need this address.
#[async_trait]
pub trait Deployer: Send + Sync {
    /// Deploy `spec` with its resolved constructor arguments
    async fn deploy(
        &self,
        spec: &ArtifactSpec,
        resolved_args: &[serde_json::Value],
    ) -> Result<DeploymentRecord>;
}
