pub mod abi;
pub mod bytecode;
pub mod deployer;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod types;
pub mod verifier;
pub mod waiter;

#[cfg(test)]
pub(crate) mod mock;

pub use abi::{encode_constructor_args, json_to_sol_value, Abi, ParamInfo};
pub use bytecode::Bytecode;
pub use deployer::Deployer;
pub use error::{Error, Result};
pub use orchestrator::{NoopObserver, Orchestrator, RunObserver, VerificationRun};
pub use registry::{ArgRef, ArtifactSpec, Registry};
pub use resolver::resolve_args;
pub use retry::RetryConfig;
pub use types::*;
pub use verifier::{ServiceResponse, VerificationRequest, VerificationService, Verifier};
pub use waiter::{FixedDelay, PropagationWaiter};
