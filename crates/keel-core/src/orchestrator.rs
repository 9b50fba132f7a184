//! Deployment orchestration
//!
//! The [`Orchestrator`] drives one run through its stages:
//!
//! ```text
//! Idle -> Deploying(0) -> ... -> Deploying(n-1) -> Propagating
//!      -> Verifying(0) -> ... -> Verifying(n-1) -> Done
//! ```
//!
//! Any error while validating or deploying ends the run in
//! [`RunStage::Failed`] without a single verification call. Verification
//! failures are collected in the [`RunReport`] and never stop the run.
//!
//! The [`RunState`] of a run lives on the stack of [`Orchestrator::run`] and
//! is handed back in the report, so one orchestrator can run several times.
//! [`VerificationRun`] replays the second half for a saved state without a
//! deployer.

use std::time::Duration;

use crate::deployer::Deployer;
use crate::error::Error;
use crate::registry::Registry;
use crate::resolver::resolve_args;
use crate::types::{
    DeploymentRecord, FailedStage, RunReport, RunStage, RunState, VerificationResult,
};
use crate::verifier::{VerificationService, Verifier};
use crate::waiter::PropagationWaiter;

/// Receives progress notifications during a run
pub trait RunObserver: Send + Sync {
    /// Called on every stage transition, terminal stages included
    fn on_stage(&self, _stage: &RunStage) {}

    /// Called once a deployment is confirmed and appended to `state`
    fn on_deployed(&self, _record: &DeploymentRecord, _state: &RunState) {}

    fn on_verified(&self, _result: &VerificationResult) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

pub struct Orchestrator<D, W, S, O = NoopObserver> {
    registry: Registry,
    deployer: D,
    verification: VerificationRun<W, S, O>,
    skip_verification: bool,
}

impl<D, W, S> Orchestrator<D, W, S, NoopObserver>
where
    D: Deployer,
    W: PropagationWaiter,
    S: VerificationService,
{
    pub fn new(registry: Registry, deployer: D, waiter: W, verifier: Verifier<S>) -> Self {
        Self {
            registry,
            deployer,
            verification: VerificationRun::new(waiter, verifier),
            skip_verification: false,
        }
    }
}

impl<D, W, S, O> Orchestrator<D, W, S, O>
where
    D: Deployer,
    W: PropagationWaiter,
    S: VerificationService,
    O: RunObserver,
{
    pub fn with_observer<P: RunObserver>(self, observer: P) -> Orchestrator<D, W, S, P> {
        Orchestrator {
            registry: self.registry,
            deployer: self.deployer,
            verification: self.verification.with_observer(observer),
            skip_verification: self.skip_verification,
        }
    }

    /// Bound the whole run; exceeding it fails the run at its current stage
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.verification = self.verification.with_deadline(deadline);
        self
    }

    /// Stop after the last deployment is confirmed
    pub fn skip_verification(mut self, skip: bool) -> Self {
        self.skip_verification = skip;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn deployer(&self) -> &D {
        &self.deployer
    }

    pub fn verifier(&self) -> &Verifier<S> {
        self.verification.verifier()
    }

    pub fn observer(&self) -> &O {
        self.verification.observer()
    }

    /// Deploy every artifact in registry order, then verify them all
    pub async fn run(&self) -> RunReport {
        let stages = &self.verification;
        let mut state = RunState::new();
        let mut verifications = Vec::new();
        let mut current = FailedStage::Validating;

        stages.observer.on_stage(&RunStage::Idle);

        let pipeline = self.deploy_and_verify(&mut state, &mut verifications, &mut current);
        let outcome = stages.bounded(pipeline).await;
        let stage = match outcome {
            Ok(stage) => stage,
            Err(deadline) => stages.fail(current, Error::DeadlineExceeded(deadline)),
        };

        RunReport {
            stage,
            deployments: state,
            verifications,
        }
    }

    async fn deploy_and_verify(
        &self,
        state: &mut RunState,
        verifications: &mut Vec<VerificationResult>,
        current: &mut FailedStage,
    ) -> RunStage {
        let stages = &self.verification;

        if let Err(cause) = self.registry.validate() {
            return stages.fail(FailedStage::Validating, cause);
        }

        for (index, spec) in self.registry.iter().enumerate() {
            *current = FailedStage::Deploying(index);
            stages.observer.on_stage(&RunStage::Deploying(index));

            let resolved_args = match resolve_args(spec, state) {
                Ok(args) => args,
                Err(cause) => return stages.fail(FailedStage::Deploying(index), cause),
            };

            tracing::info!(artifact = %spec.name, args = resolved_args.len(), "Deploying");

            let record = match self.deployer.deploy(spec, &resolved_args).await {
                Ok(record) if record.confirmed => record,
                Ok(_) => {
                    let cause = Error::deployment(&spec.name, "deployment was not confirmed");
                    return stages.fail(FailedStage::Deploying(index), cause);
                }
                Err(cause) => return stages.fail(FailedStage::Deploying(index), cause),
            };

            tracing::info!(
                artifact = %record.name,
                address = %record.address,
                tx_hash = %record.tx_hash,
                "Deployment confirmed"
            );

            state.push(record);
            if let Some(record) = state.last() {
                stages.observer.on_deployed(record, state);
            }
        }

        if self.skip_verification {
            tracing::info!("Verification skipped");
            return stages.finish();
        }

        *current = FailedStage::Propagating;
        stages.propagate().await;
        stages.verify_all(state, verifications, current).await;
        stages.finish()
    }
}

/// Propagation wait and verification of deployments that are already confirmed.
///
/// Used by [`Orchestrator`] after its last deployment, and on its own to
/// re-verify the state saved by an earlier run.
pub struct VerificationRun<W, S, O = NoopObserver> {
    waiter: W,
    verifier: Verifier<S>,
    observer: O,
    deadline: Option<Duration>,
}

impl<W, S> VerificationRun<W, S, NoopObserver>
where
    W: PropagationWaiter,
    S: VerificationService,
{
    pub fn new(waiter: W, verifier: Verifier<S>) -> Self {
        Self {
            waiter,
            verifier,
            observer: NoopObserver,
            deadline: None,
        }
    }
}

impl<W, S, O> VerificationRun<W, S, O>
where
    W: PropagationWaiter,
    S: VerificationService,
    O: RunObserver,
{
    pub fn with_observer<P: RunObserver>(self, observer: P) -> VerificationRun<W, S, P> {
        VerificationRun {
            waiter: self.waiter,
            verifier: self.verifier,
            observer,
            deadline: self.deadline,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn verifier(&self) -> &Verifier<S> {
        &self.verifier
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    /// Verify every record of `state` in order, optionally after the propagation wait
    pub async fn run(&self, state: RunState, wait: bool) -> RunReport {
        let mut verifications = Vec::new();
        let mut current = FailedStage::Propagating;

        let pipeline = async {
            if wait {
                self.propagate().await;
            }
            self.verify_all(&state, &mut verifications, &mut current).await;
            self.finish()
        };
        let outcome = self.bounded(pipeline).await;
        let stage = match outcome {
            Ok(stage) => stage,
            Err(deadline) => self.fail(current, Error::DeadlineExceeded(deadline)),
        };

        RunReport {
            stage,
            deployments: state,
            verifications,
        }
    }

    async fn propagate(&self) {
        self.observer.on_stage(&RunStage::Propagating);
        self.waiter.wait().await;
    }

    async fn verify_all(
        &self,
        state: &RunState,
        verifications: &mut Vec<VerificationResult>,
        current: &mut FailedStage,
    ) {
        for (index, record) in state.iter().enumerate() {
            *current = FailedStage::Verifying(index);
            self.observer.on_stage(&RunStage::Verifying(index));

            let result = self.verifier.verify_record(record).await;
            self.observer.on_verified(&result);
            verifications.push(result);
        }
    }

    /// Race `pipeline` against the deadline, if any.
    ///
    /// Returns the elapsed deadline on expiry; the caller knows the stage
    /// the pipeline was in.
    async fn bounded<F>(&self, pipeline: F) -> Result<RunStage, Duration>
    where
        F: std::future::Future<Output = RunStage>,
    {
        match self.deadline {
            Some(deadline) => tokio::time::timeout(deadline, pipeline)
                .await
                .map_err(|_| deadline),
            None => Ok(pipeline.await),
        }
    }

    fn finish(&self) -> RunStage {
        let stage = RunStage::Done;
        self.observer.on_stage(&stage);
        stage
    }

    fn fail(&self, stage: FailedStage, cause: Error) -> RunStage {
        tracing::error!(%stage, error = %cause, "Run failed");
        let stage = RunStage::Failed { stage, cause };
        self.observer.on_stage(&stage);
        stage
    }
}
