//! Running steps sequentially or in parallel, with events and fail-fast.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};

use brisk_common::{BuildEvent, BuildTarget, EventId, StepEventInfo};
use tracing::{debug, warn};

use crate::context::ExecutionContext;
use crate::error::StepFailedError;
use crate::step::Step;

/// Notified around a batch of steps run for one rule.
pub trait StepRunningCallback: Send + Sync {
    /// Called before the first step of the batch starts.
    fn steps_will_run(&self, target: Option<&BuildTarget>);
    /// Called after every step of the batch succeeded.
    fn steps_did_run(&self, target: Option<&BuildTarget>);
}

/// A callback that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallback;

impl StepRunningCallback for NoopCallback {
    fn steps_will_run(&self, _target: Option<&BuildTarget>) {}
    fn steps_did_run(&self, _target: Option<&BuildTarget>) {}
}

/// Shared instance of [`NoopCallback`].
pub const NOOP_CALLBACK: NoopCallback = NoopCallback;

/// Executes steps and turns every kind of step failure into a
/// [`StepFailedError`].
#[derive(Debug, Clone)]
pub struct StepRunner {
    context: ExecutionContext,
}

impl StepRunner {
    /// Creates a runner whose steps see `context`.
    pub fn new(context: ExecutionContext) -> Self {
        Self { context }
    }

    /// The context handed to steps.
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Runs one step to completion on the calling thread.
    ///
    /// Posts a `StepStarted`/`StepFinished` pair sharing one event id. A
    /// non-zero exit code, a returned error, or a panic inside the step all
    /// produce an error. Refuses to start once the build is interrupted.
    pub fn run_step_for_build_target(
        &self,
        step: &dyn Step,
        target: Option<&BuildTarget>,
    ) -> Result<(), StepFailedError> {
        if self.context.is_interrupted() {
            return Err(StepFailedError::Interrupted {
                step: step.short_name().to_string(),
                target: target.cloned(),
            });
        }

        let description = step.description(&self.context);
        let info = StepEventInfo {
            id: EventId::next(),
            short_name: step.short_name().to_string(),
            description: description.clone(),
            target: target.cloned(),
        };
        self.context.events().post(BuildEvent::StepStarted(info.clone()));
        debug!(step = %info.short_name, rule = ?target, "running step");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| step.execute(&self.context)));

        let (exit_code, result) = match outcome {
            Ok(Ok(0)) => (0, Ok(())),
            Ok(Ok(code)) => (
                code,
                Err(StepFailedError::ExitCode {
                    step: info.short_name.clone(),
                    description,
                    exit_code: code,
                    target: target.cloned(),
                }),
            ),
            Ok(Err(e)) => (
                -1,
                Err(StepFailedError::Exception {
                    step: info.short_name.clone(),
                    description,
                    message: e.to_string(),
                    target: target.cloned(),
                }),
            ),
            Err(payload) => (
                -1,
                Err(StepFailedError::Exception {
                    step: info.short_name.clone(),
                    description,
                    message: panic_message(payload.as_ref()),
                    target: target.cloned(),
                }),
            ),
        };

        if let Err(e) = &result {
            warn!(rule = ?target, "{e}");
        }
        self.context.events().post(BuildEvent::StepFinished {
            step: info,
            exit_code,
        });
        result
    }

    /// Runs `steps` one after another, stopping at the first failure.
    pub fn run_steps(
        &self,
        steps: &[Arc<dyn Step>],
        target: Option<&BuildTarget>,
        callback: &dyn StepRunningCallback,
    ) -> Result<(), StepFailedError> {
        callback.steps_will_run(target);
        for step in steps {
            self.run_step_for_build_target(step.as_ref(), target)?;
        }
        callback.steps_did_run(target);
        Ok(())
    }

    /// Runs `steps` concurrently on `pool` and waits for all of them.
    ///
    /// Returns as soon as any step fails, without waiting for the others.
    /// Steps that are still running keep the pool thread they occupy until
    /// they finish; their results are discarded.
    pub fn run_steps_in_parallel_and_wait(
        &self,
        steps: &[Arc<dyn Step>],
        target: Option<&BuildTarget>,
        pool: &rayon::ThreadPool,
        callback: &dyn StepRunningCallback,
    ) -> Result<(), StepFailedError> {
        callback.steps_will_run(target);

        let (tx, rx) = mpsc::channel();
        for step in steps {
            let tx = tx.clone();
            let step = Arc::clone(step);
            let runner = self.clone();
            let target = target.cloned();
            pool.spawn(move || {
                let result = runner.run_step_for_build_target(step.as_ref(), target.as_ref());
                // The receiver is gone once an earlier step failed.
                let _ = tx.send(result);
            });
        }
        drop(tx);

        for _ in 0..steps.len() {
            match rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        callback.steps_did_run(target);
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "step panicked".to_string()
    }
}
