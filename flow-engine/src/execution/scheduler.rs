// Fan-out Scheduler
// Expands a flow's matrix, gates combinations on required variables and
// dispatches each survivor inline or as an independent concurrent task

use crate::environment::Environment;
use crate::error::FlowError;
use crate::execution::events::{EventSender, FlowEvent, Phase};
use crate::execution::flow::{ExecFlow, FlowContext, FlowReport, InstanceReport, InstanceStatus};
use crate::execution::matrix::{Combination, MatrixExpander};
use crate::testing::{FailureKind, Scope};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Per-combination outcome produced by a runner
pub(crate) type InstanceOutcome = (InstanceStatus, Environment);

/// Where each expanded combination stands while the scheduler works
enum Slot {
    Skipped(String),
    Finished(InstanceOutcome),
    Pending(JoinHandle<InstanceOutcome>),
}

/// Expand `flow`'s matrix over `env` and drive `runner` once per surviving
/// combination, each on its own clone of `env`.
///
/// Sequential flows run combinations one at a time in expansion order.
/// Parallel flows spawn one task per combination (bounded by `max_parallel`
/// when set) and this function returns only after every task has finished.
pub(crate) async fn for_expanded<R, Fut>(
    flow: Arc<ExecFlow>,
    env: &Environment,
    ctx: &FlowContext,
    phase: Phase,
    runner: R,
) -> FlowReport
where
    R: Fn(Arc<ExecFlow>, FlowContext, String, Environment) -> Fut,
    Fut: Future<Output = InstanceOutcome> + Send + 'static,
{
    let start = Instant::now();
    let combinations = MatrixExpander::expand(&flow.matrix, env);

    tracing::info!(
        flow = %flow.name,
        %phase,
        combinations = combinations.len(),
        parallel = flow.parallel,
        "starting flow"
    );
    ctx.events.send_event(FlowEvent::FlowStarted {
        flow: flow.name.clone(),
        phase,
        combinations: combinations.len(),
        parallel: flow.parallel,
    });

    let semaphore = flow
        .max_parallel
        .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

    let mut slots: Vec<(Combination, Slot)> = Vec::with_capacity(combinations.len());

    for combination in combinations {
        let mut instance_env = env.clone();
        combination.apply(&mut instance_env);
        let label = combination.to_string();

        if let Some(missing) = flow.requires.iter().find(|r| !instance_env.has(r)) {
            tracing::warn!(
                flow = %flow.name,
                combination = %label,
                %missing,
                "required variable absent, skipping combination"
            );
            ctx.events.send_event(FlowEvent::CombinationSkipped {
                flow: flow.name.clone(),
                combination: label,
                missing: missing.clone(),
            });
            slots.push((combination, Slot::Skipped(missing.clone())));
            continue;
        }

        let instance = tracked(
            runner(Arc::clone(&flow), ctx.clone(), label.clone(), instance_env),
            ctx.clone(),
            flow.name.clone(),
            phase,
            label,
        );

        if flow.parallel {
            let permits = semaphore.clone();
            let handle = tokio::spawn(async move {
                let _permit = match permits {
                    Some(permits) => permits.acquire_owned().await.ok(),
                    None => None,
                };
                instance.await
            });
            slots.push((combination, Slot::Pending(handle)));
        } else {
            let outcome = instance.await;
            slots.push((combination, Slot::Finished(outcome)));
        }
    }

    // Join barrier: wait for every dispatched task
    let mut instances = Vec::with_capacity(slots.len());
    for (combination, slot) in slots {
        let (status, env) = match slot {
            Slot::Skipped(missing) => (InstanceStatus::Skipped { missing }, None),
            Slot::Finished((status, env)) => (status, Some(env)),
            Slot::Pending(handle) => match handle.await {
                Ok((status, env)) => (status, Some(env)),
                Err(join_err) => {
                    let label = combination.to_string();
                    tracing::error!(
                        flow = %flow.name,
                        combination = %label,
                        error = %join_err,
                        "combination task panicked"
                    );
                    Scope::new(ctx.reporter.as_ref(), &flow.name, &label).record(
                        FailureKind::TaskPanicked,
                        None,
                        join_err.to_string(),
                    );
                    ctx.events.send_event(FlowEvent::CombinationCompleted {
                        flow: flow.name.clone(),
                        phase,
                        combination: label,
                        success: false,
                        error: Some(format!("task panicked: {}", join_err)),
                    });
                    (
                        InstanceStatus::Failed(FlowError::TaskPanicked(join_err.to_string())),
                        None,
                    )
                }
            },
        };
        instances.push(InstanceReport {
            combination,
            status,
            env,
        });
    }

    let report = FlowReport {
        flow: flow.name.clone(),
        phase,
        instances,
        duration: start.elapsed(),
    };

    tracing::info!(
        flow = %flow.name,
        %phase,
        completed = report.completed(),
        failed = report.failed(),
        skipped = report.skipped(),
        "flow finished"
    );
    ctx.events.send_event(FlowEvent::FlowCompleted {
        flow: flow.name.clone(),
        phase,
        success: report.success(),
        duration: report.duration,
    });

    report
}

/// Wrap a combination run with started/completed progress events
async fn tracked<Fut>(
    instance: Fut,
    ctx: FlowContext,
    flow: String,
    phase: Phase,
    combination: String,
) -> InstanceOutcome
where
    Fut: Future<Output = InstanceOutcome>,
{
    ctx.events.send_event(FlowEvent::CombinationStarted {
        flow: flow.clone(),
        phase,
        combination: combination.clone(),
    });

    let (status, env) = instance.await;

    let error = match &status {
        InstanceStatus::Failed(err) => Some(err.to_string()),
        InstanceStatus::Mismatched(count) => Some(format!("{} rollback mismatch(es)", count)),
        _ => None,
    };
    ctx.events.send_event(FlowEvent::CombinationCompleted {
        flow,
        phase,
        combination,
        success: !status.is_failure(),
        error,
    });

    (status, env)
}
