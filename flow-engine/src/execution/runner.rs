// Flow Runner
// Executes one expanded combination: pre-run hooks, ordered steps with their
// post-step hooks, then the provided-variable check

use crate::command::CmdResult;
use crate::environment::Environment;
use crate::error::{FlowError, FlowResult};
use crate::execution::events::{EventSender, FlowEvent, Phase};
use crate::execution::flow::{ExecFlow, FlowContext, InstanceStatus};
use crate::execution::hooks::HookPosition;
use crate::execution::scheduler::InstanceOutcome;
use crate::testing::{verify, AssertMode, FailureKind, Scope};

use std::sync::Arc;

/// Run `flow`'s steps for one combination on its private environment
pub(crate) async fn run_once(
    flow: Arc<ExecFlow>,
    ctx: FlowContext,
    combination: String,
    mut env: Environment,
) -> InstanceOutcome {
    let status = match run_steps(&flow, &ctx, &combination, &mut env).await {
        Ok(()) => {
            tracing::debug!(flow = %flow.name, %combination, "combination done");
            InstanceStatus::Done
        }
        Err(err) => {
            tracing::error!(flow = %flow.name, %combination, error = %err, "combination failed");
            InstanceStatus::Failed(err)
        }
    };
    (status, env)
}

async fn run_steps(
    flow: &ExecFlow,
    ctx: &FlowContext,
    combination: &str,
    env: &mut Environment,
) -> FlowResult<()> {
    let scope = Scope::new(ctx.reporter.as_ref(), &flow.name, combination);

    fire_hooks(flow, &scope, HookPosition::PreRun, env, None)?;

    for (index, step) in flow.actions.iter().enumerate() {
        ctx.events.send_event(FlowEvent::step_started(
            flow.name.as_str(),
            Phase::Run,
            combination,
            index,
            step.command.resolve(env).to_string(),
        ));
        tracing::debug!(flow = %flow.name, %combination, step = index, command = %step.command, "running step");

        let result = ctx.executor.execute(&step.command, env).await;

        // Bare success is always asserted; explicit expectations are skipped
        // in dry-run mode
        let verdict = if step.expected.is_empty() {
            verify(AssertMode::Assert, &scope, index, &result, &[])
        } else if env.is_dry() {
            Ok(0)
        } else {
            verify(AssertMode::Assert, &scope, index, &result, &step.expected)
        };

        ctx.events.send_event(FlowEvent::step_completed(
            flow.name.as_str(),
            Phase::Run,
            combination,
            index,
            result.exit_code,
            result.duration,
            verdict.is_ok(),
        ));
        verdict?;

        fire_hooks(flow, &scope, HookPosition::AfterStep(index), env, Some(&result))?;
    }

    // Runs in dry-run mode too: it checks the contract offered to later flows
    for name in &flow.provides {
        if !env.has(name) {
            scope.record(
                FailureKind::MissingProvided,
                None,
                format!("variable '{}' not present after run", name),
            );
            return Err(FlowError::MissingProvided(name.clone()));
        }
    }

    Ok(())
}

fn fire_hooks(
    flow: &ExecFlow,
    scope: &Scope<'_>,
    position: HookPosition,
    env: &mut Environment,
    result: Option<&CmdResult>,
) -> FlowResult<()> {
    for hook in flow.hooks.at(position) {
        tracing::debug!(flow = %flow.name, hook = hook.name(), %position, "firing hook");
        if let Err(err) = hook.call(env, result) {
            let step = match position {
                HookPosition::PreRun => None,
                HookPosition::AfterStep(index) => Some(index),
            };
            scope.record(
                FailureKind::Hook,
                step,
                format!("{} ({}): {}", hook.name(), position, err),
            );
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::command::{CmdResult, Command, Expected};
    use crate::environment::Environment;
    use crate::error::FlowError;
    use crate::execution::flow::{ExecFlow, InstanceStatus};
    use crate::execution::hooks::{Hook, HookPosition};
    use crate::test_support::{context, ScriptedExecutor};
    use crate::testing::{FailureKind, MemoryReporter};

    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_pre_run_hooks_fire_first_without_result() {
        let executor = ScriptedExecutor::new();
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut flow = ExecFlow::new("pre");
        let pre_seen = Arc::clone(&seen);
        flow.add_hook(Hook::new("pre", move |env, result| {
            assert!(result.is_none());
            env.set_local("prepared", "yes");
            pre_seen.lock().unwrap().push("pre".to_string());
            Ok(())
        }));
        flow.add(Command::new("echo").arg("{{prepared}}"), vec![]);
        let post_seen = Arc::clone(&seen);
        flow.add_hook(Hook::new("post", move |_, result| {
            post_seen
                .lock()
                .unwrap()
                .push(result.map(|r| r.command.clone()).unwrap_or_default());
            Ok(())
        }));

        let report = flow.run(&Environment::new(), &ctx).await;

        assert!(report.success());
        assert_eq!(*seen.lock().unwrap(), vec!["pre", "echo yes"]);
    }

    #[tokio::test]
    async fn test_dry_run_skips_expectations_but_runs_everything() {
        let executor = ScriptedExecutor::new().respond("check", CmdResult::exited("check", 7));
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);
        let hooks_fired = Arc::new(Mutex::new(0));

        let mut flow = ExecFlow::new("dry");
        let counter = Arc::clone(&hooks_fired);
        flow.add(
            Command::new("check"),
            vec![Expected::new().stdout("never printed").unwrap()],
        )
        .add_hook(Hook::new("count", move |_, _| {
            *counter.lock().unwrap() += 1;
            Ok(())
        }))
        .add(Command::new("finish"), vec![Expected::new().exit_code(3)]);

        let env = Environment::new().with_dry(true);
        let report = flow.run(&env, &ctx).await;

        assert!(report.success());
        assert_eq!(executor.programs(), vec!["check", "finish"]);
        assert_eq!(*hooks_fired.lock().unwrap(), 1);
        assert!(reporter.is_clean());
    }

    #[tokio::test]
    async fn test_dry_run_still_asserts_bare_success() {
        let executor = ScriptedExecutor::new().respond("broken", CmdResult::exited("broken", 1));
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut flow = ExecFlow::new("dry-bare");
        flow.add(Command::new("broken"), vec![]);

        let report = flow.run(&Environment::new().with_dry(true), &ctx).await;
        assert!(!report.success());
    }

    #[tokio::test]
    async fn test_dry_run_still_checks_provides() {
        let executor = ScriptedExecutor::new();
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut flow = ExecFlow::new("dry-provides");
        flow.provides("APP").add(Command::new("create"), vec![]);

        let report = flow.run(&Environment::new().with_dry(true), &ctx).await;

        assert!(matches!(
            &report.instances[0].status,
            InstanceStatus::Failed(FlowError::MissingProvided(name)) if name == "APP"
        ));
        assert_eq!(reporter.failures_of(FailureKind::MissingProvided).len(), 1);
    }

    #[tokio::test]
    async fn test_provided_variable_from_hook() {
        let executor = ScriptedExecutor::new().respond(
            "create",
            CmdResult::success("create", "app \"web\" has been created"),
        );
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut flow = ExecFlow::new("create");
        flow.provides("APP")
            .add(Command::new("create"), vec![])
            .add_hook(Hook::capture(
                "APP",
                regex::Regex::new(r#"app "(\w+)""#).unwrap(),
            ));

        let report = flow.run(&Environment::new(), &ctx).await;

        assert!(report.success());
        let env = report.instances[0].env.as_ref().unwrap();
        assert_eq!(env.get("APP"), Some("web"));
    }

    #[tokio::test]
    async fn test_hook_error_is_fatal() {
        let executor = ScriptedExecutor::new();
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut flow = ExecFlow::new("hook-fails");
        flow.add(Command::new("a"), vec![])
            .add_hook(Hook::new("reject", |_, _| Err(FlowError::hook("nope"))))
            .add(Command::new("b"), vec![]);

        let report = flow.run(&Environment::new(), &ctx).await;

        assert_eq!(executor.programs(), vec!["a"]);
        assert!(matches!(
            report.instances[0].status,
            InstanceStatus::Failed(FlowError::Hook(_))
        ));
        let failures = reporter.failures_of(FailureKind::Hook);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step, Some(0));
    }

    #[tokio::test]
    async fn test_explicit_hook_position() {
        let executor = ScriptedExecutor::new();
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut flow = ExecFlow::new("explicit");
        flow.add(Command::new("a"), vec![]).add(Command::new("b"), vec![]);
        let log = Arc::clone(&order);
        flow.add_hook_at(
            HookPosition::AfterStep(0),
            Hook::new("late-registered", move |_, result| {
                log.lock()
                    .unwrap()
                    .push(result.map(|r| r.command.clone()).unwrap_or_default());
                Ok(())
            }),
        );

        flow.run(&Environment::new(), &ctx).await;
        assert_eq!(*order.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_spawn_failure_flows_through_assertion() {
        let executor = ScriptedExecutor::new().respond(
            "missing",
            CmdResult::failed_to_start("missing", "No such file or directory"),
        );
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut flow = ExecFlow::new("spawn");
        flow.add(Command::new("missing"), vec![]);

        let report = flow.run(&Environment::new(), &ctx).await;
        assert_eq!(report.failed(), 1);
        assert!(reporter.failures()[0].message.contains("could not run"));
    }
}
