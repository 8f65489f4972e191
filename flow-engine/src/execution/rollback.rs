// Rollback Runner
// Executes a flow's compensating steps for one combination, newest first,
// recording mismatches without ever stopping early

use crate::environment::Environment;
use crate::execution::events::{EventSender, FlowEvent, Phase};
use crate::execution::flow::{ExecFlow, FlowContext, InstanceStatus};
use crate::execution::scheduler::InstanceOutcome;
use crate::testing::{verify, AssertMode, Scope};

use std::sync::Arc;

/// Run `flow`'s rollback entries in reverse registration order
pub(crate) async fn rollback_once(
    flow: Arc<ExecFlow>,
    ctx: FlowContext,
    combination: String,
    env: Environment,
) -> InstanceOutcome {
    let scope = Scope::new(ctx.reporter.as_ref(), &flow.name, &combination);
    let mut mismatches = 0;

    for (index, step) in flow.rollback.iter().enumerate().rev() {
        ctx.events.send_event(FlowEvent::step_started(
            flow.name.as_str(),
            Phase::Rollback,
            combination.as_str(),
            index,
            step.command.resolve(&env).to_string(),
        ));
        tracing::debug!(flow = %flow.name, %combination, step = index, command = %step.command, "rolling back");

        let result = ctx.executor.execute(&step.command, &env).await;
        let failed = verify(AssertMode::Check, &scope, index, &result, &step.expected)
            .unwrap_or(1);

        if failed > 0 {
            tracing::warn!(
                flow = %flow.name,
                %combination,
                step = index,
                command = %result.command,
                "rollback step did not match expectations"
            );
        }
        mismatches += failed;

        ctx.events.send_event(FlowEvent::step_completed(
            flow.name.as_str(),
            Phase::Rollback,
            combination.as_str(),
            index,
            result.exit_code,
            result.duration,
            failed == 0,
        ));
    }

    let status = if mismatches == 0 {
        InstanceStatus::Done
    } else {
        InstanceStatus::Mismatched(mismatches)
    };
    (status, env)
}

#[cfg(test)]
mod tests {
    use crate::command::{CmdResult, Command, Expected};
    use crate::environment::Environment;
    use crate::execution::flow::{ExecFlow, InstanceStatus};
    use crate::execution::hooks::Hook;
    use crate::test_support::{context, ScriptedExecutor};
    use crate::testing::{FailureKind, MemoryReporter};

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_rollback_without_provisioning_invokes_everything() {
        // Every compensating command fails: nothing was provisioned
        let executor = ScriptedExecutor::new()
            .respond("app-remove", CmdResult::exited("app-remove", 1))
            .respond("team-remove", CmdResult::exited("team-remove", 1));
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut env = Environment::new();
        env.set("PLATFORMS", ["go", "python"]);

        let mut flow = ExecFlow::new("app");
        flow.matrix("platform", "PLATFORMS")
            .add_rollback(Command::new("team-remove"), vec![])
            .add_rollback(
                Command::new("app-remove"),
                vec![Expected::new().exit_code(0), Expected::new().stdout("removed").unwrap()],
            );

        let report = flow.rollback(&env, &ctx).await;

        assert_eq!(
            executor.programs(),
            vec!["app-remove", "team-remove", "app-remove", "team-remove"]
        );
        for instance in &report.instances {
            assert!(matches!(instance.status, InstanceStatus::Mismatched(3)));
        }
        assert_eq!(reporter.failures_of(FailureKind::RollbackMismatch).len(), 6);
    }

    #[tokio::test]
    async fn test_rollback_fires_no_hooks() {
        let executor = ScriptedExecutor::new();
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);

        let mut flow = ExecFlow::new("quiet");
        flow.add_hook(Hook::new("pre", move |_, _| {
            flag.store(true, Ordering::SeqCst);
            Ok(())
        }))
        .add_rollback(Command::new("cleanup"), vec![]);

        let report = flow.rollback(&Environment::new(), &ctx).await;

        assert!(report.success());
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(executor.programs(), vec!["cleanup"]);
    }

    #[tokio::test]
    async fn test_rollback_checks_expectations_in_dry_run() {
        let executor = ScriptedExecutor::new().respond("cleanup", CmdResult::exited("cleanup", 2));
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut flow = ExecFlow::new("dry-rollback");
        flow.add_rollback(Command::new("cleanup"), vec![Expected::new().exit_code(0)]);

        let report = flow
            .rollback(&Environment::new().with_dry(true), &ctx)
            .await;
        assert_eq!(report.failed(), 1);
    }

    #[tokio::test]
    async fn test_parallel_rollback_joins_all() {
        let executor = ScriptedExecutor::new();
        let reporter = MemoryReporter::new();
        let ctx = context(&executor, &reporter);

        let mut env = Environment::new();
        env.set("APPS", ["a", "b", "c"]);

        let mut flow = ExecFlow::new("teardown");
        flow.matrix("app", "APPS")
            .parallel(true)
            .add_rollback(Command::new("remove").arg("{{app}}"), vec![]);

        let report = flow.rollback(&env, &ctx).await;

        assert_eq!(report.completed(), 3);
        assert_eq!(executor.calls().len(), 3);
    }
}
