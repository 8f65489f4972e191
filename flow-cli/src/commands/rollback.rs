use crate::commands::{finish, prepare, FlowArgs};
use crate::output;

use color_eyre::Result;

/// Roll back every selected flow, last flow first
pub async fn execute(args: FlowArgs) -> Result<()> {
    let prepared = prepare(&args)?;
    let mut events = prepared.events;
    let reporter = prepared.reporter;

    let suite = prepared.suite;
    let env = prepared.env;
    let ctx = prepared.ctx;

    let handle = tokio::spawn(async move { suite.rollback(&env, &ctx).await });

    while let Some(event) = events.recv().await {
        output::event(&event);
    }

    let report = handle.await?;

    println!();
    let mismatched: usize = report
        .flows
        .iter()
        .flat_map(|f| &f.instances)
        .filter(|i| i.status.is_failure())
        .count();
    let summary = format!(
        "Rollback of '{}': {} clean, {} with mismatches, {} skipped in {:.2}s",
        report.suite,
        report.completed(),
        mismatched,
        report.skipped(),
        report.duration.as_secs_f64()
    );
    if report.success() {
        output::success(&summary);
    } else {
        output::warning(&summary);
    }

    finish(report.success(), &reporter);
    Ok(())
}
