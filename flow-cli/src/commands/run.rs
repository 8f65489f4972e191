use crate::commands::{finish, prepare, FlowArgs};
use crate::output;

use color_eyre::Result;

/// Run every selected flow in file order
pub async fn execute(args: FlowArgs) -> Result<()> {
    let prepared = prepare(&args)?;
    let mut events = prepared.events;
    let reporter = prepared.reporter;

    let suite = prepared.suite;
    let env = prepared.env;
    let ctx = prepared.ctx;

    // Spawn execution in background
    let handle = tokio::spawn(async move { suite.run(&env, &ctx).await });

    // Process events in the foreground
    while let Some(event) = events.recv().await {
        output::event(&event);
    }

    let (report, env) = handle.await?;

    println!();
    let summary = format!(
        "Suite '{}': {} done, {} failed, {} skipped in {:.2}s",
        report.suite,
        report.completed(),
        report.failed(),
        report.skipped(),
        report.duration.as_secs_f64()
    );
    if report.success() {
        output::success(&summary);
    } else {
        output::failure(&summary);
    }
    for name in env.names() {
        output::dim(&format!("  [var] {} = {}", name, env.all(name).join(",")));
    }

    finish(report.success(), &reporter);
    Ok(())
}
