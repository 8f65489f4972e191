// Output formatting helpers for CLI commands

use flow_engine::{FlowEvent, Phase};

/// Print a status message: "  Status message"
pub fn status(action: &str, message: &str) {
    eprintln!("\x1b[1;36m{:>12}\x1b[0m {}", action, message);
}

/// Print a success message with checkmark
pub fn success(message: &str) {
    eprintln!("\x1b[1;32m  \u{2713}\x1b[0m {}", message);
}

/// Print a failure message with X
pub fn failure(message: &str) {
    eprintln!("\x1b[1;31m  \u{2717}\x1b[0m {}", message);
}

/// Print a check/pass item
pub fn check(message: &str) {
    eprintln!("\x1b[32m  \u{2713}\x1b[0m {}", message);
}

/// Print a warning message
pub fn warning(message: &str) {
    eprintln!("\x1b[33m  !\x1b[0m {}", message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("\x1b[1;31merror:\x1b[0m {}", message);
}

/// Print an info message
pub fn info(message: &str) {
    eprintln!("\x1b[36m  i\x1b[0m {}", message);
}

/// Print a dim/muted message
pub fn dim(message: &str) {
    eprintln!("\x1b[2m{}\x1b[0m", message);
}

/// Print a dim success message
pub fn dim_success(message: &str) {
    eprintln!("\x1b[32m{}\x1b[0m", message);
}

/// Print a dim failure message
pub fn dim_failure(message: &str) {
    eprintln!("\x1b[31m{}\x1b[0m", message);
}

/// Print a header line
pub fn header(message: &str) {
    eprintln!("\x1b[1m==> {}\x1b[0m", message);
}

/// Render one progress event
pub fn event(event: &FlowEvent) {
    match event {
        FlowEvent::FlowStarted {
            flow,
            phase,
            combinations,
            parallel,
        } => {
            println!();
            let verb = match phase {
                Phase::Run => "Flow",
                Phase::Rollback => "Rollback",
            };
            header(&format!(
                "{} '{}' ({} combinations{})",
                verb,
                flow,
                combinations,
                if *parallel { ", parallel" } else { "" }
            ));
        }

        FlowEvent::FlowCompleted {
            flow,
            success,
            duration,
            ..
        } => {
            let line = format!(
                "  Flow '{}' {} ({:.2}s)",
                flow,
                if *success { "OK" } else { "FAIL" },
                duration.as_secs_f64()
            );
            if *success {
                dim_success(&line);
            } else {
                dim_failure(&line);
            }
        }

        FlowEvent::CombinationSkipped {
            combination,
            missing,
            ..
        } => {
            warning(&format!("  {} skipped: '{}' is not set", combination, missing));
        }

        FlowEvent::CombinationStarted { combination, .. } => {
            println!("    {}", combination);
        }

        FlowEvent::CombinationCompleted {
            combination,
            success,
            error,
            ..
        } => match (success, error) {
            (true, _) => dim_success(&format!("    {} OK", combination)),
            (false, Some(reason)) => dim_failure(&format!("    {} FAIL: {}", combination, reason)),
            (false, None) => dim_failure(&format!("    {} FAIL", combination)),
        },

        FlowEvent::StepStarted {
            combination,
            step_index,
            command,
            ..
        } => {
            println!("{}", step_label(combination, *step_index, command));
        }

        FlowEvent::StepCompleted {
            combination,
            step_index,
            exit_code,
            duration,
            passed,
            ..
        } => {
            let exit_info = match exit_code {
                Some(code) if *code != 0 => format!(" (exit code: {})", code),
                None => " (no exit code)".to_string(),
                _ => String::new(),
            };
            let line = format!(
                "{} ({:.2}s){}",
                step_label(combination, *step_index, if *passed { "OK" } else { "FAIL" }),
                duration.as_secs_f64(),
                exit_info
            );
            if *passed {
                dim_success(&line);
            } else {
                dim_failure(&line);
            }
        }
    }
}

/// Step line prefix; the combination keeps parallel output attributable
fn step_label(combination: &str, step_index: usize, detail: &str) -> String {
    format!("      {} [Step {}] {}", combination, step_index + 1, detail)
}
