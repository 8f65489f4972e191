// Flow Hooks
// Side-effecting callbacks fired before a flow runs or after specific steps

use crate::command::CmdResult;
use crate::environment::Environment;
use crate::error::{FlowError, FlowResult};

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Where a hook fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookPosition {
    /// Before any step executes
    PreRun,
    /// After the step with this index has executed and been verified
    AfterStep(usize),
}

impl fmt::Display for HookPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPosition::PreRun => write!(f, "pre-run"),
            HookPosition::AfterStep(i) => write!(f, "after step {}", i),
        }
    }
}

/// Hook callback signature.
///
/// The result is `None` for pre-run hooks, where no command has run. An error
/// is fatal to the combination, like a failed step assertion.
pub type HookFn = dyn Fn(&mut Environment, Option<&CmdResult>) -> FlowResult<()> + Send + Sync;

/// A registered hook
#[derive(Clone)]
pub struct Hook {
    name: String,
    func: Arc<HookFn>,
}

impl Hook {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut Environment, Option<&CmdResult>) -> FlowResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Hook that stores a value captured from stdout into `var`.
    ///
    /// The first capture group is used when the pattern has one, otherwise the
    /// whole match. No match is an error, except in dry-run mode where output
    /// is not meaningful.
    pub fn capture(var: impl Into<String>, pattern: Regex) -> Self {
        let var = var.into();
        let name = format!("capture {} /{}/", var, pattern.as_str());

        Self::new(name, move |env, result| {
            let Some(result) = result else {
                return Err(FlowError::hook(format!(
                    "cannot capture '{}' before any step ran",
                    var
                )));
            };

            let captured = pattern.captures(&result.stdout).map(|caps| {
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            });

            match captured {
                Some(value) => {
                    env.set(var.clone(), [value]);
                    Ok(())
                }
                None if env.is_dry() => Ok(()),
                None => Err(FlowError::hook(format!(
                    "no match for /{}/ in output of '{}'",
                    pattern.as_str(),
                    result.command
                ))),
            }
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the hook
    pub fn call(&self, env: &mut Environment, result: Option<&CmdResult>) -> FlowResult<()> {
        (self.func)(env, result)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook").field("name", &self.name).finish()
    }
}

/// Hooks indexed by position, each position keeping registration order
#[derive(Debug, Clone, Default)]
pub struct HookRegistry {
    hooks: BTreeMap<HookPosition, Vec<Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, position: HookPosition, hook: Hook) {
        self.hooks.entry(position).or_default().push(hook);
    }

    /// Hooks registered at `position`, in registration order
    pub fn at(&self, position: HookPosition) -> &[Hook] {
        self.hooks
            .get(&position)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Total number of registered hooks
    pub fn len(&self) -> usize {
        self.hooks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Positions that have at least one hook
    pub fn positions(&self) -> impl Iterator<Item = HookPosition> + '_ {
        self.hooks.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_registry_keeps_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();

        for label in ["first", "second"] {
            let calls = Arc::clone(&calls);
            registry.register(
                HookPosition::AfterStep(0),
                Hook::new(label, move |_, _| {
                    calls.lock().unwrap().push(label);
                    Ok(())
                }),
            );
        }

        let mut env = Environment::new();
        for hook in registry.at(HookPosition::AfterStep(0)) {
            hook.call(&mut env, None).unwrap();
        }

        assert_eq!(*calls.lock().unwrap(), vec!["first", "second"]);
        assert!(registry.at(HookPosition::PreRun).is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_pre_run_sorts_before_steps() {
        let mut registry = HookRegistry::new();
        registry.register(HookPosition::AfterStep(2), Hook::new("b", |_, _| Ok(())));
        registry.register(HookPosition::PreRun, Hook::new("a", |_, _| Ok(())));

        let positions: Vec<HookPosition> = registry.positions().collect();
        assert_eq!(
            positions,
            vec![HookPosition::PreRun, HookPosition::AfterStep(2)]
        );
    }

    #[test]
    fn test_capture_group_sets_variable() {
        let hook = Hook::capture("APP", Regex::new(r"app '(\w+)' created").unwrap());
        let mut env = Environment::new();
        let result = CmdResult::success("create", "app 'web' created\n");

        hook.call(&mut env, Some(&result)).unwrap();
        assert_eq!(env.get("APP"), Some("web"));
    }

    #[test]
    fn test_capture_whole_match_without_group() {
        let hook = Hook::capture("VERSION", Regex::new(r"\d+\.\d+").unwrap());
        let mut env = Environment::new();

        hook.call(&mut env, Some(&CmdResult::success("v", "version 1.42")))
            .unwrap();
        assert_eq!(env.get("VERSION"), Some("1.42"));
    }

    #[test]
    fn test_capture_without_match() {
        let hook = Hook::capture("APP", Regex::new("created").unwrap());
        let result = CmdResult::success("create", "");

        let mut env = Environment::new();
        assert!(matches!(
            hook.call(&mut env, Some(&result)),
            Err(FlowError::Hook(_))
        ));

        let mut dry = Environment::new().with_dry(true);
        assert!(hook.call(&mut dry, Some(&result)).is_ok());
        assert!(!dry.has("APP"));
    }

    #[test]
    fn test_capture_needs_a_result() {
        let hook = Hook::capture("APP", Regex::new("x").unwrap());
        assert!(hook.call(&mut Environment::new(), None).is_err());
    }
}
