// Flow Environment
// Hierarchical variable store visible to a flow: a local scope layered over a
// global scope, where every variable holds an ordered set of candidate values

use std::collections::HashMap;
use std::fmt;

/// Mutable state visible to a flow run.
///
/// Each variable maps to an ordered list of candidate values. Single-valued
/// variables are simply lists of length one. Bindings made with
/// [`Environment::set_local`] shadow the global binding of the same name.
///
/// Cloning produces a fully independent copy: nothing done to a clone is
/// observable through its source or through sibling clones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Global (inherited) bindings
    global: HashMap<String, Vec<String>>,
    /// Local bindings, shadowing global ones
    local: HashMap<String, Vec<String>>,
    /// Dry-run mode: step expectations are not asserted
    dry: bool,
}

impl Environment {
    /// Create an empty environment
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an environment from `(name, value)` pairs.
    ///
    /// Only names starting with `prefix` are kept, with the prefix stripped.
    /// Values are split on commas into candidate sets, so
    /// `FLOW_PLATFORMS=go,python` becomes `PLATFORMS = ["go", "python"]`.
    pub fn from_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut env = Self::new();
        for (name, value) in vars {
            let Some(stripped) = name.as_ref().strip_prefix(prefix) else {
                continue;
            };
            if stripped.is_empty() {
                continue;
            }
            let values = split_candidates(value.as_ref());
            env.set(stripped, values);
        }
        env
    }

    /// Enable or disable dry-run mode (builder form)
    pub fn with_dry(mut self, dry: bool) -> Self {
        self.dry = dry;
        self
    }

    /// Enable or disable dry-run mode
    pub fn set_dry(&mut self, dry: bool) {
        self.dry = dry;
    }

    /// Whether this environment is in dry-run mode
    pub fn is_dry(&self) -> bool {
        self.dry
    }

    /// Replace the global candidate set of a variable
    pub fn set<I, S>(&mut self, name: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global
            .insert(name.into(), values.into_iter().map(Into::into).collect());
    }

    /// Append one candidate to the global set of a variable
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.global.entry(name.into()).or_default().push(value.into());
    }

    /// Bind a single value in the local scope, shadowing any global binding
    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.local.insert(name.into(), vec![value.into()]);
    }

    /// Full candidate set bound to `name` (local scope first); empty when unbound
    pub fn all(&self, name: &str) -> Vec<String> {
        self.resolve(name).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// First candidate bound to `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.resolve(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether `name` is bound to at least one value
    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some_and(|values| !values.is_empty())
    }

    /// Replace `{{NAME}}` placeholders with the first value of `NAME`.
    ///
    /// Unknown names expand to the empty string. An unterminated `{{` is kept
    /// verbatim.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = after[..end].trim();
                    let name = name.strip_prefix('.').unwrap_or(name);
                    out.push_str(self.get(name).unwrap_or_default());
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        out.push_str(rest);
        out
    }

    /// Append the candidates `other` holds for each of `names` to this
    /// environment's global sets, skipping values already present.
    pub fn merge_provided(&mut self, other: &Environment, names: &[String]) {
        for name in names {
            for value in other.all(name) {
                let entry = self.global.entry(name.clone()).or_default();
                if !entry.contains(&value) {
                    entry.push(value);
                }
            }
        }
    }

    /// Sorted names of every bound variable, local and global
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .global
            .keys()
            .chain(self.local.keys())
            .map(String::as_str)
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    fn resolve(&self, name: &str) -> Option<&[String]> {
        self.local
            .get(name)
            .or_else(|| self.global.get(name))
            .map(Vec::as_slice)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .names()
            .into_iter()
            .map(|name| format!("{}={}", name, self.all(name).join(",")))
            .collect();
        write!(f, "{{{}}}", rendered.join(" "))
    }
}

fn split_candidates(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}
