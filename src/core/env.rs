//! Environment variable resolution with shell-style `$VAR` expansion

use anyhow::Result;
use regex::{Captures, Regex};

/// Variables the builder reads at boot, in resolution order.
///
/// Later defaults may reference earlier names (`ETCD` expands `$HOST` and
/// `$ETCD_PORT`), so the order matters.
pub const BUILDER_ENV: &[(&str, &str)] = &[
    ("HOST", "127.0.0.1"),
    ("ETCD_PORT", "4001"),
    ("ETCD_PATH", "/deis/builder"),
    ("ETCD_TTL", "20"),
    ("ETCD", "http://$HOST:$ETCD_PORT"),
    ("EXTERNAL_PORT", ""),
];

/// Resolves variables one at a time against a lookup function.
///
/// A variable set to a non-empty value in the environment wins. Otherwise
/// its default is expanded against the variables resolved so far, falling
/// back to the lookup for names that have not been resolved yet. Unknown
/// names expand to the empty string.
pub struct EnvResolver {
    pattern: Regex,
    resolved: Vec<(String, String)>,
}

impl EnvResolver {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")?;
        Ok(Self {
            pattern,
            resolved: Vec::new(),
        })
    }

    /// Resolve a single variable and remember the result
    pub fn resolve<F>(&mut self, name: &str, default: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = match lookup(name) {
            Some(value) if !value.is_empty() => value,
            _ => self.expand(default, &lookup),
        };
        self.resolved.retain(|(key, _)| key != name);
        self.resolved.push((name.to_string(), value.clone()));
        value
    }

    /// Resolve a list of `(name, default)` pairs in order
    pub fn resolve_all<F>(&mut self, vars: &[(&str, &str)], lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (name, default) in vars {
            self.resolve(name, default, &lookup);
        }
    }

    /// Expand `$VAR` and `${VAR}` references in `input`
    pub fn expand<F>(&self, input: &str, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        self.pattern
            .replace_all(input, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                self.get(name)
                    .map(str::to_string)
                    .or_else(|| lookup(name))
                    .unwrap_or_default()
            })
            .into_owned()
    }

    /// Get an already-resolved variable
    pub fn get(&self, name: &str) -> Option<&str> {
        self.resolved
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Consume the resolver, returning variables in resolution order
    pub fn into_vars(self) -> Vec<(String, String)> {
        self.resolved
    }
}

/// Lookup backed by the real process environment
pub fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}
