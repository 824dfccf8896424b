//! Spawn request handed to the native layer.
//!
//! A [`SpawnRequest`] is a plain description of what to launch: the command,
//! its arguments, the environment and an optional working directory. It is
//! consumed exactly once when the process starts.
//!
//! # Example
//!
//! ```
//! use procwire_process::SpawnRequest;
//!
//! let request = SpawnRequest::new("cat")
//!     .arg("-u")
//!     .env("LANG", "C")
//!     .env_opt("UNSET_ME", None::<String>)
//!     .cwd("/tmp");
//!
//! assert_eq!(request.args, vec!["-u".to_string()]);
//! assert!(!request.env.contains_key("UNSET_ME"));
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Description of a process to launch.
///
/// The environment given here is the complete environment of the child; use
/// [`SpawnRequest::inherit_env`] to start from the current one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    /// Executable to run.
    pub command: String,
    /// Arguments, in order.
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory, defaults to the parent's.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl SpawnRequest {
    /// Create a request with no arguments and an empty environment.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set an environment variable when a value is present.
    ///
    /// `None` values are dropped rather than clearing an earlier entry.
    pub fn env_opt<V: Into<String>>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.env(key, value),
            None => self,
        }
    }

    /// Merge a map of optional values, dropping `None` entries.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            if let Some(value) = value {
                self.env.insert(key.into(), value.into());
            }
        }
        self
    }

    /// Copy the current process environment into the request.
    ///
    /// Variables whose name or value is not valid UTF-8 are skipped.
    pub fn inherit_env(mut self) -> Self {
        for (key, value) in std::env::vars_os() {
            if let (Ok(key), Ok(value)) = (key.into_string(), value.into_string()) {
                self.env.entry(key).or_insert(value);
            }
        }
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}
