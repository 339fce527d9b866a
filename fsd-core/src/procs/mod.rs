//! User-submitted external commands.
//!
//! A [`ProcRequest`] is validated and expanded into a [`ProcSpec`] (program
//! plus argv) before it is queued. The queued form is the space-joined argv,
//! so no argument may contain whitespace.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FsdError, Result};

pub mod exec;

pub use exec::{ExecOutcome, execute};

pub const YT_DLP: &str = "yt-dlp";
pub const MKDIR: &str = "mkdir";

/// Commands accepted by [`ProcRequest::into_spec`].
pub const SUPPORTED_COMMANDS: &[&str] = &[YT_DLP, MKDIR];

const YT_DLP_DEFAULT_FLAGS: &[(&str, &str)] = &[
    ("playlist-end", "30"),
    ("sleep-interval", "5"),
    ("merge-output-format", "mkv"),
];

const URL_ARG: &str = "url";
const CHANNEL_ARG: &str = "channel-name";
const DIRNAME_ARG: &str = "dirname";

/// Body of a proc submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcRequest {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: HashMap<String, Vec<String>>,
}

/// Ready-to-run command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcSpec {
    pub command: String,
    pub argv: Vec<String>,
}

impl ProcSpec {
    pub fn new(command: impl Into<String>, argv: Vec<String>) -> Self {
        Self {
            command: command.into(),
            argv,
        }
    }

    /// Rebuild a spec from a queued row's columns.
    pub fn from_stored(command: &str, args: &str) -> Self {
        Self::new(
            command,
            args.split_whitespace().map(str::to_owned).collect(),
        )
    }

    /// Space-joined argv, as stored in the `args` column.
    pub fn args_string(&self) -> String {
        self.argv.join(" ")
    }
}

impl fmt::Display for ProcSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.argv {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl ProcRequest {
    /// Validate the request and expand it to a command line rooted at
    /// `watch_dir`.
    pub fn into_spec(&self, watch_dir: &Path) -> Result<ProcSpec> {
        if self.command.is_empty() {
            return Err(invalid("command is required"));
        }
        self.reject_whitespace()?;

        match self.command.as_str() {
            YT_DLP => self.yt_dlp_spec(watch_dir),
            MKDIR => self.mkdir_spec(watch_dir),
            other => Err(invalid(format!(
                "invalid proc: {other}, wanted one of {}",
                SUPPORTED_COMMANDS.join(", ")
            ))),
        }
    }

    fn reject_whitespace(&self) -> Result<()> {
        for (key, values) in &self.args {
            if key.is_empty() || key.chars().any(char::is_whitespace) {
                return Err(invalid(format!("invalid argument name: {key:?}")));
            }
            if let Some(value) = values
                .iter()
                .find(|value| value.chars().any(char::is_whitespace))
            {
                return Err(invalid(format!(
                    "argument {key} contains whitespace: {value:?}"
                )));
            }
        }
        Ok(())
    }

    fn required(&self, key: &str) -> Result<&str> {
        let values = self
            .args
            .get(key)
            .ok_or_else(|| invalid(format!("{key} is required")))?;
        match values.first() {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(invalid(format!("non-empty {key} is required"))),
        }
    }

    fn yt_dlp_spec(&self, watch_dir: &Path) -> Result<ProcSpec> {
        let url = self.required(URL_ARG)?.to_string();
        let channel = self.required(CHANNEL_ARG)?;
        let output_dir = resolve_under(watch_dir, channel, CHANNEL_ARG)?;

        let mut flags: BTreeMap<&str, Vec<String>> = YT_DLP_DEFAULT_FLAGS
            .iter()
            .map(|(key, value)| (*key, vec![(*value).to_string()]))
            .collect();
        for (key, values) in &self.args {
            if key != URL_ARG && key != CHANNEL_ARG {
                flags.insert(key.as_str(), values.clone());
            }
        }

        let mut argv = vec![url];
        for (key, values) in flags {
            argv.push(format!("--{key}"));
            argv.extend(values);
        }
        argv.push("-o".to_string());
        argv.push(format!("{}/%(title)s", output_dir.display()));

        Ok(ProcSpec::new(YT_DLP, argv))
    }

    fn mkdir_spec(&self, watch_dir: &Path) -> Result<ProcSpec> {
        let dirname = self.required(DIRNAME_ARG)?;
        let target = resolve_under(watch_dir, dirname, DIRNAME_ARG)?;
        Ok(ProcSpec::new(MKDIR, vec![target.display().to_string()]))
    }
}

/// Join a user-supplied relative path onto `root`, refusing anything that
/// could escape it.
fn resolve_under(root: &Path, relative: &str, arg: &str) -> Result<PathBuf> {
    let candidate = Path::new(relative);
    let escapes = candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(invalid(format!(
            "{arg} must be a relative path inside the watch directory"
        )));
    }
    Ok(root.join(candidate))
}

fn invalid(message: impl Into<String>) -> FsdError {
    FsdError::InvalidProc(message.into())
}
