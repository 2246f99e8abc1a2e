//! Command-backed data sources.
//!
//! devdash never talks HTTP itself. Each domain is backed by a user-configured
//! command template (for example `gh api users/{username}`) whose stdout must
//! be a JSON document. Failures are mapped onto [`FetchError`] so the cache and
//! dashboard can tell "no such user" apart from "upstream is down".

use anyhow::{Result, bail};
use devdash_core::{CacheDomain, FetchError};
use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::process::Stdio;

use crate::config::SourcesSection;

/// Something that can produce the JSON document for one cache domain.
pub trait DataSource: Send + Sync {
    fn domain(&self) -> CacheDomain;

    fn fetch(&self, username: Option<&str>) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSource {
    domain: CacheDomain,
    template: Option<String>,
}

impl CommandSource {
    pub fn new(domain: CacheDomain, template: Option<&str>) -> Self {
        Self {
            domain,
            template: template.map(str::to_string),
        }
    }

    pub fn from_config(sources: &SourcesSection, domain: CacheDomain) -> Self {
        Self::new(domain, sources.template(domain))
    }

    /// Expand the template into argv. `{username}` becomes `username` (or empty).
    pub fn argv(&self, username: Option<&str>) -> Result<Vec<String>, FetchError> {
        let Some(template) = self.template.as_deref() else {
            return Err(FetchError::MissingCredential(format!(
                "no [sources].{} command configured",
                self.domain
            )));
        };
        let user = username.unwrap_or_default();
        let argv: Vec<String> = split_template(template)
            .into_iter()
            .map(|arg| arg.replace("{username}", user))
            .collect();
        if argv.is_empty() {
            return Err(FetchError::MissingCredential(format!(
                "[sources].{} command is empty",
                self.domain
            )));
        }
        Ok(argv)
    }
}

impl DataSource for CommandSource {
    fn domain(&self) -> CacheDomain {
        self.domain
    }

    fn fetch(&self, username: Option<&str>) -> impl Future<Output = Result<Value, FetchError>> + Send {
        let argv = self.argv(username);
        let subject = match username {
            Some(u) => format!("{}:{u}", self.domain),
            None => self.domain.to_string(),
        };
        async move { run_command(argv?, subject).await }
    }
}

async fn run_command(argv: Vec<String>, subject: String) -> Result<Value, FetchError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(FetchError::MissingCredential("empty command".to_string()));
    };
    let path = which::which(program).map_err(|_| {
        FetchError::MissingCredential(format!("`{program}` is not installed or not on PATH"))
    })?;

    tracing::debug!(program = %path.display(), ?args, "running source command");
    let output = tokio::process::Command::new(&path)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| FetchError::upstream(format!("spawning {program}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        return Err(classify_failure(&subject, output.status.code(), &stderr, &stdout));
    }
    parse_output(&output.stdout)
}

/// Map a failed command run onto a fetch error.
pub fn classify_failure(subject: &str, exit_code: Option<i32>, stderr: &str, stdout: &str) -> FetchError {
    let combined = format!("{stderr}\n{stdout}");
    let lower = combined.to_lowercase();
    let status = http_status(&combined);

    if status == Some(404) || lower.contains("not found") || lower.contains("could not resolve to a user") {
        return FetchError::NotFound(subject.to_string());
    }
    if matches!(status, Some(401 | 403)) || lower.contains("auth login") || lower.contains("bad credentials") {
        return FetchError::MissingCredential(format!("{subject}: {}", first_line(&combined)));
    }

    let message = match first_line(&combined) {
        "" => match exit_code {
            Some(code) => format!("command exited with status {code}"),
            None => "command terminated by signal".to_string(),
        },
        line => line.to_string(),
    };
    FetchError::Upstream { status, message }
}

pub fn parse_output(stdout: &[u8]) -> Result<Value, FetchError> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Err(FetchError::upstream("command printed nothing"));
    }
    serde_json::from_str(&text).map_err(|e| FetchError::upstream(format!("command output is not JSON: {e}")))
}

/// Usernames go into cache keys and command lines; keep them boring.
pub fn validate_username(name: &str) -> Result<String> {
    let name = name.trim();
    let re = Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,38}$")?;
    if !re.is_match(name) {
        bail!("invalid username {name:?} (letters, digits, '-', '_' and '.' only)");
    }
    Ok(name.to_string())
}

fn http_status(text: &str) -> Option<u16> {
    let re = Regex::new(r"HTTP (\d{3})").ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn first_line(text: &str) -> &str {
    text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

/// Whitespace split with single and double quotes grouping.
pub fn split_template(template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in template.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    out.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        out.push(current);
    }
    out
}
