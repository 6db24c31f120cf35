//! Secret references in configuration values.
//!
//! - `env::VAR` reads `$VAR`
//! - `pass::path/in/store` runs `pass show path/in/store` and keeps the first line
//! - anything else is the secret itself

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SecretError {
    #[error("environment variable `{0}` is not set")]
    MissingEnv(String),

    #[error("`pass show {path}` failed: {reason}")]
    Pass { path: String, reason: String },
}

/// Returns true if `value` points at a secret instead of holding one.
pub fn is_reference(value: &str) -> bool {
    value.starts_with("env::") || value.starts_with("pass::")
}

/// Expands a secret reference.
pub fn resolve(value: &str) -> Result<String, SecretError> {
    if let Some(var) = value.strip_prefix("env::") {
        std::env::var(var).map_err(|_| SecretError::MissingEnv(var.to_string()))
    } else if let Some(path) = value.strip_prefix("pass::") {
        resolve_pass(path)
    } else {
        Ok(value.to_string())
    }
}

fn resolve_pass(path: &str) -> Result<String, SecretError> {
    let fail = |reason: String| SecretError::Pass {
        path: path.to_string(),
        reason,
    };

    let output = std::process::Command::new("pass")
        .arg("show")
        .arg(path)
        .output()
        .map_err(|e| fail(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!("{} {}", output.status, stderr.trim())));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| fail("no output".to_string()))
}

/// Renders a configured secret for display: references are shown, inline
/// secrets are not.
pub fn display(value: &str) -> String {
    if is_reference(value) {
        value.to_string()
    } else {
        "[redacted]".to_string()
    }
}
