use crate::error::IngestError;
use std::path::Path;
use tracing::debug;

pub const OPENAI_KEY_VAR: &str = "OPENAI_KEY";

/// Resolves an API key once: an explicit value wins, then the process
/// environment, then a dotenv file (`.env` in the working directory unless a
/// path is given). The dotenv file is read without touching the environment.
pub fn resolve_api_key(
    explicit: Option<&str>,
    env_var: &str,
    dotenv_path: Option<&Path>,
) -> Result<String, IngestError> {
    if let Some(key) = explicit.map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }

    if let Some(key) = std::env::var(env_var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|key| !key.is_empty())
    {
        return Ok(key);
    }

    if let Some(key) = dotenv_lookup(env_var, dotenv_path)? {
        return Ok(key);
    }

    Err(IngestError::MissingCredential(format!(
        "{env_var} is not set in the environment or a .env file"
    )))
}

fn dotenv_lookup(env_var: &str, dotenv_path: Option<&Path>) -> Result<Option<String>, IngestError> {
    let entries = match dotenv_path {
        Some(path) => dotenvy::from_path_iter(path),
        None => dotenvy::dotenv_iter(),
    };

    let entries = match entries {
        Ok(entries) => entries,
        Err(error) if error.not_found() => {
            debug!(%error, "no dotenv file for credential lookup");
            return Ok(None);
        }
        Err(error) => {
            return Err(IngestError::MissingCredential(format!(
                "cannot read dotenv file: {error}"
            )))
        }
    };

    for entry in entries {
        let (key, value) = entry.map_err(|error| {
            IngestError::MissingCredential(format!("malformed dotenv file: {error}"))
        })?;
        if key == env_var && !value.trim().is_empty() {
            return Ok(Some(value.trim().to_string()));
        }
    }

    Ok(None)
}
