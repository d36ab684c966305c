//! Engine availability probes.

use std::env;
use std::io::ErrorKind;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::io::config::RoutingConfig;

/// Upper bound on `codex login status`.
pub const CODEX_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether codex is usable, honouring a config override before probing.
pub fn codex_available(routing: &RoutingConfig) -> bool {
    if let Some(value) = routing.codex_available {
        debug!(value, "codex availability from config");
        return value;
    }
    probe_codex(CODEX_PROBE_TIMEOUT)
}

/// Installed and logged in, or installed with `OPENAI_API_KEY` set.
#[instrument]
pub fn probe_codex(timeout: Duration) -> bool {
    match codex_login_status(timeout) {
        Ok(Some(true)) => true,
        Ok(None) => {
            debug!("codex not installed");
            false
        }
        Ok(Some(false)) => api_key_present(),
        Err(err) => {
            warn!(err = %format!("{err:#}"), "codex probe failed");
            api_key_present()
        }
    }
}

fn api_key_present() -> bool {
    env::var("OPENAI_API_KEY").is_ok_and(|key| !key.trim().is_empty())
}

/// `None` when the binary cannot be found.
fn codex_login_status(timeout: Duration) -> Result<Option<bool>> {
    let spawned = Command::new("codex")
        .args(["login", "status"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).context("spawn codex login status"),
    };

    match child.wait_timeout(timeout).context("wait for codex")? {
        Some(status) => Ok(Some(status.success())),
        None => {
            warn!(timeout_secs = timeout.as_secs(), "codex login status timed out, killing");
            child.kill().context("kill codex")?;
            child.wait().context("wait codex after kill")?;
            Ok(Some(false))
        }
    }
}
