use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "specimen-trace";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provenance log file name inside the data directory.
pub const PROVENANCE_LOG_FILE: &str = "provenance.jsonl";

/// Env var overriding the provenance log location.
pub const ENV_LOG_PATH: &str = "SPECIMEN_TRACE_LOG";
/// Env var overriding the routing confidence threshold (0.0-1.0).
pub const ENV_CONFIDENCE_THRESHOLD: &str = "SPECIMEN_TRACE_CONFIDENCE_THRESHOLD";
/// Env var toggling premium re-extraction ("0"/"false" disables).
pub const ENV_ROUTING_ENABLED: &str = "SPECIMEN_TRACE_ROUTING_ENABLED";
/// Env var selecting strict provenance loading ("1"/"true" enables).
pub const ENV_STRICT_LOAD: &str = "SPECIMEN_TRACE_STRICT_LOAD";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    if is_dev() {
        "specimen_trace_lib=debug,specimen_trace=debug,info".to_string()
    } else {
        "specimen_trace_lib=info,specimen_trace=info,warn".to_string()
    }
}

/// Debug builds log more and read from a separate data directory.
pub fn is_dev() -> bool {
    cfg!(debug_assertions)
}

/// Get the application data directory
/// ~/SpecimenTrace/ (or ~/SpecimenTrace-dev/ in debug builds)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    if is_dev() {
        home.join("SpecimenTrace-dev")
    } else {
        home.join("SpecimenTrace")
    }
}

/// Resolve the provenance log path.
///
/// Priority:
/// 1. `SPECIMEN_TRACE_LOG` env var
/// 2. `{app_data_dir}/provenance.jsonl`
pub fn provenance_log_path() -> PathBuf {
    match std::env::var(ENV_LOG_PATH) {
        Ok(path) if !path.trim().is_empty() => PathBuf::from(path),
        _ => app_data_dir().join(PROVENANCE_LOG_FILE),
    }
}

/// Parse a boolean-ish env value. Unset or unrecognized values yield `None`.
pub fn env_flag(name: &str) -> Option<bool> {
    let raw = std::env::var(name).ok()?;
    parse_flag(&raw)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a float env value. Unset or unparsable values yield `None`.
pub fn env_f32(name: &str) -> Option<f32> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparsable numeric env var");
            None
        }
    }
}
