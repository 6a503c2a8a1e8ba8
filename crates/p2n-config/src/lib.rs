// crates/p2n-config/src/lib.rs
// ============================================================================
// Module: Paper2Notebook Configuration
// Description: Typed environment configuration for the reproduction pipeline.
// Purpose: Parse and validate recognized environment variables once at startup.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Configuration is read from the process environment exactly once and
//! validated fail-closed: an unparsable or out-of-range value aborts startup
//! with a named variable instead of limping along with a default. Every knob
//! has a documented default so a development deployment needs only the
//! storage locations and an API key.
//!
//! Security posture: environment values are untrusted input; secrets are
//! never echoed back in error messages. See `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default deployment environment name used in blob paths.
const DEFAULT_ENV_NAME: &str = "dev";
/// Default planner two-stage toggle.
const DEFAULT_TWO_STAGE: bool = true;
/// Default per-run file-search call cap.
const DEFAULT_FILE_SEARCH_CAP: u32 = 10;
/// Default per-run web-search call cap.
const DEFAULT_WEB_SEARCH_CAP: u32 = 5;
/// Default per-run code-interpreter seconds cap.
const DEFAULT_CODE_INTERPRETER_SECONDS: u32 = 60;
/// Default minimum extractor confidence.
const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;
/// Default absolute run ceiling in minutes.
const DEFAULT_RUN_MAX_MINUTES: u32 = 25;
/// Default sampling temperature.
const DEFAULT_TEMPERATURE: f64 = 0.0;
/// Default output token cap.
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8_192;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors raised at startup.
///
/// # Invariants
/// - Messages name the offending variable but never its value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is absent.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),
    /// A variable failed to parse or is out of range.
    #[error("invalid value for {variable}: {reason}")]
    Invalid {
        /// Variable name.
        variable: &'static str,
        /// Reason the value was rejected.
        reason: String,
    },
}

// ============================================================================
// SECTION: Sections
// ============================================================================

/// Blob storage location.
///
/// # Invariants
/// - `url` is non-empty; the key is optional for local filesystem roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreSettings {
    /// Store location: a filesystem root or service URL.
    pub url: String,
    /// Access key when the backend requires one.
    pub key: Option<String>,
}

/// Metadata store location.
///
/// # Invariants
/// - `url` is non-empty; for SQLite it is the database file path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataStoreSettings {
    /// Store location: a database file path or service URL.
    pub url: String,
    /// Access key when the backend requires one.
    pub key: Option<String>,
}

/// LLM provider credentials and per-role model selection.
///
/// # Invariants
/// - `temperature` is within `[0.0, 2.0]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider API key.
    pub api_key: String,
    /// Provider base URL when the deployment overrides the default.
    pub api_base_url: Option<String>,
    /// Model for the planning reasoner role.
    pub reasoner_model: String,
    /// Model for the plan shaper role.
    pub shaper_model: String,
    /// Model for the claim extractor role.
    pub extractor_model: String,
    /// Model for the JSON rescue pass.
    pub rescue_model: String,
    /// Default sampling temperature.
    pub temperature: f64,
    /// Output token ceiling per response.
    pub max_output_tokens: u32,
    /// Whether the two-stage planner is enabled.
    pub two_stage_enabled: bool,
}

/// Per-run hosted tool usage caps.
///
/// # Invariants
/// - All caps are greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCapSettings {
    /// File-search calls allowed per run.
    pub file_search_per_run: u32,
    /// Web-search calls allowed per run.
    pub web_search_per_run: u32,
    /// Code-interpreter seconds allowed per run.
    pub code_interpreter_seconds: u32,
}

/// Extraction policy knobs.
///
/// # Invariants
/// - `min_confidence` is within `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExtractSettings {
    /// Minimum confidence a claim must carry to persist.
    pub min_confidence: f64,
}

/// Executor resource knobs.
///
/// # Invariants
/// - `run_max_minutes >= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    /// Absolute per-run wall-clock ceiling in minutes.
    pub run_max_minutes: u32,
    /// Dataset download cache directory.
    pub dataset_cache_dir: Option<PathBuf>,
    /// Refuse dataset network fetches when set.
    pub offline_mode: bool,
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Complete pipeline configuration.
///
/// # Invariants
/// - Constructed only through [`Settings::from_env`] or
///   [`Settings::from_lookup`], both of which validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Deployment environment name used in blob paths.
    pub env_name: String,
    /// Blob storage location.
    pub object_store: ObjectStoreSettings,
    /// Metadata store location.
    pub metadata_store: MetadataStoreSettings,
    /// LLM provider configuration.
    pub llm: LlmSettings,
    /// Hosted tool caps.
    pub tool_caps: ToolCapSettings,
    /// Extraction policy.
    pub extract: ExtractSettings,
    /// Executor resource policy.
    pub executor: ExecutorSettings,
}

impl Settings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// value fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = env::vars().collect();
        Self::from_lookup(&vars)
    }

    /// Loads settings from an explicit variable map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or any
    /// value fails validation.
    pub fn from_lookup(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let lookup = |name: &str| vars.get(name).map(String::as_str);

        let settings = Self {
            env_name: lookup("P2N_ENV").unwrap_or(DEFAULT_ENV_NAME).to_string(),
            object_store: ObjectStoreSettings {
                url: required(lookup("OBJECT_STORE_URL"), "OBJECT_STORE_URL")?,
                key: lookup("OBJECT_STORE_KEY").map(ToString::to_string),
            },
            metadata_store: MetadataStoreSettings {
                url: required(lookup("METADATA_STORE_URL"), "METADATA_STORE_URL")?,
                key: lookup("METADATA_STORE_KEY").map(ToString::to_string),
            },
            llm: LlmSettings {
                api_key: required(lookup("LLM_API_KEY"), "LLM_API_KEY")?,
                api_base_url: lookup("LLM_API_BASE_URL").map(ToString::to_string),
                reasoner_model: required(lookup("LLM_REASONER_MODEL"), "LLM_REASONER_MODEL")?,
                shaper_model: required(lookup("LLM_SHAPER_MODEL"), "LLM_SHAPER_MODEL")?,
                extractor_model: required(lookup("LLM_EXTRACTOR_MODEL"), "LLM_EXTRACTOR_MODEL")?,
                rescue_model: required(lookup("LLM_RESCUE_MODEL"), "LLM_RESCUE_MODEL")?,
                temperature: parse_or(
                    lookup("LLM_TEMPERATURE_DEFAULT"),
                    "LLM_TEMPERATURE_DEFAULT",
                    DEFAULT_TEMPERATURE,
                )?,
                max_output_tokens: parse_or(
                    lookup("LLM_MAX_OUTPUT_TOKENS"),
                    "LLM_MAX_OUTPUT_TOKENS",
                    DEFAULT_MAX_OUTPUT_TOKENS,
                )?,
                two_stage_enabled: parse_bool_or(
                    lookup("PLANNER_TWO_STAGE_ENABLED"),
                    "PLANNER_TWO_STAGE_ENABLED",
                    DEFAULT_TWO_STAGE,
                )?,
            },
            tool_caps: ToolCapSettings {
                file_search_per_run: parse_or(
                    lookup("TOOL_CAP_FILE_SEARCH_PER_RUN"),
                    "TOOL_CAP_FILE_SEARCH_PER_RUN",
                    DEFAULT_FILE_SEARCH_CAP,
                )?,
                web_search_per_run: parse_or(
                    lookup("TOOL_CAP_WEB_SEARCH_PER_RUN"),
                    "TOOL_CAP_WEB_SEARCH_PER_RUN",
                    DEFAULT_WEB_SEARCH_CAP,
                )?,
                code_interpreter_seconds: parse_or(
                    lookup("TOOL_CAP_CODE_INTERPRETER_SECONDS"),
                    "TOOL_CAP_CODE_INTERPRETER_SECONDS",
                    DEFAULT_CODE_INTERPRETER_SECONDS,
                )?,
            },
            extract: ExtractSettings {
                min_confidence: parse_or(
                    lookup("EXTRACT_MIN_CONFIDENCE"),
                    "EXTRACT_MIN_CONFIDENCE",
                    DEFAULT_MIN_CONFIDENCE,
                )?,
            },
            executor: ExecutorSettings {
                run_max_minutes: parse_or(
                    lookup("NOTEBOOK_RUN_MAX_MINUTES"),
                    "NOTEBOOK_RUN_MAX_MINUTES",
                    DEFAULT_RUN_MAX_MINUTES,
                )?,
                dataset_cache_dir: lookup("DATASET_CACHE_DIR").map(PathBuf::from),
                offline_mode: parse_bool_or(lookup("OFFLINE_MODE"), "OFFLINE_MODE", false)?,
            },
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validates cross-field invariants.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(ConfigError::Invalid {
                variable: "LLM_TEMPERATURE_DEFAULT",
                reason: "must be within [0.0, 2.0]".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.extract.min_confidence) {
            return Err(ConfigError::Invalid {
                variable: "EXTRACT_MIN_CONFIDENCE",
                reason: "must be within [0.0, 1.0]".to_string(),
            });
        }
        if self.executor.run_max_minutes == 0 {
            return Err(ConfigError::Invalid {
                variable: "NOTEBOOK_RUN_MAX_MINUTES",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.tool_caps.file_search_per_run == 0
            || self.tool_caps.web_search_per_run == 0
            || self.tool_caps.code_interpreter_seconds == 0
        {
            return Err(ConfigError::Invalid {
                variable: "TOOL_CAP_FILE_SEARCH_PER_RUN",
                reason: "tool caps must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Parse Helpers
// ============================================================================

/// Requires a non-empty variable value.
fn required(value: Option<&str>, variable: &'static str) -> Result<String, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.to_string()),
        _ => Err(ConfigError::Missing(variable)),
    }
}

/// Parses an optional value with a default, rejecting unparsable input.
fn parse_or<T: std::str::FromStr>(
    value: Option<&str>,
    variable: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            variable,
            reason: "failed to parse".to_string(),
        }),
    }
}

/// Parses an optional boolean with a default.
///
/// Accepts `true/false`, `1/0`, `yes/no`, and `on/off`, case-insensitively.
fn parse_bool_or(
    value: Option<&str>,
    variable: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                variable,
                reason: "expected a boolean".to_string(),
            }),
        },
    }
}
