// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch profile loading, validation, and merging.
//!
//! A [`LaunchConfig`] is a TOML file of named [`Profile`]s. Each profile is a
//! reusable set of launch settings (working directory, extra arguments,
//! environment, timeout) that a front end turns into launch options.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The requested configuration file was not found.
    #[error("config file not found: {path}")]
    FileNotFound {
        /// Path that was requested.
        path: String,
    },

    /// The file could not be parsed as valid TOML.
    #[error("failed to parse config: {reason}")]
    ParseError {
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },

    /// A profile was requested that the configuration does not define.
    #[error("unknown profile '{name}'")]
    UnknownProfile {
        /// Requested profile name.
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A recommended optional field is missing.
    MissingOptionalField {
        /// Name of the missing field.
        field: String,
        /// Why it matters.
        hint: String,
    },
    /// A profile timeout is unusually large.
    LargeTimeout {
        /// Profile name.
        profile: String,
        /// Timeout value in seconds.
        secs: u64,
    },
    /// A profile hides the caller's environment and sets nothing in its place.
    EmptyEnvironment {
        /// Profile name.
        profile: String,
    },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::MissingOptionalField { field, hint } => {
                write!(f, "missing optional field '{field}': {hint}")
            }
            ConfigWarning::LargeTimeout { profile, secs } => {
                write!(f, "profile '{profile}' has a large timeout ({secs}s)")
            }
            ConfigWarning::EmptyEnvironment { profile } => write!(
                f,
                "profile '{profile}' sets inherit_env = false with no env entries"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

/// Top-level launch configuration.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Log level override (e.g. `"debug"`, `"info"`, `"warn"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// Profile used when none is named on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Named launch profiles.
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            log_level: Some("info".into()),
            default_profile: None,
            profiles: BTreeMap::new(),
        }
    }
}

impl LaunchConfig {
    /// Look up the profile called `name`.
    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }

    /// Resolve the profile to use: `explicit` if given, else `default_profile`.
    ///
    /// Returns `Ok(None)` when neither names a profile.
    pub fn select_profile(&self, explicit: Option<&str>) -> Result<Option<&Profile>, ConfigError> {
        match explicit.or(self.default_profile.as_deref()) {
            Some(name) => self.profile(name).map(Some),
            None => Ok(None),
        }
    }
}

/// Settings applied to every launch that selects the profile.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct Profile {
    /// Working directory, created if missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    /// Arguments appended after the command's own.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Kill the process after this many seconds (1–86 400).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Environment entries, upserted over the starting environment.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Start from the caller's environment (`true`) or from an empty one.
    #[serde(default = "default_inherit_env")]
    pub inherit_env: bool,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            dir: None,
            args: Vec::new(),
            timeout_secs: None,
            env: BTreeMap::new(),
            inherit_env: true,
        }
    }
}

fn default_inherit_env() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum allowed timeout in seconds (24 hours).
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Threshold above which a timeout generates a warning.
const LARGE_TIMEOUT_THRESHOLD: u64 = 3_600;

/// Recognised log levels.
const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load a [`LaunchConfig`] from an optional TOML file path.
///
/// * If `path` is `Some`, reads and parses the file.
/// * If `path` is `None`, returns [`LaunchConfig::default()`].
///
/// Environment variable overrides are applied on top in both cases.
pub fn load_config(path: Option<&Path>) -> Result<LaunchConfig, ConfigError> {
    let mut config = match path {
        Some(p) => {
            let content = std::fs::read_to_string(p).map_err(|_| ConfigError::FileNotFound {
                path: p.display().to_string(),
            })?;
            parse_toml(&content)?
        }
        None => LaunchConfig::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Parse a TOML string into a [`LaunchConfig`].
pub fn parse_toml(content: &str) -> Result<LaunchConfig, ConfigError> {
    toml::from_str::<LaunchConfig>(content).map_err(|e| ConfigError::ParseError {
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Env overrides
// ---------------------------------------------------------------------------

/// Apply environment variable overrides.
///
/// Recognised variables:
/// - `XH_LOG_LEVEL`
/// - `XH_DEFAULT_PROFILE`
pub fn apply_env_overrides(config: &mut LaunchConfig) {
    apply_overrides_from(config, |key| std::env::var(key).ok());
}

fn apply_overrides_from(config: &mut LaunchConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("XH_LOG_LEVEL") {
        config.log_level = Some(val);
    }
    if let Some(val) = lookup("XH_DEFAULT_PROFILE") {
        config.default_profile = Some(val);
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a parsed configuration, returning advisory warnings.
///
/// Hard errors (bad log level, out-of-range timeouts, malformed env keys,
/// a dangling `default_profile`) are returned as a
/// [`ConfigError::ValidationError`]; soft issues come back as warnings.
pub fn validate_config(config: &LaunchConfig) -> Result<Vec<ConfigWarning>, ConfigError> {
    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<ConfigWarning> = Vec::new();

    if let Some(ref level) = config.log_level
        && !VALID_LOG_LEVELS.contains(&level.as_str())
    {
        errors.push(format!("invalid log_level '{level}'"));
    }

    for (name, profile) in &config.profiles {
        if name.trim().is_empty() {
            errors.push("profile name must not be empty".into());
        }

        if let Some(dir) = &profile.dir
            && dir.trim().is_empty()
        {
            errors.push(format!("profile '{name}': dir must not be empty"));
        }

        if let Some(t) = profile.timeout_secs {
            if t == 0 || t > MAX_TIMEOUT_SECS {
                errors.push(format!(
                    "profile '{name}': timeout {t}s out of range (1..{MAX_TIMEOUT_SECS})"
                ));
            } else if t > LARGE_TIMEOUT_THRESHOLD {
                warnings.push(ConfigWarning::LargeTimeout {
                    profile: name.clone(),
                    secs: t,
                });
            }
        }

        for key in profile.env.keys() {
            if key.is_empty() {
                errors.push(format!("profile '{name}': env key must not be empty"));
            } else if key.contains('=') {
                errors.push(format!(
                    "profile '{name}': env key '{key}' must not contain '='"
                ));
            }
        }

        if !profile.inherit_env && profile.env.is_empty() {
            warnings.push(ConfigWarning::EmptyEnvironment {
                profile: name.clone(),
            });
        }
    }

    match &config.default_profile {
        Some(name) if !config.profiles.contains_key(name) => {
            errors.push(format!("default_profile '{name}' is not defined"));
        }
        None if !config.profiles.is_empty() => {
            warnings.push(ConfigWarning::MissingOptionalField {
                field: "default_profile".into(),
                hint: "profiles apply only when --profile is given".into(),
            });
        }
        _ => {}
    }

    if errors.is_empty() {
        Ok(warnings)
    } else {
        Err(ConfigError::ValidationError { reasons: errors })
    }
}

// ---------------------------------------------------------------------------
// Merging
// ---------------------------------------------------------------------------

/// Merge two configurations.  Values in `overlay` take precedence over `base`.
///
/// Profile maps are combined; on name collisions the overlay profile wins
/// as a whole.
pub fn merge_configs(base: LaunchConfig, overlay: LaunchConfig) -> LaunchConfig {
    let mut profiles = base.profiles;
    profiles.extend(overlay.profiles);
    LaunchConfig {
        log_level: overlay.log_level.or(base.log_level),
        default_profile: overlay.default_profile.or(base.default_profile),
        profiles,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn profile_with_timeout(secs: u64) -> Profile {
        Profile {
            timeout_secs: Some(secs),
            ..Profile::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = LaunchConfig::default();
        let warnings = validate_config(&cfg).expect("default config should be valid");
        assert!(warnings.is_empty());
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn parse_full_profile() {
        let toml = r#"
            log_level = "debug"
            default_profile = "build"

            [profiles.build]
            dir = "target/work"
            args = ["--verbose"]
            timeout_secs = 600
            env = { RUST_LOG = "debug" }
            inherit_env = false
        "#;
        let cfg = parse_toml(toml).unwrap();
        let p = cfg.profile("build").unwrap();
        assert_eq!(p.dir.as_deref(), Some("target/work"));
        assert_eq!(p.args, vec!["--verbose"]);
        assert_eq!(p.timeout_secs, Some(600));
        assert_eq!(p.env["RUST_LOG"], "debug");
        assert!(!p.inherit_env);
    }

    #[test]
    fn inherit_env_defaults_to_true() {
        let cfg = parse_toml("[profiles.p]\n").unwrap();
        assert!(cfg.profiles["p"].inherit_env);
    }

    #[test]
    fn parse_invalid_toml_gives_parse_error() {
        let err = parse_toml("this is [not valid toml =").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn parse_wrong_types_gives_parse_error() {
        let err = parse_toml("[profiles.p]\ntimeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn validation_catches_invalid_log_level() {
        let cfg = LaunchConfig {
            log_level: Some("verbose".into()),
            ..Default::default()
        };
        let err = validate_config(&cfg).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn validation_catches_timeout_bounds() {
        for secs in [0, MAX_TIMEOUT_SECS + 1] {
            let mut cfg = LaunchConfig::default();
            cfg.profiles.insert("p".into(), profile_with_timeout(secs));
            cfg.default_profile = Some("p".into());
            assert!(validate_config(&cfg).is_err(), "{secs}s should be rejected");
        }
    }

    #[test]
    fn large_timeout_produces_warning() {
        let mut cfg = LaunchConfig::default();
        cfg.profiles.insert("p".into(), profile_with_timeout(7200));
        cfg.default_profile = Some("p".into());
        let warnings = validate_config(&cfg).unwrap();
        assert_eq!(
            warnings,
            vec![ConfigWarning::LargeTimeout {
                profile: "p".into(),
                secs: 7200
            }]
        );
    }

    #[test]
    fn validation_catches_bad_env_keys() {
        let mut profile = Profile::default();
        profile.env.insert(String::new(), "x".into());
        profile.env.insert("A=B".into(), "x".into());
        let mut cfg = LaunchConfig::default();
        cfg.profiles.insert("p".into(), profile);
        cfg.default_profile = Some("p".into());
        match validate_config(&cfg).unwrap_err() {
            ConfigError::ValidationError { reasons } => {
                assert_eq!(reasons.len(), 2, "{reasons:?}");
                assert!(reasons.iter().any(|r| r.contains("must not be empty")));
                assert!(reasons.iter().any(|r| r.contains("'A=B'")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn validation_catches_dangling_default_profile() {
        let cfg = LaunchConfig {
            default_profile: Some("ghost".into()),
            ..Default::default()
        };
        match validate_config(&cfg).unwrap_err() {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("ghost")));
            }
            other => panic!("expected ValidationError, got {other:?}"),
        }
    }

    #[test]
    fn missing_default_profile_warns_when_profiles_exist() {
        let mut cfg = LaunchConfig::default();
        cfg.profiles.insert("p".into(), Profile::default());
        let warnings = validate_config(&cfg).unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, ConfigWarning::MissingOptionalField { .. }))
        );
    }

    #[test]
    fn empty_environment_warns() {
        let mut cfg = LaunchConfig::default();
        cfg.profiles.insert(
            "bare".into(),
            Profile {
                inherit_env: false,
                ..Profile::default()
            },
        );
        cfg.default_profile = Some("bare".into());
        let warnings = validate_config(&cfg).unwrap();
        assert_eq!(
            warnings,
            vec![ConfigWarning::EmptyEnvironment {
                profile: "bare".into()
            }]
        );
    }

    #[test]
    fn select_profile_prefers_explicit_name() {
        let mut cfg = LaunchConfig::default();
        cfg.profiles.insert("a".into(), profile_with_timeout(1));
        cfg.profiles.insert("b".into(), profile_with_timeout(2));
        cfg.default_profile = Some("a".into());

        let chosen = cfg.select_profile(Some("b")).unwrap().unwrap();
        assert_eq!(chosen.timeout_secs, Some(2));
        let chosen = cfg.select_profile(None).unwrap().unwrap();
        assert_eq!(chosen.timeout_secs, Some(1));
    }

    #[test]
    fn select_profile_without_names_is_none() {
        let cfg = LaunchConfig::default();
        assert!(cfg.select_profile(None).unwrap().is_none());
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let cfg = LaunchConfig::default();
        let err = cfg.select_profile(Some("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProfile { ref name } if name == "nope"));
        assert_eq!(err.to_string(), "unknown profile 'nope'");
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = LaunchConfig::default();
        apply_overrides_from(&mut cfg, |key| match key {
            "XH_LOG_LEVEL" => Some("trace".into()),
            "XH_DEFAULT_PROFILE" => Some("ci".into()),
            _ => None,
        });
        assert_eq!(cfg.log_level.as_deref(), Some("trace"));
        assert_eq!(cfg.default_profile.as_deref(), Some("ci"));
    }

    #[test]
    fn absent_overrides_keep_file_values() {
        let mut cfg = LaunchConfig {
            default_profile: Some("keep".into()),
            ..Default::default()
        };
        apply_overrides_from(&mut cfg, |_| None);
        assert_eq!(cfg.default_profile.as_deref(), Some("keep"));
        assert_eq!(cfg.log_level.as_deref(), Some("info"));
    }

    #[test]
    fn merge_overlay_overrides_base() {
        let base = LaunchConfig {
            default_profile: Some("a".into()),
            log_level: Some("info".into()),
            profiles: BTreeMap::from([("a".into(), profile_with_timeout(5))]),
        };
        let overlay = LaunchConfig {
            default_profile: Some("b".into()),
            log_level: None,
            profiles: BTreeMap::from([
                ("a".into(), profile_with_timeout(9)),
                ("b".into(), Profile::default()),
            ]),
        };
        let merged = merge_configs(base, overlay);
        assert_eq!(merged.default_profile.as_deref(), Some("b"));
        assert_eq!(merged.log_level.as_deref(), Some("info"));
        assert_eq!(merged.profiles["a"].timeout_secs, Some(9));
        assert!(merged.profiles.contains_key("b"));
    }

    #[test]
    fn toml_roundtrip() {
        let mut profile = Profile {
            dir: Some("/work".into()),
            args: vec!["-x".into()],
            timeout_secs: Some(30),
            ..Profile::default()
        };
        profile.env.insert("K".into(), "V".into());
        let cfg = LaunchConfig {
            log_level: Some("warn".into()),
            default_profile: Some("p".into()),
            profiles: BTreeMap::from([("p".into(), profile)]),
        };
        let serialized = toml::to_string(&cfg).unwrap();
        assert_eq!(parse_toml(&serialized).unwrap(), cfg);
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xh.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "log_level = \"warn\"\n[profiles.quick]\ntimeout_secs = 5").unwrap();
        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.profile("quick").unwrap().timeout_secs, Some(5));
    }

    #[test]
    fn load_missing_file_gives_file_not_found() {
        let err = load_config(Some(Path::new("/nonexistent/xh.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn config_warning_display() {
        let w = ConfigWarning::LargeTimeout {
            profile: "slow".into(),
            secs: 9999,
        };
        assert_eq!(w.to_string(), "profile 'slow' has a large timeout (9999s)");

        let w = ConfigWarning::MissingOptionalField {
            field: "f".into(),
            hint: "h".into(),
        };
        assert_eq!(w.to_string(), "missing optional field 'f': h");
    }
}
