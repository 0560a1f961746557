// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command implementations for the `xh` CLI.
//!
//! Launch settings come from two layers: the selected configuration
//! profile, then the command-line flags. Both become ordinary launch
//! options, profile options first, so flags win by the usual
//! last-write-wins and upsert rules.

use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info};
use xh_config::{LaunchConfig, Profile, load_config, validate_config};
use xh_exec::{
    CancelToken, EnvList, LaunchError, LaunchOption, cmd_option, combined_output, output, run,
    with_args, with_cancel, with_dir, with_env_kv, with_env_map, with_stderr, with_stdin,
    with_stdout,
};

/// Flags shared by every launching subcommand.
#[derive(Args, Debug, Default, Clone)]
pub struct LaunchArgs {
    /// Path to a TOML launch configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Profile from the configuration to apply.
    #[arg(long)]
    pub profile: Option<String>,

    /// Working directory, created if missing.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Environment entry as KEY=VALUE. Can be repeated.
    #[arg(long = "env")]
    pub env: Vec<String>,

    /// Extra argument appended to the command. Can be repeated.
    #[arg(long = "arg", allow_hyphen_values = true)]
    pub args: Vec<String>,

    /// Kill the process after this many seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

/// Load the configuration named by `path`, or the defaults.
pub fn load(path: Option<&std::path::Path>) -> Result<LaunchConfig> {
    let config = load_config(path).context("load launch config")?;
    validate_config(&config).context("validate launch config")?;
    Ok(config)
}

/// Ordered options for one launch plus the token that stops it.
pub struct LaunchPlan {
    /// Options in application order.
    pub options: Vec<LaunchOption>,
    /// Fired on timeout or Ctrl-C.
    pub cancel: CancelToken,
}

/// Translate profile and flags into launch options.
///
/// Must be called inside a Tokio runtime when a timeout is configured.
pub fn plan(profile: Option<&Profile>, args: &LaunchArgs) -> Result<LaunchPlan> {
    let cli_env = args
        .env
        .iter()
        .map(|raw| parse_key_value_flag(raw, "--env"))
        .collect::<Result<Vec<_>>>()?;

    let mut options = Vec::new();

    let inherit = profile.is_none_or(|p| p.inherit_env);
    let sets_env = profile.is_some_and(|p| !p.env.is_empty()) || !cli_env.is_empty();
    if !inherit {
        options.push(cmd_option(|desc| {
            desc.env = Some(EnvList::new());
            Ok(())
        }));
    } else if sets_env {
        // Any explicit entry replaces the inherited environment, so seed it.
        options.push(with_env_map(inherited_env()));
    }

    if let Some(profile) = profile {
        if let Some(dir) = &profile.dir {
            options.push(with_dir(dir));
        }
        if !profile.args.is_empty() {
            options.push(with_args(profile.args.clone()));
        }
        if !profile.env.is_empty() {
            options.push(with_env_map(profile.env.clone()));
        }
    }

    if let Some(dir) = &args.dir {
        options.push(with_dir(dir));
    }
    if !args.args.is_empty() {
        options.push(with_args(args.args.clone()));
    }
    if !cli_env.is_empty() {
        options.push(with_env_kv(cli_env.into_iter().flat_map(|(k, v)| [k, v])));
    }

    let cancel = CancelToken::new();
    let timeout = args
        .timeout_secs
        .or(profile.and_then(|p| p.timeout_secs));
    if let Some(secs) = timeout {
        debug!(target: "xh.cli", "launch times out after {secs}s");
        let _timer = cancel.cancel_after(Duration::from_secs(secs));
    }
    options.push(with_cancel(cancel.clone()));

    Ok(LaunchPlan { options, cancel })
}

fn inherited_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .filter(|(k, _)| !k.is_empty())
        .collect()
}

fn parse_key_value_flag(raw: &str, flag_name: &str) -> Result<(String, String)> {
    let (raw_key, raw_value) = raw
        .split_once('=')
        .with_context(|| format!("{flag_name} expects KEY=VALUE, got '{raw}'"))?;

    let key = raw_key.trim();
    if key.is_empty() {
        anyhow::bail!("{flag_name} key cannot be empty (got '{raw}')");
    }

    Ok((key.to_string(), raw_value.to_string()))
}

/// Fire `cancel` when the user presses Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "xh.cli", "interrupted, stopping process");
            cancel.cancel();
        }
    });
}

/// `xh run`: stream the child's output through and mirror its exit code.
pub async fn cmd_run(
    config: &LaunchConfig,
    args: &LaunchArgs,
    command: &str,
    forward_stdin: bool,
) -> Result<ExitCode> {
    let profile = config.select_profile(args.profile.as_deref())?;
    let LaunchPlan {
        mut options,
        cancel,
    } = plan(profile, args)?;
    cancel_on_ctrl_c(cancel);

    options.push(with_stdout(tokio::io::stdout()));
    options.push(with_stderr(tokio::io::stderr()));
    if forward_stdin {
        options.push(with_stdin(tokio::io::stdin()));
    }

    match run(command, options).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => exit_for(err),
    }
}

/// `xh output`: capture the child's output and print it once it exits.
pub async fn cmd_output(
    config: &LaunchConfig,
    args: &LaunchArgs,
    command: &str,
    combined: bool,
) -> Result<ExitCode> {
    let profile = config.select_profile(args.profile.as_deref())?;
    let LaunchPlan { options, cancel } = plan(profile, args)?;
    cancel_on_ctrl_c(cancel);

    let captured = if combined {
        combined_output(command, options).await
    } else {
        output(command, options).await
    };
    match captured {
        Ok(bytes) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("write captured output")?;
            stdout.flush().context("flush stdout")?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => exit_for(err),
    }
}

/// `xh config check`: validate a configuration and report warnings.
pub fn cmd_config_check(path: Option<&std::path::Path>) -> Result<ExitCode> {
    let config = load_config(path).context("load launch config")?;
    let warnings = validate_config(&config).context("validate launch config")?;
    for w in &warnings {
        eprintln!("warning: {w}");
    }
    let names: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
    println!("config ok ({} profiles: {})", names.len(), names.join(", "));
    Ok(ExitCode::SUCCESS)
}

// Non-zero exits mirror the child's code; every other failure is an error.
fn exit_for(err: LaunchError) -> Result<ExitCode> {
    if let LaunchError::Exit { status } = &err {
        debug!(target: "xh.cli", "child failed: {err}");
        return Ok(ExitCode::from(exit_byte(status)));
    }
    Err(err).context("launch failed")
}

fn exit_byte(status: &std::process::ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(1).max(1);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(1);
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn labels(plan: &LaunchPlan) -> Vec<&'static str> {
        plan.options.iter().map(LaunchOption::label).collect()
    }

    #[tokio::test]
    async fn plain_flags_keep_inherited_env() {
        let plan = plan(None, &LaunchArgs::default()).unwrap();
        assert_eq!(labels(&plan), vec!["with_cancel"]);
    }

    #[tokio::test]
    async fn profile_options_precede_flags() {
        let profile = Profile {
            dir: Some("/tmp".into()),
            args: vec!["p".into()],
            env: BTreeMap::from([("K".into(), "profile".into())]),
            ..Profile::default()
        };
        let args = LaunchArgs {
            dir: Some("/".into()),
            args: vec!["c".into()],
            env: vec!["K=cli".into()],
            ..LaunchArgs::default()
        };
        let plan = plan(Some(&profile), &args).unwrap();
        assert_eq!(
            labels(&plan),
            vec![
                "with_env_map",
                "with_dir",
                "with_args",
                "with_env_map",
                "with_dir",
                "with_args",
                "with_env_kv",
                "with_cancel",
            ]
        );
    }

    #[tokio::test]
    async fn cli_env_overrides_profile_env() {
        let profile = Profile {
            env: BTreeMap::from([("XH_LAYER".into(), "profile".into())]),
            ..Profile::default()
        };
        let args = LaunchArgs {
            env: vec!["XH_LAYER=cli".into()],
            ..LaunchArgs::default()
        };
        let plan = plan(Some(&profile), &args).unwrap();
        let out = output("printenv XH_LAYER", plan.options).await.unwrap();
        assert_eq!(out, b"cli\n");
    }

    #[tokio::test]
    async fn inherited_env_survives_explicit_entries() {
        let args = LaunchArgs {
            env: vec!["XH_EXTRA=1".into()],
            ..LaunchArgs::default()
        };
        let plan = plan(None, &args).unwrap();
        let out = output("printenv PATH", plan.options).await.unwrap();
        assert!(!out.is_empty());
    }

    #[tokio::test]
    async fn isolated_profile_starts_from_empty_env() {
        let profile = Profile {
            inherit_env: false,
            env: BTreeMap::from([("ONLY".into(), "me".into())]),
            ..Profile::default()
        };
        let plan = plan(Some(&profile), &LaunchArgs::default()).unwrap();
        let out = output("printenv", plan.options).await.unwrap();
        assert_eq!(out, b"ONLY=me\n");
    }

    #[tokio::test]
    async fn profile_timeout_cancels_launch() {
        let profile = Profile {
            timeout_secs: Some(1),
            ..Profile::default()
        };
        let plan = plan(Some(&profile), &LaunchArgs::default()).unwrap();
        let err = run("sleep 600", plan.options).await.unwrap_err();
        assert!(err.is_exit());
        assert!(plan.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn malformed_env_flag_is_rejected() {
        let args = LaunchArgs {
            env: vec!["NOEQUALS".into()],
            ..LaunchArgs::default()
        };
        let err = plan(None, &args).err().unwrap();
        assert!(err.to_string().contains("KEY=VALUE"));

        let args = LaunchArgs {
            env: vec!["=v".into()],
            ..LaunchArgs::default()
        };
        assert!(plan(None, &args).is_err());
    }

    #[test]
    fn exit_byte_mirrors_code() {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(exit_byte(&std::process::ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_byte(&std::process::ExitStatus::from_raw(9)), 137);
    }
}
