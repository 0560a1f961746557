// SPDX-License-Identifier: MIT OR Apache-2.0
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use schemars::schema_for;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use xh_config::{LaunchConfig, Profile, validate_config};

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Repo maintenance tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate the JSON Schema of the launch configuration file.
    Schema {
        /// Output directory.
        #[arg(long, default_value = "contracts/schemas")]
        out_dir: PathBuf,
    },
    /// Print a sample launch configuration to stdout.
    SampleConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Schema { out_dir } => schema(out_dir),
        Command::SampleConfig => sample_config(),
    }
}

fn schema(out_dir: PathBuf) -> Result<()> {
    std::fs::create_dir_all(&out_dir).context("create schema output dir")?;

    let config = schema_for!(LaunchConfig);
    write_schema(&out_dir.join("launch_config.schema.json"), &config)?;

    eprintln!("wrote schemas to {}", out_dir.display());
    Ok(())
}

fn write_schema(path: &Path, schema: &schemars::Schema) -> Result<()> {
    let s = serde_json::to_string_pretty(schema)?;
    std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn sample_config() -> Result<()> {
    let build = Profile {
        dir: Some("target/work".into()),
        args: vec!["--verbose".into()],
        timeout_secs: Some(600),
        env: BTreeMap::from([("RUST_LOG".into(), "debug".into())]),
        inherit_env: true,
    };
    let config = LaunchConfig {
        log_level: Some("info".into()),
        default_profile: Some("build".into()),
        profiles: BTreeMap::from([("build".into(), build)]),
    };
    validate_config(&config).context("sample config must validate")?;
    print!("{}", toml::to_string(&config).context("serialize sample config")?);
    Ok(())
}
