// SPDX-License-Identifier: MIT OR Apache-2.0
//! xh-exec
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Start external programs from a command string plus an ordered list of
//! [`LaunchOption`]s, and learn how they finished without blocking.
//!
//! ```no_run
//! # async fn demo() -> Result<(), xh_exec::LaunchError> {
//! use xh_exec::{output, with_args, with_env_kv};
//!
//! let out = output("echo", [with_args(["hello"]), with_env_kv(["LANG", "C"])]).await?;
//! assert_eq!(out, b"hello\n");
//! # Ok(())
//! # }
//! ```
//!
//! A launch runs as a fixed pipeline: tokenize the command string, build a
//! [`ProcessDescriptor`], apply every option in order, spawn, then wait in a
//! background task that also runs post-run actions. Launches with paired
//! options do their setup, spawn and cleanup on one dedicated thread. The
//! first failure stops the pipeline, except that cleanup for paired options
//! always runs.

pub mod capture;
pub mod descriptor;
pub mod error;
pub mod launcher;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod option;
pub mod stream;

pub use capture::{combined_output, output};
pub use descriptor::ProcessDescriptor;
pub use error::{LaunchError, OptionError};
pub use launcher::{Completion, SharedCompletion, SharedOutcome, run, start};
#[cfg(target_os = "linux")]
pub use linux::{with_netns, with_on_death_signal_children};
#[cfg(target_os = "linux")]
pub use nix::sys::signal::Signal;
#[cfg(target_os = "linux")]
pub use xh_netns::NsHandle;
pub use option::{
    LaunchOption, Mutator, NamespacePlacement, PairedAction, cmd_option, select_cancel_token,
    with_args, with_cancel, with_dir, with_env_kv, with_env_map, with_environs, with_namespace,
    with_stderr, with_stderr_sink, with_stdin, with_stdin_source, with_stdout, with_stdout_sink,
};
pub use stream::{CaptureBuffer, InputSource, OutputSink};

pub use xh_cancel::CancelToken;
pub use xh_env::{EnvError, EnvList};
pub use xh_netns::{NamespaceError, NamespaceOps};
