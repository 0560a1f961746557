// SPDX-License-Identifier: MIT OR Apache-2.0
//! The not-yet-started process description that launch options mutate.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use xh_cancel::CancelToken;
use xh_env::EnvList;

use crate::LaunchError;
use crate::stream::{InputSource, OutputSink};

/// Mutable description of a process that has not been started yet.
///
/// Owned by a single launch. Options mutate it in order; once the process is
/// spawned the descriptor is consumed.
#[derive(Debug)]
pub struct ProcessDescriptor {
    program: String,
    /// Arguments after the program name.
    pub args: Vec<String>,
    /// Working directory; `None` inherits the caller's.
    pub dir: Option<PathBuf>,
    /// Explicit environment; `None` inherits the caller's environment.
    pub env: Option<EnvList>,
    /// Reader bound to stdin; `None` connects the null device.
    pub stdin: Option<InputSource>,
    /// Writers receiving stdout, in binding order; empty connects the null device.
    pub stdout: Vec<OutputSink>,
    /// Writers receiving stderr, in binding order; empty connects the null device.
    pub stderr: Vec<OutputSink>,
    /// Signal delivered to the child when its parent thread dies.
    #[cfg(target_os = "linux")]
    pub death_signal: Option<nix::sys::signal::Signal>,
    cancel: Option<CancelToken>,
}

impl ProcessDescriptor {
    /// Build a descriptor from a tokenized argument vector.
    pub fn new(argv: Vec<String>, cancel: Option<CancelToken>) -> Result<Self, LaunchError> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(LaunchError::EmptyCommand)?;
        Ok(Self {
            program,
            args: argv.collect(),
            dir: None,
            env: None,
            stdin: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            #[cfg(target_os = "linux")]
            death_signal: None,
            cancel,
        })
    }

    /// Program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Cancellation token the process is bound to.
    pub fn cancel_token(&self) -> Option<&CancelToken> {
        self.cancel.as_ref()
    }

    /// Environment list, created empty on first use.
    ///
    /// Once created the child no longer inherits the caller's environment.
    pub fn env_mut(&mut self) -> &mut EnvList {
        self.env.get_or_insert_with(EnvList::new)
    }

    /// Returns `true` when stdout and stderr are bound to the same sinks in
    /// the same order.
    pub fn shares_output_sinks(&self) -> bool {
        !self.stdout.is_empty()
            && self.stdout.len() == self.stderr.len()
            && self
                .stdout
                .iter()
                .zip(&self.stderr)
                .all(|(a, b)| a.same_sink(b))
    }

    /// Translate into a command ready to spawn.
    ///
    /// Streams with bindings become pipes that the launcher services;
    /// unbound streams go to the null device. On Linux, stdout and stderr
    /// bound to the same sinks share one pipe so their writes stay ordered.
    pub(crate) fn to_command(&self) -> io::Result<(Command, OutputWiring)> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }

        if let Some(env) = &self.env {
            cmd.env_clear();
            cmd.envs(env.iter());
        }

        cmd.stdin(piped_if(self.stdin.is_some()));

        #[cfg(target_os = "linux")]
        if let Some(signal) = self.death_signal {
            crate::linux::set_death_signal(&mut cmd, signal);
        }

        #[cfg(target_os = "linux")]
        if self.shares_output_sinks() {
            let (reader, writer) = crate::stream::merged_pipe()?;
            cmd.stdout(Stdio::from(writer.try_clone()?))
                .stderr(Stdio::from(writer));
            return Ok((cmd, OutputWiring::Merged(reader)));
        }

        cmd.stdout(piped_if(!self.stdout.is_empty()))
            .stderr(piped_if(!self.stderr.is_empty()));
        Ok((cmd, OutputWiring::Separate))
    }
}

/// How the child's stdout and stderr reach their sinks.
pub(crate) enum OutputWiring {
    /// One pipe per bound stream.
    Separate,
    /// Both streams write into one pipe.
    #[cfg(target_os = "linux")]
    Merged(tokio::net::unix::pipe::Receiver),
}

fn piped_if(bound: bool) -> Stdio {
    if bound { Stdio::piped() } else { Stdio::null() }
}
