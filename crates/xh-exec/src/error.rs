// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for launches and launch options.

use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;
use xh_env::EnvError;
use xh_netns::NamespaceError;

/// Failure reported by one launch option, either while mutating the
/// descriptor before start or while running its post-run action.
#[derive(Debug, Error)]
pub enum OptionError {
    /// Malformed environment input.
    #[error(transparent)]
    Env(#[from] EnvError),

    /// The working directory could not be created.
    #[error("failed to create directory {}: {source}", path.display())]
    Dir {
        /// Directory that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Namespace capture, switch, or restore failed.
    #[error(transparent)]
    Namespace(#[from] NamespaceError),

    /// Free-form failure from a caller-supplied mutator.
    #[error("{0}")]
    Custom(String),

    /// Arbitrary error from a caller-supplied mutator.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl OptionError {
    /// Build an [`OptionError::Custom`] from any message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// Terminal error of one launch, tagged with the pipeline stage that failed.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The command string could not be tokenized.
    #[error("failed to tokenize command {command:?}: {source}")]
    Tokenize {
        /// Command string as supplied.
        command: String,
        /// Tokenizer error.
        #[source]
        source: shell_words::ParseError,
    },

    /// The command string tokenized to nothing.
    #[error("command string is empty")]
    EmptyCommand,

    /// A pre-start mutator failed; no process was started.
    #[error("option #{index} ({label}) failed: {source}")]
    OptionApply {
        /// Position of the option in the supplied list.
        index: usize,
        /// Name of the combinator that produced the option.
        label: &'static str,
        /// What the option reported.
        #[source]
        source: OptionError,
    },

    /// The OS refused to start the process.
    #[error("failed to start process: {0}")]
    Start(#[source] std::io::Error),

    /// The process ran and terminated unsuccessfully (non-zero exit, signal,
    /// or kill after cancellation).
    #[error("process exited unsuccessfully: {status}")]
    Exit {
        /// Exit status observed by the waiter.
        status: ExitStatus,
    },

    /// Waiting for the process failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    /// Copying a standard stream failed.
    #[error("failed to copy {stream}: {source}")]
    Stream {
        /// `"stdin"`, `"stdout"` or `"stderr"`.
        stream: &'static str,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A post-run action failed after the process exited successfully.
    #[error("post-run action of option #{index} ({label}) failed: {source}")]
    PostRun {
        /// Position of the option in the supplied list.
        index: usize,
        /// Name of the combinator that produced the option.
        label: &'static str,
        /// What the action reported.
        #[source]
        source: OptionError,
    },

    /// The completion waiter went away without reporting.
    #[error("completion waiter dropped before reporting a result")]
    WaiterLost,
}

impl LaunchError {
    /// Returns `true` for tokenizer failures, including an empty command.
    pub fn is_tokenize(&self) -> bool {
        matches!(self, Self::Tokenize { .. } | Self::EmptyCommand)
    }

    /// Returns `true` if a pre-start mutator failed.
    pub fn is_option_apply(&self) -> bool {
        matches!(self, Self::OptionApply { .. })
    }

    /// Returns `true` if the process could not be started.
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start(_))
    }

    /// Returns `true` if the process terminated unsuccessfully.
    pub fn is_exit(&self) -> bool {
        matches!(self, Self::Exit { .. })
    }

    /// Returns `true` if a post-run action failed.
    pub fn is_post_run(&self) -> bool {
        matches!(self, Self::PostRun { .. })
    }

    /// Exit code of an unsuccessful process, when it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { status } => status.code(),
            _ => None,
        }
    }
}
