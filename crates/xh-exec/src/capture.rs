// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output-capturing wrappers over [`run`].

use crate::error::LaunchError;
use crate::launcher::run;
use crate::option::{LaunchOption, with_stderr_sink, with_stdout_sink};
use crate::stream::{CaptureBuffer, OutputSink};

/// Run `command` and return everything it wrote to stdout.
///
/// The capture is appended after the caller's options, so writers the
/// caller bound to stdout still receive the same bytes.
pub async fn output<I>(command: &str, options: I) -> Result<Vec<u8>, LaunchError>
where
    I: IntoIterator<Item = LaunchOption>,
{
    let buf = CaptureBuffer::new();
    let options = options
        .into_iter()
        .chain([with_stdout_sink(buf.clone())]);
    run(command, options).await?;
    Ok(buf.take())
}

/// Run `command` and return stdout and stderr interleaved in write order.
///
/// Both streams are bound to one sink. Unless the caller bound extra writers
/// to only one of them, the child writes both into a single pipe on Linux.
pub async fn combined_output<I>(command: &str, options: I) -> Result<Vec<u8>, LaunchError>
where
    I: IntoIterator<Item = LaunchOption>,
{
    let buf = CaptureBuffer::new();
    let sink = OutputSink::from(buf.clone());
    let options = options
        .into_iter()
        .chain([with_stdout_sink(sink.clone()), with_stderr_sink(sink)]);
    run(command, options).await?;
    Ok(buf.take())
}
