// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch pipeline: tokenize, build, apply options, spawn, wait, clean up.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::{Arc, mpsc};
use std::task::{Context, Poll};
use std::thread;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, watch};
use tokio::sync::oneshot::error::TryRecvError;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, debug, warn};
use xh_cancel::CancelToken;

use crate::descriptor::{OutputWiring, ProcessDescriptor};
use crate::error::LaunchError;
use crate::option::{LaunchOption, select_cancel_token};
use crate::stream::{InputSource, OutputSink, fan_out};

/// Pending outcome of one launch.
///
/// Resolves exactly once: `Ok(())` when the process exited successfully and
/// every post-run action succeeded, otherwise the first error of the launch.
/// It never resolves before all post-run actions have finished.
#[must_use = "a launch reports its outcome only through its Completion"]
#[derive(Debug)]
pub struct Completion {
    rx: oneshot::Receiver<Result<(), LaunchError>>,
    pid: Option<u32>,
}

impl Completion {
    fn ready(result: Result<(), LaunchError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx, pid: None }
    }

    /// OS process id, when a process was started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take the outcome without waiting, or get the still-pending completion back.
    pub fn try_result(mut self) -> Result<Result<(), LaunchError>, Self> {
        match self.rx.try_recv() {
            Ok(result) => Ok(result),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Closed) => Ok(Err(LaunchError::WaiterLost)),
        }
    }

    /// Turn this completion into a clonable handle that any number of
    /// readers can wait on.
    pub fn shared(self) -> SharedCompletion {
        let pid = self.pid;
        let pending = match self.try_result() {
            Ok(result) => {
                let (_tx, rx) = watch::channel(Some(Arc::new(result)));
                return SharedCompletion { rx, pid };
            }
            Err(pending) => pending,
        };

        let (tx, rx) = watch::channel(None);
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let result = pending.await;
                    let _ = tx.send(Some(Arc::new(result)));
                });
            }
            Err(_) => {
                thread::spawn(move || {
                    let result = pending
                        .rx
                        .blocking_recv()
                        .unwrap_or(Err(LaunchError::WaiterLost));
                    let _ = tx.send(Some(Arc::new(result)));
                });
            }
        }
        SharedCompletion { rx, pid }
    }
}

impl Future for Completion {
    type Output = Result<(), LaunchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(LaunchError::WaiterLost)))
    }
}

/// Outcome of one launch shared between any number of readers.
///
/// Built by [`Completion::shared`]. The outcome is set once; every clone
/// then observes the same value.
#[derive(Debug, Clone)]
pub struct SharedCompletion {
    rx: watch::Receiver<Option<SharedOutcome>>,
    pid: Option<u32>,
}

/// Launch outcome as seen through a [`SharedCompletion`].
pub type SharedOutcome = Arc<Result<(), LaunchError>>;

impl SharedCompletion {
    /// OS process id, when a process was started.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The outcome, if the launch has resolved.
    pub fn try_result(&self) -> Option<SharedOutcome> {
        self.rx.borrow().clone()
    }

    /// Wait for the outcome. May be called repeatedly and from every clone.
    pub async fn wait(&self) -> SharedOutcome {
        if let Some(outcome) = self.try_result() {
            return outcome;
        }
        let mut rx = self.rx.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Arc::new(Err(LaunchError::WaiterLost)))
    }
}

/// Start `command` with `options` and return without waiting for it to exit.
///
/// Tokenizing, option application and spawning happen before this returns;
/// their failures come back as an already-resolved [`Completion`]. Must be
/// called from within a Tokio runtime.
///
/// When any option carries a post-run action, setup, spawn and cleanup run
/// on a dedicated thread that waits for the process; the calling thread is
/// left exactly as it was.
pub fn start<I>(command: &str, options: I) -> Completion
where
    I: IntoIterator<Item = LaunchOption>,
{
    let options: Vec<LaunchOption> = options.into_iter().collect();
    launch(command, options).unwrap_or_else(|e| Completion::ready(Err(e)))
}

/// Start `command` and wait for its outcome.
pub async fn run<I>(command: &str, options: I) -> Result<(), LaunchError>
where
    I: IntoIterator<Item = LaunchOption>,
{
    start(command, options).await
}

fn launch(command: &str, options: Vec<LaunchOption>) -> Result<Completion, LaunchError> {
    let cancel = select_cancel_token(&options);

    let argv = shell_words::split(command).map_err(|source| LaunchError::Tokenize {
        command: command.to_string(),
        source,
    })?;
    let desc = ProcessDescriptor::new(argv, cancel)?;
    let handle = Handle::try_current().map_err(|_| {
        LaunchError::Start(io::Error::other(
            "launches must be started from within a Tokio runtime",
        ))
    })?;

    if options.iter().any(LaunchOption::has_post_run) {
        return launch_pinned(handle, desc, options);
    }

    let started = Started::prepare(desc, &options)?;
    let pid = started.pid;
    let (tx, rx) = oneshot::channel();
    handle.spawn(async move {
        let mut first = started.finish().await;
        run_post_run(&mut first, &options);
        let _ = tx.send(first.map_or(Ok(()), Err));
    });
    Ok(Completion { rx, pid })
}

/// Launch with paired options on one dedicated OS thread.
///
/// Thread-scoped setup such as `setns(2)` only affects the thread that runs
/// it, so setup, spawn and cleanup all happen on the same thread and the
/// caller's thread is never switched.
fn launch_pinned(
    handle: Handle,
    desc: ProcessDescriptor,
    options: Vec<LaunchOption>,
) -> Result<Completion, LaunchError> {
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let (tx, rx) = oneshot::channel();
    let dispatch = tracing::dispatcher::get_default(Dispatch::clone);
    thread::Builder::new()
        .name("xh-launch".into())
        .spawn(move || {
            let _logging = tracing::dispatcher::set_default(&dispatch);
            let started = {
                let _enter = handle.enter();
                Started::prepare(desc, &options)
            };
            let started = match started {
                Ok(started) => started,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(started.pid));

            let (done_tx, done_rx) = oneshot::channel();
            handle.spawn(
                async move {
                    let _ = done_tx.send(started.finish().await);
                }
                .with_current_subscriber(),
            );
            // Blocks only until the process and its streams are done.
            let mut first = done_rx
                .blocking_recv()
                .unwrap_or(Some(LaunchError::WaiterLost));
            run_post_run(&mut first, &options);
            let _ = tx.send(first.map_or(Ok(()), Err));
        })
        .map_err(LaunchError::Start)?;

    let pid = ready_rx.recv().map_err(|_| LaunchError::WaiterLost)??;
    Ok(Completion { rx, pid })
}

/// A spawned process with its stream bindings, not yet waited on.
struct Started {
    child: Child,
    pid: Option<u32>,
    cancel: Option<CancelToken>,
    pipes: Pipes,
}

impl Started {
    /// Apply every option in order, then spawn. Attempted cleanups run on failure.
    fn prepare(mut desc: ProcessDescriptor, options: &[LaunchOption]) -> Result<Self, LaunchError> {
        for (index, option) in options.iter().enumerate() {
            if let Err(source) = option.apply(&mut desc) {
                undo_attempted(&options[..=index]);
                return Err(LaunchError::OptionApply {
                    index,
                    label: option.label(),
                    source,
                });
            }
        }

        let (mut child, wiring) = match spawn(&desc) {
            Ok(spawned) => spawned,
            Err(e) => {
                undo_attempted(options);
                return Err(e);
            }
        };
        let pid = child.id();
        debug!(
            target: "xh.exec",
            "spawned {} ({} args) pid={pid:?}",
            desc.program(),
            desc.args.len()
        );

        let stdin = child.stdin.take().zip(desc.stdin.take());
        let pipes = match wiring {
            OutputWiring::Separate => Pipes {
                stdin,
                stdout: child
                    .stdout
                    .take()
                    .map(|p| (boxed(p), std::mem::take(&mut desc.stdout))),
                stderr: child
                    .stderr
                    .take()
                    .map(|p| (boxed(p), std::mem::take(&mut desc.stderr))),
            },
            #[cfg(target_os = "linux")]
            OutputWiring::Merged(reader) => Pipes {
                stdin,
                stdout: Some((boxed(reader), std::mem::take(&mut desc.stdout))),
                stderr: None,
            },
        };

        Ok(Self {
            child,
            pid,
            cancel: desc.cancel_token().cloned(),
            pipes,
        })
    }

    /// Wait for exit and drain the output streams; returns the first error.
    async fn finish(mut self) -> Option<LaunchError> {
        let Pipes {
            stdin,
            stdout,
            stderr,
        } = self.pipes;
        let ((status, stdin), stdout, stderr) = tokio::join!(
            exit_while_feeding(&mut self.child, self.cancel, stdin),
            drain("stdout", stdout),
            drain("stderr", stderr),
        );

        debug!(target: "xh.exec", "process exited: {status:?}");
        let mut first = match status {
            Err(e) => Some(LaunchError::Wait(e)),
            Ok(status) if !status.success() => Some(LaunchError::Exit { status }),
            Ok(_) => None,
        };
        for stream_err in [stdin, stdout, stderr].into_iter().filter_map(Result::err) {
            record(&mut first, stream_err);
        }
        first
    }
}

fn spawn(desc: &ProcessDescriptor) -> Result<(Child, OutputWiring), LaunchError> {
    let (mut cmd, wiring) = desc.to_command().map_err(LaunchError::Start)?;
    let child = cmd.spawn().map_err(LaunchError::Start)?;
    // `cmd` drops here, closing the parent's copy of any shared write end.
    Ok((child, wiring))
}

fn boxed<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> PipeReader {
    Box::new(reader)
}

/// Run the cleanup half of every paired option whose setup was attempted.
fn undo_attempted(attempted: &[LaunchOption]) {
    for (index, option) in attempted.iter().enumerate() {
        if let Some(Err(e)) = option.post_run() {
            warn!(
                target: "xh.exec",
                "cleanup of option #{index} ({}) failed after aborted launch: {e}",
                option.label()
            );
        }
    }
}

type PipeReader = Box<dyn AsyncRead + Send + Unpin>;

struct Pipes {
    stdin: Option<(ChildStdin, InputSource)>,
    stdout: Option<(PipeReader, Vec<OutputSink>)>,
    stderr: Option<(PipeReader, Vec<OutputSink>)>,
}

fn run_post_run(first: &mut Option<LaunchError>, options: &[LaunchOption]) {
    for (index, option) in options.iter().enumerate() {
        if let Some(Err(source)) = option.post_run() {
            record(
                first,
                LaunchError::PostRun {
                    index,
                    label: option.label(),
                    source,
                },
            );
        }
    }
}

fn record(first: &mut Option<LaunchError>, err: LaunchError) {
    match first {
        None => *first = Some(err),
        Some(primary) => {
            warn!(target: "xh.exec", "suppressed secondary error ({primary} reported): {err}")
        }
    }
}

async fn wait_for_exit(child: &mut Child, cancel: Option<CancelToken>) -> io::Result<ExitStatus> {
    let Some(cancel) = cancel else {
        return child.wait().await;
    };
    tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            debug!(target: "xh.exec", "cancellation fired, killing pid={:?}", child.id());
            if let Err(e) = child.start_kill() {
                warn!(target: "xh.exec", "failed to kill cancelled process: {e}");
            }
            child.wait().await
        }
    }
}

/// Wait for exit while copying stdin into the child.
///
/// The copy is abandoned once the process has exited, so a source that never
/// reaches end of input cannot hold the launch open.
async fn exit_while_feeding(
    child: &mut Child,
    cancel: Option<CancelToken>,
    stdin: Option<(ChildStdin, InputSource)>,
) -> (io::Result<ExitStatus>, Result<(), LaunchError>) {
    let exited = wait_for_exit(child, cancel);
    let feed = feed_stdin(stdin);
    tokio::pin!(exited, feed);

    let mut fed = None;
    loop {
        tokio::select! {
            status = &mut exited => return (status, fed.unwrap_or(Ok(()))),
            result = &mut feed, if fed.is_none() => fed = Some(result),
        }
    }
}

async fn feed_stdin(binding: Option<(ChildStdin, InputSource)>) -> Result<(), LaunchError> {
    let Some((mut pipe, source)) = binding else {
        return Ok(());
    };
    let copied = match source.copy_into(&mut pipe).await {
        Ok(_) => pipe.shutdown().await,
        Err(e) => Err(e),
    };
    drop(pipe);
    match copied {
        // The child may exit without reading all of its input.
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(source) => Err(LaunchError::Stream {
            stream: "stdin",
            source,
        }),
        Ok(()) => Ok(()),
    }
}

async fn drain(
    stream: &'static str,
    binding: Option<(PipeReader, Vec<OutputSink>)>,
) -> Result<(), LaunchError> {
    let Some((pipe, sinks)) = binding else {
        return Ok(());
    };
    fan_out(pipe, sinks)
        .await
        .map_err(|source| LaunchError::Stream { stream, source })
}
