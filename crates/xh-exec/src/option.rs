// SPDX-License-Identifier: MIT OR Apache-2.0
//! Launch options and the combinators that build them.
//!
//! A [`LaunchOption`] is a plain value: building one does no work (the
//! namespace combinators are the one exception, they capture the current
//! namespace at construction). Options are applied to a
//! [`ProcessDescriptor`] strictly in the order the caller supplied them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use xh_cancel::CancelToken;
use xh_env::{EnvError, check_key, pairs_from_entries, pairs_from_flat};
use xh_netns::{NamespaceError, NamespaceOps};

use crate::descriptor::ProcessDescriptor;
use crate::error::OptionError;
use crate::stream::{InputSource, OutputSink};

/// Pre-start mutation applied to a descriptor.
pub type Mutator = Arc<dyn Fn(&mut ProcessDescriptor) -> Result<(), OptionError> + Send + Sync>;

/// A setup step paired with a cleanup step.
///
/// The launcher runs [`post_run`](PairedAction::post_run) exactly once for
/// every [`pre_start`](PairedAction::pre_start) it attempted, whether the
/// setup, the spawn, or the process succeeded or not.
pub trait PairedAction: Send + Sync {
    /// Setup, run before the process starts on the thread that spawns it.
    /// [`post_run`](Self::post_run) later runs on that same thread.
    fn pre_start(&self, desc: &mut ProcessDescriptor) -> Result<(), OptionError>;

    /// Cleanup, run after the process exits (or after a failed setup).
    fn post_run(&self) -> Result<(), OptionError>;
}

/// One configuration instruction for a launch.
#[derive(Clone)]
pub enum LaunchOption {
    /// Mutates the descriptor before start.
    Mutate {
        /// Name of the combinator that built the option.
        label: &'static str,
        /// The mutation.
        mutator: Mutator,
    },
    /// Supplies the cancellation token the process is bound to.
    Cancel(CancelToken),
    /// Mutates before start and runs a cleanup after exit.
    Paired {
        /// Name of the combinator that built the option.
        label: &'static str,
        /// The setup/cleanup pair.
        action: Arc<dyn PairedAction>,
    },
}

impl LaunchOption {
    /// Name of the combinator that built this option.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Mutate { label, .. } | Self::Paired { label, .. } => label,
            Self::Cancel(_) => "with_cancel",
        }
    }

    /// Cancellation token carried by this option, if any.
    pub fn cancel_token(&self) -> Option<&CancelToken> {
        match self {
            Self::Cancel(token) => Some(token),
            _ => None,
        }
    }

    /// Returns `true` if the option has a post-run action.
    pub fn has_post_run(&self) -> bool {
        matches!(self, Self::Paired { .. })
    }

    /// Run the pre-start half against `desc`. Cancellation options do nothing.
    pub fn apply(&self, desc: &mut ProcessDescriptor) -> Result<(), OptionError> {
        match self {
            Self::Mutate { mutator, .. } => mutator(desc),
            Self::Cancel(_) => Ok(()),
            Self::Paired { action, .. } => action.pre_start(desc),
        }
    }

    /// Run the post-run half, if the option has one.
    pub fn post_run(&self) -> Option<Result<(), OptionError>> {
        match self {
            Self::Paired { action, .. } => Some(action.post_run()),
            _ => None,
        }
    }

    pub(crate) fn mutate<F>(label: &'static str, f: F) -> Self
    where
        F: Fn(&mut ProcessDescriptor) -> Result<(), OptionError> + Send + Sync + 'static,
    {
        Self::Mutate {
            label,
            mutator: Arc::new(f),
        }
    }
}

impl fmt::Debug for LaunchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutate { label, .. } => f.debug_tuple("Mutate").field(label).finish(),
            Self::Cancel(token) => f.debug_tuple("Cancel").field(token).finish(),
            Self::Paired { label, .. } => f.debug_tuple("Paired").field(label).finish(),
        }
    }
}

/// Pick the cancellation token for a launch: the last option carrying one wins.
pub fn select_cancel_token(options: &[LaunchOption]) -> Option<CancelToken> {
    options
        .iter()
        .rev()
        .find_map(LaunchOption::cancel_token)
        .cloned()
}

// ---------------------------------------------------------------------------
// Combinators
// ---------------------------------------------------------------------------

/// Wrap an arbitrary descriptor mutation as an option.
pub fn cmd_option<F>(f: F) -> LaunchOption
where
    F: Fn(&mut ProcessDescriptor) -> Result<(), OptionError> + Send + Sync + 'static,
{
    LaunchOption::mutate("cmd_option", f)
}

/// Bind the process to `token`: firing it kills the process.
pub fn with_cancel(token: CancelToken) -> LaunchOption {
    LaunchOption::Cancel(token)
}

/// Append arguments after those parsed from the command string.
pub fn with_args<I, S>(args: I) -> LaunchOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    LaunchOption::mutate("with_args", move |desc| {
        desc.args.extend(args.iter().cloned());
        Ok(())
    })
}

/// Run in `dir`, creating it (and any parents) first if it does not exist.
pub fn with_dir(dir: impl Into<PathBuf>) -> LaunchOption {
    let dir = dir.into();
    LaunchOption::mutate("with_dir", move |desc| {
        ensure_dir(&dir)?;
        desc.dir = Some(dir.clone());
        Ok(())
    })
}

fn ensure_dir(dir: &Path) -> Result<(), OptionError> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    std::os::unix::fs::DirBuilderExt::mode(&mut builder, 0o750);
    builder.create(dir).map_err(|source| OptionError::Dir {
        path: dir.to_path_buf(),
        source,
    })
}

/// Read stdin from `reader`. A later stdin binding replaces this one.
pub fn with_stdin<R: AsyncRead + Send + Unpin + 'static>(reader: R) -> LaunchOption {
    with_stdin_source(InputSource::new(reader))
}

/// Read stdin from a shared [`InputSource`].
pub fn with_stdin_source(source: InputSource) -> LaunchOption {
    LaunchOption::mutate("with_stdin", move |desc| {
        desc.stdin = Some(source.clone());
        Ok(())
    })
}

/// Copy stdout into `writer`, in addition to any writer bound earlier.
pub fn with_stdout<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> LaunchOption {
    with_stdout_sink(OutputSink::new(writer))
}

/// Copy stdout into a shared [`OutputSink`].
pub fn with_stdout_sink(sink: impl Into<OutputSink>) -> LaunchOption {
    let sink = sink.into();
    LaunchOption::mutate("with_stdout", move |desc| {
        desc.stdout.push(sink.clone());
        Ok(())
    })
}

/// Copy stderr into `writer`, in addition to any writer bound earlier.
pub fn with_stderr<W: AsyncWrite + Send + Unpin + 'static>(writer: W) -> LaunchOption {
    with_stderr_sink(OutputSink::new(writer))
}

/// Copy stderr into a shared [`OutputSink`].
pub fn with_stderr_sink(sink: impl Into<OutputSink>) -> LaunchOption {
    let sink = sink.into();
    LaunchOption::mutate("with_stderr", move |desc| {
        desc.stderr.push(sink.clone());
        Ok(())
    })
}

/// Set environment entries from a flat `[k1, v1, k2, v2, ..]` sequence.
///
/// Existing entries for a key are replaced in place. An odd-length sequence
/// fails when the option is applied, before any process starts.
pub fn with_env_kv<I, S>(flat: I) -> LaunchOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let flat: Vec<String> = flat.into_iter().map(Into::into).collect();
    env_option("with_env_kv", pairs_from_flat(&flat))
}

/// Set environment entries from `"key=value"` strings.
pub fn with_environs<I, S>(entries: I) -> LaunchOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
    env_option("with_environs", pairs_from_entries(&entries))
}

/// Set environment entries from a map.
///
/// Keys are applied in sorted order so repeated launches see the same list.
pub fn with_env_map<I, K, V>(map: I) -> LaunchOption
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let sorted: BTreeMap<String, String> = map
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect();
    let pairs = sorted
        .iter()
        .try_for_each(|(k, v)| check_key(k, v))
        .map(|()| sorted.into_iter().collect());
    env_option("with_env_map", pairs)
}

// Malformed input is detected eagerly but reported at apply time, so the
// failure surfaces as an option-application error of the launch.
fn env_option(label: &'static str, pairs: Result<Vec<(String, String)>, EnvError>) -> LaunchOption {
    LaunchOption::mutate(label, move |desc| match &pairs {
        Ok(pairs) => {
            desc.env_mut().upsert_all(pairs.iter().map(|(k, v)| (k, v)));
            Ok(())
        }
        Err(e) => Err(e.clone().into()),
    })
}

// ---------------------------------------------------------------------------
// Namespace placement
// ---------------------------------------------------------------------------

/// Switch to a namespace before start and restore the original after exit.
///
/// The original namespace is captured when the placement is built. If that
/// capture failed, both halves report the capture error and never touch
/// the namespace.
pub struct NamespacePlacement<N: NamespaceOps> {
    ops: N,
    target: N::Handle,
    original: Result<N::Handle, Arc<NamespaceError>>,
}

impl<N: NamespaceOps> NamespacePlacement<N> {
    /// Capture the current namespace through `ops` and pair it with `target`.
    pub fn new(ops: N, target: N::Handle) -> Self {
        let original = ops.get().map_err(Arc::new);
        Self {
            ops,
            target,
            original,
        }
    }

    fn capture_error(e: &Arc<NamespaceError>) -> OptionError {
        OptionError::Namespace(NamespaceError::Other(format!(
            "unable to retrieve original namespace handle: {e}"
        )))
    }
}

impl<N: NamespaceOps> PairedAction for NamespacePlacement<N> {
    fn pre_start(&self, _desc: &mut ProcessDescriptor) -> Result<(), OptionError> {
        match &self.original {
            Ok(_) => Ok(self.ops.set(&self.target)?),
            Err(e) => Err(Self::capture_error(e)),
        }
    }

    fn post_run(&self) -> Result<(), OptionError> {
        match &self.original {
            Ok(original) => Ok(self.ops.set(original)?),
            Err(e) => Err(Self::capture_error(e)),
        }
    }
}

impl<N: NamespaceOps> fmt::Debug for NamespacePlacement<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamespacePlacement")
            .field("target", &self.target)
            .field("original", &self.original)
            .finish()
    }
}

/// Run the process in the namespace `target`, using the capability `ops`.
///
/// Captures the current namespace now, switches to `target` before start,
/// and restores the captured namespace after the process exits.
pub fn with_namespace<N>(ops: N, target: N::Handle) -> LaunchOption
where
    N: NamespaceOps + 'static,
    N::Handle: 'static,
{
    LaunchOption::Paired {
        label: "with_namespace",
        action: Arc::new(NamespacePlacement::new(ops, target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(argv: &[&str]) -> ProcessDescriptor {
        ProcessDescriptor::new(argv.iter().map(|s| s.to_string()).collect(), None).unwrap()
    }

    fn apply_all(d: &mut ProcessDescriptor, opts: &[LaunchOption]) -> Result<(), OptionError> {
        opts.iter().try_for_each(|o| o.apply(d))
    }

    #[test]
    fn args_append_after_tokens() {
        let mut d = desc(&["echo", "a"]);
        apply_all(&mut d, &[with_args(["b", "c"]), with_args(vec!["d".to_string()])]).unwrap();
        assert_eq!(d.args, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn options_are_reusable() {
        let opt = with_args(["x"]);
        let mut a = desc(&["echo"]);
        let mut b = desc(&["echo"]);
        opt.apply(&mut a).unwrap();
        opt.apply(&mut b).unwrap();
        assert_eq!(a.args, b.args);
    }

    #[test]
    fn env_kv_upserts() {
        let mut d = desc(&["printenv"]);
        apply_all(
            &mut d,
            &[
                with_env_kv(["key1", "value1"]),
                with_env_kv(["key1", "value2", "key2", "v"]),
            ],
        )
        .unwrap();
        let env = d.env.unwrap();
        assert_eq!(env.entries(), &["key1=value2".to_string(), "key2=v".to_string()]);
    }

    #[test]
    fn env_kv_odd_count_fails_at_apply() {
        let opt = with_env_kv(["key1"]);
        let mut d = desc(&["printenv"]);
        let err = opt.apply(&mut d).unwrap_err();
        assert!(matches!(
            err,
            OptionError::Env(EnvError::OddPairCount { count: 1 })
        ));
        assert!(d.env.is_none());
    }

    #[test]
    fn environs_reject_missing_separator() {
        let mut d = desc(&["printenv"]);
        let err = with_environs(["key1"]).apply(&mut d).unwrap_err();
        assert!(err.to_string().contains("not formatted as key=value"));
    }

    #[test]
    fn env_map_applies_sorted() {
        let mut d = desc(&["printenv"]);
        with_env_map([("b", "2"), ("a", "1")]).apply(&mut d).unwrap();
        assert_eq!(
            d.env.unwrap().entries(),
            &["a=1".to_string(), "b=2".to_string()]
        );
    }

    #[test]
    fn env_map_rejects_empty_key() {
        let mut d = desc(&["printenv"]);
        let err = with_env_map([("", "x")]).apply(&mut d).unwrap_err();
        assert!(matches!(err, OptionError::Env(EnvError::EmptyKey { .. })));
    }

    #[test]
    fn env_keys_holding_separator_are_rejected() {
        let mut d = desc(&["printenv"]);
        let err = with_env_map([("a=b", "x")]).apply(&mut d).unwrap_err();
        assert!(matches!(err, OptionError::Env(EnvError::InvalidKey { .. })));

        let err = with_env_kv(["a=b", "1", "a", "2", "a=b", "3"])
            .apply(&mut d)
            .unwrap_err();
        assert!(err.to_string().contains("must not contain '='"), "{err}");
        assert!(d.env.is_none());
    }

    #[test]
    fn stdin_last_binding_wins_outputs_accumulate() {
        let mut d = desc(&["cat"]);
        apply_all(
            &mut d,
            &[
                with_stdin(&b"one"[..]),
                with_stdin(&b"two"[..]),
                with_stdout(Vec::new()),
                with_stdout(Vec::new()),
                with_stderr(Vec::new()),
            ],
        )
        .unwrap();
        assert!(d.stdin.is_some());
        assert_eq!(d.stdout.len(), 2);
        assert_eq!(d.stderr.len(), 1);
    }

    #[test]
    fn dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("a").join("b");
        let mut d = desc(&["pwd"]);
        with_dir(&target).apply(&mut d).unwrap();
        assert!(target.is_dir());
        assert_eq!(d.dir.as_deref(), Some(target.as_path()));
    }

    #[test]
    fn dir_creation_failure_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let mut d = desc(&["pwd"]);
        let err = with_dir(file.join("sub")).apply(&mut d).unwrap_err();
        assert!(matches!(err, OptionError::Dir { .. }));
        assert!(d.dir.is_none());
    }

    #[test]
    fn last_cancel_token_wins() {
        let first = CancelToken::new();
        let second = CancelToken::new();
        let opts = vec![
            with_cancel(first.clone()),
            with_args(["x"]),
            with_cancel(second.clone()),
            with_args(["y"]),
        ];
        let chosen = select_cancel_token(&opts).unwrap();
        assert!(chosen.same_token(&second));
        assert!(!chosen.same_token(&first));
        assert!(select_cancel_token(&[with_args(["z"])]).is_none());
    }

    #[test]
    fn cancel_option_does_not_mutate() {
        let mut d = desc(&["sleep", "1"]);
        with_cancel(CancelToken::new()).apply(&mut d).unwrap();
        assert_eq!(d.args, vec!["1"]);
        assert!(d.cancel_token().is_none());
    }

    #[test]
    fn labels_and_debug() {
        assert_eq!(with_args(["a"]).label(), "with_args");
        assert_eq!(with_cancel(CancelToken::new()).label(), "with_cancel");
        assert_eq!(cmd_option(|_| Ok(())).label(), "cmd_option");
        assert_eq!(format!("{:?}", with_dir("x")), "Mutate(\"with_dir\")");
        assert!(!with_args(["a"]).has_post_run());
        assert!(with_args(["a"]).post_run().is_none());
    }
}
