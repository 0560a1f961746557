// SPDX-License-Identifier: MIT OR Apache-2.0
//! Linux network namespaces via `setns(2)`.

use nix::sched::{CloneFlags, setns};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::{NamespaceError, NamespaceOps};

const THREAD_NETNS: &str = "/proc/thread-self/ns/net";

/// Open handle to a network namespace file.
///
/// Clones share the same file descriptor.
#[derive(Clone)]
pub struct NsHandle {
    file: Arc<File>,
    path: PathBuf,
}

impl NsHandle {
    /// Open a namespace file, e.g. `/var/run/netns/<name>` or `/proc/<pid>/ns/net`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NamespaceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| NamespaceError::Open {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            file: Arc::new(file),
            path,
        })
    }

    /// Network namespace of the calling thread.
    pub fn current() -> Result<Self, NamespaceError> {
        Self::open(THREAD_NETNS)
    }

    /// Path the handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for NsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NsHandle").field("path", &self.path).finish()
    }
}

/// Network namespace capability for the calling OS thread.
///
/// `setns` switches only the thread it runs on, so a switch and its restore
/// must run on the same thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetNs;

impl NamespaceOps for NetNs {
    type Handle = NsHandle;

    fn get(&self) -> Result<NsHandle, NamespaceError> {
        NsHandle::current()
    }

    fn set(&self, handle: &NsHandle) -> Result<(), NamespaceError> {
        debug!(target: "xh.netns", "setns {}", handle.path.display());
        setns(&*handle.file, CloneFlags::CLONE_NEWNET).map_err(|errno| NamespaceError::Set {
            source: std::io::Error::from(errno),
        })
    }
}
