// SPDX-License-Identifier: MIT OR Apache-2.0
//! xh-netns
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! Namespace handle capability. The ambient namespace of the calling thread
//! is treated as explicit state behind [`NamespaceOps`]: `get` captures it,
//! `set` replaces it. Launch options only ever talk to the trait, so tests
//! can substitute an in-memory implementation.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub use linux::{NetNs, NsHandle};

/// Errors from namespace capture or switching.
#[derive(Debug, Error)]
pub enum NamespaceError {
    /// A namespace file could not be opened.
    #[error("failed to open namespace handle {}: {source}", path.display())]
    Open {
        /// Path of the namespace file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Switching to a namespace failed.
    #[error("failed to switch namespace: {source}")]
    Set {
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// Namespaces are not available on this platform.
    #[error("namespaces are not supported on this platform")]
    Unsupported,

    /// Failure reported by a non-OS implementation.
    #[error("namespace error: {0}")]
    Other(String),
}

/// Capability to read and replace the ambient namespace.
///
/// The value returned by [`get`](NamespaceOps::get) must be accepted by
/// [`set`](NamespaceOps::set) so a caller can always restore what it captured.
pub trait NamespaceOps: Send + Sync {
    /// Handle naming one namespace.
    type Handle: Clone + Send + Sync + fmt::Debug;

    /// Capture the namespace currently in effect.
    fn get(&self) -> Result<Self::Handle, NamespaceError>;

    /// Make `handle` the namespace in effect.
    fn set(&self, handle: &Self::Handle) -> Result<(), NamespaceError>;
}

impl<T: NamespaceOps + ?Sized> NamespaceOps for std::sync::Arc<T> {
    type Handle = T::Handle;

    fn get(&self) -> Result<Self::Handle, NamespaceError> {
        (**self).get()
    }

    fn set(&self, handle: &Self::Handle) -> Result<(), NamespaceError> {
        (**self).set(handle)
    }
}
