// SPDX-License-Identifier: MIT OR Apache-2.0
//! Linux-only launch options.

use nix::sys::signal::Signal;
use std::sync::Arc;
use tokio::process::Command;
use xh_netns::{NetNs, NsHandle};

use crate::option::{LaunchOption, NamespacePlacement};

/// Deliver `signal` to the child when the thread that spawned it dies.
pub fn with_on_death_signal_children(signal: Signal) -> LaunchOption {
    LaunchOption::mutate("with_on_death_signal_children", move |desc| {
        desc.death_signal = Some(signal);
        Ok(())
    })
}

/// Run the process in the network namespace `handle`.
///
/// The calling thread's network namespace is captured now. The switch, the
/// spawn and the restore all happen on the launch's dedicated thread, so the
/// caller's own thread never changes namespace.
pub fn with_netns(handle: NsHandle) -> LaunchOption {
    LaunchOption::Paired {
        label: "with_netns",
        action: Arc::new(NamespacePlacement::new(NetNs, handle)),
    }
}

#[allow(unsafe_code)]
pub(crate) fn set_death_signal(cmd: &mut Command, signal: Signal) {
    // SAFETY: the hook runs between fork and exec and only issues prctl(2),
    // which is async-signal-safe.
    unsafe {
        cmd.pre_exec(move || {
            nix::sys::prctl::set_pdeathsig(signal).map_err(std::io::Error::from)
        });
    }
}
