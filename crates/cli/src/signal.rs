// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Cooperative-abort signal wiring (spec.md §5): a `SIGINT`/`SIGTERM`
//! handler sets the process-wide [`AbortFlag`] and forcibly closes stdin
//! to unblock any in-progress credential prompt an `Unlocker` implementation
//! may have outstanding. The handler itself never touches the `Unlocker` —
//! it only guarantees the flag is visible and stdin is closed; the prompt
//! itself remains the `Unlocker`'s business (spec.md §6.1).

use fvde_types::AbortFlag;
use nix::libc;
use nix::sys::signal::{self, SigHandler, Signal};

extern "C" fn handle_abort_signal(_signum: libc::c_int) {
    AbortFlag::global().set();
    // SAFETY: close(2) on a known-open fd is async-signal-safe; closing
    // stdin unblocks a blocking read a credential prompt may be waiting on.
    unsafe {
        libc::close(libc::STDIN_FILENO);
    }
}

/// Install the `SIGINT`/`SIGTERM` handler and return the flag it sets.
///
/// # Safety caveat
/// Registering a signal handler is inherently process-global; this must be
/// called at most once, early in `main`, before any other thread is spawned.
pub fn install() -> &'static AbortFlag {
    let flag = AbortFlag::global();
    // SAFETY: `handle_abort_signal` only touches async-signal-safe state
    // (an atomic store and `close(2)`), satisfying `sigaction`'s contract.
    unsafe {
        let _ = signal::signal(Signal::SIGINT, SigHandler::Handler(handle_abort_signal));
        let _ = signal::signal(Signal::SIGTERM, SigHandler::Handler(handle_abort_signal));
    }
    flag
}
