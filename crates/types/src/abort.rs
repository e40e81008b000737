// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// A cooperative, process-wide abort signal (spec.md §5): a signal handler
/// sets it, and the copy/walk loops poll it at coarse checkpoints (start
/// of each 64-KiB chunk, start of each metadata block, start of each
/// logical-volume walk), returning `AbortRequested` at the next one.
///
/// Cheap to clone — every clone shares the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

static GLOBAL: OnceLock<AbortFlag> = OnceLock::new();

impl AbortFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The single process-wide flag, lazily created on first access.
    ///
    /// Exists so a bare `extern "C" fn(i32)` signal handler — which can't
    /// capture state — has a `'static` flag to reach through: the `fvde`
    /// binary's signal handler calls `AbortFlag::global().set()` directly,
    /// and hands the same instance to `walk`/`dump` so both see the signal.
    pub fn global() -> &'static AbortFlag {
        GLOBAL.get_or_init(AbortFlag::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_across_clones() {
        let flag = AbortFlag::new();
        let other = flag.clone();
        assert!(!flag.is_set());
        other.set();
        assert!(flag.is_set());
    }
}
