//! Per-core kernel state.
//!
//! The scheduler is partitioned: each core owns its ready heap and its
//! kernel record, and dispatch decisions never migrate a process. The
//! kernel record carries the outcome of the latest scheduling point for the
//! context-switch primitive to consume.

use super::heap::ReadyHeap;
use super::proc::{ProcId, INVALID_PROC_ID};

/// Logical core identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreId(pub u8);

impl CoreId {
    /// Bootstrap core.
    pub const BOOT: CoreId = CoreId(0);

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

bitflags::bitflags! {
    /// Outcome of a scheduling point.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SwitchFlags: u8 {
        /// A different process must get the CPU
        const NEED_SWITCH = 0b01;
        /// The outgoing context is live and must be saved first
        const NEED_SAVE = 0b10;
    }
}

/// Kernel record of one core.
///
/// `running_id` identifies the process owning the CPU; `old_id` the process
/// being replaced at the current scheduling point. Both address the port's
/// context storage.
#[derive(Debug, Clone, Copy)]
pub struct Kern {
    /// Process owning the CPU, `INVALID_PROC_ID` before the first dispatch
    pub running_id: ProcId,
    /// Process replaced at the latest scheduling point
    pub old_id: ProcId,
    /// Whether and how the context-switch primitive must act
    pub need_switch: SwitchFlags,
}

impl Kern {
    pub const fn new() -> Self {
        Self {
            running_id: INVALID_PROC_ID,
            old_id: INVALID_PROC_ID,
            need_switch: SwitchFlags::empty(),
        }
    }
}

impl Default for Kern {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one core owns.
pub struct Core {
    /// Queued activations of this core's processes
    pub ready: ReadyHeap,
    /// Dispatch state
    pub kern: Kern,
}

impl Core {
    pub const fn new() -> Self {
        Self {
            ready: ReadyHeap::new(),
            kern: Kern::new(),
        }
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}
