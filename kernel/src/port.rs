//! Target-provided interfaces.
//!
//! The scheduling core is machine independent: everything that touches the
//! hardware sits behind [`MachinePort`], and the alarm / schedule-table
//! engine sits behind [`TimeObjectPort`]. The generated application wires
//! concrete implementations into [`crate::config::OsApplication`].

use crate::config::ScheduleTableStart;
use crate::ke::proc::ProcId;

/// Machine-specific operations required by the dispatcher.
///
/// Process contexts are opaque to the core; the port owns their storage and
/// addresses them by process id.
pub trait MachinePort: Sync {
    /// Prepare the context of `proc` so that it begins execution at its
    /// entry point on the next switch to it.
    fn init_context(&self, proc: ProcId);

    /// Save the context of `old` (when present and when the dispatch decision
    /// asked for a save) and resume `new`. Called by the service layer after
    /// a dispatch decision, never by the dispatcher itself.
    fn switch_context(&self, old: Option<ProcId>, new: ProcId);

    /// Whether a previous service call left interrupts disabled.
    fn interrupt_lock_status(&self) -> bool;

    /// Re-enable interrupts left disabled by a service call.
    fn reset_interrupt_lock_status(&self);
}

/// Interface to the time-object engine for autostart processing.
///
/// `init_os` walks the autostart tables and hands every object selected by
/// the application mode to this port; counting, expiry and synchronization
/// stay inside the engine.
pub trait TimeObjectPort: Sync {
    /// Arm the alarm with its configured date and cycle.
    fn start_alarm(&self, alarm: usize);

    /// Start the schedule table from its configured origin.
    fn start_schedule_table(&self, table: usize, start: ScheduleTableStart);
}

/// Time-object port for applications without alarms or schedule tables.
pub struct NoTimeObjects;

impl TimeObjectPort for NoTimeObjects {
    fn start_alarm(&self, _alarm: usize) {}
    fn start_schedule_table(&self, _table: usize, _start: ScheduleTableStart) {}
}
