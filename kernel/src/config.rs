//! Static application configuration.
//!
//! The system generator turns the application description into one
//! [`OsApplication`] value: immutable process descriptors, resource
//! ceilings, autostart masks and the wiring to the target port and hooks.
//! Every table is plain `const`-constructible data placed in read-only
//! memory; the kernel never mutates it.
//!
//! # Identifier layout
//!
//! Process ids are dense and partitioned:
//!
//! ```text
//! [0, extended_task_count)                extended tasks
//! [0, task_count)                         all tasks
//! [task_count, task_count + isr2_count)   category-2 ISRs
//! [task_count + isr2_count, ..)           one idle task per core
//! ```

use crate::hooks::{Hooks, TimingProtection};
use crate::ke::proc::{ProcId, ProcKind, ProcStatic};
use crate::ke::resource::{InternalResourceStatic, ResourceStatic};
use crate::port::{MachinePort, TimeObjectPort};

/// Application mode, an index into the autostart masks.
pub type AppMode = u8;

/// Bitmask over application modes.
///
/// Bit `m` is set when the associated object autostarts in mode `m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppModeMask(pub u32);

impl AppModeMask {
    /// Mask that never matches any mode.
    pub const NONE: AppModeMask = AppModeMask(0);

    /// Whether the object autostarts in `mode`.
    #[inline]
    pub const fn contains(self, mode: AppMode) -> bool {
        self.0 & (1 << mode) != 0
    }
}

/// How an autostarted schedule table begins counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleTableStart {
    /// Offset from the moment the OS starts
    Relative,
    /// First expiry at an absolute counter date
    Absolute,
    /// Started but waiting for global-time synchronization
    Synchronous,
}

/// Autostart description of one schedule table.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleTableAutostart {
    /// Modes in which the table autostarts
    pub app_modes: AppModeMask,
    /// Start discipline handed to the time-object engine
    pub start: ScheduleTableStart,
}

/// The generated static world.
pub struct OsApplication {
    /// Number of configured cores
    pub core_count: usize,
    /// Number of tasks (extended tasks included)
    pub task_count: usize,
    /// Number of extended tasks; these occupy the lowest ids
    pub extended_task_count: usize,
    /// Number of category-2 ISRs
    pub isr2_count: usize,

    /// Static process descriptors, id-indexed, idle tasks last
    pub procs: &'static [ProcStatic],
    /// Ceilings of the internal resources
    pub internal_resources: &'static [InternalResourceStatic],
    /// Ceilings of the standard (external) resources
    pub resources: &'static [ResourceStatic],

    /// Autostart masks, task-id-indexed
    pub task_app_modes: &'static [AppModeMask],
    /// Autostart masks, alarm-id-indexed
    pub alarm_app_modes: &'static [AppModeMask],
    /// Autostart descriptions, schedule-table-id-indexed
    pub schedule_tables: &'static [ScheduleTableAutostart],

    /// Machine port of the target
    pub port: &'static dyn MachinePort,
    /// Alarm and schedule-table engine
    pub time_objects: &'static dyn TimeObjectPort,
    /// Application hooks
    pub hooks: &'static dyn Hooks,
    /// Timing protection, when the application configures it
    pub protection: Option<&'static dyn TimingProtection>,
}

impl OsApplication {
    /// Total number of processes, idle tasks included.
    #[inline]
    pub fn proc_count(&self) -> usize {
        self.task_count + self.isr2_count + self.core_count
    }

    /// Id of the idle task owned by `core`.
    #[inline]
    pub fn idle_id(&self, core: usize) -> ProcId {
        ProcId((self.task_count + self.isr2_count + core) as u16)
    }

    /// Static descriptor of `proc`.
    #[inline]
    pub fn proc(&self, proc: ProcId) -> &ProcStatic {
        &self.procs[proc.idx()]
    }

    /// Whether `proc` names a task (idle tasks excluded).
    #[inline]
    pub fn is_task(&self, proc: ProcId) -> bool {
        proc.idx() < self.task_count
    }

    /// Whether `proc` names a category-2 ISR.
    #[inline]
    pub fn is_isr2(&self, proc: ProcId) -> bool {
        let id = proc.idx();
        id >= self.task_count && id < self.task_count + self.isr2_count
    }

    /// Whether `proc` names an idle task.
    #[inline]
    pub fn is_idle(&self, proc: ProcId) -> bool {
        let id = proc.idx();
        id >= self.task_count + self.isr2_count && id < self.proc_count()
    }

    /// Whether `proc` names an extended task (owns an event record).
    #[inline]
    pub fn is_extended(&self, proc: ProcId) -> bool {
        proc.idx() < self.extended_task_count
    }

    /// Sanity-check the generated tables. Configuration is trusted input,
    /// so violations are programming errors in the generator and fatal in
    /// debug builds only.
    pub(crate) fn debug_check(&self) {
        debug_assert_eq!(self.procs.len(), self.proc_count());
        debug_assert!(self.extended_task_count <= self.task_count);
        debug_assert_eq!(self.task_app_modes.len(), self.task_count);
        debug_assert!(self.core_count >= 1);
        for (id, p) in self.procs.iter().enumerate() {
            debug_assert!(p.core.as_usize() < self.core_count);
            debug_assert!(p.max_activate_count >= 1);
            debug_assert!(usize::from(p.base_priority) < crate::ke::heap::PRIO_LEVELS);
            if let Some(res) = p.internal_resource {
                debug_assert!(usize::from(res) < self.internal_resources.len());
            }
            let expected = if id < self.task_count {
                if id < self.extended_task_count {
                    ProcKind::ExtendedTask
                } else {
                    ProcKind::BasicTask
                }
            } else if id < self.task_count + self.isr2_count {
                ProcKind::Isr2
            } else {
                ProcKind::Idle
            };
            debug_assert_eq!(p.kind, expected);
        }
    }
}
