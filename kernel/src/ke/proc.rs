//! Process descriptors.
//!
//! A process is a task (basic or extended), a category-2 ISR, or an idle
//! task. Each has an immutable descriptor ([`ProcStatic`]) emitted by the
//! generator and a mutable one ([`ProcDyn`]) owned by the kernel.

use super::core::CoreId;

/// Scheduling constants and static pool limits.
pub mod constants {
    /// Maximum number of processes (tasks + ISR2s + idle tasks)
    pub const MAX_PROC_COUNT: usize = 32;
    /// Maximum number of cores
    pub const MAX_CORE_COUNT: usize = 4;
    /// Maximum number of extended tasks
    pub const MAX_EXTENDED_TASK_COUNT: usize = 8;
    /// Maximum number of internal resources
    pub const MAX_INTERNAL_RESOURCE_COUNT: usize = 8;
    /// Maximum number of standard resources
    pub const MAX_RESOURCE_COUNT: usize = 16;
}

/// Dense process identifier.
///
/// Ids are assigned by the generator: extended tasks first, then basic
/// tasks, then category-2 ISRs, then one idle task per core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcId(pub u16);

/// Marks "no process", i.e. the core has not dispatched yet.
pub const INVALID_PROC_ID: ProcId = ProcId(u16::MAX);

impl ProcId {
    /// Table index of this id.
    #[inline]
    pub const fn idx(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_PROC_ID.0
    }
}

/// Process category, fixed at generation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcKind {
    /// Task without an event record
    BasicTask = 0,
    /// Task that may wait on events
    ExtendedTask = 1,
    /// Category-2 interrupt service routine
    Isr2 = 2,
    /// Per-core idle task, never suspended
    Idle = 3,
}

/// Process lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcState {
    /// No live activation
    Suspended = 0,
    /// Queued activation that has never run; context init is pending
    ReadyAndNew = 1,
    /// Preempted or released, re-queued with its current dynamic priority
    Ready = 2,
    /// Owns the CPU of its core
    Running = 3,
    /// Extended task blocked on an event mask
    Waiting = 4,
    /// Killed while running; leaves the CPU at the next dispatch
    Dying = 5,
}

/// Immutable per-process configuration.
#[derive(Debug, Clone, Copy)]
pub struct ProcStatic {
    /// Process category
    pub kind: ProcKind,
    /// Configured priority; the idle task uses priority 0
    pub base_priority: u16,
    /// How many activations may be outstanding at once
    pub max_activate_count: u8,
    /// Internal resource taken for the whole execution, when configured
    pub internal_resource: Option<u8>,
    /// Core owning this process
    pub core: CoreId,
}

/// Mutable per-process state.
#[derive(Debug, Clone, Copy)]
pub struct ProcDyn {
    /// Lifecycle state
    pub state: ProcState,
    /// Number of live activations, at most `max_activate_count`
    pub activate_count: u8,
    /// Current dynamic priority in ready-key format; established at first
    /// dispatch and raised while a resource is held
    pub priority: u32,
    /// Head of the held-resource stack, an index into the resource pool
    pub resources: Option<u8>,
}

impl ProcDyn {
    pub const fn new() -> Self {
        Self {
            state: ProcState::Suspended,
            activate_count: 0,
            priority: 0,
            resources: None,
        }
    }
}

impl Default for ProcDyn {
    fn default() -> Self {
        Self::new()
    }
}

/// Event bits set on / awaited by an extended task.
pub type EventMask = u32;

/// Event record of an extended task.
#[derive(Debug, Clone, Copy)]
pub struct TaskEvents {
    /// Events set since the last activation
    pub evt_set: EventMask,
    /// Events the task currently waits for; zero when not waiting
    pub evt_wait: EventMask,
}

impl TaskEvents {
    pub const fn new() -> Self {
        Self {
            evt_set: 0,
            evt_wait: 0,
        }
    }
}

impl Default for TaskEvents {
    fn default() -> Self {
        Self::new()
    }
}
