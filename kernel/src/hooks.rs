//! Application hook and timing-protection interfaces.

use crate::ke::proc::ProcId;
use crate::status::Status;

/// Hook routines invoked at well-defined points of the process lifecycle.
///
/// All hooks default to no-ops; an application overrides the ones it
/// configures. Hooks run with the kernel lock held and must not call
/// rescheduling services.
pub trait Hooks: Sync {
    /// Called right before a process gains the CPU.
    fn pre_task(&self, _proc: ProcId) {}

    /// Called right after the decision to take the CPU away from a process,
    /// while it is still the running one.
    fn post_task(&self, _proc: ProcId) {}

    /// Reports a service-level error that the kernel repaired or rejected.
    fn error(&self, _code: Status) {}

    /// Reports a timing-protection violation.
    fn protection(&self, _code: Status) {}
}

/// Hook set for applications that configure none.
pub struct NoHooks;

impl Hooks for NoHooks {}

/// Arrival-rate and budget supervision.
///
/// When configured, the kernel asks for agreement before queueing a new
/// activation or releasing a waiting task, and notifies the supervisor of
/// every budget-relevant transition. A refusal surfaces as
/// [`Status::ProtectionArrival`] and the protection hook fires; the kernel
/// performs no state change for the refused operation.
pub trait TimingProtection: Sync {
    /// Agreement for a new activation of `proc` or for releasing it from
    /// the waiting state. `false` refuses the arrival.
    fn on_activate_or_release(&self, proc: ProcId) -> bool;

    /// `proc` gains the CPU; start its execution-budget watchdog.
    fn on_start(&self, _proc: ProcId) {}

    /// `proc` is preempted; pause its budget accounting.
    fn on_preempt(&self, _proc: ProcId) {}

    /// `proc` terminates or waits; settle its budget and time frame.
    fn on_terminate_or_wait(&self, _proc: ProcId) {}
}
