//! OSEK-shaped service entry points.
//!
//! The production build keeps the kernel instance in a global guarded by
//! the kernel lock. Every service takes the lock, runs the kernel
//! operation, reschedules when the operation made a higher-priority
//! process ready, and hands the resulting dispatch decision to the machine
//! port. The port performs the switch with the lock still held; the lock
//! drops when the service returns on the resumed side, which keeps kernel
//! state consistent across the switch.
//!
//! Callers on the target invoke these from task bodies, ISR frames and the
//! startup code; tests drive [`Kernel`] values directly instead.

use spin::Mutex;

use crate::config::{AppMode, OsApplication};
use crate::ke::core::CoreId;
use crate::ke::kernel::Kernel;
use crate::ke::proc::{EventMask, ProcId, ProcState};
use crate::status::{OsState, Status};

static KERNEL: Mutex<Option<Kernel>> = Mutex::new(None);

fn with<R>(f: impl FnOnce(&mut Kernel) -> R) -> R {
    let mut kernel = KERNEL.lock();
    f(kernel.as_mut().expect("OS not started"))
}

/// Consume the pending dispatch decision of `core`, if any.
fn dispatch(kernel: &mut Kernel, core: CoreId) {
    if let Some(action) = kernel.take_switch(core) {
        kernel.app().port.switch_context(action.save, action.resume);
    }
}

/// Install the kernel for `app` and apply the autostart tables of
/// `app_mode`. Dispatch begins when each core calls [`start_core`].
pub fn start_os(app: &'static OsApplication, app_mode: AppMode) {
    let mut kernel = KERNEL.lock();
    kernel.insert(Kernel::new(app)).init_os(app_mode);
}

/// Dispatch the first process of `core`.
pub fn start_core(core: CoreId) {
    with(|kernel| {
        kernel.start_scheduling(core);
        dispatch(kernel, core);
    })
}

/// `ActivateTask`.
pub fn activate_task(core: CoreId, task: ProcId) -> Status {
    with(|kernel| {
        let status = kernel.activate_task(task);
        if status == Status::OkAndSchedule {
            kernel.schedule_from_running(core);
        }
        dispatch(kernel, core);
        status.into_service()
    })
}

/// `TerminateTask`.
pub fn terminate_task(core: CoreId) {
    with(|kernel| {
        kernel.terminate_task(core);
        dispatch(kernel, core);
    })
}

/// `ChainTask`.
pub fn chain_task(core: CoreId, task: ProcId) -> Status {
    with(|kernel| {
        let status = kernel.chain_task(core, task);
        dispatch(kernel, core);
        status
    })
}

/// `Schedule`.
pub fn schedule(core: CoreId) -> Status {
    with(|kernel| {
        let status = kernel.schedule(core);
        dispatch(kernel, core);
        status
    })
}

/// `WaitEvent`, valid on the running extended task only.
pub fn wait_event(core: CoreId, mask: EventMask) -> Status {
    with(|kernel| {
        let status = kernel.wait_event(core, mask);
        dispatch(kernel, core);
        status
    })
}

/// `SetEvent`.
pub fn set_event(core: CoreId, task: ProcId, mask: EventMask) -> Status {
    with(|kernel| {
        let status = kernel.set_event(task, mask);
        if status == Status::OkAndSchedule {
            kernel.schedule_from_running(core);
        }
        dispatch(kernel, core);
        status.into_service()
    })
}

/// `ClearEvent`, valid on the running extended task only.
pub fn clear_event(core: CoreId, mask: EventMask) -> Status {
    with(|kernel| kernel.clear_event(core, mask))
}

/// `GetEvent`.
pub fn get_event(task: ProcId) -> EventMask {
    with(|kernel| kernel.get_event(task))
}

/// `GetResource`.
pub fn get_resource(core: CoreId, resource: usize) -> Status {
    with(|kernel| kernel.get_resource(core, resource))
}

/// `ReleaseResource`. Dropping the ceiling is a rescheduling point.
pub fn release_resource(core: CoreId, resource: usize) -> Status {
    with(|kernel| {
        let status = kernel.release_resource(core, resource);
        if status == Status::Ok {
            kernel.schedule_from_running(core);
            dispatch(kernel, core);
        }
        status
    })
}

/// `GetTaskState`.
pub fn get_task_state(task: ProcId) -> ProcState {
    with(|kernel| kernel.proc_state(task))
}

/// ISR2 epilogue, run when a category-2 routine returns.
pub fn terminate_isr2(core: CoreId) {
    with(|kernel| {
        kernel.terminate_isr2(core);
        dispatch(kernel, core);
    })
}

/// Recovery entry for a task body that returned without terminating.
pub fn recover_missing_task_end(core: CoreId) {
    with(|kernel| {
        kernel.recover_missing_task_end(core);
        dispatch(kernel, core);
    })
}

/// What `core` is executing.
pub fn os_state(core: CoreId) -> OsState {
    with(|kernel| kernel.os_state(core))
}
