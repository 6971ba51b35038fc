//! Event machinery of extended tasks.
//!
//! Each extended task owns two masks: the events set on it since its
//! activation and the events it currently waits for. Setting an awaited
//! event releases the task from the waiting state and queues a fresh ready
//! job for it.

use crate::ke::core::CoreId;
use crate::ke::kernel::Kernel;
use crate::ke::proc::{EventMask, ProcId, ProcState};
use crate::status::Status;

impl Kernel {
    /// Merge `mask` into the set events of `task` and release it when an
    /// awaited event arrives.
    ///
    /// No-op on anything but an extended task. Fails with
    /// [`Status::State`] on a suspended task and with
    /// [`Status::ProtectionArrival`] when timing protection refuses the
    /// release; returns [`Status::OkAndSchedule`] when the task became
    /// ready.
    pub fn set_event(&mut self, task: ProcId, mask: EventMask) -> Status {
        if !self.app.is_extended(task) {
            return Status::Ok;
        }
        if self.procs[task.idx()].state == ProcState::Suspended {
            return Status::State;
        }
        let events = &mut self.events[task.idx()];
        events.evt_set |= mask;
        if events.evt_wait & mask == 0 {
            return Status::Ok;
        }
        // At least one awaited event arrived; the wait is over even if the
        // task was released by an earlier arrival and has not run yet.
        events.evt_wait = 0;
        if self.procs[task.idx()].state != ProcState::Waiting {
            return Status::Ok;
        }
        if let Some(tp) = self.app.protection {
            if !tp.on_activate_or_release(task) {
                self.app.hooks.protection(Status::ProtectionArrival);
                return Status::ProtectionArrival;
            }
        }
        log::trace!("proc {} released by event {:#x}", task.0, mask);
        self.procs[task.idx()].state = ProcState::Ready;
        self.put_new_proc(task);
        Status::OkAndSchedule
    }

    /// Put the running extended task to sleep until one event of `mask`
    /// is set. When one of them is already pending the task keeps the CPU.
    pub fn wait_event(&mut self, core: CoreId, mask: EventMask) -> Status {
        let running = self.kern(core).running_id;
        debug_assert!(self.app.is_extended(running));
        self.events[running.idx()].evt_wait = mask;
        self.block(core);
        Status::Ok
    }

    /// Clear events of the running extended task.
    pub fn clear_event(&mut self, core: CoreId, mask: EventMask) -> Status {
        let running = self.kern(core).running_id;
        debug_assert!(self.app.is_extended(running));
        self.events[running.idx()].evt_set &= !mask;
        Status::Ok
    }

    /// Events currently set on `task`.
    pub fn get_event(&self, task: ProcId) -> EventMask {
        debug_assert!(self.app.is_extended(task));
        self.events[task.idx()].evt_set
    }
}
