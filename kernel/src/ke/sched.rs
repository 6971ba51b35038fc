//! The dispatcher.
//!
//! Primitive scheduling operations on one core: taking the CPU away from
//! the running process, handing it to the ready heap's front job, and the
//! cooperative rescheduling decision. Every operation here runs inside a
//! kernel entry with the kernel lock held, mutates process and core state,
//! and leaves a dispatch decision in the core's kernel record. The actual
//! context switch happens outside, when the service layer consumes that
//! decision.

use crate::ke::core::{CoreId, SwitchFlags};
use crate::ke::kernel::Kernel;
use crate::ke::proc::{ProcId, ProcState, TaskEvents};
use crate::status::Status;

impl Kernel {
    /// Queue a fresh activation, dispatching on the owning core of the
    /// process. May run from any core; the caller holds the kernel lock.
    pub(crate) fn put_new_proc(&mut self, proc: ProcId) {
        let stat = self.app.proc(proc);
        let core = stat.core.as_usize();
        self.cores[core].ready.put_new(proc, stat.base_priority);
        self.cores[core].ready.trace_jobs();
    }

    /// Take the CPU away from the running process of `core` and re-queue
    /// it under its current dynamic priority.
    pub(crate) fn preempt(&mut self, core: CoreId) {
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());
        debug_assert_eq!(self.procs[running.idx()].state, ProcState::Running);

        // The process is about to lose the CPU but still runs.
        self.app.hooks.post_task(running);

        self.procs[running.idx()].state = ProcState::Ready;
        let key = self.procs[running.idx()].priority;
        self.cores[core.as_usize()].ready.put_preempted(running, key);
        self.cores[core.as_usize()].ready.trace_jobs();
        if let Some(tp) = self.app.protection {
            tp.on_preempt(running);
        }
        self.kern_mut(core).old_id = running;
        log::trace!("core {}: preempt proc {}", core.0, running.0);
    }

    /// Dispatch the front job of `core`'s ready heap.
    ///
    /// A job that never ran gets its context initialized and its dynamic
    /// priority established from the key it was queued with; then the
    /// process takes its internal resource, which may raise that priority
    /// to the resource ceiling.
    pub(crate) fn start(&mut self, core: CoreId) {
        let entry = self.cores[core.as_usize()].ready.remove_front();
        let proc = entry.id;
        self.kern_mut(core).running_id = proc;

        if self.procs[proc.idx()].state == ProcState::ReadyAndNew {
            self.init_proc(proc);
            self.procs[proc.idx()].priority = entry.key;
        }
        log::trace!(
            "core {}: start proc {} priority {:#010x}",
            core.0,
            proc.0,
            self.procs[proc.idx()].priority
        );
        self.procs[proc.idx()].state = ProcState::Running;
        if let Some(tp) = self.app.protection {
            tp.on_start(proc);
        }
        self.get_internal_resource(proc);
        self.app.hooks.pre_task(proc);
    }

    /// First-dispatch preparation: empty the held-resource list and have
    /// the port set up the machine context.
    fn init_proc(&mut self, proc: ProcId) {
        self.procs[proc.idx()].resources = None;
        self.app.port.init_context(proc);
    }

    /// Rescheduling decision at a cooperative scheduling point.
    ///
    /// Preempts the running process iff the front job of the ready heap
    /// strictly outranks its dynamic priority, and records the outcome in
    /// the kernel record.
    pub fn schedule_from_running(&mut self, core: CoreId) {
        let c = core.as_usize();
        debug_assert!(!self.cores[c].ready.is_empty());
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());

        let mut need_switch = SwitchFlags::empty();
        if self.cores[c].ready.front().key > self.procs[running.idx()].priority {
            self.preempt(core);
            self.start(core);
            need_switch = SwitchFlags::NEED_SWITCH | SwitchFlags::NEED_SAVE;
        }
        self.kern_mut(core).need_switch = need_switch;
    }

    /// End the running activation.
    ///
    /// The internal resource is dropped, the activation count decremented.
    /// Queued activations put the process back to `ReadyAndNew` (with a
    /// fresh event record for extended tasks); otherwise it suspends. The
    /// successor is dispatched at the caller's next `start`.
    pub(crate) fn terminate(&mut self, core: CoreId) {
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());

        self.app.hooks.post_task(running);
        self.release_internal_resource(running);

        let dyn_desc = &mut self.procs[running.idx()];
        debug_assert!(dyn_desc.activate_count > 0);
        dyn_desc.activate_count -= 1;
        if dyn_desc.activate_count > 0 {
            dyn_desc.state = ProcState::ReadyAndNew;
            if self.app.is_extended(running) {
                self.events[running.idx()] = TaskEvents::new();
            }
        } else {
            dyn_desc.state = ProcState::Suspended;
        }
        if let Some(tp) = self.app.protection {
            tp.on_terminate_or_wait(running);
        }
        self.kern_mut(core).old_id = running;
        log::trace!("core {}: terminate proc {}", core.0, running.0);
    }

    /// Block the running extended task until one of its awaited events
    /// arrives.
    ///
    /// When an awaited event is already set the task keeps the CPU and no
    /// switch is requested. Otherwise it goes to `Waiting`, drops its
    /// internal resource and the front ready job is dispatched.
    pub(crate) fn block(&mut self, core: CoreId) {
        let running = self.kern(core).running_id;
        debug_assert!(self.app.is_extended(running));

        if let Some(tp) = self.app.protection {
            tp.on_terminate_or_wait(running);
        }
        let events = self.events[running.idx()];
        if events.evt_set & events.evt_wait == 0 {
            self.app.hooks.post_task(running);
            log::trace!("core {}: proc {} waits", core.0, running.0);
            self.procs[running.idx()].state = ProcState::Waiting;
            self.release_internal_resource(running);
            self.kern_mut(core).old_id = running;
            self.start(core);
            self.kern_mut(core).need_switch =
                SwitchFlags::NEED_SWITCH | SwitchFlags::NEED_SAVE;
        } else {
            // The awaited condition already holds; the task keeps running
            // but the arrival still needs timing-protection agreement.
            self.kern_mut(core).need_switch = SwitchFlags::empty();
            if let Some(tp) = self.app.protection {
                if tp.on_activate_or_release(running) {
                    tp.on_start(running);
                } else {
                    self.app.hooks.protection(Status::ProtectionArrival);
                }
            }
        }
    }

    /// Dispatch the first process after bootstrap. The ready heap holds at
    /// least the core's idle task at this point, so there is no context to
    /// save.
    pub fn start_scheduling(&mut self, core: CoreId) {
        self.start(core);
        self.kern_mut(core).need_switch = SwitchFlags::NEED_SWITCH;
    }

    /// The cooperative `Schedule` point of the running task.
    ///
    /// Releasing the internal resource first opens the CPU to every ready
    /// job above the base priority; if the task keeps the CPU, the
    /// resource is taken again.
    pub fn schedule(&mut self, core: CoreId) -> Status {
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());
        self.release_internal_resource(running);
        self.schedule_from_running(core);
        if !self.kern(core).need_switch.contains(SwitchFlags::NEED_SWITCH) {
            self.get_internal_resource(running);
        }
        Status::Ok
    }
}
