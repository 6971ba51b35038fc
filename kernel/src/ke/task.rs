//! Activation and termination.
//!
//! Entry points feeding the dispatcher: task and ISR2 activation queue
//! jobs, the termination family ends the running activation and dispatches
//! the successor. The termination services also repair what a dying
//! process left behind (occupied resources, disabled interrupts) and
//! report it through the error hook.

use crate::ke::core::{CoreId, SwitchFlags};
use crate::ke::kernel::Kernel;
use crate::ke::proc::{ProcId, ProcState, TaskEvents};
use crate::status::Status;

impl Kernel {
    /// Queue one activation of `proc`.
    fn activate(&mut self, proc: ProcId) -> Status {
        let stat = self.app.proc(proc);
        if self.procs[proc.idx()].activate_count >= stat.max_activate_count {
            return Status::Limit;
        }
        if let Some(tp) = self.app.protection {
            if !tp.on_activate_or_release(proc) {
                self.app.hooks.protection(Status::ProtectionArrival);
                return Status::ProtectionArrival;
            }
        }
        let mut result = Status::Ok;
        if self.procs[proc.idx()].activate_count == 0 {
            // First activation; context init happens at dispatch.
            self.procs[proc.idx()].state = ProcState::ReadyAndNew;
            if self.app.is_extended(proc) {
                self.events[proc.idx()] = TaskEvents::new();
            }
            result = Status::OkAndSchedule;
        }
        self.put_new_proc(proc);
        self.procs[proc.idx()].activate_count += 1;
        log::trace!(
            "activate proc {}, {} live activation(s)",
            proc.0,
            self.procs[proc.idx()].activate_count
        );
        result
    }

    /// Activate a task. Queuing several activations of the same task is
    /// legal up to its configured maximum; each queued activation is one
    /// ready job.
    ///
    /// Returns [`Status::OkAndSchedule`] when the task left the suspended
    /// state, [`Status::Limit`] when the maximum is exhausted, and
    /// [`Status::ProtectionArrival`] on a timing-protection veto.
    pub fn activate_task(&mut self, task: ProcId) -> Status {
        debug_assert!(self.app.is_task(task) || self.app.is_idle(task));
        self.activate(task)
    }

    /// Activate a category-2 ISR, called by the interrupt front-end when
    /// its vector fires.
    pub fn activate_isr2(&mut self, isr: ProcId) -> Status {
        debug_assert!(self.app.is_isr2(isr));
        self.activate(isr)
    }

    /// End the running activation and dispatch the successor. The dying
    /// context is discarded, so only a switch without save is requested.
    pub fn terminate_task(&mut self, core: CoreId) {
        self.terminate(core);
        self.start(core);
        self.kern_mut(core).need_switch = SwitchFlags::NEED_SWITCH;
    }

    /// Atomically end the running task and activate `target`.
    ///
    /// Chaining a task whose activation queue is full fails with
    /// [`Status::Limit`] and terminates nothing; chaining the running task
    /// itself is always allowed since its own activation ends first.
    pub fn chain_task(&mut self, core: CoreId, target: ProcId) -> Status {
        debug_assert!(self.app.is_task(target));
        let running = self.kern(core).running_id;
        if target != running {
            let stat = self.app.proc(target);
            if self.procs[target.idx()].activate_count >= stat.max_activate_count {
                return Status::Limit;
            }
        }
        self.terminate(core);
        let activated = self.activate(target);
        self.start(core);
        self.kern_mut(core).need_switch = SwitchFlags::NEED_SWITCH;
        match activated {
            Status::ProtectionArrival => Status::ProtectionArrival,
            _ => Status::Ok,
        }
    }

    /// Recovery path for a task that returned from its body without
    /// terminating: re-enable interrupts it left disabled, free occupied
    /// resources, report `MissingEnd`, then terminate it normally.
    pub fn recover_missing_task_end(&mut self, core: CoreId) {
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());
        if self.app.port.interrupt_lock_status() {
            self.app.port.reset_interrupt_lock_status();
        }
        if self.procs[running.idx()].resources.is_some() {
            self.release_all_resources(core);
        }
        self.app.hooks.error(Status::MissingEnd);
        self.terminate_task(core);
    }

    /// ISR2 return path. The routine must not leave interrupts disabled or
    /// resources occupied; both are repaired and reported before the
    /// activation ends.
    pub fn terminate_isr2(&mut self, core: CoreId) {
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());
        let mut result = Status::Ok;
        if self.app.port.interrupt_lock_status() {
            self.app.port.reset_interrupt_lock_status();
            result = Status::DisabledInt;
        }
        if self.procs[running.idx()].resources.is_some() {
            self.release_all_resources(core);
            result = Status::Resource;
        }
        if result != Status::Ok {
            self.app.hooks.error(result);
        }
        self.terminate(core);
        self.start(core);
        self.kern_mut(core).need_switch = SwitchFlags::NEED_SWITCH;
    }

    /// Purge a process on behalf of OS-application termination: every
    /// queued activation disappears at once. A process killed while
    /// running stays on the CPU as `Dying` until the next dispatch; any
    /// other state drops straight to `Suspended`.
    #[cfg(feature = "os_applications")]
    pub fn kill_proc(&mut self, proc: ProcId) {
        let core = self.app.proc(proc).core;
        let was_running = self.cores[core.as_usize()].kern.running_id == proc;
        self.cores[core.as_usize()].ready.remove_all(proc);
        self.release_internal_resource(proc);
        if self.app.is_extended(proc) {
            self.events[proc.idx()] = TaskEvents::new();
        }
        let dyn_desc = &mut self.procs[proc.idx()];
        dyn_desc.activate_count = 0;
        dyn_desc.state = if was_running {
            ProcState::Dying
        } else {
            ProcState::Suspended
        };
        log::trace!("kill proc {}", proc.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ke::fixture::{AppBuilder, TaskSpec};
    use crate::port::MachinePort;
    use std::sync::atomic::Ordering;

    #[test]
    fn activations_queue_up_to_the_configured_maximum() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(4).max_activations(3))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;
        let t = ProcId(0);

        assert_eq!(k.activate_task(t), Status::OkAndSchedule);
        assert_eq!(k.activate_task(t), Status::Ok);
        assert_eq!(k.activate_task(t), Status::Ok);
        assert_eq!(k.cores[0].ready.len(), 3);
        assert_eq!(k.activate_task(t), Status::Limit);
        assert_eq!(k.cores[0].ready.len(), 3);
        assert_eq!(k.activate_count(t), 3);

        // The task runs once per queued activation, then suspends.
        k.start_scheduling(core);
        k.terminate_task(core);
        assert_eq!(k.running_id(core), t);
        k.terminate_task(core);
        assert_eq!(k.running_id(core), t);
        k.terminate(core);
        assert_eq!(k.proc_state(t), ProcState::Suspended);
        assert_eq!(k.activate_count(t), 0);
        k.assert_invariants();
    }

    #[test]
    fn terminate_dispatches_the_next_ready_job() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(5))
            .task(TaskSpec::basic(3))
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.activate_task(ProcId(1));
        k.activate_task(k.app.idle_id(0));
        k.start_scheduling(core);
        assert_eq!(k.running_id(core), ProcId(0));

        k.terminate_task(core);
        assert_eq!(k.running_id(core), ProcId(1));
        assert_eq!(k.need_switch(core), SwitchFlags::NEED_SWITCH);

        k.terminate_task(core);
        assert_eq!(k.running_id(core), k.app.idle_id(0));
        k.assert_invariants();
    }

    #[test]
    fn first_dispatch_initializes_the_context_once() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .task(TaskSpec::basic(6))
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        assert_eq!(*h.port.init_calls.lock().unwrap(), vec![ProcId(0)]);

        // Preemption and resumption must not reinitialize the context.
        k.activate_task(ProcId(1));
        k.schedule_from_running(core);
        k.terminate_task(core);
        assert_eq!(k.running_id(core), ProcId(0));
        assert_eq!(
            *h.port.init_calls.lock().unwrap(),
            vec![ProcId(0), ProcId(1)]
        );
        k.assert_invariants();
    }

    #[test]
    fn chain_task_swaps_activations_atomically() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(3))
            .task(TaskSpec::basic(3))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        assert_eq!(k.chain_task(core, ProcId(1)), Status::Ok);
        assert_eq!(k.running_id(core), ProcId(1));
        assert_eq!(k.proc_state(ProcId(0)), ProcState::Suspended);
        k.assert_invariants();
    }

    #[test]
    fn chain_task_to_itself_rearms_the_activation() {
        let app = AppBuilder::new().task(TaskSpec::basic(3)).build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;
        let t = ProcId(0);

        k.activate_task(t);
        k.start_scheduling(core);
        assert_eq!(k.chain_task(core, t), Status::Ok);
        assert_eq!(k.running_id(core), t);
        assert_eq!(k.activate_count(t), 1);
        k.assert_invariants();
    }

    #[test]
    fn chain_task_over_a_full_queue_terminates_nothing() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(3))
            .task(TaskSpec::basic(2))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.activate_task(ProcId(1));
        k.start_scheduling(core);
        assert_eq!(k.running_id(core), ProcId(0));
        assert_eq!(k.chain_task(core, ProcId(1)), Status::Limit);
        assert_eq!(k.running_id(core), ProcId(0));
        assert_eq!(k.proc_state(ProcId(0)), ProcState::Running);
        k.assert_invariants();
    }

    #[test]
    fn isr2_activation_outranks_tasks() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .isr(TaskSpec::basic(9))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;
        let isr = ProcId(1);

        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        assert_eq!(k.activate_isr2(isr), Status::OkAndSchedule);
        k.schedule_from_running(core);
        assert_eq!(k.running_id(core), isr);

        k.terminate_isr2(core);
        assert_eq!(k.running_id(core), ProcId(0));
        assert_eq!(k.proc_state(isr), ProcState::Suspended);
        k.assert_invariants();
    }

    #[test]
    fn missing_task_end_is_repaired_and_reported() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(4))
            .task(TaskSpec::basic(1))
            .resource(5)
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.activate_task(ProcId(1));
        k.start_scheduling(core);
        k.get_resource(core, 0);
        h.port.interrupt_locked.store(true, Ordering::SeqCst);

        k.recover_missing_task_end(core);
        assert_eq!(*h.hooks.errors.lock().unwrap(), vec![Status::MissingEnd]);
        assert!(!h.port.interrupt_lock_status());
        assert!(!k.resources[0].taken);
        assert_eq!(k.proc_state(ProcId(0)), ProcState::Suspended);
        assert_eq!(k.running_id(core), ProcId(1));
        k.assert_invariants();
    }

    #[test]
    fn isr2_return_with_disabled_interrupts_is_reported() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .isr(TaskSpec::basic(8))
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        k.activate_isr2(ProcId(1));
        k.schedule_from_running(core);
        h.port.interrupt_locked.store(true, Ordering::SeqCst);

        k.terminate_isr2(core);
        assert_eq!(*h.hooks.errors.lock().unwrap(), vec![Status::DisabledInt]);
        assert!(!h.port.interrupt_lock_status());
        assert_eq!(k.running_id(core), ProcId(0));
    }

    #[test]
    fn isr2_return_with_occupied_resource_is_reported() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .isr(TaskSpec::basic(8))
            .resource(9)
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        k.activate_isr2(ProcId(1));
        k.schedule_from_running(core);
        k.get_resource(core, 0);

        k.terminate_isr2(core);
        assert_eq!(*h.hooks.errors.lock().unwrap(), vec![Status::Resource]);
        assert!(!k.resources[0].taken);
        k.assert_invariants();
    }

    #[test]
    fn protection_veto_rejects_the_activation_untouched() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(3))
            .with_protection()
            .build_harness();
        let mut k = Kernel::new(h.app);
        let t = ProcId(0);

        h.protection
            .unwrap()
            .allow
            .store(false, Ordering::SeqCst);
        assert_eq!(k.activate_task(t), Status::ProtectionArrival);
        assert_eq!(
            *h.hooks.protections.lock().unwrap(),
            vec![Status::ProtectionArrival]
        );
        assert_eq!(k.proc_state(t), ProcState::Suspended);
        assert_eq!(k.activate_count(t), 0);
        assert!(k.cores[0].ready.is_empty());
        k.assert_invariants();
    }

    #[test]
    fn timing_protection_sees_the_budget_lifecycle() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(3))
            .with_protection()
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;
        let t = ProcId(0);
        let idle = h.app.idle_id(0);
        let tp = h.protection.unwrap();

        k.activate_task(t);
        k.activate_task(idle);
        k.start_scheduling(core);
        assert_eq!(*tp.starts.lock().unwrap(), vec![t]);

        k.terminate_task(core);
        assert_eq!(*tp.settles.lock().unwrap(), vec![t]);
        assert_eq!(*tp.starts.lock().unwrap(), vec![t, idle]);
    }

    #[test]
    fn pre_and_post_hooks_frame_every_possession() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .task(TaskSpec::basic(5))
            .build_harness();
        let mut k = Kernel::new(h.app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        k.activate_task(ProcId(1));
        k.schedule_from_running(core);
        assert_eq!(*h.hooks.pre.lock().unwrap(), vec![ProcId(0), ProcId(1)]);
        assert_eq!(*h.hooks.post.lock().unwrap(), vec![ProcId(0)]);
    }

    #[cfg(feature = "os_applications")]
    #[test]
    fn kill_proc_purges_every_activation() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(4).max_activations(3))
            .task(TaskSpec::basic(2))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.activate_task(ProcId(0));
        k.activate_task(ProcId(0));
        k.activate_task(ProcId(1));
        k.kill_proc(ProcId(0));
        assert_eq!(k.proc_state(ProcId(0)), ProcState::Suspended);
        assert_eq!(k.activate_count(ProcId(0)), 0);
        assert_eq!(k.cores[0].ready.len(), 1);

        k.start_scheduling(core);
        assert_eq!(k.running_id(core), ProcId(1));
        k.assert_invariants();
    }

    #[cfg(feature = "os_applications")]
    #[test]
    fn killed_running_proc_is_dying_until_the_next_dispatch() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(4))
            .task(TaskSpec::basic(2))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        k.activate_task(ProcId(0));
        k.activate_task(ProcId(1));
        k.start_scheduling(core);
        k.kill_proc(ProcId(0));
        assert_eq!(k.proc_state(ProcId(0)), ProcState::Dying);

        k.start(core);
        assert_eq!(k.running_id(core), ProcId(1));
        k.assert_invariants();
    }
}
