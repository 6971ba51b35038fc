//! OS bootstrap.
//!
//! `init_os` builds the initial ready state from the autostart tables:
//! every core's idle task, every task whose mask selects the chosen
//! application mode, and the autostarted time objects handed over to the
//! time-object engine. Dispatch begins afterwards with
//! [`start_scheduling`](Kernel::start_scheduling) on each core.

use crate::config::AppMode;
use crate::ke::core::CoreId;
use crate::ke::kernel::Kernel;
use crate::ke::proc::ProcId;
use crate::status::OsState;

impl Kernel {
    /// Apply the autostart tables for `app_mode`.
    pub fn init_os(&mut self, app_mode: AppMode) {
        log::info!("os init, application mode {}", app_mode);

        for core in 0..self.app.core_count {
            let idle = self.app.idle_id(core);
            let _started = self.activate_task(idle);
            debug_assert!(_started.is_ok());
        }

        for task in 0..self.app.task_count {
            if self.app.task_app_modes[task].contains(app_mode) {
                let _ = self.activate_task(ProcId(task as u16));
            }
        }

        for alarm in 0..self.app.alarm_app_modes.len() {
            if self.app.alarm_app_modes[alarm].contains(app_mode) {
                self.app.time_objects.start_alarm(alarm);
            }
        }

        for table in 0..self.app.schedule_tables.len() {
            let autostart = self.app.schedule_tables[table];
            if autostart.app_modes.contains(app_mode) {
                self.app
                    .time_objects
                    .start_schedule_table(table, autostart.start);
            }
        }
    }

    /// What `core` is executing right now.
    pub fn os_state(&self, core: CoreId) -> OsState {
        let running = self.kern(core).running_id;
        if !running.is_valid() {
            OsState::Init
        } else if self.app.is_idle(running) {
            OsState::Idle
        } else if self.app.is_task(running) {
            OsState::Task
        } else {
            OsState::Isr2
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppModeMask, ScheduleTableStart};
    use crate::ke::fixture::{AppBuilder, TaskSpec};
    use crate::ke::proc::ProcState;

    #[test]
    fn init_os_starts_the_idle_task_and_the_mode_selection() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(3).autostart(AppModeMask(0b01)))
            .task(TaskSpec::basic(5).autostart(AppModeMask(0b10)))
            .task(TaskSpec::basic(2))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        k.init_os(0);
        assert_eq!(k.proc_state(ProcId(0)), ProcState::ReadyAndNew);
        assert_eq!(k.proc_state(ProcId(1)), ProcState::Suspended);
        assert_eq!(k.proc_state(ProcId(2)), ProcState::Suspended);
        assert_ne!(k.proc_state(k.app.idle_id(0)), ProcState::Suspended);

        k.start_scheduling(core);
        assert_eq!(k.running_id(core), ProcId(0));
        k.assert_invariants();
    }

    #[test]
    fn a_different_mode_selects_a_different_task_set() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(3).autostart(AppModeMask(0b01)))
            .task(TaskSpec::basic(5).autostart(AppModeMask(0b10)))
            .build();
        let mut k = Kernel::new(app);

        k.init_os(1);
        assert_eq!(k.proc_state(ProcId(0)), ProcState::Suspended);
        assert_eq!(k.proc_state(ProcId(1)), ProcState::ReadyAndNew);
    }

    #[test]
    fn idle_runs_when_nothing_autostarts() {
        let app = AppBuilder::new().task(TaskSpec::basic(3)).build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        k.init_os(0);
        k.start_scheduling(core);
        assert_eq!(k.running_id(core), k.app.idle_id(0));
        assert_eq!(k.os_state(core), OsState::Idle);
        k.assert_invariants();
    }

    #[test]
    fn autostarted_time_objects_reach_the_engine() {
        let h = AppBuilder::new()
            .task(TaskSpec::basic(3))
            .alarm(AppModeMask(0b01))
            .alarm(AppModeMask(0b10))
            .schedule_table(AppModeMask(0b01), ScheduleTableStart::Relative)
            .schedule_table(AppModeMask(0b11), ScheduleTableStart::Synchronous)
            .build_harness();
        let mut k = Kernel::new(h.app);

        k.init_os(0);
        assert_eq!(*h.time_objects.alarms.lock().unwrap(), vec![0]);
        assert_eq!(
            *h.time_objects.tables.lock().unwrap(),
            vec![
                (0, ScheduleTableStart::Relative),
                (1, ScheduleTableStart::Synchronous)
            ]
        );
    }

    #[test]
    fn os_state_follows_the_running_partition() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(3).autostart(AppModeMask(0b01)))
            .isr(TaskSpec::basic(7))
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;

        assert_eq!(k.os_state(core), OsState::Init);
        k.init_os(0);
        k.start_scheduling(core);
        assert_eq!(k.os_state(core), OsState::Task);

        k.activate_isr2(ProcId(1));
        k.schedule_from_running(core);
        assert_eq!(k.os_state(core), OsState::Isr2);

        k.terminate_isr2(core);
        k.terminate_task(core);
        assert_eq!(k.os_state(core), OsState::Idle);
        k.assert_invariants();
    }

    #[test]
    fn each_core_gets_its_own_idle_task() {
        let app = AppBuilder::new()
            .cores(2)
            .task(TaskSpec::basic(3).autostart(AppModeMask(0b01)))
            .build();
        let mut k = Kernel::new(app);

        k.init_os(0);
        k.start_scheduling(CoreId(0));
        k.start_scheduling(CoreId(1));
        assert_eq!(k.running_id(CoreId(0)), ProcId(0));
        assert_eq!(k.running_id(CoreId(1)), k.app.idle_id(1));
        k.assert_invariants();
    }

    #[test]
    fn cross_core_activation_lands_on_the_owning_core() {
        let app = AppBuilder::new()
            .cores(2)
            .task(TaskSpec::basic(3))
            .task_on(1, TaskSpec::basic(4))
            .build();
        let mut k = Kernel::new(app);

        k.init_os(0);
        k.start_scheduling(CoreId(0));
        k.start_scheduling(CoreId(1));

        // Activation from core 0 of a task owned by core 1.
        assert_eq!(k.activate_task(ProcId(1)), crate::status::Status::OkAndSchedule);
        assert_eq!(k.cores[1].ready.front().id, ProcId(1));
        k.schedule_from_running(CoreId(1));
        assert_eq!(k.running_id(CoreId(1)), ProcId(1));
        k.assert_invariants();
    }
}
