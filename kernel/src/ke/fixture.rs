//! Test doubles: a recording machine port, hook set and time-object
//! engine, plus a builder that assembles leaked `OsApplication` tables the
//! way the generator would emit them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::vec::Vec;

use crate::config::{
    AppModeMask, OsApplication, ScheduleTableAutostart, ScheduleTableStart,
};
use crate::hooks::{Hooks, TimingProtection};
use crate::ke::core::CoreId;
use crate::ke::proc::{ProcId, ProcKind, ProcStatic};
use crate::ke::resource::{InternalResourceStatic, ResourceStatic};
use crate::port::{MachinePort, TimeObjectPort};
use crate::status::Status;

/// Machine port that records every call.
#[derive(Default)]
pub struct TestPort {
    pub init_calls: Mutex<Vec<ProcId>>,
    pub switches: Mutex<Vec<(Option<ProcId>, ProcId)>>,
    pub interrupt_locked: AtomicBool,
}

impl MachinePort for TestPort {
    fn init_context(&self, proc: ProcId) {
        self.init_calls.lock().unwrap().push(proc);
    }

    fn switch_context(&self, old: Option<ProcId>, new: ProcId) {
        self.switches.lock().unwrap().push((old, new));
    }

    fn interrupt_lock_status(&self) -> bool {
        self.interrupt_locked.load(Ordering::SeqCst)
    }

    fn reset_interrupt_lock_status(&self) {
        self.interrupt_locked.store(false, Ordering::SeqCst);
    }
}

/// Hook set that records every invocation.
#[derive(Default)]
pub struct RecordingHooks {
    pub pre: Mutex<Vec<ProcId>>,
    pub post: Mutex<Vec<ProcId>>,
    pub errors: Mutex<Vec<Status>>,
    pub protections: Mutex<Vec<Status>>,
}

impl Hooks for RecordingHooks {
    fn pre_task(&self, proc: ProcId) {
        self.pre.lock().unwrap().push(proc);
    }

    fn post_task(&self, proc: ProcId) {
        self.post.lock().unwrap().push(proc);
    }

    fn error(&self, code: Status) {
        self.errors.lock().unwrap().push(code);
    }

    fn protection(&self, code: Status) {
        self.protections.lock().unwrap().push(code);
    }
}

/// Timing protection with a switchable verdict.
pub struct VetoProtection {
    pub allow: AtomicBool,
    pub starts: Mutex<Vec<ProcId>>,
    pub settles: Mutex<Vec<ProcId>>,
}

impl Default for VetoProtection {
    fn default() -> Self {
        Self {
            allow: AtomicBool::new(true),
            starts: Mutex::new(Vec::new()),
            settles: Mutex::new(Vec::new()),
        }
    }
}

impl TimingProtection for VetoProtection {
    fn on_activate_or_release(&self, _proc: ProcId) -> bool {
        self.allow.load(Ordering::SeqCst)
    }

    fn on_start(&self, proc: ProcId) {
        self.starts.lock().unwrap().push(proc);
    }

    fn on_terminate_or_wait(&self, proc: ProcId) {
        self.settles.lock().unwrap().push(proc);
    }
}

/// Time-object engine that records autostart requests.
#[derive(Default)]
pub struct RecordingTimeObjects {
    pub alarms: Mutex<Vec<usize>>,
    pub tables: Mutex<Vec<(usize, ScheduleTableStart)>>,
}

impl TimeObjectPort for RecordingTimeObjects {
    fn start_alarm(&self, alarm: usize) {
        self.alarms.lock().unwrap().push(alarm);
    }

    fn start_schedule_table(&self, table: usize, start: ScheduleTableStart) {
        self.tables.lock().unwrap().push((table, start));
    }
}

/// Description of one task or ISR2 for the builder.
#[derive(Clone, Copy)]
pub struct TaskSpec {
    pub extended: bool,
    pub priority: u16,
    pub max_activations: u8,
    pub internal_resource: Option<u8>,
    pub autostart: AppModeMask,
}

impl TaskSpec {
    pub fn basic(priority: u16) -> Self {
        Self {
            extended: false,
            priority,
            max_activations: 1,
            internal_resource: None,
            autostart: AppModeMask::NONE,
        }
    }

    pub fn extended(priority: u16) -> Self {
        Self {
            extended: true,
            ..Self::basic(priority)
        }
    }

    pub fn max_activations(mut self, count: u8) -> Self {
        self.max_activations = count;
        self
    }

    pub fn internal_resource(mut self, index: u8) -> Self {
        self.internal_resource = Some(index);
        self
    }

    pub fn autostart(mut self, modes: AppModeMask) -> Self {
        self.autostart = modes;
        self
    }
}

/// Everything a test may want to inspect after building an application.
pub struct Harness {
    pub app: &'static OsApplication,
    pub port: &'static TestPort,
    pub hooks: &'static RecordingHooks,
    pub protection: Option<&'static VetoProtection>,
    pub time_objects: &'static RecordingTimeObjects,
}

/// Assembles a leaked application description.
pub struct AppBuilder {
    cores: usize,
    tasks: Vec<TaskSpec>,
    core_overrides: Vec<(usize, usize)>,
    isrs: Vec<TaskSpec>,
    internal_resources: Vec<u16>,
    resources: Vec<u16>,
    alarms: Vec<AppModeMask>,
    schedule_tables: Vec<ScheduleTableAutostart>,
    with_protection: bool,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            cores: 1,
            tasks: Vec::new(),
            core_overrides: Vec::new(),
            isrs: Vec::new(),
            internal_resources: Vec::new(),
            resources: Vec::new(),
            alarms: Vec::new(),
            schedule_tables: Vec::new(),
            with_protection: false,
        }
    }

    pub fn cores(mut self, count: usize) -> Self {
        self.cores = count;
        self
    }

    /// Add a task. Extended tasks must be added before basic ones so the
    /// id partition stays dense.
    pub fn task(mut self, spec: TaskSpec) -> Self {
        if spec.extended {
            assert!(
                self.tasks.iter().all(|t| t.extended),
                "extended tasks must come first"
            );
        }
        self.tasks.push(spec);
        self
    }

    /// Add a task on a specific core of a multicore application.
    pub fn task_on(mut self, core: usize, spec: TaskSpec) -> Self {
        self.tasks.push(spec);
        // Core assignment is resolved in build(); remember it by position.
        self.core_overrides.push((self.tasks.len() - 1, core));
        self
    }

    pub fn isr(mut self, spec: TaskSpec) -> Self {
        assert!(!spec.extended);
        self.isrs.push(spec);
        self
    }

    pub fn internal_resource(mut self, ceiling: u16) -> Self {
        self.internal_resources.push(ceiling);
        self
    }

    pub fn resource(mut self, ceiling: u16) -> Self {
        self.resources.push(ceiling);
        self
    }

    pub fn alarm(mut self, modes: AppModeMask) -> Self {
        self.alarms.push(modes);
        self
    }

    pub fn schedule_table(mut self, modes: AppModeMask, start: ScheduleTableStart) -> Self {
        self.schedule_tables
            .push(ScheduleTableAutostart {
                app_modes: modes,
                start,
            });
        self
    }

    pub fn with_protection(mut self) -> Self {
        self.with_protection = true;
        self
    }

    pub fn build(self) -> &'static OsApplication {
        self.build_harness().app
    }

    pub fn build_harness(self) -> Harness {
        let extended_count = self.tasks.iter().filter(|t| t.extended).count();
        let task_count = self.tasks.len();
        let isr_count = self.isrs.len();

        let mut procs = Vec::new();
        for (index, task) in self.tasks.iter().enumerate() {
            let core = self
                .core_overrides
                .iter()
                .find(|(position, _)| *position == index)
                .map(|(_, core)| *core)
                .unwrap_or(0);
            procs.push(ProcStatic {
                kind: if task.extended {
                    ProcKind::ExtendedTask
                } else {
                    ProcKind::BasicTask
                },
                base_priority: task.priority,
                max_activate_count: task.max_activations,
                internal_resource: task.internal_resource,
                core: CoreId(core as u8),
            });
        }
        for isr in &self.isrs {
            procs.push(ProcStatic {
                kind: ProcKind::Isr2,
                base_priority: isr.priority,
                max_activate_count: isr.max_activations,
                internal_resource: isr.internal_resource,
                core: CoreId::BOOT,
            });
        }
        for core in 0..self.cores {
            procs.push(ProcStatic {
                kind: ProcKind::Idle,
                base_priority: 0,
                max_activate_count: 1,
                internal_resource: None,
                core: CoreId(core as u8),
            });
        }

        let task_app_modes: Vec<AppModeMask> =
            self.tasks.iter().map(|t| t.autostart).collect();
        let internal_resources: Vec<InternalResourceStatic> = self
            .internal_resources
            .iter()
            .map(|&ceiling| InternalResourceStatic { ceiling })
            .collect();
        let resources: Vec<ResourceStatic> = self
            .resources
            .iter()
            .map(|&ceiling| ResourceStatic { ceiling })
            .collect();

        let port: &'static TestPort = Box::leak(Box::new(TestPort::default()));
        let hooks: &'static RecordingHooks = Box::leak(Box::new(RecordingHooks::default()));
        let time_objects: &'static RecordingTimeObjects =
            Box::leak(Box::new(RecordingTimeObjects::default()));
        let protection: Option<&'static VetoProtection> = if self.with_protection {
            Some(Box::leak(Box::new(VetoProtection::default())))
        } else {
            None
        };

        let app = Box::leak(Box::new(OsApplication {
            core_count: self.cores,
            task_count,
            extended_task_count: extended_count,
            isr2_count: isr_count,
            procs: Box::leak(procs.into_boxed_slice()),
            internal_resources: Box::leak(internal_resources.into_boxed_slice()),
            resources: Box::leak(resources.into_boxed_slice()),
            task_app_modes: Box::leak(task_app_modes.into_boxed_slice()),
            alarm_app_modes: Box::leak(self.alarms.into_boxed_slice()),
            schedule_tables: Box::leak(self.schedule_tables.into_boxed_slice()),
            port,
            time_objects,
            hooks,
            protection: protection.map(|p| p as &'static dyn TimingProtection),
        }));

        Harness {
            app,
            port,
            hooks,
            protection,
            time_objects,
        }
    }
}
