//! The kernel instance.
//!
//! [`Kernel`] owns every mutable word of the operating system: the dynamic
//! process descriptors, the event records, both resource pools and the
//! per-core state. Static tables stay in the application description it was
//! built from. Pools are sized by the `constants` limits so the whole value
//! is a fixed-size in-memory object with no allocation behind it.

use crate::config::OsApplication;
use crate::ke::core::{Core, CoreId, SwitchFlags};
use crate::ke::proc::constants::{
    MAX_CORE_COUNT, MAX_EXTENDED_TASK_COUNT, MAX_INTERNAL_RESOURCE_COUNT, MAX_PROC_COUNT,
    MAX_RESOURCE_COUNT,
};
use crate::ke::proc::{ProcDyn, ProcId, ProcState, TaskEvents};
use crate::ke::resource::{InternalResourceDyn, ResourceDyn};

/// A dispatch decision taken out of a core's kernel record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchAction {
    /// Context to save, when the outgoing process stays alive
    pub save: Option<ProcId>,
    /// Process to resume
    pub resume: ProcId,
}

/// The mutable state of the whole OS.
pub struct Kernel {
    pub(crate) app: &'static OsApplication,
    pub(crate) procs: [ProcDyn; MAX_PROC_COUNT],
    pub(crate) events: [TaskEvents; MAX_EXTENDED_TASK_COUNT],
    pub(crate) internal_resources: [InternalResourceDyn; MAX_INTERNAL_RESOURCE_COUNT],
    pub(crate) resources: [ResourceDyn; MAX_RESOURCE_COUNT],
    pub(crate) cores: [Core; MAX_CORE_COUNT],
}

impl Kernel {
    /// Build the kernel state for a generated application.
    ///
    /// Every process starts suspended with no live activation; nothing is
    /// dispatched until [`init_os`](Kernel::init_os) and
    /// [`start_scheduling`](Kernel::start_scheduling) run.
    pub fn new(app: &'static OsApplication) -> Self {
        app.debug_check();
        debug_assert!(app.proc_count() <= MAX_PROC_COUNT);
        debug_assert!(app.core_count <= MAX_CORE_COUNT);
        debug_assert!(app.extended_task_count <= MAX_EXTENDED_TASK_COUNT);
        debug_assert!(app.internal_resources.len() <= MAX_INTERNAL_RESOURCE_COUNT);
        debug_assert!(app.resources.len() <= MAX_RESOURCE_COUNT);

        const PROC: ProcDyn = ProcDyn::new();
        const EVENTS: TaskEvents = TaskEvents::new();
        const IRES: InternalResourceDyn = InternalResourceDyn::new();
        const RES: ResourceDyn = ResourceDyn::new();
        const CORE: Core = Core::new();

        Self {
            app,
            procs: [PROC; MAX_PROC_COUNT],
            events: [EVENTS; MAX_EXTENDED_TASK_COUNT],
            internal_resources: [IRES; MAX_INTERNAL_RESOURCE_COUNT],
            resources: [RES; MAX_RESOURCE_COUNT],
            cores: [CORE; MAX_CORE_COUNT],
        }
    }

    /// The application this kernel was built for.
    #[inline]
    pub fn app(&self) -> &'static OsApplication {
        self.app
    }

    /// Process running on `core`, `INVALID_PROC_ID` before the first
    /// dispatch.
    #[inline]
    pub fn running_id(&self, core: CoreId) -> ProcId {
        self.cores[core.as_usize()].kern.running_id
    }

    /// Lifecycle state of a process.
    #[inline]
    pub fn proc_state(&self, proc: ProcId) -> ProcState {
        self.procs[proc.idx()].state
    }

    /// Live activations of a process.
    #[inline]
    pub fn activate_count(&self, proc: ProcId) -> u8 {
        self.procs[proc.idx()].activate_count
    }

    /// Dispatch flags of `core` as left by the latest scheduling point.
    #[inline]
    pub fn need_switch(&self, core: CoreId) -> SwitchFlags {
        self.cores[core.as_usize()].kern.need_switch
    }

    /// Consume the dispatch decision of `core`.
    ///
    /// Returns what the context-switch primitive must do, or `None` when
    /// the latest scheduling point kept the running process. The flags are
    /// reset so the decision is acted on exactly once.
    pub fn take_switch(&mut self, core: CoreId) -> Option<SwitchAction> {
        let kern = &mut self.cores[core.as_usize()].kern;
        if !kern.need_switch.contains(SwitchFlags::NEED_SWITCH) {
            kern.need_switch = SwitchFlags::empty();
            return None;
        }
        let save = if kern.need_switch.contains(SwitchFlags::NEED_SAVE) && kern.old_id.is_valid()
        {
            Some(kern.old_id)
        } else {
            None
        };
        kern.need_switch = SwitchFlags::empty();
        Some(SwitchAction {
            save,
            resume: kern.running_id,
        })
    }

    #[inline]
    pub(crate) fn kern(&self, core: CoreId) -> &crate::ke::core::Kern {
        &self.cores[core.as_usize()].kern
    }

    #[inline]
    pub(crate) fn kern_mut(&mut self, core: CoreId) -> &mut crate::ke::core::Kern {
        &mut self.cores[core.as_usize()].kern
    }

    /// Check the cross-structure bookkeeping after a kernel operation.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        for core in 0..self.app.core_count {
            self.cores[core].ready.assert_well_formed();
            let running = self
                .procs
                .iter()
                .take(self.app.proc_count())
                .enumerate()
                .filter(|(id, p)| {
                    p.state == ProcState::Running
                        && self.app.procs[*id].core.as_usize() == core
                })
                .count();
            assert!(running <= 1, "more than one running process on core {core}");
        }
        for id in 0..self.app.proc_count() {
            let proc = ProcId(id as u16);
            let dyn_desc = &self.procs[id];
            let core = self.app.procs[id].core.as_usize();
            if dyn_desc.state == ProcState::Dying {
                // Killed on the CPU; accounting resumes at the next dispatch.
                continue;
            }
            let queued = self.cores[core].ready.count_of(proc);
            let off_queue = matches!(dyn_desc.state, ProcState::Running | ProcState::Waiting);
            assert_eq!(
                usize::from(dyn_desc.activate_count),
                queued + usize::from(off_queue),
                "activation accounting broken for proc {id}"
            );
            assert_eq!(
                dyn_desc.state == ProcState::Suspended,
                dyn_desc.activate_count == 0,
                "suspension does not match activation count for proc {id}"
            );
        }
    }
}
