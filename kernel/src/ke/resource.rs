//! Priority-ceiling resources.
//!
//! Two flavors share the ceiling discipline:
//!
//! - **Internal resources** are bound to tasks at generation time. The
//!   dispatcher takes them when the task starts and drops them when it
//!   terminates or waits; the task never sees them. An internal resource
//!   whose ceiling is the highest task priority makes its owner
//!   non-preemptable.
//! - **Standard resources** are taken and released by the running process
//!   through the resource services. Held resources form a LIFO stack per
//!   process, linked through a pre-allocated pool; release must unwind in
//!   reverse acquisition order.
//!
//! Taking a resource saves the owner's dynamic priority and raises it to
//! the resource ceiling, so no process that could contend for the resource
//! can be dispatched while it is held.

use crate::ke::core::CoreId;
use crate::ke::heap::ceiling_key;
use crate::ke::kernel::Kernel;
use crate::ke::proc::ProcId;
use crate::status::Status;

/// Generated half of an internal resource.
#[derive(Debug, Clone, Copy)]
pub struct InternalResourceStatic {
    /// Highest base priority among the tasks bound to the resource
    pub ceiling: u16,
}

/// Mutable half of an internal resource.
#[derive(Debug, Clone, Copy)]
pub struct InternalResourceDyn {
    pub(crate) taken: bool,
    pub(crate) owner_prev_priority: u32,
}

impl InternalResourceDyn {
    pub const fn new() -> Self {
        Self {
            taken: false,
            owner_prev_priority: 0,
        }
    }
}

/// Generated half of a standard resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceStatic {
    /// Highest base priority among the processes using the resource
    pub ceiling: u16,
}

/// Mutable half of a standard resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceDyn {
    pub(crate) taken: bool,
    pub(crate) owner_prev_priority: u32,
    /// Next resource down the owner's held stack
    pub(crate) next: Option<u8>,
}

impl ResourceDyn {
    pub const fn new() -> Self {
        Self {
            taken: false,
            owner_prev_priority: 0,
            next: None,
        }
    }
}

impl Kernel {
    /// Take the internal resource of `task`, if it has one and does not
    /// hold it already.
    pub(crate) fn get_internal_resource(&mut self, task: ProcId) {
        let Some(index) = self.app.proc(task).internal_resource else {
            return;
        };
        let ceiling = self.app.internal_resources[usize::from(index)].ceiling;
        let res = &mut self.internal_resources[usize::from(index)];
        if !res.taken {
            res.taken = true;
            res.owner_prev_priority = self.procs[task.idx()].priority;
            self.procs[task.idx()].priority = ceiling_key(ceiling);
            log::trace!(
                "proc {} takes internal resource {}, priority {:#010x}",
                task.0,
                index,
                self.procs[task.idx()].priority
            );
        }
    }

    /// Drop the internal resource of `task`, if it holds one, restoring
    /// the saved priority.
    pub(crate) fn release_internal_resource(&mut self, task: ProcId) {
        let Some(index) = self.app.proc(task).internal_resource else {
            return;
        };
        let res = &mut self.internal_resources[usize::from(index)];
        if res.taken {
            res.taken = false;
            self.procs[task.idx()].priority = res.owner_prev_priority;
            log::trace!("proc {} drops internal resource {}", task.0, index);
        }
    }

    /// Occupy a standard resource for the process running on `core`.
    ///
    /// Fails with [`Status::Resource`] when the resource is already
    /// occupied.
    pub fn get_resource(&mut self, core: CoreId, resource: usize) -> Status {
        debug_assert!(resource < self.app.resources.len());
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());

        if self.resources[resource].taken {
            return Status::Resource;
        }
        let ceiling = ceiling_key(self.app.resources[resource].ceiling);
        let owner = &mut self.procs[running.idx()];
        let res = &mut self.resources[resource];
        res.taken = true;
        res.owner_prev_priority = owner.priority;
        res.next = owner.resources;
        owner.resources = Some(resource as u8);
        if ceiling > owner.priority {
            owner.priority = ceiling;
        }
        log::trace!("proc {} takes resource {}", running.0, resource);
        Status::Ok
    }

    /// Release a standard resource held by the process running on `core`.
    ///
    /// Releases must unwind the held stack in order: releasing anything but
    /// the most recently taken resource fails with [`Status::Resource`]
    /// and changes nothing. A release is a rescheduling point; the caller
    /// runs the scheduler on success.
    pub fn release_resource(&mut self, core: CoreId, resource: usize) -> Status {
        debug_assert!(resource < self.app.resources.len());
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());

        let owner = &mut self.procs[running.idx()];
        match owner.resources {
            Some(head) if usize::from(head) == resource => {}
            _ => return Status::Resource,
        }
        let res = &mut self.resources[resource];
        owner.resources = res.next;
        owner.priority = res.owner_prev_priority;
        res.taken = false;
        res.next = None;
        log::trace!("proc {} drops resource {}", running.0, resource);
        Status::Ok
    }

    /// Unwind the whole held-resource stack of the process running on
    /// `core`. Used by the termination services when a process dies with
    /// resources still occupied.
    pub(crate) fn release_all_resources(&mut self, core: CoreId) {
        let running = self.kern(core).running_id;
        debug_assert!(running.is_valid());
        while let Some(head) = self.procs[running.idx()].resources {
            let _status = self.release_resource(core, usize::from(head));
            debug_assert_eq!(_status, Status::Ok);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ke::fixture::{AppBuilder, TaskSpec};
    use crate::ke::heap::make_key;

    #[test]
    fn internal_resource_raises_and_restores_priority() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(2).internal_resource(0))
            .internal_resource(5)
            .build();
        let mut k = Kernel::new(app);
        let task = ProcId(0);
        k.procs[0].priority = make_key(2, 7);

        k.get_internal_resource(task);
        assert_eq!(k.procs[0].priority, ceiling_key(5));
        k.release_internal_resource(task);
        assert_eq!(k.procs[0].priority, make_key(2, 7));
    }

    #[test]
    fn internal_take_and_release_are_idempotent() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(2).internal_resource(0))
            .internal_resource(5)
            .build();
        let mut k = Kernel::new(app);
        let task = ProcId(0);
        k.procs[0].priority = make_key(2, 1);

        k.get_internal_resource(task);
        let held = k.procs[0].priority;
        k.get_internal_resource(task);
        assert_eq!(k.procs[0].priority, held);

        k.release_internal_resource(task);
        let restored = k.procs[0].priority;
        k.release_internal_resource(task);
        assert_eq!(k.procs[0].priority, restored);
        assert!(!k.internal_resources[0].taken);
    }

    #[test]
    fn tasks_without_internal_resource_are_untouched() {
        let app = AppBuilder::new().task(TaskSpec::basic(3)).build();
        let mut k = Kernel::new(app);
        k.procs[0].priority = make_key(3, 4);
        k.get_internal_resource(ProcId(0));
        k.release_internal_resource(ProcId(0));
        assert_eq!(k.procs[0].priority, make_key(3, 4));
    }

    #[test]
    fn standard_resources_release_in_lifo_order() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .resource(4)
            .resource(6)
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;
        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        let base = k.procs[0].priority;

        assert_eq!(k.get_resource(core, 0), Status::Ok);
        assert_eq!(k.procs[0].priority, ceiling_key(4));
        assert_eq!(k.get_resource(core, 1), Status::Ok);
        assert_eq!(k.procs[0].priority, ceiling_key(6));

        // Out of order: the first-taken resource is not the stack head.
        assert_eq!(k.release_resource(core, 0), Status::Resource);
        assert_eq!(k.procs[0].priority, ceiling_key(6));

        assert_eq!(k.release_resource(core, 1), Status::Ok);
        assert_eq!(k.procs[0].priority, ceiling_key(4));
        assert_eq!(k.release_resource(core, 0), Status::Ok);
        assert_eq!(k.procs[0].priority, base);
        assert!(k.procs[0].resources.is_none());
    }

    #[test]
    fn occupied_resource_is_refused() {
        let app = AppBuilder::new().task(TaskSpec::basic(2)).resource(4).build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;
        k.activate_task(ProcId(0));
        k.start_scheduling(core);

        assert_eq!(k.get_resource(core, 0), Status::Ok);
        assert_eq!(k.get_resource(core, 0), Status::Resource);
    }

    #[test]
    fn release_all_unwinds_the_stack() {
        let app = AppBuilder::new()
            .task(TaskSpec::basic(2))
            .resource(3)
            .resource(5)
            .resource(4)
            .build();
        let mut k = Kernel::new(app);
        let core = CoreId::BOOT;
        k.activate_task(ProcId(0));
        k.start_scheduling(core);
        let base = k.procs[0].priority;

        for res in 0..3 {
            assert_eq!(k.get_resource(core, res), Status::Ok);
        }
        k.release_all_resources(core);
        assert_eq!(k.procs[0].priority, base);
        assert!(k.procs[0].resources.is_none());
        for res in 0..3 {
            assert!(!k.resources[res].taken);
        }
    }
}
