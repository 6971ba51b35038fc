//! OSEK status codes and the global OS state.

/// Status returned by kernel services.
///
/// The numeric values of the standard codes follow OSEK/AUTOSAR so that an
/// application-level `StatusType` can be produced by a plain cast.
/// [`Status::OkAndSchedule`] is kernel-internal: it tells the service layer
/// that the operation succeeded and made a higher-priority process ready, so
/// a rescheduling point must follow. It is never handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Status {
    /// Service completed successfully
    Ok = 0,
    /// Too many activations queued for the target task
    Limit = 4,
    /// Resource service misuse (wrong release order, resource still occupied)
    Resource = 6,
    /// Target task is in an incompatible state (e.g. set-event on SUSPENDED)
    State = 7,
    /// A task returned from its body without calling its terminate service
    MissingEnd = 11,
    /// An ISR2 returned with interrupts still disabled by a service call
    DisabledInt = 12,
    /// Timing protection refused the arrival of a new activation or release
    ProtectionArrival = 16,
    /// Internal: success, and the caller must run the scheduler
    OkAndSchedule = 32,
}

impl Status {
    /// Collapse the internal scheduling marker to the application-visible
    /// success code.
    #[inline]
    pub fn into_service(self) -> Status {
        match self {
            Status::OkAndSchedule => Status::Ok,
            other => other,
        }
    }

    /// True for both success codes.
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok | Status::OkAndSchedule)
    }
}

/// What the current core is executing, derived from the running process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsState {
    /// No process has been dispatched yet (before `start_scheduling`)
    Init,
    /// The idle task is running
    Idle,
    /// A task is running
    Task,
    /// A category-2 ISR is running
    Isr2,
}
