//! Oscar OS Kernel
//!
//! A statically-configured real-time kernel for automotive-class systems,
//! built around fixed-priority scheduling with multiple activations and the
//! priority-ceiling protocol.
//!
//! # Architecture Overview
//!
//! The kernel is partitioned into these pieces:
//!
//! - **ke** - Kernel Executive: process descriptors, per-core ready heaps,
//!   the dispatcher, events, resources, and OS bootstrap
//! - **config** - The static application description produced by the system
//!   generator: process tables, resource ceilings, autostart masks
//! - **port** - Machine and time-object interfaces implemented by the target
//! - **hooks** - Application hook and timing-protection interfaces
//! - **services** - OSEK-shaped service entry points over the kernel instance
//!
//! # Execution model
//!
//! Every processor core runs exactly one process at a time, chosen from that
//! core's ready heap. Service calls run with the kernel lock held and record
//! a dispatch decision (`old -> running` plus a switch flag) in the per-core
//! kernel record; the machine port consumes the decision and performs the
//! context switch. The kernel itself never blocks and never allocates.
//!
//! The whole of the mutable OS state lives in a single [`ke::Kernel`] value.
//! Production builds wrap it in the global instance managed by [`services`];
//! tests construct their own instances against mock ports.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod hooks;
pub mod ke;
pub mod port;
pub mod services;
pub mod status;

pub use config::OsApplication;
pub use ke::Kernel;
pub use status::{OsState, Status};
