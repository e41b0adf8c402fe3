//! Tool Infrastructure
//!
//! This module provides everything needed to host user-supplied effectors
//! ("tools") outside the runtime process and call into them:
//!
//! - [`tool`](crate::tools::tool) - The [`Tool`] trait, argument helpers and
//!   the builder registry that maps config kinds to tool constructors
//! - [`spec`](crate::tools::spec) - Manifest construction for the specs a
//!   tool announces to models
//! - [`worker`](crate::tools::worker) - The per-tool worker loop and its
//!   framed IPC channel (child process over stdio, or in-process task)
//! - [`supervisor`](crate::tools::supervisor) - Lifecycle management and
//!   call routing across the whole worker fleet
//! - [`file`](crate::tools::file) / [`calc`](crate::tools::calc) - Built-in
//!   tools
//!
//! # Isolation model
//!
//! Each tool runs in its own worker with a duplex, length-prefixed JSON
//! channel back to the supervisor. A crashing or wedged tool never takes the
//! runtime down; its calls surface as errors instead. Within one worker,
//! calls are strictly serialised: at most one request is in flight per
//! channel at any instant.

/// Safe arithmetic expression evaluation.
pub mod calc;
/// File creation, modification and deletion.
pub mod file;
/// Tool manifest (spec) construction.
pub mod spec;
/// The core tool trait and builder registry.
pub mod tool;
/// Worker lifecycle and call routing.
pub mod supervisor;
/// The per-tool worker loop and IPC framing.
pub mod worker;

pub use spec::SpecBuilder;
pub use supervisor::{AsyncToolCall, ToolSupervisor};
pub use tool::{build_tool, CallArgs, Tool};
pub use worker::{PendingWorker, WorkerHandle};
