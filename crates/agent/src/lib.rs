//! Remote reasoning client and the per-session action loop.
//!
//! A session's lifetime: the gateway registers an [`ActiveSession`]
//! (driver + agent + control flags) in the [`SessionRegistry`] and spawns
//! [`run_agent_loop`]. The loop alternates screenshots and agent calls
//! until the agent stops emitting actions, a control request interrupts
//! it, or a safety check parks it pending human confirmation.

pub mod client;
pub mod control;
pub mod registry;
pub mod response;
pub mod runner;
pub mod util;

pub use client::{ComputerUseClient, ReasoningAgent};
pub use control::SessionControl;
pub use registry::{ActiveSession, PendingSafety, SessionRegistry};
pub use response::{AgentResponse, ComputerCall, OutputItem};
pub use runner::{resume_after_confirmation, run_agent_loop, spawn_inactivity_sweep};
pub use util::retry_with_backoff;
