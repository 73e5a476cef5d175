//! Command/query dispatch for Vigil.
//!
//! Commands and queries are closed sets of tagged variants with statically
//! known payloads, validated at the boundary before they reach a handler.
//! The [`Dispatcher`] routes envelopes to an [`ActivityStore`] backend and
//! publishes a domain event on the bus after every successful command.
//!
//! The [`service::ActivityService`] port carries the legacy call signatures
//! (`create_activity`, `update_activity`, `get_activities`); callers pick the
//! direct or dispatcher-backed implementation at construction time, and
//! failures always propagate — there is no silent fallback between paths.
//!
//! [`ActivityStore`]: vigil_core::store::ActivityStore

pub mod command;
pub mod dispatch;
pub mod error;
pub mod query;
pub mod service;


pub use command::{Command, CommandEnvelope};
pub use dispatch::{CommandOutcome, Dispatcher, QueryOutcome};
pub use error::{DispatchError, Result};
pub use query::{Query, QueryEnvelope};
pub use service::{
  ActivityService, CqrsActivityService, DirectActivityService,
};
