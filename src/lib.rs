//! Time-bounded proxy vetting and a staggered worker fleet.
//!
//! Candidates come from an [`EndpointSource`], get probed by a [`Vetter`]
//! under a wall-clock budget, and the survivors are persisted to an
//! [`EndpointStore`]. An [`Orchestrator`] then launches worker lifelines that
//! draw from an [`EndpointPool`] for every task cycle and report progress to
//! a shared [`StatusAggregator`].

pub mod configuration;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod pipeline;
pub mod pool;
pub mod provider;
pub mod providers;
pub mod source;
pub mod status;
pub mod store;
pub mod verification;
pub mod vetting;

pub use configuration::Settings;
pub use endpoint::{VerifiedEndpoint, VerifiedSet};
pub use error::{Error, Result};
pub use executor::{DelayRange, DryRunExecutor, TaskExecutor};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RunSummary};
pub use pool::EndpointPool;
pub use source::EndpointSource;
pub use status::{StatusAggregator, StatusReporter, StatusSink, StatusSnapshot};
pub use store::EndpointStore;
pub use verification::{HttpProber, Prober};
pub use vetting::{Vetter, VettingReport};
