#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod config;
pub mod context;
pub mod conversation;
pub mod directives;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod store;
pub mod transport;
pub mod usage;
pub mod utils;

pub use config::Config;
pub use error::{PlanwiseError, Result};
pub use orchestrator::{AssistantReply, Orchestrator, TurnObserver};
pub use services::Services;
