#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

mod core;

pub(crate) use crate::core::config;
pub(crate) use crate::core::runtime::{effects, net, process};
pub(crate) use crate::core::tooling::outcome;
pub(crate) use crate::core::{github, index};

pub use crate::core::commands::{
    add_suffix, organize, release, set_description, verify_wheels, DescriptionRequest,
    OrganizeRequest, ReleaseRequest, SuffixRequest, VerifyRequest,
};
pub use crate::core::config::context::CommandContext;
pub use crate::core::config::{Catalog, Config, EnvSnapshot, GlobalOptions, DEFAULT_CATALOG};
pub use crate::core::build::BackendKind;
pub use crate::core::runtime::effects::{Effects, SharedEffects, SystemEffects};
pub use crate::core::tooling::outcome::{
    outcome_from_error, CommandStatus, ConfigurationError, ExecutionOutcome,
};
