//! teanga-services
//!
//! Adapters implementing the `teanga_core::service::Service` contract, and a
//! registry to apply them to corpora by id:
//! - [`FnService`]: in-process closure
//! - [`RestService`]: remote HTTP endpoint (feature `rest`)

pub mod errors;
pub mod function;
pub mod registry;
pub mod rest;
pub mod spec;

pub use crate::errors::ServiceError;
pub use crate::function::FnService;
pub use crate::registry::{RegisteredService, ServiceRegistry};
#[cfg(feature = "rest")]
pub use crate::rest::RestService;
pub use crate::spec::{ServiceId, ServiceSpec};
