//! Core types shared by the fedserve connection pool and result cache.
//!
//! - [`Endpoint`]: a parsed `host:port` RPC target with a canonical key form
//! - [`model`]: inference results and federated request parameters
//! - [`metrics`]: metric names and recording helpers
//! - [`time`]: wall-clock helpers used for scaling decisions

pub mod endpoint;
pub mod metrics;
pub mod model;
pub mod time;

pub use endpoint::{Endpoint, EndpointParseError};
pub use model::{FederatedParams, FederatedParty, FederatedRoles, ModelInfo, ReturnResult, retcode};
pub use time::now_millis;
