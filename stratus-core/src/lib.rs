//! Stratus Core
//!
//! Assembles reusable AWS constructs (EC2 instances, ECS clusters and services,
//! ECR repositories) into deterministic resource specifications

pub mod constructs;
pub mod error;
pub mod key_material;
pub mod naming;
pub mod resource;
pub mod schema;
pub mod stack;
pub mod template;
pub mod user_data;

pub use error::{BuildError, BuildResult, InvalidSpecError};
pub use resource::{ResourceIdentifier, ResourceKind, ResourceSpec, Value};
pub use stack::{ConstructConfig, Stack, StackError};
