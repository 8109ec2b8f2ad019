//! Constructs - Builders that assemble one specification per construct family
//!
//! Every builder follows the same sequence: validate the configuration
//! against its schema, resolve key material and user data, derive names,
//! and emit a [`ResourceSpec`] with the family's fixed outputs.

pub mod cluster;
pub mod instance;
pub mod repository;
pub mod service;

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;

use crate::error::{BuildResult, InvalidSpecError};
use crate::key_material::KeyMaterial;
use crate::resource::{ResourceSpec, Value};
use crate::schema::ResourceSchema;

pub use cluster::AsgClusterConfig;
pub use instance::InstanceConfig;
pub use repository::EcrRepositoryConfig;
pub use service::{ContainerServiceConfig, LaunchType, SecretRef};

/// Principal used by EC2 instance roles
pub const EC2_SERVICE_PRINCIPAL: &str = "ec2.amazonaws.com";

/// CIDR that ingress rules open to
pub const ANY_IPV4: &str = "0.0.0.0/0";

/// Definition of a construct family
pub trait Construct {
    /// Construct id as written by the caller (e.g., "WebServer")
    fn id(&self) -> &str;

    /// Field schema for this family
    fn schema(&self) -> ResourceSchema;

    /// Configuration fields that are set, as attribute values
    fn attributes(&self) -> BTreeMap<String, Value>;

    /// Assemble the specification
    fn build(&self) -> BuildResult<ResourceSpec>;

    /// Check the configuration against the schema; the first problem is reported
    fn validate(&self) -> Result<(), InvalidSpecError> {
        self.schema()
            .validate(&self.attributes())
            .map_err(|errors| match errors.into_iter().next() {
                Some(first) => InvalidSpecError::from_type_error(self.id(), first),
                None => InvalidSpecError::invalid(self.id(), "<schema>", "validation failed"),
            })
    }
}

/// Subnets a construct places its compute in
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetSelection {
    /// Explicit subnet ids
    Ids(Vec<String>),
    /// All subnets of a type in the VPC
    Type(SubnetType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetType {
    Public,
    PrivateWithEgress,
    PrivateIsolated,
}

impl SubnetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubnetType::Public => "public",
            SubnetType::PrivateWithEgress => "private_with_egress",
            SubnetType::PrivateIsolated => "private_isolated",
        }
    }
}

impl SubnetSelection {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SubnetSelection::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn to_value(&self) -> Value {
        match self {
            SubnetSelection::Ids(ids) => Value::map([("subnet_ids", Value::strings(ids.clone()))]),
            SubnetSelection::Type(t) => Value::map([("subnet_type", Value::from(t.as_str()))]),
        }
    }

    /// Attribute form used for schema validation; an empty id list stays empty
    pub(crate) fn to_attribute(&self) -> Value {
        match self {
            SubnetSelection::Ids(ids) => Value::strings(ids.clone()),
            SubnetSelection::Type(t) => Value::strings([t.as_str()]),
        }
    }
}

/// Transport protocol of a port binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
        }
    }
}

/// Named mapping from a container port to the same host port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub container_port: u16,
    pub host_port: u16,
    pub name: String,
    pub protocol: Protocol,
}

impl PortBinding {
    pub fn to_value(&self) -> Value {
        Value::map([
            ("container_port", Value::from(self.container_port)),
            ("host_port", Value::from(self.host_port)),
            ("name", Value::from(self.name.as_str())),
            ("protocol", Value::from(self.protocol.as_str())),
        ])
    }
}

/// Build port bindings named after `normalized_id`
///
/// One port is named `<id>`; several are named `<id>_port<index>`.
pub fn port_bindings(
    construct: &str,
    normalized_id: &str,
    ports: &[u16],
) -> Result<Vec<PortBinding>, InvalidSpecError> {
    let indexed: Vec<(usize, u16)> = ports.iter().copied().enumerate().collect();
    let mut seen = HashSet::new();
    let mut bindings = Vec::with_capacity(indexed.len());

    for (index, port) in indexed {
        let name = crate::naming::port_binding_name(normalized_id, index, ports.len());
        if !seen.insert(name.clone()) {
            return Err(InvalidSpecError::DuplicatePortName {
                construct: construct.to_string(),
                name,
            });
        }
        bindings.push(PortBinding {
            container_port: port,
            host_port: port,
            name,
            protocol: Protocol::Tcp,
        });
    }

    Ok(bindings)
}

/// Security group allowing all outbound traffic and TCP ingress on `ingress_ports`
pub fn security_group(vpc: &str, ingress_ports: &[u16]) -> Value {
    let ingress = ingress_ports
        .iter()
        .map(|port| {
            Value::map([
                ("cidr", Value::from(ANY_IPV4)),
                ("from_port", Value::from(*port)),
                ("to_port", Value::from(*port)),
                ("protocol", Value::from(Protocol::Tcp.as_str())),
            ])
        })
        .collect();

    Value::map([
        ("vpc", Value::from(vpc)),
        ("allow_all_outbound", Value::Bool(true)),
        ("ingress", Value::List(ingress)),
    ])
}

/// IAM role assumed by `principals` with optional managed policies
pub fn iam_role(
    role_name: Option<&str>,
    principals: &[&str],
    managed_policies: &[String],
) -> Value {
    let mut role = BTreeMap::from([
        ("assumed_by".to_string(), Value::strings(principals.iter().copied())),
        (
            "managed_policies".to_string(),
            Value::strings(managed_policies.iter().cloned()),
        ),
    ]);
    if let Some(name) = role_name {
        role.insert("role_name".to_string(), Value::from(name));
    }
    Value::Map(role)
}

/// Key pair for SSH access, named `<id>EC2InstanceSSHKey`
pub fn key_pair(construct: &str, key: &KeyMaterial) -> Value {
    Value::map([
        ("key_name", Value::String(key_pair_name(construct))),
        ("public_key_material", Value::from(key.public_key.as_str())),
    ])
}

pub fn key_pair_name(construct: &str) -> String {
    format!("{}EC2InstanceSSHKey", construct)
}

/// Schemas of every construct family
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        instance::schema(),
        cluster::schema(),
        service::schema(),
        repository::schema(),
    ]
}

/// Treat empty or whitespace-only strings as absent
pub(crate) fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

/// Insert `value` under `key` when it is set
pub(crate) fn insert_str(attrs: &mut BTreeMap<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value {
        attrs.insert(key.to_string(), Value::from(v));
    }
}
