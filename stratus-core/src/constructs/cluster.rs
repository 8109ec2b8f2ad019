//! ASG cluster - An ECS cluster whose capacity comes from an auto-scaling group

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Construct, EC2_SERVICE_PRINCIPAL, SubnetSelection, SubnetType};
use crate::error::{BuildResult, InvalidSpecError};
use crate::key_material;
use crate::resource::{ResourceIdentifier, ResourceKind, ResourceSpec, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use crate::user_data::{self, EnvironmentMap};

pub const MACHINE_IMAGE: &str = "ecs-optimized-amazon-linux-2";

/// Port the cluster security group always admits
pub const SERVICE_PORT: u16 = 80;

/// Admitted only when instances get public addresses
pub const SSH_PORT: u16 = 22;

/// Returns the schema for ASG Cluster
pub fn schema() -> ResourceSchema {
    ResourceSchema::new("asg_cluster")
        .with_description("An ECS cluster backed by an auto-scaling group capacity provider")
        .attribute(
            AttributeSchema::new("id", types::non_empty_string())
                .required()
                .with_description("Construct id"),
        )
        .attribute(
            AttributeSchema::new("vpc", types::non_empty_string())
                .required()
                .with_description("VPC for the cluster and its instances"),
        )
        .attribute(
            AttributeSchema::new("subnets", types::non_empty_list(types::non_empty_string()))
                .with_description("Subnet selection; derived from associate_public_ip when unset"),
        )
        .attribute(
            AttributeSchema::new("associate_public_ip", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Place instances in public subnets and admit SSH"),
        )
        .attribute(
            AttributeSchema::new("service_port", types::port_number())
                .with_default(Value::from(SERVICE_PORT))
                .with_description("TCP port admitted by the cluster security group"),
        )
        .attribute(
            AttributeSchema::new("instance_type", types::instance_type())
                .required()
                .with_description("EC2 instance type of the launch template"),
        )
        .attribute(
            AttributeSchema::new("max_capacity", types::positive_int())
                .required()
                .with_description("Maximum number of instances"),
        )
        .attribute(
            AttributeSchema::new("desired_capacity", types::positive_int())
                .required()
                .with_description("Desired number of instances"),
        )
        .attribute(
            AttributeSchema::new("public_key", types::non_empty_string())
                .with_description("SSH public key, or a path to a public key file"),
        )
        .attribute(
            AttributeSchema::new("user_data_path", types::non_empty_string())
                .with_description("Path of the user data script"),
        )
        .attribute(
            AttributeSchema::new(
                "profile_policies",
                AttributeType::List(Box::new(types::non_empty_string())),
            )
            .with_default(Value::List(vec![]))
            .with_description("Managed policies attached to the instance role"),
        )
}

/// Configuration of an ECS cluster with auto-scaling group capacity
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsgClusterConfig {
    pub id: String,
    pub vpc: Option<String>,
    pub subnets: Option<SubnetSelection>,
    pub associate_public_ip: bool,
    pub service_port: Option<u16>,
    pub instance_type: Option<String>,
    pub max_capacity: Option<u32>,
    pub desired_capacity: Option<u32>,
    pub public_key: Option<String>,
    pub user_data_path: Option<PathBuf>,
    pub profile_policies: Vec<String>,
    pub environment: EnvironmentMap,
}

impl AsgClusterConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_vpc(mut self, vpc: impl Into<String>) -> Self {
        self.vpc = Some(vpc.into());
        self
    }

    pub fn with_subnets(mut self, subnets: SubnetSelection) -> Self {
        self.subnets = Some(subnets);
        self
    }

    pub fn with_public_ip(mut self, associate_public_ip: bool) -> Self {
        self.associate_public_ip = associate_public_ip;
        self
    }

    pub fn with_service_port(mut self, port: u16) -> Self {
        self.service_port = Some(port);
        self
    }

    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    pub fn with_capacity(mut self, desired: u32, max: u32) -> Self {
        self.desired_capacity = Some(desired);
        self.max_capacity = Some(max);
        self
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    pub fn with_user_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_data_path = Some(path.into());
        self
    }

    pub fn with_profile_policy(mut self, policy: impl Into<String>) -> Self {
        self.profile_policies.push(policy.into());
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentMap) -> Self {
        self.environment = environment;
        self
    }
}

impl Construct for AsgClusterConfig {
    fn id(&self) -> &str {
        &self.id
    }

    fn schema(&self) -> ResourceSchema {
        schema()
    }

    fn attributes(&self) -> BTreeMap<String, Value> {
        let mut attrs = BTreeMap::new();
        if !self.id.is_empty() {
            attrs.insert("id".to_string(), Value::from(self.id.as_str()));
        }
        super::insert_str(&mut attrs, "vpc", self.vpc.as_deref());
        if let Some(subnets) = &self.subnets {
            attrs.insert("subnets".to_string(), subnets.to_attribute());
        }
        attrs.insert(
            "associate_public_ip".to_string(),
            Value::Bool(self.associate_public_ip),
        );
        if let Some(port) = self.service_port {
            attrs.insert("service_port".to_string(), Value::from(port));
        }
        super::insert_str(&mut attrs, "instance_type", self.instance_type.as_deref());
        if let Some(max) = self.max_capacity {
            attrs.insert("max_capacity".to_string(), Value::from(max));
        }
        if let Some(desired) = self.desired_capacity {
            attrs.insert("desired_capacity".to_string(), Value::from(desired));
        }
        super::insert_str(&mut attrs, "public_key", super::present(self.public_key.as_deref()));
        super::insert_str(
            &mut attrs,
            "user_data_path",
            self.user_data_path.as_deref().and_then(Path::to_str),
        );
        attrs.insert(
            "profile_policies".to_string(),
            Value::strings(self.profile_policies.iter().cloned()),
        );
        attrs
    }

    fn build(&self) -> BuildResult<ResourceSpec> {
        self.validate()?;

        let (Some(vpc), Some(instance_type), Some(max), Some(desired)) = (
            self.vpc.as_deref(),
            self.instance_type.as_deref(),
            self.max_capacity,
            self.desired_capacity,
        ) else {
            return Err(
                InvalidSpecError::invalid(&self.id, "<config>", "incomplete configuration").into(),
            );
        };
        if desired > max {
            return Err(InvalidSpecError::invalid(
                &self.id,
                "desired_capacity",
                format!("desired capacity {} exceeds max capacity {}", desired, max),
            )
            .into());
        }

        let subnets = self.subnet_selection();
        let ingress_ports = self.ingress_ports();

        let key = key_material::resolve_optional(self.public_key.as_deref())?;
        let user_data =
            user_data::compose_from_path(&self.environment, self.user_data_path.as_deref())?;
        let id = ResourceIdentifier::new(&self.id);
        log::debug!(
            "Assembling cluster {} (desired {}, max {}, key pair: {})",
            id,
            desired,
            max,
            key.is_some()
        );

        let mut launch_template = BTreeMap::from([
            ("machine_image".to_string(), Value::from(MACHINE_IMAGE)),
            ("instance_type".to_string(), Value::from(instance_type)),
            (
                "user_data".to_string(),
                Value::strings(user_data.commands().iter().cloned()),
            ),
            ("role".to_string(), Value::resource_ref("Role", "Arn")),
            (
                "associate_public_ip_address".to_string(),
                Value::Bool(self.associate_public_ip),
            ),
            (
                "security_group".to_string(),
                Value::resource_ref("SG", "GroupId"),
            ),
        ]);
        if let Some(key) = &key {
            let key_name = Value::String(super::key_pair_name(&self.id));
            launch_template.insert("key_name".to_string(), key_name);
            launch_template.insert("key_pair".to_string(), super::key_pair(&self.id, key));
        }

        let spec = ResourceSpec::new(ResourceKind::AsgCluster, id)
            .with_parameter("vpc", vpc)
            .with_parameter(
                "role",
                super::iam_role(None, &[EC2_SERVICE_PRINCIPAL], &self.profile_policies),
            )
            .with_parameter("security_group", super::security_group(vpc, &ingress_ports))
            .with_parameter("launch_template", Value::Map(launch_template))
            .with_parameter(
                "auto_scaling_group",
                Value::map([
                    ("subnets", subnets.to_value()),
                    ("max_capacity", Value::from(max)),
                    ("desired_capacity", Value::from(desired)),
                    ("launch_template", Value::resource_ref("LaunchTemplate", "LaunchTemplateId")),
                ]),
            )
            .with_parameter(
                "capacity_provider",
                Value::map([(
                    "auto_scaling_group",
                    Value::resource_ref("AutoScalingGroup", "AutoScalingGroupName"),
                )]),
            )
            .with_output(
                "CapacityProviderName",
                Value::resource_ref("AsgCapacityProvider", "CapacityProviderName"),
            )
            .with_output("ClusterName", Value::resource_ref("Cluster", "ClusterName"));

        Ok(spec)
    }
}

impl AsgClusterConfig {
    /// Explicit subnets win; otherwise public or isolated subnets per `associate_public_ip`
    fn subnet_selection(&self) -> SubnetSelection {
        match &self.subnets {
            Some(subnets) => subnets.clone(),
            None if self.associate_public_ip => SubnetSelection::Type(SubnetType::Public),
            None => SubnetSelection::Type(SubnetType::PrivateIsolated),
        }
    }

    fn ingress_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.service_port.unwrap_or(SERVICE_PORT)];
        if self.associate_public_ip {
            ports.push(SSH_PORT);
        }
        ports
    }
}
