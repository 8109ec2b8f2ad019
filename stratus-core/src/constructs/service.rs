//! Container service - An ECS service running one container on EC2 or Fargate

use std::collections::BTreeMap;

use serde::Deserialize;
use thiserror::Error;

use super::{Construct, SubnetSelection};
use crate::error::{BuildResult, InvalidSpecError};
use crate::resource::{ResourceIdentifier, ResourceKind, ResourceSpec, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

pub const DEFAULT_TASK_CPU: u32 = 1024;
pub const DEFAULT_EC2_TASK_MEMORY_MIB: u32 = 256;
pub const DEFAULT_FARGATE_TASK_MEMORY_MIB: u32 = 2048;
pub const DEFAULT_DESIRED_COUNT: u32 = 1;

/// Log retention of the service log group
pub const LOG_RETENTION_DAYS: i64 = 7;

/// Stream prefix of the awslogs driver
pub const LOG_STREAM_PREFIX: &str = "ecs";

const TASK_ROLE_PRINCIPALS: [&str; 2] = ["ecs.amazonaws.com", "ecs-tasks.amazonaws.com"];

/// Where the tasks of a service run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchType {
    #[default]
    Ec2,
    Fargate,
}

impl LaunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchType::Ec2 => "ec2",
            LaunchType::Fargate => "fargate",
        }
    }

    /// Task definition compatibility value
    pub fn compatibility(&self) -> &'static str {
        match self {
            LaunchType::Ec2 => "EC2",
            LaunchType::Fargate => "FARGATE",
        }
    }

    pub fn default_memory_mib(&self) -> u32 {
        match self {
            LaunchType::Ec2 => DEFAULT_EC2_TASK_MEMORY_MIB,
            LaunchType::Fargate => DEFAULT_FARGATE_TASK_MEMORY_MIB,
        }
    }

    fn kind(&self) -> ResourceKind {
        match self {
            LaunchType::Ec2 => ResourceKind::Ec2Service,
            LaunchType::Fargate => ResourceKind::FargateService,
        }
    }
}

/// Secret injected into the container environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretRef {
    /// SSM Parameter Store parameter name
    SsmParameter(String),
    /// Secrets Manager secret, optionally a single JSON field of it
    SecretsManager {
        secret_arn: String,
        #[serde(default)]
        field: Option<String>,
    },
}

impl SecretRef {
    fn to_value(&self) -> Value {
        match self {
            SecretRef::SsmParameter(name) => {
                Value::map([("ssm_parameter", Value::from(name.as_str()))])
            }
            SecretRef::SecretsManager { secret_arn, field } => {
                let mut map = BTreeMap::from([(
                    "secrets_manager".to_string(),
                    Value::from(secret_arn.as_str()),
                )]);
                if let Some(field) = field {
                    map.insert("field".to_string(), Value::from(field.as_str()));
                }
                Value::Map(map)
            }
        }
    }

    fn source(&self) -> &str {
        match self {
            SecretRef::SsmParameter(name) => name,
            SecretRef::SecretsManager { secret_arn, .. } => secret_arn,
        }
    }
}

/// Returns the schema for Container Service
pub fn schema() -> ResourceSchema {
    ResourceSchema::new("container_service")
        .with_description("An ECS service running a single container on EC2 or Fargate")
        .attribute(
            AttributeSchema::new("id", types::non_empty_string())
                .required()
                .with_description("Construct id; also the service name"),
        )
        .attribute(
            AttributeSchema::new("launch_type", AttributeType::Enum(vec![
                "ec2".to_string(),
                "fargate".to_string(),
            ]))
            .with_default("ec2")
            .with_description("Where tasks run"),
        )
        .attribute(
            AttributeSchema::new("vpc", types::non_empty_string())
                .required()
                .with_description("VPC of the service"),
        )
        .attribute(
            AttributeSchema::new("subnets", types::non_empty_list(types::non_empty_string()))
                .required()
                .with_description("Subnet selection for tasks"),
        )
        .attribute(
            AttributeSchema::new("cluster_ref", types::non_empty_string())
                .required()
                .with_description("Cluster the service runs in"),
        )
        .attribute(
            AttributeSchema::new("container_image", types::non_empty_string())
                .required()
                .with_description("Container image reference"),
        )
        .attribute(
            AttributeSchema::new("container_name", types::non_empty_string())
                .required()
                .with_description("Name of the container in the task definition"),
        )
        .attribute(
            AttributeSchema::new("task_family_name", types::non_empty_string())
                .with_description("Task definition family; defaults to the hyphenated id"),
        )
        .attribute(
            AttributeSchema::new("task_cpu", types::positive_int())
                .with_default(DEFAULT_TASK_CPU)
                .with_description("Task CPU units"),
        )
        .attribute(
            AttributeSchema::new("task_memory_mib", types::positive_int())
                .with_default(DEFAULT_EC2_TASK_MEMORY_MIB)
                .with_description("Task memory in MiB (Fargate default: 2048)"),
        )
        .attribute(
            AttributeSchema::new("ports", AttributeType::List(Box::new(types::port_number())))
                .with_default(Value::List(vec![]))
                .with_description("Container ports, bound to the same host ports over TCP"),
        )
        .attribute(
            AttributeSchema::new("environment", AttributeType::Map(Box::new(AttributeType::String)))
                .with_description("Container environment variables"),
        )
        .attribute(
            AttributeSchema::new("command", AttributeType::List(Box::new(AttributeType::String)))
                .with_description("Container command override"),
        )
        .attribute(
            AttributeSchema::new("secrets", AttributeType::Map(Box::new(types::non_empty_string())))
                .with_description("Secrets injected as environment variables"),
        )
        .attribute(
            AttributeSchema::new("desired_count", AttributeType::Int)
                .with_default(DEFAULT_DESIRED_COUNT)
                .with_description("Number of tasks to keep running"),
        )
        .attribute(
            AttributeSchema::new("capacity_provider", types::non_empty_string())
                .with_description("Capacity provider for EC2 services"),
        )
}

/// Configuration of an ECS service on EC2 or Fargate
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContainerServiceConfig {
    pub id: String,
    pub launch_type: LaunchType,
    pub vpc: Option<String>,
    pub subnets: Option<SubnetSelection>,
    pub cluster_ref: Option<String>,
    pub container_image: Option<String>,
    pub container_name: Option<String>,
    pub task_family_name: Option<String>,
    pub task_cpu: Option<u32>,
    pub task_memory_mib: Option<u32>,
    pub ports: Vec<u16>,
    pub environment: BTreeMap<String, String>,
    pub command: Option<Vec<String>>,
    pub secrets: BTreeMap<String, SecretRef>,
    pub desired_count: Option<u32>,
    pub capacity_provider: Option<String>,
}

impl ContainerServiceConfig {
    pub fn new(id: impl Into<String>, launch_type: LaunchType) -> Self {
        Self {
            id: id.into(),
            launch_type,
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

    pub fn with_cluster(mut self, cluster_ref: impl Into<String>) -> Self {
        self.cluster_ref = Some(cluster_ref.into());
        self
    }

    pub fn with_container(mut self, name: impl Into<String>, image: impl Into<String>) -> Self {
        self.container_name = Some(name.into());
        self.container_image = Some(image.into());
        self
    }

    pub fn with_task_family_name(mut self, family: impl Into<String>) -> Self {
        self.task_family_name = Some(family.into());
        self
    }

    pub fn with_task_size(mut self, cpu: u32, memory_mib: u32) -> Self {
        self.task_cpu = Some(cpu);
        self.task_memory_mib = Some(memory_mib);
        self
    }

    pub fn with_ports(mut self, ports: &[u16]) -> Self {
        self.ports = ports.to_vec();
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(command.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_secret(mut self, name: impl Into<String>, secret: SecretRef) -> Self {
        self.secrets.insert(name.into(), secret);
        self
    }

    pub fn with_desired_count(mut self, count: u32) -> Self {
        self.desired_count = Some(count);
        self
    }

    pub fn with_capacity_provider(mut self, provider: impl Into<String>) -> Self {
        self.capacity_provider = Some(provider.into());
        self
    }

    pub fn task_cpu(&self) -> u32 {
        self.task_cpu.unwrap_or(DEFAULT_TASK_CPU)
    }

    pub fn task_memory_mib(&self) -> u32 {
        self.task_memory_mib
            .unwrap_or_else(|| self.launch_type.default_memory_mib())
    }

    pub fn desired_count(&self) -> u32 {
        self.desired_count.unwrap_or(DEFAULT_DESIRED_COUNT)
    }

    fn check_environment(&self) -> Result<(), InvalidSpecError> {
        for name in self.environment.keys().chain(self.secrets.keys()) {
            if name.trim().is_empty() {
                return Err(InvalidSpecError::invalid(
                    &self.id,
                    "environment",
                    "variable names must not be empty",
                ));
            }
        }
        if let Some(name) = self.secrets.keys().find(|k| self.environment.contains_key(*k)) {
            return Err(InvalidSpecError::invalid(
                &self.id,
                "secrets",
                format!("'{}' is also a plain environment variable", name),
            ));
        }
        Ok(())
    }
}

/// A cpu/memory pair Fargate does not accept
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FargateSizeError {
    #[error("{0} is not a Fargate CPU size")]
    Cpu(u32),

    #[error("{memory_mib} MiB is not a valid memory size for {cpu} CPU units on Fargate")]
    Memory { cpu: u32, memory_mib: u32 },
}

impl FargateSizeError {
    /// Configuration field at fault
    pub fn field(&self) -> &'static str {
        match self {
            FargateSizeError::Cpu(_) => "task_cpu",
            FargateSizeError::Memory { .. } => "task_memory_mib",
        }
    }
}

/// Check a cpu/memory pair against the sizes Fargate accepts
pub fn validate_fargate_size(cpu: u32, memory_mib: u32) -> Result<(), FargateSizeError> {
    let allowed = match cpu {
        256 => matches!(memory_mib, 512 | 1024 | 2048),
        512 => (1024..=4096).contains(&memory_mib) && memory_mib % 1024 == 0,
        1024 => (2048..=8192).contains(&memory_mib) && memory_mib % 1024 == 0,
        2048 => (4096..=16384).contains(&memory_mib) && memory_mib % 1024 == 0,
        4096 => (8192..=30720).contains(&memory_mib) && memory_mib % 1024 == 0,
        8192 => (16384..=61440).contains(&memory_mib) && memory_mib % 4096 == 0,
        16384 => (32768..=122880).contains(&memory_mib) && memory_mib % 8192 == 0,
        _ => return Err(FargateSizeError::Cpu(cpu)),
    };
    if allowed {
        Ok(())
    } else {
        Err(FargateSizeError::Memory { cpu, memory_mib })
    }
}

impl Construct for ContainerServiceConfig {
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
        attrs.insert("launch_type".to_string(), Value::from(self.launch_type.as_str()));
        super::insert_str(&mut attrs, "vpc", self.vpc.as_deref());
        if let Some(subnets) = &self.subnets {
            attrs.insert("subnets".to_string(), subnets.to_attribute());
        }
        super::insert_str(&mut attrs, "cluster_ref", self.cluster_ref.as_deref());
        super::insert_str(&mut attrs, "container_image", self.container_image.as_deref());
        super::insert_str(&mut attrs, "container_name", self.container_name.as_deref());
        super::insert_str(&mut attrs, "task_family_name", self.task_family_name.as_deref());
        if let Some(cpu) = self.task_cpu {
            attrs.insert("task_cpu".to_string(), Value::from(cpu));
        }
        if let Some(memory) = self.task_memory_mib {
            attrs.insert("task_memory_mib".to_string(), Value::from(memory));
        }
        attrs.insert(
            "ports".to_string(),
            Value::List(self.ports.iter().map(|p| Value::from(*p)).collect()),
        );
        attrs.insert(
            "environment".to_string(),
            Value::map(
                self.environment
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str()))),
            ),
        );
        if let Some(command) = &self.command {
            attrs.insert("command".to_string(), Value::strings(command.iter().cloned()));
        }
        attrs.insert(
            "secrets".to_string(),
            Value::map(
                self.secrets
                    .iter()
                    .map(|(k, s)| (k.clone(), Value::from(s.source()))),
            ),
        );
        if let Some(count) = self.desired_count {
            attrs.insert("desired_count".to_string(), Value::from(count));
        }
        super::insert_str(&mut attrs, "capacity_provider", self.capacity_provider.as_deref());
        attrs
    }

    fn build(&self) -> BuildResult<ResourceSpec> {
        self.validate()?;

        let (Some(vpc), Some(subnets), Some(cluster_ref), Some(image), Some(container_name)) = (
            self.vpc.as_deref(),
            self.subnets.as_ref(),
            self.cluster_ref.as_deref(),
            self.container_image.as_deref(),
            self.container_name.as_deref(),
        ) else {
            return Err(
                InvalidSpecError::invalid(&self.id, "<config>", "incomplete configuration").into(),
            );
        };
        self.check_environment()?;

        let cpu = self.task_cpu();
        let memory = self.task_memory_mib();
        if self.launch_type == LaunchType::Fargate {
            validate_fargate_size(cpu, memory)
                .map_err(|e| InvalidSpecError::invalid(&self.id, e.field(), e.to_string()))?;
            if self.capacity_provider.is_some() {
                return Err(InvalidSpecError::invalid(
                    &self.id,
                    "capacity_provider",
                    "capacity providers apply to EC2 services only",
                )
                .into());
            }
        }

        let id = ResourceIdentifier::new(&self.id);
        let bindings = super::port_bindings(&self.id, &id.normalized, &self.ports)?;
        let family = super::present(self.task_family_name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| id.normalized.clone());
        log::debug!(
            "Assembling {} service {} (family {}, {} port bindings)",
            self.launch_type.as_str(),
            id,
            family,
            bindings.len()
        );

        let mut container = BTreeMap::from([
            ("name".to_string(), Value::from(container_name)),
            ("image".to_string(), Value::from(image)),
            (
                "port_mappings".to_string(),
                Value::List(bindings.iter().map(|b| b.to_value()).collect()),
            ),
            (
                "environment".to_string(),
                Value::map(
                    self.environment
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.as_str()))),
                ),
            ),
            (
                "secrets".to_string(),
                Value::map(self.secrets.iter().map(|(k, s)| (k.clone(), s.to_value()))),
            ),
            (
                "logging".to_string(),
                Value::map([
                    ("driver", Value::from("awslogs")),
                    ("stream_prefix", Value::from(LOG_STREAM_PREFIX)),
                    ("log_group", Value::resource_ref("Logs", "LogGroupName")),
                ]),
            ),
        ]);
        if let Some(command) = &self.command {
            container.insert("command".to_string(), Value::strings(command.iter().cloned()));
        }

        let mut task_definition = BTreeMap::from([
            ("family".to_string(), Value::String(family)),
            ("compatibility".to_string(), Value::from(self.launch_type.compatibility())),
            ("cpu".to_string(), Value::from(cpu)),
            ("task_role".to_string(), Value::resource_ref("TaskRole", "Arn")),
        ]);

        let mut service = BTreeMap::from([
            ("service_name".to_string(), Value::from(self.id.as_str())),
            ("cluster".to_string(), Value::from(cluster_ref)),
            ("desired_count".to_string(), Value::from(self.desired_count())),
            (
                "task_definition".to_string(),
                Value::resource_ref("TaskDefinition", "TaskDefinitionArn"),
            ),
            ("subnets".to_string(), subnets.to_value()),
        ]);

        let task_role_name = format!("{}TaskRole", self.id);
        let mut spec = ResourceSpec::new(self.launch_type.kind(), id);

        match self.launch_type {
            LaunchType::Ec2 => {
                container.insert("memory_reservation_mib".to_string(), Value::from(memory));
                if let Some(provider) = super::present(self.capacity_provider.as_deref()) {
                    service.insert(
                        "capacity_provider_strategies".to_string(),
                        Value::List(vec![Value::map([
                            ("capacity_provider", Value::from(provider)),
                            ("weight", Value::Int(1)),
                        ])]),
                    );
                }
            }
            LaunchType::Fargate => {
                container.insert("essential".to_string(), Value::Bool(true));
                task_definition.insert("memory_mib".to_string(), Value::from(memory));
                task_definition.insert("network_mode".to_string(), Value::from("awsvpc"));
                service.insert(
                    "security_groups".to_string(),
                    Value::List(vec![Value::resource_ref("SecurityGroup", "GroupId")]),
                );
                spec = spec.with_parameter("security_group", super::security_group(vpc, &[]));
            }
        }

        let spec = spec
            .with_parameter("vpc", vpc)
            .with_parameter(
                "log_group",
                Value::map([
                    ("retention_days", Value::Int(LOG_RETENTION_DAYS)),
                    ("removal_policy", Value::from("destroy")),
                ]),
            )
            .with_parameter(
                "task_role",
                super::iam_role(Some(task_role_name.as_str()), &TASK_ROLE_PRINCIPALS, &[]),
            )
            .with_parameter("task_definition", Value::Map(task_definition))
            .with_parameter("container", Value::Map(container))
            .with_parameter("service", Value::Map(service))
            .with_output(
                "ServiceTaskDefinition",
                Value::resource_ref("TaskDefinition", "TaskDefinitionArn"),
            )
            .with_output("ServiceLogs", Value::resource_ref("Logs", "Arn"));

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;

    fn config(launch_type: LaunchType) -> ContainerServiceConfig {
        ContainerServiceConfig::new("OrderApi", launch_type)
            .with_vpc("vpc-1")
            .with_subnets(SubnetSelection::ids(["subnet-a", "subnet-b"]))
            .with_cluster("orders-cluster")
            .with_container("api", "public.ecr.aws/nginx/nginx:latest")
    }

    #[test]
    fn ec2_service_with_two_ports() {
        let spec = config(LaunchType::Ec2)
            .with_ports(&[8080, 8443])
            .build()
            .unwrap();

        assert_eq!(spec.kind, ResourceKind::Ec2Service);
        let mappings = spec
            .parameter("container.port_mappings")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].lookup("name"), Some(&Value::from("order-api_port0")));
        assert_eq!(mappings[1].lookup("name"), Some(&Value::from("order-api_port1")));
        assert!(
            mappings
                .iter()
                .all(|m| m.lookup("protocol") == Some(&Value::from("tcp")))
        );
    }

    #[test]
    fn ec2_service_defaults() {
        let spec = config(LaunchType::Ec2).build().unwrap();

        assert_eq!(
            spec.parameter("task_definition.family"),
            Some(&Value::from("order-api"))
        );
        assert_eq!(spec.parameter("task_definition.cpu"), Some(&Value::Int(1024)));
        assert_eq!(
            spec.parameter("container.memory_reservation_mib"),
            Some(&Value::Int(256))
        );
        assert_eq!(spec.parameter("container.port_mappings"), Some(&Value::List(vec![])));
        assert_eq!(spec.parameter("container.command"), None);
        assert_eq!(spec.parameter("security_group"), None);
        assert_eq!(
            spec.parameter("task_role.role_name"),
            Some(&Value::from("OrderApiTaskRole"))
        );
        assert_eq!(
            spec.parameter("service.service_name"),
            Some(&Value::from("OrderApi"))
        );
        assert_eq!(spec.parameter("log_group.retention_days"), Some(&Value::Int(7)));
    }

    #[test]
    fn ec2_service_capacity_provider_strategy() {
        let spec = config(LaunchType::Ec2)
            .with_capacity_provider("workers-cp")
            .build()
            .unwrap();
        let strategies = spec
            .parameter("service.capacity_provider_strategies")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(strategies[0].lookup("weight"), Some(&Value::Int(1)));
    }

    #[test]
    fn fargate_service_defaults() {
        let spec = config(LaunchType::Fargate)
            .with_ports(&[80])
            .build()
            .unwrap();

        assert_eq!(spec.kind, ResourceKind::FargateService);
        assert_eq!(
            spec.parameter("task_definition.memory_mib"),
            Some(&Value::Int(2048))
        );
        assert_eq!(
            spec.parameter("task_definition.compatibility"),
            Some(&Value::from("FARGATE"))
        );
        assert_eq!(spec.parameter("container.essential"), Some(&Value::Bool(true)));
        assert!(spec.parameter("security_group").is_some());

        let mappings = spec
            .parameter("container.port_mappings")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(mappings[0].lookup("name"), Some(&Value::from("order-api")));
    }

    #[test]
    fn explicit_family_and_command() {
        let spec = config(LaunchType::Ec2)
            .with_task_family_name("orders")
            .with_command(["serve", "--port", "8080"])
            .with_env("RUST_LOG", "info")
            .with_secret("DB_PASSWORD", SecretRef::SsmParameter("/orders/db".to_string()))
            .build()
            .unwrap();

        assert_eq!(
            spec.parameter("task_definition.family"),
            Some(&Value::from("orders"))
        );
        assert_eq!(
            spec.parameter("container.command"),
            Some(&Value::strings(["serve", "--port", "8080"]))
        );
        assert_eq!(
            spec.parameter("container.environment.RUST_LOG"),
            Some(&Value::from("info"))
        );
        assert_eq!(
            spec.parameter("container.secrets.DB_PASSWORD.ssm_parameter"),
            Some(&Value::from("/orders/db"))
        );
    }

    #[test]
    fn service_outputs() {
        let spec = config(LaunchType::Fargate).build().unwrap();
        assert_eq!(
            spec.output("ServiceTaskDefinition"),
            Some(&Value::resource_ref("TaskDefinition", "TaskDefinitionArn"))
        );
        assert_eq!(
            spec.output("ServiceLogs"),
            Some(&Value::resource_ref("Logs", "Arn"))
        );
    }

    #[test]
    fn invalid_fargate_size_fails() {
        let result = config(LaunchType::Fargate).with_task_size(256, 4096).build();
        match result {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("task_memory_mib")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn unknown_fargate_cpu_names_task_cpu() {
        let result = config(LaunchType::Fargate).with_task_size(3000, 8192).build();
        match result {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("task_cpu")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn fargate_capacity_provider_rejected() {
        let result = config(LaunchType::Fargate)
            .with_capacity_provider("workers-cp")
            .build();
        assert!(matches!(result, Err(BuildError::InvalidSpec(_))));
    }

    #[test]
    fn zero_port_fails() {
        let result = config(LaunchType::Ec2).with_ports(&[0]).build();
        match result {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("ports")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn missing_container_image_fails() {
        let mut config = config(LaunchType::Ec2);
        config.container_image = None;
        match config.build() {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("container_image")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn secret_shadowing_environment_fails() {
        let result = config(LaunchType::Ec2)
            .with_env("TOKEN", "plain")
            .with_secret("TOKEN", SecretRef::SsmParameter("/token".to_string()))
            .build();
        match result {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("secrets")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_fargate_size() {
        assert!(validate_fargate_size(256, 512).is_ok());
        assert!(validate_fargate_size(1024, 2048).is_ok());
        assert!(validate_fargate_size(4096, 30720).is_ok());
        assert!(validate_fargate_size(512, 512).is_err());
        assert!(validate_fargate_size(1024, 2500).is_err());
        assert_eq!(validate_fargate_size(3000, 8192), Err(FargateSizeError::Cpu(3000)));
    }

    #[test]
    fn deserialize_fargate_config() {
        let config: ContainerServiceConfig = serde_json::from_str(
            r#"{
                "id": "Worker",
                "launch_type": "fargate",
                "vpc": "vpc-1",
                "subnets": {"ids": ["subnet-a"]},
                "cluster_ref": "main",
                "container_image": "worker:1",
                "container_name": "worker",
                "ports": [9000],
                "secrets": {
                    "API_KEY": {"secrets_manager": {
                        "secret_arn": "arn:aws:secretsmanager:eu-west-1:123456789012:secret:api"
                    }}
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.launch_type, LaunchType::Fargate);
        assert_eq!(config.task_memory_mib(), 2048);
        assert!(config.build().is_ok());
    }
}
