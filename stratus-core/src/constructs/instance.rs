//! Instance - A single EC2 instance with SSH access and user data

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{Construct, EC2_SERVICE_PRINCIPAL, SubnetSelection};
use crate::error::{BuildResult, InvalidSpecError};
use crate::key_material;
use crate::resource::{ResourceIdentifier, ResourceKind, ResourceSpec, Value};
use crate::schema::{AttributeSchema, ResourceSchema, types};
use crate::user_data::{self, EnvironmentMap};

pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

/// Ports opened to the internet on the instance's security group
pub const INGRESS_PORTS: [u16; 3] = [22, 80, 443];

pub const MACHINE_IMAGE: &str = "ecs-optimized-amazon-linux";

/// Returns the schema for Instance
pub fn schema() -> ResourceSchema {
    ResourceSchema::new("instance")
        .with_description("A single EC2 instance with SSH access and user data")
        .attribute(
            AttributeSchema::new("id", types::non_empty_string())
                .required()
                .with_description("Construct id"),
        )
        .attribute(
            AttributeSchema::new("vpc", types::non_empty_string())
                .required()
                .with_description("VPC to launch the instance in"),
        )
        .attribute(
            AttributeSchema::new("subnets", types::non_empty_list(types::non_empty_string()))
                .required()
                .with_description("Subnet selection for the instance"),
        )
        .attribute(
            AttributeSchema::new("user_data_path", types::non_empty_string())
                .required()
                .with_description("Path of the user data script"),
        )
        .attribute(
            AttributeSchema::new("public_key", types::non_empty_string())
                .required()
                .with_description("SSH public key, or a path to a public key file"),
        )
        .attribute(
            AttributeSchema::new("instance_type", types::instance_type())
                .with_default(DEFAULT_INSTANCE_TYPE)
                .with_description("EC2 instance type"),
        )
}

/// Configuration of an EC2 instance
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstanceConfig {
    pub id: String,
    pub vpc: Option<String>,
    pub subnets: Option<SubnetSelection>,
    pub user_data_path: Option<PathBuf>,
    pub public_key: Option<String>,
    pub environment: EnvironmentMap,
    pub instance_type: Option<String>,
}

impl InstanceConfig {
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

    pub fn with_user_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.user_data_path = Some(path.into());
        self
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    pub fn with_environment(mut self, environment: EnvironmentMap) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = Some(instance_type.into());
        self
    }

    pub fn instance_type(&self) -> &str {
        super::present(self.instance_type.as_deref()).unwrap_or(DEFAULT_INSTANCE_TYPE)
    }
}

impl Construct for InstanceConfig {
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
        super::insert_str(
            &mut attrs,
            "user_data_path",
            self.user_data_path.as_deref().and_then(Path::to_str),
        );
        super::insert_str(&mut attrs, "public_key", super::present(self.public_key.as_deref()));
        super::insert_str(&mut attrs, "instance_type", self.instance_type.as_deref());
        attrs
    }

    fn build(&self) -> BuildResult<ResourceSpec> {
        self.validate()?;

        let (Some(vpc), Some(subnets), Some(user_data_path), Some(public_key)) = (
            self.vpc.as_deref(),
            self.subnets.as_ref(),
            self.user_data_path.as_deref(),
            self.public_key.as_deref(),
        ) else {
            return Err(
                InvalidSpecError::invalid(&self.id, "<config>", "incomplete configuration").into(),
            );
        };

        let key = key_material::resolve(public_key)?;
        let user_data = user_data::compose_from_path(&self.environment, Some(user_data_path))?;
        let id = ResourceIdentifier::new(&self.id);
        log::debug!(
            "Assembling instance {} ({} user data commands)",
            id,
            user_data.len()
        );

        let spec = ResourceSpec::new(ResourceKind::Instance, id)
            .with_parameter("vpc", vpc)
            .with_parameter("subnets", subnets.to_value())
            .with_parameter("instance_type", self.instance_type())
            .with_parameter("machine_image", MACHINE_IMAGE)
            .with_parameter("role", super::iam_role(None, &[EC2_SERVICE_PRINCIPAL], &[]))
            .with_parameter("security_group", super::security_group(vpc, &INGRESS_PORTS))
            .with_parameter("key_pair", super::key_pair(&self.id, &key))
            .with_parameter("user_data", Value::strings(user_data.commands().iter().cloned()))
            .with_parameter("user_data_causes_replacement", true)
            .with_output("InstanceSSHKeyID", Value::resource_ref("SSHKey", "KeyPairId"))
            .with_output("InstanceInstanceID", Value::resource_ref("EC2", "InstanceId"))
            .with_output("InstancePublicIP", Value::resource_ref("EC2", "PublicIp"))
            .with_output("InstancePublicDNS", Value::resource_ref("EC2", "PublicDnsName"));

        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BuildError;
    use crate::key_material::KeyResolutionError;
    use crate::user_data::UserDataSourceError;

    fn fixture() -> (tempfile::TempDir, InstanceConfig) {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("user_data.sh");
        std::fs::write(&script, "yum install -y docker\n\nservice docker start\n").unwrap();
        let key = dir.path().join("id_rsa.pub");
        std::fs::write(&key, "ssh-rsa AAAAB3Nza user@host\n").unwrap();

        let config = InstanceConfig::new("BastionHost")
            .with_vpc("vpc-0abc")
            .with_subnets(SubnetSelection::ids(["subnet-1", "subnet-2"]))
            .with_user_data_path(script)
            .with_public_key(key.to_str().unwrap())
            .with_environment(EnvironmentMap::from_pairs([("STAGE", "dev")]).unwrap());
        (dir, config)
    }

    #[test]
    fn build_instance() {
        let (_dir, config) = fixture();
        let spec = config.build().unwrap();

        assert_eq!(spec.kind, ResourceKind::Instance);
        assert_eq!(spec.parameter("instance_type"), Some(&Value::from("t2.micro")));
        assert_eq!(
            spec.parameter("key_pair.public_key_material"),
            Some(&Value::from("ssh-rsa AAAAB3Nza user@host"))
        );
        assert_eq!(
            spec.parameter("key_pair.key_name"),
            Some(&Value::from("BastionHostEC2InstanceSSHKey"))
        );

        let user_data = spec.parameter("user_data").and_then(Value::as_list).unwrap();
        assert_eq!(user_data.len(), 5);
        assert_eq!(user_data[0], Value::from("STAGE=dev"));
        assert_eq!(user_data[3], Value::from(""));

        let ingress = spec
            .parameter("security_group.ingress")
            .and_then(Value::as_list)
            .unwrap();
        assert_eq!(ingress.len(), 3);
    }

    #[test]
    fn instance_outputs() {
        let (_dir, config) = fixture();
        let spec = config.build().unwrap();

        let names: Vec<_> = spec.outputs.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            vec![
                "InstanceInstanceID",
                "InstancePublicDNS",
                "InstancePublicIP",
                "InstanceSSHKeyID"
            ]
        );
        assert_eq!(
            spec.output("InstancePublicIP"),
            Some(&Value::resource_ref("EC2", "PublicIp"))
        );
    }

    #[test]
    fn instance_type_override() {
        let (_dir, config) = fixture();
        let spec = config.with_instance_type("m5.large").build().unwrap();
        assert_eq!(spec.parameter("instance_type"), Some(&Value::from("m5.large")));
    }

    #[test]
    fn missing_vpc_fails() {
        let (_dir, mut config) = fixture();
        config.vpc = None;

        match config.build() {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("vpc")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn empty_subnets_fail() {
        let (_dir, config) = fixture();
        let config = config.with_subnets(SubnetSelection::Ids(vec![]));

        match config.build() {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("subnets")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn blank_public_key_is_missing() {
        let (_dir, config) = fixture();
        let config = config.with_public_key("  ");

        match config.build() {
            Err(BuildError::InvalidSpec(e)) => assert_eq!(e.field(), Some("public_key")),
            other => panic!("Expected InvalidSpec, got {:?}", other),
        }
    }

    #[test]
    fn invalid_instance_type_fails() {
        let (_dir, config) = fixture();
        let result = config.with_instance_type("huge").build();
        assert!(matches!(result, Err(BuildError::InvalidSpec(_))));
    }

    #[test]
    fn unreadable_user_data_fails() {
        let (dir, config) = fixture();
        let config = config.with_user_data_path(dir.path().join("missing.sh"));
        assert!(matches!(
            config.build(),
            Err(BuildError::UserDataSource(UserDataSourceError::Unreadable { .. }))
        ));
    }

    #[test]
    fn empty_key_file_fails() {
        let (dir, config) = fixture();
        let key = dir.path().join("empty.pub");
        std::fs::write(&key, "").unwrap();
        let config = config.with_public_key(key.to_str().unwrap());
        assert!(matches!(
            config.build(),
            Err(BuildError::KeyResolution(KeyResolutionError::Empty { .. }))
        ));
    }

    #[test]
    fn build_is_deterministic() {
        let (_dir, config) = fixture();
        let first = config.build().unwrap();
        let second = config.build().unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first.to_json()).unwrap(),
            serde_json::to_string(&second.to_json()).unwrap()
        );
    }

    #[test]
    fn deserialize_config() {
        let config: InstanceConfig = serde_json::from_str(
            r#"{
                "id": "Web",
                "vpc": "vpc-1",
                "subnets": {"type": "public"},
                "user_data_path": "user_data.sh",
                "public_key": "ssh-rsa AAAA",
                "environment": {"STAGE": "prod"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.id, "Web");
        assert_eq!(config.environment.get("STAGE"), Some("prod"));
        assert_eq!(config.instance_type(), "t2.micro");
    }
}
