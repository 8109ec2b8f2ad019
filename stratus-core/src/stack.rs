//! Stack - Synthesize a list of construct configurations in declaration order

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::constructs::{
    AsgClusterConfig, Construct, ContainerServiceConfig, EcrRepositoryConfig, InstanceConfig,
};
use crate::error::{BuildError, InvalidSpecError};
use crate::resource::ResourceSpec;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid stack file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to build '{id}': {source}")]
    Build {
        id: String,
        #[source]
        source: BuildError,
    },
}

/// Configuration of one construct, tagged by its family
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConstructConfig {
    Instance(InstanceConfig),
    AsgCluster(AsgClusterConfig),
    ContainerService(ContainerServiceConfig),
    EcrRepository(EcrRepositoryConfig),
}

impl ConstructConfig {
    fn construct(&self) -> &dyn Construct {
        match self {
            ConstructConfig::Instance(c) => c,
            ConstructConfig::AsgCluster(c) => c,
            ConstructConfig::ContainerService(c) => c,
            ConstructConfig::EcrRepository(c) => c,
        }
    }

    pub fn id(&self) -> &str {
        self.construct().id()
    }

    /// Family name as written in the `kind` field
    pub fn kind(&self) -> &'static str {
        match self {
            ConstructConfig::Instance(_) => "instance",
            ConstructConfig::AsgCluster(_) => "asg_cluster",
            ConstructConfig::ContainerService(_) => "container_service",
            ConstructConfig::EcrRepository(_) => "ecr_repository",
        }
    }

    pub fn build(&self) -> Result<ResourceSpec, BuildError> {
        self.construct().build()
    }
}

impl From<InstanceConfig> for ConstructConfig {
    fn from(config: InstanceConfig) -> Self {
        ConstructConfig::Instance(config)
    }
}

impl From<AsgClusterConfig> for ConstructConfig {
    fn from(config: AsgClusterConfig) -> Self {
        ConstructConfig::AsgCluster(config)
    }
}

impl From<ContainerServiceConfig> for ConstructConfig {
    fn from(config: ContainerServiceConfig) -> Self {
        ConstructConfig::ContainerService(config)
    }
}

impl From<EcrRepositoryConfig> for ConstructConfig {
    fn from(config: EcrRepositoryConfig) -> Self {
        ConstructConfig::EcrRepository(config)
    }
}

/// Ordered list of constructs synthesized together
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stack {
    pub constructs: Vec<ConstructConfig>,
}

impl Stack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_construct(mut self, config: impl Into<ConstructConfig>) -> Self {
        self.constructs.push(config.into());
        self
    }

    pub fn from_json_str(content: &str) -> Result<Self, StackError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a stack file; relative paths inside it resolve against the working directory
    pub fn load(path: &Path) -> Result<Self, StackError> {
        let content = fs::read_to_string(path).map_err(|source| StackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let stack = Self::from_json_str(&content)?;
        log::info!(
            "Loaded {} constructs from {}",
            stack.constructs.len(),
            path.display()
        );
        Ok(stack)
    }

    fn check_unique_ids(&self) -> Result<(), StackError> {
        let mut seen = HashSet::new();
        for config in &self.constructs {
            if !seen.insert(config.id()) {
                return Err(StackError::Build {
                    id: config.id().to_string(),
                    source: InvalidSpecError::DuplicateConstruct(config.id().to_string()).into(),
                });
            }
        }
        Ok(())
    }

    /// Build every construct in order, stopping at the first failure
    pub fn synthesize(&self) -> Result<Vec<ResourceSpec>, StackError> {
        self.check_unique_ids()?;

        self.constructs
            .iter()
            .map(|config| {
                log::debug!("Building {} '{}'", config.kind(), config.id());
                config.build().map_err(|source| StackError::Build {
                    id: config.id().to_string(),
                    source,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::{LaunchType, SubnetSelection};
    use crate::resource::ResourceKind;

    fn repository(id: &str) -> EcrRepositoryConfig {
        EcrRepositoryConfig::new(id)
            .with_repository_name("api")
            .with_code_path("docker")
            .with_image_tag("v1")
    }

    fn service(id: &str) -> ContainerServiceConfig {
        ContainerServiceConfig::new(id, LaunchType::Fargate)
            .with_vpc("vpc-1")
            .with_subnets(SubnetSelection::ids(["subnet-a"]))
            .with_cluster("main")
            .with_container("api", "api:v1")
    }

    #[test]
    fn synthesize_in_declaration_order() {
        let stack = Stack::new()
            .with_construct(service("Api"))
            .with_construct(repository("Images"));

        let specs = stack.synthesize().unwrap();
        let kinds: Vec<_> = specs.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![ResourceKind::FargateService, ResourceKind::EcrRepository]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let stack = Stack::new()
            .with_construct(repository("Images"))
            .with_construct(service("Images"));

        match stack.synthesize() {
            Err(StackError::Build {
                id,
                source: BuildError::InvalidSpec(InvalidSpecError::DuplicateConstruct(_)),
            }) => assert_eq!(id, "Images"),
            other => panic!("Expected DuplicateConstruct, got {:?}", other),
        }
    }

    #[test]
    fn first_failure_names_the_construct() {
        let mut broken = service("Broken");
        broken.vpc = None;
        let stack = Stack::new()
            .with_construct(repository("Images"))
            .with_construct(broken);

        match stack.synthesize() {
            Err(StackError::Build { id, source }) => {
                assert_eq!(id, "Broken");
                assert!(matches!(source, BuildError::InvalidSpec(_)));
            }
            other => panic!("Expected Build error, got {:?}", other),
        }
    }

    #[test]
    fn parse_stack_json() {
        let stack = Stack::from_json_str(
            r#"{
                "constructs": [
                    {
                        "kind": "ecr_repository",
                        "id": "Images",
                        "repository_name": "api",
                        "code_path": "docker",
                        "image_tag": "v1"
                    },
                    {
                        "kind": "container_service",
                        "id": "Api",
                        "vpc": "vpc-1",
                        "subnets": {"type": "private_with_egress"},
                        "cluster_ref": "main",
                        "container_image": "api:v1",
                        "container_name": "api",
                        "ports": [8080]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(stack.constructs.len(), 2);
        assert_eq!(stack.constructs[0].kind(), "ecr_repository");
        assert_eq!(stack.constructs[1].id(), "Api");
        assert_eq!(stack.synthesize().unwrap().len(), 2);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let result = Stack::from_json_str(
            r#"{"constructs": [{"kind": "ecr_repository", "id": "Images", "colour": "red"}]}"#,
        );
        assert!(matches!(result, Err(StackError::Json(_))));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result = Stack::from_json_str(r#"{"constructs": [{"kind": "lambda", "id": "Fn"}]}"#);
        assert!(matches!(result, Err(StackError::Json(_))));
    }

    #[test]
    fn duplicate_environment_variable_is_rejected() {
        let result = Stack::from_json_str(
            r#"{"constructs": [{
                "kind": "instance",
                "id": "Web",
                "environment": {"STAGE": "dev", "STAGE": "prod"}
            }]}"#,
        );
        assert!(matches!(result, Err(StackError::Json(_))));
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Stack::load(&dir.path().join("stack.json"));
        assert!(matches!(result, Err(StackError::Io { .. })));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stack.json");
        std::fs::write(
            &path,
            r#"{"constructs": [{
                "kind": "ecr_repository",
                "id": "Images",
                "repository_name": "api",
                "code_path": "docker",
                "image_tag": "v1"
            }]}"#,
        )
        .unwrap();

        let stack = Stack::load(&path).unwrap();
        assert_eq!(stack.constructs[0].id(), "Images");
    }
}
