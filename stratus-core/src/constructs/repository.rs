//! ECR repository - A container image repository with cross-account access and image deployments

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use super::Construct;
use crate::error::{BuildResult, InvalidSpecError};
use crate::resource::{ResourceIdentifier, ResourceKind, ResourceSpec, Value};
use crate::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

/// Images kept by the lifecycle rule
pub const MAX_IMAGE_COUNT: i64 = 10;

/// Platform the image asset is built for
pub const IMAGE_PLATFORM: &str = "linux/amd64";

pub const LATEST_TAG: &str = "latest";

const LAMBDA_SERVICE_PRINCIPAL: &str = "lambda.amazonaws.com";

const PUSH_PULL_ACTIONS: [&str; 7] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:BatchGetImage",
    "ecr:CompleteLayerUpload",
    "ecr:GetDownloadUrlForLayer",
    "ecr:InitiateLayerUpload",
    "ecr:PutImage",
    "ecr:UploadLayerPart",
];

const READ_ONLY_ACTIONS: [&str; 12] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:BatchGetImage",
    "ecr:DescribeImageScanFindings",
    "ecr:DescribeImages",
    "ecr:DescribeRepositories",
    "ecr:GetAuthorizationToken",
    "ecr:GetDownloadUrlForLayer",
    "ecr:GetLifecyclePolicy",
    "ecr:GetLifecyclePolicyPreview",
    "ecr:GetRepositoryPolicy",
    "ecr:ListImages",
    "ecr:ListTagsForResource",
];

// Namespaced lowercase components separated by '/'
static REPOSITORY_NAME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z0-9]+(?:[._-][a-z0-9]+)*/)*[a-z0-9]+(?:[._-][a-z0-9]+)*$").ok()
});

static IMAGE_TAG: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9._-]{0,127}$").ok());

/// Validate an ECR repository name (2-256 characters, lowercase components)
pub fn validate_repository_name(name: &str) -> Result<(), String> {
    let length_ok = (2..=256).contains(&name.len());
    match REPOSITORY_NAME.as_ref() {
        Some(re) if length_ok && re.is_match(name) => Ok(()),
        _ => Err(format!("Invalid repository name '{}'", name)),
    }
}

/// Validate an image tag
pub fn validate_image_tag(tag: &str) -> Result<(), String> {
    match IMAGE_TAG.as_ref() {
        Some(re) if re.is_match(tag) => Ok(()),
        _ => Err(format!("Invalid image tag '{}'", tag)),
    }
}

fn repository_name_type() -> AttributeType {
    AttributeType::Custom {
        name: "RepositoryName".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => validate_repository_name(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn image_tag_type() -> AttributeType {
    AttributeType::Custom {
        name: "ImageTag".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) => validate_image_tag(s),
            _ => Err("Expected string".to_string()),
        },
    }
}

/// Returns the schema for ECR Repository
pub fn schema() -> ResourceSchema {
    ResourceSchema::new("ecr_repository")
        .with_description("An ECR repository with cross-account read access and image deployments")
        .attribute(
            AttributeSchema::new("id", types::non_empty_string())
                .required()
                .with_description("Construct id"),
        )
        .attribute(
            AttributeSchema::new("repository_name", repository_name_type())
                .required()
                .with_description("Name of the repository"),
        )
        .attribute(
            AttributeSchema::new("code_path", types::non_empty_string())
                .required()
                .with_description("Docker build context directory"),
        )
        .attribute(
            AttributeSchema::new("image_tag", image_tag_type())
                .required()
                .with_description("Tag the image is deployed under, next to 'latest'"),
        )
        .attribute(
            AttributeSchema::new(
                "workload_accounts",
                AttributeType::List(Box::new(types::aws_account_id())),
            )
            .with_default(Value::List(vec![]))
            .with_description("Accounts granted read-only access"),
        )
        .attribute(
            AttributeSchema::new("function_name_pattern", types::non_empty_string())
                .with_description("Lambda function names in workload accounts allowed to pull"),
        )
        .attribute(
            AttributeSchema::new("build_args", AttributeType::Map(Box::new(AttributeType::String)))
                .with_description("Docker build arguments"),
        )
        .attribute(
            AttributeSchema::new("region", types::non_empty_string())
                .with_description("Region of the Lambda functions; any region when unset"),
        )
}

/// Configuration of an ECR repository
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EcrRepositoryConfig {
    pub id: String,
    pub repository_name: Option<String>,
    pub code_path: Option<PathBuf>,
    pub image_tag: Option<String>,
    pub workload_accounts: Vec<String>,
    pub function_name_pattern: Option<String>,
    pub build_args: BTreeMap<String, String>,
    pub region: Option<String>,
}

impl EcrRepositoryConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_repository_name(mut self, name: impl Into<String>) -> Self {
        self.repository_name = Some(name.into());
        self
    }

    pub fn with_code_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.code_path = Some(path.into());
        self
    }

    pub fn with_image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = Some(tag.into());
        self
    }

    pub fn with_workload_account(mut self, account: impl Into<String>) -> Self {
        self.workload_accounts.push(account.into());
        self
    }

    pub fn with_function_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.function_name_pattern = Some(pattern.into());
        self
    }

    pub fn with_build_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.build_args.insert(name.into(), value.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }
}

fn statement(sid: &str, principals: Value, actions: &[&str]) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("sid".to_string(), Value::from(sid)),
        ("effect".to_string(), Value::from("Allow")),
        ("principals".to_string(), principals),
        ("actions".to_string(), Value::strings(actions.iter().copied())),
    ])
}

impl EcrRepositoryConfig {
    fn policy_statements(&self) -> Vec<Value> {
        let mut statements = vec![Value::Map(statement(
            "AllowPushPull",
            Value::List(vec![Value::map([("account_root", Value::Bool(true))])]),
            &PUSH_PULL_ACTIONS,
        ))];

        if !self.workload_accounts.is_empty() {
            let principals = self
                .workload_accounts
                .iter()
                .map(|account| {
                    let arn = format!("arn:aws:iam::{}:root", account);
                    Value::map([("arn", Value::String(arn))])
                })
                .collect();
            statements.push(Value::Map(statement(
                "PrivateReadOnly",
                Value::List(principals),
                &READ_ONLY_ACTIONS,
            )));
        }

        if let Some(pattern) = super::present(self.function_name_pattern.as_deref()) {
            let region = super::present(self.region.as_deref()).unwrap_or("*");
            let source_arns = self.workload_accounts.iter().map(|account| {
                format!("arn:aws:lambda:{}:{}:function:{}", region, account, pattern)
            });
            let mut lambda = statement(
                "LambdaCrossAccountRead",
                Value::List(vec![Value::map([("service", Value::from(LAMBDA_SERVICE_PRINCIPAL))])]),
                &READ_ONLY_ACTIONS,
            );
            lambda.insert(
                "conditions".to_string(),
                Value::map([(
                    "StringLike",
                    Value::map([("aws:sourceArn", Value::strings(source_arns))]),
                )]),
            );
            statements.push(Value::Map(lambda));
        }

        statements
    }
}

impl Construct for EcrRepositoryConfig {
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
        super::insert_str(&mut attrs, "repository_name", self.repository_name.as_deref());
        super::insert_str(
            &mut attrs,
            "code_path",
            self.code_path.as_deref().and_then(Path::to_str),
        );
        super::insert_str(&mut attrs, "image_tag", self.image_tag.as_deref());
        attrs.insert(
            "workload_accounts".to_string(),
            Value::strings(self.workload_accounts.iter().cloned()),
        );
        super::insert_str(
            &mut attrs,
            "function_name_pattern",
            self.function_name_pattern.as_deref(),
        );
        attrs.insert(
            "build_args".to_string(),
            Value::map(
                self.build_args
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str()))),
            ),
        );
        super::insert_str(&mut attrs, "region", self.region.as_deref());
        attrs
    }

    fn build(&self) -> BuildResult<ResourceSpec> {
        self.validate()?;

        let (Some(repository_name), Some(code_path), Some(image_tag)) = (
            self.repository_name.as_deref(),
            self.code_path.as_deref(),
            self.image_tag.as_deref(),
        ) else {
            return Err(
                InvalidSpecError::invalid(&self.id, "<config>", "incomplete configuration").into(),
            );
        };
        if self.function_name_pattern.is_some() && self.workload_accounts.is_empty() {
            return Err(InvalidSpecError::invalid(
                &self.id,
                "function_name_pattern",
                "a function name pattern needs at least one workload account",
            )
            .into());
        }

        let statements = self.policy_statements();
        let id = ResourceIdentifier::new(&self.id);
        log::debug!(
            "Assembling repository {} ({}, {} policy statements)",
            id,
            repository_name,
            statements.len()
        );

        let deployment = |tag: &str| {
            Value::map([
                ("source", Value::resource_ref("DockerImage", "ImageUri")),
                ("repository", Value::resource_ref("Repository", "RepositoryUri")),
                ("tag", Value::from(tag)),
            ])
        };

        let spec = ResourceSpec::new(ResourceKind::EcrRepository, id)
            .with_parameter(
                "repository",
                Value::map([
                    ("repository_name", Value::from(repository_name)),
                    ("image_scan_on_push", Value::Bool(true)),
                    (
                        "lifecycle_rules",
                        Value::List(vec![Value::map([
                            ("rule_priority", Value::Int(1)),
                            ("description", Value::from("Keep last 10 images")),
                            ("max_image_count", Value::Int(MAX_IMAGE_COUNT)),
                        ])]),
                    ),
                ]),
            )
            .with_parameter("resource_policy", Value::List(statements))
            .with_parameter(
                "image_asset",
                Value::map([
                    ("directory", Value::String(code_path.display().to_string())),
                    ("platform", Value::from(IMAGE_PLATFORM)),
                    (
                        "build_args",
                        Value::map(
                            self.build_args
                                .iter()
                                .map(|(k, v)| (k.clone(), Value::from(v.as_str()))),
                        ),
                    ),
                ]),
            )
            .with_parameter(
                "deployments",
                Value::List(vec![deployment(image_tag), deployment(LATEST_TAG)]),
            )
            .with_output("ImageUri", Value::resource_ref("Repository", "RepositoryUri"))
            .with_output("ImageTag", image_tag)
            .with_output("RepositoryArn", Value::resource_ref("Repository", "Arn"));

        Ok(spec)
    }
}
