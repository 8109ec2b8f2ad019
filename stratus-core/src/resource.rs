//! Resource - Representing assembled resource specifications and their values

use std::collections::BTreeMap;
use std::fmt;

use crate::naming;

/// Attribute value of a resource
///
/// Maps are ordered so that two assemblies of the same inputs compare and
/// serialize identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Provider-assigned attribute of a sub-resource of the same construct
    /// (binding_name, attribute_name), e.g. ("EC2", "PublicIp")
    ResourceRef(String, String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn resource_ref(binding: impl Into<String>, attribute: impl Into<String>) -> Self {
        Value::ResourceRef(binding.into(), attribute.into())
    }

    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::String(s.into())).collect())
    }

    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a nested attribute by a dotted path, e.g. "key_pair.key_name"
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self, |value, segment| value.as_map()?.get(segment))
    }

    /// Convert to JSON; references become `{"ref": "binding.attribute"}`
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::json!(n),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::ResourceRef(binding, attr) => {
                serde_json::json!({ "ref": format!("{}.{}", binding, attr) })
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<u16> for Value {
    fn from(n: u16) -> Self {
        Value::Int(i64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Kind of construct a specification describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Instance,
    AsgCluster,
    Ec2Service,
    FargateService,
    EcrRepository,
}

impl ResourceKind {
    /// CloudFormation type of the primary resource
    pub fn aws_type_name(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "AWS::EC2::Instance",
            ResourceKind::AsgCluster => "AWS::ECS::Cluster",
            ResourceKind::Ec2Service | ResourceKind::FargateService => "AWS::ECS::Service",
            ResourceKind::EcrRepository => "AWS::ECR::Repository",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instance",
            ResourceKind::AsgCluster => "asg_cluster",
            ResourceKind::Ec2Service => "ec2_service",
            ResourceKind::FargateService => "fargate_service",
            ResourceKind::EcrRepository => "ecr_repository",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Construct identifier together with its hyphenated form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceIdentifier {
    pub original: String,
    pub normalized: String,
}

impl ResourceIdentifier {
    pub fn new(original: impl Into<String>) -> Self {
        let original = original.into();
        let normalized = naming::normalize(&original);
        Self {
            original,
            normalized,
        }
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

/// Fully-resolved description of one construct and its named outputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub id: ResourceIdentifier,
    pub parameters: BTreeMap<String, Value>,
    pub outputs: BTreeMap<String, Value>,
}

impl ResourceSpec {
    pub fn new(kind: ResourceKind, id: ResourceIdentifier) -> Self {
        Self {
            kind,
            id,
            parameters: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(name.into(), value.into());
        self
    }

    /// Look up a parameter, descending into nested maps with a dotted path
    pub fn parameter(&self, path: &str) -> Option<&Value> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        let value = self.parameters.get(head)?;
        match rest {
            Some(rest) => value.lookup(rest),
            None => Some(value),
        }
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.outputs.get(name)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "kind": self.kind.name(),
            "id": self.id.original,
            "parameters": serde_json::Value::Object(
                self.parameters.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            "outputs": serde_json::Value::Object(
                self.outputs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_carries_normalized_form() {
        let id = ResourceIdentifier::new("MyServiceName");
        assert_eq!(id.original, "MyServiceName");
        assert_eq!(id.normalized, "my-service-name");
    }

    #[test]
    fn nested_parameter_lookup() {
        let spec = ResourceSpec::new(ResourceKind::Instance, ResourceIdentifier::new("Web"))
            .with_parameter(
                "key_pair",
                Value::map([("key_name", Value::from("WebEC2InstanceSSHKey"))]),
            );

        assert_eq!(
            spec.parameter("key_pair.key_name"),
            Some(&Value::from("WebEC2InstanceSSHKey"))
        );
        assert_eq!(spec.parameter("key_pair.missing"), None);
        assert_eq!(spec.parameter("missing"), None);
    }

    #[test]
    fn resource_ref_to_json() {
        let value = Value::resource_ref("EC2", "PublicIp");
        assert_eq!(value.to_json(), serde_json::json!({ "ref": "EC2.PublicIp" }));
    }

    #[test]
    fn spec_json_is_ordered() {
        let spec = ResourceSpec::new(ResourceKind::EcrRepository, ResourceIdentifier::new("Repo"))
            .with_parameter("zeta", 1i64)
            .with_parameter("alpha", true);

        let json = serde_json::to_string(&spec.to_json()).unwrap();
        let alpha = json.find("alpha").unwrap();
        let zeta = json.find("zeta").unwrap();
        assert!(alpha < zeta);
    }
}
