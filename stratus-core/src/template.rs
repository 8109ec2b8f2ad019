//! Template - Render specifications as a CloudFormation-shaped JSON document

use std::collections::BTreeSet;

use heck::ToUpperCamelCase;
use serde_json::{Map, json};

use crate::resource::{ResourceSpec, Value};

/// Keys whose entries are caller-chosen names and keep their spelling
const VERBATIM_KEYS: [&str; 3] = ["build_args", "environment", "secrets"];

const CONDITIONS_KEY: &str = "conditions";

/// Render specifications into `{"Resources": ..., "Outputs": ...}`
///
/// Property keys become UpperCamelCase. A reference to a sub-resource renders
/// as `Fn::GetAtt` on the logical id `<construct id><binding>`. Sub-resources
/// are not expanded into entries of their own: each construct entry lists the
/// logical ids it references under `Metadata.SubResources`, and a deployment
/// tool that expands the construct is expected to create them.
pub fn render(specs: &[ResourceSpec]) -> serde_json::Value {
    let mut resources = Map::new();
    let mut outputs = Map::new();

    for spec in specs {
        let logical_id = spec.id.original.as_str();
        let properties: Map<String, serde_json::Value> = spec
            .parameters
            .iter()
            .map(|(key, value)| {
                (
                    key.to_upper_camel_case(),
                    render_value(logical_id, value, is_verbatim(key)),
                )
            })
            .collect();

        let mut resource = json!({
            "Type": spec.kind.aws_type_name(),
            "Properties": properties,
        });
        let referenced = sub_resources(spec);
        if !referenced.is_empty() {
            resource["Metadata"] = json!({ "SubResources": referenced });
        }
        resources.insert(logical_id.to_string(), resource);

        for (name, value) in &spec.outputs {
            outputs.insert(
                format!("{}{}", logical_id, name),
                json!({ "Value": render_value(logical_id, value, false) }),
            );
        }
    }

    json!({
        "Resources": resources,
        "Outputs": outputs,
    })
}

/// Pretty-printed template with a trailing newline
pub fn render_string(specs: &[ResourceSpec]) -> Result<String, serde_json::Error> {
    let mut out = serde_json::to_string_pretty(&render(specs))?;
    out.push('\n');
    Ok(out)
}

/// Logical ids of every sub-resource referenced by `spec`, sorted
fn sub_resources(spec: &ResourceSpec) -> BTreeSet<String> {
    let mut bindings = BTreeSet::new();
    for value in spec.parameters.values().chain(spec.outputs.values()) {
        collect_bindings(value, &mut bindings);
    }
    bindings
        .into_iter()
        .map(|binding| format!("{}{}", spec.id.original, binding))
        .collect()
}

fn collect_bindings<'a>(value: &'a Value, bindings: &mut BTreeSet<&'a str>) {
    match value {
        Value::ResourceRef(binding, _) => {
            bindings.insert(binding.as_str());
        }
        Value::List(items) => items.iter().for_each(|item| collect_bindings(item, bindings)),
        Value::Map(map) => map.values().for_each(|v| collect_bindings(v, bindings)),
        _ => {}
    }
}

fn is_verbatim(key: &str) -> bool {
    VERBATIM_KEYS.contains(&key)
}

fn render_value(logical_id: &str, value: &Value, verbatim_keys: bool) -> serde_json::Value {
    match value {
        Value::ResourceRef(binding, attribute) => {
            json!({ "Fn::GetAtt": [format!("{}{}", logical_id, binding), attribute] })
        }
        Value::List(items) => serde_json::Value::Array(
            items
                .iter()
                .map(|item| render_value(logical_id, item, false))
                .collect(),
        ),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(key, v)| {
                    if verbatim_keys {
                        return (key.clone(), render_value(logical_id, v, false));
                    }
                    let rendered = if key == CONDITIONS_KEY {
                        // Condition operators and context keys are spelled by IAM
                        v.to_json()
                    } else {
                        render_value(logical_id, v, is_verbatim(key))
                    };
                    (key.to_upper_camel_case(), rendered)
                })
                .collect(),
        ),
        other => other.to_json(),
    }
}
