//! Naming conventions for derived resource names
//!
//! Construct ids are written in CamelCase (e.g., `MyServiceName`). Derived
//! names such as task families and port-binding names use a hyphenated
//! lowercase form (e.g., `my-service-name`).

/// Separator inserted before interior uppercase characters
const SEPARATOR: char = '-';

/// Convert CamelCase to hyphenated lowercase
/// e.g., "MyServiceName" -> "my-service-name"
///
/// Every interior ASCII uppercase character gets its own separator, so
/// acronym runs are not collapsed: "EC2Service" -> "e-c2-service".
pub fn normalize(id: &str) -> String {
    let mut result = String::with_capacity(id.len() + 4);
    for (i, c) in id.chars().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            result.push(SEPARATOR);
        }
        result.push(c);
    }
    result.to_lowercase()
}

/// Name of the port binding at `index` when a container exposes `count` ports
pub fn port_binding_name(normalized_id: &str, index: usize, count: usize) -> String {
    if count == 1 {
        normalized_id.to_string()
    } else {
        format!("{}_port{}", normalized_id, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("MyServiceName"), "my-service-name");
        assert_eq!(normalize("Service"), "service");
        assert_eq!(normalize("service"), "service");
        assert_eq!(normalize("apiGateway"), "api-gateway");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn acronym_runs_are_not_collapsed() {
        assert_eq!(normalize("EC2Service"), "e-c2-service");
        assert_eq!(normalize("ECR"), "e-c-r");
    }

    #[test]
    fn normalize_is_deterministic() {
        let first = normalize("WebFrontendService");
        let second = normalize("WebFrontendService");
        assert_eq!(first, second);
    }

    #[test]
    fn normalize_does_not_split_digits_or_symbols() {
        assert_eq!(normalize("Web2Api_v1"), "web2-api_v1");
        assert_eq!(normalize("already-hyphenated"), "already-hyphenated");
    }

    #[test]
    fn test_port_binding_name() {
        assert_eq!(port_binding_name("web", 0, 1), "web");
        assert_eq!(port_binding_name("web", 0, 2), "web_port0");
        assert_eq!(port_binding_name("web", 1, 2), "web_port1");
    }
}
