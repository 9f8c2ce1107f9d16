//! Best-effort metadata extraction from API contracts.
//!
//! APIM does the real parsing server-side during import; this module only
//! scans the contract text for enough metadata to default display names and
//! pick the right ARM import format. It is deliberately not a YAML, JSON or
//! Protobuf parser.

/// ARM import format for an OpenAPI/Swagger contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractFormat {
    /// OpenAPI 3.x YAML (`format: "openapi"`).
    OpenApiYaml,
    /// OpenAPI 3.x JSON (`format: "openapi+json"`).
    OpenApiJson,
    /// Swagger 2.0 JSON (`format: "swagger-json"`).
    SwaggerJson,
}

impl ContractFormat {
    /// The `properties.format` value ARM expects for this contract flavour.
    pub fn arm_format(self) -> &'static str {
        match self {
            ContractFormat::OpenApiYaml => "openapi",
            ContractFormat::OpenApiJson => "openapi+json",
            ContractFormat::SwaggerJson => "swagger-json",
        }
    }
}

/// Metadata scanned out of an OpenAPI/Swagger contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractMetadata {
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// Metadata scanned out of a Protobuf source file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtoMetadata {
    pub package: Option<String>,
    pub services: Vec<String>,
}

/// Decide which ARM import format fits the contract text.
///
/// A leading `{` means JSON; JSON with a top-level `"swagger"` key is treated
/// as Swagger 2.0. Everything else is assumed to be OpenAPI YAML.
pub fn detect_contract_format(contract: &str) -> ContractFormat {
    let trimmed = contract.trim_start();
    if trimmed.starts_with('{') {
        if json_scalar(contract, "swagger").is_some() {
            ContractFormat::SwaggerJson
        } else {
            ContractFormat::OpenApiJson
        }
    } else {
        ContractFormat::OpenApiYaml
    }
}

/// Scan an OpenAPI/Swagger contract for `info` metadata.
pub fn scan_openapi_metadata(contract: &str) -> ContractMetadata {
    match detect_contract_format(contract) {
        ContractFormat::OpenApiYaml => ContractMetadata {
            title: yaml_scalar(contract, "title"),
            version: yaml_info_version(contract),
            description: yaml_scalar(contract, "description"),
        },
        _ => ContractMetadata {
            title: json_scalar(contract, "title"),
            version: json_scalar(contract, "version"),
            description: json_scalar(contract, "description"),
        },
    }
}

/// Scan a Protobuf source for its package name and service declarations.
pub fn scan_proto_metadata(proto: &str) -> ProtoMetadata {
    let mut meta = ProtoMetadata::default();

    for raw_line in proto.lines() {
        let line = match raw_line.find("//") {
            Some(idx) => &raw_line[..idx],
            None => raw_line,
        }
        .trim();

        if let Some(rest) = line.strip_prefix("package ") {
            if let Some(name) = rest.split(';').next() {
                let name = name.trim();
                if !name.is_empty() && meta.package.is_none() {
                    meta.package = Some(name.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("service ") {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                meta.services.push(name);
            }
        }
    }

    meta
}

/// First `key: value` scalar in a YAML document, searching any indentation.
fn yaml_scalar(text: &str, key: &str) -> Option<String> {
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix(key) {
            if let Some(value) = rest.strip_prefix(':') {
                let value = strip_quotes(value.trim());
                if !value.is_empty() && !value.starts_with('#') {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// The `version:` under `info:` specifically, so the document-level
/// `openapi: 3.0.x` line is not mistaken for the API version.
fn yaml_info_version(text: &str) -> Option<String> {
    let mut in_info = false;
    for line in text.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if indent == 0 {
            in_info = trimmed.starts_with("info:");
            continue;
        }
        if in_info {
            if let Some(rest) = trimmed.strip_prefix("version:") {
                let value = strip_quotes(rest.trim());
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// First `"key": "value"` string in a JSON document, found by text scanning.
fn json_scalar(text: &str, key: &str) -> Option<String> {
    let needle = format!("\"{key}\"");
    let start = text.find(&needle)? + needle.len();
    let rest = text[start..].trim_start();
    let rest = rest.strip_prefix(':')?.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    let value = &rest[..end];
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn strip_quotes(value: &str) -> &str {
    value
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PETSTORE_YAML: &str = "\
openapi: 3.0.3
info:
  title: Petstore API
  description: 'Manage pets.'
  version: \"1.2.0\"
paths:
  /pets:
    get:
      summary: List pets
";

    const PETSTORE_JSON: &str = r#"{
  "openapi": "3.0.3",
  "info": {
    "title": "Petstore API",
    "version": "1.2.0"
  },
  "paths": {}
}"#;

    const SWAGGER_JSON: &str = r#"{
  "swagger": "2.0",
  "info": { "title": "Legacy API", "version": "0.9" }
}"#;

    const ORDERS_PROTO: &str = "\
syntax = \"proto3\";

package contoso.orders.v1; // order placement

// The order intake surface.
service OrderIntake {
  rpc Place (PlaceRequest) returns (PlaceReply);
}

service OrderStatus {
  rpc Check (CheckRequest) returns (CheckReply);
}
";

    #[test]
    fn yaml_contract_is_detected_and_scanned() {
        assert_eq!(
            detect_contract_format(PETSTORE_YAML),
            ContractFormat::OpenApiYaml
        );
        let meta = scan_openapi_metadata(PETSTORE_YAML);
        assert_eq!(meta.title.as_deref(), Some("Petstore API"));
        assert_eq!(meta.version.as_deref(), Some("1.2.0"));
        assert_eq!(meta.description.as_deref(), Some("Manage pets."));
    }

    #[test]
    fn json_contract_is_detected_and_scanned() {
        assert_eq!(
            detect_contract_format(PETSTORE_JSON),
            ContractFormat::OpenApiJson
        );
        let meta = scan_openapi_metadata(PETSTORE_JSON);
        assert_eq!(meta.title.as_deref(), Some("Petstore API"));
        assert_eq!(meta.version.as_deref(), Some("1.2.0"));
    }

    #[test]
    fn swagger_two_is_distinguished_from_openapi_json() {
        assert_eq!(
            detect_contract_format(SWAGGER_JSON),
            ContractFormat::SwaggerJson
        );
        assert_eq!(ContractFormat::SwaggerJson.arm_format(), "swagger-json");
    }

    #[test]
    fn info_version_is_not_confused_with_openapi_version() {
        // No quotes around the version here; the openapi: line comes first.
        let contract = "openapi: 3.0.0\ninfo:\n  version: 2.5.1\n  title: X\n";
        let meta = scan_openapi_metadata(contract);
        assert_eq!(meta.version.as_deref(), Some("2.5.1"));
    }

    #[test]
    fn missing_metadata_yields_none() {
        let meta = scan_openapi_metadata("paths: {}\n");
        assert_eq!(meta, ContractMetadata::default());
    }

    #[test]
    fn proto_package_and_services_are_scanned() {
        let meta = scan_proto_metadata(ORDERS_PROTO);
        assert_eq!(meta.package.as_deref(), Some("contoso.orders.v1"));
        assert_eq!(meta.services, vec!["OrderIntake", "OrderStatus"]);
    }

    #[test]
    fn proto_comments_do_not_produce_services() {
        let proto = "// service NotReal {\npackage p;\nservice Real {}\n";
        let meta = scan_proto_metadata(proto);
        assert_eq!(meta.services, vec!["Real"]);
        assert_eq!(meta.package.as_deref(), Some("p"));
    }
}
