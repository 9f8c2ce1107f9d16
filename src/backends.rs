use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::arm::{parse_resource, validate_identifier, ArmClient};
use crate::error::ApimError;

/// A backend service registered in APIM.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub backend_id: String,
    pub url: String,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub validate_certificate_chain: bool,
    pub validate_certificate_name: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TlsProperties {
    #[serde(default)]
    validate_certificate_chain: Option<bool>,
    #[serde(default)]
    validate_certificate_name: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BackendProperties {
    url: String,
    protocol: String,
    title: Option<String>,
    description: Option<String>,
    #[serde(default)]
    tls: Option<TlsProperties>,
}

fn backend_from_arm(raw: serde_json::Value) -> Result<Backend, ApimError> {
    let resource = parse_resource::<BackendProperties>(raw)?;
    let tls = resource.properties.tls.unwrap_or_default();
    Ok(Backend {
        backend_id: resource.name,
        url: resource.properties.url,
        protocol: resource.properties.protocol,
        title: resource.properties.title,
        description: resource.properties.description,
        validate_certificate_chain: tls.validate_certificate_chain.unwrap_or(true),
        validate_certificate_name: tls.validate_certificate_name.unwrap_or(true),
    })
}

/// Request to create or update a backend.
#[derive(Debug, Clone)]
pub struct BackendRequest {
    pub backend_id: String,
    pub url: String,
    /// `http` for REST/gRPC backends, `soap` for SOAP pass-through.
    pub protocol: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub validate_certificate_chain: bool,
    pub validate_certificate_name: bool,
}

pub async fn list_backends(arm: &ArmClient) -> Result<Vec<Backend>, ApimError> {
    let items = arm
        .get_paged("/backends", &[], "backend", "collection")
        .await?;
    items.into_iter().map(backend_from_arm).collect()
}

pub async fn get_backend(arm: &ArmClient, backend_id: &str) -> Result<Backend, ApimError> {
    validate_identifier("backend_id", backend_id)?;
    let raw = arm
        .get_json(&format!("/backends/{backend_id}"), &[], "backend", backend_id)
        .await?;
    backend_from_arm(raw)
}

pub async fn create_or_update_backend(
    arm: &ArmClient,
    request: &BackendRequest,
) -> Result<Backend, ApimError> {
    validate_identifier("backend_id", &request.backend_id)?;
    if request.url.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "url",
            reason: "must not be empty".to_string(),
        });
    }
    if request.protocol != "http" && request.protocol != "soap" {
        return Err(ApimError::InvalidParameter {
            field: "protocol",
            reason: format!("must be 'http' or 'soap', got '{}'", request.protocol),
        });
    }

    let body = json!({
        "properties": {
            "url": request.url,
            "protocol": request.protocol,
            "title": request.title,
            "description": request.description,
            "tls": {
                "validateCertificateChain": request.validate_certificate_chain,
                "validateCertificateName": request.validate_certificate_name,
            }
        }
    });

    let raw = arm
        .put_json(
            &format!("/backends/{}", request.backend_id),
            &body,
            "backend",
            &request.backend_id,
        )
        .await?;
    backend_from_arm(raw)
}

pub async fn delete_backend(arm: &ArmClient, backend_id: &str) -> Result<(), ApimError> {
    validate_identifier("backend_id", backend_id)?;
    arm.delete(&format!("/backends/{backend_id}"), &[], "backend", backend_id)
        .await
}

/// The API-scoped policy document that routes gateway traffic to a backend.
pub fn backend_policy_xml(backend_id: &str) -> String {
    format!(
        "<policies>\n  <inbound>\n    <base />\n    <set-backend-service backend-id=\"{backend_id}\" />\n  </inbound>\n  <backend>\n    <base />\n  </backend>\n  <outbound>\n    <base />\n  </outbound>\n  <on-error>\n    <base />\n  </on-error>\n</policies>"
    )
}

/// Attach the backend-routing policy to an API (`rawxml` format).
pub async fn apply_backend_policy(
    arm: &ArmClient,
    api_id: &str,
    backend_id: &str,
) -> Result<(), ApimError> {
    validate_identifier("api_id", api_id)?;
    validate_identifier("backend_id", backend_id)?;

    let body = json!({
        "properties": {
            "format": "rawxml",
            "value": backend_policy_xml(backend_id),
        }
    });

    arm.put_json(
        &format!("/apis/{api_id}/policies/policy"),
        &body,
        "api policy",
        api_id,
    )
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backend_is_mapped_from_arm_envelope() {
        let raw = json!({
            "name": "orders-backend",
            "properties": {
                "url": "https://orders.internal.contoso.example",
                "protocol": "http",
                "title": "Orders",
                "tls": { "validateCertificateChain": false }
            }
        });
        let backend = backend_from_arm(raw).unwrap();
        assert_eq!(backend.backend_id, "orders-backend");
        assert_eq!(backend.protocol, "http");
        assert!(!backend.validate_certificate_chain);
        // Unspecified flags default to strict validation.
        assert!(backend.validate_certificate_name);
    }

    #[test]
    fn policy_xml_embeds_backend_id() {
        let xml = backend_policy_xml("orders-backend");
        assert!(xml.contains("<set-backend-service backend-id=\"orders-backend\" />"));
        assert!(xml.starts_with("<policies>"));
        assert!(xml.ends_with("</policies>"));
    }

    #[tokio::test]
    async fn bad_protocol_fails_before_any_remote_call() {
        let arm = crate::arm::ArmClient::new(&crate::config::Config {
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
            service_name: "svc".into(),
            service_principal: None,
            arm_endpoint: "http://127.0.0.1:0".into(),
        })
        .unwrap();

        let request = BackendRequest {
            backend_id: "b1".into(),
            url: "https://example.test".into(),
            protocol: "grpc".into(),
            title: None,
            description: None,
            validate_certificate_chain: true,
            validate_certificate_name: true,
        };
        let err = create_or_update_backend(&arm, &request).await.unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "protocol", .. }
        ));
    }
}
