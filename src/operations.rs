use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::arm::{parse_resource, validate_identifier, ArmClient};
use crate::error::ApimError;

/// One operation (route) of an API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiOperation {
    pub operation_id: String,
    pub display_name: String,
    pub method: String,
    pub url_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `{param}` placeholders of the URL template, passed through as ARM
    /// returns them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_parameters: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationProperties {
    display_name: String,
    method: String,
    url_template: String,
    description: Option<String>,
    template_parameters: Option<Value>,
}

fn operation_from_arm(raw: Value) -> Result<ApiOperation, ApimError> {
    let resource = parse_resource::<OperationProperties>(raw)?;
    Ok(ApiOperation {
        operation_id: resource.name,
        display_name: resource.properties.display_name,
        method: resource.properties.method,
        url_template: resource.properties.url_template,
        description: resource.properties.description,
        template_parameters: resource.properties.template_parameters,
    })
}

const HTTP_METHODS: [&str; 8] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE",
];

/// Request to create or update an operation.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    pub operation_id: String,
    pub display_name: String,
    pub method: String,
    pub url_template: String,
    pub description: Option<String>,
    pub template_parameters: Option<Value>,
}

pub async fn list_operations(
    arm: &ArmClient,
    api_id: &str,
) -> Result<Vec<ApiOperation>, ApimError> {
    validate_identifier("api_id", api_id)?;
    let items = arm
        .get_paged(&format!("/apis/{api_id}/operations"), &[], "api", api_id)
        .await?;
    items.into_iter().map(operation_from_arm).collect()
}

pub async fn get_operation(
    arm: &ArmClient,
    api_id: &str,
    operation_id: &str,
) -> Result<ApiOperation, ApimError> {
    validate_identifier("api_id", api_id)?;
    validate_identifier("operation_id", operation_id)?;
    let raw = arm
        .get_json(
            &format!("/apis/{api_id}/operations/{operation_id}"),
            &[],
            "operation",
            operation_id,
        )
        .await?;
    operation_from_arm(raw)
}

pub async fn create_or_update_operation(
    arm: &ArmClient,
    api_id: &str,
    request: &OperationRequest,
) -> Result<ApiOperation, ApimError> {
    validate_identifier("api_id", api_id)?;
    validate_identifier("operation_id", &request.operation_id)?;

    let method = request.method.to_ascii_uppercase();
    if !HTTP_METHODS.contains(&method.as_str()) {
        return Err(ApimError::InvalidParameter {
            field: "method",
            reason: format!("'{}' is not an HTTP method", request.method),
        });
    }
    if !request.url_template.starts_with('/') {
        return Err(ApimError::InvalidParameter {
            field: "url_template",
            reason: "must start with '/'".to_string(),
        });
    }
    if request.display_name.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "display_name",
            reason: "must not be empty".to_string(),
        });
    }

    let mut properties = serde_json::Map::new();
    properties.insert("displayName".to_string(), json!(request.display_name));
    properties.insert("method".to_string(), json!(method));
    properties.insert("urlTemplate".to_string(), json!(request.url_template));
    if let Some(description) = &request.description {
        properties.insert("description".to_string(), json!(description));
    }
    if let Some(params) = &request.template_parameters {
        properties.insert("templateParameters".to_string(), params.clone());
    }

    let raw = arm
        .put_json(
            &format!("/apis/{api_id}/operations/{}", request.operation_id),
            &json!({ "properties": properties }),
            "operation",
            &request.operation_id,
        )
        .await?;
    operation_from_arm(raw)
}

pub async fn delete_operation(
    arm: &ArmClient,
    api_id: &str,
    operation_id: &str,
) -> Result<(), ApimError> {
    validate_identifier("api_id", api_id)?;
    validate_identifier("operation_id", operation_id)?;
    arm.delete(
        &format!("/apis/{api_id}/operations/{operation_id}"),
        &[],
        "operation",
        operation_id,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_is_mapped_from_arm_envelope() {
        let raw = json!({
            "name": "get-order",
            "properties": {
                "displayName": "Get order",
                "method": "GET",
                "urlTemplate": "/orders/{orderId}",
                "templateParameters": [
                    { "name": "orderId", "type": "string", "required": true }
                ]
            }
        });
        let op = operation_from_arm(raw).unwrap();
        assert_eq!(op.operation_id, "get-order");
        assert_eq!(op.method, "GET");
        assert_eq!(op.url_template, "/orders/{orderId}");
        assert!(op.template_parameters.is_some());
    }

    fn offline_arm() -> ArmClient {
        ArmClient::new(&crate::config::Config {
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
            service_name: "svc".into(),
            service_principal: None,
            arm_endpoint: "http://127.0.0.1:0".into(),
        })
        .unwrap()
    }

    fn request(method: &str, template: &str) -> OperationRequest {
        OperationRequest {
            operation_id: "get-order".into(),
            display_name: "Get order".into(),
            method: method.into(),
            url_template: template.into(),
            description: None,
            template_parameters: None,
        }
    }

    #[tokio::test]
    async fn bogus_method_is_rejected_locally() {
        let err = create_or_update_operation(&offline_arm(), "orders", &request("FETCH", "/x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "method", .. }
        ));
    }

    #[tokio::test]
    async fn relative_url_template_is_rejected_locally() {
        let err = create_or_update_operation(&offline_arm(), "orders", &request("get", "orders"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "url_template", .. }
        ));
    }
}
