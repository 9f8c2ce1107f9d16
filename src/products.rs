use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::apis::{api_from_arm, Api};
use crate::arm::{parse_resource, validate_identifier, ArmClient};
use crate::error::ApimError;

/// A product bundling APIs for publication to developers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_id: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscriptions_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terms: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProductProperties {
    display_name: String,
    description: Option<String>,
    state: Option<String>,
    subscription_required: Option<bool>,
    approval_required: Option<bool>,
    subscriptions_limit: Option<u32>,
    terms: Option<String>,
}

fn product_from_arm(raw: Value) -> Result<Product, ApimError> {
    let resource = parse_resource::<ProductProperties>(raw)?;
    Ok(Product {
        product_id: resource.name,
        display_name: resource.properties.display_name,
        description: resource.properties.description,
        state: resource.properties.state,
        subscription_required: resource.properties.subscription_required,
        approval_required: resource.properties.approval_required,
        subscriptions_limit: resource.properties.subscriptions_limit,
        terms: resource.properties.terms,
    })
}

/// Request to create or update a product.
#[derive(Debug, Clone)]
pub struct ProductRequest {
    pub product_id: String,
    pub display_name: String,
    pub description: Option<String>,
    /// `published` or `notPublished` (default).
    pub state: Option<String>,
    pub subscription_required: bool,
    pub approval_required: Option<bool>,
    pub subscriptions_limit: Option<u32>,
    pub terms: Option<String>,
}

pub async fn list_products(arm: &ArmClient) -> Result<Vec<Product>, ApimError> {
    let items = arm
        .get_paged("/products", &[], "product", "collection")
        .await?;
    items.into_iter().map(product_from_arm).collect()
}

pub async fn get_product(arm: &ArmClient, product_id: &str) -> Result<Product, ApimError> {
    validate_identifier("product_id", product_id)?;
    let raw = arm
        .get_json(&format!("/products/{product_id}"), &[], "product", product_id)
        .await?;
    product_from_arm(raw)
}

pub async fn create_or_update_product(
    arm: &ArmClient,
    request: &ProductRequest,
) -> Result<Product, ApimError> {
    validate_identifier("product_id", &request.product_id)?;
    if request.display_name.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "display_name",
            reason: "must not be empty".to_string(),
        });
    }
    if let Some(state) = &request.state {
        if state != "published" && state != "notPublished" {
            return Err(ApimError::InvalidParameter {
                field: "state",
                reason: format!("must be 'published' or 'notPublished', got '{state}'"),
            });
        }
    }
    // ARM rejects approvalRequired on products without subscriptions.
    if request.approval_required == Some(true) && !request.subscription_required {
        return Err(ApimError::InvalidParameter {
            field: "approval_required",
            reason: "approval requires subscription_required to be true".to_string(),
        });
    }

    let mut properties = serde_json::Map::new();
    properties.insert("displayName".to_string(), json!(request.display_name));
    properties.insert(
        "subscriptionRequired".to_string(),
        json!(request.subscription_required),
    );
    properties.insert(
        "state".to_string(),
        json!(request.state.as_deref().unwrap_or("notPublished")),
    );
    if let Some(description) = &request.description {
        properties.insert("description".to_string(), json!(description));
    }
    if let Some(approval) = request.approval_required {
        properties.insert("approvalRequired".to_string(), json!(approval));
    }
    if let Some(limit) = request.subscriptions_limit {
        properties.insert("subscriptionsLimit".to_string(), json!(limit));
    }
    if let Some(terms) = &request.terms {
        properties.insert("terms".to_string(), json!(terms));
    }

    let raw = arm
        .put_json(
            &format!("/products/{}", request.product_id),
            &json!({ "properties": properties }),
            "product",
            &request.product_id,
        )
        .await?;
    product_from_arm(raw)
}

/// Attach an API to a product so product subscriptions cover it.
pub async fn add_api_to_product(
    arm: &ArmClient,
    product_id: &str,
    api_id: &str,
) -> Result<Api, ApimError> {
    validate_identifier("product_id", product_id)?;
    validate_identifier("api_id", api_id)?;
    let raw = arm
        .put_json(
            &format!("/products/{product_id}/apis/{api_id}"),
            &json!({}),
            "product",
            product_id,
        )
        .await?;
    api_from_arm(raw)
}

pub async fn list_product_apis(arm: &ArmClient, product_id: &str) -> Result<Vec<Api>, ApimError> {
    validate_identifier("product_id", product_id)?;
    let items = arm
        .get_paged(
            &format!("/products/{product_id}/apis"),
            &[],
            "product",
            product_id,
        )
        .await?;
    items.into_iter().map(api_from_arm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn product_is_mapped_from_arm_envelope() {
        let raw = json!({
            "name": "starter",
            "properties": {
                "displayName": "Starter",
                "description": "Five calls/minute.",
                "state": "published",
                "subscriptionRequired": true,
                "approvalRequired": false,
                "subscriptionsLimit": 1
            }
        });
        let product = product_from_arm(raw).unwrap();
        assert_eq!(product.product_id, "starter");
        assert_eq!(product.state.as_deref(), Some("published"));
        assert_eq!(product.subscriptions_limit, Some(1));
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

    #[tokio::test]
    async fn invalid_state_is_rejected_locally() {
        let request = ProductRequest {
            product_id: "starter".into(),
            display_name: "Starter".into(),
            description: None,
            state: Some("draft".into()),
            subscription_required: true,
            approval_required: None,
            subscriptions_limit: None,
            terms: None,
        };
        let err = create_or_update_product(&offline_arm(), &request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "state", .. }
        ));
    }

    #[tokio::test]
    async fn approval_without_subscription_is_rejected() {
        let request = ProductRequest {
            product_id: "open".into(),
            display_name: "Open".into(),
            description: None,
            state: None,
            subscription_required: false,
            approval_required: Some(true),
            subscriptions_limit: None,
            terms: None,
        };
        let err = create_or_update_product(&offline_arm(), &request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "approval_required", .. }
        ));
    }
}
