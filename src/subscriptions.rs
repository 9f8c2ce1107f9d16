use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::arm::{parse_resource, validate_identifier, ArmClient};
use crate::error::ApimError;

/// A subscription granting access to a product or an API.
///
/// Keys are deliberately absent; they are only returned by
/// [`get_subscription_keys`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub subscription_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub scope: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_tracing: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionProperties {
    display_name: Option<String>,
    scope: String,
    state: String,
    owner_id: Option<String>,
    created_date: Option<String>,
    start_date: Option<String>,
    expiration_date: Option<String>,
    state_comment: Option<String>,
    allow_tracing: Option<bool>,
}

fn subscription_from_arm(raw: Value) -> Result<Subscription, ApimError> {
    let resource = parse_resource::<SubscriptionProperties>(raw)?;
    Ok(Subscription {
        subscription_id: resource.name,
        display_name: resource.properties.display_name,
        scope: resource.properties.scope,
        state: resource.properties.state,
        owner_id: resource.properties.owner_id,
        created_date: resource.properties.created_date,
        start_date: resource.properties.start_date,
        expiration_date: resource.properties.expiration_date,
        state_comment: resource.properties.state_comment,
        allow_tracing: resource.properties.allow_tracing,
    })
}

/// Primary/secondary keys of a subscription (from `listSecrets`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionKeys {
    pub primary_key: String,
    pub secondary_key: String,
}

/// Scope of a new subscription: exactly one of a product or an API.
#[derive(Debug, Clone)]
pub enum SubscriptionScope {
    Product(String),
    Api(String),
}

/// Request to create a subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    pub subscription_id: String,
    pub scope: SubscriptionScope,
    pub display_name: String,
}

/// List subscriptions, optionally scoped to one product.
pub async fn list_subscriptions(
    arm: &ArmClient,
    product_id: Option<&str>,
) -> Result<Vec<Subscription>, ApimError> {
    let items = match product_id {
        Some(product_id) => {
            validate_identifier("product_id", product_id)?;
            arm.get_paged(
                &format!("/products/{product_id}/subscriptions"),
                &[],
                "product",
                product_id,
            )
            .await?
        }
        None => {
            arm.get_paged("/subscriptions", &[], "subscription", "collection")
                .await?
        }
    };
    items.into_iter().map(subscription_from_arm).collect()
}

pub async fn get_subscription(arm: &ArmClient, sid: &str) -> Result<Subscription, ApimError> {
    validate_identifier("subscription_id", sid)?;
    let raw = arm
        .get_json(&format!("/subscriptions/{sid}"), &[], "subscription", sid)
        .await?;
    subscription_from_arm(raw)
}

/// Fetch the subscription's primary/secondary keys via `listSecrets`.
pub async fn get_subscription_keys(
    arm: &ArmClient,
    sid: &str,
) -> Result<SubscriptionKeys, ApimError> {
    validate_identifier("subscription_id", sid)?;
    let raw = arm
        .post_json(
            &format!("/subscriptions/{sid}/listSecrets"),
            None,
            "subscription",
            sid,
        )
        .await?;
    serde_json::from_value(raw).map_err(|e| ApimError::Malformed(e.to_string()))
}

pub async fn create_subscription(
    arm: &ArmClient,
    request: &CreateSubscriptionRequest,
) -> Result<Subscription, ApimError> {
    validate_identifier("subscription_id", &request.subscription_id)?;
    if request.display_name.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "display_name",
            reason: "must not be empty".to_string(),
        });
    }

    let scope = match &request.scope {
        SubscriptionScope::Product(product_id) => {
            validate_identifier("product_id", product_id)?;
            arm.resource_id(&format!("/products/{product_id}"))
        }
        SubscriptionScope::Api(api_id) => {
            validate_identifier("api_id", api_id)?;
            arm.resource_id(&format!("/apis/{api_id}"))
        }
    };

    let body = json!({
        "properties": {
            "scope": scope,
            "displayName": request.display_name,
        }
    });

    let raw = arm
        .put_json(
            &format!("/subscriptions/{}", request.subscription_id),
            &body,
            "subscription",
            &request.subscription_id,
        )
        .await?;
    subscription_from_arm(raw)
}

/// Which key of a subscription to regenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Primary,
    Secondary,
}

impl KeyKind {
    pub fn parse(value: &str) -> Result<Self, ApimError> {
        match value {
            "primary" => Ok(KeyKind::Primary),
            "secondary" => Ok(KeyKind::Secondary),
            other => Err(ApimError::InvalidParameter {
                field: "key",
                reason: format!("must be 'primary' or 'secondary', got '{other}'"),
            }),
        }
    }

    fn action(self) -> &'static str {
        match self {
            KeyKind::Primary => "regeneratePrimaryKey",
            KeyKind::Secondary => "regenerateSecondaryKey",
        }
    }
}

/// Regenerate one of the subscription keys, then return the fresh pair.
pub async fn regenerate_key(
    arm: &ArmClient,
    sid: &str,
    kind: KeyKind,
) -> Result<SubscriptionKeys, ApimError> {
    validate_identifier("subscription_id", sid)?;
    arm.post_json(
        &format!("/subscriptions/{sid}/{}", kind.action()),
        None,
        "subscription",
        sid,
    )
    .await?;
    get_subscription_keys(arm, sid).await
}

const MUTABLE_STATES: [&str; 3] = ["active", "suspended", "cancelled"];

/// Move a subscription between the caller-settable states
/// (activate / suspend / cancel).
pub async fn update_subscription_state(
    arm: &ArmClient,
    sid: &str,
    state: &str,
) -> Result<Subscription, ApimError> {
    validate_identifier("subscription_id", sid)?;
    if !MUTABLE_STATES.contains(&state) {
        return Err(ApimError::InvalidParameter {
            field: "state",
            reason: format!(
                "must be one of {}, got '{state}'",
                MUTABLE_STATES.join(", ")
            ),
        });
    }

    let body = json!({ "properties": { "state": state } });
    let raw = arm
        .patch_json(&format!("/subscriptions/{sid}"), &body, "subscription", sid)
        .await?;

    // PATCH may answer 204 without a body; re-read for a uniform return.
    if raw.is_null() {
        get_subscription(arm, sid).await
    } else {
        subscription_from_arm(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscription_is_mapped_without_keys() {
        let raw = json!({
            "name": "starter-sub",
            "properties": {
                "displayName": "Starter subscription",
                "scope": "/subscriptions/s/resourceGroups/r/providers/Microsoft.ApiManagement/service/m/products/starter",
                "state": "active",
                "ownerId": "/users/1",
                "createdDate": "2026-01-12T09:00:00Z",
                "primaryKey": "leaked-if-mapped",
                "secondaryKey": "leaked-if-mapped"
            }
        });
        let sub = subscription_from_arm(raw).unwrap();
        assert_eq!(sub.subscription_id, "starter-sub");
        assert_eq!(sub.state, "active");

        // Keys must never survive DTO mapping, even if ARM returns them.
        let serialized = serde_json::to_string(&sub).unwrap();
        assert!(!serialized.contains("leaked-if-mapped"));
    }

    #[test]
    fn key_kind_parsing() {
        assert_eq!(KeyKind::parse("primary").unwrap(), KeyKind::Primary);
        assert_eq!(KeyKind::parse("secondary").unwrap(), KeyKind::Secondary);
        assert!(KeyKind::parse("both").is_err());
    }

    #[test]
    fn subscription_keys_parse_from_list_secrets_body() {
        let keys: SubscriptionKeys = serde_json::from_value(json!({
            "primaryKey": "pk",
            "secondaryKey": "sk"
        }))
        .unwrap();
        assert_eq!(keys.primary_key, "pk");
        assert_eq!(keys.secondary_key, "sk");
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
    async fn unknown_target_state_is_rejected_locally() {
        let err = update_subscription_state(&offline_arm(), "starter-sub", "expired")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "state", .. }
        ));
    }
}
