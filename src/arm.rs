use azure_core::credentials::{Secret, TokenCredential};
use azure_identity::{ClientSecretCredential, DeveloperToolsCredential};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::ApimError;
use crate::retry::{retry_with_backoff, RetryConfig};

/// ARM API version used for every `Microsoft.ApiManagement` request.
pub const API_VERSION: &str = "2024-05-01";

/// Maximum number of `nextLink` pages followed per list call.
const MAX_PAGES: usize = 50;

/// Client for the Azure Resource Manager surface of one API Management service.
///
/// Every request is scoped under
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/Microsoft.ApiManagement/service/{name}`
/// and retried with exponential backoff when the failure is transient
/// (HTTP 5xx, 429, transport errors). 4xx responses are terminal.
pub struct ArmClient {
    http: reqwest::Client,
    credential: Arc<dyn TokenCredential>,
    endpoint: String,
    scope: String,
    service_path: String,
    retry: RetryConfig,
}

/// Generic ARM resource envelope: `{"id": ..., "name": ..., "properties": {...}}`.
#[derive(Debug, Deserialize)]
pub struct ArmResource<P> {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub properties: P,
}

#[derive(Debug, Deserialize)]
struct ArmPage {
    #[serde(default)]
    value: Vec<Value>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

/// Deserialize an ARM resource object into a typed envelope.
pub fn parse_resource<P: DeserializeOwned>(value: Value) -> Result<ArmResource<P>, ApimError> {
    serde_json::from_value(value).map_err(|e| ApimError::Malformed(e.to_string()))
}

/// Validate a caller-supplied ARM path segment before it reaches the wire.
///
/// APIM entity identifiers are 1–80 characters of letters, digits and
/// hyphens, starting with a letter or digit and not ending with a hyphen.
/// Rejecting locally gives the MCP client a precise message instead of an
/// opaque ARM 400.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), ApimError> {
    if value.is_empty() {
        return Err(ApimError::InvalidParameter {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.len() > 80 {
        return Err(ApimError::InvalidParameter {
            field,
            reason: format!("must be at most 80 characters, got {}", value.len()),
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(ApimError::InvalidParameter {
            field,
            reason: "may only contain letters, digits and hyphens".to_string(),
        });
    }
    if value.starts_with('-') || value.ends_with('-') {
        return Err(ApimError::InvalidParameter {
            field,
            reason: "must not start or end with a hyphen".to_string(),
        });
    }
    Ok(())
}

/// Build the credential chain selected by the configuration.
fn build_credential(config: &Config) -> Result<Arc<dyn TokenCredential>, ApimError> {
    match &config.service_principal {
        Some(sp) => {
            let cred: Arc<dyn TokenCredential> = ClientSecretCredential::new(
                &sp.tenant_id,
                sp.client_id.clone(),
                Secret::from(sp.client_secret.clone()),
                None,
            )
            .map_err(ApimError::Credential)?;
            Ok(cred)
        }
        None => {
            let cred: Arc<dyn TokenCredential> =
                DeveloperToolsCredential::new(None).map_err(ApimError::Credential)?;
            Ok(cred)
        }
    }
}

impl ArmClient {
    pub fn new(config: &Config) -> Result<Self, ApimError> {
        let credential = build_credential(config)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        let service_path = format!(
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.ApiManagement/service/{}",
            config.subscription_id, config.resource_group, config.service_name
        );

        Ok(Self {
            http,
            credential,
            scope: format!("{}/.default", config.arm_endpoint),
            endpoint: config.arm_endpoint.clone(),
            service_path,
            retry: RetryConfig::default(),
        })
    }

    /// Full ARM resource id for a service-scoped suffix, e.g.
    /// `/subscriptions/…/service/{name}/apiVersionSets/{id}`.
    pub fn resource_id(&self, suffix: &str) -> String {
        format!("{}{}", self.service_path, suffix)
    }

    async fn bearer_token(&self) -> Result<String, ApimError> {
        let token = self
            .credential
            .get_token(&[&self.scope], None)
            .await
            .map_err(ApimError::Credential)?;
        Ok(token.token.secret().to_string())
    }

    /// Issue one request against a fully-formed URL and map the response.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        kind: &'static str,
        name: &str,
    ) -> Result<Value, ApimError> {
        let token = self.bearer_token().await?;

        let mut request = self.http.request(method, url).bearer_auth(token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApimError::from_arm_response(
                status.as_u16(),
                &text,
                kind,
                name,
            ));
        }

        if text.trim().is_empty() {
            // 202/204 responses (deletes, key regeneration) carry no body.
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApimError::Malformed(format!("invalid JSON from ARM: {e}")))
    }

    /// Issue a service-scoped request with the standard retry policy.
    async fn send(
        &self,
        method: Method,
        suffix: &str,
        query: &[(String, String)],
        body: Option<&Value>,
        kind: &'static str,
        name: &str,
    ) -> Result<Value, ApimError> {
        let url = format!("{}{}{}", self.endpoint, self.service_path, suffix);
        let description = format!("{} {}", method, suffix);

        // The continuation URLs in `get_paged` already embed api-version;
        // only service-scoped requests add it here.
        let mut full_query: Vec<(String, String)> =
            vec![("api-version".to_string(), API_VERSION.to_string())];
        full_query.extend_from_slice(query);

        retry_with_backoff(&self.retry, &description, ApimError::is_retryable, || {
            self.send_once(method.clone(), &url, &full_query, body, kind, name)
        })
        .await
    }

    pub async fn get_json(
        &self,
        suffix: &str,
        query: &[(String, String)],
        kind: &'static str,
        name: &str,
    ) -> Result<Value, ApimError> {
        self.send(Method::GET, suffix, query, None, kind, name).await
    }

    /// GET a collection, following `nextLink` continuations.
    pub async fn get_paged(
        &self,
        suffix: &str,
        query: &[(String, String)],
        kind: &'static str,
        name: &str,
    ) -> Result<Vec<Value>, ApimError> {
        let first = self.send(Method::GET, suffix, query, None, kind, name).await?;
        let mut page: ArmPage =
            serde_json::from_value(first).map_err(|e| ApimError::Malformed(e.to_string()))?;

        let mut items = page.value;
        let mut pages = 1;

        while let Some(link) = page.next_link.take() {
            if pages >= MAX_PAGES {
                tracing::warn!(
                    suffix,
                    pages,
                    "stopping pagination at page cap; result set is truncated"
                );
                break;
            }
            // nextLink is absolute and already carries api-version and skip tokens.
            let description = format!("GET {suffix} (continuation)");
            let raw = retry_with_backoff(
                &self.retry,
                &description,
                ApimError::is_retryable,
                || self.send_once(Method::GET, &link, &[], None, kind, name),
            )
            .await?;
            page = serde_json::from_value(raw).map_err(|e| ApimError::Malformed(e.to_string()))?;
            items.append(&mut page.value);
            pages += 1;
        }

        Ok(items)
    }

    pub async fn put_json(
        &self,
        suffix: &str,
        body: &Value,
        kind: &'static str,
        name: &str,
    ) -> Result<Value, ApimError> {
        self.send(Method::PUT, suffix, &[], Some(body), kind, name)
            .await
    }

    pub async fn patch_json(
        &self,
        suffix: &str,
        body: &Value,
        kind: &'static str,
        name: &str,
    ) -> Result<Value, ApimError> {
        self.send(Method::PATCH, suffix, &[], Some(body), kind, name)
            .await
    }

    pub async fn post_json(
        &self,
        suffix: &str,
        body: Option<&Value>,
        kind: &'static str,
        name: &str,
    ) -> Result<Value, ApimError> {
        self.send(Method::POST, suffix, &[], body, kind, name).await
    }

    pub async fn delete(
        &self,
        suffix: &str,
        query: &[(String, String)],
        kind: &'static str,
        name: &str,
    ) -> Result<(), ApimError> {
        self.send(Method::DELETE, suffix, query, None, kind, name)
            .await
            .map(|_| ())
    }

    /// Fetch the APIM service resource itself.
    ///
    /// Doubles as the connectivity/credential check: a successful call proves
    /// the token, subscription, resource group and service name all line up.
    pub async fn test_connection(&self) -> Result<ServiceInfo, ApimError> {
        let raw = self.get_json("", &[], "service", "instance").await?;
        ServiceInfo::from_arm(raw)
    }
}

// ---------------------------------------------------------------------------
// Service resource DTO
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ServiceSku {
    name: Option<String>,
    capacity: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceProperties {
    gateway_url: Option<String>,
    developer_portal_url: Option<String>,
    management_api_url: Option<String>,
    portal_url: Option<String>,
    provisioning_state: Option<String>,
    publisher_email: Option<String>,
    publisher_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceEnvelope {
    name: String,
    location: Option<String>,
    sku: Option<ServiceSku>,
    properties: ServiceProperties,
}

/// Summary of the APIM service instance returned by `test_connection`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub location: Option<String>,
    pub sku: Option<String>,
    pub sku_capacity: Option<u32>,
    pub gateway_url: Option<String>,
    pub developer_portal_url: Option<String>,
    pub management_api_url: Option<String>,
    pub portal_url: Option<String>,
    pub provisioning_state: Option<String>,
    pub publisher_email: Option<String>,
    pub publisher_name: Option<String>,
}

impl ServiceInfo {
    fn from_arm(raw: Value) -> Result<Self, ApimError> {
        let envelope: ServiceEnvelope =
            serde_json::from_value(raw).map_err(|e| ApimError::Malformed(e.to_string()))?;
        let (sku, sku_capacity) = envelope
            .sku
            .map(|s| (s.name, s.capacity))
            .unwrap_or((None, None));
        Ok(ServiceInfo {
            name: envelope.name,
            location: envelope.location,
            sku,
            sku_capacity,
            gateway_url: envelope.properties.gateway_url,
            developer_portal_url: envelope.properties.developer_portal_url,
            management_api_url: envelope.properties.management_api_url,
            portal_url: envelope.properties.portal_url,
            provisioning_state: envelope.properties.provisioning_state,
            publisher_email: envelope.properties.publisher_email,
            publisher_name: envelope.properties.publisher_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_validation_accepts_typical_apim_names() {
        assert!(validate_identifier("api_id", "echo-api").is_ok());
        assert!(validate_identifier("api_id", "orders2").is_ok());
        assert!(validate_identifier("api_id", "A").is_ok());
    }

    #[test]
    fn identifier_validation_rejects_bad_segments() {
        assert!(validate_identifier("api_id", "").is_err());
        assert!(validate_identifier("api_id", "has space").is_err());
        assert!(validate_identifier("api_id", "semi;rev=2").is_err());
        assert!(validate_identifier("api_id", "-leading").is_err());
        assert!(validate_identifier("api_id", "trailing-").is_err());
        assert!(validate_identifier("api_id", &"x".repeat(81)).is_err());
    }

    #[test]
    fn identifier_error_names_the_field() {
        let err = validate_identifier("backend_id", "").unwrap_err();
        assert!(err.to_string().contains("backend_id"));
    }

    #[test]
    fn service_info_is_mapped_from_arm_envelope() {
        let raw = json!({
            "name": "contoso-apim",
            "location": "westeurope",
            "sku": { "name": "Developer", "capacity": 1 },
            "properties": {
                "gatewayUrl": "https://contoso-apim.azure-api.net",
                "developerPortalUrl": "https://contoso-apim.developer.azure-api.net",
                "managementApiUrl": "https://contoso-apim.management.azure-api.net",
                "portalUrl": null,
                "provisioningState": "Succeeded",
                "publisherEmail": "apis@contoso.example",
                "publisherName": "Contoso"
            }
        });

        let info = ServiceInfo::from_arm(raw).unwrap();
        assert_eq!(info.name, "contoso-apim");
        assert_eq!(info.sku.as_deref(), Some("Developer"));
        assert_eq!(info.sku_capacity, Some(1));
        assert_eq!(
            info.gateway_url.as_deref(),
            Some("https://contoso-apim.azure-api.net")
        );
        assert_eq!(info.provisioning_state.as_deref(), Some("Succeeded"));
    }

    #[test]
    fn arm_page_tolerates_missing_value() {
        let page: ArmPage = serde_json::from_value(json!({})).unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn arm_resource_parsing_surfaces_shape_errors() {
        #[derive(Debug, serde::Deserialize)]
        struct Props {
            #[allow(dead_code)]
            display_name: String,
        }
        let bad = json!({"name": "x", "properties": {}});
        assert!(parse_resource::<Props>(bad).is_err());
    }
}
