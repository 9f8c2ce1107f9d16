use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::arm::{parse_resource, validate_identifier, ArmClient};
use crate::backends::{self, BackendRequest};
use crate::contract::{detect_contract_format, scan_openapi_metadata};
use crate::error::ApimError;
use crate::versioning::{self, VersionSetRequest};

/// An API exposed by the APIM gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Api {
    pub api_id: String,
    pub display_name: String,
    pub path: String,
    pub protocols: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version_set_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_required: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiProperties {
    display_name: String,
    path: String,
    #[serde(default)]
    protocols: Vec<String>,
    #[serde(rename = "type")]
    api_type: Option<String>,
    service_url: Option<String>,
    api_version: Option<String>,
    api_version_set_id: Option<String>,
    api_revision: Option<String>,
    is_current: Option<bool>,
    subscription_required: Option<bool>,
    description: Option<String>,
}

pub(crate) fn api_from_arm(raw: Value) -> Result<Api, ApimError> {
    let resource = parse_resource::<ApiProperties>(raw)?;
    Ok(Api {
        api_id: resource.name,
        display_name: resource.properties.display_name,
        path: resource.properties.path,
        protocols: resource.properties.protocols,
        api_type: resource.properties.api_type,
        service_url: resource.properties.service_url,
        api_version: resource.properties.api_version,
        api_version_set_id: resource.properties.api_version_set_id,
        api_revision: resource.properties.api_revision,
        is_current: resource.properties.is_current,
        subscription_required: resource.properties.subscription_required,
        description: resource.properties.description,
    })
}

/// List APIs, optionally with server-side `$filter`/`$top`/`$skip`.
pub async fn list_apis(
    arm: &ArmClient,
    filter: Option<&str>,
    top: Option<u32>,
    skip: Option<u32>,
) -> Result<Vec<Api>, ApimError> {
    let mut query: Vec<(String, String)> = Vec::new();
    if let Some(filter) = filter {
        query.push(("$filter".to_string(), filter.to_string()));
    }
    if let Some(top) = top {
        query.push(("$top".to_string(), top.to_string()));
    }
    if let Some(skip) = skip {
        query.push(("$skip".to_string(), skip.to_string()));
    }

    let items = arm.get_paged("/apis", &query, "api", "collection").await?;
    items.into_iter().map(api_from_arm).collect()
}

pub async fn get_api(arm: &ArmClient, api_id: &str) -> Result<Api, ApimError> {
    validate_identifier("api_id", api_id)?;
    let raw = arm
        .get_json(&format!("/apis/{api_id}"), &[], "api", api_id)
        .await?;
    api_from_arm(raw)
}

pub async fn delete_api(
    arm: &ArmClient,
    api_id: &str,
    delete_revisions: bool,
) -> Result<(), ApimError> {
    validate_identifier("api_id", api_id)?;
    let query: Vec<(String, String)> = if delete_revisions {
        vec![("deleteRevisions".to_string(), "true".to_string())]
    } else {
        Vec::new()
    };
    arm.delete(&format!("/apis/{api_id}"), &query, "api", api_id)
        .await
}

// ---------------------------------------------------------------------------
// Create-API orchestration
// ---------------------------------------------------------------------------

/// Backend wiring requested alongside an API import.
#[derive(Debug, Clone)]
pub struct BackendWiring {
    pub url: String,
    /// Defaults to `{api_id}-backend` when omitted.
    pub backend_id: Option<String>,
}

/// Versioning requested alongside an API import.
#[derive(Debug, Clone)]
pub struct VersioningRequest {
    /// Version identifier of the new API, e.g. `v1`.
    pub version: String,
    /// Defaults to `{api_id}-versions` when omitted.
    pub version_set_id: Option<String>,
    /// Segment | Query | Header; defaults to Segment.
    pub scheme: Option<String>,
}

/// Request for [`create_api_from_yaml`].
#[derive(Debug, Clone)]
pub struct CreateApiFromYamlRequest {
    pub api_id: String,
    pub contract: String,
    pub path: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub service_url: Option<String>,
    pub subscription_required: Option<bool>,
    pub backend: Option<BackendWiring>,
    pub versioning: Option<VersioningRequest>,
}

/// Result of an API-creation workflow.
///
/// `warnings` carries the best-effort steps that failed; the API itself was
/// created whenever this struct is returned at all.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiOutcome {
    pub api: Api,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_set_id: Option<String>,
    pub warnings: Vec<String>,
}

/// Everything the shared import workflow needs, independent of contract kind.
pub(crate) struct ApiImport {
    pub api_id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub path: String,
    /// ARM import format (`openapi`, `openapi+json`, `swagger-json`, `grpc`).
    pub format: &'static str,
    pub contract: String,
    /// `Some("grpc")` marks a gRPC-type API.
    pub api_type: Option<&'static str>,
    pub service_url: Option<String>,
    pub subscription_required: bool,
    pub backend: Option<BackendWiring>,
    pub versioning: Option<VersioningRequest>,
}

/// Create an API from an OpenAPI (YAML or JSON) contract, with optional
/// backend wiring and versioning.
///
/// Step order and failure semantics:
/// 1. backend creation — on failure: warn, continue without backend;
/// 2. version-set creation — on failure: warn, continue unversioned;
/// 3. API import — failure here propagates;
/// 4. backend policy attachment — on failure: warn, continue.
///
/// Earlier successful steps are never rolled back.
pub async fn create_api_from_yaml(
    arm: &ArmClient,
    request: CreateApiFromYamlRequest,
) -> Result<CreateApiOutcome, ApimError> {
    if request.contract.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "contract",
            reason: "must not be empty".to_string(),
        });
    }

    let metadata = scan_openapi_metadata(&request.contract);
    let display_name = request
        .display_name
        .or(metadata.title)
        .unwrap_or_else(|| request.api_id.clone());
    let description = request.description.or(metadata.description);
    let format = detect_contract_format(&request.contract).arm_format();

    import_api(
        arm,
        ApiImport {
            api_id: request.api_id,
            display_name,
            description,
            path: request.path,
            format,
            contract: request.contract,
            api_type: None,
            service_url: request.service_url,
            subscription_required: request.subscription_required.unwrap_or(true),
            backend: request.backend,
            versioning: request.versioning,
        },
    )
    .await
}

pub(crate) async fn import_api(
    arm: &ArmClient,
    spec: ApiImport,
) -> Result<CreateApiOutcome, ApimError> {
    validate_identifier("api_id", &spec.api_id)?;
    if spec.path.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "path",
            reason: "must not be empty".to_string(),
        });
    }

    let mut warnings = Vec::new();

    // Step 1: backend (best effort).
    let backend_id = match &spec.backend {
        Some(wiring) => {
            let backend_id = wiring
                .backend_id
                .clone()
                .unwrap_or_else(|| format!("{}-backend", spec.api_id));
            let request = BackendRequest {
                backend_id: backend_id.clone(),
                url: wiring.url.clone(),
                protocol: "http".to_string(),
                title: Some(spec.display_name.clone()),
                description: None,
                validate_certificate_chain: true,
                validate_certificate_name: true,
            };
            match backends::create_or_update_backend(arm, &request).await {
                Ok(_) => Some(backend_id),
                Err(e) => {
                    tracing::warn!(api_id = %spec.api_id, backend_id = %backend_id, error = %e,
                        "backend creation failed, continuing without backend");
                    warnings.push(format!(
                        "backend '{backend_id}' creation failed, API created without backend: {e}"
                    ));
                    None
                }
            }
        }
        None => None,
    };

    // Step 2: version set (best effort; failure means the API stays unversioned).
    let mut api_version = None;
    let mut version_set_resource_id = None;
    let mut version_set_id = None;
    if let Some(requested) = &spec.versioning {
        let set_id = requested
            .version_set_id
            .clone()
            .unwrap_or_else(|| format!("{}-versions", spec.api_id));
        let request = VersionSetRequest {
            version_set_id: set_id.clone(),
            display_name: format!("{} versions", spec.display_name),
            scheme: requested
                .scheme
                .clone()
                .unwrap_or_else(|| "Segment".to_string()),
            version_query_name: None,
            version_header_name: None,
        };
        match versioning::create_version_set(arm, &request).await {
            Ok(set) => {
                api_version = Some(requested.version.clone());
                version_set_resource_id = Some(
                    set.resource_id
                        .unwrap_or_else(|| arm.resource_id(&format!("/apiVersionSets/{set_id}"))),
                );
                version_set_id = Some(set_id);
            }
            Err(e) => {
                tracing::warn!(api_id = %spec.api_id, version_set_id = %set_id, error = %e,
                    "version set creation failed, creating API unversioned");
                warnings.push(format!(
                    "version set '{set_id}' creation failed, API created unversioned: {e}"
                ));
            }
        }
    }

    // Step 3: the import itself. A failure here is a hard failure; steps 1–2
    // are intentionally left in place.
    let mut properties = serde_json::Map::new();
    properties.insert("format".to_string(), json!(spec.format));
    properties.insert("value".to_string(), json!(spec.contract));
    properties.insert("path".to_string(), json!(spec.path));
    properties.insert("displayName".to_string(), json!(spec.display_name));
    properties.insert("protocols".to_string(), json!(["https"]));
    properties.insert(
        "subscriptionRequired".to_string(),
        json!(spec.subscription_required),
    );
    if let Some(description) = &spec.description {
        properties.insert("description".to_string(), json!(description));
    }
    if let Some(api_type) = spec.api_type {
        properties.insert("type".to_string(), json!(api_type));
    }
    if let Some(service_url) = &spec.service_url {
        properties.insert("serviceUrl".to_string(), json!(service_url));
    }
    if let Some(version) = &api_version {
        properties.insert("apiVersion".to_string(), json!(version));
    }
    if let Some(set_id) = &version_set_resource_id {
        properties.insert("apiVersionSetId".to_string(), json!(set_id));
    }

    let raw = arm
        .put_json(
            &format!("/apis/{}", spec.api_id),
            &json!({ "properties": properties }),
            "api",
            &spec.api_id,
        )
        .await?;

    // Long-running imports answer 202 with an empty body; fetch the result.
    let api = if raw.is_null() {
        get_api(arm, &spec.api_id).await?
    } else {
        api_from_arm(raw)?
    };

    // Step 4: backend routing policy (best effort).
    if let Some(backend_id) = &backend_id {
        if let Err(e) = backends::apply_backend_policy(arm, &spec.api_id, backend_id).await {
            tracing::warn!(api_id = %spec.api_id, backend_id = %backend_id, error = %e,
                "backend policy attachment failed, API left without routing policy");
            warnings.push(format!(
                "backend policy for '{backend_id}' could not be attached: {e}"
            ));
        }
    }

    Ok(CreateApiOutcome {
        api,
        backend_id,
        version_set_id,
        warnings,
    })
}
