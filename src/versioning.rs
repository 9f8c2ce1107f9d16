use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::apis::{api_from_arm, Api};
use crate::arm::{parse_resource, validate_identifier, ArmClient};
use crate::error::ApimError;

/// One revision of an API.
///
/// The revisions endpoint returns flat objects, not the usual
/// `{name, properties}` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRevision {
    pub api_id: String,
    pub api_revision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
}

/// A version set grouping the versions of one logical API.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSet {
    pub version_set_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub display_name: String,
    pub versioning_scheme: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_query_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_header_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionSetProperties {
    display_name: String,
    versioning_scheme: String,
    version_query_name: Option<String>,
    version_header_name: Option<String>,
    description: Option<String>,
}

fn version_set_from_arm(raw: Value) -> Result<VersionSet, ApimError> {
    let resource = parse_resource::<VersionSetProperties>(raw)?;
    Ok(VersionSet {
        version_set_id: resource.name,
        resource_id: resource.id,
        display_name: resource.properties.display_name,
        versioning_scheme: resource.properties.versioning_scheme,
        version_query_name: resource.properties.version_query_name,
        version_header_name: resource.properties.version_header_name,
        description: resource.properties.description,
    })
}

/// Request to create or update a version set.
#[derive(Debug, Clone)]
pub struct VersionSetRequest {
    pub version_set_id: String,
    pub display_name: String,
    /// Segment | Query | Header.
    pub scheme: String,
    /// Query parameter name for the Query scheme (default `api-version`).
    pub version_query_name: Option<String>,
    /// Header name for the Header scheme (default `Api-Version`).
    pub version_header_name: Option<String>,
}

pub async fn list_api_revisions(
    arm: &ArmClient,
    api_id: &str,
) -> Result<Vec<ApiRevision>, ApimError> {
    validate_identifier("api_id", api_id)?;
    let items = arm
        .get_paged(&format!("/apis/{api_id}/revisions"), &[], "api", api_id)
        .await?;
    items
        .into_iter()
        .map(|raw| {
            serde_json::from_value::<ApiRevision>(raw)
                .map(normalize_revision)
                .map_err(|e| ApimError::Malformed(e.to_string()))
        })
        .collect()
}

/// The revision list reports `apiId` as an ARM sub-path like
/// `/apis/orders;rev=2`; keep only the plain API identifier.
fn normalize_revision(mut revision: ApiRevision) -> ApiRevision {
    let plain = revision
        .api_id
        .rsplit('/')
        .next()
        .map(|tail| tail.split(';').next().unwrap_or(tail).to_string());
    if let Some(plain) = plain {
        revision.api_id = plain;
    }
    revision
}

/// Next free numeric revision number; non-numeric revision ids are ignored.
fn next_revision_number(revisions: &[ApiRevision]) -> u32 {
    revisions
        .iter()
        .filter_map(|r| r.api_revision.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
        + 1
}

/// Create a new offline revision of an API, sourced from its current state.
pub async fn create_api_revision(
    arm: &ArmClient,
    api_id: &str,
    description: Option<&str>,
) -> Result<Api, ApimError> {
    validate_identifier("api_id", api_id)?;

    let revisions = list_api_revisions(arm, api_id).await?;
    let next = next_revision_number(&revisions);

    let mut properties = serde_json::Map::new();
    properties.insert(
        "sourceApiId".to_string(),
        json!(arm.resource_id(&format!("/apis/{api_id}"))),
    );
    if let Some(description) = description {
        properties.insert("apiRevisionDescription".to_string(), json!(description));
    }

    let raw = arm
        .put_json(
            &format!("/apis/{api_id};rev={next}"),
            &json!({ "properties": properties }),
            "api",
            api_id,
        )
        .await?;
    api_from_arm(raw)
}

pub async fn list_version_sets(arm: &ArmClient) -> Result<Vec<VersionSet>, ApimError> {
    let items = arm
        .get_paged("/apiVersionSets", &[], "version set", "collection")
        .await?;
    items.into_iter().map(version_set_from_arm).collect()
}

pub async fn create_version_set(
    arm: &ArmClient,
    request: &VersionSetRequest,
) -> Result<VersionSet, ApimError> {
    validate_identifier("version_set_id", &request.version_set_id)?;

    let mut properties = serde_json::Map::new();
    properties.insert("displayName".to_string(), json!(request.display_name));
    match request.scheme.as_str() {
        "Segment" => {
            properties.insert("versioningScheme".to_string(), json!("Segment"));
        }
        "Query" => {
            properties.insert("versioningScheme".to_string(), json!("Query"));
            properties.insert(
                "versionQueryName".to_string(),
                json!(request
                    .version_query_name
                    .as_deref()
                    .unwrap_or("api-version")),
            );
        }
        "Header" => {
            properties.insert("versioningScheme".to_string(), json!("Header"));
            properties.insert(
                "versionHeaderName".to_string(),
                json!(request
                    .version_header_name
                    .as_deref()
                    .unwrap_or("Api-Version")),
            );
        }
        other => {
            return Err(ApimError::InvalidParameter {
                field: "scheme",
                reason: format!("must be 'Segment', 'Query' or 'Header', got '{other}'"),
            });
        }
    }

    let raw = arm
        .put_json(
            &format!("/apiVersionSets/{}", request.version_set_id),
            &json!({ "properties": properties }),
            "version set",
            &request.version_set_id,
        )
        .await?;
    version_set_from_arm(raw)
}

/// Create a new version of an existing API inside a version set.
///
/// The new API is sourced from `source_api_id`, so its definition carries
/// over; path, display name and service URL are copied from the source.
pub async fn create_api_version(
    arm: &ArmClient,
    source_api_id: &str,
    version: &str,
    version_set_id: &str,
    new_api_id: Option<&str>,
) -> Result<Api, ApimError> {
    validate_identifier("source_api_id", source_api_id)?;
    validate_identifier("version_set_id", version_set_id)?;
    if version.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "version",
            reason: "must not be empty".to_string(),
        });
    }

    let owned_default;
    let new_api_id = match new_api_id {
        Some(id) => id,
        None => {
            owned_default = format!("{source_api_id}-{version}");
            owned_default.as_str()
        }
    };
    validate_identifier("new_api_id", new_api_id)?;

    let source = crate::apis::get_api(arm, source_api_id).await?;

    let body = json!({
        "properties": {
            "sourceApiId": arm.resource_id(&format!("/apis/{source_api_id}")),
            "displayName": source.display_name,
            "path": source.path,
            "protocols": if source.protocols.is_empty() { vec!["https".to_string()] } else { source.protocols },
            "serviceUrl": source.service_url,
            "apiVersion": version,
            "apiVersionSetId": arm.resource_id(&format!("/apiVersionSets/{version_set_id}")),
        }
    });

    let raw = arm
        .put_json(&format!("/apis/{new_api_id}"), &body, "api", new_api_id)
        .await?;
    api_from_arm(raw)
}

/// APIs that belong to a version set.
///
/// ARM has no server-side filter for this, so the API list is filtered on
/// the version-set suffix client-side.
pub async fn list_api_versions(
    arm: &ArmClient,
    version_set_id: &str,
) -> Result<Vec<Api>, ApimError> {
    validate_identifier("version_set_id", version_set_id)?;
    let suffix = format!("/apiVersionSets/{version_set_id}");

    let all = crate::apis::list_apis(arm, None, None, None).await?;
    Ok(all
        .into_iter()
        .filter(|api| {
            api.api_version_set_id
                .as_deref()
                .is_some_and(|id| id.ends_with(&suffix))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn revision(rev: &str, current: bool) -> ApiRevision {
        ApiRevision {
            api_id: "orders".into(),
            api_revision: rev.into(),
            created_date_time: None,
            updated_date_time: None,
            description: None,
            private_url: None,
            is_online: None,
            is_current: Some(current),
        }
    }

    #[test]
    fn next_revision_skips_past_the_highest_existing() {
        let revisions = vec![revision("1", false), revision("3", true)];
        assert_eq!(next_revision_number(&revisions), 4);
    }

    #[test]
    fn next_revision_ignores_non_numeric_ids() {
        let revisions = vec![revision("1", true), revision("draft", false)];
        assert_eq!(next_revision_number(&revisions), 2);
    }

    #[test]
    fn first_revision_of_a_fresh_api_is_one() {
        assert_eq!(next_revision_number(&[]), 1);
    }

    #[test]
    fn revision_api_id_is_normalized_from_arm_sub_path() {
        let raw: ApiRevision = serde_json::from_value(json!({
            "apiId": "/apis/orders;rev=2",
            "apiRevision": "2",
            "isCurrent": false
        }))
        .unwrap();
        let normalized = normalize_revision(raw);
        assert_eq!(normalized.api_id, "orders");
        assert_eq!(normalized.api_revision, "2");
    }

    #[test]
    fn version_set_is_mapped_from_arm_envelope() {
        let raw = json!({
            "id": "/subscriptions/s/resourceGroups/r/providers/Microsoft.ApiManagement/service/m/apiVersionSets/orders-versions",
            "name": "orders-versions",
            "properties": {
                "displayName": "Orders versions",
                "versioningScheme": "Segment"
            }
        });
        let set = version_set_from_arm(raw).unwrap();
        assert_eq!(set.version_set_id, "orders-versions");
        assert_eq!(set.versioning_scheme, "Segment");
        assert!(set
            .resource_id
            .as_deref()
            .unwrap()
            .ends_with("/apiVersionSets/orders-versions"));
    }

    #[tokio::test]
    async fn unknown_versioning_scheme_is_rejected_locally() {
        let arm = crate::arm::ArmClient::new(&crate::config::Config {
            subscription_id: "sub".into(),
            resource_group: "rg".into(),
            service_name: "svc".into(),
            service_principal: None,
            arm_endpoint: "http://127.0.0.1:0".into(),
        })
        .unwrap();
        let request = VersionSetRequest {
            version_set_id: "vs".into(),
            display_name: "VS".into(),
            scheme: "Path".into(),
            version_query_name: None,
            version_header_name: None,
        };
        let err = create_version_set(&arm, &request).await.unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "scheme", .. }
        ));
    }
}
