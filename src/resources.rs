//! MCP resources over the APIM entity collections.
//!
//! Resources are exposed via URIs in the format `apim://{collection}` for a
//! listing and `apim://{collection}/{id}` for one entity.

use crate::arm::ArmClient;
use crate::error::ApimError;
use crate::{apis, backends, products, subscriptions, versioning};

const SCHEME: &str = "apim://";

/// Entity collections addressable as MCP resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Apis,
    Products,
    Subscriptions,
    Backends,
    VersionSets,
}

impl ResourceKind {
    pub fn collection(self) -> &'static str {
        match self {
            ResourceKind::Apis => "apis",
            ResourceKind::Products => "products",
            ResourceKind::Subscriptions => "subscriptions",
            ResourceKind::Backends => "backends",
            ResourceKind::VersionSets => "version-sets",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ResourceKind::Apis => "APIs exposed by the API Management gateway",
            ResourceKind::Products => "Products bundling APIs for publication",
            ResourceKind::Subscriptions => "Subscriptions granting access to products or APIs",
            ResourceKind::Backends => "Backend services behind the gateway",
            ResourceKind::VersionSets => "Version sets grouping API versions",
        }
    }

    const ALL: [ResourceKind; 5] = [
        ResourceKind::Apis,
        ResourceKind::Products,
        ResourceKind::Subscriptions,
        ResourceKind::Backends,
        ResourceKind::VersionSets,
    ];
}

/// Parsed `apim://` resource URI.
#[derive(Debug, Clone)]
pub struct ResourceUri {
    pub kind: ResourceKind,
    /// `None` addresses the whole collection.
    pub item: Option<String>,
}

impl ResourceUri {
    /// Parse a resource URI string.
    pub fn parse(uri: &str) -> Result<Self, ApimError> {
        let path = uri.strip_prefix(SCHEME).ok_or_else(|| ApimError::InvalidParameter {
            field: "uri",
            reason: format!("expected scheme '{SCHEME}', got '{uri}'"),
        })?;

        let mut parts = path.split('/');
        let collection = parts.next().unwrap_or_default();
        let item = parts.next();
        if parts.next().is_some() {
            return Err(ApimError::InvalidParameter {
                field: "uri",
                reason: format!("expected '{SCHEME}{{collection}}[/{{id}}]', got '{uri}'"),
            });
        }

        let kind = ResourceKind::ALL
            .into_iter()
            .find(|k| k.collection() == collection)
            .ok_or_else(|| ApimError::InvalidParameter {
                field: "uri",
                reason: format!(
                    "unknown collection '{collection}'; valid collections: apis, products, \
                     subscriptions, backends, version-sets"
                ),
            })?;

        let item = match item {
            Some("") => {
                return Err(ApimError::InvalidParameter {
                    field: "uri",
                    reason: "resource id must not be empty".to_string(),
                })
            }
            Some(id) => Some(id.to_string()),
            None => None,
        };

        Ok(Self { kind, item })
    }

    pub fn to_uri(&self) -> String {
        match &self.item {
            Some(item) => format!("{SCHEME}{}/{item}", self.kind.collection()),
            None => format!("{SCHEME}{}", self.kind.collection()),
        }
    }
}

/// A listable resource entry (URI, name, description).
pub struct CatalogEntry {
    pub uri: String,
    pub name: &'static str,
    pub description: &'static str,
}

/// The static resource catalog: one entry per collection.
///
/// Individual entities are read on demand via `apim://{collection}/{id}`;
/// enumerating them here would cost one ARM list call per collection on
/// every `resources/list`.
pub fn catalog() -> Vec<CatalogEntry> {
    ResourceKind::ALL
        .into_iter()
        .map(|kind| CatalogEntry {
            uri: format!("{SCHEME}{}", kind.collection()),
            name: kind.collection(),
            description: kind.description(),
        })
        .collect()
}

fn to_pretty_json<T: serde::Serialize>(value: &T) -> Result<String, ApimError> {
    serde_json::to_string_pretty(value).map_err(|e| ApimError::Malformed(e.to_string()))
}

/// Read a resource: the collection listing or one entity, as pretty JSON.
pub async fn read(arm: &ArmClient, uri: &str) -> Result<String, ApimError> {
    let parsed = ResourceUri::parse(uri)?;
    tracing::debug!(uri, kind = ?parsed.kind, "reading resource");

    match (parsed.kind, parsed.item.as_deref()) {
        (ResourceKind::Apis, None) => to_pretty_json(&apis::list_apis(arm, None, None, None).await?),
        (ResourceKind::Apis, Some(id)) => to_pretty_json(&apis::get_api(arm, id).await?),
        (ResourceKind::Products, None) => to_pretty_json(&products::list_products(arm).await?),
        (ResourceKind::Products, Some(id)) => {
            to_pretty_json(&products::get_product(arm, id).await?)
        }
        (ResourceKind::Subscriptions, None) => {
            to_pretty_json(&subscriptions::list_subscriptions(arm, None).await?)
        }
        (ResourceKind::Subscriptions, Some(id)) => {
            to_pretty_json(&subscriptions::get_subscription(arm, id).await?)
        }
        (ResourceKind::Backends, None) => to_pretty_json(&backends::list_backends(arm).await?),
        (ResourceKind::Backends, Some(id)) => {
            to_pretty_json(&backends::get_backend(arm, id).await?)
        }
        (ResourceKind::VersionSets, None) => {
            to_pretty_json(&versioning::list_version_sets(arm).await?)
        }
        (ResourceKind::VersionSets, Some(id)) => {
            to_pretty_json(&versioning::list_api_versions(arm, id).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_uri_parses_without_item() {
        let parsed = ResourceUri::parse("apim://apis").unwrap();
        assert_eq!(parsed.kind, ResourceKind::Apis);
        assert!(parsed.item.is_none());
    }

    #[test]
    fn item_uri_parses_with_id() {
        let parsed = ResourceUri::parse("apim://products/starter").unwrap();
        assert_eq!(parsed.kind, ResourceKind::Products);
        assert_eq!(parsed.item.as_deref(), Some("starter"));
    }

    #[test]
    fn version_sets_use_hyphenated_collection() {
        let parsed = ResourceUri::parse("apim://version-sets/orders-versions").unwrap();
        assert_eq!(parsed.kind, ResourceKind::VersionSets);
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        assert!(ResourceUri::parse("http://apis").is_err());
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let err = ResourceUri::parse("apim://gateways").unwrap_err();
        assert!(err.to_string().contains("unknown collection"));
    }

    #[test]
    fn empty_item_is_rejected() {
        assert!(ResourceUri::parse("apim://apis/").is_err());
    }

    #[test]
    fn extra_segments_are_rejected() {
        assert!(ResourceUri::parse("apim://apis/orders/operations").is_err());
    }

    #[test]
    fn round_trip_formatting() {
        let parsed = ResourceUri::parse("apim://backends/orders-backend").unwrap();
        assert_eq!(parsed.to_uri(), "apim://backends/orders-backend");
    }

    #[test]
    fn catalog_lists_all_five_collections() {
        let entries = catalog();
        assert_eq!(entries.len(), 5);
        assert!(entries.iter().any(|e| e.uri == "apim://apis"));
        assert!(entries.iter().any(|e| e.uri == "apim://version-sets"));
    }
}
