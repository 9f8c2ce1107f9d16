use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        AnnotateAble, Implementation, ListResourcesResult, PaginatedRequestParams,
        ProtocolVersion, RawResource, ReadResourceRequestParams, ReadResourceResult,
        ResourceContents, ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::Arc;

use crate::apis::{self, BackendWiring, CreateApiFromYamlRequest, VersioningRequest};
use crate::arm::ArmClient;
use crate::backends::{self, BackendRequest};
use crate::config::Config;
use crate::error::ApimError;
use crate::grpc::{self, CreateGrpcApiRequest};
use crate::operations::{self, OperationRequest};
use crate::products::{self, ProductRequest};
use crate::resources;
use crate::subscriptions::{
    self, CreateSubscriptionRequest, KeyKind, SubscriptionScope,
};
use crate::versioning::{self, VersionSetRequest};

// ---------------------------------------------------------------------------
// Tool parameter types
// ---------------------------------------------------------------------------

/// Parameters for `apim_list_apis`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListApisParams {
    /// OData `$filter` expression, e.g. `contains(properties/displayName,'orders')`.
    pub filter: Option<String>,
    /// Maximum number of APIs to return.
    pub top: Option<u32>,
    /// Number of APIs to skip (for paging).
    pub skip: Option<u32>,
}

/// Parameters addressing one API.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ApiIdParams {
    /// API identifier (the ARM resource name, not the display name).
    pub api_id: String,
}

/// Parameters for `apim_delete_api`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteApiParams {
    /// API identifier.
    pub api_id: String,
    /// Also delete all revisions of the API (default: false).
    pub delete_revisions: Option<bool>,
}

/// Parameters for `apim_create_api_from_yaml`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateApiFromYamlParams {
    /// Identifier of the API to create (letters, digits, hyphens).
    pub api_id: String,
    /// Full OpenAPI contract, YAML or JSON.
    pub contract: String,
    /// Gateway path the API is exposed under, e.g. `orders`.
    pub path: String,
    /// Display name; defaults to the contract's `info.title`.
    pub display_name: Option<String>,
    /// Description; defaults to the contract's `info.description`.
    pub description: Option<String>,
    /// Absolute URL of the backing service.
    pub service_url: Option<String>,
    /// Whether calls require a subscription key (default: true).
    pub subscription_required: Option<bool>,
    /// Backend URL to register and route to; omitting it skips backend wiring.
    pub backend_url: Option<String>,
    /// Backend identifier; defaults to `{api_id}-backend`.
    pub backend_id: Option<String>,
    /// Initial version identifier (e.g. `v1`); omitting it skips versioning.
    pub version: Option<String>,
    /// Version set identifier; defaults to `{api_id}-versions`.
    pub version_set_id: Option<String>,
    /// Versioning scheme: Segment (default), Query or Header.
    pub versioning_scheme: Option<String>,
}

/// Parameters for `apim_create_grpc_api_from_proto`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateGrpcApiParams {
    /// Identifier of the API to create (letters, digits, hyphens).
    pub api_id: String,
    /// Full Protobuf contract source.
    pub proto_contract: String,
    /// Gateway path the API is exposed under, e.g. `grpc/orders`.
    pub path: String,
    /// Display name; defaults to the first `service` declaration.
    pub display_name: Option<String>,
    /// Description of the API.
    pub description: Option<String>,
    /// Absolute URL of the backing gRPC service.
    pub service_url: Option<String>,
    /// Whether calls require a subscription key (default: true).
    pub subscription_required: Option<bool>,
    /// Backend URL to register and route to; omitting it skips backend wiring.
    pub backend_url: Option<String>,
    /// Backend identifier; defaults to `{api_id}-backend`.
    pub backend_id: Option<String>,
    /// Initial version identifier (e.g. `v1`); omitting it skips versioning.
    pub version: Option<String>,
    /// Version set identifier; defaults to `{api_id}-versions`.
    pub version_set_id: Option<String>,
    /// Versioning scheme: Segment (default), Query or Header.
    pub versioning_scheme: Option<String>,
}

/// Parameters for `apim_create_api_revision`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateApiRevisionParams {
    /// API identifier.
    pub api_id: String,
    /// Description of what changes in this revision.
    pub description: Option<String>,
}

/// Parameters for `apim_create_version_set`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateVersionSetParams {
    /// Version set identifier.
    pub version_set_id: String,
    /// Display name of the version set.
    pub display_name: String,
    /// Versioning scheme: Segment (default), Query or Header.
    pub scheme: Option<String>,
    /// Query parameter carrying the version (Query scheme; default `api-version`).
    pub version_query_name: Option<String>,
    /// Header carrying the version (Header scheme; default `Api-Version`).
    pub version_header_name: Option<String>,
}

/// Parameters for `apim_create_api_version`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateApiVersionParams {
    /// Existing API the new version is sourced from.
    pub source_api_id: String,
    /// Version identifier of the new API, e.g. `v2`.
    pub version: String,
    /// Version set joining the versions together.
    pub version_set_id: String,
    /// Identifier for the new API; defaults to `{source_api_id}-{version}`.
    pub new_api_id: Option<String>,
}

/// Parameters addressing one version set.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct VersionSetIdParams {
    /// Version set identifier.
    pub version_set_id: String,
}

/// Parameters addressing one operation of an API.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct OperationRefParams {
    /// API identifier.
    pub api_id: String,
    /// Operation identifier.
    pub operation_id: String,
}

/// Parameters for `apim_create_api_operation`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateOperationParams {
    /// API identifier.
    pub api_id: String,
    /// Operation identifier.
    pub operation_id: String,
    /// Display name of the operation.
    pub display_name: String,
    /// HTTP method (GET, POST, PUT, PATCH, DELETE, HEAD, OPTIONS, TRACE).
    pub method: String,
    /// URL template relative to the API path, e.g. `/orders/{orderId}`.
    pub url_template: String,
    /// Description of the operation.
    pub description: Option<String>,
}

/// Parameters addressing one product.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProductIdParams {
    /// Product identifier.
    pub product_id: String,
}

/// Parameters for `apim_create_product`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateProductParams {
    /// Product identifier.
    pub product_id: String,
    /// Display name of the product.
    pub display_name: String,
    /// Description of the product.
    pub description: Option<String>,
    /// `published` or `notPublished` (default).
    pub state: Option<String>,
    /// Whether a subscription is required to use the product (default: true).
    pub subscription_required: Option<bool>,
    /// Whether subscription requests need admin approval.
    pub approval_required: Option<bool>,
    /// Maximum simultaneous subscriptions per user.
    pub subscriptions_limit: Option<u32>,
    /// Terms of use shown during subscription.
    pub terms: Option<String>,
}

/// Parameters for `apim_add_api_to_product`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddApiToProductParams {
    /// Product identifier.
    pub product_id: String,
    /// API identifier.
    pub api_id: String,
}

/// Parameters for `apim_list_subscriptions`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListSubscriptionsParams {
    /// Restrict the listing to subscriptions of one product.
    pub product_id: Option<String>,
}

/// Parameters addressing one subscription.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubscriptionIdParams {
    /// Subscription identifier.
    pub subscription_id: String,
}

/// Parameters for `apim_create_subscription`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSubscriptionParams {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Display name of the subscription.
    pub display_name: String,
    /// Product to subscribe to. Exactly one of `product_id`/`api_id` is required.
    pub product_id: Option<String>,
    /// API to subscribe to. Exactly one of `product_id`/`api_id` is required.
    pub api_id: Option<String>,
}

/// Parameters for `apim_regenerate_subscription_key`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RegenerateKeyParams {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Which key to regenerate: `primary` or `secondary`.
    pub key: String,
}

/// Parameters for `apim_update_subscription_state`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateSubscriptionStateParams {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Target state: `active`, `suspended` or `cancelled`.
    pub state: String,
}

/// Parameters addressing one backend.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct BackendIdParams {
    /// Backend identifier.
    pub backend_id: String,
}

/// Parameters for `apim_create_or_update_backend`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateBackendParams {
    /// Backend identifier.
    pub backend_id: String,
    /// Absolute URL of the backend service.
    pub url: String,
    /// Backend protocol: `http` (default) or `soap`.
    pub protocol: Option<String>,
    /// Human-readable title.
    pub title: Option<String>,
    /// Description of the backend.
    pub description: Option<String>,
    /// Validate the certificate chain of the backend (default: true).
    pub validate_certificate_chain: Option<bool>,
    /// Validate the certificate name of the backend (default: true).
    pub validate_certificate_name: Option<bool>,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// MCP server that exposes the Azure API Management control plane as tools.
#[derive(Clone)]
pub struct ApimMcpServer {
    arm: Arc<ArmClient>,
    tool_router: ToolRouter<Self>,
}

fn render<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn backend_wiring(url: Option<String>, backend_id: Option<String>) -> Option<BackendWiring> {
    url.map(|url| BackendWiring { url, backend_id })
}

fn versioning_request(
    version: Option<String>,
    version_set_id: Option<String>,
    scheme: Option<String>,
) -> Option<VersioningRequest> {
    version.map(|version| VersioningRequest {
        version,
        version_set_id,
        scheme,
    })
}

#[tool_handler(router = self.tool_router)]
impl ServerHandler for ApimMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation {
                name: "apim-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "This MCP server manages one Azure API Management service.  Use the \
                 apim_* tools to inspect and change APIs, versions, revisions, \
                 operations, products, subscriptions and backends, and the apim:// \
                 resources for read-only listings.  Create tools are idempotent \
                 upserts against the ARM control plane."
                    .into(),
            ),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = resources::catalog()
            .into_iter()
            .map(|entry| {
                let mut raw = RawResource::new(entry.uri, entry.name.to_string());
                raw.description = Some(entry.description.to_string());
                raw.mime_type = Some("application/json".to_string());
                raw.no_annotation()
            })
            .collect();

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            ..Default::default()
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        match resources::read(&self.arm, &request.uri).await {
            Ok(text) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::text(text, request.uri)],
            }),
            Err(e @ ApimError::NotFound { .. }) => {
                Err(McpError::resource_not_found(e.to_string(), None))
            }
            Err(e @ ApimError::InvalidParameter { .. }) => {
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }
}

#[tool_router]
impl ApimMcpServer {
    // ------------------------------------------------------------------
    // Service
    // ------------------------------------------------------------------

    /// Fetch the APIM service resource; doubles as a connectivity check.
    #[tool(description = "Get gateway/portal URLs, SKU and provisioning state of the \
                          API Management service.  Also verifies credentials and \
                          connectivity to Azure Resource Manager.")]
    async fn apim_get_service_info(&self) -> Result<String, String> {
        self.arm
            .test_connection()
            .await
            .map_err(|e| e.to_string())
            .and_then(|info| render(&info))
    }

    // ------------------------------------------------------------------
    // APIs
    // ------------------------------------------------------------------

    #[tool(description = "List APIs in the API Management service.  Supports OData \
                          $filter plus $top/$skip paging.")]
    async fn apim_list_apis(
        &self,
        Parameters(params): Parameters<ListApisParams>,
    ) -> Result<String, String> {
        apis::list_apis(&self.arm, params.filter.as_deref(), params.top, params.skip)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Get one API by its identifier, including revision and \
                          version metadata.")]
    async fn apim_get_api(
        &self,
        Parameters(params): Parameters<ApiIdParams>,
    ) -> Result<String, String> {
        apis::get_api(&self.arm, &params.api_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Delete an API.  Set delete_revisions to also remove all \
                          of its revisions.")]
    async fn apim_delete_api(
        &self,
        Parameters(params): Parameters<DeleteApiParams>,
    ) -> Result<String, String> {
        apis::delete_api(
            &self.arm,
            &params.api_id,
            params.delete_revisions.unwrap_or(false),
        )
        .await
        .map_err(|e| e.to_string())
        .and_then(|()| render(&serde_json::json!({ "deleted": params.api_id })))
    }

    #[tool(description = "Create an API from an OpenAPI contract (YAML or JSON), \
                          optionally registering a backend, creating a version set \
                          and attaching a backend-routing policy.  Backend, version \
                          set and policy steps are best-effort: if one fails the API \
                          is still created and the failure is reported in `warnings`.")]
    async fn apim_create_api_from_yaml(
        &self,
        Parameters(params): Parameters<CreateApiFromYamlParams>,
    ) -> Result<String, String> {
        let request = CreateApiFromYamlRequest {
            api_id: params.api_id,
            contract: params.contract,
            path: params.path,
            display_name: params.display_name,
            description: params.description,
            service_url: params.service_url,
            subscription_required: params.subscription_required,
            backend: backend_wiring(params.backend_url, params.backend_id),
            versioning: versioning_request(
                params.version,
                params.version_set_id,
                params.versioning_scheme,
            ),
        };
        apis::create_api_from_yaml(&self.arm, request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create a gRPC API from a Protobuf contract, optionally \
                          registering a backend, creating a version set and attaching \
                          a backend-routing policy.  Best-effort steps report their \
                          failures in `warnings` instead of aborting.")]
    async fn apim_create_grpc_api_from_proto(
        &self,
        Parameters(params): Parameters<CreateGrpcApiParams>,
    ) -> Result<String, String> {
        let request = CreateGrpcApiRequest {
            api_id: params.api_id,
            proto_contract: params.proto_contract,
            path: params.path,
            display_name: params.display_name,
            description: params.description,
            service_url: params.service_url,
            subscription_required: params.subscription_required,
            backend: backend_wiring(params.backend_url, params.backend_id),
            versioning: versioning_request(
                params.version,
                params.version_set_id,
                params.versioning_scheme,
            ),
        };
        grpc::create_grpc_api_from_proto(&self.arm, request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    // ------------------------------------------------------------------
    // Versioning
    // ------------------------------------------------------------------

    #[tool(description = "List all revisions of an API.")]
    async fn apim_list_api_revisions(
        &self,
        Parameters(params): Parameters<ApiIdParams>,
    ) -> Result<String, String> {
        versioning::list_api_revisions(&self.arm, &params.api_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create a new offline revision of an API, sourced from its \
                          current state.  The revision number is chosen automatically.")]
    async fn apim_create_api_revision(
        &self,
        Parameters(params): Parameters<CreateApiRevisionParams>,
    ) -> Result<String, String> {
        versioning::create_api_revision(&self.arm, &params.api_id, params.description.as_deref())
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "List all API version sets in the service.")]
    async fn apim_list_version_sets(&self) -> Result<String, String> {
        versioning::list_version_sets(&self.arm)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create an API version set.  Scheme is Segment (path \
                          segment), Query (query parameter) or Header.")]
    async fn apim_create_version_set(
        &self,
        Parameters(params): Parameters<CreateVersionSetParams>,
    ) -> Result<String, String> {
        let request = VersionSetRequest {
            version_set_id: params.version_set_id,
            display_name: params.display_name,
            scheme: params.scheme.unwrap_or_else(|| "Segment".to_string()),
            version_query_name: params.version_query_name,
            version_header_name: params.version_header_name,
        };
        versioning::create_version_set(&self.arm, &request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create a new version of an existing API inside a version \
                          set.  The definition is copied from the source API.")]
    async fn apim_create_api_version(
        &self,
        Parameters(params): Parameters<CreateApiVersionParams>,
    ) -> Result<String, String> {
        versioning::create_api_version(
            &self.arm,
            &params.source_api_id,
            &params.version,
            &params.version_set_id,
            params.new_api_id.as_deref(),
        )
        .await
        .map_err(|e| e.to_string())
        .and_then(|v| render(&v))
    }

    #[tool(description = "List the APIs that belong to a version set.")]
    async fn apim_list_api_versions(
        &self,
        Parameters(params): Parameters<VersionSetIdParams>,
    ) -> Result<String, String> {
        versioning::list_api_versions(&self.arm, &params.version_set_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    #[tool(description = "List the operations (routes) of an API.")]
    async fn apim_list_api_operations(
        &self,
        Parameters(params): Parameters<ApiIdParams>,
    ) -> Result<String, String> {
        operations::list_operations(&self.arm, &params.api_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Get one operation of an API.")]
    async fn apim_get_api_operation(
        &self,
        Parameters(params): Parameters<OperationRefParams>,
    ) -> Result<String, String> {
        operations::get_operation(&self.arm, &params.api_id, &params.operation_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create or update an operation of an API (method, URL \
                          template, display name).")]
    async fn apim_create_api_operation(
        &self,
        Parameters(params): Parameters<CreateOperationParams>,
    ) -> Result<String, String> {
        let request = OperationRequest {
            operation_id: params.operation_id,
            display_name: params.display_name,
            method: params.method,
            url_template: params.url_template,
            description: params.description,
            template_parameters: None,
        };
        operations::create_or_update_operation(&self.arm, &params.api_id, &request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Delete an operation of an API.")]
    async fn apim_delete_api_operation(
        &self,
        Parameters(params): Parameters<OperationRefParams>,
    ) -> Result<String, String> {
        operations::delete_operation(&self.arm, &params.api_id, &params.operation_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|()| render(&serde_json::json!({ "deleted": params.operation_id })))
    }

    // ------------------------------------------------------------------
    // Products
    // ------------------------------------------------------------------

    #[tool(description = "List all products in the API Management service.")]
    async fn apim_list_products(&self) -> Result<String, String> {
        products::list_products(&self.arm)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Get one product by its identifier.")]
    async fn apim_get_product(
        &self,
        Parameters(params): Parameters<ProductIdParams>,
    ) -> Result<String, String> {
        products::get_product(&self.arm, &params.product_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create or update a product (display name, description, \
                          publication state, subscription settings).")]
    async fn apim_create_product(
        &self,
        Parameters(params): Parameters<CreateProductParams>,
    ) -> Result<String, String> {
        let request = ProductRequest {
            product_id: params.product_id,
            display_name: params.display_name,
            description: params.description,
            state: params.state,
            subscription_required: params.subscription_required.unwrap_or(true),
            approval_required: params.approval_required,
            subscriptions_limit: params.subscriptions_limit,
            terms: params.terms,
        };
        products::create_or_update_product(&self.arm, &request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Attach an API to a product so product subscriptions cover it.")]
    async fn apim_add_api_to_product(
        &self,
        Parameters(params): Parameters<AddApiToProductParams>,
    ) -> Result<String, String> {
        products::add_api_to_product(&self.arm, &params.product_id, &params.api_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "List the APIs attached to a product.")]
    async fn apim_list_product_apis(
        &self,
        Parameters(params): Parameters<ProductIdParams>,
    ) -> Result<String, String> {
        products::list_product_apis(&self.arm, &params.product_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    // ------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------

    #[tool(description = "List subscriptions, optionally restricted to one product.  \
                          Keys are never included; use apim_get_subscription_keys.")]
    async fn apim_list_subscriptions(
        &self,
        Parameters(params): Parameters<ListSubscriptionsParams>,
    ) -> Result<String, String> {
        subscriptions::list_subscriptions(&self.arm, params.product_id.as_deref())
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Get one subscription by its identifier (without keys).")]
    async fn apim_get_subscription(
        &self,
        Parameters(params): Parameters<SubscriptionIdParams>,
    ) -> Result<String, String> {
        subscriptions::get_subscription(&self.arm, &params.subscription_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Get the primary and secondary keys of a subscription.")]
    async fn apim_get_subscription_keys(
        &self,
        Parameters(params): Parameters<SubscriptionIdParams>,
    ) -> Result<String, String> {
        subscriptions::get_subscription_keys(&self.arm, &params.subscription_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create a subscription to a product or to a single API.  \
                          Exactly one of product_id/api_id must be given.")]
    async fn apim_create_subscription(
        &self,
        Parameters(params): Parameters<CreateSubscriptionParams>,
    ) -> Result<String, String> {
        let scope = match (params.product_id, params.api_id) {
            (Some(product_id), None) => SubscriptionScope::Product(product_id),
            (None, Some(api_id)) => SubscriptionScope::Api(api_id),
            _ => {
                return Err(
                    "exactly one of product_id or api_id must be provided".to_string()
                )
            }
        };
        let request = CreateSubscriptionRequest {
            subscription_id: params.subscription_id,
            scope,
            display_name: params.display_name,
        };
        subscriptions::create_subscription(&self.arm, &request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Regenerate the primary or secondary key of a subscription \
                          and return the fresh key pair.")]
    async fn apim_regenerate_subscription_key(
        &self,
        Parameters(params): Parameters<RegenerateKeyParams>,
    ) -> Result<String, String> {
        let kind = KeyKind::parse(&params.key).map_err(|e| e.to_string())?;
        subscriptions::regenerate_key(&self.arm, &params.subscription_id, kind)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Activate, suspend or cancel a subscription.")]
    async fn apim_update_subscription_state(
        &self,
        Parameters(params): Parameters<UpdateSubscriptionStateParams>,
    ) -> Result<String, String> {
        subscriptions::update_subscription_state(
            &self.arm,
            &params.subscription_id,
            &params.state,
        )
        .await
        .map_err(|e| e.to_string())
        .and_then(|v| render(&v))
    }

    // ------------------------------------------------------------------
    // Backends
    // ------------------------------------------------------------------

    #[tool(description = "List all backend services registered in the service.")]
    async fn apim_list_backends(&self) -> Result<String, String> {
        backends::list_backends(&self.arm)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Get one backend by its identifier.")]
    async fn apim_get_backend(
        &self,
        Parameters(params): Parameters<BackendIdParams>,
    ) -> Result<String, String> {
        backends::get_backend(&self.arm, &params.backend_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Create or update a backend service (URL, protocol, TLS \
                          validation flags).")]
    async fn apim_create_or_update_backend(
        &self,
        Parameters(params): Parameters<CreateBackendParams>,
    ) -> Result<String, String> {
        let request = BackendRequest {
            backend_id: params.backend_id,
            url: params.url,
            protocol: params.protocol.unwrap_or_else(|| "http".to_string()),
            title: params.title,
            description: params.description,
            validate_certificate_chain: params.validate_certificate_chain.unwrap_or(true),
            validate_certificate_name: params.validate_certificate_name.unwrap_or(true),
        };
        backends::create_or_update_backend(&self.arm, &request)
            .await
            .map_err(|e| e.to_string())
            .and_then(|v| render(&v))
    }

    #[tool(description = "Delete a backend service.")]
    async fn apim_delete_backend(
        &self,
        Parameters(params): Parameters<BackendIdParams>,
    ) -> Result<String, String> {
        backends::delete_backend(&self.arm, &params.backend_id)
            .await
            .map_err(|e| e.to_string())
            .and_then(|()| render(&serde_json::json!({ "deleted": params.backend_id })))
    }
}

impl ApimMcpServer {
    /// Create a new server instance.
    pub fn new(config: &Config) -> Result<Self, ApimError> {
        Ok(Self {
            arm: Arc::new(ArmClient::new(config)?),
            tool_router: Self::tool_router(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_ARM_ENDPOINT;

    fn make_server() -> ApimMcpServer {
        ApimMcpServer::new(&Config {
            subscription_id: "00000000-0000-0000-0000-000000000000".into(),
            resource_group: "rg-apim-test".into(),
            service_name: "contoso-apim".into(),
            service_principal: None,
            arm_endpoint: DEFAULT_ARM_ENDPOINT.into(),
        })
        .unwrap()
    }

    #[test]
    fn server_info_contains_correct_name() {
        let server = make_server();
        let info = server.get_info();
        assert_eq!(info.server_info.name, "apim-mcp-server");
    }

    #[test]
    fn server_info_has_tools_and_resources_capabilities() {
        let server = make_server();
        let info = server.get_info();
        assert!(
            info.capabilities.tools.is_some(),
            "tools capability must be present"
        );
        assert!(
            info.capabilities.resources.is_some(),
            "resources capability must be present"
        );
    }

    #[test]
    fn tool_router_lists_expected_tools() {
        let server = make_server();
        let tools = server.tool_router.list_all();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();

        for expected in [
            "apim_get_service_info",
            "apim_list_apis",
            "apim_get_api",
            "apim_delete_api",
            "apim_create_api_from_yaml",
            "apim_create_grpc_api_from_proto",
            "apim_list_api_revisions",
            "apim_create_api_revision",
            "apim_list_version_sets",
            "apim_create_version_set",
            "apim_create_api_version",
            "apim_list_api_versions",
            "apim_list_api_operations",
            "apim_get_api_operation",
            "apim_create_api_operation",
            "apim_delete_api_operation",
            "apim_list_products",
            "apim_get_product",
            "apim_create_product",
            "apim_add_api_to_product",
            "apim_list_product_apis",
            "apim_list_subscriptions",
            "apim_get_subscription",
            "apim_get_subscription_keys",
            "apim_create_subscription",
            "apim_regenerate_subscription_key",
            "apim_update_subscription_state",
            "apim_list_backends",
            "apim_get_backend",
            "apim_create_or_update_backend",
            "apim_delete_backend",
        ] {
            assert!(names.contains(&expected), "{expected} missing");
        }
    }

    #[tokio::test]
    async fn create_subscription_requires_exactly_one_scope() {
        let server = make_server();

        let both = CreateSubscriptionParams {
            subscription_id: "s1".into(),
            display_name: "S1".into(),
            product_id: Some("starter".into()),
            api_id: Some("orders".into()),
        };
        let err = server
            .apim_create_subscription(Parameters(both))
            .await
            .unwrap_err();
        assert!(err.contains("exactly one"));

        let neither = CreateSubscriptionParams {
            subscription_id: "s1".into(),
            display_name: "S1".into(),
            product_id: None,
            api_id: None,
        };
        let err = server
            .apim_create_subscription(Parameters(neither))
            .await
            .unwrap_err();
        assert!(err.contains("exactly one"));
    }
}
