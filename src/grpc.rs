use crate::apis::{import_api, ApiImport, BackendWiring, CreateApiOutcome, VersioningRequest};
use crate::arm::ArmClient;
use crate::contract::scan_proto_metadata;
use crate::error::ApimError;

/// Request for [`create_grpc_api_from_proto`].
#[derive(Debug, Clone)]
pub struct CreateGrpcApiRequest {
    pub api_id: String,
    pub proto_contract: String,
    pub path: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub service_url: Option<String>,
    pub subscription_required: Option<bool>,
    pub backend: Option<BackendWiring>,
    pub versioning: Option<VersioningRequest>,
}

/// Create a gRPC-type API from a Protobuf contract.
///
/// Same orchestration and partial-failure semantics as the OpenAPI workflow;
/// only the import format and the metadata defaults differ. The display name
/// falls back to the first `service` declaration, then the `package` name,
/// then the API id.
pub async fn create_grpc_api_from_proto(
    arm: &ArmClient,
    request: CreateGrpcApiRequest,
) -> Result<CreateApiOutcome, ApimError> {
    if request.proto_contract.trim().is_empty() {
        return Err(ApimError::InvalidParameter {
            field: "proto_contract",
            reason: "must not be empty".to_string(),
        });
    }

    let metadata = scan_proto_metadata(&request.proto_contract);
    let display_name = request
        .display_name
        .or_else(|| metadata.services.first().cloned())
        .or(metadata.package)
        .unwrap_or_else(|| request.api_id.clone());

    import_api(
        arm,
        ApiImport {
            api_id: request.api_id,
            display_name,
            description: request.description,
            path: request.path,
            format: "grpc",
            contract: request.proto_contract,
            api_type: Some("grpc"),
            service_url: request.service_url,
            subscription_required: request.subscription_required.unwrap_or(true),
            backend: request.backend,
            versioning: request.versioning,
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

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
    async fn empty_proto_is_rejected_locally() {
        let request = CreateGrpcApiRequest {
            api_id: "orders-grpc".into(),
            proto_contract: "".into(),
            path: "grpc/orders".into(),
            display_name: None,
            description: None,
            service_url: None,
            subscription_required: None,
            backend: None,
            versioning: None,
        };
        let err = create_grpc_api_from_proto(&offline_arm(), request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "proto_contract", .. }
        ));
    }

    #[tokio::test]
    async fn invalid_api_id_is_rejected_before_any_remote_call() {
        let request = CreateGrpcApiRequest {
            api_id: "bad id!".into(),
            proto_contract: "syntax = \"proto3\";\nservice Orders {}\n".into(),
            path: "grpc/orders".into(),
            display_name: None,
            description: None,
            service_url: None,
            subscription_required: None,
            backend: None,
            versioning: None,
        };
        let err = create_grpc_api_from_proto(&offline_arm(), request)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApimError::InvalidParameter { field: "api_id", .. }
        ));
    }
}
