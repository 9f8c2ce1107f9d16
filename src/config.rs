use anyhow::Result;
use std::env;

/// Service principal credentials for Azure AD client-credentials auth.
///
/// All three of `AZURE_TENANT_ID`, `AZURE_CLIENT_ID` and `AZURE_CLIENT_SECRET`
/// must be set together; otherwise the server falls back to developer
/// tooling credentials (Azure CLI / Azure Developer CLI login).
#[derive(Debug, Clone)]
pub struct ServicePrincipalConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Top-level server configuration assembled from environment variables at startup.
///
/// Required:
/// - `AZURE_SUBSCRIPTION_ID` — subscription hosting the APIM service
/// - `AZURE_RESOURCE_GROUP` — resource group of the APIM service
/// - `APIM_SERVICE_NAME` — name of the API Management service instance
///
/// Optional:
/// - `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` / `AZURE_CLIENT_SECRET` — service
///   principal triple for non-interactive auth
/// - `ARM_ENDPOINT` — Resource Manager endpoint override (sovereign clouds,
///   local test doubles); defaults to the public cloud endpoint
#[derive(Debug, Clone)]
pub struct Config {
    pub subscription_id: String,
    pub resource_group: String,
    pub service_name: String,
    pub service_principal: Option<ServicePrincipalConfig>,
    pub arm_endpoint: String,
}

/// Public-cloud Azure Resource Manager endpoint.
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

fn required(name: &'static str) -> Result<String> {
    let value = env::var(name)
        .map_err(|_| anyhow::anyhow!("required environment variable {name} is not set"))?;
    anyhow::ensure!(
        !value.trim().is_empty(),
        "required environment variable {name} is empty"
    );
    Ok(value)
}

impl Config {
    /// Build configuration from the current process environment.
    pub fn from_env() -> Result<Self> {
        let subscription_id = required("AZURE_SUBSCRIPTION_ID")?;
        let resource_group = required("AZURE_RESOURCE_GROUP")?;
        let service_name = required("APIM_SERVICE_NAME")?;

        let service_principal = match (
            env::var("AZURE_TENANT_ID").ok(),
            env::var("AZURE_CLIENT_ID").ok(),
            env::var("AZURE_CLIENT_SECRET").ok(),
        ) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                tracing::info!("Service principal credentials found — using client-secret auth");
                Some(ServicePrincipalConfig {
                    tenant_id,
                    client_id,
                    client_secret,
                })
            }
            (None, None, None) => {
                tracing::info!(
                    "No service principal configured — using developer tooling credentials \
                     (az login / azd auth login)"
                );
                None
            }
            _ => {
                anyhow::bail!(
                    "Partial service principal configuration: set all of AZURE_TENANT_ID, \
                     AZURE_CLIENT_ID and AZURE_CLIENT_SECRET, or none of them."
                );
            }
        };

        let arm_endpoint = env::var("ARM_ENDPOINT")
            .ok()
            .map(|e| e.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_ARM_ENDPOINT.to_string());

        Ok(Config {
            subscription_id,
            resource_group,
            service_name,
            service_principal,
            arm_endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            subscription_id: "00000000-0000-0000-0000-000000000000".into(),
            resource_group: "rg-apim-test".into(),
            service_name: "contoso-apim".into(),
            service_principal: None,
            arm_endpoint: DEFAULT_ARM_ENDPOINT.into(),
        }
    }

    #[test]
    fn default_endpoint_is_public_cloud() {
        let cfg = test_config();
        assert_eq!(cfg.arm_endpoint, "https://management.azure.com");
    }

    #[test]
    fn service_principal_is_optional() {
        let cfg = test_config();
        assert!(cfg.service_principal.is_none());
    }
}
