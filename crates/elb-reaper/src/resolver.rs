//! Service to load balancer resolution
//!
//! The recreation check asks "which load balancer fronts this service right
//! now". On Kubernetes that is the hostname in the service's
//! `status.loadBalancer.ingress`, from which the AWS load balancer name can
//! be recovered.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Service;
use kube::Client;
use kube::api::Api;
use tracing::debug;

/// Resolves the load balancer currently fronting a service.
///
/// `Ok(None)` means the service exists but has no load balancer yet (or does
/// not exist at all); callers treat both as "not yet".
#[allow(async_fn_in_trait)] // Internal use only, Send+Sync bounds on trait are sufficient
#[cfg_attr(test, mockall::automock)]
pub trait ServiceResolver: Send + Sync {
    async fn resolve_load_balancer(&self, namespace: &str, service: &str)
    -> Result<Option<String>>;
}

/// [`ServiceResolver`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeServiceResolver {
    client: Client,
}

impl KubeServiceResolver {
    /// Connect using the ambient kubeconfig or in-cluster configuration
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;
        Ok(Self { client })
    }

    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl ServiceResolver for KubeServiceResolver {
    async fn resolve_load_balancer(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Option<String>> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let Some(svc) = api
            .get_opt(service)
            .await
            .with_context(|| format!("Failed to get service {namespace}/{service}"))?
        else {
            debug!(namespace = %namespace, service = %service, "Service not found");
            return Ok(None);
        };

        let hostname = svc
            .status
            .and_then(|status| status.load_balancer)
            .and_then(|lb| lb.ingress)
            .unwrap_or_default()
            .into_iter()
            .find_map(|ingress| ingress.hostname);

        Ok(hostname.as_deref().and_then(load_balancer_name_from_hostname))
    }
}

/// Recover an AWS load balancer name from its DNS hostname.
///
/// AWS hostnames look like `[internal-]<name>-<id>.<region>.elb.amazonaws.com`
/// (classic) or `<name>-<id>.elb.<region>.amazonaws.com` (v2). Load balancer
/// names may themselves contain dashes, so the id is split off the last one.
pub fn load_balancer_name_from_hostname(hostname: &str) -> Option<String> {
    if !hostname.ends_with(".amazonaws.com") {
        return None;
    }
    let label = hostname.split('.').next()?;
    let label = label.strip_prefix("internal-").unwrap_or(label);
    let (name, id) = label.rsplit_once('-')?;
    if name.is_empty() || id.is_empty() {
        return None;
    }
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_hostname() {
        assert_eq!(
            load_balancer_name_from_hostname(
                "a1b2c3d4e5f6-1234567890.us-east-1.elb.amazonaws.com"
            )
            .as_deref(),
            Some("a1b2c3d4e5f6")
        );
    }

    #[test]
    fn test_v2_hostname_with_dashes_in_name() {
        assert_eq!(
            load_balancer_name_from_hostname(
                "router-default-abc-0123456789abcdef.elb.us-west-2.amazonaws.com"
            )
            .as_deref(),
            Some("router-default-abc")
        );
    }

    #[test]
    fn test_internal_prefix_stripped() {
        assert_eq!(
            load_balancer_name_from_hostname("internal-lb-old-42.eu-west-1.elb.amazonaws.com")
                .as_deref(),
            Some("lb-old")
        );
    }

    #[test]
    fn test_rejects_foreign_hostnames() {
        assert_eq!(load_balancer_name_from_hostname("lb-old-42.example.com"), None);
        assert_eq!(load_balancer_name_from_hostname("nodash.elb.amazonaws.com"), None);
        assert_eq!(load_balancer_name_from_hostname("-42.elb.amazonaws.com"), None);
    }
}
