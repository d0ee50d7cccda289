//! Teardown-then-verify cycle
//!
//! Glues the teardown orchestrator and the recreation poller together the
//! way an end-to-end test uses them: find the load balancer that currently
//! fronts a service, tear it down, then wait for its replacement.

use crate::aws::{LoadBalancerProvider, classify_anyhow_error};
use crate::config::{RecreationConfig, RunConfig};
use crate::recreation::{OldLoadBalancer, RecreationPoller, RecreationState};
use crate::report::{RecreationVerdict, RunReport};
use crate::resolver::ServiceResolver;
use crate::teardown::TeardownOrchestrator;
use anyhow::{Context, Result, bail};
use elb_reaper_common::{LoadBalancerRef, SecurityGroupRef, ServiceRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Identify the old load balancer for a standalone verification.
///
/// Without an ARN the name is described once to pin one. That is only
/// sound while the original still exists: once it has been replaced under
/// the same name the replacement would be pinned instead, so a verification
/// started after deletion needs the ARN. A name that no longer resolves
/// marks the old load balancer as gone.
pub async fn locate_old_load_balancer<P: LoadBalancerProvider>(
    provider: &P,
    name: &str,
    arn: Option<String>,
) -> OldLoadBalancer {
    if let Some(arn) = arn {
        return OldLoadBalancer::present(LoadBalancerRef::resolved(name, arn));
    }
    match provider.describe_load_balancer(name).await {
        Ok(Some(current)) => OldLoadBalancer::present(current),
        Ok(None) => OldLoadBalancer::gone(LoadBalancerRef::named(name)),
        Err(e) if classify_anyhow_error(&e).is_not_found() => {
            OldLoadBalancer::gone(LoadBalancerRef::named(name))
        }
        Err(e) => {
            debug!(lb_name = %name, error = ?e, "Could not pin load balancer ARN");
            OldLoadBalancer::present(LoadBalancerRef::named(name))
        }
    }
}

/// Wait for `service` to be fronted by a replacement for `old`.
///
/// `old` is used as given; nothing is described to fill in its ARN.
pub async fn verify_recreation<P, R>(
    provider: &P,
    resolver: &R,
    service: &ServiceRef,
    old: impl Into<OldLoadBalancer>,
    config: &RecreationConfig,
    cancel: &CancellationToken,
) -> RecreationVerdict
where
    P: LoadBalancerProvider,
    R: ServiceResolver,
{
    let old = old.into();
    let old_ref = old.lb.clone();
    let mut poller = RecreationPoller::new(provider, resolver, service.clone(), old, config.clone());
    let error = poller.run(cancel).await.err().map(|e| e.to_string());

    RecreationVerdict {
        service: service.clone(),
        old: old_ref,
        state: poller.state().clone(),
        error,
    }
}

/// Name of the load balancer currently fronting `service`
pub async fn resolve_service_load_balancer<R: ServiceResolver>(
    resolver: &R,
    service: &ServiceRef,
) -> Result<String> {
    let Some(lb_name) = resolver
        .resolve_load_balancer(&service.namespace, &service.name)
        .await
        .with_context(|| format!("Failed to resolve load balancer for service {service}"))?
    else {
        bail!("service {service} has no load balancer");
    };
    info!(service = %service, lb_name = %lb_name, "Resolved load balancer for service");
    Ok(lb_name)
}

/// Tear down the service's load balancer and verify recreation.
///
/// `lb_name` is the teardown target when the caller already resolved it;
/// otherwise the service is resolved here. Recreation is skipped when
/// teardown is fatal or cancelled. The old identity handed to the poller
/// is exactly what teardown pinned, never a fresh describe.
pub async fn run_cycle<P, R>(
    provider: &P,
    resolver: &R,
    config: &RunConfig,
    lb_name: Option<&str>,
    orphans: &[SecurityGroupRef],
    cancel: &CancellationToken,
) -> Result<RunReport>
where
    P: LoadBalancerProvider,
    R: ServiceResolver,
{
    let mut report = RunReport::start();
    let service = &config.service;

    let lb_name = match lb_name {
        Some(name) => name.to_string(),
        None => resolve_service_load_balancer(resolver, service).await?,
    };

    let outcome = TeardownOrchestrator::new(provider, config.teardown.clone())
        .run(&lb_name, orphans, cancel)
        .await;
    let old = if outcome.absent_at_start {
        OldLoadBalancer::gone(outcome.load_balancer.clone())
    } else {
        OldLoadBalancer::present(outcome.load_balancer.clone())
    };
    let proceed = !outcome.is_fatal() && !outcome.cancelled;
    report.teardown = Some(outcome);

    if proceed {
        let verdict =
            verify_recreation(provider, resolver, service, old, &config.recreation, cancel).await;
        if matches!(verdict.state, RecreationState::Confirmed(_)) {
            info!(service = %service, "Recreation confirmed");
        }
        report.recreation = Some(verdict);
    }

    report.finish();
    Ok(report)
}
