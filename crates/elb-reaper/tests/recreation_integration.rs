//! Recreation verification and the full teardown-then-verify cycle
//! against an in-memory cloud.

use elb_reaper::config::{AwsConfig, RecreationConfig, RunConfig, TeardownConfig};
use elb_reaper::cycle::{run_cycle, verify_recreation};
use elb_reaper::error::RecreationError;
use elb_reaper::recreation::{RecreationPoller, RecreationState};
use elb_reaper::report::OutputFormat;
use elb_reaper::wait::PollConfig;
use elb_reaper_common::{LoadBalancerRef, SecurityGroupRef, ServiceRef};
use elb_reaper_test_utils::fake::ResolverStep;
use elb_reaper_test_utils::{Call, FakeCloud};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "openshift-ingress";
const SERVICE: &str = "router-default";

fn fast_poll(timeout_ms: u64) -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(10),
        timeout: Duration::from_millis(timeout_ms),
        call_timeout: Duration::from_millis(100),
    }
}

fn run_config() -> RunConfig {
    RunConfig {
        aws: AwsConfig::default(),
        service: ServiceRef::new(NAMESPACE, SERVICE),
        teardown: TeardownConfig {
            absence_wait: fast_poll(500),
            delete_load_balancer: false,
        },
        recreation: RecreationConfig {
            poll: fast_poll(500),
        },
    }
}

fn name(n: &str) -> ResolverStep {
    ResolverStep::Name(n.to_string())
}

#[tokio::test]
async fn test_never_confirms_while_old_is_describable() {
    let cloud = FakeCloud::new();
    cloud
        .add_load_balancer("lb-old", "arn:lb/old")
        .add_load_balancer("lb-new", "arn:lb/new")
        .script_resolver(NAMESPACE, SERVICE, [name("lb-new")]);

    let mut poller = RecreationPoller::new(
        &cloud,
        &cloud,
        ServiceRef::new(NAMESPACE, SERVICE),
        LoadBalancerRef::resolved("lb-old", "arn:lb/old"),
        RecreationConfig { poll: fast_poll(100) },
    );

    for _ in 0..3 {
        assert_eq!(poller.tick().await, &RecreationState::WaitingNewLb);
    }
    let result = poller.run(&CancellationToken::new()).await;

    assert!(matches!(result, Err(RecreationError::TimedOut { .. })));
    assert_eq!(poller.state(), &RecreationState::TimedOut);
}

#[tokio::test]
async fn test_timed_out_when_no_replacement_appears() {
    let cloud = FakeCloud::new();
    cloud.script_resolver(NAMESPACE, SERVICE, [ResolverStep::Pending]);

    let verdict = verify_recreation(
        &cloud,
        &cloud,
        &ServiceRef::new(NAMESPACE, SERVICE),
        LoadBalancerRef::named("lb-old"),
        &RecreationConfig { poll: fast_poll(100) },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(verdict.state, RecreationState::TimedOut);
    assert_ne!(verdict.state, RecreationState::Confirmed(LoadBalancerRef::named("lb-new")));
    assert!(verdict.error.is_some());
}

#[tokio::test]
async fn test_confirms_after_lookup_errors_and_pending() {
    let cloud = FakeCloud::new();
    cloud
        .add_load_balancer("lb-new", "arn:lb/new")
        .script_resolver(
            NAMESPACE,
            SERVICE,
            [
                ResolverStep::Error("connection refused".to_string()),
                ResolverStep::Pending,
                name("lb-new"),
            ],
        );

    let verdict = verify_recreation(
        &cloud,
        &cloud,
        &ServiceRef::new(NAMESPACE, SERVICE),
        LoadBalancerRef::resolved("lb-old", "arn:lb/old"),
        &RecreationConfig { poll: fast_poll(500) },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(
        verdict.state,
        RecreationState::Confirmed(LoadBalancerRef::resolved("lb-new", "arn:lb/new"))
    );
    assert!(verdict.error.is_none());
}

#[tokio::test]
async fn test_reused_name_needs_new_arn() {
    let cloud = FakeCloud::new();
    // Same name, recreated under a new ARN
    cloud
        .add_load_balancer("lb-old", "arn:lb/second")
        .script_resolver(NAMESPACE, SERVICE, [name("lb-old")]);

    let verdict = verify_recreation(
        &cloud,
        &cloud,
        &ServiceRef::new(NAMESPACE, SERVICE),
        LoadBalancerRef::resolved("lb-old", "arn:lb/first"),
        &RecreationConfig { poll: fast_poll(200) },
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(
        verdict.state,
        RecreationState::Confirmed(LoadBalancerRef::resolved("lb-old", "arn:lb/second"))
    );
}

#[tokio::test]
async fn test_cancelled_verification() {
    let cloud = FakeCloud::new();
    cloud.script_resolver(NAMESPACE, SERVICE, [ResolverStep::Pending]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut poller = RecreationPoller::new(
        &cloud,
        &cloud,
        ServiceRef::new(NAMESPACE, SERVICE),
        LoadBalancerRef::named("lb-old"),
        RecreationConfig { poll: fast_poll(10_000) },
    );

    assert!(matches!(
        poller.run(&cancel).await,
        Err(RecreationError::Cancelled { .. })
    ));
}

#[tokio::test]
async fn test_end_to_end_cycle_confirms_replacement() {
    let cloud = FakeCloud::new();
    cloud
        .add_load_balancer("lb-old", "arn:lb/old")
        .add_listener("lb-old", "arn:listener/1")
        .add_listener("lb-old", "arn:listener/2")
        .add_target_group("lb-old", "arn:tg/1")
        .add_security_group("sg-1")
        .add_security_group("sg-2")
        .add_security_group("sg-3")
        .vanish_after("lb-old", 3)
        .add_load_balancer("lb-new", "arn:lb/new")
        // Initial lookup finds the old one, then the replacement
        .script_resolver(NAMESPACE, SERVICE, [name("lb-old"), name("lb-new")]);
    let orphans: Vec<SecurityGroupRef> =
        ["sg-1", "sg-2", "sg-3"].into_iter().map(SecurityGroupRef::new).collect();

    let report = run_cycle(&cloud, &cloud, &run_config(), None, &orphans, &CancellationToken::new())
        .await
        .unwrap();

    let teardown = report.teardown.as_ref().unwrap();
    assert_eq!(teardown.listeners.deleted, 2);
    assert_eq!(teardown.target_groups.deleted, 1);
    assert_eq!(teardown.security_groups.deleted, 3);
    assert!(teardown.warnings.is_empty(), "{:?}", teardown.warnings);

    let recreation = report.recreation.as_ref().unwrap();
    assert_eq!(
        recreation.state,
        RecreationState::Confirmed(LoadBalancerRef::resolved("lb-new", "arn:lb/new"))
    );
    assert_eq!(recreation.old, LoadBalancerRef::resolved("lb-old", "arn:lb/old"));
    assert!(!report.is_failure());
    assert!(report.render(OutputFormat::Table).unwrap().contains("CONFIRMED"));
}

#[tokio::test]
async fn test_cycle_skips_verification_after_fatal_teardown() {
    let cloud = FakeCloud::new();
    cloud
        .add_load_balancer("lb-old", "arn:lb/old")
        .add_listener("lb-old", "arn:listener/1")
        .fail_delete("arn:listener/1", 1)
        .script_resolver(NAMESPACE, SERVICE, [name("lb-old")]);

    let report = run_cycle(&cloud, &cloud, &run_config(), None, &[], &CancellationToken::new())
        .await
        .unwrap();

    assert!(report.teardown.as_ref().is_some_and(|t| t.is_fatal()));
    assert!(report.recreation.is_none());
    assert!(report.is_failure());
}

#[tokio::test]
async fn test_cycle_requires_a_load_balancer() {
    let cloud = FakeCloud::new();
    cloud.script_resolver(NAMESPACE, SERVICE, [ResolverStep::Pending]);

    let err = run_cycle(&cloud, &cloud, &run_config(), None, &[], &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("has no load balancer"));
}

#[tokio::test]
async fn test_cycle_after_absence_confirms_same_named_replacement() {
    // Gone before teardown starts, then recreated under the same name
    let cloud = FakeCloud::new();
    cloud
        .add_load_balancer("lb-old", "arn:lb/new")
        .add_target_group("lb-old", "arn:tg/new")
        .appear_after("lb-old", 1)
        .script_resolver(NAMESPACE, SERVICE, [name("lb-old")]);

    let report = run_cycle(&cloud, &cloud, &run_config(), None, &[], &CancellationToken::new())
        .await
        .unwrap();

    let teardown = report.teardown.as_ref().unwrap();
    assert!(teardown.absent_at_start);
    assert_eq!(teardown.target_groups.total(), 0);

    let recreation = report.recreation.as_ref().unwrap();
    assert_eq!(recreation.old, LoadBalancerRef::named("lb-old"));
    assert_eq!(
        recreation.state,
        RecreationState::Confirmed(LoadBalancerRef::resolved("lb-old", "arn:lb/new"))
    );
    assert!(recreation.error.is_none());
    assert!(cloud.delete_calls().is_empty());
    assert!(!report.is_failure());
}

#[tokio::test]
async fn test_cycle_tears_down_supplied_name() {
    let cloud = FakeCloud::new();
    cloud
        .add_load_balancer("lb-old", "arn:lb/old")
        .add_listener("lb-old", "arn:listener/1")
        .vanish_after("lb-old", 2)
        .add_load_balancer("lb-new", "arn:lb/new")
        .add_listener("lb-new", "arn:listener/new")
        // Already pointing at the replacement; only recreation may ask
        .script_resolver(NAMESPACE, SERVICE, [name("lb-new")]);

    let report = run_cycle(
        &cloud,
        &cloud,
        &run_config(),
        Some("lb-old"),
        &[],
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let calls = cloud.calls();
    assert_eq!(calls[0], Call::DescribeLoadBalancer("lb-old".to_string()));
    let first_resolve = calls
        .iter()
        .position(|c| matches!(c, Call::Resolve { .. }))
        .unwrap();
    let last_delete = calls
        .iter()
        .rposition(|c| c.deleted_kind().is_some())
        .unwrap();
    assert!(first_resolve > last_delete);

    assert_eq!(cloud.delete_calls(), vec![Call::DeleteListener("arn:listener/1".to_string())]);
    assert!(cloud.is_live("lb-new"));
    assert_eq!(
        report.recreation.as_ref().unwrap().state,
        RecreationState::Confirmed(LoadBalancerRef::resolved("lb-new", "arn:lb/new"))
    );
}
