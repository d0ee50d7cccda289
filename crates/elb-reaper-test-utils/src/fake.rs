//! In-memory cloud for driving the teardown pipeline in tests
//!
//! [`FakeCloud`] implements both [`LoadBalancerProvider`] and
//! [`ServiceResolver`] over a small mutable model of load balancers and
//! their dependents. Eventual consistency and failures are scripted per
//! resource, and every call is recorded so tests can assert on exactly what
//! the engine asked for.

use anyhow::{Result, anyhow};
use elb_reaper::aws::{AwsError, LoadBalancerProvider};
use elb_reaper::resolver::ServiceResolver;
use elb_reaper_common::{ListenerRef, LoadBalancerRef, ResourceKind, TargetGroupRef};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A recorded provider or resolver call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DescribeLoadBalancer(String),
    DescribeListeners(String),
    DeleteListener(String),
    DescribeTargetGroups(String),
    DeleteTargetGroup(String),
    DeleteSecurityGroup(String),
    DeleteLoadBalancer(String),
    Resolve { namespace: String, service: String },
}

impl Call {
    /// Resource class deleted by this call, if it is a delete
    pub fn deleted_kind(&self) -> Option<ResourceKind> {
        match self {
            Call::DeleteListener(_) => Some(ResourceKind::Listener),
            Call::DeleteTargetGroup(_) => Some(ResourceKind::TargetGroup),
            Call::DeleteSecurityGroup(_) => Some(ResourceKind::SecurityGroup),
            Call::DeleteLoadBalancer(_) => Some(ResourceKind::LoadBalancer),
            _ => None,
        }
    }
}

/// One scripted resolver answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverStep {
    /// The service is fronted by this load balancer
    Name(String),
    /// The service has no load balancer yet
    Pending,
    /// The lookup fails
    Error(String),
}

#[derive(Debug)]
struct FakeLoadBalancer {
    arn: String,
    listeners: Vec<String>,
    target_groups: Vec<String>,
    /// Describes that still see the load balancer before it disappears
    vanish_after: Option<u32>,
    /// Describes that miss the load balancer before it first shows up
    hidden_for: u32,
    /// Same-named successor swapped in after the given number of describes
    replacement: Option<Replacement>,
    gone: bool,
}

impl FakeLoadBalancer {
    fn new(arn: &str) -> Self {
        Self {
            arn: arn.to_string(),
            listeners: Vec::new(),
            target_groups: Vec::new(),
            vanish_after: None,
            hidden_for: 0,
            replacement: None,
            gone: false,
        }
    }

    fn is_live(&self) -> bool {
        !self.gone && self.hidden_for == 0
    }
}

#[derive(Debug)]
struct Replacement {
    after: u32,
    arn: String,
    target_groups: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    load_balancers: HashMap<String, FakeLoadBalancer>,
    security_groups: BTreeSet<String>,
    /// Target groups whose load balancer was replaced under them
    detached_target_groups: Vec<String>,
    /// Remaining injected failures per resource id
    failures: HashMap<String, u32>,
    /// Describes a deleted load balancer stays visible for
    linger_after_delete: u32,
    resolver: HashMap<(String, String), VecDeque<ResolverStep>>,
    calls: Vec<Call>,
}

impl State {
    fn take_failure(&mut self, id: &str) -> bool {
        match self.failures.get_mut(id) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn live_by_arn(&mut self, arn: &str) -> Option<&mut FakeLoadBalancer> {
        self.load_balancers
            .values_mut()
            .find(|lb| lb.arn == arn && lb.is_live())
    }
}

/// In-memory [`LoadBalancerProvider`] and [`ServiceResolver`]
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<State>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a live load balancer
    pub fn add_load_balancer(&self, name: &str, arn: &str) -> &Self {
        self.state()
            .load_balancers
            .insert(name.to_string(), FakeLoadBalancer::new(arn));
        self
    }

    /// Attach a listener to a load balancer added earlier
    pub fn add_listener(&self, lb_name: &str, arn: &str) -> &Self {
        if let Some(lb) = self.state().load_balancers.get_mut(lb_name) {
            lb.listeners.push(arn.to_string());
        }
        self
    }

    /// Associate a target group with a load balancer added earlier
    pub fn add_target_group(&self, lb_name: &str, arn: &str) -> &Self {
        if let Some(lb) = self.state().load_balancers.get_mut(lb_name) {
            lb.target_groups.push(arn.to_string());
        }
        self
    }

    pub fn add_security_group(&self, id: &str) -> &Self {
        self.state().security_groups.insert(id.to_string());
        self
    }

    /// The load balancer disappears on its own (as when the control plane
    /// deletes it) after `describes` more describe calls see it
    pub fn vanish_after(&self, lb_name: &str, describes: u32) -> &Self {
        if let Some(lb) = self.state().load_balancers.get_mut(lb_name) {
            lb.vanish_after = Some(describes);
        }
        self
    }

    /// The load balancer is not yet provisioned for the next `describes`
    /// describe calls
    pub fn appear_after(&self, lb_name: &str, describes: u32) -> &Self {
        if let Some(lb) = self.state().load_balancers.get_mut(lb_name) {
            lb.hidden_for = describes;
        }
        self
    }

    /// After `describes` more describe calls see it, the load balancer is
    /// recreated under the same name with `new_arn` and `target_groups`.
    /// Its old listeners go away; its old target groups stay deletable.
    pub fn replace_after(
        &self,
        lb_name: &str,
        describes: u32,
        new_arn: &str,
        target_groups: &[&str],
    ) -> &Self {
        if let Some(lb) = self.state().load_balancers.get_mut(lb_name) {
            lb.replacement = Some(Replacement {
                after: describes,
                arn: new_arn.to_string(),
                target_groups: target_groups.iter().map(|t| t.to_string()).collect(),
            });
        }
        self
    }

    /// Explicitly deleted load balancers stay visible for `describes` reads
    pub fn linger_after_delete(&self, describes: u32) -> &Self {
        self.state().linger_after_delete = describes;
        self
    }

    /// Make the next `times` deletes of `id` fail with a dependency error
    pub fn fail_delete(&self, id: &str, times: u32) -> &Self {
        self.state().failures.insert(id.to_string(), times);
        self
    }

    /// Script the resolver for a service; the last step repeats forever
    pub fn script_resolver(
        &self,
        namespace: &str,
        service: &str,
        steps: impl IntoIterator<Item = ResolverStep>,
    ) -> &Self {
        self.state().resolver.insert(
            (namespace.to_string(), service.to_string()),
            steps.into_iter().collect(),
        );
        self
    }

    /// Whether a describe would currently see the load balancer
    pub fn is_live(&self, lb_name: &str) -> bool {
        self.state()
            .load_balancers
            .get(lb_name)
            .is_some_and(FakeLoadBalancer::is_live)
    }

    /// Current ARN behind a name, if a describe would see one
    pub fn arn_of(&self, lb_name: &str) -> Option<String> {
        self.state()
            .load_balancers
            .get(lb_name)
            .filter(|lb| lb.is_live())
            .map(|lb| lb.arn.clone())
    }

    /// Whether a target group still exists, attached or not
    pub fn has_target_group(&self, arn: &str) -> bool {
        let state = self.state();
        state.detached_target_groups.iter().any(|t| t == arn)
            || state
                .load_balancers
                .values()
                .any(|lb| lb.target_groups.iter().any(|t| t == arn))
    }

    pub fn has_security_group(&self, id: &str) -> bool {
        self.state().security_groups.contains(id)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Delete calls only, in issue order
    pub fn delete_calls(&self) -> Vec<Call> {
        self.state()
            .calls
            .iter()
            .filter(|c| c.deleted_kind().is_some())
            .cloned()
            .collect()
    }

    /// Number of delete calls issued for a resource class
    pub fn delete_count(&self, kind: ResourceKind) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.deleted_kind() == Some(kind))
            .count()
    }
}

impl LoadBalancerProvider for FakeCloud {
    async fn describe_load_balancer(&self, name: &str) -> Result<Option<LoadBalancerRef>> {
        let mut state = self.state();
        state.calls.push(Call::DescribeLoadBalancer(name.to_string()));

        let state = &mut *state;
        let Some(lb) = state.load_balancers.get_mut(name) else {
            return Ok(None);
        };
        if lb.gone {
            return Ok(None);
        }
        if lb.hidden_for > 0 {
            lb.hidden_for -= 1;
            return Ok(None);
        }
        if lb.replacement.as_ref().is_some_and(|r| r.after == 0) {
            if let Some(replacement) = lb.replacement.take() {
                lb.arn = replacement.arn;
                lb.listeners.clear();
                state.detached_target_groups.append(&mut lb.target_groups);
                lb.target_groups = replacement.target_groups;
            }
        } else if let Some(replacement) = lb.replacement.as_mut() {
            replacement.after -= 1;
        }
        if let Some(remaining) = lb.vanish_after.as_mut() {
            if *remaining == 0 {
                lb.gone = true;
                lb.listeners.clear();
                return Ok(None);
            }
            *remaining -= 1;
        }
        Ok(Some(LoadBalancerRef::resolved(name, lb.arn.clone())))
    }

    async fn describe_listeners(&self, lb_arn: &str) -> Result<Vec<ListenerRef>> {
        let mut state = self.state();
        state.calls.push(Call::DescribeListeners(lb_arn.to_string()));

        let lb = state
            .live_by_arn(lb_arn)
            .ok_or_else(|| AwsError::not_found("load-balancer", lb_arn))?;
        Ok(lb
            .listeners
            .iter()
            .map(|arn| ListenerRef::new(arn.as_str(), lb_arn))
            .collect())
    }

    async fn delete_listener(&self, listener_arn: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteListener(listener_arn.to_string()));

        if state.take_failure(listener_arn) {
            return Err(anyhow!("AccessDenied: not authorized to delete {listener_arn}"));
        }
        let owner = state
            .load_balancers
            .values_mut()
            .find(|lb| lb.is_live() && lb.listeners.iter().any(|l| l == listener_arn))
            .ok_or_else(|| AwsError::not_found("listener", listener_arn))?;
        owner.listeners.retain(|l| l != listener_arn);
        Ok(())
    }

    async fn describe_target_groups(&self, lb_arn: &str) -> Result<Vec<TargetGroupRef>> {
        let mut state = self.state();
        state.calls.push(Call::DescribeTargetGroups(lb_arn.to_string()));

        let lb = state
            .live_by_arn(lb_arn)
            .ok_or_else(|| AwsError::not_found("load-balancer", lb_arn))?;
        Ok(lb
            .target_groups
            .iter()
            .map(|arn| TargetGroupRef::new(arn.as_str()))
            .collect())
    }

    async fn delete_target_group(&self, target_group_arn: &str) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(Call::DeleteTargetGroup(target_group_arn.to_string()));

        if state.take_failure(target_group_arn) {
            return Err(AwsError::ResourceInUse.into());
        }
        if let Some(pos) = state
            .detached_target_groups
            .iter()
            .position(|t| t == target_group_arn)
        {
            state.detached_target_groups.remove(pos);
            return Ok(());
        }
        let owner = state
            .load_balancers
            .values_mut()
            .find(|lb| lb.target_groups.iter().any(|t| t == target_group_arn))
            .ok_or_else(|| AwsError::not_found("target-group", target_group_arn))?;
        owner.target_groups.retain(|t| t != target_group_arn);
        Ok(())
    }

    async fn delete_security_group(&self, security_group_id: &str) -> Result<()> {
        let mut state = self.state();
        state
            .calls
            .push(Call::DeleteSecurityGroup(security_group_id.to_string()));

        if state.take_failure(security_group_id) {
            return Err(AwsError::DependencyViolation.into());
        }
        if !state.security_groups.remove(security_group_id) {
            return Err(AwsError::not_found("security-group", security_group_id).into());
        }
        Ok(())
    }

    async fn delete_load_balancer(&self, lb_arn: &str) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::DeleteLoadBalancer(lb_arn.to_string()));

        if state.take_failure(lb_arn) {
            return Err(AwsError::ResourceInUse.into());
        }
        let linger = state.linger_after_delete;
        let lb = state
            .live_by_arn(lb_arn)
            .ok_or_else(|| AwsError::not_found("load-balancer", lb_arn))?;
        lb.listeners.clear();
        if linger == 0 {
            lb.gone = true;
        } else {
            lb.vanish_after = Some(linger);
        }
        Ok(())
    }
}

impl ServiceResolver for FakeCloud {
    async fn resolve_load_balancer(
        &self,
        namespace: &str,
        service: &str,
    ) -> Result<Option<String>> {
        let mut state = self.state();
        state.calls.push(Call::Resolve {
            namespace: namespace.to_string(),
            service: service.to_string(),
        });

        let Some(steps) = state
            .resolver
            .get_mut(&(namespace.to_string(), service.to_string()))
        else {
            return Ok(None);
        };
        let step = if steps.len() > 1 {
            steps.pop_front()
        } else {
            steps.front().cloned()
        };

        match step {
            Some(ResolverStep::Name(name)) => Ok(Some(name)),
            Some(ResolverStep::Pending) | None => Ok(None),
            Some(ResolverStep::Error(message)) => Err(anyhow!(message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elb_reaper::aws::classify_anyhow_error;

    #[tokio::test]
    async fn test_vanish_after_describes() {
        let cloud = FakeCloud::new();
        cloud.add_load_balancer("lb", "arn:lb").vanish_after("lb", 1);

        assert!(cloud.describe_load_balancer("lb").await.unwrap().is_some());
        assert!(cloud.describe_load_balancer("lb").await.unwrap().is_none());
        assert!(!cloud.is_live("lb"));
    }

    #[tokio::test]
    async fn test_appear_after_describes() {
        let cloud = FakeCloud::new();
        cloud.add_load_balancer("lb", "arn:lb").appear_after("lb", 1);

        assert!(!cloud.is_live("lb"));
        assert!(cloud.describe_load_balancer("lb").await.unwrap().is_none());
        assert_eq!(
            cloud.describe_load_balancer("lb").await.unwrap(),
            Some(LoadBalancerRef::resolved("lb", "arn:lb"))
        );
    }

    #[tokio::test]
    async fn test_replace_after_swaps_arn_and_detaches_groups() {
        let cloud = FakeCloud::new();
        cloud
            .add_load_balancer("lb", "arn:lb/1")
            .add_listener("lb", "arn:listener/1")
            .add_target_group("lb", "arn:tg/1")
            .replace_after("lb", 1, "arn:lb/2", &["arn:tg/2"]);

        assert_eq!(
            cloud.describe_load_balancer("lb").await.unwrap(),
            Some(LoadBalancerRef::resolved("lb", "arn:lb/1"))
        );
        assert_eq!(
            cloud.describe_load_balancer("lb").await.unwrap(),
            Some(LoadBalancerRef::resolved("lb", "arn:lb/2"))
        );
        assert!(cloud.describe_listeners("arn:lb/2").await.unwrap().is_empty());
        assert_eq!(
            cloud.describe_target_groups("arn:lb/2").await.unwrap(),
            vec![TargetGroupRef::new("arn:tg/2")]
        );

        // The old group is orphaned but still exists
        assert!(cloud.has_target_group("arn:tg/1"));
        cloud.delete_target_group("arn:tg/1").await.unwrap();
        assert!(!cloud.has_target_group("arn:tg/1"));
        assert!(cloud.has_target_group("arn:tg/2"));
    }

    #[tokio::test]
    async fn test_injected_failure_then_success() {
        let cloud = FakeCloud::new();
        cloud
            .add_load_balancer("lb", "arn:lb")
            .add_target_group("lb", "arn:tg")
            .fail_delete("arn:tg", 1);

        assert!(cloud.delete_target_group("arn:tg").await.is_err());
        cloud.delete_target_group("arn:tg").await.unwrap();

        let err = cloud.delete_target_group("arn:tg").await.unwrap_err();
        assert!(classify_anyhow_error(&err).is_not_found());
        assert_eq!(cloud.delete_count(ResourceKind::TargetGroup), 3);
    }

    #[tokio::test]
    async fn test_resolver_script_repeats_last_step() {
        let cloud = FakeCloud::new();
        cloud.script_resolver(
            "ns",
            "svc",
            [
                ResolverStep::Error("boom".to_string()),
                ResolverStep::Name("lb-new".to_string()),
            ],
        );

        assert!(cloud.resolve_load_balancer("ns", "svc").await.is_err());
        for _ in 0..2 {
            assert_eq!(
                cloud.resolve_load_balancer("ns", "svc").await.unwrap().as_deref(),
                Some("lb-new")
            );
        }
        assert_eq!(cloud.resolve_load_balancer("ns", "other").await.unwrap(), None);
    }
}
