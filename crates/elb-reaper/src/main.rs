//! elb-reaper: tear down an AWS load balancer's dependents and verify that
//! the control plane recreates it.

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use elb_reaper::aws::{
    AwsContext, AwsProvider, FromAwsContext, SecurityGroupScanner, merge_security_groups,
};
use elb_reaper::config::{AwsConfig, RecreationConfig, RunConfig, TeardownConfig, validate_poll};
use elb_reaper::cycle::{
    locate_old_load_balancer, resolve_service_load_balancer, run_cycle, verify_recreation,
};
use elb_reaper::report::{OutputFormat, RunReport};
use elb_reaper::resolver::KubeServiceResolver;
use elb_reaper::teardown::TeardownOrchestrator;
use elb_reaper::wait::PollConfig;
use elb_reaper_common::defaults::{
    DEFAULT_ABSENCE_TIMEOUT_SECS, DEFAULT_CALL_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_RECREATE_TIMEOUT_SECS, DEFAULT_REGION,
};
use elb_reaper_common::{SecurityGroupRef, ServiceRef};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "elb-reaper")]
#[command(about = "Ordered AWS load balancer teardown and recreation verification")]
#[command(version)]
struct Args {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

/// Flags shared by every subcommand
#[derive(clap::Args, Debug)]
struct GlobalArgs {
    /// AWS region
    #[arg(long, global = true, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use (overrides AWS_PROFILE env var)
    #[arg(long, global = true, env = "AWS_PROFILE")]
    aws_profile: Option<String>,

    /// Seconds between polls while waiting
    #[arg(long, global = true, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    poll_interval_secs: u64,

    /// Seconds to wait for the old load balancer to disappear
    #[arg(long, global = true, default_value_t = DEFAULT_ABSENCE_TIMEOUT_SECS)]
    absence_timeout_secs: u64,

    /// Seconds to wait for a replacement load balancer
    #[arg(long, global = true, default_value_t = DEFAULT_RECREATE_TIMEOUT_SECS)]
    recreate_timeout_secs: u64,

    /// Upper bound in seconds on a single AWS call
    #[arg(long, global = true, default_value_t = DEFAULT_CALL_TIMEOUT_SECS)]
    call_timeout_secs: u64,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

impl GlobalArgs {
    fn aws(&self) -> AwsConfig {
        AwsConfig {
            region: self.region.clone(),
            profile: self.aws_profile.clone(),
        }
    }

    fn poll(&self, timeout_secs: u64) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(timeout_secs),
            call_timeout: Duration::from_secs(self.call_timeout_secs),
        }
    }

    fn teardown(&self, delete_load_balancer: bool) -> TeardownConfig {
        TeardownConfig {
            absence_wait: self.poll(self.absence_timeout_secs),
            delete_load_balancer,
        }
    }

    fn recreation(&self) -> RecreationConfig {
        RecreationConfig {
            poll: self.poll(self.recreate_timeout_secs),
        }
    }
}

/// Options controlling which security groups are deleted
#[derive(clap::Args, Debug)]
struct SecurityGroupArgs {
    /// Orphaned security group to delete after the load balancer's dependents (repeatable)
    #[arg(long = "security-group", value_name = "ID")]
    security_groups: Vec<String>,

    /// Also delete the security groups attached to the load balancer
    #[arg(long)]
    discover_security_groups: bool,

    /// Delete the load balancer itself after its target groups
    #[arg(long)]
    delete_load_balancer: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete a load balancer's listeners, target groups and security groups
    Teardown {
        /// Name of the load balancer to tear down
        #[arg(long)]
        load_balancer: String,

        #[command(flatten)]
        security_groups: SecurityGroupArgs,
    },

    /// Wait for a service's load balancer to be replaced
    Verify {
        /// Namespace of the Kubernetes service
        #[arg(long)]
        namespace: String,

        /// Name of the Kubernetes service
        #[arg(long)]
        service: String,

        /// Name of the load balancer that was torn down
        #[arg(long)]
        old_load_balancer: String,

        /// ARN of the old load balancer. Without it the name is described to
        /// pin one, which is wrong once a same-named replacement exists
        #[arg(long)]
        old_arn: Option<String>,
    },

    /// Tear down a service's load balancer, then verify it is recreated
    Run {
        /// Namespace of the Kubernetes service
        #[arg(long)]
        namespace: String,

        /// Name of the Kubernetes service
        #[arg(long)]
        service: String,

        #[command(flatten)]
        security_groups: SecurityGroupArgs,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            print_error(&e);
            std::process::exit(1);
        }
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

fn init_tracing() {
    // Reduce noise from the AWS SDK and kube (show only warnings and errors)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "info,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_ec2=warn,\
             aws_sdk_elasticloadbalancingv2=warn,kube_client=warn",
        )
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel the returned token on Ctrl+C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling");
            token.cancel();
        }
    });
    cancel
}

/// Returns whether the run succeeded
async fn run() -> Result<bool> {
    let args = Args::parse();
    init_tracing();

    let global = &args.global;
    let aws_config = global.aws();
    if aws_config.region.trim().is_empty() {
        bail!("--region cannot be empty");
    }
    if let Some(profile) = &aws_config.profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let aws = AwsContext::load(
        &aws_config.region,
        aws_config.profile.as_deref(),
        Some(Duration::from_secs(global.call_timeout_secs)),
    )
    .await;
    let provider = AwsProvider::from_context(&aws);
    let cancel = cancel_on_ctrl_c();

    let report = match args.command {
        Command::Teardown {
            load_balancer,
            security_groups,
        } => {
            if load_balancer.trim().is_empty() {
                bail!("--load-balancer cannot be empty");
            }
            let config = global.teardown(security_groups.delete_load_balancer);
            validate_poll(&config.absence_wait, "absence wait")?;

            let orphans = collect_security_groups(&aws, &load_balancer, &security_groups).await?;
            let mut report = RunReport::start();
            let outcome = TeardownOrchestrator::new(&provider, config)
                .run(&load_balancer, &orphans, &cancel)
                .await;
            report.teardown = Some(outcome);
            report.finish();
            report
        }

        Command::Verify {
            namespace,
            service,
            old_load_balancer,
            old_arn,
        } => {
            let config = RunConfig {
                aws: aws_config,
                service: ServiceRef::new(namespace, service),
                teardown: TeardownConfig::default(),
                recreation: global.recreation(),
            };
            config.validate()?;

            let resolver = KubeServiceResolver::try_default().await?;
            let old = locate_old_load_balancer(&provider, &old_load_balancer, old_arn).await;
            let mut report = RunReport::start();
            report.recreation = Some(
                verify_recreation(
                    &provider,
                    &resolver,
                    &config.service,
                    old,
                    &config.recreation,
                    &cancel,
                )
                .await,
            );
            report.finish();
            report
        }

        Command::Run {
            namespace,
            service,
            security_groups,
        } => {
            let config = RunConfig {
                aws: aws_config,
                service: ServiceRef::new(namespace, service),
                teardown: global.teardown(security_groups.delete_load_balancer),
                recreation: global.recreation(),
            };
            config.validate()?;

            let resolver = KubeServiceResolver::try_default().await?;
            let lb_name = resolve_service_load_balancer(&resolver, &config.service).await?;
            let orphans = collect_security_groups(&aws, &lb_name, &security_groups).await?;

            run_cycle(&provider, &resolver, &config, Some(&lb_name), &orphans, &cancel).await?
        }
    };

    println!("{}", report.render(global.format)?);
    Ok(!report.is_failure())
}

fn supplied_security_groups(args: &SecurityGroupArgs) -> Vec<SecurityGroupRef> {
    merge_security_groups([args
        .security_groups
        .iter()
        .map(|id| SecurityGroupRef::new(id.as_str()))
        .collect::<Vec<_>>()])
}

/// Caller-supplied security groups, plus the ones attached to the load
/// balancer when discovery is enabled
async fn collect_security_groups(
    aws: &AwsContext,
    lb_name: &str,
    args: &SecurityGroupArgs,
) -> Result<Vec<SecurityGroupRef>> {
    let supplied = supplied_security_groups(args);
    if !args.discover_security_groups {
        return Ok(supplied);
    }

    let attached = SecurityGroupScanner::from_context(aws).scan(lb_name).await?;
    info!(lb_name = %lb_name, count = attached.len(), "Discovered attached security groups");
    Ok(merge_security_groups([supplied, attached]))
}
