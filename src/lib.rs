//! Flare Service Host
//!
//! Hosting runtime for microservices: a process lifecycle controller (start, graceful/forced
//! stop, crash handling, monitored-process watch) and client-side service discovery with
//! pluggable node sources, reachability checks and traffic routing strategies.

pub mod discovery;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use discovery::{
    AlwaysReachable, CallOutcome, ConfigNodeSource, DeploymentIdentifier, DiscoveryClient,
    DiscoveryConfig, HealthStatus, LoadBalancer, LocalNodeSource, Node, NodeSource,
    ProbingReachabilityCheck, ReachabilityCheck, TrafficRoutingStrategy,
};
pub use error::{DiscoveryError, DiscoveryResult, ErrorCategory, ErrorCode, HostError, HostResult};
pub use logging::init_logging;
pub use runtime::{
    HostContext, HostState, HostedService, ServiceArguments, ServiceHost, StartupMode, StopResult,
};
