//! 客户端服务发现与负载均衡模块
//!
//! 组件关系（自底向上）：
//! - `NodeSource`：枚举部署的候选实例
//! - `ReachabilityCheck`：判定节点当前是否可路由
//! - `TrafficRouter`：从候选中选择一个节点
//! - `LoadBalancer`：为单个部署组合以上三者，持有实时视图
//! - `DiscoveryClient`：按键缓存负载均衡器

pub mod client;
pub mod config;
pub mod load_balancer;
pub mod node;
pub mod reachability;
pub mod source;
pub mod strategy;

pub use client::DiscoveryClient;
pub use config::{
    DeploymentConfig, DiscoveryConfig, ProbeProtocol, ReachabilityConfig, TrafficRoutingStrategy,
};
pub use load_balancer::{LoadBalancer, NodeSnapshot};
pub use node::{DeploymentIdentifier, Node};
pub use reachability::{
    AlwaysReachable, CallOutcome, HealthStatus, Prober, ProbingReachabilityCheck,
    ReachabilityCheck, TcpProber, TrackerId,
};
pub use source::{ConfigNodeSource, LocalNodeSource, NodeSource};
pub use strategy::TrafficRouter;
