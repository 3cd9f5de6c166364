//! 部署标识与节点定义

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 部署标识
///
/// 标识一组可互换的服务实例（服务名 + 环境 + 可用区），作为缓存键使用，
/// 比较与哈希均按值进行
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeploymentIdentifier {
    /// 服务名（如 "signaling-online"）
    pub service_name: String,

    /// 环境（如 "prod", "staging"）
    pub environment: Option<String>,

    /// 可用区（如 "us-east-1a"）
    pub zone: Option<String>,
}

impl DeploymentIdentifier {
    /// 创建只包含服务名的部署标识
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            environment: None,
            zone: None,
        }
    }

    /// 设置环境
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// 设置可用区
    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }
}

impl fmt::Display for DeploymentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.service_name)?;
        if let Some(env) = &self.environment {
            write!(f, "-{}", env)?;
        }
        if let Some(zone) = &self.zone {
            write!(f, "@{}", zone)?;
        }
        Ok(())
    }
}

/// 服务节点：一个实例的地址及元数据
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Node {
    /// 主机名或 IP
    pub hostname: String,

    /// 端口（可选，部分部署使用约定端口）
    pub port: Option<u16>,

    /// 自定义元数据
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl Node {
    /// 创建新的节点
    pub fn new(hostname: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            metadata: BTreeMap::new(),
        }
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 解析 `host[:port]` 形式的地址
    pub fn parse(address: &str) -> Option<Self> {
        let address = address.trim();
        if address.is_empty() {
            return None;
        }
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && !host.ends_with(':') => {
                let port = port.parse::<u16>().ok()?;
                Some(Self::new(host, Some(port)))
            }
            Some(_) => None,
            None => Some(Self::new(address, None)),
        }
    }

    /// 转换为 HTTP URL
    pub fn to_http_url(&self) -> String {
        format!("http://{}", self)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}", self.hostname, port),
            None => write!(f, "{}", self.hostname),
        }
    }
}
