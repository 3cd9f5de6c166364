//! 服务宿主（进程级生命周期控制器）
//!
//! 状态：Stopped → Starting → Running → Stopping → Stopped；崩溃处理时以 Crashed 结束
//!
//! - 停止闸门：已触发 ⇔ 服务未在运行，每次运行在服务计为已启动前复位一次
//! - "已启动" / "已停止" 两个一次性信号在每次运行开始时重建
//! - 停止钩子在 `停止前等待 + 排空时间` 截止时间内完成为 Graceful，否则为 Force

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{ServiceArguments, StartupMode};
use super::console::Console;
use super::process::{ProcessMonitor, ProcfsProcessMonitor};
use super::service::{ApplicationIdentity, HostContext, HostedService};
use super::signal::{Completion, StopGate};
use super::trigger::{ConsoleStopTrigger, StopTrigger};
use crate::discovery::{ConfigNodeSource, DiscoveryClient, DiscoveryConfig, LocalNodeSource, NodeSource};
use crate::error::{HostError, HostResult};

/// 宿主状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl fmt::Display for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HostState::Stopped => "stopped",
            HostState::Starting => "starting",
            HostState::Running => "running",
            HostState::Stopping => "stopping",
            HostState::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// 一次停止的最终结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopResult {
    /// 服务没有启动（启动前中止）
    None,
    /// 停止钩子在截止时间内完成
    Graceful,
    /// 停止钩子超时，强制停止
    Force,
}

impl fmt::Display for StopResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopResult::None => "none",
            StopResult::Graceful => "graceful",
            StopResult::Force => "force",
        };
        f.write_str(s)
    }
}

/// 单次运行的一次性信号
struct RunSignals {
    /// `true`：服务已启动；`false`：本次运行在启动前中止
    started: Completion<bool>,
    stopped: Completion<StopResult>,
}

impl RunSignals {
    fn new() -> Self {
        Self {
            started: Completion::new(),
            stopped: Completion::new(),
        }
    }

    fn is_used(&self) -> bool {
        self.started.is_resolved() || self.stopped.is_resolved()
    }
}

struct HostInner {
    service: Arc<dyn HostedService>,
    name: String,
    version: String,
    node_source: Option<Arc<dyn NodeSource>>,
    discovery_config: DiscoveryConfig,
    process_monitor: Arc<dyn ProcessMonitor>,
    stop_trigger: Option<Arc<dyn StopTrigger>>,

    state: Mutex<HostState>,
    gate: StopGate,
    signals: RwLock<Arc<RunSignals>>,
    exit_code: AtomicI32,
    identity: RwLock<Option<ApplicationIdentity>>,
    arguments: RwLock<Option<ServiceArguments>>,
    run_token: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    crashed: AtomicBool,
    disposed: AtomicBool,
}

impl HostInner {
    fn set_state(&self, state: HostState) {
        let mut current = self.state.lock();
        let from = *current;
        debug!(from = %from, to = %state, "Host state changed");
        *current = state;
    }

    fn request_stop(&self) -> HostResult<()> {
        if self.gate.signal() {
            info!(service = %self.name, "Stop requested");
            Ok(())
        } else {
            Err(HostError::invalid_operation("service is already stopped"))
        }
    }

    /// 上一次运行的信号已被使用时才重建，运行前的订阅者不会丢失
    fn renew_signals(&self) -> Arc<RunSignals> {
        let mut signals = self.signals.write();
        if signals.is_used() {
            *signals = Arc::new(RunSignals::new());
        }
        signals.clone()
    }

    fn release_run_resources(&self) {
        if let Some(token) = self.run_token.lock().take() {
            token.cancel();
        }
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.release_run_resources();
    }
}

/// 服务宿主构建器
pub struct ServiceHostBuilder {
    service: Arc<dyn HostedService>,
    name: String,
    version: String,
    node_source: Option<Arc<dyn NodeSource>>,
    discovery_config: DiscoveryConfig,
    process_monitor: Arc<dyn ProcessMonitor>,
    stop_trigger: Option<Arc<dyn StopTrigger>>,
}

impl ServiceHostBuilder {
    /// 设置应用名称
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 设置应用版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 设置发现客户端使用的节点源
    pub fn with_node_source(mut self, source: Arc<dyn NodeSource>) -> Self {
        self.node_source = Some(source);
        self
    }

    /// 设置服务发现配置
    ///
    /// 未设置节点源且配置中有部署表时，使用 `ConfigNodeSource`
    pub fn with_discovery_config(mut self, config: DiscoveryConfig) -> Self {
        self.discovery_config = config;
        self
    }

    /// 设置进程监控实现
    pub fn with_process_monitor(mut self, monitor: Arc<dyn ProcessMonitor>) -> Self {
        self.process_monitor = monitor;
        self
    }

    /// 设置外部停止触发器
    ///
    /// 服务模式下只有显式设置时才会启用；交互模式默认使用 `ConsoleStopTrigger`
    pub fn with_stop_trigger(mut self, trigger: Arc<dyn StopTrigger>) -> Self {
        self.stop_trigger = Some(trigger);
        self
    }

    pub fn build(self) -> ServiceHost {
        ServiceHost {
            inner: Arc::new(HostInner {
                service: self.service,
                name: self.name,
                version: self.version,
                node_source: self.node_source,
                discovery_config: self.discovery_config,
                process_monitor: self.process_monitor,
                stop_trigger: self.stop_trigger,
                state: Mutex::new(HostState::Stopped),
                gate: StopGate::new(),
                signals: RwLock::new(Arc::new(RunSignals::new())),
                exit_code: AtomicI32::new(0),
                identity: RwLock::new(None),
                arguments: RwLock::new(None),
                run_token: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                crashed: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        }
    }
}

/// 服务宿主
///
/// 克隆得到的是同一个宿主的句柄，可以在任意任务中调用 `stop()`
#[derive(Clone)]
pub struct ServiceHost {
    inner: Arc<HostInner>,
}

impl ServiceHost {
    /// 使用默认设置创建宿主
    pub fn new(service: impl HostedService) -> Self {
        Self::builder(service).build()
    }

    /// 创建宿主构建器
    pub fn builder(service: impl HostedService) -> ServiceHostBuilder {
        ServiceHostBuilder {
            service: Arc::new(service),
            name: "flare-service".to_string(),
            version: "0.1.0".to_string(),
            node_source: None,
            discovery_config: DiscoveryConfig::default(),
            process_monitor: Arc::new(ProcfsProcessMonitor::new()),
            stop_trigger: None,
        }
    }

    /// 运行服务，直到停止被请求并且停止钩子结束（或超时）
    ///
    /// 只能在 `Stopped` 状态调用
    pub async fn run(&self, args: ServiceArguments) -> HostResult<StopResult> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return Err(HostError::invalid_operation("service host has been disposed"));
        }
        {
            let mut state = inner.state.lock();
            if *state != HostState::Stopped {
                return Err(HostError::invalid_operation(format!(
                    "run() requires the host to be stopped, current state is {}",
                    *state
                )));
            }
            *state = HostState::Starting;
        }

        let signals = inner.renew_signals();
        inner.exit_code.store(0, Ordering::SeqCst);
        inner.crashed.store(false, Ordering::SeqCst);
        let console = Console::new(args.console_output);

        if let Err(e) = self.check_preconditions(&args) {
            return Err(self.abort_start(&signals, e));
        }

        let identity = ApplicationIdentity::new(&inner.name, &inner.version, &args);
        *inner.identity.write() = Some(identity.clone());
        *inner.arguments.write() = Some(args.clone());
        info!(
            service = %identity.name,
            instance = %identity.instance_name,
            version = %identity.version,
            run_id = %identity.run_id,
            "Starting service"
        );
        console.startup_banner(&identity);

        let token = CancellationToken::new();
        *inner.run_token.lock() = Some(token.clone());
        self.spawn_stop_sources(&args, &signals, &token, &console);

        let discovery = Arc::new(self.create_discovery_client());
        let ctx = HostContext {
            identity: identity.clone(),
            arguments: args.clone(),
            discovery: discovery.clone(),
        };

        if let Err(e) = inner.service.on_start(&ctx).await {
            inner.release_run_resources();
            discovery.dispose();
            return Err(self.abort_start(&signals, HostError::StartFailed(e)));
        }

        inner.gate.reset();
        if inner.disposed.load(Ordering::SeqCst) {
            inner.gate.signal();
        }
        inner.set_state(HostState::Running);
        signals.started.resolve(true);
        info!(service = %identity.name, instance = %identity.instance_name, "Service started");

        inner.gate.wait().await;

        inner.set_state(HostState::Stopping);
        let deadline = args.stop_deadline();
        info!(service = %identity.name, deadline_secs = deadline.as_secs_f64(), "Stopping service");
        let result = match tokio::time::timeout(deadline, inner.service.on_stop()).await {
            Ok(Ok(())) => StopResult::Graceful,
            Ok(Err(e)) => {
                warn!(service = %identity.name, error = %e, "Service stop hook returned an error");
                StopResult::Graceful
            }
            Err(_) => {
                warn!(
                    service = %identity.name,
                    deadline_secs = deadline.as_secs_f64(),
                    "Service stop hook did not finish before the deadline, forcing shutdown"
                );
                console.shutdown_timeout_warning(deadline);
                StopResult::Force
            }
        };

        inner.release_run_resources();
        discovery.dispose();

        let crashed = inner.crashed.load(Ordering::SeqCst);
        if crashed {
            inner.exit_code.store(1, Ordering::SeqCst);
            inner.set_state(HostState::Crashed);
        } else {
            inner.set_state(HostState::Stopped);
        }
        signals.stopped.resolve(result);

        console.shutdown_complete(&identity, result);
        info!(service = %identity.name, stop_result = ?result, crashed, "Service stopped");
        Ok(result)
    }

    /// 构建多线程 tokio 运行时并阻塞当前线程直到服务停止
    pub fn run_blocking(&self, args: ServiceArguments) -> HostResult<StopResult> {
        crate::logging::init_logging(args.console_output);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("service-host")
            .build()?;
        let result = runtime.block_on(self.run(args));
        runtime.shutdown_timeout(Duration::from_secs(1));
        result
    }

    /// 请求停止
    ///
    /// 宿主未在运行（包括已经请求过停止）时返回 `InvalidOperation`
    pub fn stop(&self) -> HostResult<()> {
        self.inner.request_stop()
    }

    /// 等待本次运行的服务启动
    ///
    /// 服务启动后返回 `true`；运行在启动前中止时返回 `false`
    pub fn wait_for_service_started(&self) -> impl Future<Output = bool> + Send + 'static + use<> {
        let signals = self.inner.signals.read().clone();
        let started = signals.started.wait();
        async move { started.await.unwrap_or(false) }
    }

    /// 等待本次运行结束，返回停止结果
    pub fn wait_for_service_gracefully_stopped(&self) -> impl Future<Output = StopResult> + Send + 'static + use<> {
        let signals = self.inner.signals.read().clone();
        let stopped = signals.stopped.wait();
        async move { stopped.await.unwrap_or(StopResult::None) }
    }

    pub fn state(&self) -> HostState {
        *self.inner.state.lock()
    }

    /// 进程退出码：启动前中止或崩溃时为 1
    pub fn exit_code(&self) -> i32 {
        self.inner.exit_code.load(Ordering::SeqCst)
    }

    /// 最近一次运行的应用标识
    pub fn identity(&self) -> Option<ApplicationIdentity> {
        self.inner.identity.read().clone()
    }

    /// 崩溃处理：请求停止，在有限时间内等待停止完成，然后释放宿主
    ///
    /// 尽力而为；超时后直接释放
    pub async fn on_crash(&self) {
        warn!(service = %self.inner.name, "Crash reported, stopping service");
        self.inner.crashed.store(true, Ordering::SeqCst);

        let stopped = self.wait_for_service_gracefully_stopped();
        if self.stop().is_ok() {
            let crash_wait = self
                .inner
                .arguments
                .read()
                .as_ref()
                .map(ServiceArguments::crash_wait)
                .unwrap_or_else(|| ServiceArguments::default().crash_wait());
            if tokio::time::timeout(crash_wait, stopped).await.is_err() {
                warn!(
                    service = %self.inner.name,
                    wait_secs = crash_wait.as_secs_f64(),
                    "Service did not stop after crash, disposing anyway"
                );
            }
        }

        self.dispose();
    }

    /// 释放宿主：触发停止闸门，取消后台任务（幂等）
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.gate.signal();
        self.inner.release_run_resources();
        info!(service = %self.inner.name, "Service host disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    fn check_preconditions(&self, args: &ServiceArguments) -> HostResult<()> {
        if cfg!(not(target_pointer_width = "64")) {
            return Err(HostError::UnsupportedRuntime);
        }
        if let Some(pid) = args.process_id_to_wait_for {
            if !self.inner.process_monitor.exists(pid) {
                return Err(HostError::MonitoredProcessNotFound(pid));
            }
        }
        Ok(())
    }

    /// 启动前中止：退出码 1，"已停止"以 None 完成，回到 Stopped
    fn abort_start(&self, signals: &RunSignals, err: HostError) -> HostError {
        error!(service = %self.inner.name, error = %err, code = %err.code(), "Service failed to start");
        self.inner.exit_code.store(1, Ordering::SeqCst);
        self.inner.set_state(HostState::Stopped);
        signals.started.resolve(false);
        signals.stopped.resolve(StopResult::None);
        err
    }

    fn create_discovery_client(&self) -> DiscoveryClient {
        let config = self.inner.discovery_config.clone();
        let source: Arc<dyn NodeSource> = match &self.inner.node_source {
            Some(source) => source.clone(),
            None if !config.deployments.is_empty() => Arc::new(ConfigNodeSource::new(config.clone())),
            None => Arc::new(LocalNodeSource::new()),
        };
        DiscoveryClient::new(source, config)
    }

    /// 启动被监控进程的退出监视和外部停止触发器
    ///
    /// 两者都在服务计为已启动之后才会调用 `stop()`
    fn spawn_stop_sources(
        &self,
        args: &ServiceArguments,
        signals: &RunSignals,
        token: &CancellationToken,
        console: &Console,
    ) {
        let mut tasks = self.inner.tasks.lock();

        if let Some(pid) = args.process_id_to_wait_for {
            let monitor = self.inner.process_monitor.clone();
            let exited = async move { monitor.wait_for_exit(pid).await };
            tasks.push(self.spawn_stop_source(
                format!("monitored process {pid} exited"),
                exited,
                signals,
                token,
            ));
        }

        let trigger = match args.startup_mode {
            StartupMode::Interactive => Some(
                self.inner
                    .stop_trigger
                    .clone()
                    .unwrap_or_else(|| Arc::new(ConsoleStopTrigger) as Arc<dyn StopTrigger>),
            ),
            StartupMode::Service => self.inner.stop_trigger.clone(),
        };
        if let Some(trigger) = trigger {
            if args.startup_mode == StartupMode::Interactive {
                if let Some(hint) = trigger.hint() {
                    console.interactive_hint(&hint);
                }
            }
            let requested = async move { trigger.wait().await };
            tasks.push(self.spawn_stop_source(
                "stop trigger fired".to_string(),
                requested,
                signals,
                token,
            ));
        }
    }

    fn spawn_stop_source<F>(
        &self,
        reason: String,
        source: F,
        signals: &RunSignals,
        token: &CancellationToken,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let host: Weak<HostInner> = Arc::downgrade(&self.inner);
        let started = signals.started.wait();
        let token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                started = async { source.await; started.await } => {
                    // 启动前中止的运行没有可停止的服务
                    if started != Some(true) {
                        return;
                    }
                    let Some(host) = host.upgrade() else { return };
                    info!(service = %host.name, reason = %reason, "Stopping service");
                    if let Err(e) = host.request_stop() {
                        debug!(reason = %reason, error = %e, "Stop request ignored");
                    }
                }
            }
        })
    }
}

impl fmt::Debug for ServiceHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceHost")
            .field("name", &self.inner.name)
            .field("version", &self.inner.version)
            .field("state", &self.state())
            .field("exit_code", &self.exit_code())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_result_display() {
        assert_eq!(StopResult::Graceful.to_string(), "graceful");
        assert_eq!(StopResult::Force.to_string(), "force");
        assert_eq!(HostState::Crashed.to_string(), "crashed");
    }

    #[test]
    fn signals_are_renewed_only_after_use() {
        let signals = RunSignals::new();
        assert!(!signals.is_used());
        signals.started.resolve(true);
        assert!(signals.is_used());
    }
}
