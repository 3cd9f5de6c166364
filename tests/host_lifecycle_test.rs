//! 服务宿主生命周期集成测试
//!
//! 使用假服务 / 假进程监控 / 假触发器驱动状态机，计时器为真实的短时间

use async_trait::async_trait;
use flare_service_host::discovery::{DeploymentIdentifier, DiscoveryClient};
use flare_service_host::error::{ErrorCode, HostError};
use flare_service_host::runtime::{
    ConsoleOutputMode, HostContext, HostState, HostedService, ProcessMonitor, ServiceArguments,
    ServiceHost, StopResult, StopTrigger,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

#[derive(Clone, Default)]
struct FakeService {
    start_delay: Duration,
    stop_delay: Duration,
    fail_start: bool,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    last_context: Arc<Mutex<Option<HostContext>>>,
}

impl FakeService {
    fn with_stop_delay(delay: Duration) -> Self {
        Self {
            stop_delay: delay,
            ..Default::default()
        }
    }

    fn with_start_delay(delay: Duration) -> Self {
        Self {
            start_delay: delay,
            ..Default::default()
        }
    }

    fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }

    fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    fn discovery(&self) -> Option<Arc<DiscoveryClient>> {
        self.last_context.lock().as_ref().map(|ctx| ctx.discovery.clone())
    }
}

#[async_trait]
impl HostedService for FakeService {
    async fn on_start(&self, ctx: &HostContext) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock() = Some(ctx.clone());
        tokio::time::sleep(self.start_delay).await;
        if self.fail_start {
            anyhow::bail!("database unreachable");
        }
        Ok(())
    }

    async fn on_stop(&self) -> anyhow::Result<()> {
        tokio::time::sleep(self.stop_delay).await;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 进程表由测试控制的进程监控
#[derive(Default)]
struct FakeProcessMonitor {
    alive: Mutex<HashSet<u32>>,
}

impl FakeProcessMonitor {
    fn with_process(pid: u32) -> Arc<Self> {
        let monitor = Self::default();
        monitor.alive.lock().insert(pid);
        Arc::new(monitor)
    }

    fn kill(&self, pid: u32) {
        self.alive.lock().remove(&pid);
    }
}

#[async_trait]
impl ProcessMonitor for FakeProcessMonitor {
    fn exists(&self, pid: u32) -> bool {
        self.alive.lock().contains(&pid)
    }

    async fn wait_for_exit(&self, pid: u32) {
        while self.exists(pid) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// 由测试手动触发的停止触发器
struct ManualTrigger {
    fired: Arc<Notify>,
}

#[async_trait]
impl StopTrigger for ManualTrigger {
    async fn wait(&self) {
        self.fired.notified().await;
    }
}

fn args() -> ServiceArguments {
    ServiceArguments::new()
        .with_console_output(ConsoleOutputMode::Plain)
        .with_drain_timeout_seconds(1)
}

fn spawn_run(host: &ServiceHost, args: ServiceArguments) -> JoinHandle<Result<StopResult, HostError>> {
    let host = host.clone();
    tokio::spawn(async move { host.run(args).await })
}

async fn wait_until_running(host: &ServiceHost) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while host.state() != HostState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("host should reach Running");
}

async fn join(run: JoinHandle<Result<StopResult, HostError>>) -> Result<StopResult, HostError> {
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should finish")
        .expect("run task should not panic")
}

#[tokio::test]
async fn stop_before_run_is_invalid() {
    let host = ServiceHost::new(FakeService::default());
    let err = assert_err!(host.stop());
    assert!(matches!(err, HostError::InvalidOperation(_)));
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
}

#[tokio::test]
async fn only_first_stop_succeeds() {
    let host = ServiceHost::new(FakeService::default());
    let run = spawn_run(&host, args());
    wait_until_running(&host).await;

    assert_ok!(host.stop());
    assert!(matches!(assert_err!(host.stop()), HostError::InvalidOperation(_)));
    assert!(matches!(assert_err!(host.stop()), HostError::InvalidOperation(_)));

    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
    assert_eq!(host.state(), HostState::Stopped);
    assert_eq!(host.exit_code(), 0);
    assert!(matches!(assert_err!(host.stop()), HostError::InvalidOperation(_)));
}

#[tokio::test]
async fn started_resolves_before_stopped() {
    let host = ServiceHost::new(FakeService::default());
    let started = host.wait_for_service_started();
    let stopped = host.wait_for_service_gracefully_stopped();
    tokio::pin!(stopped);

    let run = spawn_run(&host, args());
    assert!(tokio::time::timeout(Duration::from_secs(2), started).await.expect("started"));
    assert_eq!(host.state(), HostState::Running);

    assert!(tokio::time::timeout(Duration::from_millis(50), &mut stopped).await.is_err());

    assert_ok!(host.stop());
    assert_eq!(stopped.await, StopResult::Graceful);
    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
}

#[tokio::test]
async fn slow_stop_hook_is_forced_after_deadline() {
    let host = ServiceHost::new(FakeService::with_stop_delay(Duration::from_secs(2)));
    let run = spawn_run(&host, args());
    wait_until_running(&host).await;

    let begin = tokio::time::Instant::now();
    assert_ok!(host.stop());
    assert_eq!(assert_ok!(join(run).await), StopResult::Force);
    assert!(begin.elapsed() < Duration::from_millis(1900));
    assert_eq!(host.state(), HostState::Stopped);
}

#[tokio::test]
async fn quick_stop_hook_is_graceful() {
    let service = FakeService::with_stop_delay(Duration::from_millis(100));
    let host = ServiceHost::new(service.clone());
    let run = spawn_run(&host, args());
    wait_until_running(&host).await;

    assert_ok!(host.stop());
    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
    assert_eq!(service.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pre_stop_wait_extends_the_deadline() {
    let host = ServiceHost::new(FakeService::with_stop_delay(Duration::from_millis(1500)));
    let run = spawn_run(&host, args().with_pre_stop_wait_seconds(1));
    wait_until_running(&host).await;

    assert_ok!(host.stop());
    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
}

#[tokio::test]
async fn missing_monitored_process_aborts_before_start() {
    let service = FakeService::default();
    let host = ServiceHost::builder(service.clone())
        .with_process_monitor(Arc::new(FakeProcessMonitor::default()))
        .build();
    let started = host.wait_for_service_started();
    let stopped = host.wait_for_service_gracefully_stopped();

    let err = assert_err!(host.run(args().with_process_id_to_wait_for(4242)).await);
    assert!(matches!(err, HostError::MonitoredProcessNotFound(4242)));
    assert_eq!(host.exit_code(), 1);
    assert_eq!(stopped.await, StopResult::None);
    assert!(!started.await);
    assert_eq!(service.starts(), 0);
    assert_eq!(host.state(), HostState::Stopped);
}

#[tokio::test]
async fn monitored_process_exit_stops_the_service() {
    let monitor = FakeProcessMonitor::with_process(77);
    let host = ServiceHost::builder(FakeService::default())
        .with_process_monitor(monitor.clone())
        .build();
    let run = spawn_run(&host, args().with_process_id_to_wait_for(77));
    wait_until_running(&host).await;

    monitor.kill(77);
    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
    assert_eq!(host.exit_code(), 0);
}

#[tokio::test]
async fn monitored_process_exit_during_start_stops_once_started() {
    let monitor = FakeProcessMonitor::with_process(78);
    let service = FakeService::with_start_delay(Duration::from_millis(200));
    let host = ServiceHost::builder(service.clone())
        .with_process_monitor(monitor.clone())
        .build();
    let started = host.wait_for_service_started();
    let run = spawn_run(&host, args().with_process_id_to_wait_for(78));

    tokio::time::timeout(Duration::from_secs(1), async {
        while host.state() != HostState::Starting {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("host should reach Starting");
    monitor.kill(78);

    assert!(started.await);
    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
    assert_eq!(service.stops.load(Ordering::SeqCst), 1);
    assert_eq!(host.state(), HostState::Stopped);
    assert_eq!(host.exit_code(), 0);
}

#[tokio::test]
async fn waiters_outlive_the_host() {
    let (started, stopped) = {
        let host = ServiceHost::new(FakeService::default());
        (host.wait_for_service_started(), host.wait_for_service_gracefully_stopped())
    };
    assert!(!started.await);
    assert_eq!(stopped.await, StopResult::None);
}

#[tokio::test]
async fn host_can_run_again_after_stop() {
    let service = FakeService::default();
    let host = ServiceHost::new(service.clone());

    for round in 1..=2 {
        let run = spawn_run(&host, args());
        wait_until_running(&host).await;
        assert_ok!(host.stop());
        assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
        assert_eq!(service.starts(), round);
    }
}

#[tokio::test]
async fn failed_start_hook_returns_to_stopped() {
    let service = FakeService::failing_start();
    let host = ServiceHost::new(service.clone());
    let stopped = host.wait_for_service_gracefully_stopped();

    let err = assert_err!(host.run(args()).await);
    assert!(matches!(err, HostError::StartFailed(_)));
    assert_eq!(err.code(), ErrorCode::StartFailed);
    assert_eq!(host.exit_code(), 1);
    assert_eq!(stopped.await, StopResult::None);
    assert_eq!(host.state(), HostState::Stopped);
    assert!(service.discovery().expect("context captured").is_disposed());
    assert_err!(host.stop());
}

#[tokio::test]
async fn run_rejected_while_running() {
    let host = ServiceHost::new(FakeService::default());
    let run = spawn_run(&host, args());
    wait_until_running(&host).await;

    assert!(matches!(
        assert_err!(host.run(args()).await),
        HostError::InvalidOperation(_)
    ));

    assert_ok!(host.stop());
    assert_ok!(join(run).await);
}

#[tokio::test]
async fn crash_stops_and_disposes_the_host() {
    let host = ServiceHost::new(FakeService::default());
    let run = spawn_run(&host, args().with_crash_wait_seconds(2));
    wait_until_running(&host).await;

    host.on_crash().await;

    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
    assert_eq!(host.state(), HostState::Crashed);
    assert_eq!(host.exit_code(), 1);
    assert!(host.is_disposed());
    assert!(matches!(
        assert_err!(host.run(args()).await),
        HostError::InvalidOperation(_)
    ));
}

#[tokio::test]
async fn dispose_is_idempotent() {
    let host = ServiceHost::new(FakeService::default());
    host.dispose();
    host.dispose();
    assert!(host.is_disposed());
    assert_err!(host.run(args()).await);
}

#[tokio::test]
async fn stop_trigger_requests_stop() {
    let fired = Arc::new(Notify::new());
    let host = ServiceHost::builder(FakeService::default())
        .with_stop_trigger(Arc::new(ManualTrigger { fired: fired.clone() }))
        .build();
    let run = spawn_run(&host, args());
    wait_until_running(&host).await;

    fired.notify_one();
    assert_eq!(assert_ok!(join(run).await), StopResult::Graceful);
}

#[tokio::test]
async fn start_hook_receives_identity_and_discovery() {
    let service = FakeService::default();
    let host = ServiceHost::builder(service.clone())
        .with_name("orders")
        .with_version("2.1.0")
        .build();
    let run = spawn_run(&host, args().with_instance_name("orders-a"));
    wait_until_running(&host).await;

    let identity = host.identity().expect("identity initialized");
    assert_eq!(identity.name, "orders");
    assert_eq!(identity.instance_name, "orders-a");
    assert_eq!(identity.version, "2.1.0");

    let discovery = service.discovery().expect("context captured");
    let lb = assert_ok!(discovery.load_balancer(&DeploymentIdentifier::new("billing")));
    assert_ok!(lb.pick_node().await);

    assert_ok!(host.stop());
    assert_ok!(join(run).await);
    assert!(discovery.is_disposed());
}
