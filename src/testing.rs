//! Test doubles and a loopback cluster builder shared by the module tests.

use crate::config::WorkManagerConfig;
use crate::error::{ChannelError, WorkError};
use crate::executor::types::Work;
use crate::executor::{LocalExecutor, OutcomeHook};
use crate::membership::types::NodeId;
use crate::transport::Transport;
use crate::transport::loopback::{LoopbackChannel, LoopbackNetwork};
use crate::transport::remote::RemoteTransport;
use crate::workmanager::manager::DistributedWorkManager;
use crate::workmanager::notification::NotificationListener;
use crate::workmanager::policy::Policy;
use crate::workmanager::selector::{ClusterView, Selector};
use crate::workmanager::statistics::Counter;

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Executor that counts submissions and runs nothing.
pub struct RecordingExecutor {
    pub do_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub schedule_calls: AtomicUsize,
    pub short_free: AtomicU64,
    pub long_free: AtomicU64,
    pub reject: AtomicBool,
    pub fail: AtomicBool,
    pub executed: Mutex<Vec<Work>>,
    delay: Mutex<Duration>,
    on_admission: Mutex<Option<AdmissionHook>>,
}

type AdmissionHook = Box<dyn Fn(&Work) + Send + Sync>;

impl RecordingExecutor {
    pub fn new(short_free: u64, long_free: u64) -> Arc<Self> {
        Arc::new(Self {
            do_calls: AtomicUsize::new(0),
            start_calls: AtomicUsize::new(0),
            schedule_calls: AtomicUsize::new(0),
            short_free: AtomicU64::new(short_free),
            long_free: AtomicU64::new(long_free),
            reject: AtomicBool::new(false),
            fail: AtomicBool::new(false),
            executed: Mutex::new(Vec::new()),
            delay: Mutex::new(Duration::ZERO),
            on_admission: Mutex::new(None),
        })
    }

    /// Every submission takes `delay` before it is admitted.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Runs `hook` whenever a submission reaches this executor.
    pub fn on_admission<F>(&self, hook: F)
    where
        F: Fn(&Work) + Send + Sync + 'static,
    {
        *self.on_admission.lock() = Some(Box::new(hook));
    }

    pub fn submissions(&self) -> usize {
        self.do_calls.load(Ordering::SeqCst)
            + self.start_calls.load(Ordering::SeqCst)
            + self.schedule_calls.load(Ordering::SeqCst)
    }

    async fn admit(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError> {
        if let Some(hook) = self.on_admission.lock().as_ref() {
            hook(&work);
        }

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.reject.load(Ordering::SeqCst) {
            return Err(WorkError::Rejected {
                reason: "test executor rejects everything".to_string(),
            });
        }

        self.executed.lock().push(work);
        let success = !self.fail.load(Ordering::SeqCst);
        on_complete(success);

        if success {
            Ok(())
        } else {
            Err(WorkError::Failed("test executor fails everything".to_string()))
        }
    }
}

#[async_trait]
impl LocalExecutor for RecordingExecutor {
    async fn do_work(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError> {
        self.do_calls.fetch_add(1, Ordering::SeqCst);
        self.admit(work, on_complete).await
    }

    async fn start_work(&self, work: Work, on_complete: OutcomeHook) -> Result<u64, WorkError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        // Outcome of a started work arrives through the hook only.
        match self.admit(work, on_complete).await {
            Err(WorkError::Failed(_)) | Ok(()) => Ok(0),
            Err(e) => Err(e),
        }
    }

    async fn schedule_work(&self, work: Work, on_complete: OutcomeHook) -> Result<(), WorkError> {
        self.schedule_calls.fetch_add(1, Ordering::SeqCst);
        match self.admit(work, on_complete).await {
            Err(WorkError::Failed(_)) | Ok(()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn short_running_free(&self) -> u64 {
        self.short_free.load(Ordering::SeqCst)
    }

    fn long_running_free(&self) -> u64 {
        self.long_free.load(Ordering::SeqCst)
    }
}

/// Policy with a fixed answer that counts how often it was asked.
pub struct CountingPolicy {
    answer: bool,
    pub calls: AtomicUsize,
}

impl CountingPolicy {
    pub fn new(answer: bool) -> Arc<Self> {
        Arc::new(Self {
            answer,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Policy for CountingPolicy {
    fn should_distribute(&self, _work: &Work) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

/// Selector that always names the same node and records cluster events.
pub struct FixedSelector {
    target: Option<NodeId>,
    pub calls: AtomicUsize,
    pub joins: Mutex<Vec<NodeId>>,
}

impl FixedSelector {
    pub fn new(target: Option<NodeId>) -> Arc<Self> {
        Arc::new(Self {
            target,
            calls: AtomicUsize::new(0),
            joins: Mutex::new(Vec::new()),
        })
    }
}

impl Selector for FixedSelector {
    fn select(&self, _local: &NodeId, _work: &Work, _cluster: &ClusterView<'_>) -> Option<NodeId> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.target.clone()
    }

    fn as_listener(self: Arc<Self>) -> Option<Arc<dyn NotificationListener>> {
        Some(self)
    }
}

impl NotificationListener for FixedSelector {
    fn join(&self, node: &NodeId) {
        self.joins.lock().push(node.clone());
    }
}

/// Transport that records dispatches instead of sending them.
#[derive(Default)]
pub struct MockTransport {
    pub dispatches: Mutex<Vec<(&'static str, NodeId)>>,
    pub deltas: Mutex<Vec<Counter>>,
    /// Capacity broadcasts in send order: `("short" | "long", node, free)`.
    pub capacity_updates: Mutex<Vec<(&'static str, NodeId, u64)>>,
    pub fail: AtomicBool,
    pub attached: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.lock().len()
    }

    fn dispatch(&self, op: &'static str, node: &NodeId) -> Result<(), WorkError> {
        self.dispatches.lock().push((op, node.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(WorkError::distribution(
                node,
                ChannelError::Unreachable(node.to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn attach(&self, _manager: Weak<DistributedWorkManager>) {
        self.attached.store(true, Ordering::SeqCst);
    }

    async fn start(&self) -> Result<(), WorkError> {
        Ok(())
    }

    async fn stop(&self) {}

    async fn ping(&self, _node: &NodeId) -> Result<Duration, WorkError> {
        Ok(Duration::ZERO)
    }

    async fn do_work(&self, node: &NodeId, _work: Work) -> Result<(), WorkError> {
        self.dispatch("do_work", node)
    }

    async fn start_work(&self, node: &NodeId, _work: Work) -> Result<u64, WorkError> {
        self.dispatch("start_work", node).map(|_| 0)
    }

    async fn schedule_work(&self, node: &NodeId, _work: Work) -> Result<(), WorkError> {
        self.dispatch("schedule_work", node)
    }

    async fn get_short_running_free(&self, _node: &NodeId) -> Result<u64, WorkError> {
        Ok(0)
    }

    async fn get_long_running_free(&self, _node: &NodeId) -> Result<u64, WorkError> {
        Ok(0)
    }

    fn update_short_running_free(&self, node: &NodeId, free: u64) {
        self.capacity_updates.lock().push(("short", node.clone(), free));
    }

    fn update_long_running_free(&self, node: &NodeId, free: u64) {
        self.capacity_updates.lock().push(("long", node.clone(), free));
    }

    fn send_delta(&self, _origin: &NodeId, counter: Counter) {
        self.deltas.lock().push(counter);
    }
}

/// One member of a loopback test cluster.
pub struct TestNode {
    pub manager: Arc<DistributedWorkManager>,
    pub executor: Arc<RecordingExecutor>,
    pub transport: Arc<RemoteTransport<LoopbackChannel>>,
}

impl TestNode {
    pub fn id(&self) -> &NodeId {
        self.manager.id()
    }
}

/// Builds, wires and starts one node per name on a shared loopback network.
pub async fn loopback_cluster(
    names: &[&str],
    timeout: Duration,
) -> (Arc<LoopbackNetwork>, Vec<TestNode>) {
    let network = LoopbackNetwork::new();
    let mut nodes = Vec::new();

    for name in names {
        let node = loopback_node(&network, name, timeout);
        node.manager.start().await.expect("loopback transport starts");
        nodes.push(node);
    }

    (network, nodes)
}

/// A wired but not yet started node.
pub fn loopback_node(network: &Arc<LoopbackNetwork>, name: &str, timeout: Duration) -> TestNode {
    let executor = RecordingExecutor::new(4, 2);
    let config = WorkManagerConfig {
        statistics_enabled: true,
        request_timeout: timeout,
    };
    let manager = DistributedWorkManager::new(NodeId::from(name), executor.clone(), config);
    let transport = RemoteTransport::new(network.channel(name), timeout);
    manager.set_transport(transport.clone());

    TestNode {
        manager,
        executor,
        transport,
    }
}

/// Polls `condition` until it holds or `within` elapses.
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
