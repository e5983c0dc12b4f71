//! Distributed Work Manager
//!
//! Front door for work submission. Each submission is either run by the local
//! executor or handed to exactly one peer:
//!
//! 1. Non-distributable work, or a manager missing its policy, selector or
//!    transport, runs locally.
//! 2. The policy may keep the work local.
//! 3. The selector may find no peer (or name this node), which also runs it locally.
//! 4. Otherwise the matching transport operation is issued and its outcome is
//!    returned as is. A failed dispatch is never retried locally.
//!
//! The manager also owns the membership view and the capacity table, both fed
//! by the notifications the transport delivers, and relays every notification
//! to the registered listeners.

use super::capacity::{CapacityEntry, CapacityTable};
use super::notification::NotificationListener;
use super::policy::Policy;
use super::selector::{ClusterView, Selector};
use super::statistics::{Counter, ReplicatedStatistics};
use crate::config::WorkManagerConfig;
use crate::error::WorkError;
use crate::executor::types::Work;
use crate::executor::{LocalExecutor, OutcomeHook};
use crate::membership::types::NodeId;
use crate::membership::view::MembershipView;
use crate::transport::Transport;

use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub struct DistributedWorkManager {
    id: NodeId,
    config: WorkManagerConfig,
    executor: Arc<dyn LocalExecutor>,
    policy: RwLock<Option<Arc<dyn Policy>>>,
    selector: RwLock<Option<Arc<dyn Selector>>>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    listeners: RwLock<Vec<Arc<dyn NotificationListener>>>,
    members: MembershipView,
    capacity: CapacityTable,
    statistics: Arc<ReplicatedStatistics>,
    me: Weak<Self>,
}

impl DistributedWorkManager {
    pub fn new(
        id: NodeId,
        executor: Arc<dyn LocalExecutor>,
        config: WorkManagerConfig,
    ) -> Arc<Self> {
        let statistics = ReplicatedStatistics::new(id.clone(), config.statistics_enabled);

        let members = MembershipView::new();
        members.insert(&id);

        let capacity = CapacityTable::new();
        capacity.update_free(&id, executor.short_running_free(), executor.long_running_free());

        tracing::info!(
            "Work manager {} created (statistics {}, timeout {:?})",
            id,
            if config.statistics_enabled { "replicated" } else { "local only" },
            config.request_timeout
        );

        let listener: Arc<dyn NotificationListener> = statistics.clone();

        Arc::new_cyclic(|me| Self {
            id,
            config,
            executor,
            policy: RwLock::new(None),
            selector: RwLock::new(None),
            transport: RwLock::new(None),
            listeners: RwLock::new(vec![listener]),
            members,
            capacity,
            statistics,
            me: me.clone(),
        })
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn config(&self) -> &WorkManagerConfig {
        &self.config
    }

    pub fn request_timeout(&self) -> Duration {
        self.config.request_timeout
    }

    // ============================================================
    // CONFIGURATION
    // ============================================================

    pub fn set_policy(&self, policy: Arc<dyn Policy>) {
        if let Some(listener) = policy.clone().as_listener() {
            self.add_listener(listener);
        }
        *self.policy.write() = Some(policy);
    }

    pub fn set_selector(&self, selector: Arc<dyn Selector>) {
        if let Some(listener) = selector.clone().as_listener() {
            self.add_listener(listener);
        }
        *self.selector.write() = Some(selector);
    }

    /// Installs the transport, attaches this manager to it and routes the
    /// statistics deltas through it. Call [`start`](Self::start) afterwards.
    pub fn set_transport(&self, transport: Arc<dyn Transport>) {
        transport.attach(self.me.clone());
        self.statistics.set_transport(transport.clone());
        if let Some(listener) = transport.clone().as_listener() {
            self.add_listener(listener);
        }
        *self.transport.write() = Some(transport);
    }

    pub fn has_policy(&self) -> bool {
        self.policy.read().is_some()
    }

    pub fn has_selector(&self) -> bool {
        self.selector.read().is_some()
    }

    pub fn has_transport(&self) -> bool {
        self.transport.read().is_some()
    }

    /// Adds a listener unless the same instance is already registered.
    ///
    /// A new listener is brought up to date with the capacity table.
    pub fn add_listener(&self, listener: Arc<dyn NotificationListener>) {
        {
            let mut listeners = self.listeners.write();
            let known = listeners
                .iter()
                .any(|existing| std::ptr::addr_eq(Arc::as_ptr(existing), Arc::as_ptr(&listener)));
            if known {
                return;
            }
            listeners.push(listener.clone());
        }

        for entry in self.capacity.entries() {
            listener.update_short_running_free(&entry.node, entry.short_running_free);
            listener.update_long_running_free(&entry.node, entry.long_running_free);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Starts the transport and announces this node's free workers.
    pub async fn start(&self) -> Result<(), WorkError> {
        let transport = self.transport().ok_or_else(|| {
            WorkError::Configuration("no transport configured".to_string())
        })?;

        transport.start().await?;

        let short = self.executor.short_running_free();
        let long = self.executor.long_running_free();
        self.update_short_running_free(&self.id, short);
        self.update_long_running_free(&self.id, long);
        transport.update_short_running_free(&self.id, short);
        transport.update_long_running_free(&self.id, long);

        Ok(())
    }

    pub async fn stop(&self) {
        if let Some(transport) = self.transport() {
            transport.stop().await;
        }
        for peer in self.members.peers(&self.id) {
            self.leave(&peer);
        }
        tracing::info!("Work manager {} stopped", self.id);
    }

    // ============================================================
    // SUBMISSION
    // ============================================================

    /// Runs the work and returns once it has completed, here or on a peer.
    pub async fn do_work(&self, work: Work) -> Result<(), WorkError> {
        match self.route(&work) {
            Some((transport, node)) => transport.do_work(&node, work).await,
            None => self.local_do_work(work).await,
        }
    }

    /// Returns once the work has started; the value is the start delay in ms.
    pub async fn start_work(&self, work: Work) -> Result<u64, WorkError> {
        match self.route(&work) {
            Some((transport, node)) => transport.start_work(&node, work).await,
            None => self.local_start_work(work).await,
        }
    }

    /// Returns once the work has been accepted.
    pub async fn schedule_work(&self, work: Work) -> Result<(), WorkError> {
        match self.route(&work) {
            Some((transport, node)) => transport.schedule_work(&node, work).await,
            None => self.local_schedule_work(work).await,
        }
    }

    /// Decides where the work goes; `None` means the local executor.
    fn route(&self, work: &Work) -> Option<(Arc<dyn Transport>, NodeId)> {
        if !work.distributable {
            return None;
        }

        let policy = self.policy.read().clone()?;
        let selector = self.selector.read().clone()?;
        let transport = self.transport()?;

        if !policy.should_distribute(work) {
            tracing::trace!("Policy keeps work {} local", work.id.0);
            return None;
        }

        let target = selector.select(&self.id, work, &self.cluster())?;
        if target == self.id {
            return None;
        }

        tracing::debug!("Work {} goes to {}", work.id.0, target);
        Some((transport, target))
    }

    pub async fn local_do_work(&self, work: Work) -> Result<(), WorkError> {
        self.announce_admission(&work);
        let hook = self.outcome_hook(&work);
        let result = self.executor.do_work(work, hook).await;
        self.record_admission(&result, Counter::DoWorkAccepted, Counter::DoWorkRejected);
        result
    }

    pub async fn local_start_work(&self, work: Work) -> Result<u64, WorkError> {
        self.announce_admission(&work);
        let hook = self.outcome_hook(&work);
        let result = self.executor.start_work(work, hook).await;
        self.record_admission(&result, Counter::StartWorkAccepted, Counter::StartWorkRejected);
        result
    }

    pub async fn local_schedule_work(&self, work: Work) -> Result<(), WorkError> {
        self.announce_admission(&work);
        let hook = self.outcome_hook(&work);
        let result = self.executor.schedule_work(work, hook).await;
        self.record_admission(
            &result,
            Counter::ScheduleWorkAccepted,
            Counter::ScheduleWorkRejected,
        );
        result
    }

    /// Publishes the relevant pool's free count minus the worker about to be taken.
    fn announce_admission(&self, work: &Work) {
        let free = self.executor.free_workers(work).saturating_sub(1);
        self.announce_free(work.long_running, free);
    }

    fn announce_free(&self, long_running: bool, free: u64) {
        let transport = self.transport();

        if long_running {
            self.update_long_running_free(&self.id, free);
            if let Some(transport) = transport {
                transport.update_long_running_free(&self.id, free);
            }
        } else {
            self.update_short_running_free(&self.id, free);
            if let Some(transport) = transport {
                transport.update_short_running_free(&self.id, free);
            }
        }
    }

    fn record_admission<T>(&self, result: &Result<T, WorkError>, accepted: Counter, rejected: Counter) {
        match result {
            Err(WorkError::Rejected { reason }) => {
                tracing::debug!("{}: work rejected: {}", self.id, reason);
                self.statistics.record(rejected);
            }
            _ => self.statistics.record(accepted),
        }
    }

    /// Counts the outcome and republishes the pool's free count once the worker is back.
    fn outcome_hook(&self, work: &Work) -> OutcomeHook {
        let manager = self.me.clone();
        let long_running = work.long_running;

        Box::new(move |success| {
            let Some(manager) = manager.upgrade() else {
                return;
            };

            manager.statistics.record(if success {
                Counter::WorkSuccessful
            } else {
                Counter::WorkFailed
            });

            let free = if long_running {
                manager.executor.long_running_free()
            } else {
                manager.executor.short_running_free()
            };
            manager.announce_free(long_running, free);
        })
    }

    // ============================================================
    // QUERIES
    // ============================================================

    pub async fn ping(&self, node: &NodeId) -> Result<Duration, WorkError> {
        let transport = self.transport().ok_or_else(|| {
            WorkError::Configuration("no transport configured".to_string())
        })?;
        transport.ping(node).await
    }

    pub fn short_running_free(&self) -> u64 {
        self.executor.short_running_free()
    }

    pub fn long_running_free(&self) -> u64 {
        self.executor.long_running_free()
    }

    pub fn statistics(&self) -> &Arc<ReplicatedStatistics> {
        &self.statistics
    }

    pub fn capacity(&self) -> &CapacityTable {
        &self.capacity
    }

    pub fn capacity_of(&self, node: &NodeId) -> Option<CapacityEntry> {
        self.capacity.get(node)
    }

    pub fn members(&self) -> Vec<NodeId> {
        self.members.members()
    }

    pub fn cluster(&self) -> ClusterView<'_> {
        ClusterView::new(&self.members, &self.capacity)
    }

    fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().clone()
    }

    fn listeners(&self) -> Vec<Arc<dyn NotificationListener>> {
        self.listeners.read().clone()
    }
}

impl NotificationListener for DistributedWorkManager {
    fn join(&self, node: &NodeId) {
        if self.members.insert(node) {
            tracing::info!("{}: {} joined the work group", self.id, node);
        }
        self.capacity.register(node);

        for listener in self.listeners() {
            listener.join(node);
        }
    }

    fn leave(&self, node: &NodeId) {
        if *node == self.id {
            return;
        }
        if self.members.remove(node) {
            tracing::info!("{}: {} left the work group", self.id, node);
        }
        self.capacity.remove(node);

        for listener in self.listeners() {
            listener.leave(node);
        }
    }

    fn update_short_running_free(&self, node: &NodeId, free: u64) {
        // Late updates from departed members must not resurrect their entry.
        if !self.members.contains(node) {
            return;
        }
        tracing::trace!("{}: {} has {} short-running workers free", self.id, node, free);
        self.capacity.update_short_running_free(node, free);

        for listener in self.listeners() {
            listener.update_short_running_free(node, free);
        }
    }

    fn update_long_running_free(&self, node: &NodeId, free: u64) {
        if !self.members.contains(node) {
            return;
        }
        tracing::trace!("{}: {} has {} long-running workers free", self.id, node, free);
        self.capacity.update_long_running_free(node, free);

        for listener in self.listeners() {
            listener.update_long_running_free(node, free);
        }
    }

    fn delta(&self, origin: &NodeId, counter: Counter) {
        // A delta sent just before a Leave may arrive after it.
        if !self.members.contains(origin) {
            return;
        }
        for listener in self.listeners() {
            listener.delta(origin, counter);
        }
    }
}
