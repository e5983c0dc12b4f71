use distributed_workmanager::api;
use distributed_workmanager::config::{NodeConfig, PolicyChoice, SelectorChoice};
use distributed_workmanager::executor::pool::PoolExecutor;
use distributed_workmanager::executor::registry::WorkHandlerRegistry;
use distributed_workmanager::membership::service::MembershipService;
use distributed_workmanager::transport::remote::RemoteTransport;
use distributed_workmanager::transport::udp::UdpChannel;
use distributed_workmanager::workmanager::manager::DistributedWorkManager;
use distributed_workmanager::workmanager::policy::{Always, Never, Policy, WaterMark};
use distributed_workmanager::workmanager::selector::{FirstAvailable, MaxFreeWorkers, Selector};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let config = match NodeConfig::from_args(args.iter().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Usage: {} {}", args[0], NodeConfig::USAGE);
            eprintln!("Example: {} --bind 127.0.0.1:5000", args[0]);
            eprintln!(
                "Example: {} --bind 127.0.0.1:5010 --seed 127.0.0.1:5000 --policy watermark:1",
                args[0]
            );

            std::process::exit(1);
        }
    };

    tracing::info!("Starting node on {}", config.bind_addr);
    if !config.seed_nodes.is_empty() {
        tracing::info!("Seed nodes: {:?}", config.seed_nodes);
    } else {
        tracing::info!("Starting as seed node (founder)");
    }

    // 1. Membership (UDP gossip):
    let membership =
        MembershipService::new(config.bind_addr, config.rpc_addr(), config.seed_nodes.clone())
            .await?;
    let node_id = membership.local_node.id.clone();
    tracing::info!("Node ID: {}", node_id);

    // 2. Local execution:
    let registry = WorkHandlerRegistry::new();
    register_handlers(&registry);
    let executor = PoolExecutor::new(registry, config.pool.clone());

    // 3. Work manager and its strategies:
    let manager = DistributedWorkManager::new(node_id.clone(), executor, config.work_manager.clone());

    let policy: Arc<dyn Policy> = match config.policy {
        PolicyChoice::Always => Arc::new(Always),
        PolicyChoice::Never => Arc::new(Never),
        PolicyChoice::WaterMark(level) => Arc::new(WaterMark::new(node_id.clone(), level)),
    };
    let selector: Arc<dyn Selector> = match config.selector {
        SelectorChoice::FirstAvailable => Arc::new(FirstAvailable),
        SelectorChoice::MaxFreeWorkers => Arc::new(MaxFreeWorkers),
    };
    manager.set_policy(policy);
    manager.set_selector(selector);
    tracing::info!("Policy {:?}, selector {:?}", config.policy, config.selector);

    // 4. Transport over the RPC socket:
    let channel = UdpChannel::bind(membership.clone()).await?;
    let transport = RemoteTransport::new(channel, config.work_manager.request_timeout);
    manager.set_transport(transport);

    membership.clone().start().await;
    manager.start().await?;

    // 5. Spawn stats reporter:
    let stats_manager = manager.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));

        loop {
            interval.tick().await;
            let members = stats_manager.members();
            let totals = stats_manager.statistics().aggregate();
            tracing::info!(
                "Cluster stats: {} members, {} accepted / {} rejected doWork, {} successful, {} failed",
                members.len(),
                totals.do_work_accepted,
                totals.do_work_rejected,
                totals.work_successful,
                totals.work_failed
            );
            for entry in stats_manager.capacity().entries() {
                tracing::info!(
                    "  - {} short-free={} long-free={}",
                    entry.node,
                    entry.short_running_free,
                    entry.long_running_free
                );
            }
        }
    });

    // 6. Start HTTP server:
    let http_addr = config.http_addr();
    let app = api::router(manager.clone());

    tracing::info!("HTTP server listening on {}", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down");
    manager.stop().await;
    membership.shutdown().await;

    Ok(())
}

/// Handlers every node offers. Names must match across the cluster.
fn register_handlers(registry: &WorkHandlerRegistry) {
    registry.register("sleep", |work| async move {
        let millis = work.payload["millis"].as_u64().unwrap_or(1000);
        tracing::info!("Work {} sleeping {} ms", work.id.0, millis);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(())
    });

    registry.register("log", |work| async move {
        tracing::info!("Work {} says: {}", work.id.0, work.payload);
        Ok(())
    });

    registry.register("fail", |work| async move {
        Err(anyhow::anyhow!("work {} failed on request", work.id.0))
    });
}
