use std::{fs::File, sync::Arc, sync::atomic::Ordering};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use sockmon::{
    collector::Collector,
    diag::{DiagnosticRunner, SystemRunner},
    health::{self, HealthState},
    iface::{resolver::InterfaceResolver, source::SysInterfaceSource},
    metrics::{connections::ConnectionsCollector, registry, server},
    runtime::{Runtime, conf::Conf},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime = Runtime::new()?;
    let conf = runtime.conf;

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(conf.log_level).into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    registry::init_registry().context("failed to register operational metrics")?;

    let runner: Arc<dyn DiagnosticRunner> = Arc::new(SystemRunner);
    let resolver = InterfaceResolver::new(Box::new(SysInterfaceSource), Arc::clone(&runner));
    let collector = Collector::new(conf.tables.clone(), resolver, runner);
    let connections =
        ConnectionsCollector::new(collector).context("failed to build connections collector")?;
    registry::REGISTRY
        .register(Box::new(connections))
        .context("failed to register connections collector")?;

    let health_state = HealthState::default();
    health_state
        .tables_readable
        .store(tables_readable(&conf), Ordering::Relaxed);

    if conf.api.enabled {
        let state = health_state.clone();
        let api_conf = conf.api.clone();
        tokio::spawn(async move {
            if let Err(e) = health::start_api_server(state, api_conf).await {
                error!(
                    event.name = "api.failed",
                    error = %e,
                    "api server exited with error"
                );
            }
        });
    }

    let metrics_conf = conf.metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = server::start_metrics_server(metrics_conf).await {
            error!(
                event.name = "metrics.failed",
                error = %e,
                "metrics server exited with error"
            );
        }
    });

    health_state.startup_complete.store(true, Ordering::Relaxed);
    info!(
        event.name = "sockmon.started",
        net.listen.port = conf.metrics.port,
        "collector started, waiting for scrapes"
    );

    signal::ctrl_c().await?;
    info!(event.name = "sockmon.shutdown", "shutting down");
    Ok(())
}

/// Whether at least one connection-table source can be opened. Readiness
/// only; a table may still disappear between passes.
fn tables_readable(conf: &Conf) -> bool {
    File::open(&conf.tables.tcp_table).is_ok() || File::open(&conf.tables.udp_table).is_ok()
}
