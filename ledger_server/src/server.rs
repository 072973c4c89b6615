use std::{future::Future, pin::Pin};

use chain_rpc::ChainRpcApi;
use ledger_engine::{events::EventHooks, LedgerDatabase, Reconciler, SqliteDatabase};
use log::*;

use crate::{config::ServerConfig, errors::ServerError, oracle::RpcChainOracle};

/// Runs the reconciler until the process receives SIGINT or SIGTERM, then shuts it down.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, config.db_max_connections).await?;
    if config.run_migrations {
        db.run_migrations().await?;
    } else {
        info!("🚀️ Skipping database migrations");
    }
    let api = ChainRpcApi::new(config.chain_rpc.clone())?;
    let oracle = RpcChainOracle::new(api);
    let hooks = default_hooks();
    let handle =
        Reconciler::new(db.clone(), oracle).with_config(config.reconciler.clone()).with_hooks(hooks).start();

    wait_for_shutdown_signal().await?;
    let report = handle.shutdown().await;
    if !report.graceful {
        warn!("🛑️ {} tasks had to be aborted during shutdown", report.aborted);
    }
    db.close().await?;
    info!("🛑️ Database closed");
    Ok(())
}

/// Every settlement and parked watch is logged. Other notification channels subscribe in the same way.
fn default_hooks() -> EventHooks {
    let mut hooks = EventHooks::default();
    hooks
        .on_flow_settled(|ev| {
            Box::pin(async move {
                let s = ev.settlement;
                info!(
                    "📬️ Flow {} ({}) on account {} settled as {}. Available: {}, held: {}",
                    s.flow.id, s.flow.op, s.account.id, s.flow.status, s.account.available, s.account.held
                );
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
        .on_watch_parked(|ev| {
            Box::pin(async move {
                warn!(
                    "📬️ Stopped watching {} on chain {} for flow {} after {} failed queries. It will be retried at the \
                     next sweep.",
                    ev.watch.tx_hash, ev.watch.chain_id, ev.watch.flow_id, ev.attempts
                );
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
    hooks
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<(), ServerError> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {},
    }
    info!("🛑️ Shutdown signal received");
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<(), ServerError> {
    tokio::signal::ctrl_c().await?;
    info!("🛑️ Shutdown signal received");
    Ok(())
}
