//! Strategy Supervisor
//!
//! The driver-facing surface: start a strategy and get a handle, then
//! update, inspect or stop it by handle. Independent strategies never wait
//! on each other; each engine sits behind its own async mutex.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::grid_engine::{GridEngine, GridEngineConfig};
use super::oco_engine::{OcoEngine, OcoEngineConfig, OcoSnapshot};
use super::twap_scheduler::{TwapScheduler, TwapSchedulerConfig};
use crate::application::orders::{ManagedOrder, OrderPreparer};
use crate::application::ports::ExchangeGateway;
use crate::domain::execution_tactics::{GridParams, GridSnapshot, OcoParams, TwapParams, TwapReport};
use crate::domain::order_execution::{Order, OrderError, OrderRequest};
use crate::domain::shared::StrategyHandle;

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySpec {
    /// A single MARKET, LIMIT or STOP_LIMIT order.
    Order(OrderRequest),
    /// Linked take-profit / stop-loss pair.
    Oco(OcoParams),
    /// Time-sliced execution.
    Twap(TwapParams),
    /// Resting-order ladder.
    Grid(GridParams),
}

/// Point-in-time view of a strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategySnapshot {
    /// Single order.
    Order(Order),
    /// OCO group.
    Oco(OcoSnapshot),
    /// TWAP progress.
    Twap(TwapReport),
    /// Grid ladder.
    Grid(GridSnapshot),
}

/// Supervisor errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    /// No strategy registered under this handle.
    #[error("Unknown strategy handle: {0}")]
    UnknownHandle(StrategyHandle),

    /// Strategy operation failed.
    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Per-strategy settings.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Permissions a symbol must carry for plain orders.
    pub required_permissions: Vec<String>,
    /// OCO settings.
    pub oco: OcoEngineConfig,
    /// TWAP settings.
    pub twap: TwapSchedulerConfig,
    /// Grid settings.
    pub grid: GridEngineConfig,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            required_permissions: vec!["TRADING".to_string()],
            oco: OcoEngineConfig::default(),
            twap: TwapSchedulerConfig::default(),
            grid: GridEngineConfig::default(),
        }
    }
}

struct TwapTask {
    cancel: CancellationToken,
    progress: watch::Receiver<TwapReport>,
    task: Mutex<Option<JoinHandle<TwapReport>>>,
}

enum StrategyEntry<G: ?Sized> {
    Order(Mutex<ManagedOrder<G>>),
    Oco(Mutex<OcoEngine<G>>),
    Twap(TwapTask),
    Grid(Mutex<GridEngine<G>>),
}

/// Owns running strategies and routes driver calls to them.
pub struct StrategySupervisor<G: ?Sized> {
    gateway: Arc<G>,
    config: SupervisorConfig,
    strategies: RwLock<HashMap<StrategyHandle, Arc<StrategyEntry<G>>>>,
}

impl<G: ExchangeGateway + ?Sized + 'static> StrategySupervisor<G> {
    /// Create a supervisor over one gateway.
    pub fn new(gateway: Arc<G>, config: SupervisorConfig) -> Self {
        Self {
            gateway,
            config,
            strategies: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and launch a strategy.
    ///
    /// Orders, OCO groups and grids are placed before the handle is returned.
    /// A TWAP plan is checked here and then runs as a background task.
    ///
    /// # Errors
    ///
    /// Returns the validation or placement failure; nothing is registered.
    pub async fn start(&self, spec: StrategySpec) -> Result<StrategyHandle, SupervisorError> {
        let entry = match spec {
            StrategySpec::Order(request) => {
                let preparer = OrderPreparer::new(
                    Arc::clone(&self.gateway),
                    self.config.required_permissions.clone(),
                );
                let prepared = preparer.prepare(&request).await?;
                let mut order = ManagedOrder::from_request(Arc::clone(&self.gateway), prepared)?;
                order.place().await?;
                StrategyEntry::Order(Mutex::new(order))
            }
            StrategySpec::Oco(params) => {
                let mut engine =
                    OcoEngine::new(Arc::clone(&self.gateway), params, self.config.oco.clone())?;
                engine.place().await?;
                StrategyEntry::Oco(Mutex::new(engine))
            }
            StrategySpec::Twap(params) => {
                let scheduler =
                    TwapScheduler::new(Arc::clone(&self.gateway), params, self.config.twap.clone())?;
                let progress = scheduler.subscribe();
                let cancel = CancellationToken::new();
                let token = cancel.clone();
                let task = tokio::spawn(async move { scheduler.run(token).await });
                StrategyEntry::Twap(TwapTask {
                    cancel,
                    progress,
                    task: Mutex::new(Some(task)),
                })
            }
            StrategySpec::Grid(params) => {
                let mut engine =
                    GridEngine::new(Arc::clone(&self.gateway), params, self.config.grid.clone())?;
                engine.start().await?;
                StrategyEntry::Grid(Mutex::new(engine))
            }
        };

        let handle = StrategyHandle::generate();
        self.strategies.write().insert(handle.clone(), Arc::new(entry));
        tracing::info!(handle = %handle, "Strategy started");
        Ok(handle)
    }

    /// Run one grid maintenance cycle. No-op for other strategy kinds.
    ///
    /// # Errors
    ///
    /// Returns `UnknownHandle` if the handle is not registered.
    pub async fn update(&self, handle: &StrategyHandle) -> Result<(), SupervisorError> {
        let entry = self.entry(handle)?;
        if let StrategyEntry::Grid(engine) = entry.as_ref() {
            let fills = engine.lock().await.update().await;
            if fills > 0 {
                tracing::debug!(handle = %handle, fills, "Grid update captured fills");
            }
        }
        Ok(())
    }

    /// Current view of a strategy.
    ///
    /// Live orders are refreshed and OCO groups reconciled before the
    /// snapshot is taken.
    ///
    /// # Errors
    ///
    /// Returns `UnknownHandle`, or the refresh failure.
    pub async fn get_status(&self, handle: &StrategyHandle) -> Result<StrategySnapshot, SupervisorError> {
        let entry = self.entry(handle)?;
        let snapshot = match entry.as_ref() {
            StrategyEntry::Order(order) => {
                let mut order = order.lock().await;
                if order.order().exchange_order_id().is_some() && !order.status().is_terminal() {
                    order.refresh_status().await?;
                }
                StrategySnapshot::Order(order.order().clone())
            }
            StrategyEntry::Oco(engine) => {
                let mut engine = engine.lock().await;
                engine.poll_and_reconcile().await?;
                StrategySnapshot::Oco(engine.snapshot())
            }
            StrategyEntry::Twap(task) => StrategySnapshot::Twap(task.progress.borrow().clone()),
            StrategyEntry::Grid(engine) => StrategySnapshot::Grid(engine.lock().await.snapshot()),
        };
        Ok(snapshot)
    }

    /// Stop a strategy and unregister it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownHandle`, or the cancellation failure (the strategy
    /// stays registered so the stop can be retried).
    pub async fn stop(&self, handle: &StrategyHandle) -> Result<StrategySnapshot, SupervisorError> {
        let entry = self.entry(handle)?;
        let snapshot = match entry.as_ref() {
            StrategyEntry::Order(order) => {
                let mut order = order.lock().await;
                if order.order().exchange_order_id().is_some() && !order.status().is_terminal() {
                    order.cancel().await?;
                }
                StrategySnapshot::Order(order.order().clone())
            }
            StrategyEntry::Oco(engine) => {
                let mut engine = engine.lock().await;
                engine.cancel().await?;
                StrategySnapshot::Oco(engine.snapshot())
            }
            StrategyEntry::Twap(task) => {
                task.cancel.cancel();
                let join = task.task.lock().await.take();
                let report = match join {
                    Some(join) => match join.await {
                        Ok(report) => report,
                        Err(e) => {
                            tracing::error!(handle = %handle, error = %e, "TWAP task panicked");
                            task.progress.borrow().clone()
                        }
                    },
                    None => task.progress.borrow().clone(),
                };
                StrategySnapshot::Twap(report)
            }
            StrategyEntry::Grid(engine) => {
                let mut engine = engine.lock().await;
                engine.stop().await?;
                StrategySnapshot::Grid(engine.snapshot())
            }
        };

        self.strategies.write().remove(handle);
        tracing::info!(handle = %handle, "Strategy stopped");
        Ok(snapshot)
    }

    /// Wait for a TWAP task to finish on its own. Other kinds return their
    /// current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `UnknownHandle` if the handle is not registered.
    pub async fn wait(&self, handle: &StrategyHandle) -> Result<StrategySnapshot, SupervisorError> {
        let entry = self.entry(handle)?;
        if let StrategyEntry::Twap(task) = entry.as_ref() {
            // The handle stays in place until the task ends so that a dropped
            // wait leaves it for `stop` to await.
            let mut join = task.task.lock().await;
            if let Some(running) = join.as_mut() {
                if let Err(e) = running.await {
                    tracing::error!(handle = %handle, error = %e, "TWAP task panicked");
                }
                *join = None;
            }
            return Ok(StrategySnapshot::Twap(task.progress.borrow().clone()));
        }
        self.get_status(handle).await
    }

    /// Handles of registered strategies.
    pub fn handles(&self) -> Vec<StrategyHandle> {
        self.strategies.read().keys().cloned().collect()
    }

    fn entry(&self, handle: &StrategyHandle) -> Result<Arc<StrategyEntry<G>>, SupervisorError> {
        self.strategies
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownHandle(handle.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockExchangeGateway;

    #[tokio::test]
    async fn unknown_handle_is_reported() {
        let supervisor = StrategySupervisor::new(Arc::new(MockExchangeGateway::new()), SupervisorConfig::default());
        let handle = StrategyHandle::generate();
        assert!(matches!(
            supervisor.update(&handle).await,
            Err(SupervisorError::UnknownHandle(_))
        ));
        assert!(matches!(
            supervisor.stop(&handle).await,
            Err(SupervisorError::UnknownHandle(_))
        ));
        assert!(supervisor.handles().is_empty());
    }
}
