//! OCO Engine
//!
//! Coordinates a two-leg conditional pair with mutual cancellation on an
//! exchange that has no native OCO for futures.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::application::orders::{ManagedOrder, OrderPreparer};
use crate::application::ports::ExchangeGateway;
use crate::domain::execution_tactics::{OcoParams, OcoStatus};
use crate::domain::order_execution::{Order, OrderError, OrderStatus};

/// OCO engine settings.
#[derive(Debug, Clone)]
pub struct OcoEngineConfig {
    /// Pause between leg A and leg B submissions.
    pub settle_delay: Duration,
    /// Permissions a symbol must carry.
    pub required_permissions: Vec<String>,
}

impl Default for OcoEngineConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            required_permissions: vec!["TRADING".to_string()],
        }
    }
}

/// Serializable view of an OCO group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcoSnapshot {
    /// Group parameters.
    pub params: OcoParams,
    /// Group status.
    pub status: OcoStatus,
    /// Take-profit leg.
    pub limit_leg: Option<Order>,
    /// Stop-loss leg.
    pub stop_leg: Option<Order>,
    /// Last failure, if any.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    Limit,
    Stop,
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limit => write!(f, "limit"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Two-leg OCO coordinator.
pub struct OcoEngine<G: ?Sized> {
    gateway: Arc<G>,
    config: OcoEngineConfig,
    params: OcoParams,
    limit_leg: Option<ManagedOrder<G>>,
    stop_leg: Option<ManagedOrder<G>>,
    status: OcoStatus,
    counter_cancel_issued: bool,
    error: Option<String>,
}

impl<G: ExchangeGateway + ?Sized> OcoEngine<G> {
    /// Create an engine for a validated parameter set.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the prices are not ordered for the side.
    pub fn new(gateway: Arc<G>, params: OcoParams, config: OcoEngineConfig) -> Result<Self, OrderError> {
        params.validate()?;
        Ok(Self {
            gateway,
            config,
            params,
            limit_leg: None,
            stop_leg: None,
            status: OcoStatus::Pending,
            counter_cancel_issued: false,
            error: None,
        })
    }

    /// Group status.
    pub const fn status(&self) -> OcoStatus {
        self.status
    }

    /// Place leg A, wait the settle delay, then place leg B.
    ///
    /// If leg B fails, leg A is canceled before the error is returned so no
    /// half group is left resting.
    ///
    /// # Errors
    ///
    /// Returns the validation or placement failure.
    pub async fn place(&mut self) -> Result<(), OrderError> {
        if self.status != OcoStatus::Pending {
            return Err(OrderError::validation(
                "status",
                format!("OCO group already {}", self.status),
            ));
        }

        let preparer = OrderPreparer::new(
            Arc::clone(&self.gateway),
            self.config.required_permissions.clone(),
        );
        let limit_request = preparer.prepare(&self.params.limit_leg()).await?;
        let stop_request = preparer.prepare(&self.params.stop_leg()).await?;

        tracing::info!(
            symbol = %self.params.symbol,
            side = %self.params.side,
            quantity = %limit_request.quantity,
            limit_price = %self.params.limit_price,
            stop_price = %self.params.stop_price,
            stop_limit_price = %self.params.stop_limit_price,
            "Placing OCO group"
        );

        let mut limit_leg = ManagedOrder::from_request(Arc::clone(&self.gateway), limit_request)?;
        if let Err(e) = limit_leg.place().await {
            self.limit_leg = Some(limit_leg);
            return Err(self.fail(e));
        }
        self.limit_leg = Some(limit_leg);

        tokio::time::sleep(self.config.settle_delay).await;

        let mut stop_leg = ManagedOrder::from_request(Arc::clone(&self.gateway), stop_request)?;
        let stop_result = stop_leg.place().await;
        self.stop_leg = Some(stop_leg);
        if let Err(e) = stop_result {
            self.rollback_limit_leg().await;
            return Err(self.fail(e));
        }

        self.status = OcoStatus::Active;
        tracing::info!(
            symbol = %self.params.symbol,
            limit_order = ?self.exchange_id(Leg::Limit),
            stop_order = ?self.exchange_id(Leg::Stop),
            "OCO group active"
        );
        Ok(())
    }

    /// Poll both legs and cancel the survivor when one fills.
    ///
    /// The counter-cancel is issued at most once per group no matter how often
    /// this is called. When both legs fill inside the cancel window the group
    /// reports `BothFilled`.
    ///
    /// # Errors
    ///
    /// Returns the first status query failure; the cached state is kept.
    pub async fn poll_and_reconcile(&mut self) -> Result<OcoStatus, OrderError> {
        if matches!(
            self.status,
            OcoStatus::Pending | OcoStatus::Failed | OcoStatus::BothFilled | OcoStatus::Canceled
        ) || self.both_legs_terminal()
        {
            return Ok(self.status);
        }

        let mut first_error = None;
        for leg in [Leg::Limit, Leg::Stop] {
            if let Some(order) = self.leg_mut(leg)
                && let Err(e) = order.refresh_status().await
            {
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let limit_status = self.leg_status(Leg::Limit);
        let stop_status = self.leg_status(Leg::Stop);
        let limit_filled = limit_status == Some(OrderStatus::Filled);
        let stop_filled = stop_status == Some(OrderStatus::Filled);

        self.status = match (limit_filled, stop_filled) {
            (true, true) => {
                tracing::warn!(
                    symbol = %self.params.symbol,
                    side = %self.params.side,
                    quantity = %self.params.quantity,
                    "Both OCO legs filled before the counter-cancel landed"
                );
                OcoStatus::BothFilled
            }
            (true, false) => {
                self.cancel_counter_leg(Leg::Stop).await;
                OcoStatus::LimitFilled
            }
            (false, true) => {
                self.cancel_counter_leg(Leg::Limit).await;
                OcoStatus::StopFilled
            }
            (false, false) => {
                let limit_gone = limit_status.is_some_and(|s| s.is_terminal());
                let stop_gone = stop_status.is_some_and(|s| s.is_terminal());
                if limit_gone || stop_gone {
                    // A leg ended without a fill (expired or canceled outside the engine).
                    let survivor = if limit_gone { Leg::Stop } else { Leg::Limit };
                    self.cancel_counter_leg(survivor).await;
                    OcoStatus::Canceled
                } else {
                    OcoStatus::Active
                }
            }
        };
        Ok(self.status)
    }

    /// Cancel both legs. Missing or already-terminal legs are skipped.
    ///
    /// # Errors
    ///
    /// Both legs are attempted; the first cancellation failure is returned.
    pub async fn cancel(&mut self) -> Result<(), OrderError> {
        let mut first_error = None;
        for leg in [Leg::Limit, Leg::Stop] {
            let Some(order) = self.leg_mut(leg) else {
                continue;
            };
            if order.order().exchange_order_id().is_none() || order.status().is_terminal() {
                continue;
            }
            if let Err(e) = order.cancel().await {
                first_error.get_or_insert(e);
            }
        }
        self.counter_cancel_issued = true;

        if let Some(e) = first_error {
            self.error = Some(e.to_string());
            return Err(e);
        }

        let filled = [Leg::Limit, Leg::Stop]
            .iter()
            .any(|&leg| self.leg_status(leg) == Some(OrderStatus::Filled));
        if !filled && self.status != OcoStatus::Failed {
            self.status = OcoStatus::Canceled;
        }
        tracing::info!(symbol = %self.params.symbol, status = %self.status, "OCO group canceled");
        Ok(())
    }

    /// Serializable view.
    pub fn snapshot(&self) -> OcoSnapshot {
        OcoSnapshot {
            params: self.params.clone(),
            status: self.status,
            limit_leg: self.limit_leg.as_ref().map(|m| m.order().clone()),
            stop_leg: self.stop_leg.as_ref().map(|m| m.order().clone()),
            error: self.error.clone(),
        }
    }

    async fn cancel_counter_leg(&mut self, leg: Leg) {
        if self.counter_cancel_issued {
            return;
        }
        self.counter_cancel_issued = true;

        let symbol = self.params.symbol.clone();
        let Some(order) = self.leg_mut(leg) else {
            return;
        };
        if order.status().is_terminal() {
            return;
        }
        // Best effort: the leg may have filled or been canceled in the meantime.
        if let Err(e) = order.cancel().await {
            tracing::warn!(
                symbol = %symbol,
                leg = %leg,
                error = %e,
                "Counter-leg cancellation failed"
            );
        }
    }

    async fn rollback_limit_leg(&mut self) {
        let symbol = self.params.symbol.clone();
        if let Some(limit_leg) = self.limit_leg.as_mut()
            && !limit_leg.status().is_terminal()
            && let Err(e) = limit_leg.cancel().await
        {
            tracing::warn!(
                symbol = %symbol,
                leg = %Leg::Limit,
                error = %e,
                "Rollback of limit leg failed; it may still be resting"
            );
        }
    }

    fn fail(&mut self, error: OrderError) -> OrderError {
        self.status = OcoStatus::Failed;
        self.error = Some(error.to_string());
        tracing::error!(
            symbol = %self.params.symbol,
            side = %self.params.side,
            quantity = %self.params.quantity,
            limit_price = %self.params.limit_price,
            stop_price = %self.params.stop_price,
            error = %error,
            "OCO placement failed"
        );
        error
    }

    fn leg_mut(&mut self, leg: Leg) -> Option<&mut ManagedOrder<G>> {
        match leg {
            Leg::Limit => self.limit_leg.as_mut(),
            Leg::Stop => self.stop_leg.as_mut(),
        }
    }

    fn leg_status(&self, leg: Leg) -> Option<OrderStatus> {
        match leg {
            Leg::Limit => self.limit_leg.as_ref().map(ManagedOrder::status),
            Leg::Stop => self.stop_leg.as_ref().map(ManagedOrder::status),
        }
    }

    fn exchange_id(&self, leg: Leg) -> Option<String> {
        let order = match leg {
            Leg::Limit => self.limit_leg.as_ref(),
            Leg::Stop => self.stop_leg.as_ref(),
        }?;
        order.order().exchange_order_id().map(ToString::to_string)
    }

    fn both_legs_terminal(&self) -> bool {
        [Leg::Limit, Leg::Stop]
            .iter()
            .all(|&leg| self.leg_status(leg).is_some_and(|s| s.is_terminal()))
    }
}
