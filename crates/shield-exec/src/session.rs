//! Deposit-triggered rescue session.
//!
//! Arms a [`BalanceMonitor`] and fires the [`RescueExecutor`] on the first
//! deposit, publishing progress on a `watch` channel:
//! `Idle -> Monitoring -> DepositDetected -> Executing -> Confirmed | Failed`,
//! or `Cancelled` when the monitor is stopped first.
//!
//! [`RescueSession::run_until_interrupted`] maps operator interrupts onto
//! that flow: the first one while monitoring stops the monitor, any later one
//! (or one arriving after the deposit) abandons the session.

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use serde::Serialize;
use shield_data::config::MonitorConfig;
use shield_data::provider::LedgerProvider;
use shield_data::types::{ExecutionResult, ExecutionStatus, TransactionTemplate};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::monitor::{BalanceMonitor, MonitorEvent, MonitorHandle};
use crate::rescue::{ExecutionMode, RescueExecutor};
use crate::signer::SigningIdentity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Monitoring,
    DepositDetected,
    Executing,
    Confirmed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Confirmed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Monitoring => "monitoring",
            SessionStatus::DepositDetected => "deposit detected",
            SessionStatus::Executing => "executing",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    /// Stopped before any deposit.
    Cancelled,
    /// A deposit triggered the rescue.
    Executed {
        deposit: U256,
        result: ExecutionResult,
    },
    /// Abandoned by the operator in `status`. A transaction broadcast before
    /// the interrupt may still confirm.
    Interrupted { status: SessionStatus },
}

/// One arm-and-wait rescue cycle.
pub struct RescueSession {
    provider: Arc<dyn LedgerProvider>,
    executor: RescueExecutor,
    monitor_config: MonitorConfig,
    status: watch::Sender<SessionStatus>,
}

impl RescueSession {
    pub fn new(
        provider: Arc<dyn LedgerProvider>,
        executor: RescueExecutor,
        monitor_config: MonitorConfig,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::Idle);
        Self {
            provider,
            executor,
            monitor_config,
            status,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    fn set_status(&self, status: SessionStatus) {
        debug!(%status, "session status");
        self.status.send_replace(status);
    }

    /// Starts watching `address` for a deposit above `baseline`.
    ///
    /// Take a [`MonitorHandle::stop_handle`] before passing the handle to
    /// [`RescueSession::run`] to be able to cancel.
    pub fn arm(&self, address: Address, baseline: U256) -> MonitorHandle {
        let handle = BalanceMonitor::start(
            Arc::clone(&self.provider),
            address,
            baseline,
            &self.monitor_config,
        );
        self.set_status(SessionStatus::Monitoring);
        handle
    }

    /// Waits on `monitor` and executes `template` on the first deposit.
    ///
    /// The executor is given the post-deposit balance as the available
    /// balance.
    #[tracing::instrument(skip_all, fields(from = %signer.address()))]
    pub async fn run(
        &self,
        mut monitor: MonitorHandle,
        signer: &dyn SigningIdentity,
        template: &TransactionTemplate,
        mode: ExecutionMode,
    ) -> SessionOutcome {
        let (new_balance, increase) = loop {
            match monitor.next_event().await {
                Some(MonitorEvent::BalanceCheck { balance, poll_count }) => {
                    debug!(poll_count, %balance, "waiting for deposit");
                }
                Some(MonitorEvent::PollError {
                    message,
                    poll_count,
                }) => {
                    warn!(poll_count, %message, "balance poll error");
                }
                Some(MonitorEvent::DepositDetected {
                    new_balance,
                    increase,
                    ..
                }) => break (new_balance, increase),
                None => {
                    info!("session cancelled before any deposit");
                    self.set_status(SessionStatus::Cancelled);
                    return SessionOutcome::Cancelled;
                }
            }
        };

        self.set_status(SessionStatus::DepositDetected);
        info!(%increase, %new_balance, "deposit detected, executing rescue");

        self.set_status(SessionStatus::Executing);
        let result = self
            .executor
            .execute(signer, template, new_balance, mode)
            .await;

        let terminal = match result.status {
            ExecutionStatus::Success => SessionStatus::Confirmed,
            ExecutionStatus::Reverted | ExecutionStatus::Error => SessionStatus::Failed,
        };
        self.set_status(terminal);

        SessionOutcome::Executed {
            deposit: increase,
            result,
        }
    }

    /// [`RescueSession::run`], reacting to every message on `interrupts`.
    ///
    /// While monitoring, the first interrupt stops the monitor and the
    /// session ends as [`SessionOutcome::Cancelled`]. A repeated interrupt,
    /// or one after the deposit, returns [`SessionOutcome::Interrupted`] at
    /// once and drops the in-flight execution.
    pub async fn run_until_interrupted(
        &self,
        monitor: MonitorHandle,
        signer: &dyn SigningIdentity,
        template: &TransactionTemplate,
        mode: ExecutionMode,
        interrupts: &mut mpsc::Receiver<()>,
    ) -> SessionOutcome {
        let stop = monitor.stop_handle();
        let run = self.run(monitor, signer, template, mode);
        tokio::pin!(run);

        let mut listening = true;
        loop {
            tokio::select! {
                outcome = &mut run => return outcome,
                received = interrupts.recv(), if listening => {
                    if received.is_none() {
                        listening = false;
                        continue;
                    }
                    let status = self.status();
                    if status == SessionStatus::Monitoring && !stop.is_stopped() {
                        info!("interrupt received, stopping monitor");
                        stop.stop();
                    } else {
                        warn!(%status, "interrupt received, abandoning session");
                        return SessionOutcome::Interrupted { status };
                    }
                }
            }
        }
    }
}
