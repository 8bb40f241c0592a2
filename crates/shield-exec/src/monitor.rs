//! Balance monitor.
//!
//! Polls an address's balance on a fixed interval and reports every reading
//! over a channel. The first reading above the baseline produces a single
//! [`MonitorEvent::DepositDetected`] and ends the monitor. Query errors and
//! timeouts are reported and polling continues.
//!
//! Cancellation is cooperative. Once [`StopHandle::stop`] returns, the task
//! emits nothing more and [`MonitorHandle::next_event`] yields `None`, even
//! for events that were already queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use shield_data::config::MonitorConfig;
use shield_data::provider::LedgerProvider;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const EVENT_BUFFER: usize = 64;

/// One monitor observation, in poll order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Emitted for every successful poll, deposit or not.
    BalanceCheck { balance: U256, poll_count: u64 },
    /// Terminal: the balance rose above the baseline.
    DepositDetected {
        new_balance: U256,
        increase: U256,
        poll_count: u64,
    },
    /// The poll failed or timed out; monitoring continues.
    PollError { message: String, poll_count: u64 },
}

/// Bookkeeping for one arm-and-wait cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorState {
    pub baseline: U256,
    pub poll_count: u64,
    pub running: bool,
}

#[derive(Debug)]
struct Shared {
    stopped: AtomicBool,
    /// Cleared the moment a deposit is recognized.
    armed: AtomicBool,
    wake: Notify,
}

impl Shared {
    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Cloneable, idempotent stop switch.
#[derive(Clone, Debug)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Stops the monitor. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.shared.stopped.swap(true, Ordering::SeqCst) {
            self.shared.wake.notify_one();
            info!("balance monitor stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }
}

/// Handle to a running monitor.
#[derive(Debug)]
pub struct MonitorHandle {
    baseline: U256,
    events: mpsc::Receiver<MonitorEvent>,
    stop: StopHandle,
    task: JoinHandle<MonitorState>,
}

impl MonitorHandle {
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Next event, or `None` once stopped or finished.
    pub async fn next_event(&mut self) -> Option<MonitorEvent> {
        if self.stop.is_stopped() {
            return None;
        }
        let event = self.events.recv().await;
        if self.stop.is_stopped() {
            return None;
        }
        event
    }

    pub fn baseline(&self) -> U256 {
        self.baseline
    }

    /// Waits for the task to end and returns its final state.
    ///
    /// Dropping the event receiver makes a still-running task exit after its
    /// next poll.
    pub async fn join(self) -> MonitorState {
        drop(self.events);
        match self.task.await {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "balance monitor task ended abnormally");
                MonitorState {
                    baseline: self.baseline,
                    poll_count: 0,
                    running: false,
                }
            }
        }
    }
}

/// Starts balance monitors.
pub struct BalanceMonitor;

impl BalanceMonitor {
    /// Spawns a monitor for `address` against `baseline`.
    ///
    /// Must be called within a tokio runtime.
    #[tracing::instrument(skip(provider, config), fields(poll_interval_ms = config.poll_interval_ms))]
    pub fn start(
        provider: Arc<dyn LedgerProvider>,
        address: Address,
        baseline: U256,
        config: &MonitorConfig,
    ) -> MonitorHandle {
        let shared = Arc::new(Shared {
            stopped: AtomicBool::new(false),
            armed: AtomicBool::new(true),
            wake: Notify::new(),
        });
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        info!(%baseline, "balance monitor armed");
        let task = tokio::spawn(run(
            provider,
            address,
            baseline,
            config.clone(),
            Arc::clone(&shared),
            tx,
        ));

        MonitorHandle {
            baseline,
            events: rx,
            stop: StopHandle { shared },
            task,
        }
    }
}

async fn run(
    provider: Arc<dyn LedgerProvider>,
    address: Address,
    baseline: U256,
    config: MonitorConfig,
    shared: Arc<Shared>,
    tx: mpsc::Sender<MonitorEvent>,
) -> MonitorState {
    let mut state = MonitorState {
        baseline,
        poll_count: 0,
        running: true,
    };
    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shared.wake.notified() => break,
            _ = ticker.tick() => {}
        }
        if shared.is_stopped() {
            break;
        }

        state.poll_count += 1;
        let poll_count = state.poll_count;
        let reading = tokio::time::timeout(config.poll_timeout(), provider.balance(address)).await;

        // A stop issued while the query was in flight wins over its result.
        if shared.is_stopped() {
            break;
        }

        match reading {
            Ok(Ok(balance)) => {
                let deposit = balance > baseline && shared.armed.swap(false, Ordering::SeqCst);

                debug!(poll_count, %balance, "balance check");
                if !emit(&tx, MonitorEvent::BalanceCheck { balance, poll_count }) {
                    break;
                }

                if deposit {
                    let increase = balance - baseline;
                    info!(poll_count, %balance, %increase, "deposit detected");
                    if !shared.is_stopped() {
                        let event = MonitorEvent::DepositDetected {
                            new_balance: balance,
                            increase,
                            poll_count,
                        };
                        // Terminal event waits for buffer space rather than being dropped.
                        let _ = tx.send(event).await;
                    }
                    break;
                }
            }
            Ok(Err(e)) => {
                warn!(poll_count, error = %e, "balance poll failed");
                if !emit(
                    &tx,
                    MonitorEvent::PollError {
                        message: e.to_string(),
                        poll_count,
                    },
                ) {
                    break;
                }
            }
            Err(_) => {
                warn!(poll_count, "balance poll timed out");
                if !emit(
                    &tx,
                    MonitorEvent::PollError {
                        message: format!(
                            "balance query timed out after {}ms",
                            config.poll_timeout_ms
                        ),
                        poll_count,
                    },
                ) {
                    break;
                }
            }
        }
    }

    state.running = false;
    state
}

/// Queues a progress event. Returns false once the receiver is gone.
///
/// Progress events are dropped when the consumer lags so that a slow reader
/// never delays the next poll.
fn emit(tx: &mpsc::Sender<MonitorEvent>, event: MonitorEvent) -> bool {
    match tx.try_send(event) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!("monitor event buffer full, dropping progress event");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}
