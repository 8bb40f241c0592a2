//! shield-exec crate
//!
//! Builds rescue transactions and races them against a drainer bot: the
//! deposit-triggered path (balance monitor + rescue executor) and the atomic
//! path (funding + rescue bundle submitted to a block-builder relay).

pub mod bundle;
pub mod monitor;
pub mod relay;
pub mod rescue;
pub mod session;
pub mod signer;
pub mod templates;

pub use bundle::BundleExecutor;
pub use monitor::{BalanceMonitor, MonitorEvent, MonitorHandle, MonitorState, StopHandle};
pub use relay::{BundleRelay, BundleSubmission, FlashbotsRelay, RelayResponse};
pub use rescue::{ExecutionMode, RescueExecutor};
pub use session::{RescueSession, SessionOutcome, SessionStatus};
pub use signer::{SignedTransaction, SigningIdentity};
pub use templates::{RescueRequest, TemplateBuilder};
