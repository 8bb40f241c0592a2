//! shield-data crate
//!
//! Data model, error taxonomy, configuration and ledger collaborators shared
//! by the drainer detector and the rescue executors.

pub mod config;
pub mod error;
pub mod history;
pub mod inventory;
pub mod provider;
pub mod types;

pub use config::ShieldConfig;
pub use error::ShieldError;
pub use provider::{AlloyLedger, LedgerProvider};
pub use types::{
    BundleResult, BundleStatus, DrainerAnalysis, ExecutionResult, ExecutionStatus,
    HistoricalTransaction, RescueAction, RiskLevel, SweepPattern, TransactionTemplate,
};
