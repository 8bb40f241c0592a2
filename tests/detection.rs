//! Drainer detection over indexed history and the block-scan fallback.

mod common;

use std::time::Duration;

use alloy::primitives::{address, Address};
use async_trait::async_trait;
use common::{bot_history, MockLedger};
use shield_analysis::DrainerDetector;
use shield_data::config::DetectorConfig;
use shield_data::error::ShieldError;
use shield_data::history::HistorySource;
use shield_data::provider::LedgerBlock;
use shield_data::types::{HistoricalTransaction, RiskLevel};

const WALLET: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
const BOT: Address = address!("15d34AAf54267DB7D7c367839AAf71A00a2C6A65");

enum Scripted {
    Txs(Vec<HistoricalTransaction>),
    Fails,
    Hangs,
}

struct ScriptedHistory(Scripted);

#[async_trait]
impl HistorySource for ScriptedHistory {
    async fn recent_transactions(
        &self,
        _address: Address,
        limit: usize,
    ) -> Result<Vec<HistoricalTransaction>, ShieldError> {
        match &self.0 {
            Scripted::Txs(txs) => Ok(txs.iter().take(limit).cloned().collect()),
            Scripted::Fails => Err(ShieldError::DegradedData("explorer: rate limited".into())),
            Scripted::Hangs => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(Vec::new())
            }
        }
    }
}

/// Ledger whose recent blocks carry the bot pattern, two transactions per block.
fn ledger_with_bot_blocks() -> MockLedger {
    let ledger = MockLedger::new();
    ledger.script_heights(vec![1_000]);
    for (i, pair) in bot_history(WALLET, BOT).chunks(2).enumerate() {
        let number = 990 + i as u64;
        ledger.add_block(LedgerBlock {
            number,
            timestamp: pair[0].timestamp,
            transactions: pair.to_vec(),
        });
    }
    ledger
}

#[tokio::test]
async fn indexed_history_is_preferred() {
    let ledger = MockLedger::new();
    let history = ScriptedHistory(Scripted::Txs(bot_history(WALLET, BOT)));
    let detector = DrainerDetector::new(DetectorConfig::default());

    let analysis = detector.analyze(&ledger, Some(&history as &dyn HistorySource), WALLET).await;

    assert_eq!(analysis.risk_level, RiskLevel::High);
    assert!(analysis.bot_detected);
    assert_eq!(analysis.sweep_count, 3);
    assert_eq!(analysis.bot_destination, Some(BOT));
    assert_eq!(analysis.estimated_bot_gas_gwei, Some(80));
    assert!(ledger.block_requests().is_empty());
}

#[tokio::test]
async fn failing_history_falls_back_to_block_scan() {
    let ledger = ledger_with_bot_blocks();
    let history = ScriptedHistory(Scripted::Fails);
    let detector = DrainerDetector::new(DetectorConfig::default());

    let analysis = detector.analyze(&ledger, Some(&history as &dyn HistorySource), WALLET).await;

    assert_eq!(analysis.risk_level, RiskLevel::High);
    assert_eq!(analysis.transactions_analyzed, 6);
    let requested = ledger.block_requests();
    assert!(requested.contains(&1_000));
    assert!(requested.iter().all(|n| (900..=1_000).contains(n)));
}

#[tokio::test(start_paused = true)]
async fn hanging_history_times_out_into_block_scan() {
    let ledger = ledger_with_bot_blocks();
    let history = ScriptedHistory(Scripted::Hangs);
    let detector = DrainerDetector::new(DetectorConfig::default());

    let started = tokio::time::Instant::now();
    let analysis = detector.analyze(&ledger, Some(&history as &dyn HistorySource), WALLET).await;

    assert_eq!(analysis.risk_level, RiskLevel::High);
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(8));
    assert!(elapsed < Duration::from_secs(60));
}

#[tokio::test]
async fn missing_history_source_scans_blocks() {
    let ledger = ledger_with_bot_blocks();
    let detector = DrainerDetector::new(DetectorConfig::default());

    let analysis = detector.analyze(&ledger, None, WALLET).await;

    assert_eq!(analysis.sweep_count, 3);
    assert_eq!(analysis.bot_destination, Some(BOT));
}

#[tokio::test]
async fn unreadable_blocks_are_skipped() {
    let ledger = ledger_with_bot_blocks();
    // Lose the block holding the first deposit/sweep pair.
    ledger.fail_block(990);
    let detector = DrainerDetector::new(DetectorConfig::default());

    let analysis = detector.analyze(&ledger, None, WALLET).await;

    assert_eq!(analysis.transactions_analyzed, 4);
    assert_eq!(analysis.sweep_count, 2);
    assert_eq!(analysis.risk_level, RiskLevel::High);
}

#[tokio::test]
async fn unavailable_chain_yields_low_risk_default() {
    let ledger = MockLedger::new();
    ledger.fail_block_number(ShieldError::Transport("connection refused".into()));
    let history = ScriptedHistory(Scripted::Fails);
    let detector = DrainerDetector::new(DetectorConfig::default());

    let analysis = detector.analyze(&ledger, Some(&history as &dyn HistorySource), WALLET).await;

    assert_eq!(analysis.risk_level, RiskLevel::Low);
    assert!(!analysis.bot_detected);
    assert_eq!(analysis.sweep_count, 0);
    assert_eq!(analysis.transactions_analyzed, 0);
}

#[tokio::test]
async fn scan_stops_at_configured_limit() {
    let ledger = ledger_with_bot_blocks();
    let config = DetectorConfig {
        tx_scan_count: 4,
        block_fetch_concurrency: 1,
        ..DetectorConfig::default()
    };
    let detector = DrainerDetector::new(config);

    let analysis = detector.analyze(&ledger, None, WALLET).await;

    assert_eq!(analysis.transactions_analyzed, 4);
}
