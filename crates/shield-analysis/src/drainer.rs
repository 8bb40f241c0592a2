//! Drainer-bot pattern detection.
//!
//! A drainer bot watches a compromised wallet and moves out every deposit
//! within seconds, usually to the same collector address. The detector pairs
//! each deposit with the first outgoing transfer that follows it and grades
//! the wallet on how fast and how concentrated those sweeps are.
//!
//! Detection never fails: every history or RPC problem degrades to a smaller
//! input set, and too little input yields a conservative low-risk result.

use alloy::primitives::{Address, U256};
use shield_data::config::DetectorConfig;
use shield_data::history::{scan_recent_blocks, HistorySource};
use shield_data::provider::LedgerProvider;
use shield_data::types::{DrainerAnalysis, HistoricalTransaction, RiskLevel, SweepPattern};
use tracing::{debug, info, warn};

const WEI_PER_GWEI: f64 = 1e9;

/// Classifies wallets by drainer-bot risk.
#[derive(Clone, Debug, Default)]
pub struct DrainerDetector {
    config: DetectorConfig,
}

impl DrainerDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyzes the recent history of `address`.
    ///
    /// The indexed `history` source is tried first, bounded by
    /// `history_timeout_ms`. When it is absent, fails, times out or returns
    /// nothing, the last `fallback_block_range` blocks are scanned instead.
    #[tracing::instrument(skip_all, fields(address = %address))]
    pub async fn analyze(
        &self,
        provider: &dyn LedgerProvider,
        history: Option<&dyn HistorySource>,
        address: Address,
    ) -> DrainerAnalysis {
        let txs = self.collect_history(provider, history, address).await;
        info!(tx_count = txs.len(), "analyzing transactions");

        let analysis = classify(&self.config, address, txs);
        info!(
            risk = %analysis.risk_level,
            bot_detected = analysis.bot_detected,
            sweep_count = analysis.sweep_count,
            "drainer analysis complete"
        );
        if let Some(destination) = analysis.bot_destination {
            info!(%destination, "primary sweep destination");
        }
        analysis
    }

    async fn collect_history(
        &self,
        provider: &dyn LedgerProvider,
        history: Option<&dyn HistorySource>,
        address: Address,
    ) -> Vec<HistoricalTransaction> {
        let limit = self.config.tx_scan_count;

        if let Some(source) = history {
            let fetch = source.recent_transactions(address, limit);
            match tokio::time::timeout(self.config.history_timeout(), fetch).await {
                Ok(Ok(txs)) if !txs.is_empty() => {
                    info!(tx_count = txs.len(), "fetched indexed history");
                    return txs;
                }
                Ok(Ok(_)) => debug!("indexed history is empty"),
                Ok(Err(e)) => warn!(error = %e, "indexed history failed, falling back to block scan"),
                Err(_) => warn!(
                    timeout_ms = self.config.history_timeout_ms,
                    "indexed history timed out, falling back to block scan"
                ),
            }
        }

        match scan_recent_blocks(
            provider,
            address,
            self.config.fallback_block_range,
            limit,
            self.config.block_fetch_timeout(),
            self.config.block_fetch_concurrency,
        )
        .await
        {
            Ok(txs) => txs,
            Err(e) => {
                warn!(error = %e, "block scan failed, no history available");
                Vec::new()
            }
        }
    }
}

fn is_deposit(address: Address, tx: &HistoricalTransaction) -> bool {
    tx.to == Some(address) && tx.value > U256::ZERO
}

fn is_outgoing(address: Address, tx: &HistoricalTransaction) -> bool {
    tx.from == address && tx.value > U256::ZERO
}

/// Pairs every deposit with the first outgoing transfer after it.
///
/// `txs` must be sorted by timestamp. Two deposits followed by one outgoing
/// transfer produce two patterns sharing that transfer.
pub fn find_sweeps(address: Address, txs: &[HistoricalTransaction]) -> Vec<SweepPattern> {
    let mut sweeps = Vec::new();
    for (i, deposit) in txs.iter().enumerate() {
        if !is_deposit(address, deposit) {
            continue;
        }
        if let Some(sweep) = txs[i + 1..].iter().find(|tx| is_outgoing(address, tx)) {
            sweeps.push(SweepPattern {
                deposit_timestamp: deposit.timestamp,
                sweep_timestamp: sweep.timestamp,
                destination: sweep.to,
                gas_price: sweep.gas_price,
            });
        }
    }
    sweeps
}

/// Grades `txs` (any order) for drainer activity against `address`.
pub fn classify(
    config: &DetectorConfig,
    address: Address,
    mut txs: Vec<HistoricalTransaction>,
) -> DrainerAnalysis {
    let analyzed = txs.len();
    if analyzed < 2 {
        return DrainerAnalysis::insufficient_history(analyzed);
    }

    // Stable, so same-block transactions keep their source order.
    txs.sort_by_key(|tx| tx.timestamp);

    let sweeps = find_sweeps(address, &txs);
    debug!(sweep_count = sweeps.len(), "paired deposits with sweeps");

    if sweeps.is_empty() {
        return classify_without_sweeps(config, address, &txs);
    }

    let latencies: Vec<u64> = sweeps.iter().map(SweepPattern::latency_seconds).collect();
    let avg_latency = latencies.iter().sum::<u64>() as f64 / latencies.len() as f64;
    let fast_sweeps = latencies
        .iter()
        .filter(|latency| **latency <= config.fast_sweep_seconds)
        .count();

    let (top_destination, top_count) = dominant_destination(&sweeps);
    let concentration = top_count as f64 / sweeps.len() as f64;

    let bot_gas_gwei = sweeps
        .iter()
        .map(|sweep| sweep.gas_price)
        .filter(|gas| *gas > 0)
        .max()
        .map(|gas| gas as f64 / WEI_PER_GWEI);
    let fee_floor =
        |multiplier: f64| (bot_gas_gwei.unwrap_or(config.default_bot_gas_gwei) * multiplier).ceil();

    let bot_detected = fast_sweeps >= 1 || concentration > config.concentration_threshold;

    let (risk_level, recommendation) = if fast_sweeps >= config.aggressive_fast_sweeps
        && concentration > config.aggressive_concentration
    {
        (
            RiskLevel::High,
            format!(
                "Aggressive drainer bot detected. Sweeps average {avg_latency:.0}s. Use the \
                 atomic bundle path with a priority fee above {} gwei.",
                fee_floor(config.high_fee_multiplier)
            ),
        )
    } else if fast_sweeps >= config.confirmed_fast_sweeps
        || (fast_sweeps >= 1 && concentration > config.concentration_threshold)
    {
        (
            RiskLevel::High,
            format!(
                "Drainer bot confirmed. {fast_sweeps} fast sweep(s) averaging \
                 {avg_latency:.0}s. Use the atomic bundle path with a priority fee above {} gwei.",
                fee_floor(config.high_fee_multiplier)
            ),
        )
    } else if bot_detected {
        (
            RiskLevel::Medium,
            format!(
                "Likely drainer activity. {} sweep pattern(s) detected. Use the private relay \
                 with a priority fee above {} gwei.",
                sweeps.len(),
                fee_floor(config.medium_fee_multiplier)
            ),
        )
    } else {
        (
            RiskLevel::Low,
            "Some sweep patterns detected but timing suggests manual operation. The fast gas \
             preset should suffice."
                .to_string(),
        )
    };

    DrainerAnalysis {
        risk_level,
        bot_detected,
        sweep_count: sweeps.len(),
        avg_sweep_seconds: Some(avg_latency.round() as u64),
        bot_destination: if concentration > config.concentration_threshold {
            top_destination
        } else {
            None
        },
        estimated_bot_gas_gwei: bot_gas_gwei.map(|gwei| gwei.round() as u64),
        recommendation,
        transactions_analyzed: analyzed,
    }
}

/// Most frequent sweep destination and its count; ties go to the destination
/// seen first.
fn dominant_destination(sweeps: &[SweepPattern]) -> (Option<Address>, usize) {
    let mut counts: Vec<(Option<Address>, usize)> = Vec::new();
    for sweep in sweeps {
        match counts.iter_mut().find(|(dest, _)| *dest == sweep.destination) {
            Some((_, count)) => *count += 1,
            None => counts.push((sweep.destination, 1)),
        }
    }

    let mut best = (None, 0);
    for (dest, count) in counts {
        if count > best.1 {
            best = (dest, count);
        }
    }
    best
}

fn classify_without_sweeps(
    config: &DetectorConfig,
    address: Address,
    txs: &[HistoricalTransaction],
) -> DrainerAnalysis {
    let outgoing: Vec<&HistoricalTransaction> =
        txs.iter().filter(|tx| is_outgoing(address, tx)).collect();

    if config.single_destination_heuristic && outgoing.len() >= 2 {
        if let Some(destination) = outgoing[0].to {
            if outgoing.iter().all(|tx| tx.to == Some(destination)) {
                info!(%destination, "all outgoing transfers go to one address, possible sweeper");
                return DrainerAnalysis {
                    risk_level: RiskLevel::Medium,
                    bot_detected: true,
                    sweep_count: outgoing.len(),
                    avg_sweep_seconds: None,
                    bot_destination: Some(destination),
                    estimated_bot_gas_gwei: None,
                    recommendation: format!(
                        "All {} outgoing transactions go to the same address. Likely a drainer. \
                         Use the private relay or the atomic bundle path.",
                        outgoing.len()
                    ),
                    transactions_analyzed: txs.len(),
                };
            }
        }
    }

    DrainerAnalysis {
        risk_level: RiskLevel::Low,
        bot_detected: false,
        sweep_count: 0,
        avg_sweep_seconds: None,
        bot_destination: None,
        estimated_bot_gas_gwei: None,
        recommendation: "No drainer sweep patterns detected. Standard gas settings should work."
            .to_string(),
        transactions_analyzed: txs.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, B256};

    const WALLET: Address = address!("70997970c51812e339d9b73b0245ad59e15ebbf9");
    const BOT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    const FUNDER: Address = address!("3c44cdddb6a900fa2b585dd299e03d12fa4293bc");

    fn tx(seq: u64, from: Address, to: Address, timestamp: u64, gas_gwei: u128) -> HistoricalTransaction {
        HistoricalTransaction {
            hash: B256::with_last_byte(seq as u8),
            from,
            to: Some(to),
            value: U256::from(1_000_000_000_000_000u64),
            block_number: 19_000_000 + seq,
            timestamp,
            gas_price: gas_gwei * 1_000_000_000,
        }
    }

    /// Deposit from `FUNDER`, then sweep to `dest` after `latency` seconds.
    fn pair(seq: u64, start: u64, latency: u64, dest: Address) -> [HistoricalTransaction; 2] {
        [
            tx(seq * 2, FUNDER, WALLET, start, 20),
            tx(seq * 2 + 1, WALLET, dest, start + latency, 40),
        ]
    }

    fn config() -> DetectorConfig {
        DetectorConfig::default()
    }

    #[test]
    fn empty_and_single_histories_are_low_risk() {
        let empty = classify(&config(), WALLET, Vec::new());
        assert_eq!(empty.risk_level, RiskLevel::Low);
        assert_eq!(empty.sweep_count, 0);

        let single = classify(&config(), WALLET, vec![tx(1, FUNDER, WALLET, 100, 20)]);
        assert_eq!(single.risk_level, RiskLevel::Low);
        assert_eq!(single.sweep_count, 0);
        assert!(!single.bot_detected);
        assert_eq!(single.transactions_analyzed, 1);
    }

    #[test]
    fn three_fast_sweeps_to_one_address_are_high_risk() {
        let txs: Vec<_> = (0..3)
            .flat_map(|i| pair(i, 1_000 + i * 600, 4, BOT))
            .collect();
        let analysis = classify(&config(), WALLET, txs);

        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert!(analysis.bot_detected);
        assert_eq!(analysis.sweep_count, 3);
        assert_eq!(analysis.bot_destination, Some(BOT));
        assert_eq!(analysis.avg_sweep_seconds, Some(4));
        assert_eq!(analysis.estimated_bot_gas_gwei, Some(40));
        assert!(analysis.recommendation.starts_with("Aggressive"));
        // ceil(40 * 1.5)
        assert!(analysis.recommendation.contains("above 60 gwei"));
    }

    #[test]
    fn slow_sweeps_to_distinct_addresses_are_never_high() {
        let dests = [
            BOT,
            address!("90f79bf6eb2c4f870365e785982e1f101e93b906"),
            address!("15d34aaf54267db7d7c367839aaf71a00a2c6a65"),
        ];
        let txs: Vec<_> = dests
            .iter()
            .enumerate()
            .flat_map(|(i, dest)| pair(i as u64, 10_000 * (i as u64 + 1), 90, *dest))
            .collect();
        let analysis = classify(&config(), WALLET, txs);

        assert_ne!(analysis.risk_level, RiskLevel::High);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
        assert!(!analysis.bot_detected);
        assert_eq!(analysis.bot_destination, None);
        assert_eq!(analysis.sweep_count, 3);
    }

    #[test]
    fn concentrated_slow_sweeps_are_medium() {
        let txs: Vec<_> = (0..2)
            .flat_map(|i| pair(i, 5_000 + i * 1_000, 120, BOT))
            .collect();
        let analysis = classify(&config(), WALLET, txs);

        assert_eq!(analysis.risk_level, RiskLevel::Medium);
        assert!(analysis.bot_detected);
        assert_eq!(analysis.bot_destination, Some(BOT));
        // ceil(40 * 1.2)
        assert!(analysis.recommendation.contains("above 48 gwei"));
    }

    #[test]
    fn one_fast_sweep_with_concentration_is_high() {
        let mut txs: Vec<_> = pair(0, 1_000, 3, BOT).into();
        txs.extend(pair(1, 5_000, 300, BOT));
        let analysis = classify(&config(), WALLET, txs);

        assert_eq!(analysis.risk_level, RiskLevel::High);
        assert!(analysis.recommendation.starts_with("Drainer bot confirmed"));
    }

    #[test]
    fn deposit_pairs_with_first_later_outgoing_transfer() {
        let txs = vec![
            tx(1, FUNDER, WALLET, 100, 20),
            tx(2, WALLET, FUNDER, 200, 30),
            tx(3, WALLET, BOT, 205, 90),
        ];
        let sweeps = find_sweeps(WALLET, &txs);

        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].latency_seconds(), 100);
        assert_eq!(sweeps[0].destination, Some(FUNDER));
    }

    #[test]
    fn input_order_does_not_matter() {
        let mut txs: Vec<_> = (0..3)
            .flat_map(|i| pair(i, 1_000 + i * 600, 4, BOT))
            .collect();
        let sorted = classify(&config(), WALLET, txs.clone());
        txs.reverse();
        let reversed = classify(&config(), WALLET, txs);
        assert_eq!(sorted, reversed);
    }

    #[test]
    fn destination_ties_go_to_first_seen() {
        let other = address!("90f79bf6eb2c4f870365e785982e1f101e93b906");
        let mut txs: Vec<_> = pair(0, 1_000, 100, other).into();
        txs.extend(pair(1, 2_000, 100, BOT));
        let sweeps = find_sweeps(WALLET, &txs);
        assert_eq!(dominant_destination(&sweeps), (Some(other), 1));
    }

    #[test]
    fn repeated_outgoing_to_one_address_without_deposits_is_medium() {
        let txs = vec![
            tx(1, WALLET, BOT, 100, 20),
            tx(2, WALLET, BOT, 200, 20),
            tx(3, WALLET, BOT, 300, 20),
        ];
        let analysis = classify(&config(), WALLET, txs.clone());

        assert_eq!(analysis.risk_level, RiskLevel::Medium);
        assert!(analysis.bot_detected);
        assert_eq!(analysis.sweep_count, 3);
        assert_eq!(analysis.bot_destination, Some(BOT));

        let mut disabled = config();
        disabled.single_destination_heuristic = false;
        let analysis = classify(&disabled, WALLET, txs);
        assert_eq!(analysis.risk_level, RiskLevel::Low);
        assert_eq!(analysis.sweep_count, 0);
    }

    #[test]
    fn missing_gas_uses_default_bot_gas() {
        let mut txs: Vec<_> = (0..2)
            .flat_map(|i| pair(i, 5_000 + i * 1_000, 120, BOT))
            .collect();
        for tx in &mut txs {
            tx.gas_price = 0;
        }
        let analysis = classify(&config(), WALLET, txs);

        assert_eq!(analysis.estimated_bot_gas_gwei, None);
        // ceil(10 * 1.2)
        assert!(analysis.recommendation.contains("above 12 gwei"));
    }
}
