//! Benchmarks for drainer classification.
//!
//! Uses synthetic in-memory histories (no RPC).
//! Run with: `cargo bench --package shield-analysis`

use alloy::primitives::{address, Address, B256, U256};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use shield_analysis::drainer::classify;
use shield_data::config::DetectorConfig;
use shield_data::types::HistoricalTransaction;

const WALLET: Address = address!("70997970c51812e339d9b73b0245ad59e15ebbf9");
const BOT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

/// Alternating deposit/sweep history of `n` transactions, newest first.
fn sample_history(n: u64) -> Vec<HistoricalTransaction> {
    (0..n)
        .rev()
        .map(|i| {
            let deposit = i % 2 == 0;
            HistoricalTransaction {
                hash: B256::with_last_byte(i as u8),
                from: if deposit { Address::with_last_byte(i as u8) } else { WALLET },
                to: Some(if deposit { WALLET } else { BOT }),
                value: U256::from(1_000_000_000_000_000u64),
                block_number: 19_000_000 + i,
                timestamp: 1_700_000_000 + i * 6,
                gas_price: 30_000_000_000 + u128::from(i) * 1_000_000,
            }
        })
        .collect()
}

/// Benchmark: classify a full 20-transaction history (the default scan count).
fn bench_classify_scan_count(c: &mut Criterion) {
    let config = DetectorConfig::default();
    let history = sample_history(config.tx_scan_count as u64);

    c.bench_function("classify_20_txs", |b| {
        b.iter_batched(
            || history.clone(),
            |txs| black_box(classify(&config, WALLET, txs)),
            criterion::BatchSize::SmallInput,
        )
    });
}

/// Benchmark: worst case for the quadratic pairing, every deposit precedes every sweep.
fn bench_classify_deposits_then_sweeps(c: &mut Criterion) {
    let config = DetectorConfig::default();
    let mut history = sample_history(200);
    for (i, tx) in history.iter_mut().enumerate() {
        let deposit = i >= 100;
        tx.from = if deposit { BOT } else { WALLET };
        tx.to = Some(if deposit { WALLET } else { BOT });
    }

    c.bench_function("classify_200_txs_worst_case", |b| {
        b.iter_batched(
            || history.clone(),
            |txs| black_box(classify(&config, WALLET, txs)),
            criterion::BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_classify_scan_count,
    bench_classify_deposits_then_sweeps
);
criterion_main!(benches);
