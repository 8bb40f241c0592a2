//! Gas strategy for racing a drainer bot.
//!
//! Maps a [`DrainerAnalysis`] to a named fee preset, a submission path and a
//! concrete fee pair whose priority fee outbids the bot's observed gas price.

use std::fmt;

use serde::Serialize;
use shield_data::config::{DetectorConfig, GasPresets, PresetFees};
use shield_data::types::{DrainerAnalysis, GasConfig, RiskLevel, GWEI};

/// Named fee presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GasPreset {
    Normal,
    Fast,
    Aggressive,
}

impl GasPreset {
    /// Fee pair configured for this preset.
    pub fn fees(self, presets: &GasPresets) -> PresetFees {
        match self {
            GasPreset::Normal => presets.normal,
            GasPreset::Fast => presets.fast,
            GasPreset::Aggressive => presets.aggressive,
        }
    }
}

impl fmt::Display for GasPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GasPreset::Normal => "normal",
            GasPreset::Fast => "fast",
            GasPreset::Aggressive => "aggressive",
        };
        f.write_str(label)
    }
}

impl std::str::FromStr for GasPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(GasPreset::Normal),
            "fast" => Ok(GasPreset::Fast),
            "aggressive" => Ok(GasPreset::Aggressive),
            other => Err(format!("unknown gas preset '{other}' (normal, fast, aggressive)")),
        }
    }
}

/// How the rescue transaction reaches a block builder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionPath {
    /// Public mempool.
    Public,
    /// Private-mempool RPC; hidden until mined.
    PrivateRelay,
    /// Funding and rescue submitted together as one bundle.
    AtomicBundle,
}

impl fmt::Display for SubmissionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SubmissionPath::Public => "public mempool",
            SubmissionPath::PrivateRelay => "private relay",
            SubmissionPath::AtomicBundle => "atomic bundle",
        };
        f.write_str(label)
    }
}

/// Suggested fees and submission path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GasRecommendation {
    pub preset: GasPreset,
    pub path: SubmissionPath,
    pub gas: GasConfig,
}

/// Recommends fees for the risk in `analysis`.
///
/// High risk uses the aggressive preset over an atomic bundle, medium risk the
/// fast preset over the private relay. For both, the priority fee is raised to
/// at least the detector's multiplier over the estimated bot gas price, and
/// the max fee is never below the priority fee.
pub fn recommend(
    analysis: &DrainerAnalysis,
    presets: &GasPresets,
    config: &DetectorConfig,
) -> GasRecommendation {
    let (preset, path, multiplier) = match analysis.risk_level {
        RiskLevel::High => (
            GasPreset::Aggressive,
            SubmissionPath::AtomicBundle,
            Some(config.high_fee_multiplier),
        ),
        RiskLevel::Medium => (
            GasPreset::Fast,
            SubmissionPath::PrivateRelay,
            Some(config.medium_fee_multiplier),
        ),
        RiskLevel::Low if analysis.sweep_count > 0 => (GasPreset::Fast, SubmissionPath::Public, None),
        RiskLevel::Low => (GasPreset::Normal, SubmissionPath::Public, None),
    };

    let mut gas = preset.fees(presets).gas_config();
    if let Some(multiplier) = multiplier {
        let bot_gwei = analysis
            .estimated_bot_gas_gwei
            .map(|gwei| gwei as f64)
            .unwrap_or(config.default_bot_gas_gwei);
        let floor = (bot_gwei * multiplier).ceil().max(0.0) as u128 * GWEI;
        gas.max_priority_fee_per_gas = gas.max_priority_fee_per_gas.max(floor);
    }
    gas.max_fee_per_gas = gas.max_fee_per_gas.max(gas.max_priority_fee_per_gas);

    GasRecommendation { preset, path, gas }
}
