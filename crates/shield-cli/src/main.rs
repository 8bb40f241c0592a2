use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::utils::{format_ether, format_units, parse_ether};
use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use shield_analysis::{recommend, DrainerDetector, GasPreset, SubmissionPath};
use shield_data::config::chain_name;
use shield_data::history::{ExplorerHistory, HistorySource};
use shield_data::inventory::scan_wallet;
use shield_data::types::{BundleResult, BundleStatus, ExecutionResult, ExecutionStatus, GasConfig, GWEI};
use shield_data::{AlloyLedger, LedgerProvider, ShieldConfig};
use shield_exec::signer::signer_from_key;
use shield_exec::{
    BundleExecutor, ExecutionMode, FlashbotsRelay, RescueExecutor, RescueRequest, RescueSession,
    SessionOutcome, SigningIdentity as _, TemplateBuilder,
};
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

const RPC_URL_ENV: &str = "SHIELD_RPC_URL";
const COMPROMISED_KEY_ENV: &str = "SHIELD_COMPROMISED_KEY";
const FUNDING_KEY_ENV: &str = "SHIELD_FUNDING_KEY";
const EXPLORER_KEY_ENV: &str = "SHIELD_EXPLORER_KEY";

#[derive(Debug, Clone)]
struct AppContext {
    config: ShieldConfig,
    rpc_url: Option<String>,
    explorer_key: Option<String>,
}

#[derive(Parser, Debug)]
#[command(name = "drain-shield")]
#[command(about = "Rescue assets from a wallet watched by a drainer bot")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "shield.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify drainer-bot risk from the wallet's recent history.
    Detect(DetectArgs),
    /// Show the ETH balance and recently received NFTs.
    Scan(ScanArgs),
    /// Print the rescue transaction template as JSON without signing.
    Template(TemplateArgs),
    /// Wait for a deposit and fire the rescue transaction.
    Rescue(RescueArgs),
    /// Fund and rescue atomically through a bundle relay.
    Bundle(BundleArgs),
}

#[derive(Args, Debug)]
struct DetectArgs {
    #[arg(long)]
    address: String,

    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

#[derive(Args, Debug)]
struct ScanArgs {
    #[arg(long)]
    address: String,

    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ActionKind {
    Eth,
    Erc20,
    Erc721,
    Revoke,
    EnsTransfer,
    EnsRecord,
}

/// Rescue action and its parameters.
#[derive(Args, Debug)]
struct ActionArgs {
    #[arg(long, value_enum, default_value = "eth")]
    action: ActionKind,

    /// Safe wallet receiving the rescued asset.
    #[arg(long)]
    safe: Option<String>,

    /// ERC-20 or approval token contract.
    #[arg(long)]
    token: Option<String>,

    /// ERC-20 amount in base units.
    #[arg(long)]
    amount: Option<String>,

    #[arg(long)]
    symbol: Option<String>,

    /// ERC-721 contract.
    #[arg(long)]
    contract: Option<String>,

    #[arg(long)]
    token_id: Option<String>,

    /// Spender whose allowance is revoked.
    #[arg(long)]
    spender: Option<String>,

    /// ENS name, e.g. `vault.eth`.
    #[arg(long)]
    name: Option<String>,

    /// ENS text-record key.
    #[arg(long)]
    key: Option<String>,

    /// ENS text-record value.
    #[arg(long)]
    record_value: Option<String>,

    /// Current owner for NFT and ENS transfers; defaults to the compromised wallet.
    #[arg(long)]
    owner: Option<String>,
}

#[derive(Args, Debug)]
struct TemplateArgs {
    #[command(flatten)]
    action: ActionArgs,

    #[arg(long, default_value = "normal")]
    preset: GasPreset,
}

#[derive(Args, Debug)]
struct RescueArgs {
    #[command(flatten)]
    action: ActionArgs,

    /// Gas preset; chosen from a drainer analysis when omitted.
    #[arg(long)]
    preset: Option<GasPreset>,

    /// Broadcast through the private-mempool RPC.
    #[arg(long)]
    private: bool,

    /// Sign but never broadcast.
    #[arg(long)]
    dry_run: bool,

    /// Execute against the current balance instead of waiting for a deposit.
    #[arg(long)]
    immediate: bool,
}

#[derive(Args, Debug)]
struct BundleArgs {
    #[command(flatten)]
    action: ActionArgs,

    /// ETH sent from the funding wallet to the compromised wallet.
    #[arg(long)]
    funding_amount: String,

    #[arg(long)]
    preset: Option<GasPreset>,

    /// Build and sign the bundle without contacting the relay.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let config = ShieldConfig::load(&cli.config)?;
    let ctx = AppContext {
        rpc_url: std::env::var(RPC_URL_ENV)
            .ok()
            .or_else(|| config.network.rpc_url.clone()),
        explorer_key: std::env::var(EXPLORER_KEY_ENV)
            .ok()
            .or_else(|| config.network.explorer_api_key.clone()),
        config,
    };

    match cli.command {
        Commands::Detect(args) => handle_detect(&ctx, args).await,
        Commands::Scan(args) => handle_scan(&ctx, args).await,
        Commands::Template(args) => handle_template(&ctx, args),
        Commands::Rescue(args) => handle_rescue(&ctx, args).await,
        Commands::Bundle(args) => handle_bundle(&ctx, args).await,
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

async fn connect(ctx: &AppContext) -> Result<Arc<dyn LedgerProvider>> {
    let rpc_url = ctx
        .rpc_url
        .as_deref()
        .ok_or_else(|| eyre!("{RPC_URL_ENV} (or network.rpc_url) is required"))?;
    let ledger = AlloyLedger::connect(rpc_url, ctx.config.network.rpc_timeout())
        .await
        .wrap_err("failed to connect to RPC endpoint")?;
    Ok(Arc::new(ledger))
}

async fn resolve_chain_id(ctx: &AppContext, provider: &dyn LedgerProvider) -> u64 {
    match provider.chain_id().await {
        Ok(chain_id) => chain_id,
        Err(e) => {
            warn!(error = %e, fallback = ctx.config.network.chain_id, "chain id unavailable");
            ctx.config.network.chain_id
        }
    }
}

fn explorer(ctx: &AppContext, chain_id: u64) -> Result<Option<ExplorerHistory>> {
    let timeout = ctx.config.detector.history_timeout();
    let history = match &ctx.config.network.explorer_url {
        Some(url) => Some(ExplorerHistory::with_base_url(
            url,
            ctx.explorer_key.clone(),
            timeout,
        )?),
        None => ExplorerHistory::for_chain(chain_id, ctx.explorer_key.clone(), timeout)?,
    };
    if history.is_none() {
        info!(chain_id, "no explorer API for this chain, history comes from block scan");
    }
    Ok(history)
}

fn load_key(var: &str) -> Result<PrivateKeySigner> {
    let key = std::env::var(var).map_err(|_| eyre!("{var} is required"))?;
    signer_from_key(key.trim()).wrap_err_with(|| format!("{var} is not a valid private key"))
}

fn parse_address(value: &str, flag: &str) -> Result<Address> {
    value
        .parse()
        .map_err(|e| eyre!("invalid {flag} '{value}': {e}"))
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn format_gwei(wei: u128) -> String {
    format!("{:.2}", wei as f64 / GWEI as f64)
}

impl ActionArgs {
    fn into_request(self, default_owner: Option<Address>) -> Result<RescueRequest> {
        let owner = || -> Result<String> {
            match (&self.owner, default_owner) {
                (Some(owner), _) => Ok(owner.clone()),
                (None, Some(owner)) => Ok(owner.to_string()),
                (None, None) => Err(eyre!(
                    "--owner is required when {COMPROMISED_KEY_ENV} is not set"
                )),
            }
        };

        let request = match self.action {
            ActionKind::Eth => RescueRequest::Eth {
                safe: required(&self.safe, "--safe")?,
            },
            ActionKind::Erc20 => RescueRequest::Erc20 {
                token: required(&self.token, "--token")?,
                safe: required(&self.safe, "--safe")?,
                amount: parse_u256(&required(&self.amount, "--amount")?, "--amount")?,
                symbol: self.symbol.clone(),
            },
            ActionKind::Erc721 => RescueRequest::Erc721 {
                owner: owner()?,
                contract: required(&self.contract, "--contract")?,
                token_id: parse_u256(&required(&self.token_id, "--token-id")?, "--token-id")?,
                safe: required(&self.safe, "--safe")?,
            },
            ActionKind::Revoke => RescueRequest::ApprovalRevoke {
                token: required(&self.token, "--token")?,
                spender: required(&self.spender, "--spender")?,
                symbol: self.symbol.clone(),
            },
            ActionKind::EnsTransfer => RescueRequest::EnsTransfer {
                owner: owner()?,
                name: required(&self.name, "--name")?,
                safe: required(&self.safe, "--safe")?,
            },
            ActionKind::EnsRecord => RescueRequest::EnsRecord {
                name: required(&self.name, "--name")?,
                key: required(&self.key, "--key")?,
                value: self.record_value.clone().unwrap_or_default(),
            },
        };
        Ok(request)
    }
}

fn required(value: &Option<String>, flag: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| eyre!("{flag} is required for this action"))
}

fn parse_u256(value: &str, flag: &str) -> Result<U256> {
    value
        .parse::<U256>()
        .map_err(|e| eyre!("invalid {flag} '{value}': {e}"))
}

/// Gas for a live rescue: the named preset, or a recommendation from a fresh
/// drainer analysis of `address`.
async fn resolve_gas(
    ctx: &AppContext,
    provider: &dyn LedgerProvider,
    address: Address,
    preset: Option<GasPreset>,
    path_in_use: SubmissionPath,
) -> Result<GasConfig> {
    if let Some(preset) = preset {
        info!(%preset, "using gas preset");
        return Ok(preset.fees(&ctx.config.presets).gas_config());
    }

    let chain_id = resolve_chain_id(ctx, provider).await;
    let history = explorer(ctx, chain_id)?;
    let detector = DrainerDetector::new(ctx.config.detector.clone());
    let analysis = detector
        .analyze(
            provider,
            history.as_ref().map(|h| h as &dyn HistorySource),
            address,
        )
        .await;
    let rec = recommend(&analysis, &ctx.config.presets, &ctx.config.detector);

    info!(
        risk = %analysis.risk_level,
        preset = %rec.preset,
        priority_gwei = %format_gwei(rec.gas.max_priority_fee_per_gas),
        max_gwei = %format_gwei(rec.gas.max_fee_per_gas),
        "gas chosen from drainer analysis"
    );
    if rec.path != path_in_use {
        warn!(recommended = %rec.path, using = %path_in_use, "{}", analysis.recommendation);
    }
    Ok(rec.gas)
}

async fn handle_detect(ctx: &AppContext, args: DetectArgs) -> Result<()> {
    let address = parse_address(&args.address, "--address")?;
    let provider = connect(ctx).await?;
    let chain_id = resolve_chain_id(ctx, provider.as_ref()).await;
    let history = explorer(ctx, chain_id)?;

    let pb = spinner("analyzing transaction history")?;
    let detector = DrainerDetector::new(ctx.config.detector.clone());
    let analysis = detector
        .analyze(
            provider.as_ref(),
            history.as_ref().map(|h| h as &dyn HistorySource),
            address,
        )
        .await;
    let rec = recommend(&analysis, &ctx.config.presets, &ctx.config.detector);
    pb.finish_and_clear();

    match args.output.to_lowercase().as_str() {
        "table" => {
            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Metric", "Value"]);
            table.add_row(vec!["Address".to_string(), address.to_string()]);
            table.add_row(vec!["Network".to_string(), chain_name(chain_id).to_string()]);
            table.add_row(vec![
                "Transactions Analyzed".to_string(),
                analysis.transactions_analyzed.to_string(),
            ]);
            table.add_row(vec!["Risk".to_string(), analysis.risk_level.to_string()]);
            table.add_row(vec![
                "Bot Detected".to_string(),
                analysis.bot_detected.to_string(),
            ]);
            table.add_row(vec!["Sweeps".to_string(), analysis.sweep_count.to_string()]);
            table.add_row(vec![
                "Avg Sweep Latency".to_string(),
                analysis
                    .avg_sweep_seconds
                    .map(|s| format!("{s}s"))
                    .unwrap_or_else(|| "-".to_string()),
            ]);
            table.add_row(vec![
                "Bot Destination".to_string(),
                analysis
                    .bot_destination
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
            table.add_row(vec![
                "Bot Gas (gwei)".to_string(),
                analysis
                    .estimated_bot_gas_gwei
                    .map(|g| g.to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
            table.add_row(vec!["Preset".to_string(), rec.preset.to_string()]);
            table.add_row(vec!["Submission Path".to_string(), rec.path.to_string()]);
            table.add_row(vec![
                "Priority / Max Fee (gwei)".to_string(),
                format!(
                    "{} / {}",
                    format_gwei(rec.gas.max_priority_fee_per_gas),
                    format_gwei(rec.gas.max_fee_per_gas)
                ),
            ]);

            println!("{table}");
            println!("\n{}\n", analysis.recommendation);
        }
        "json" => {
            let output = serde_json::json!({
                "address": address,
                "chain_id": chain_id,
                "network": chain_name(chain_id),
                "analysis": analysis,
                "recommendation": rec,
            });
            let json_str =
                serde_json::to_string_pretty(&output).wrap_err("failed to serialize JSON")?;
            println!("{json_str}");
        }
        other => {
            return Err(eyre!(
                "unknown output format '{}'; use 'table' or 'json'",
                other
            ))
        }
    }

    Ok(())
}

async fn handle_scan(ctx: &AppContext, args: ScanArgs) -> Result<()> {
    let address = parse_address(&args.address, "--address")?;
    let provider = connect(ctx).await?;

    let pb = spinner("scanning wallet")?;
    let inventory = scan_wallet(provider.as_ref(), address)
        .await
        .wrap_err("failed to read wallet balance")?;
    pb.finish_and_clear();

    match args.output.to_lowercase().as_str() {
        "table" => {
            let scanned_at = chrono::DateTime::from_timestamp(inventory.scanned_at as i64, 0)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| inventory.scanned_at.to_string());

            let mut table = Table::new();
            table.load_preset(UTF8_BORDERS_ONLY);
            table.set_header(vec!["Metric", "Value"]);
            table.add_row(vec!["Address".to_string(), address.to_string()]);
            table.add_row(vec![
                "ETH Balance".to_string(),
                format_ether(inventory.eth_balance),
            ]);
            table.add_row(vec![
                "Tokens Held".to_string(),
                inventory.tokens.len().to_string(),
            ]);
            table.add_row(vec![
                "Active Approvals".to_string(),
                inventory.approvals.len().to_string(),
            ]);
            table.add_row(vec![
                "NFTs Received".to_string(),
                if inventory.nft_scan_degraded {
                    "unavailable".to_string()
                } else {
                    inventory.nfts.len().to_string()
                },
            ]);
            table.add_row(vec!["Scanned At".to_string(), scanned_at]);
            println!("{table}");

            if !inventory.tokens.is_empty() {
                let mut tokens = Table::new();
                tokens.load_preset(UTF8_BORDERS_ONLY);
                tokens.set_header(vec!["Token", "Contract", "Balance"]);
                for holding in &inventory.tokens {
                    tokens.add_row(vec![
                        holding.symbol.clone(),
                        holding.token.to_string(),
                        format_token(holding.balance, holding.decimals),
                    ]);
                }
                println!("\n{tokens}");
            }

            if !inventory.approvals.is_empty() {
                let mut approvals = Table::new();
                approvals.load_preset(UTF8_BORDERS_ONLY);
                approvals.set_header(vec!["Token", "Spender", "Allowance"]);
                for approval in &inventory.approvals {
                    let allowance = if approval.is_unlimited() {
                        "unlimited".to_string()
                    } else {
                        format_token(approval.allowance, approval.decimals)
                    };
                    approvals.add_row(vec![
                        approval.symbol.clone(),
                        format!("{} ({})", approval.spender_label, approval.spender),
                        allowance,
                    ]);
                }
                println!("\n{approvals}");
                if let Some(first) = inventory.approvals.first() {
                    println!(
                        "Revoke with: drain-shield bundle --action revoke --token {} --spender {} --funding-amount <ETH>",
                        first.token, first.spender
                    );
                }
            }

            if !inventory.nfts.is_empty() {
                let mut nfts = Table::new();
                nfts.load_preset(UTF8_BORDERS_ONLY);
                nfts.set_header(vec!["Contract", "Token Id"]);
                for nft in &inventory.nfts {
                    nfts.add_row(vec![nft.contract.to_string(), nft.token_id.to_string()]);
                }
                println!("\n{nfts}");
            }
        }
        "json" => {
            let json_str =
                serde_json::to_string_pretty(&inventory).wrap_err("failed to serialize JSON")?;
            println!("{json_str}");
        }
        other => {
            return Err(eyre!(
                "unknown output format '{}'; use 'table' or 'json'",
                other
            ))
        }
    }

    Ok(())
}

fn format_token(amount: U256, decimals: u8) -> String {
    format_units(amount, decimals).unwrap_or_else(|_| amount.to_string())
}

fn handle_template(ctx: &AppContext, args: TemplateArgs) -> Result<()> {
    let default_owner = std::env::var(COMPROMISED_KEY_ENV)
        .ok()
        .and_then(|key| signer_from_key(key.trim()).ok())
        .map(|signer| signer.address());
    let request = args.action.into_request(default_owner)?;
    let gas = args.preset.fees(&ctx.config.presets).gas_config();

    let template = TemplateBuilder::from_config(&ctx.config)
        .build(&request, gas)
        .wrap_err("invalid rescue parameters")?;

    let json_str = serde_json::to_string_pretty(&template).wrap_err("failed to serialize JSON")?;
    println!("{json_str}");
    Ok(())
}

async fn handle_rescue(ctx: &AppContext, args: RescueArgs) -> Result<()> {
    let compromised = load_key(COMPROMISED_KEY_ENV)?;
    let from = compromised.address();
    let provider = connect(ctx).await?;

    let path = if args.private {
        SubmissionPath::PrivateRelay
    } else {
        SubmissionPath::Public
    };
    let gas = resolve_gas(ctx, provider.as_ref(), from, args.preset, path).await?;
    let request = args.action.into_request(Some(from))?;
    let template = TemplateBuilder::from_config(&ctx.config)
        .build(&request, gas)
        .wrap_err("invalid rescue parameters")?;

    let mut executor = RescueExecutor::new(
        Arc::clone(&provider),
        ctx.config.execution.clone(),
        ctx.config.network.chain_id,
    );
    if args.private {
        let private = AlloyLedger::with_request_timeout(
            &ctx.config.network.private_rpc_url,
            ctx.config.network.rpc_timeout(),
        )
            .wrap_err("invalid private RPC URL")?;
        executor = executor.with_private_relay(Arc::new(private));
    }
    let mode = ExecutionMode {
        private: args.private,
        dry_run: args.dry_run,
    };

    let baseline = provider
        .balance(from)
        .await
        .wrap_err("failed to read compromised wallet balance")?;

    if args.immediate {
        return tokio::select! {
            result = executor.execute(&compromised, &template, baseline, mode) => {
                report_execution(&result)
            }
            _ = tokio::signal::ctrl_c() => Err(eyre!(
                "interrupted during rescue; a broadcast transaction may still confirm"
            )),
        };
    }

    let session = RescueSession::new(
        Arc::clone(&provider),
        executor,
        ctx.config.monitor.clone(),
    );
    let monitor = session.arm(from, baseline);

    // Every Ctrl-C is forwarded for as long as the session runs.
    let (interrupt_tx, mut interrupts) = mpsc::channel(4);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let pb = spinner("waiting for a deposit (Ctrl-C to cancel, twice to abort)")?;
    let mut status = session.subscribe();
    let status_pb = pb.clone();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            status_pb.set_message(format!("rescue session: {current}"));
            if current.is_terminal() {
                break;
            }
        }
    });

    println!(
        "Watching {} (baseline {} ETH) for a deposit",
        from,
        format_ether(baseline)
    );
    let outcome = session
        .run_until_interrupted(monitor, &compromised, &template, mode, &mut interrupts)
        .await;
    pb.finish_and_clear();

    match outcome {
        SessionOutcome::Cancelled => {
            println!("Monitoring cancelled; nothing was sent.");
            Ok(())
        }
        SessionOutcome::Executed { deposit, result } => {
            println!("Deposit of {} ETH detected", format_ether(deposit));
            report_execution(&result)
        }
        SessionOutcome::Interrupted { status } => Err(eyre!(
            "rescue session abandoned while {status}; a broadcast transaction may still confirm"
        )),
    }
}

async fn handle_bundle(ctx: &AppContext, args: BundleArgs) -> Result<()> {
    let funding_amount = parse_ether(&args.funding_amount)
        .map_err(|e| eyre!("invalid --funding-amount '{}': {e}", args.funding_amount))?;
    if funding_amount.is_zero() {
        return Err(eyre!("--funding-amount must be greater than zero"));
    }

    let compromised = load_key(COMPROMISED_KEY_ENV)?;
    let funding = load_key(FUNDING_KEY_ENV)?;
    if compromised.address() == funding.address() {
        return Err(eyre!(
            "{FUNDING_KEY_ENV} must belong to a different wallet than {COMPROMISED_KEY_ENV}"
        ));
    }
    let provider = connect(ctx).await?;

    let gas = resolve_gas(
        ctx,
        provider.as_ref(),
        compromised.address(),
        args.preset,
        SubmissionPath::AtomicBundle,
    )
    .await?;
    let request = args.action.into_request(Some(compromised.address()))?;
    let template = TemplateBuilder::from_config(&ctx.config)
        .build(&request, gas)
        .wrap_err("invalid rescue parameters")?;

    let relay = FlashbotsRelay::new(&ctx.config.network.relay_url, ctx.config.bundle.relay_timeout())
        .wrap_err("failed to create relay client")?;
    let executor = BundleExecutor::new(provider, Arc::new(relay), ctx.config.bundle.clone());

    let pb = spinner("submitting bundle")?;
    let result = tokio::select! {
        result = executor.execute(&compromised, &funding, &template, funding_amount, args.dry_run) => result,
        _ = tokio::signal::ctrl_c() => {
            pb.finish_and_clear();
            return Err(eyre!("interrupted; an accepted bundle may still be included"));
        }
    };
    pb.finish_and_clear();

    report_bundle(&result)
}

fn report_execution(result: &ExecutionResult) -> Result<()> {
    let status = match result.status {
        ExecutionStatus::Success => "success",
        ExecutionStatus::Reverted => "reverted",
        ExecutionStatus::Error => "error",
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Status".to_string(), status.to_string()]);
    table.add_row(vec!["Dry Run".to_string(), result.dry_run.to_string()]);
    table.add_row(vec![
        "Tx Hash".to_string(),
        result
            .tx_hash
            .map(|h| h.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec![
        "Block".to_string(),
        result
            .block_number
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);
    if let Some(error) = &result.error {
        table.add_row(vec!["Error".to_string(), error.to_string()]);
    }
    println!("{table}");

    match result.status {
        ExecutionStatus::Success => Ok(()),
        _ => Err(eyre!("rescue {status}")),
    }
}

fn report_bundle(result: &BundleResult) -> Result<()> {
    let status = match result.status {
        BundleStatus::Success => "success",
        BundleStatus::NotIncluded => "not included",
        BundleStatus::Error => "error",
    };

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Status".to_string(), status.to_string()]);
    table.add_row(vec![
        "Bundle Hash".to_string(),
        result.bundle_hash.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    table.add_row(vec!["Target Block".to_string(), result.target_block.to_string()]);
    table.add_row(vec![
        "Included Block".to_string(),
        result
            .included_block
            .map(|b| b.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ]);
    for (label, hash) in ["Funding Tx", "Rescue Tx"].iter().zip(&result.tx_hashes) {
        table.add_row(vec![label.to_string(), hash.to_string()]);
    }
    if let Some(error) = &result.error {
        table.add_row(vec!["Error".to_string(), error.to_string()]);
    }
    println!("{table}");

    match result.status {
        BundleStatus::Success => Ok(()),
        BundleStatus::NotIncluded => Err(eyre!(
            "bundle was not included; the drainer may have moved the nonce, rerun to retry"
        )),
        BundleStatus::Error => Err(eyre!("bundle {status}")),
    }
}
