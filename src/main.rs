use std::{path::PathBuf, process::ExitCode};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use erc20_ledger::{
    config::DevnetConfig,
    scenario::run_erc20_suite,
    units::{format_units, parse_units, DEFAULT_DECIMALS},
    Address, Amount, Devnet,
};

#[derive(Parser)]
#[command(name = "erc20")]
#[command(about = "ERC20 ledger on an in-process devnet")]
struct Cli {
    /// Log filter, e.g. `debug` or `erc20_ledger=trace`; overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ERC20 check suite against fresh deployments
    Suite {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
    },
    /// List devnet signers and their native balances
    Signers {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Convert between decimal strings and base units
    Units {
        #[command(subcommand)]
        op: UnitsOp,
    },
    /// Deploy the configured token, apply transfers from the deployer and print the snapshot
    Snapshot {
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// `<ADDRESS>:<AMOUNT>` in whole tokens; repeatable
        #[arg(long = "transfer", value_name = "TO:AMOUNT")]
        transfers: Vec<String>,
    },
}

#[derive(Subcommand)]
enum UnitsOp {
    Parse {
        value: String,
        #[arg(long, default_value_t = DEFAULT_DECIMALS)]
        decimals: u8,
    },
    Format {
        value: Amount,
        #[arg(long, default_value_t = DEFAULT_DECIMALS)]
        decimals: u8,
    },
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(l) => EnvFilter::new(l),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<DevnetConfig> {
    DevnetConfig::load_or_default(path.map(PathBuf::as_path))
        .with_context(|| match path {
            Some(p) => format!("loading {}", p.display()),
            None => "default config".to_string(),
        })
}

fn suite_cmd(config: Option<PathBuf>, json: bool) -> Result<bool> {
    let config = load_config(config.as_ref())?;
    let outcomes = run_erc20_suite(&config);
    let passed = outcomes.iter().filter(|o| o.passed).count();
    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    } else {
        for outcome in &outcomes {
            let mark = match (outcome.passed, outcome.skipped) {
                (_, true) => "skip",
                (true, false) => "ok  ",
                (false, false) => "FAIL",
            };
            println!("{mark} {}", outcome.name);
            if let Some(detail) = &outcome.detail {
                println!("     {detail}");
            }
        }
        println!("{passed}/{} checks passed", outcomes.len());
    }
    Ok(passed == outcomes.len())
}

fn signers_cmd(config: Option<PathBuf>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let devnet = Devnet::new(&config)?;
    for (i, signer) in devnet.signers().iter().enumerate() {
        let balance = devnet.native_balance(&signer.address());
        println!(
            "#{i:<2} {}  {}  {} ETH",
            signer.address(),
            signer.public_key_hex(),
            format_units(balance, DEFAULT_DECIMALS)?
        );
    }
    Ok(())
}

fn parse_transfer(arg: &str, decimals: u8) -> Result<(Address, Amount)> {
    let Some((to, amount)) = arg.rsplit_once(':') else {
        bail!("transfer {arg:?} must look like <ADDRESS>:<AMOUNT>");
    };
    let to: Address = to.parse().with_context(|| format!("address in {arg:?}"))?;
    let amount = parse_units(amount, decimals).with_context(|| format!("amount in {arg:?}"))?;
    Ok((to, amount))
}

fn snapshot_cmd(config: Option<PathBuf>, transfers: Vec<String>) -> Result<()> {
    let config = load_config(config.as_ref())?;
    let mut devnet = Devnet::new(&config)?;
    let deployer = devnet.signer(0)?;
    let receipt = devnet.deploy_token(
        &deployer,
        config.token.metadata(),
        config.token.supply()?,
        None,
    )?;
    let token = receipt
        .contract_address
        .context("deployment receipt has no contract address")?;
    info!(%token, "token ready");

    for arg in &transfers {
        let (to, amount) = parse_transfer(arg, config.token.decimals)?;
        devnet
            .token_transfer(&deployer, &token, &to, amount)
            .with_context(|| format!("transfer {arg}"))?;
    }

    let snapshot = devnet.token(&token)?.snapshot();
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::Suite { config, json } => suite_cmd(config, json),
        Commands::Signers { config } => signers_cmd(config).map(|_| true),
        Commands::Units { op } => {
            match op {
                UnitsOp::Parse { value, decimals } => {
                    println!("{}", parse_units(&value, decimals)?)
                }
                UnitsOp::Format { value, decimals } => {
                    println!("{}", format_units(value, decimals)?)
                }
            }
            Ok(true)
        }
        Commands::Snapshot { config, transfers } => snapshot_cmd(config, transfers).map(|_| true),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}
