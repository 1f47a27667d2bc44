// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BAKERPAY CLI - Reward payout distribution for bakers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

use bakerpay_core::error::{ExitStatus, PayoutError, EXIT_SUCCESS};

mod commands;
mod notifications;
mod print;

#[derive(Parser)]
#[command(name = "bakerpay")]
#[command(about = "Baker reward payout distribution", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: <workdir>/config.toml)
    #[arg(short, long, env = "BAKERPAY_CONFIG")]
    config: Option<PathBuf>,

    /// Working directory (default: ~/.bakerpay)
    #[arg(short, long, env = "BAKERPAY_WORKDIR")]
    workdir: Option<PathBuf>,

    /// Verbose logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a manual payout for a cycle
    Pay {
        /// Cycle to pay out (0 or negative: relative to the last completed cycle)
        #[arg(short = 'c', long, default_value_t = 0)]
        cycle: i64,

        /// Load a previously generated blueprint instead of generating
        #[arg(long)]
        from_file: Option<PathBuf>,

        /// Write the generated blueprint to a file for later review
        #[arg(long)]
        to_file: Option<PathBuf>,

        /// Skip the interactive confirmation
        #[arg(long)]
        confirm: bool,

        /// Skip the payout wallet balance check
        #[arg(long)]
        skip_balance_check: bool,

        /// Wait (and retry) until the payout wallet balance suffices
        #[arg(long)]
        wait_for_balance: bool,

        /// Mix smart contract calls into regular batches
        #[arg(long = "mix-sc")]
        mix_in_contract_calls: bool,

        /// Mix FA token transfers into regular batches
        #[arg(long = "mix-fa")]
        mix_in_fa_transfers: bool,

        /// Suppress notifications
        #[arg(short, long)]
        silent: bool,

        /// Notify through a specific notificator only
        #[arg(long)]
        notificator: Option<String>,

        /// Print reports to stdout instead of writing files
        #[arg(long)]
        report_to_stdout: bool,
    },

    /// Transfer tez from the payout wallet
    Transfer {
        /// Pairs of destination address and amount
        #[arg(required = true)]
        args: Vec<String>,

        /// Amounts are mutez instead of tez
        #[arg(long)]
        mutez: bool,

        /// Skip the interactive confirmation
        #[arg(long)]
        confirm: bool,
    },

    /// Track cycles and pay out each completed one automatically
    Continual {
        /// Blocks past the cycle boundary before paying out
        #[arg(long, default_value_t = 1)]
        notification_delay: i64,

        /// Head poll interval in seconds
        #[arg(long, default_value_t = 30)]
        check_frequency: u64,
    },
}

pub fn print_info(msg: &str) {
    println!("{} {}", "•".blue(), msg);
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.debug { "debug" } else { "info" }),
    )
    .init();

    let workdir = cli
        .workdir
        .clone()
        .or_else(|| dirs::home_dir().map(|home| home.join(".bakerpay")))
        .unwrap_or_else(|| PathBuf::from("."));
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| workdir.join("config.toml"));

    let outcome: Result<(), PayoutError> = match cli.command {
        Commands::Pay {
            cycle,
            from_file,
            to_file,
            confirm,
            skip_balance_check,
            wait_for_balance,
            mix_in_contract_calls,
            mix_in_fa_transfers,
            silent,
            notificator,
            report_to_stdout,
        } => {
            commands::pay::run(commands::pay::PayArgs {
                config_path,
                workdir,
                cycle,
                from_file,
                to_file,
                confirm,
                skip_balance_check,
                wait_for_balance,
                mix_in_contract_calls,
                mix_in_fa_transfers,
                silent,
                notificator,
                report_to_stdout,
            })
            .await
        }
        Commands::Transfer {
            args,
            mutez,
            confirm,
        } => commands::transfer::run(&config_path, &workdir, args, mutez, confirm).await,
        Commands::Continual {
            notification_delay,
            check_frequency,
        } => {
            commands::continual::run(&config_path, &workdir, notification_delay, check_frequency)
                .await
        }
    };

    match outcome {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(err) => {
            let status = ExitStatus::from_error(&err);
            print_error(&status.message);
            std::process::exit(status.code);
        }
    }
}
