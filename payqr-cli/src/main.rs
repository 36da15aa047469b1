use anyhow::Result;
use clap::{Parser, Subcommand};

mod banks_cmd;
mod config;
mod qr_cmd;
mod state;
mod tx_cmd;

#[derive(Parser, Debug)]
#[command(
    name = "payqr",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("PAYQR_BUILD_SHA"), ")"),
    about = "VietQR payment codes, bank lookup and a day-bucketed transaction log"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default config.toml into the payqr home directory
    InitConfig,

    /// Bank directory commands
    Banks {
        #[command(subcommand)]
        command: banks_cmd::BanksCommand,
    },

    /// Generate a payment QR code (optionally recording the order)
    Qr(qr_cmd::QrArgs),

    /// Query and update stored transactions
    Tx {
        #[command(subcommand)]
        command: tx_cmd::TxCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG overrides; info by default
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig => config::init_config()?,
        Command::Banks { command } => banks_cmd::run(command).await?,
        Command::Qr(args) => qr_cmd::run(args).await?,
        Command::Tx { command } => tx_cmd::run(command)?,
    }

    Ok(())
}
