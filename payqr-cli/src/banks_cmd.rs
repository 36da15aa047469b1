use anyhow::{Context, Result, bail};
use clap::Subcommand;
use payqr_core::BankResolver;
use payqr_gateway::VietQrClient;

use crate::config::load_config;
use crate::state::ensure_payqr_home;

#[derive(Subcommand, Debug)]
pub enum BanksCommand {
    /// Download the bank list and replace the local directory file
    Sync,

    /// Print the BIN for each bank name (or "not found")
    Resolve {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

pub async fn run(cmd: BanksCommand) -> Result<()> {
    let cfg = load_config()?;
    let home = ensure_payqr_home()?;
    let path = cfg.bank_list_path(&home);

    match cmd {
        BanksCommand::Sync => {
            let client = VietQrClient::new(cfg.gateway())?;
            let directory = client
                .refresh_directory(&path)
                .await
                .context("bank directory left unchanged")?;
            println!("Synced {} banks into {}", directory.len(), path.display());
        }
        BanksCommand::Resolve { names } => {
            if !path.exists() {
                bail!(
                    "No bank directory at {}. Run: payqr banks sync",
                    path.display()
                );
            }
            let resolver = BankResolver::new(&path);
            for name in &names {
                match resolver.resolve(name) {
                    Some(bin) => println!("{name} -> {bin}"),
                    None => println!("{name} -> not found"),
                }
            }
        }
    }

    Ok(())
}
