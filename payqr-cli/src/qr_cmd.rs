use anyhow::{Context, Result, bail};
use clap::Args;
use payqr_core::{BankResolver, TransactionRecord};
use payqr_gateway::{QrRequest, VietQrClient};
use std::fs;
use std::path::PathBuf;

use crate::config::{Config, load_config};
use crate::state::ensure_payqr_home;
use crate::tx_cmd::open_ledger;

/// Status recorded for orders whose QR was just issued.
const ISSUED_STATUS: &str = "PENDING";

#[derive(Args, Debug)]
pub struct QrArgs {
    /// Amount in VND
    #[arg(long)]
    amount: u64,

    /// Transfer memo shown to the payer
    #[arg(long, default_value = "")]
    info: String,

    /// Receiving bank by name (resolved to a BIN)
    #[arg(long, conflicts_with = "acq_id")]
    bank: Option<String>,

    /// Receiving bank BIN (default: config.account.acq_id)
    #[arg(long)]
    acq_id: Option<String>,

    #[arg(long)]
    account_no: Option<String>,

    #[arg(long)]
    account_name: Option<String>,

    /// VietQR template (default: config.account.template)
    #[arg(long)]
    template: Option<String>,

    /// Write the image here
    #[arg(long)]
    out: Option<PathBuf>,

    /// Record the order in the transaction log with the QR attached
    #[arg(long)]
    order: Option<String>,

    /// Transaction type used when recording the order
    #[arg(long, default_value = "sale")]
    kind: String,
}

pub async fn run(args: QrArgs) -> Result<()> {
    let cfg = load_config()?;
    let home = ensure_payqr_home()?;
    let req = build_request(&args, &cfg, &home)?;

    let client = VietQrClient::new(cfg.gateway())?;
    let image = client.generate_qr(&req).await?;

    if let Some(out) = &args.out {
        fs::write(out, &image).with_context(|| format!("write {}", out.display()))?;
        println!("QR written to {}", out.display());
    }

    if let Some(order) = &args.order {
        let ledger = open_ledger(&cfg, &home)?;
        let record = TransactionRecord::new(&args.kind, order, args.amount as f64)
            .with_field("add_info", req.add_info.clone())
            .with_field("acq_id", req.acq_id.clone());
        let saved = ledger.save(record, Some(&image), Some(ISSUED_STATUS))?;
        println!(
            "Recorded order {} ({}) QR at {}",
            saved.order_number,
            saved.status(),
            saved.qr_path.as_deref().unwrap_or("-")
        );
    } else if args.out.is_none() {
        let out = PathBuf::from("qr.png");
        fs::write(&out, &image).with_context(|| format!("write {}", out.display()))?;
        println!("QR written to {}", out.display());
    }

    Ok(())
}

fn build_request(args: &QrArgs, cfg: &Config, home: &std::path::Path) -> Result<QrRequest> {
    let acq_id = match (&args.acq_id, &args.bank) {
        (Some(bin), _) => bin.clone(),
        (None, Some(name)) => BankResolver::new(cfg.bank_list_path(home))
            .resolve(name)
            .with_context(|| format!("could not resolve bank {name:?}"))?,
        (None, None) => cfg.account.acq_id.clone(),
    };
    if acq_id.is_empty() {
        bail!("no receiving bank: pass --bank/--acq-id or set account.acq_id");
    }

    let account_no = args
        .account_no
        .clone()
        .unwrap_or_else(|| cfg.account.account_no.clone());
    if account_no.is_empty() {
        bail!("no account number: pass --account-no or set account.account_no");
    }

    Ok(QrRequest {
        account_no,
        account_name: args
            .account_name
            .clone()
            .unwrap_or_else(|| cfg.account.account_name.clone()),
        acq_id,
        add_info: args.info.clone(),
        amount: args.amount,
        template: args
            .template
            .clone()
            .unwrap_or_else(|| cfg.account.template.clone()),
    })
}
