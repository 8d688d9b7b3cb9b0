use bigdecimal::BigDecimal;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::{FeeBreakdown, FeeSchedule, ShareRequest, SplitInput};
use crate::services::SettlementService;

#[derive(Parser)]
#[command(name = "splitpay-core")]
#[command(about = "SplitPay Core - checkout settlement and revenue-split service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Configuration validation
    Config,

    /// Show the fee and split breakdown for an amount
    Fees {
        /// Checkout amount in major units, e.g. 200.00
        #[arg(value_name = "AMOUNT")]
        amount: BigDecimal,

        #[arg(long, default_value = "0")]
        operational_cost: BigDecimal,

        #[arg(long)]
        affiliate_percent: Option<BigDecimal>,

        #[arg(long)]
        co_producer_percent: Option<BigDecimal>,
    },

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Print a recorded transaction as JSON
    Show {
        /// Checkout session id
        #[arg(value_name = "TX_ID")]
        tx_id: String,
    },

    /// Retry split distribution for a sale
    Redistribute {
        #[arg(value_name = "TX_ID")]
        tx_id: String,
    },
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    match &config.database_url {
        Some(url) => println!("  Database URL: {}", mask_password(url)),
        None => println!("  Database URL: (unset, in-memory store)"),
    }
    println!("  Stripe API Base: {}", config.stripe_api_base);
    println!("  Stripe Secret Key: {}", mask_key(&config.stripe_secret_key));
    println!("  Webhook Tolerance: {}s", config.webhook_tolerance.as_secs());
    println!(
        "  Platform Fee: {} + {}",
        config.fees.rate, config.fees.fixed
    );
    match &config.notify_url {
        Some(url) => println!("  Notify URL: {}", url),
        None => println!("  Notify URL: (unset, notifications are logged)"),
    }

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

pub fn handle_fees(
    fees: &FeeSchedule,
    amount: BigDecimal,
    operational_cost: BigDecimal,
    affiliate_percent: Option<BigDecimal>,
    co_producer_percent: Option<BigDecimal>,
) -> anyhow::Result<()> {
    let share = |name: &str, percent: Option<BigDecimal>| {
        percent.map(|percent| ShareRequest {
            beneficiary_id: name.to_string(),
            percent,
        })
    };
    let input = SplitInput {
        amount,
        operational_cost,
        affiliate: share("affiliate", affiliate_percent),
        co_producer: share("co-producer", co_producer_percent),
    };

    print_breakdown(&fees.split(&input));
    Ok(())
}

fn print_breakdown(breakdown: &FeeBreakdown) {
    let line = |label: &str, value: &BigDecimal| println!("  {:<18} {:>12}", label, value.round(2));

    println!("Fee breakdown:");
    line("Amount", &breakdown.amount);
    line("Platform fee", &breakdown.platform_fee);
    line("Operational cost", &breakdown.operational_cost);
    line("Net after fees", &breakdown.net_after_fees);
    if let Some(affiliate) = &breakdown.affiliate {
        line(format!("Affiliate ({}%)", affiliate.percent).as_str(), &affiliate.amount);
    }
    if let Some(co_producer) = &breakdown.co_producer {
        line(format!("Co-producer ({}%)", co_producer.percent).as_str(), &co_producer.amount);
    }
    line("Producer", &breakdown.producer_net);
}

pub async fn handle_tx_show(service: &SettlementService, tx_id: &str) -> anyhow::Result<()> {
    match service.transaction(tx_id).await? {
        Some(transaction) => {
            println!("{}", serde_json::to_string_pretty(&transaction)?);
            Ok(())
        }
        None => {
            tracing::warn!("Transaction {} not found", tx_id);
            anyhow::bail!("Transaction {} not found", tx_id)
        }
    }
}

pub async fn handle_tx_redistribute(service: &SettlementService, tx_id: &str) -> anyhow::Result<()> {
    let report = service.redistribute(tx_id).await?;

    for (role, transfer_id) in &report.transfers {
        println!("  {:<12} {}", role, transfer_id);
    }
    for role in &report.pending {
        println!("  {:<12} pending (no connected account)", role);
    }

    match report.error {
        Some(error) => anyhow::bail!("Distribution for {} stopped: {}", tx_id, error),
        None => {
            tracing::info!("Distribution for {} completed", tx_id);
            println!("✓ Distribution for {} completed", tx_id);
            Ok(())
        }
    }
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}

fn mask_key(key: &str) -> String {
    match key.rsplit_once('_') {
        Some((prefix, rest)) if rest.len() > 4 => {
            format!("{}_****{}", prefix, &rest[rest.len() - 4..])
        }
        _ => "****".to_string(),
    }
}
