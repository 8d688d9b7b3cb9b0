use clap::Parser;
use splitpay_core::adapters::{HttpNotifier, LogNotifier};
use splitpay_core::cli::{self, Cli, Commands, TxCommands};
use splitpay_core::config::{Config, LogFormat};
use splitpay_core::middleware::RequestLogConfig;
use splitpay_core::ports::{DocumentStore, Notifier, PaymentGateway};
use splitpay_core::services::SettlementService;
use splitpay_core::stripe::{StripeClient, WebhookVerifier};
use splitpay_core::{create_app, startup, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(load_config()?).await,
        Commands::Config => {
            let config = load_config()?;
            cli::handle_config_validate(&config)?;
            let store = startup::connect_store(&config).await?;
            let report = startup::validate_environment(&config, store.as_ref()).await;
            report.print();
            if !report.is_valid() {
                anyhow::bail!("Startup validation failed");
            }
            Ok(())
        }
        // The fee calculator works offline, without gateway credentials.
        Commands::Fees {
            amount,
            operational_cost,
            affiliate_percent,
            co_producer_percent,
        } => {
            let fees = Config::from_env().map(|c| c.fees).unwrap_or_default();
            cli::handle_fees(
                &fees,
                amount,
                operational_cost,
                affiliate_percent,
                co_producer_percent,
            )
        }
        Commands::Tx(tx_cmd) => {
            let services = build_services(&load_config()?).await?;
            match tx_cmd {
                TxCommands::Show { tx_id } => {
                    cli::handle_tx_show(&services.settlement, &tx_id).await
                }
                TxCommands::Redistribute { tx_id } => {
                    cli::handle_tx_redistribute(&services.settlement, &tx_id).await
                }
            }
        }
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);
    Ok(config)
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

struct Services {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    settlement: SettlementService,
}

async fn build_services(config: &Config) -> anyhow::Result<Services> {
    let store = startup::connect_store(config).await?;
    let gateway: Arc<dyn PaymentGateway> = Arc::new(StripeClient::new(
        config.stripe_api_base.clone(),
        config.stripe_secret_key.clone(),
    ));
    tracing::info!("Payment gateway client initialized with URL: {}", config.stripe_api_base);

    let notifier: Arc<dyn Notifier> = match &config.notify_url {
        Some(url) => {
            tracing::info!("Customer notifications relayed to {}", url);
            Arc::new(HttpNotifier::new(url.clone()))
        }
        None => Arc::new(LogNotifier),
    };

    let settlement = SettlementService::new(
        store.clone(),
        gateway.clone(),
        notifier,
        config.fees.clone(),
    );
    Ok(Services {
        store,
        gateway,
        settlement,
    })
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let services = build_services(&config).await?;
    let verifier = WebhookVerifier::new(
        config.stripe_webhook_secret.clone(),
        config.webhook_tolerance,
    );

    let state = AppState::new(
        services.store,
        services.gateway,
        services.settlement,
        verifier,
    );
    let app = create_app(
        state,
        RequestLogConfig {
            log_body: config.log_request_body,
        },
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
