use clap::Parser;
use std::sync::Arc;
use wallet_checkout::config::event_script::EventScript;
use wallet_checkout::utils::error::{CheckoutError, ErrorSeverity};
use wallet_checkout::utils::{logger, validation::Validate};
use wallet_checkout::{
    CliConfig, LoggingSheet, StdoutPresenter, StorefrontCartClient, TomlConfig,
    WalletPaymentOrchestrator, WalletSettings,
};

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    let file_config = match cli.config.as_deref().map(TomlConfig::from_file).transpose() {
        Ok(config) => config,
        Err(e) => {
            logger::init_cli_logger(cli.verbose);
            exit_with(&e);
        }
    };

    match file_config.as_ref().filter(|c| c.json_logs()) {
        Some(config) => logger::init_json_logger(config.log_level()),
        None => logger::init_cli_logger(cli.verbose),
    }

    tracing::info!("Starting wallet-checkout");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    if let Err(e) = run(cli, file_config).await {
        exit_with(&e);
    }
}

async fn run(cli: CliConfig, file_config: Option<TomlConfig>) -> Result<(), CheckoutError> {
    cli.validate()?;

    let (client, settings) = match file_config {
        Some(mut config) => {
            cli.apply_overrides(&mut config);
            config.validate()?;
            (
                StorefrontCartClient::from_config(&config),
                config.wallet_settings(),
            )
        }
        None => (StorefrontCartClient::from_config(&cli), WalletSettings::default()),
    };
    tracing::info!("🛒 Storefront endpoint: {}", client.endpoint());

    let script = EventScript::from_file(&cli.events)?.with_cart_id(cli.cart_id.as_deref());
    tracing::info!("📜 Loaded {} wallet event(s) from {}", script.events.len(), cli.events);

    let presenter = Arc::new(StdoutPresenter::new());
    let orchestrator = WalletPaymentOrchestrator::new(
        Arc::new(client),
        Arc::new(LoggingSheet),
        presenter.clone(),
        settings,
    );
    let (handle, session) = wallet_checkout::spawn(orchestrator);

    let replayed = script.replay(&handle).await;
    drop(handle);
    let orchestrator = session.await?;
    replayed?;

    tracing::info!(
        "✅ Session finished in state {} after {} transition(s)",
        orchestrator.state(),
        orchestrator.transition_log().len() - 1
    );
    let handed_off = presenter.handed_off().await;
    match handed_off.last() {
        Some(url) => println!("✅ Checkout handed off to {}", url),
        None => println!("✅ Wallet session ended without a checkout hand-off"),
    }
    Ok(())
}

fn exit_with(e: &CheckoutError) -> ! {
    tracing::error!(
        "❌ wallet-checkout failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    // Low severity covers buyer-side input problems, which are not tool failures.
    let exit_code = match e.severity() {
        ErrorSeverity::Low => 0,
        ErrorSeverity::Medium => 2,
        ErrorSeverity::High => 1,
        ErrorSeverity::Critical => 3,
    };
    std::process::exit(exit_code);
}
