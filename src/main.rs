use clap::{Args, Parser, Subcommand};
use coinnect::application::fee_estimator::FeeEstimator;
use coinnect::application::payees::{PayeeRequest, PayeeService};
use coinnect::application::payments::{OptimizationRequest, PaymentService};
use coinnect::application::recommendation_loop::RecommendationLoop;
use coinnect::application::resilience::ResilientGateway;
use coinnect::config::AppConfig;
use coinnect::domain::amount::Amount;
use coinnect::domain::ports::{GatewayHandle, NotifierHandle, PayeeStoreBox};
use coinnect::infrastructure::groq::GroqBackend;
use coinnect::infrastructure::in_memory::InMemoryPayeeStore;
use coinnect::infrastructure::notifier::{LogNotifier, WebhookNotifier};
use coinnect::infrastructure::payman::PaymanGateway;
use coinnect::interfaces::csv::payee_reader::PayeeReader;
use coinnect::interfaces::json::{read_payee_requests, read_payee_snapshot, write_report};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Registered payees to load before running the command, as printed by
    /// `register` or `import`
    #[arg(long, global = true)]
    payees: Option<PathBuf>,

    /// Payments gateway base URL
    #[arg(long, global = true)]
    payman_url: Option<String>,

    /// Chat completion base URL
    #[arg(long, global = true)]
    llm_url: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register payees from a JSON file (one object or an array)
    Register { file: PathBuf },
    /// Register payees from a CSV file, one row per settlement method
    Import { file: PathBuf },
    /// Send a payment to a gateway payee id
    Send {
        #[arg(long)]
        payee_id: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// Show the spendable balance
    Balance {
        #[arg(long, default_value = "USD")]
        currency: String,
    },
    /// List payees known to the gateway
    SearchPayees,
    /// Recommend a settlement rail for a payment
    Optimize(PaymentArgs),
    /// Recommend a settlement rail and send the payment through it
    Pay(PaymentArgs),
}

#[derive(Args)]
struct PaymentArgs {
    #[arg(long)]
    email: String,
    #[arg(long)]
    amount: Decimal,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, default_value = "USD")]
    currency: String,
    #[arg(long)]
    destination_currency: Option<String>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    urgency: Option<String>,
}

impl PaymentArgs {
    fn into_request(self) -> Result<OptimizationRequest> {
        Ok(OptimizationRequest {
            recipient_email: self.email,
            recipient_name: self.name,
            amount: Amount::new(self.amount).into_diagnostic()?,
            source_currency: self.currency,
            destination_currency: self.destination_currency,
            recipient_country: self.country,
            payment_urgency: self.urgency,
        })
    }
}

#[derive(Serialize)]
struct ImportReport<T: Serialize> {
    registered: Vec<T>,
    failed: Vec<ImportFailure>,
}

#[derive(Serialize)]
struct ImportFailure {
    source: String,
    error: String,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "coinnect=debug" } else { "coinnect=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path).into_diagnostic()?,
        None => AppConfig::default(),
    };
    let mut config = config.with_env_overrides().into_diagnostic()?;
    if let Some(url) = &cli.payman_url {
        config.payman.api_url = url.clone();
    }
    if let Some(url) = &cli.llm_url {
        config.llm.api_url = url.clone();
    }
    config.validate().into_diagnostic()?;
    Ok(config)
}

fn open_store(db_path: Option<&Path>) -> Result<PayeeStoreBox> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store =
                coinnect::infrastructure::rocksdb::RocksDBPayeeStore::open(path).into_diagnostic()?;
            Ok(Box::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            tracing::warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Box::new(InMemoryPayeeStore::new()))
        }
        None => Ok(Box::new(InMemoryPayeeStore::new())),
    }
}

/// Builds every collaborator once; nothing is created lazily or globally.
fn build_service(config: &AppConfig, store: PayeeStoreBox) -> Result<PaymentService> {
    let payman = PaymanGateway::new(config.payman.clone()).into_diagnostic()?;
    let gateway: GatewayHandle =
        Arc::new(ResilientGateway::new(Box::new(payman), &config.resilience));

    let notifier: NotifierHandle = match &config.notification.webhook_url {
        Some(url) => Arc::new(
            WebhookNotifier::new(url.clone(), config.notification.sender.clone(), config.fees)
                .into_diagnostic()?,
        ),
        None => Arc::new(LogNotifier::new(
            config.notification.sender.clone(),
            config.fees,
        )),
    };

    let backend = GroqBackend::new(config.llm.clone()).into_diagnostic()?;
    let advisor = RecommendationLoop::new(
        FeeEstimator::new(config.fees),
        Box::new(backend),
        config.recommendation.clone(),
    )
    .with_notifier(notifier);

    let payees = PayeeService::new(store, gateway.clone());
    Ok(PaymentService::new(payees, gateway, advisor))
}

/// Loads previously registered payees; failures are logged and skipped.
async fn seed_payees(service: &PaymentService, path: &Path) -> Result<()> {
    let payees = read_payee_snapshot(File::open(path).into_diagnostic()?).into_diagnostic()?;
    let total = payees.len();
    let mut restored = 0;
    for payee in payees {
        let email = payee.email.clone();
        match service.payees().restore(payee).await {
            Ok(_) => restored += 1,
            Err(e) => tracing::warn!(%email, error = %e, "Error loading payee"),
        }
    }
    tracing::info!(restored, total, "Payees loaded");
    Ok(())
}

async fn register_all(
    service: &PaymentService,
    requests: Vec<(String, PayeeRequest)>,
    mut failed: Vec<ImportFailure>,
) -> Result<()> {
    let mut registered = Vec::new();
    for (source, request) in requests {
        match service.payees().register(request).await {
            Ok(payee) => registered.push(payee),
            Err(e) => {
                tracing::error!(%source, error = %e, "Error registering payee");
                failed.push(ImportFailure {
                    source,
                    error: e.to_string(),
                });
            }
        }
    }
    write_report(io::stdout().lock(), &ImportReport { registered, failed }).into_diagnostic()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let store = open_store(cli.db_path.as_deref())?;
    let service = build_service(&config, store)?;
    if let Some(path) = &cli.payees {
        seed_payees(&service, path).await?;
    }
    let stdout = io::stdout();

    match cli.command {
        Command::Register { file } => {
            let source = file.display().to_string();
            let requests = read_payee_requests(File::open(&file).into_diagnostic()?)
                .into_diagnostic()?
                .into_iter()
                .map(|request| (format!("{source}:{}", request.email), request))
                .collect();
            register_all(&service, requests, Vec::new()).await?;
        }
        Command::Import { file } => {
            let (requests, errors) = PayeeReader::new(File::open(&file).into_diagnostic()?).requests();
            let failed = errors
                .into_iter()
                .map(|(line, e)| {
                    tracing::error!(line, error = %e, "Error reading payee row");
                    ImportFailure {
                        source: format!("line {line}"),
                        error: e.to_string(),
                    }
                })
                .collect();
            let requests = requests
                .into_iter()
                .map(|request| (request.email.clone(), request))
                .collect();
            register_all(&service, requests, failed).await?;
        }
        Command::Send { payee_id, amount } => {
            let amount = Amount::new(amount).into_diagnostic()?;
            let receipt = service.send_payment(&payee_id, amount).await.into_diagnostic()?;
            write_report(stdout.lock(), &receipt).into_diagnostic()?;
        }
        Command::Balance { currency } => {
            let balance = service.balance(&currency).await.into_diagnostic()?;
            write_report(stdout.lock(), &balance).into_diagnostic()?;
        }
        Command::SearchPayees => {
            let payees = service.search_payees().await.into_diagnostic()?;
            write_report(stdout.lock(), &payees).into_diagnostic()?;
        }
        Command::Optimize(args) => {
            let analysis = service.optimize(&args.into_request()?).await.into_diagnostic()?;
            write_report(stdout.lock(), &analysis).into_diagnostic()?;
        }
        Command::Pay(args) => {
            let result = service.execute(&args.into_request()?).await.into_diagnostic()?;
            write_report(stdout.lock(), &result).into_diagnostic()?;
        }
    }

    service
        .drain_notifications(config.notification.drain_timeout())
        .await;
    Ok(())
}
