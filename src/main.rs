//! Ceritain call CLI binary entry point.

use ceritain_call::backend::{BalanceSource, CeritainApi, SessionIssuer, UsageReporter};
use ceritain_call::cli::errors::format_error_help;
use ceritain_call::cli::{auth, AuthCommands, Cli, Commands, ReportUsageArgs, SessionArgs};
use ceritain_call::config::CallConfig;
use ceritain_call::error::CallError;
use ceritain_call::types::UsageReportOutcome;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", format_error_help(&e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CallError> {
    let config = load_config(&cli)?;
    let api = CeritainApi::from_config(&config);

    match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Login(args) => auth::handle_login(args),
            AuthCommands::Status => auth::handle_status(),
            AuthCommands::Logout => auth::handle_logout(),
        },
        Commands::Balance => {
            let token = require_token(cli.token)?;
            let balance = api.fetch_balance(&token).await?;
            println!("{balance}");
            Ok(())
        }
        Commands::Session(args) => handle_session(&api, &config, args, cli.token).await,
        Commands::ReportUsage(args) => handle_report_usage(&api, args, cli.token).await,
    }
}

fn load_config(cli: &Cli) -> Result<CallConfig, CallError> {
    if let Some(path) = &cli.config {
        return CallConfig::load(path);
    }
    match CallConfig::default_path() {
        Some(path) if path.exists() => CallConfig::load(&path),
        _ => {
            let config = CallConfig::from_env();
            config.validate()?;
            Ok(config)
        }
    }
}

fn require_token(explicit: Option<String>) -> Result<String, CallError> {
    auth::resolve_token(explicit)?.ok_or_else(|| {
        CallError::api(401, "Not logged in: pass --token or set CERITAIN_TOKEN")
    })
}

async fn handle_session(
    api: &CeritainApi,
    config: &CallConfig,
    args: SessionArgs,
    token: Option<String>,
) -> Result<(), CallError> {
    let mut request = config.session.clone();
    if let Some(prompt) = args.prompt {
        request.prompt = prompt;
    }
    if let Some(voice) = args.voice {
        request.voice = voice;
    }
    let token = auth::resolve_token(token)?;
    let credential = api.issue(&request, token.as_deref()).await?;
    println!("session: {}", credential.session_id().unwrap_or("unknown"));
    match credential.expires_at() {
        Some(expires_at) => println!("expires: {}", expires_at.to_rfc3339()),
        None => println!("expires: unknown"),
    }
    Ok(())
}

async fn handle_report_usage(
    api: &CeritainApi,
    args: ReportUsageArgs,
    token: Option<String>,
) -> Result<(), CallError> {
    let token = require_token(token)?;
    match api.report(args.participant.into(), &token, args.seconds).await {
        UsageReportOutcome::Ok => {
            println!("recorded {}s", args.seconds);
            Ok(())
        }
        UsageReportOutcome::Depleted => Err(CallError::UsageDepleted),
        UsageReportOutcome::TransportError { message } => Err(CallError::UsageTransport(message)),
    }
}
