use anyhow::Result;
use campo_core::{SyncRequest, DEFAULT_SHEET_NAME, DEFAULT_START_ROW};
use campo_storage::PgProgramStore;
use campo_sync::{
    build_orchestrator, connect_store, run_targets, summary_line, write_run_report, SyncConfig,
    SyncReport, TargetRegistry,
};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "campo-cli")]
#[command(about = "Campo program-sheet sync command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sync one partition, or every enabled target in the registry.
    Sync(SyncArgs),
    /// Apply database migrations.
    Migrate,
    /// Start the HTTP API.
    Serve,
    /// Run registry syncs on the configured cron until ctrl-c.
    Schedule,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    #[arg(long)]
    partition: Option<String>,
    /// Spreadsheet id or URL; required with --partition.
    #[arg(long)]
    spreadsheet: Option<String>,
    #[arg(long, default_value = DEFAULT_SHEET_NAME)]
    sheet: String,
    #[arg(long, default_value_t = DEFAULT_START_ROW)]
    start_row: u32,
    #[arg(long)]
    week: Option<u32>,
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync(SyncArgs {
        sheet: DEFAULT_SHEET_NAME.to_string(),
        start_row: DEFAULT_START_ROW,
        ..Default::default()
    })) {
        Commands::Sync(args) => {
            for report in sync(args).await? {
                println!("{}", summary_line(&report));
                for error in &report.result.errors {
                    println!("  {error}");
                }
            }
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            PgProgramStore::connect_lazy(&config.database_url)?.migrate().await?;
            println!("migrations applied");
        }
        Commands::Serve => campo_web::serve_from_env().await?,
        Commands::Schedule => campo_sync::run_scheduler_from_env().await?,
    }

    Ok(())
}

async fn sync(args: SyncArgs) -> Result<Vec<SyncReport>> {
    let config = SyncConfig::from_env();
    let store = connect_store(&config)?;
    let orchestrator = build_orchestrator(&config, store)?;

    match args.partition {
        Some(partition) => {
            let request = SyncRequest::new(partition, args.spreadsheet.unwrap_or_default())
                .with_sheet_name(args.sheet)
                .with_start_row(args.start_row)
                .with_filter_week(args.week)
                .dry_run(args.dry_run);
            let report = orchestrator.run_report(request).await;
            write_run_report(&config.reports_dir, &report).await?;
            Ok(vec![report])
        }
        None => {
            let registry = TargetRegistry::load(&config.targets_file).await?;
            run_targets(
                &orchestrator,
                &registry.enabled(),
                args.dry_run,
                args.week,
                &config.reports_dir,
            )
            .await
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "campo_sync=info,campo_sheets=info,campo_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
