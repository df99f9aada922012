//! Vitalink Ingest - lab report ingestion tool

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use vitalink_common::logging::{init_logging, LogConfig, LogLevel};
use vitalink_common::ReportType;
use vitalink_ingest::storage::{PgRecordStore, PgReportStatusStore, PgVariantCatalog};
use vitalink_ingest::{
    db, BiomarkerRecord, DocumentExtractor, HttpReportParser, IngestConfig, IngestOrchestrator,
    ReportMetadata, SnpRecord, SourceDocument,
};

#[derive(Parser, Debug)]
#[command(name = "vitalink-ingest")]
#[command(author, version, about = "Vitalink lab report ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one report file for a user
    Ingest {
        /// Report file (.txt, .csv, .tsv, .json, .gz, ...)
        #[arg(short, long)]
        file: PathBuf,

        /// Owning user
        #[arg(short, long)]
        user: Uuid,

        /// Report row the file belongs to
        #[arg(short, long)]
        report: Uuid,

        /// blood, genetic or combined
        #[arg(short = 't', long, default_value = "blood")]
        report_type: ReportType,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply database migrations
    Migrate,

    /// Check database connectivity and configuration
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("vitalink-ingest")
        .filter_directives("sqlx=warn,hyper=info,reqwest=info")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let config = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    let pool = db::create_pool(&config.database)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Command::Ingest {
            file,
            user,
            report,
            report_type,
            json,
        } => {
            let document = SourceDocument::from_path(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let orchestrator = IngestOrchestrator::new(
                Arc::new(HttpReportParser::new(config.parser.http_config())?),
                Arc::new(PgRecordStore::<BiomarkerRecord>::new(pool.clone())),
                Arc::new(PgRecordStore::<SnpRecord>::new(pool.clone())),
                Arc::new(PgVariantCatalog::new(pool.clone())),
                Arc::new(PgReportStatusStore::new(pool.clone())),
                config.recovery.orchestrator_config(),
            );

            let metadata = ReportMetadata {
                user_id: user,
                report_id: report,
                report_type,
            };

            info!(file = %file.display(), bytes = document.len(), "Ingesting report");
            let result = orchestrator.ingest(&document, &metadata, &DocumentExtractor).await;

            for issue in &result.issues {
                warn!(%issue, "Ingestion issue");
            }
            info!(
                biomarkers = result.biomarkers,
                snps = result.snps,
                recovered = result.recovered,
                "{}",
                result.summary_message()
            );

            if json {
                println!("{}", result.to_json()?);
            }
        },
        Command::Migrate => {
            db::run_migrations(&pool).await?;
        },
        Command::Check => {
            db::health_check(&pool).await?;
            info!(
                parser_url = %config.parser.api_url,
                parser_model = %config.parser.model,
                batch_size = config.recovery.batch_size,
                "Database reachable, configuration valid"
            );
        },
    }

    pool.close().await;
    Ok(())
}
