use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use fbdw_pipeline::{
    clean_match_details, clean_odds, conform_all, conform_matches, conform_player_stats, conform_team_details,
    enrich_players, load_bronze, load_mappings, open_page_source, run_fixups, scrape_seasons, EtlConfig,
    MemoryWarehouse, PgWarehouse, RunSummary, Warehouse,
};
use fbdw_storage::PageSource;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fbdw")]
#[command(about = "Football data warehouse ETL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the bronze and silver tables.
    Migrate,
    /// Scrape the configured seasons into JSON dumps.
    Scrape,
    /// Attach Transfermarkt player info to the scraped player tables.
    Enrich,
    /// Load dumps and cleaned CSVs into the bronze staging tables.
    Load {
        #[arg(long)]
        dataset: Option<String>,
        /// Load into memory and report counts without touching the database.
        #[arg(long)]
        dry_run: bool,
    },
    /// Replace the team, nation and notes mapping tables.
    Mappings,
    /// Rebuild silver tables from bronze.
    Conform {
        #[arg(value_enum, default_value_t = ConformTarget::All)]
        target: ConformTarget,
    },
    /// Apply configured value corrections to the silver tables.
    FixSilver,
    /// Normalize dates and numeric columns of the raw match-odds CSVs.
    CleanOdds,
    /// Keep league-season rows with integer scores from the match-details CSV.
    CleanMatchDetails,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ConformTarget {
    Matches,
    TeamDetails,
    PlayerStats,
    All,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn connect(config: &EtlConfig) -> Result<PgWarehouse> {
    PgWarehouse::connect(&config.database_url)
        .await
        .context("connecting to warehouse")
}

async fn close_warehouse(warehouse: &mut dyn Warehouse) {
    if let Err(err) = warehouse.close().await {
        warn!(warehouse = warehouse.name(), error = %err, "closing warehouse failed");
    }
}

async fn close_source(source: &mut dyn PageSource) {
    if let Err(err) = source.close().await {
        warn!(source = source.name(), error = %err, "closing page source failed");
    }
}

async fn run_with_pages(config: &EtlConfig, enrich: bool) -> Result<RunSummary> {
    let (kind, http) = if enrich {
        (config.enrich.source, config.enrich.http_client())
    } else {
        (config.scrape.source, config.scrape.http_client())
    };
    let mut source = open_page_source(kind, config, &http).await?;
    let result = if enrich {
        enrich_players(config, source.as_mut()).await
    } else {
        scrape_seasons(config, source.as_mut()).await
    };
    close_source(source.as_mut()).await;
    result
}

async fn load(config: &EtlConfig, dataset: Option<&str>, dry_run: bool) -> Result<RunSummary> {
    if dry_run {
        let mut warehouse = MemoryWarehouse::new();
        let summary = load_bronze(config, &mut warehouse, dataset).await?;
        for (table, rows) in warehouse.tables() {
            println!("{}: {rows} rows", table.qualified());
        }
        return Ok(summary);
    }

    let mut warehouse = connect(config).await?;
    let result = load_bronze(config, &mut warehouse, dataset).await;
    close_warehouse(&mut warehouse).await;
    result
}

async fn conform(config: &EtlConfig, target: ConformTarget) -> Result<RunSummary> {
    let mut warehouse = connect(config).await?;
    let summary = match target {
        ConformTarget::Matches => conform_matches(&mut warehouse).await,
        ConformTarget::TeamDetails => conform_team_details(&mut warehouse).await,
        ConformTarget::PlayerStats => conform_player_stats(&mut warehouse).await,
        ConformTarget::All => conform_all(&mut warehouse).await,
    };
    close_warehouse(&mut warehouse).await;
    Ok(summary)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = EtlConfig::from_env().context("loading configuration")?;

    let summary = match cli.command {
        Commands::Migrate => {
            let mut warehouse = connect(&config).await?;
            let result = warehouse.migrate().await;
            close_warehouse(&mut warehouse).await;
            result.context("applying migrations")?;
            println!("migrations applied");
            return Ok(());
        }
        Commands::Scrape => run_with_pages(&config, false).await?,
        Commands::Enrich => run_with_pages(&config, true).await?,
        Commands::Load { dataset, dry_run } => load(&config, dataset.as_deref(), dry_run).await?,
        Commands::Mappings => {
            let mut warehouse = connect(&config).await?;
            let result = load_mappings(&mut warehouse).await;
            close_warehouse(&mut warehouse).await;
            result?
        }
        Commands::Conform { target } => conform(&config, target).await?,
        Commands::FixSilver => {
            let mut warehouse = connect(&config).await?;
            let summary = run_fixups(&config.silver, &mut warehouse).await;
            close_warehouse(&mut warehouse).await;
            summary
        }
        Commands::CleanOdds => clean_odds(&config.cleaners)?,
        Commands::CleanMatchDetails => clean_match_details(&config.cleaners)?,
    };

    println!("{summary}");
    Ok(())
}
