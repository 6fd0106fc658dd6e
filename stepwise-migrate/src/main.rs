//! Stepwise Migration CLI Tool
//!
//! Command-line interface for applying, reverting and inspecting migrations
//! kept as `{version}_{name}.up.sql` / `.down.sql` pairs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process;
use stepwise::config::StepwiseConfig;
use stepwise::executor::Connection;
use stepwise::migration::{load_plan, MigrationStatus, Migrator};
use stepwise_migrate::backend::{open_connection, redact};
use stepwise_migrate::generate::generate_migration;
use stepwise_migrate::settings::Settings;

#[derive(Parser)]
#[command(name = "stepwise-migrate")]
#[command(about = "Migration management tool for Stepwise")]
#[command(version)]
struct Cli {
    /// Database connection URL
    #[arg(long)]
    database_url: Option<String>,

    /// Migrations directory path (default: from config, else `migrations`)
    #[arg(long)]
    migrations_dir: Option<PathBuf>,

    /// Tracking table name (default: from config, else `migrations`)
    #[arg(long)]
    table: Option<String>,

    /// Configuration file
    #[arg(long, default_value = stepwise::config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status (applied vs pending)
    Status,

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Dry run - show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Rollback migrations
    Down {
        /// Number of migrations to rollback
        #[arg(long, default_value = "1")]
        steps: usize,

        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },

    /// Apply every pending migration
    Latest,

    /// Roll back every applied migration
    Reset {
        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the migration files and the applied log against each other
    Validate,

    /// Generate a new migration file pair
    Generate {
        /// Migration name (e.g., "create_users_table")
        name: String,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let quiet = cli.quiet;
    match run(cli) {
        Ok(()) => {
            if !quiet {
                println!("{}", "✅ Success".green());
            }
        }
        Err(e) => {
            eprintln!("{} {:#}", "❌ Error:".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = StepwiseConfig::load_from(&cli.config).unwrap_or_else(|e| {
        log::warn!("Ignoring configuration: {}", e);
        StepwiseConfig::default()
    });
    let settings = Settings::resolve(
        cli.database_url,
        cli.migrations_dir,
        cli.table,
        |var| std::env::var(var).ok(),
        &config,
    );

    if let Commands::Generate { name } = &cli.command {
        let generated = generate_migration(&settings.migrations_dir, name, chrono::Utc::now())?;
        println!("✅ Generated migration: {}", generated.name.bold());
        println!("   {}", generated.up_path.display());
        println!("   {}", generated.down_path.display());
        return Ok(());
    }

    let plan = load_plan(&settings.migrations_dir)
        .with_context(|| format!("Failed to load migrations from {}", settings.migrations_dir.display()))?;
    plan.validate()?;
    let migrator = Migrator::with_table(plan, settings.table.clone());

    let Some(database_url) = settings.database_url.as_deref() else {
        bail!(
            "Database URL not provided. Use --database-url, set STEPWISE_DATABASE_URL or DATABASE_URL, \
             or configure database.url in {}",
            cli.config.display()
        );
    };
    log::debug!("Using database {}", redact(database_url));
    let conn = open_connection(database_url)?;
    let conn = conn.as_ref();

    match cli.command {
        Commands::Status => handle_status(&migrator, conn),
        Commands::Up { steps, dry_run } => handle_up(&migrator, conn, steps, dry_run),
        Commands::Down { steps, dry_run } => handle_down(&migrator, conn, Some(steps), dry_run),
        Commands::Latest => handle_up(&migrator, conn, None, false),
        Commands::Reset { dry_run } => handle_down(&migrator, conn, None, dry_run),
        Commands::Validate => handle_validate(&migrator, conn),
        Commands::Generate { .. } => Ok(()),
    }
}

fn handle_status(migrator: &Migrator, conn: &dyn Connection) -> Result<()> {
    let status = migrator.status(conn)?;
    print_status(&status);
    Ok(())
}

fn print_status(status: &MigrationStatus) {
    println!("\n📊 Migration Status\n");

    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied_count);
        for name in &status.applied {
            println!("  {} {}", "✓".green(), name);
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending_count);
        for name in &status.pending {
            println!("  {} {} (pending)", "⏳".yellow(), name);
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied_count, status.pending_count
    );
}

fn handle_up(migrator: &Migrator, conn: &dyn Connection, steps: Option<usize>, dry_run: bool) -> Result<()> {
    if dry_run {
        let status = migrator.status(conn)?;
        if status.pending.is_empty() {
            println!("No pending migrations to apply");
            return Ok(());
        }

        let to_apply = steps.unwrap_or(status.pending.len()).min(status.pending.len());
        println!("Would apply {} migration(s):", to_apply);
        for (i, name) in status.pending.iter().take(to_apply).enumerate() {
            println!("  {}. {}", i + 1, name);
        }
        return Ok(());
    }

    println!("Applying migrations...");
    let applied = match steps {
        Some(steps) => migrator.up_by(conn, steps)?,
        None => migrator.latest(conn)?,
    };

    if applied > 0 {
        println!("✅ Successfully applied {} migration(s)", applied);
    } else {
        println!("✅ No migrations to apply");
    }
    Ok(())
}

fn handle_down(migrator: &Migrator, conn: &dyn Connection, steps: Option<usize>, dry_run: bool) -> Result<()> {
    if dry_run {
        let status = migrator.status(conn)?;
        if status.applied.is_empty() {
            println!("No applied migrations to rollback");
            return Ok(());
        }

        let to_rollback = steps.unwrap_or(status.applied.len()).min(status.applied.len());
        println!("Would rollback {} migration(s):", to_rollback);
        for (i, name) in status.applied.iter().rev().take(to_rollback).enumerate() {
            println!("  {}. {}", i + 1, name);
        }
        return Ok(());
    }

    println!("Rolling back migrations...");
    let rolled_back = match steps {
        Some(steps) => migrator.down_by(conn, steps)?,
        None => migrator.reset(conn)?,
    };

    if rolled_back > 0 {
        println!("✅ Successfully rolled back {} migration(s)", rolled_back);
    } else {
        println!("✅ No migrations to rollback");
    }
    Ok(())
}

fn handle_validate(migrator: &Migrator, conn: &dyn Connection) -> Result<()> {
    println!("Validating {} migration(s)...", migrator.plan().len());
    let status = migrator.status(conn)?;
    println!(
        "✅ Applied log matches the migration files ({} applied, {} pending)",
        status.applied_count, status.pending_count
    );
    Ok(())
}
