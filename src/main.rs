//! Satisfactory Production Calculator
//!
//! Finds the minimum-power set of recipes for requested material rates.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use satisfactory_calculator::calculator::{self, Demand, ExtractionCaps, OptimizeOptions};
use satisfactory_calculator::filter::{self, SelectionSettings, UnlockSelection};
use satisfactory_calculator::loader::{self, ExtractionPower};
use satisfactory_calculator::models::Catalog;
use satisfactory_calculator::solver::MicrolpSolver;
use satisfactory_calculator::{classifier, db, differ};

#[derive(Parser)]
#[command(name = "satisfactory-calculator")]
#[command(about = "Minimum-power production planner for Satisfactory")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "satisfactory.db")]
    database: PathBuf,

    /// Log debug output (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import a recipe catalog snapshot (JSON), showing what changes
    Import {
        /// Path to the snapshot file
        snapshot: PathBuf,

        /// Replace the stored catalog with the snapshot
        #[arg(long)]
        accept: bool,

        /// Add extraction recipes for raw materials nothing produces
        #[arg(long)]
        with_extraction: bool,

        /// JSON table of extraction power in MW per material
        #[arg(long, requires = "with_extraction")]
        extraction_power: Option<PathBuf>,
    },

    /// Write the stored catalog to a snapshot file
    Export {
        path: PathBuf,
    },

    /// Compare two catalog snapshot files
    Diff {
        old: PathBuf,
        new: PathBuf,
    },

    /// List materials of the stored catalog
    Materials {
        /// Only base materials
        #[arg(long)]
        base: bool,

        /// Only end materials
        #[arg(long)]
        end: bool,
    },

    /// List the tiers, research nodes and alternates that can be selected
    Options,

    /// Show or change the unlock selection
    Select {
        /// Highest tier reached
        #[arg(long)]
        tier: Option<u32>,

        /// Completed section of the selected tier (repeatable)
        #[arg(long)]
        section: Vec<String>,

        /// Completed research node as TREE:NODE (repeatable)
        #[arg(long, value_parser = parse_research)]
        research: Vec<(String, String)>,

        /// Alternate recipe to opt into (repeatable)
        #[arg(long)]
        alternate: Vec<String>,

        /// Start from an empty selection instead of the stored one
        #[arg(long)]
        clear: bool,

        /// Forget the selection entirely (no restrictions, no alternates)
        #[arg(long, conflicts_with_all = ["tier", "section", "research", "alternate", "clear"])]
        unconfigure: bool,
    },

    /// List recipes active under the current selection
    Recipes,

    /// Calculate the minimum-power recipe mix
    Calc {
        /// Requested rate per minute as MATERIAL=RATE (repeatable)
        #[arg(required = true, value_parser = parse_demand)]
        demand: Vec<(String, f64)>,

        /// Material assumed freely available (repeatable)
        #[arg(long)]
        free: Vec<String>,

        /// Keep extraction within the map's resource limits
        #[arg(long)]
        enforce_caps: bool,

        /// Give up after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Show per-material production and consumption
        #[arg(short, long)]
        balance: bool,
    },
}

fn parse_demand(arg: &str) -> Result<(String, f64), String> {
    let (material, rate) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("expected MATERIAL=RATE, got '{arg}'"))?;
    let rate: f64 = rate
        .trim()
        .parse()
        .map_err(|e| format!("invalid rate '{rate}': {e}"))?;
    Ok((material.trim().to_string(), rate))
}

fn parse_research(arg: &str) -> Result<(String, String), String> {
    let (tree, node) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected TREE:NODE, got '{arg}'"))?;
    Ok((tree.trim().to_string(), node.trim().to_string()))
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn stored_catalog(conn: &Connection) -> Result<Catalog> {
    match db::load_catalog(conn)? {
        Some(catalog) => Ok(catalog),
        None => bail!("No catalog in database. Run 'import <snapshot> --accept' first."),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let conn = Connection::open(&cli.database)
        .with_context(|| format!("Failed to open {}", cli.database.display()))?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Import {
            snapshot,
            accept,
            with_extraction,
            extraction_power,
        } => {
            let power = match (with_extraction, extraction_power) {
                (false, _) => None,
                (true, Some(path)) => Some(ExtractionPower::load(&path)?),
                (true, None) => Some(ExtractionPower::default()),
            };
            let (catalog, stats) = loader::import_catalog(&snapshot, power.as_ref())?;
            println!("{}\n", stats);

            let current = db::load_catalog(&conn)?;
            let report = differ::diff(current.as_ref(), &catalog);
            println!("{}\n", report);

            if !report.has_differences() {
                println!("Stored catalog is already up to date.");
            } else if accept {
                db::replace_catalog(&conn, &catalog)?;
                println!("Catalog updated ({} recipes).", catalog.len());
            } else {
                println!("Updates were not applied. Re-run with --accept to replace the stored catalog.");
            }
        }

        Commands::Export { path } => {
            let catalog = stored_catalog(&conn)?;
            catalog
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {} recipes to {}", catalog.len(), path.display());
        }

        Commands::Diff { old, new } => {
            let report = differ::diff_files(&old, &new)?;
            println!("{}", report);
        }

        Commands::Materials { base, end } => {
            let catalog = stored_catalog(&conn)?;
            let materials = classifier::classify(&catalog);
            println!(
                "{:<35} {:>5} {:>5} {:>10} {:>10}",
                "Material", "Base", "End", "Cap/min", "Producers"
            );
            println!("{}", "-".repeat(69));
            for info in materials.values() {
                if (base && !info.is_base) || (end && !info.is_end) {
                    continue;
                }
                let cap = info
                    .extraction_cap
                    .map_or_else(|| "-".to_string(), |cap| format!("{:.0}", cap));
                println!(
                    "{:<35} {:>5} {:>5} {:>10} {:>10}",
                    info.name,
                    if info.is_base { "yes" } else { "" },
                    if info.is_end { "yes" } else { "" },
                    cap,
                    info.producers.len()
                );
            }
        }

        Commands::Options => {
            let catalog = stored_catalog(&conn)?;
            print!("{}", filter::unlock_options(&catalog));
        }

        Commands::Select {
            tier,
            section,
            research,
            alternate,
            clear,
            unconfigure,
        } => {
            if unconfigure {
                db::save_selection(&conn, &UnlockSelection::Unconfigured)?;
                println!("Unlock selection cleared: every non-alternate recipe is available.");
                return Ok(());
            }

            let changed = clear
                || tier.is_some()
                || !section.is_empty()
                || !research.is_empty()
                || !alternate.is_empty();
            if changed {
                let mut settings = match (clear, db::load_selection(&conn)?) {
                    (false, UnlockSelection::Configured(settings)) => settings,
                    _ => SelectionSettings::default(),
                };
                if tier.is_some() {
                    settings.tier = tier;
                }
                settings.sections.extend(section);
                for (tree, node) in research {
                    settings.research.entry(tree).or_default().insert(node);
                }
                settings.alternates.extend(alternate);

                if let Some(catalog) = db::load_catalog(&conn)? {
                    let known = filter::unlock_options(&catalog).alternates;
                    for name in settings.alternates.difference(&known) {
                        tracing::warn!(event = "unknown_alternate", recipe = %name);
                    }
                }
                db::save_selection(&conn, &UnlockSelection::Configured(settings))?;
            }

            print_selection(&db::load_selection(&conn)?);
        }

        Commands::Recipes => {
            let catalog = stored_catalog(&conn)?;
            let selection = db::load_selection(&conn)?;
            let active = filter::filter(&catalog, &selection);
            println!("{:<45} {:<22} {:>9}  Unlock", "Recipe", "Machine", "Power MW");
            println!("{}", "-".repeat(90));
            for recipe in &active {
                println!(
                    "{:<45} {:<22} {:>9.2}  {}",
                    recipe.name, recipe.machine.name, recipe.machine.power_mw, recipe.unlock
                );
            }
            println!("\n{} of {} recipes active", active.len(), catalog.len());
        }

        Commands::Calc {
            demand,
            free,
            enforce_caps,
            timeout_secs,
            balance,
        } => {
            let catalog = stored_catalog(&conn)?;
            let selection = db::load_selection(&conn)?;
            let active = filter::filter(&catalog, &selection);
            let demand: Demand = demand.into_iter().collect();

            let options = OptimizeOptions {
                free_materials: free.into_iter().collect::<BTreeSet<_>>(),
                extraction_caps: if enforce_caps {
                    ExtractionCaps::Enforced
                } else {
                    ExtractionCaps::Advisory
                },
                timeout: timeout_secs.map(Duration::from_secs),
                cancel: None,
            };

            let solution = calculator::optimize_with(&MicrolpSolver::default(), &active, &demand, &options)?;
            println!("Optimal Recipe Usage (min power):\n");
            print!("{}", calculator::summarize(&solution, &active));

            if balance {
                let materials = classifier::classify(&catalog);
                println!(
                    "{:<35} {:>12} {:>12} {:>12} {:>10}",
                    "Material", "Produced", "Consumed", "Requested", "Satisfied"
                );
                println!("{}", "-".repeat(85));
                for row in calculator::material_balance(&solution, &active, &demand, &materials) {
                    let satisfied = if !row.is_satisfied() {
                        "no"
                    } else if row.exceeds_cap() {
                        "over cap"
                    } else {
                        "yes"
                    };
                    println!(
                        "{:<35} {:>12.2} {:>12.2} {:>12.2} {:>10}",
                        row.material, row.produced, row.consumed, row.requested, satisfied
                    );
                }
            }
        }
    }

    Ok(())
}

fn print_selection(selection: &UnlockSelection) {
    let settings = match selection {
        UnlockSelection::Unconfigured => {
            println!("No unlock selection configured: every non-alternate recipe is available.");
            return;
        }
        UnlockSelection::Configured(settings) => settings,
    };

    match settings.tier {
        Some(tier) => println!("Tier: {}", tier),
        None => println!("Tier: (none)"),
    }
    for section in &settings.sections {
        println!("  Section: {}", section);
    }
    for (tree, nodes) in &settings.research {
        for node in nodes {
            println!("Research: {} - {}", tree, node);
        }
    }
    for name in &settings.alternates {
        println!("Alternate: {}", name);
    }
}
