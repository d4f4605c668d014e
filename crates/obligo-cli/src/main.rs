//! Obligo CLI
//!
//! Operator entrypoints over the contract obligation pipeline:
//! - `extract` / `batch` — deterministic text-to-clause extraction
//! - `validate` — completeness validation of a contract JSON
//! - `gate` — gate reports for a contract set and its product group
//! - `bridge` — what-if constraint application to an optimizer variable map
//! - `registry` — inspect the clause/family catalog, classify a document
//!
//! Every command prints a JSON report to stdout so results pipe cleanly into
//! downstream tooling.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use obligo_bridge::{apply_unchecked, NameHeuristicResolver, VariableMap};
use obligo_extract::batch::{run_batch, BatchItem, BatchOptions};
use obligo_extract::ExtractionEngine;
use obligo_gates::{gate3, gate4, FreshnessPolicy, GateContext, SourceTimestamps};
use obligo_model::{Contract, ContractStatus};
use obligo_registry::ClauseRegistry;
use obligo_validate::{validate_contract, VariableRanges};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "obligo")]
#[command(version, about = "Contract obligation pipeline: extract, validate, gate, bridge")]
struct Cli {
    /// Registry overlay JSON to merge before running
    #[arg(long, global = true)]
    overlay: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract clauses from one contract text file
    Extract {
        /// Input contract text (UTF-8; binary decoding happens upstream)
        input: PathBuf,
        /// Override the detected family
        #[arg(long)]
        family: Option<String>,
    },

    /// Extract every .txt/.md document under a directory
    Batch {
        dir: PathBuf,
        /// Worker pool width (clamped to 2-4)
        #[arg(long, default_value_t = 3)]
        concurrency: usize,
        /// Per-document timeout in seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },

    /// Run completeness validation over a contract JSON
    Validate {
        contract: PathBuf,
    },

    /// Gate reports for a contract-set JSON and its product group
    Gate {
        contracts: PathBuf,
        #[arg(long)]
        product_group: String,
    },

    /// What-if constraint application: active-set JSON against a variable map.
    /// Ungated; live decisions go through the checked path in-process.
    Bridge {
        contracts: PathBuf,
        vars: PathBuf,
    },

    /// Inspect the clause/family registry
    Registry {
        #[command(subcommand)]
        command: RegistryCommands,
    },
}

#[derive(Subcommand)]
enum RegistryCommands {
    /// Dump all clause definitions and family signatures
    List,
    /// Classify a document into a contract family
    Detect { input: PathBuf },
}

fn load_registry(overlay: Option<&Path>) -> Result<Arc<ClauseRegistry>> {
    let registry = ClauseRegistry::new();
    if let Some(path) = overlay {
        registry
            .load_overlay(path)
            .with_context(|| format!("loading overlay {}", path.display()))?;
    }
    Ok(Arc::new(registry))
}

fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let registry = load_registry(cli.overlay.as_deref())?;

    match cli.command {
        Commands::Extract { input, family } => {
            let engine = ExtractionEngine::new(registry.clone());
            let mut outcome = engine.extract(&read_text(&input)?);
            if let Some(family_id) = family {
                // Explicit override must still name a known family.
                registry.family(&family_id)?;
                outcome.detected_family = obligo_registry::DetectedFamily {
                    family_id,
                    score: 0,
                };
            }
            print_json(&outcome)?;
        }

        Commands::Batch {
            dir,
            concurrency,
            timeout_secs,
        } => {
            let mut items = Vec::new();
            for entry in WalkDir::new(&dir).into_iter().filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_doc = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| matches!(e, "txt" | "md"))
                    .unwrap_or(false);
                if entry.file_type().is_file() && is_doc {
                    items.push(BatchItem {
                        name: path.display().to_string(),
                        text: read_text(path)?,
                    });
                }
            }
            if items.is_empty() {
                bail!("no .txt or .md documents under {}", dir.display());
            }
            let engine = Arc::new(ExtractionEngine::new(registry));
            let options = BatchOptions {
                max_concurrency: concurrency,
                task_timeout: Duration::from_secs(timeout_secs),
            };
            let outcome = run_batch(engine, items, options, Arc::new(AtomicBool::new(false))).await;
            print_json(&serde_json::json!({
                "succeeded": outcome
                    .succeeded
                    .iter()
                    .map(|(name, extracted)| serde_json::json!({
                        "document": name,
                        "family": extracted.detected_family.family_id,
                        "clauses": extracted.clauses.len(),
                        "warnings": extracted.warnings,
                    }))
                    .collect::<Vec<_>>(),
                "failed": outcome
                    .failed
                    .iter()
                    .map(|f| serde_json::json!({
                        "document": f.name,
                        "error": f.error.to_string(),
                    }))
                    .collect::<Vec<_>>(),
            }))?;
        }

        Commands::Validate { contract } => {
            let contract: Contract = read_json(&contract)?;
            let result = validate_contract(&registry, &contract, &VariableRanges::builtin())?;
            print_json(&result)?;
        }

        Commands::Gate {
            contracts,
            product_group,
        } => {
            let contracts: Vec<Contract> = read_json(&contracts)?;
            let ranges = VariableRanges::builtin();
            let freshness = FreshnessPolicy::default();
            let ctx = GateContext {
                registry: &registry,
                ranges: &ranges,
                freshness: &freshness,
                now: Utc::now(),
            };
            let active: Vec<Contract> = contracts
                .iter()
                .filter(|c| c.status == ContractStatus::Approved && !c.deleted)
                .cloned()
                .collect();
            let per_contract: Vec<_> = contracts
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "contract_id": c.id,
                        "counterparty": c.counterparty,
                        "gate3": gate3(&ctx, c),
                    })
                })
                .collect();
            let group = gate4(
                &ctx,
                &product_group,
                &contracts,
                &active,
                &SourceTimestamps::new(),
            );
            print_json(&serde_json::json!({
                "contracts": per_contract,
                "gate4": group,
            }))?;
        }

        Commands::Bridge { contracts, vars } => {
            let active: Vec<Contract> = read_json(&contracts)?;
            let vars: VariableMap = read_json(&vars)?;
            let outcome = apply_unchecked(&active, &vars, &NameHeuristicResolver::default());
            print_json(&outcome)?;
        }

        Commands::Registry { command } => match command {
            RegistryCommands::List => {
                print_json(&serde_json::json!({
                    "clauses": registry.definitions(),
                    "families": registry.families(),
                }))?;
            }
            RegistryCommands::Detect { input } => {
                let detected = registry.detect_family(&read_text(&input)?);
                print_json(&detected)?;
            }
        },
    }
    Ok(())
}
