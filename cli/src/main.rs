//! `chava`: the command-line front-end over `chava-core` + `chava-store` +
//! `chava-verifiers` (spec §6). Output is plain, greppable text — the
//! original's `rich`-rendered tables are explicitly out of scope ("rich
//! terminal rendering", spec §1).

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use chava_core::object::{discharge as core_discharge, ChavaObject};
use chava_core::{project as core_project, Kms, Obligation};
use chava_store::ChavaStore;

#[derive(Parser)]
#[command(name = "chava", about = "Trust-carrying data processing CLI")]
struct Cli {
    /// Database path. `:memory:` for an ephemeral run.
    #[arg(long, default_value = "chava.db", global = true)]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new Chava object.
    Create {
        obj_id: String,
        /// JSON value.
        #[arg(long)]
        value: String,
        /// Obligation as `kind:scope`, repeatable.
        #[arg(long = "obligation")]
        obligations: Vec<String>,
    },
    /// Display Chava object details.
    Show { obj_id: String },
    /// Discharge an obligation on an object.
    Discharge {
        obj_id: String,
        #[arg(long)]
        kind: String,
        #[arg(long)]
        verifier: String,
    },
    /// Unwrap and display the value (only if cleared).
    Unwrap { obj_id: String },
    /// List objects in the database.
    List {
        #[arg(long)]
        kind: Option<String>,
        #[arg(long, conflicts_with = "uncleared")]
        cleared: bool,
        #[arg(long, conflicts_with = "cleared")]
        uncleared: bool,
    },
    /// Project a field and create a new object.
    Project { obj_id: String, path: String, output_id: String },
    /// Merge two objects with AND-conjunction.
    Merge { obj_id1: String, obj_id2: String, output_id: String },
    /// Query evidence log for an audit trail.
    Audit {
        #[arg(long)]
        verifier: Option<String>,
        /// Start time as a unix timestamp (seconds).
        #[arg(long)]
        since: Option<f64>,
        /// End time as a unix timestamp (seconds).
        #[arg(long)]
        until: Option<f64>,
    },
    /// Display database statistics and metrics.
    Stats,
}

fn kms_secret() -> Vec<u8> {
    match std::env::var("CHAVA_KMS_SECRET") {
        Ok(secret) => secret.into_bytes(),
        Err(_) => {
            tracing::warn!("CHAVA_KMS_SECRET not set; falling back to a fixed development secret");
            b"chava_default_secret".to_vec()
        }
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn parse_obligation(spec: &str) -> Result<Obligation> {
    let (kind, scope) = spec
        .split_once(':')
        .with_context(|| format!("obligation format must be 'kind:scope', got '{spec}'"))?;
    Ok(Obligation::new(kind, scope)?)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = ChavaStore::open(&cli.db, Kms::new(kms_secret()))?;
    let registry = chava_verifiers::default_registry();

    match cli.command {
        Command::Create { obj_id, value, obligations } => {
            let parsed: serde_json::Value =
                serde_json::from_str(&value).context("invalid JSON value")?;
            let obligations = obligations
                .iter()
                .map(|s| parse_obligation(s))
                .collect::<Result<Vec<_>>>()?;
            let obj = ChavaObject::new(chava_core::Value::from_json(&parsed), obligations, vec![]);
            store.store(&obj_id, &obj, 0.0)?;
            println!("Created object {obj_id}");
            println!("Value: {parsed}");
            println!("Obligations: {:?}", obj.obligations);
        }
        Command::Show { obj_id } => {
            let obj = store.retrieve(&obj_id, 0.0)?;
            match obj.unwrap() {
                Ok(value) => println!("Value: {}", serde_json::to_string_pretty(&value.to_json())?),
                Err(_) => println!("Value: ENCRYPTED (not cleared)"),
            }
            println!(
                "Status: {}",
                if obj.obligations.is_empty() { "Cleared".to_string() } else { format!("Uncleared ({} pending)", obj.obligations.len()) }
            );
            println!("Obligations: {:?}", obj.obligations);
            println!("Evidence count: {}", obj.evidence.len());
            for record in &obj.evidence {
                println!(
                    "  [{}] {} -> {} (kind={:?} scope={:?})",
                    record.timestamp, record.verifier_id, record.result, record.kind, record.scope
                );
            }
        }
        Command::Discharge { obj_id, kind, verifier } => {
            let obj = store.retrieve(&obj_id, 0.0)?;
            let has_obligation = obj.obligations.iter().any(|o| o.kind == kind);
            if !has_obligation {
                println!("Object {obj_id} does not have obligation '{kind}'");
                return Ok(());
            }
            let discharged = core_discharge(&obj, &kind, "", &registry, &verifier, now())?;
            let still_pending = discharged.obligations.iter().any(|o| o.kind == kind);
            store.store(&obj_id, &discharged, 0.0)?;
            println!("Discharged obligation '{kind}' for object {obj_id}");
            if still_pending {
                println!("Result: obligation still pending (verifier returned reject/conditional)");
            } else {
                println!("Result: obligation discharged (verifier returned accept)");
            }
        }
        Command::Unwrap { obj_id } => {
            let obj = store.retrieve(&obj_id, 0.0)?;
            let value = obj.unwrap()?;
            println!("Successfully unwrapped object {obj_id}");
            println!("Value: {}", serde_json::to_string_pretty(&value.to_json())?);
        }
        Command::List { kind, cleared, uncleared } => {
            let want_cleared = if cleared { Some(true) } else if uncleared { Some(false) } else { None };
            for (id, obligations, evidence_count) in store.list_ids()? {
                let is_cleared = obligations.is_empty();
                if let Some(want) = want_cleared {
                    if is_cleared != want {
                        continue;
                    }
                }
                if let Some(ref kind) = kind {
                    if !obligations.iter().any(|o| &o.kind == kind) {
                        continue;
                    }
                }
                let status = if is_cleared { "Cleared".to_string() } else { format!("Uncleared ({})", obligations.len()) };
                println!("{id}\t{status}\t{:?}\tevidence={evidence_count}", obligations);
            }
        }
        Command::Project { obj_id, path, output_id } => {
            let obj = store.retrieve(&obj_id, 0.0)?;
            let projected = core_project(&obj, &path);
            store.store(&output_id, &projected, 0.0)?;
            println!("Projected {obj_id}:{path} -> {output_id}");
            println!("Projected value: {}", serde_json::to_string_pretty(&projected.value.to_json())?);
            println!("New obligations: {:?}", projected.obligations);
        }
        Command::Merge { obj_id1, obj_id2, output_id } => {
            let obj1 = store.retrieve(&obj_id1, 0.0)?;
            let obj2 = store.retrieve(&obj_id2, 0.0)?;
            let merged = chava_core::merge(&obj1, &obj2);
            store.store(&output_id, &merged, 0.0)?;
            println!("Merged {obj_id1} + {obj_id2} -> {output_id}");
            println!("Combined obligations: {:?}", merged.obligations);
        }
        Command::Audit { verifier, since, until } => {
            let Some(verifier) = verifier else {
                bail!("audit currently requires --verifier");
            };
            let rows = store.query_by_verifier(&verifier, since, until)?;
            if rows.is_empty() {
                println!("No audit records found");
                return Ok(());
            }
            for (obj_id, timestamp, result) in rows.into_iter().take(100) {
                println!("{timestamp}\t{obj_id}\t{verifier}\t{result}");
            }
        }
        Command::Stats => {
            let stats = store.metrics();
            println!("store_ops: {}", stats.store_ops);
            println!("retrieve_ops: {}", stats.retrieve_ops);
            if let Some(avg) = stats.avg_store_time_ms {
                println!("avg_store_time_ms: {avg:.3}");
                println!("p50_store_time_ms: {:.3}", stats.p50_store_time_ms.unwrap_or(0.0));
                println!("p95_store_time_ms: {:.3}", stats.p95_store_time_ms.unwrap_or(0.0));
                println!("p99_store_time_ms: {:.3}", stats.p99_store_time_ms.unwrap_or(0.0));
            }
            if let Some(avg) = stats.avg_retrieve_time_ms {
                println!("avg_retrieve_time_ms: {avg:.3}");
                println!("p50_retrieve_time_ms: {:.3}", stats.p50_retrieve_time_ms.unwrap_or(0.0));
                println!("p95_retrieve_time_ms: {:.3}", stats.p95_retrieve_time_ms.unwrap_or(0.0));
                println!("p99_retrieve_time_ms: {:.3}", stats.p99_retrieve_time_ms.unwrap_or(0.0));
            }
            let (objects, kinds) = store.counts()?;
            println!("total objects: {objects}");
            println!("total obligation kinds: {kinds}");
        }
    }

    Ok(())
}
