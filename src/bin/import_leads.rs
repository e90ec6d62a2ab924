//! Imports a JSON array of leads through intake reconciliation.
//!
//! Usage: `import_leads <file.json>`
//!
//! Uses Postgres when DATABASE_URL is set, otherwise a throwaway in-memory store
//! (useful for a dry run over an export).

use anyhow::Context;
use std::sync::Arc;

use lead_intake_api::config::Config;
use lead_intake_api::db::Database;
use lead_intake_api::db_storage::PgLeadStore;
use lead_intake_api::lead_store::{InMemoryLeadStore, LeadStore};
use lead_intake_api::models::{BatchIntakeResponse, LeadPayload};
use lead_intake_api::reconciliation::{reconcile_payload, IntakeContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Usage: import_leads <file.json>"))?;

    let config = Config::from_env()?;

    let store: Arc<dyn LeadStore> = match config.database_url {
        Some(ref url) => {
            println!("Connecting to database...");
            let db = Database::new(url, config.db_max_connections).await?;
            println!("✓ Database connected\n");
            Arc::new(PgLeadStore::new(db.pool))
        }
        None => {
            println!("DATABASE_URL not set - dry run against an in-memory store\n");
            Arc::new(InMemoryLeadStore::new())
        }
    };

    let content =
        std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
    let leads: Vec<LeadPayload> = serde_json::from_str(&content)
        .with_context(|| format!("{} must contain a JSON array of lead objects", path))?;

    let total = leads.len();
    println!("=== Importing {} leads from {} ===\n", total, path);

    let mut ctx = IntakeContext::new("import");
    let mut summary = BatchIntakeResponse {
        received: total,
        ..Default::default()
    };

    for (idx, lead) in leads.into_iter().enumerate() {
        if idx > 0 {
            ctx.stamp_receipt();
        }
        let result = reconcile_payload(store.as_ref(), &ctx, lead).await;
        match &result {
            Ok(outcome) => println!("[{}/{}] {}", idx + 1, total, outcome.label()),
            Err(e) => println!("[{}/{}] ✗ {}", idx + 1, total, e),
        }
        summary.record(result);
    }

    println!("\n=== Import Summary ===");
    println!("Inserted: {}", summary.inserted);
    println!("Updated:  {}", summary.updated);
    println!("Ignored:  {}", summary.ignored);
    println!("Failed:   {}", summary.failed);

    if summary.failed > 0 {
        anyhow::bail!("{} of {} leads failed to import", summary.failed, total);
    }

    Ok(())
}
