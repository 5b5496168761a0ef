//! Quick connection check against the configured SurrealDB
//! Run with: cargo run --package agentdesk-state --example check_connection

use agentdesk_state::{CloudConfig, ProjectStore, SurrealHandle, SurrealProjectStore};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    match CloudConfig::from_env() {
        Ok(config) => {
            println!("Checking SurrealDB connection...");
            println!("  Endpoint: {}", config.endpoint);
            println!("  Namespace: {}", config.namespace);
            println!("  Database: {}", config.database);

            match SurrealHandle::setup_cloud(config).await {
                Ok(handle) => {
                    let store = SurrealProjectStore::new(Arc::new(handle));
                    match store.list_stage_catalog().await {
                        Ok(stages) => {
                            println!("✓ Connected, schema initialized");
                            println!("✓ {} stage(s) in catalog", stages.len());
                        }
                        Err(e) => {
                            eprintln!("✗ Query failed: {}", e);
                            std::process::exit(1);
                        }
                    }
                }
                Err(e) => {
                    eprintln!("✗ Connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Err(e) => {
            eprintln!("✗ Missing environment variables: {}", e);
            std::process::exit(1);
        }
    }
}
