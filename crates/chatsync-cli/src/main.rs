//! chatsync admin CLI.
//!
//! Provides the `chatsync` binary for inspecting and repairing the databases
//! a chatsync server keeps under its data directory. Every command prints
//! its result as JSON on stdout.
//!
//! Exit codes: 0 = success, 1 = not found or usage error, 3 = storage error.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use chatsync_core::ConversationId;
use chatsync_persist::{
    builtin_chain, BlobStateAdapter, HydrationOutcome, PersistOptions, PersistedStore,
};
use chatsync_server::config::{ServerConfig, CHATS_DB, DEFAULT_DATA_DIR, METRICS_DB, STORES_DB};
use chatsync_storage::{
    BlobStore, ConversationStore, SqliteBlobStore, SqliteConversationStore, SqliteUsageStore,
    StorageError, UsageStore,
};

/// chatsync storage tools.
#[derive(Parser)]
#[command(name = "chatsync", about = "Inspect and maintain chatsync databases")]
struct Cli {
    /// Directory holding the chatsync database files.
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stored conversations.
    Chats {
        #[command(subcommand)]
        command: ChatsCommand,
    },
    /// Named blob stores.
    Stores {
        #[command(subcommand)]
        command: StoresCommand,
    },
    /// Usage metrics.
    Metrics {
        #[command(subcommand)]
        command: MetricsCommand,
    },
}

#[derive(Subcommand)]
enum ChatsCommand {
    /// List conversation summaries, oldest first.
    List,
    /// Print one conversation.
    Show { id: String },
    /// Delete one conversation and everything it owns.
    Delete { id: String },
}

#[derive(Subcommand)]
enum StoresCommand {
    /// List every named blob.
    List,
    /// Print one named blob.
    Get { name: String },
    /// Delete one named blob.
    Delete { name: String },
    /// Migrate a stored blob to a newer shape version and write it back.
    Migrate {
        name: String,

        /// Target version.
        #[arg(long)]
        to: u32,

        /// Built-in chain to use (default: the chain named like the store).
        #[arg(long)]
        chain: Option<String>,
    },
}

#[derive(Subcommand)]
enum MetricsCommand {
    /// List every service aggregate.
    List,
    /// Drop the usage log and every aggregate.
    Clear,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Usage(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl CliError {
    fn exit_code(&self) -> i32 {
        match self {
            CliError::NotFound(_) | CliError::Usage(_) => 1,
            CliError::Storage(_) => 3,
        }
    }
}

impl From<StorageError> for CliError {
    fn from(err: StorageError) -> Self {
        CliError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Storage(err.to_string())
    }
}

fn main() {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    };

    let config = ServerConfig::default().with_data_dir(&cli.data_dir);
    let exit_code = match run(&config, cli.command) {
        Ok(output) => {
            let json = serde_json::to_string_pretty(&output).unwrap_or_else(|e| {
                format!("{{\"error\": \"failed to serialize result: {}\"}}", e)
            });
            println!("{}", json);
            0
        }
        Err(err) => {
            eprintln!("Error: {}", err);
            err.exit_code()
        }
    };
    process::exit(exit_code);
}

fn run(config: &ServerConfig, command: Commands) -> Result<Value, CliError> {
    match command {
        Commands::Chats { command } => run_chats(config, command),
        Commands::Stores { command } => run_stores(config, command),
        Commands::Metrics { command } => run_metrics(config, command),
    }
}

fn db_path(config: &ServerConfig, file: &str) -> String {
    config.db_path(file).to_string_lossy().to_string()
}

fn run_chats(config: &ServerConfig, command: ChatsCommand) -> Result<Value, CliError> {
    let mut store = SqliteConversationStore::new(&db_path(config, CHATS_DB))?;
    match command {
        ChatsCommand::List => Ok(serde_json::to_value(store.list_summaries()?)?),
        ChatsCommand::Show { id } => {
            let conversation = store
                .load(&ConversationId::from(id.as_str()))?
                .ok_or_else(|| CliError::NotFound(format!("conversation '{}' not found", id)))?;
            Ok(serde_json::to_value(conversation)?)
        }
        ChatsCommand::Delete { id } => {
            let conversation_id = ConversationId::from(id.as_str());
            if !store.exists(&conversation_id)? {
                return Err(CliError::NotFound(format!("conversation '{}' not found", id)));
            }
            store.delete(&conversation_id)?;
            Ok(json!({ "deleted": id }))
        }
    }
}

fn run_stores(config: &ServerConfig, command: StoresCommand) -> Result<Value, CliError> {
    let path = db_path(config, STORES_DB);
    match command {
        StoresCommand::List => {
            let store = SqliteBlobStore::new(&path)?;
            Ok(serde_json::to_value(store.list_all()?)?)
        }
        StoresCommand::Get { name } => {
            let store = SqliteBlobStore::new(&path)?;
            let blob = store
                .get(&name)?
                .ok_or_else(|| CliError::NotFound(format!("store '{}' not found", name)))?;
            Ok(serde_json::to_value(blob)?)
        }
        StoresCommand::Delete { name } => {
            let mut store = SqliteBlobStore::new(&path)?;
            if !store.delete(&name)? {
                return Err(CliError::NotFound(format!("store '{}' not found", name)));
            }
            Ok(json!({ "deleted": name }))
        }
        StoresCommand::Migrate { name, to, chain } => {
            let store = SqliteBlobStore::new(&path)?;
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(migrate_store(store, &name, to, chain.as_deref()))
        }
    }
}

/// Hydrates the blob `name` through a [`PersistedStore`], letting the
/// migration chain bring it to version `to`, then flushes the result.
async fn migrate_store(
    store: SqliteBlobStore,
    name: &str,
    to: u32,
    chain: Option<&str>,
) -> Result<Value, CliError> {
    let chain_name = chain.unwrap_or(name);
    let (migrations, latest) = builtin_chain(chain_name)
        .ok_or_else(|| CliError::Usage(format!("no migration chain named '{}'", chain_name)))?;
    if to > latest {
        return Err(CliError::Usage(format!(
            "chain '{}' only reaches version {}",
            chain_name, latest
        )));
    }

    let blobs = Arc::new(tokio::sync::Mutex::new(store));
    let from = match blobs.lock().await.get(name)? {
        Some(blob) => blob.version,
        None => return Err(CliError::NotFound(format!("store '{}' not found", name))),
    };
    if from >= to {
        return Ok(json!({ "store": name, "version": from, "migrated": false }));
    }

    let persisted = PersistedStore::detached(
        Value::Null,
        Arc::new(BlobStateAdapter::new(blobs.clone())),
        PersistOptions::new(name, to).with_migrations(migrations),
    );
    match persisted.rehydrate().await {
        HydrationOutcome::Migrated { from } => {
            // The write-back may already be in flight; flush_now waits for it.
            persisted.flush_now().await;
            if persisted.flush_count() == 0 {
                return Err(CliError::Storage(format!(
                    "failed to write migrated store '{}'",
                    name
                )));
            }
            tracing::info!(store = %name, from, to, "store migrated");
            Ok(json!({ "store": name, "from": from, "version": to, "migrated": true }))
        }
        outcome => Err(CliError::Storage(format!(
            "could not migrate store '{}' from version {} ({:?})",
            name, from, outcome
        ))),
    }
}

fn run_metrics(config: &ServerConfig, command: MetricsCommand) -> Result<Value, CliError> {
    let usage = SqliteUsageStore::new(&db_path(config, METRICS_DB))?;
    match command {
        MetricsCommand::List => Ok(serde_json::to_value(usage.get_all_aggregates()?)?),
        MetricsCommand::Clear => {
            usage.clear_all()?;
            Ok(json!({ "cleared": true }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatsync_core::{Conversation, Message, Role, UsageCategory, UsageEvent};

    fn config(dir: &tempfile::TempDir) -> ServerConfig {
        ServerConfig::default().with_data_dir(dir.path())
    }

    fn seed_blob(config: &ServerConfig, name: &str, data: Value, version: u32) {
        let mut store = SqliteBlobStore::new(&db_path(config, STORES_DB)).unwrap();
        store.put(name, &data, version).unwrap();
    }

    #[test]
    fn cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "chatsync",
            "--data-dir",
            "/tmp/x",
            "stores",
            "migrate",
            "app-ui",
            "--to",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.data_dir, PathBuf::from("/tmp/x"));
        assert!(matches!(
            cli.command,
            Commands::Stores {
                command: StoresCommand::Migrate { to: 3, chain: None, .. }
            }
        ));
        assert!(Cli::try_parse_from(["chatsync", "chats", "show"]).is_err());
    }

    #[test]
    fn chats_show_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        {
            let mut store = SqliteConversationStore::new(&db_path(&config, CHATS_DB)).unwrap();
            let mut conversation = Conversation::new("Generic");
            conversation.id = ConversationId::from("c1");
            conversation.append_message(Message::new_text(Role::User, "hi"));
            store.save(&conversation).unwrap();
        }

        let listed = run_chats(&config, ChatsCommand::List).unwrap();
        assert_eq!(listed[0]["id"], "c1");
        assert_eq!(listed[0]["messageCount"], 1);

        let shown = run_chats(&config, ChatsCommand::Show { id: "c1".into() }).unwrap();
        assert_eq!(shown["messages"].as_array().unwrap().len(), 1);

        run_chats(&config, ChatsCommand::Delete { id: "c1".into() }).unwrap();
        let err = run_chats(&config, ChatsCommand::Show { id: "c1".into() }).unwrap_err();
        assert_eq!(err.exit_code(), 1);
        let err = run_chats(&config, ChatsCommand::Delete { id: "c1".into() }).unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));
    }

    #[test]
    fn stores_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        seed_blob(&config, "b", json!(2), 1);
        seed_blob(&config, "a", json!(1), 1);

        let listed = run_stores(&config, StoresCommand::List).unwrap();
        assert_eq!(listed[0]["name"], "a");
        assert_eq!(listed[1]["name"], "b");

        let blob = run_stores(&config, StoresCommand::Get { name: "b".into() }).unwrap();
        assert_eq!(blob["data"], 2);

        run_stores(&config, StoresCommand::Delete { name: "b".into() }).unwrap();
        let err = run_stores(&config, StoresCommand::Get { name: "b".into() }).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn migrate_brings_app_ui_to_the_target_version() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        seed_blob(&config, "app-ui", json!({"centerMode": "narrow"}), 1);

        let result = run_stores(
            &config,
            StoresCommand::Migrate {
                name: "app-ui".into(),
                to: 3,
                chain: None,
            },
        )
        .unwrap();
        assert_eq!(result["migrated"], true);
        assert_eq!(result["from"], 1);

        let blob = run_stores(&config, StoresCommand::Get { name: "app-ui".into() }).unwrap();
        assert_eq!(blob["version"], 3);
        assert_eq!(blob["data"]["centerMode"], "full");

        // Already current: nothing to do.
        let again = run_stores(
            &config,
            StoresCommand::Migrate {
                name: "app-ui".into(),
                to: 3,
                chain: None,
            },
        )
        .unwrap();
        assert_eq!(again["migrated"], false);
    }

    #[test]
    fn migrate_rejects_unknown_chains_and_missing_stores() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        seed_blob(&config, "prefs", json!({}), 1);

        let err = run_stores(
            &config,
            StoresCommand::Migrate {
                name: "prefs".into(),
                to: 2,
                chain: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));

        let err = run_stores(
            &config,
            StoresCommand::Migrate {
                name: "missing".into(),
                to: 2,
                chain: Some("app-ui".into()),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CliError::NotFound(_)));

        let err = run_stores(
            &config,
            StoresCommand::Migrate {
                name: "prefs".into(),
                to: 99,
                chain: Some("app-ui".into()),
            },
        )
        .unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn metrics_list_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let usage = SqliteUsageStore::new(&db_path(&config, METRICS_DB)).unwrap();
        usage
            .record_event(&UsageEvent {
                service_id: "openai".into(),
                model_id: None,
                cost: Some(0.1),
                savings: None,
                input_tokens: 5,
                output_tokens: 7,
                category: UsageCategory::Priced,
                timestamp: 1,
            })
            .unwrap();

        let listed = run_metrics(&config, MetricsCommand::List).unwrap();
        assert_eq!(listed[0]["serviceId"], "openai");
        assert_eq!(listed[0]["usageCount"], 1);

        run_metrics(&config, MetricsCommand::Clear).unwrap();
        let listed = run_metrics(&config, MetricsCommand::List).unwrap();
        assert_eq!(listed, json!([]));
    }
}
