// lorekeep CLI
//
// Thin clap front-end over `lorekeep::Lorekeeper`. Every command opens the
// SQLite store (`--db`, default under the user data dir), loads the TOML
// config (`--config`, defaults when missing) and prints either a readable
// table or JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use lorekeep::atoms::constants::{API_KEY_ENV, SUMMARY_COLLECTION};
use lorekeep::engine::chat::parse_chat;
use lorekeep::engine::config::{default_config_path, default_db_path};
use lorekeep::engine::embedding::EmbeddingClient;
use lorekeep::engine::generation::OpenAiGenerator;
use lorekeep::engine::search::SearchOptions;
use lorekeep::engine::store::Store;
use lorekeep::{
    ChatMessage, Embedder, Entity, EntityType, FusionMethod, LoreError, LoreResult, Lorebook,
    LorekeepConfig, Lorekeeper, TextGenerator,
};

#[derive(Parser, Debug)]
#[command(name = "lorekeep")]
#[command(about = "Memory for roleplay chats: entities, summaries, recall and lorebooks")]
#[command(version)]
struct Cli {
    /// Config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// API key for the generation and embedding backends
    #[arg(long, env = API_KEY_ENV, hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract entities from a chat export and record them
    Extract {
        /// Chat file (JSONL or JSON array)
        chat: PathBuf,
        #[arg(long)]
        json: bool,
    },

    /// List tracked entities
    Entities {
        /// Only this type (character, location, item, organization)
        #[arg(long = "type")]
        entity_type: Option<EntityType>,
        #[arg(long, default_value_t = 0.0)]
        min_confidence: f32,
        #[arg(long)]
        json: bool,
    },

    /// Show one entity by name or alias
    Lookup {
        name: String,
        #[arg(long)]
        json: bool,
    },

    /// Summarize the messages that left the recent window
    Summarize {
        chat: PathBuf,
        /// Only show what would be summarized
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },

    /// Search stored memories
    Search {
        query: String,
        #[arg(long, default_value = SUMMARY_COLLECTION)]
        collection: String,
        #[arg(long)]
        limit: Option<usize>,
        /// rrf or weighted
        #[arg(long)]
        fusion: Option<FusionMethod>,
        #[arg(long)]
        json: bool,
    },

    /// Create or update a lorebook file from tracked entities
    Lorebook {
        /// Output file; an existing lorebook there is updated in place
        out: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },

    /// Memory statistics
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config {
        /// Write the defaults to the config path if no file exists
        #[arg(long)]
        init: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn load_config(cli: &Cli) -> LoreResult<(LorekeepConfig, PathBuf)> {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = LorekeepConfig::load_or_default(&path)?;
    config.apply_api_key(cli.api_key.clone());
    Ok((config, path))
}

fn open_keeper(cli: &Cli, config: LorekeepConfig) -> LoreResult<Arc<Lorekeeper>> {
    let db = cli.db.clone().unwrap_or_else(default_db_path);
    let store = Arc::new(Store::open(&db)?);

    let generator: Option<Arc<dyn TextGenerator>> = if config.generation.enabled {
        Some(Arc::new(OpenAiGenerator::new(&config.generation)?))
    } else {
        None
    };
    let embedder: Option<Arc<dyn Embedder>> = if config.embedding.enabled {
        Some(Arc::new(EmbeddingClient::new(&config.embedding)?))
    } else {
        None
    };
    Ok(Arc::new(Lorekeeper::new(config, store, generator, embedder)?))
}

fn read_chat(path: &Path) -> LoreResult<Vec<ChatMessage>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LoreError::NotFound(format!("{}: {e}", path.display())))?;
    let messages = parse_chat(&text)?;
    info!("Read {} messages from {}", messages.len(), path.display());
    Ok(messages)
}

fn print_json<T: serde::Serialize>(value: &T) -> LoreResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_entities(entities: &[Entity]) {
    if entities.is_empty() {
        println!("No entities.");
        return;
    }
    println!("{:<28} {:<13} {:>6} {:>8}  seen", "NAME", "TYPE", "CONF", "MENTIONS");
    for e in entities {
        println!(
            "{:<28} {:<13} {:>6.2} {:>8}  {}-{}",
            e.name, e.entity_type, e.confidence, e.mentions, e.first_seen, e.last_seen
        );
    }
}

async fn run(cli: Cli) -> LoreResult<()> {
    let (config, config_path) = load_config(&cli)?;

    match &cli.command {
        Commands::Config { init } => {
            if *init && !config_path.exists() {
                LorekeepConfig::default().save(&config_path)?;
                println!("Wrote {}", config_path.display());
            }
            print!("{}", config.to_toml()?);
            Ok(())
        }

        Commands::Extract { chat, json } => {
            let messages = read_chat(chat)?;
            let keeper = open_keeper(&cli, config)?;
            let changed = keeper.ingest_chat(&messages)?;
            let entities = keeper.entities();
            if *json {
                print_json(&entities)
            } else {
                println!("{} messages, {} entities updated\n", messages.len(), changed);
                print_entities(&entities);
                Ok(())
            }
        }

        Commands::Entities { entity_type, min_confidence, json } => {
            let keeper = open_keeper(&cli, config)?;
            let entities: Vec<Entity> = keeper
                .entities()
                .into_iter()
                .filter(|e| entity_type.map_or(true, |t| e.entity_type == t))
                .filter(|e| e.confidence >= *min_confidence)
                .collect();
            if *json {
                print_json(&entities)
            } else {
                print_entities(&entities);
                Ok(())
            }
        }

        Commands::Lookup { name, json } => {
            let keeper = open_keeper(&cli, config)?;
            let entity = keeper
                .lookup_entity(name)
                .ok_or_else(|| LoreError::NotFound(format!("entity '{name}'")))?;
            if *json {
                return print_json(&entity);
            }
            println!("{} ({})", entity.name, entity.entity_type);
            println!("  confidence  {:.2}", entity.confidence);
            println!("  mentions    {}", entity.mentions);
            println!("  seen        messages {}-{}", entity.first_seen, entity.last_seen);
            if !entity.aliases.is_empty() {
                println!("  aliases     {}", entity.aliases.join(", "));
            }
            for ctx in &entity.contexts {
                println!("  > {ctx}");
            }
            Ok(())
        }

        Commands::Summarize { chat, dry_run, json } => {
            let messages = read_chat(chat)?;
            let keeper = open_keeper(&cli, config)?;
            if *dry_run {
                let state = keeper.window_state()?;
                let plan = lorekeep::engine::window::plan_window(&messages, &state, &keeper.config().window);
                return if *json {
                    print_json(&plan)
                } else if plan.is_empty() {
                    println!("Nothing to summarize.");
                    Ok(())
                } else {
                    println!("Would summarize {} messages: {:?}", plan.candidates.len(), plan.candidates);
                    Ok(())
                };
            }
            let report = keeper.run_window(&messages).await?;
            if *json {
                return print_json(&report);
            }
            if report.summaries.is_empty() {
                println!("Nothing to summarize.");
            }
            for s in &report.summaries {
                let tag = if s.fallback { " (raw)" } else { "" };
                println!("[{}-{}]{} {}\n", s.first_index, s.last_index, tag, s.text);
            }
            if !report.hidden.is_empty() {
                println!("Hide messages: {:?}", report.hidden);
            }
            Ok(())
        }

        Commands::Search { query, collection, limit, fusion, json } => {
            let keeper = open_keeper(&cli, config)?;
            let options = SearchOptions {
                limit: *limit,
                fusion: *fusion,
                ..Default::default()
            };
            let hits = keeper.search(collection, query, &options).await?;
            if *json {
                return print_json(&hits);
            }
            if hits.is_empty() {
                println!("No matches.");
            }
            for hit in &hits {
                let sources: Vec<String> = hit.sources.iter().map(|s| s.to_string()).collect();
                println!("{:.4}  [{}]  {}", hit.score, sources.join("+"), hit.text);
            }
            Ok(())
        }

        Commands::Lorebook { out, name } => {
            let keeper = open_keeper(&cli, config)?;
            let mut book = if out.exists() {
                Lorebook::load(out)?
            } else {
                Lorebook::default()
            };
            if name.is_some() {
                book.name = name.clone();
            }
            let report = keeper.sync_lorebook(&mut book).await;
            book.save(out)?;
            println!(
                "{}: {} created, {} updated, {} skipped ({} entries)",
                out.display(),
                report.created,
                report.updated,
                report.skipped,
                book.entries.len()
            );
            Ok(())
        }

        Commands::Stats { json } => {
            let keeper = open_keeper(&cli, config)?;
            let stats = keeper.stats()?;
            if *json {
                return print_json(&stats);
            }
            println!("entities           {}", stats.entities);
            println!(
                "summaries          {} ({} raw fallback)",
                stats.summaries, stats.fallback_summaries
            );
            match stats.summarized_until {
                Some(i) => println!("summarized until   message {i}"),
                None => println!("summarized until   -"),
            }
            for (collection, count) in &stats.collections {
                println!("collection {:<8} {}", collection, count);
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
