mod cache;
mod cocktail;
mod config;
mod db;
mod logging;
mod net;
mod output;
mod resource;
#[cfg(test)]
mod testing;

use std::future::Future;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use futures::StreamExt;
use tracing::{info, warn};
use url::Url;

use cache::{CacheLayer, CacheResult, CacheStorage, FreshnessPolicy, NoopStorage, SqliteStorage, SystemClock};
use cocktail::{CocktailClient, CocktailRepository};
use config::Config;
use db::{Database, LAST_CATEGORY, LAST_INGREDIENT};
use net::{Connectivity, NetworkMonitor, RateLimiter, RetryHandler, RetryPolicy, TcpProbe};
use resource::Resource;

#[derive(Parser, Debug)]
#[command(name = "tipple")]
#[command(about = "An offline-first command-line browser for TheCocktailDB")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tipple/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Never touch the network; serve whatever is cached
  #[arg(long)]
  offline: bool,

  /// Also log to stderr and show error details
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List drink categories
  Categories,
  /// List drinks in a category (defaults to the last one used)
  Category { name: Option<String> },
  /// Search drinks by name
  Search { name: String },
  /// List drinks containing an ingredient (defaults to the last one used)
  Ingredient { name: Option<String> },
  /// List all ingredients
  Ingredients,
  /// List drinks whose name starts with a letter
  Letter { letter: char },
  /// Show a recipe
  Show {
    id: String,
    /// Ignore the cached copy
    #[arg(long)]
    refresh: bool,
  },
  /// Show a random recipe
  Random,
  /// Manage favorites
  Fav {
    #[command(subcommand)]
    action: FavCommand,
  },
  /// Inspect or clear the local cache
  Cache {
    #[command(subcommand)]
    action: CacheCommand,
  },
  /// Read or write stored preferences
  Prefs {
    #[command(subcommand)]
    action: PrefsCommand,
  },
  /// Show connectivity and rate limit state
  Status,
  /// Print connectivity changes until interrupted
  Watch,
}

impl Command {
  /// Whether the command may reach the API. Local commands skip the
  /// connectivity probe.
  fn uses_network(&self) -> bool {
    match self {
      Command::Fav { action } => {
        matches!(action, FavCommand::Add { .. } | FavCommand::Toggle { .. })
      }
      Command::Cache { .. } | Command::Prefs { .. } => false,
      _ => true,
    }
  }
}

#[derive(Subcommand, Debug)]
enum FavCommand {
  Add { id: String },
  Remove { id: String },
  Toggle { id: String },
  List,
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Show record counts
  Status,
  /// List recipes available offline
  List,
  /// Delete every cached record
  Clear,
  /// Delete records past their TTL
  ClearStale,
  /// Mark one drink, or everything, as stale
  Invalidate { id: Option<String> },
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
  Get { key: String },
  Set { key: String, value: String },
  Remove { key: String },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&config.log, &config.log_dir()?, args.verbose)?;
  info!(version = env!("CARGO_PKG_VERSION"), command = ?args.command, "Starting");

  let limiter = RateLimiter::new(config.rate_limit.clone());
  let client = CocktailClient::new(&config, limiter)?;
  let monitor = if args.command.uses_network() {
    start_monitor(&config, client.endpoint(), args.offline).await
  } else {
    NetworkMonitor::manual(Connectivity::OFFLINE)
  };
  let monitor = Arc::new(monitor);
  let retry = RetryHandler::new(RetryPolicy::from(&config.retry), Arc::clone(&monitor));

  let database_path = config.database_path()?;
  let db = Arc::new(Database::open(&database_path)?);

  let app = App {
    monitor: Arc::clone(&monitor),
    verbose: args.verbose,
  };

  if config.cache.enabled {
    let policy = FreshnessPolicy::new(config.cache.ttl(), Arc::new(SystemClock));
    let storage = SqliteStorage::open(&database_path, policy)?;
    let repo = CocktailRepository::new(client, CacheLayer::new(storage, monitor), retry, db);
    app.run(args.command, &repo).await
  } else {
    info!("Cache disabled");
    let storage = NoopStorage::default();
    let repo = CocktailRepository::new(client, CacheLayer::new(storage, monitor), retry, db);
    app.run(args.command, &repo).await
  }
}

async fn start_monitor(config: &Config, endpoint: &Url, offline: bool) -> NetworkMonitor {
  if offline {
    return NetworkMonitor::manual(Connectivity::OFFLINE);
  }

  let timeout = Duration::from_secs(config.network.probe_timeout_secs);
  match TcpProbe::for_url(endpoint, timeout) {
    Some(probe) => {
      let interval = Duration::from_secs(config.network.probe_interval_secs);
      NetworkMonitor::start(probe, interval).await
    }
    None => {
      warn!(%endpoint, "Cannot probe API host, assuming online");
      NetworkMonitor::manual(Connectivity::ONLINE)
    }
  }
}

struct App {
  monitor: Arc<NetworkMonitor>,
  verbose: bool,
}

impl App {
  async fn run<S: CacheStorage>(&self, command: Command, repo: &CocktailRepository<S>) -> Result<ExitCode> {
    let code = match command {
      Command::Categories => {
        self
          .show(repo.categories(), |r| cached(r, output::categories(&r.data)))
          .await
      }
      Command::Category { name } => {
        let Some(name) = remembered(name, repo.db(), LAST_CATEGORY)? else {
          eprintln!("No category given and none used before.");
          return Ok(ExitCode::FAILURE);
        };
        self
          .show(repo.drinks_by_category(&name), |r| {
            cached(r, output::drink_summaries(&r.data))
          })
          .await
      }
      Command::Search { name } => {
        self
          .show(repo.search_by_name(&name), |r| cached(r, output::drinks(&r.data)))
          .await
      }
      Command::Ingredient { name } => {
        let Some(name) = remembered(name, repo.db(), LAST_INGREDIENT)? else {
          eprintln!("No ingredient given and none used before.");
          return Ok(ExitCode::FAILURE);
        };
        self
          .show(repo.drinks_by_ingredient(&name), |r| {
            cached(r, output::drink_summaries(&r.data))
          })
          .await
      }
      Command::Ingredients => {
        self
          .show(repo.ingredients(), |r| cached(r, output::ingredients(&r.data)))
          .await
      }
      Command::Letter { letter } => {
        self
          .show(repo.search_by_first_letter(letter), |r| {
            cached(r, output::drinks(&r.data))
          })
          .await
      }
      Command::Show { id, refresh } => {
        let render = |r: &CacheResult<_>| cached(r, output::recipe(&r.data));
        if refresh {
          self.show(repo.refresh(&id), render).await
        } else {
          self.show(repo.drink(&id), render).await
        }
      }
      Command::Random => self.show(repo.random(), output::recipe).await,
      Command::Fav { action } => self.run_fav(action, repo).await,
      Command::Cache { action } => self.run_cache(action, repo).await,
      Command::Prefs { action } => run_prefs(action, repo.db())?,
      Command::Status => {
        let snapshot = repo.client().limiter().snapshot().await.ok();
        println!("{}", output::status(self.monitor.connectivity(), snapshot));
        ExitCode::SUCCESS
      }
      Command::Watch => {
        let mut changes = std::pin::pin!(self.monitor.observe().into_stream());
        loop {
          tokio::select! {
            next = changes.next() => match next {
              Some(true) => println!("online"),
              Some(false) => println!("offline"),
              None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
          }
        }
        ExitCode::SUCCESS
      }
    };
    Ok(code)
  }

  async fn run_fav<S: CacheStorage>(&self, action: FavCommand, repo: &CocktailRepository<S>) -> ExitCode {
    match action {
      FavCommand::Add { id } => {
        self
          .show(repo.add_favorite(&id), |d| format!("Added {} to favorites.", d.name))
          .await
      }
      FavCommand::Remove { id } => {
        self
          .show(async { repo.remove_favorite(&id) }, |removed| {
            if *removed {
              "Removed from favorites.".to_string()
            } else {
              "Not a favorite.".to_string()
            }
          })
          .await
      }
      FavCommand::Toggle { id } => {
        self
          .show(repo.toggle_favorite(&id), |now_favorite| {
            if *now_favorite {
              "Added to favorites.".to_string()
            } else {
              "Removed from favorites.".to_string()
            }
          })
          .await
      }
      FavCommand::List => {
        self
          .show(async { repo.favorites() }, |f| output::favorites(f))
          .await
      }
    }
  }

  async fn run_cache<S: CacheStorage>(&self, action: CacheCommand, repo: &CocktailRepository<S>) -> ExitCode {
    match action {
      CacheCommand::Status => {
        let cleared_at = repo.cache_cleared_at();
        self
          .show(async { repo.cache_stats() }, |stats| {
            output::cache_stats(stats, cleared_at)
          })
          .await
      }
      CacheCommand::List => {
        self
          .show(async { repo.cached_drinks() }, |d| output::drinks(d))
          .await
      }
      CacheCommand::Clear => {
        self
          .show(async { repo.clear_cache() }, |_| "Cache cleared.".to_string())
          .await
      }
      CacheCommand::ClearStale => {
        self
          .show(async { repo.clear_stale() }, |removed| {
            format!("Removed {} stale records.", removed)
          })
          .await
      }
      CacheCommand::Invalidate { id } => {
        self
          .show(async { repo.invalidate(id.as_deref()) }, |count| {
            format!("Marked {} records stale.", count)
          })
          .await
      }
    }
  }

  /// Drive an operation to completion, printing progress and the outcome.
  async fn show<T, Fut, R>(&self, operation: Fut, render: R) -> ExitCode
  where
    Fut: Future<Output = Resource<T>>,
    R: Fn(&T) -> String,
  {
    let interactive = std::io::stderr().is_terminal();
    let mut states = std::pin::pin!(Resource::track(operation));

    while let Some(state) = states.next().await {
      match state {
        Resource::Loading => {
          if interactive {
            eprint!("Loading...\r");
          }
        }
        Resource::Success(data) => {
          if interactive {
            eprint!("          \r");
          }
          println!("{}", render(&data));
          return ExitCode::SUCCESS;
        }
        Resource::Error(e) => {
          if interactive {
            eprint!("          \r");
          }
          eprintln!("{}", output::error(&e, self.verbose));
          return ExitCode::FAILURE;
        }
      }
    }
    ExitCode::FAILURE
  }
}

fn run_prefs(action: PrefsCommand, db: &Database) -> Result<ExitCode> {
  match action {
    PrefsCommand::Get { key } => match db.preference(&key)? {
      Some(value) => println!("{}", value),
      None => {
        eprintln!("{} is not set.", key);
        return Ok(ExitCode::FAILURE);
      }
    },
    PrefsCommand::Set { key, value } => db.set_preference(&key, &value)?,
    PrefsCommand::Remove { key } => {
      if !db.remove_preference(&key)? {
        eprintln!("{} is not set.", key);
      }
    }
  }
  Ok(ExitCode::SUCCESS)
}

/// Explicit argument, or the value stored under `key` by an earlier run.
fn remembered(explicit: Option<String>, db: &Database, key: &str) -> Result<Option<String>> {
  match explicit {
    Some(value) => Ok(Some(value)),
    None => db.preference(key),
  }
}

/// Body followed by a note on cache provenance.
fn cached<T>(result: &CacheResult<T>, body: String) -> String {
  match output::source_note(result, chrono::Utc::now()) {
    Some(note) => format!("{}\n{}", body, note),
    None => body,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn command(args: &[&str]) -> Command {
    let argv = std::iter::once("tipple").chain(args.iter().copied());
    Args::try_parse_from(argv).unwrap().command
  }

  #[test]
  fn test_local_commands_skip_network() {
    for args in [
      &["prefs", "get", "last_category"][..],
      &["fav", "list"],
      &["fav", "remove", "11000"],
      &["cache", "status"],
      &["cache", "invalidate"],
    ] {
      assert!(!command(args).uses_network(), "{:?}", args);
    }
  }

  #[test]
  fn test_remote_commands_use_network() {
    for args in [
      &["search", "margarita"][..],
      &["show", "11000"],
      &["fav", "toggle", "11000"],
      &["status"],
      &["watch"],
    ] {
      assert!(command(args).uses_network(), "{:?}", args);
    }
  }
}
