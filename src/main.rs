use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;

use feedcache::cache::{OffsetRange, RangeDirection, SkimCache};
use feedcache::config::Config;
use feedcache::logging;
use feedcache::remote::{CachedApiClient, FeedEntry};

#[derive(Parser, Debug)]
#[command(name = "feedcache")]
#[command(about = "Browse a paginated feed through a client-side cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/feedcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Feed API base URL, overriding the config file
  #[arg(long)]
  api_url: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Page through the feed from the newest end
  Feed {
    /// Number of pages to load
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// Page through the feed from the oldest end
  Tail {
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
  },
  /// Page through the feed in one direction until it runs out
  Page {
    #[arg(short, long, default_value_t = 1)]
    pages: usize,
    /// Start from the oldest item instead of the newest
    #[arg(long)]
    oldest: bool,
  },
  /// Load an offset/limit window of the feed
  Skim {
    #[arg(long, default_value_t = 0)]
    offset: usize,
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// Show feed metadata
  Info,
  /// Fetch items by id
  Get {
    #[arg(required = true)]
    ids: Vec<String>,
    /// Retry failed items once
    #[arg(long)]
    repair: bool,
  },
}

fn load_config(args: &Args) -> Result<Config> {
  let mut config = match (Config::load(args.config.as_deref()), &args.api_url) {
    (Ok(config), _) => config,
    // A URL on the command line is enough to run without a config file
    (Err(_), Some(url)) if args.config.is_none() => Config::with_api_url(url.clone()),
    (Err(e), _) => return Err(e),
  };
  if let Some(url) = &args.api_url {
    config.api.url = url.clone();
  }
  Ok(config)
}

fn print_entries(entries: &[FeedEntry]) {
  for entry in entries {
    println!("{}\t{}", entry.published_at, entry.id);
  }
}

fn print_skim(skim: &SkimCache<FeedEntry>, range: OffsetRange) {
  for index in range.offset..range.end().min(skim.len()) {
    match skim.get(index) {
      Some(entry) => println!("{}\t{}\t{}", index, entry.published_at, entry.id),
      None => println!("{}\t-", index),
    }
  }
  if skim.has_no_more_items() {
    println!("(end of feed at {})", skim.len());
  }
}

async fn get_items(client: &CachedApiClient, ids: &[String], repair: bool) -> Result<()> {
  let mut results = client.items(ids).await;

  if repair && results.iter().any(Result::is_err) {
    let restarted = client.repair();
    tracing::info!(restarted, "retrying failed items");
    results = client.items(ids).await;
  }

  for (id, result) in ids.iter().zip(results) {
    match result {
      Ok(item) => {
        let body = serde_json::to_string(&item.body)?;
        println!("{}\t{}\t{}", item.id, item.published_at, body);
      }
      Err(e) => eprintln!("{}\terror: {}", id, e),
    }
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = load_config(&args)?;
  let _log_guard = logging::init(&config.logging)?;

  let client = CachedApiClient::new(&config)?;

  match args.command {
    Command::Feed { pages } => {
      let mut entries = client.feed_first(config.feed.initial_count).await?;
      for _ in 1..pages {
        entries = client.feed_next(config.feed.more_count).await?;
      }
      print_entries(&entries);
    }
    Command::Tail { pages } => {
      let mut entries = client.feed_last(config.feed.initial_count).await?;
      for _ in 1..pages {
        entries = client.feed_prev(config.feed.more_count).await?;
      }
      print_entries(&entries);
    }
    Command::Page { pages, oldest } => {
      let direction = if oldest {
        RangeDirection::First
      } else {
        RangeDirection::Last
      };
      let mut list = client
        .paginate(direction)
        .load_more(config.feed.initial_count)
        .await?;
      for _ in 1..pages {
        if list.has_no_more_items() {
          break;
        }
        list = list.load_more(config.feed.more_count).await?;
      }
      print_entries(list.items());
      if list.has_no_more_items() {
        println!("(end of feed)");
      }
    }
    Command::Info => {
      let info = client.info().await?;
      println!("{}\t{}", info.title.as_deref().unwrap_or("-"), info.total_items);
    }
    Command::Skim { offset, limit } => {
      let range = OffsetRange::new(offset, limit);
      let skim = client.skim(range).await?;
      print_skim(&skim, range);
    }
    Command::Get { ids, repair } => get_items(&client, &ids, repair).await?,
  }

  Ok(())
}
