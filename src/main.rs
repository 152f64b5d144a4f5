//! cirrus: search a streaming-audio catalog and play the results through a
//! locally spawned engine, driven entirely over its HTTP control surface.

mod catalog;
mod commands;
mod config;
mod engine;
mod error;
mod format;
mod history;
mod hotkeys;
mod queue;
mod range;
mod session;
mod terminal;

use std::process::ExitCode;

use clap::Parser;
use log::warn;

use catalog::{Catalog, CatalogItem, CatalogTrack, HttpCatalog, SearchQuery};
use config::Config;
use engine::{EngineProcess, HttpEngine};
use error::{Error, Result};
use history::History;
use queue::Track;
use session::Session;

#[derive(Debug, Parser)]
#[command(name = "cirrus")]
#[command(about = "Terminal player for streaming-audio catalogs")]
struct Cli {
    /// `search` (default) or `play`, abbreviated `s` / `p`.
    command: Option<String>,
    /// Catalog query: [username] [category] [query]
    args: Vec<String>,
    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    clog.filter(None, level);
    clog.init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = config::config_file();
    let config = Config::load(&config_path)?;
    if config.catalog.client_id.is_empty() {
        println!(
            "A catalog client id is required.\nPlease edit {} and set catalog.client_id.",
            config_path.display()
        );
        return Ok(());
    }

    let catalog = HttpCatalog::new(&config.catalog.base_url, &config.catalog.client_id);
    let query = catalog::parse_search_args(&cli.args)?;

    match cli.command.as_deref() {
        None | Some("s") | Some("search") => run_search(&catalog, &query),
        Some("p") | Some("play") => run_play(&catalog, &config, &query),
        Some(other) => Err(Error::Parse(format!("unrecognized command '{other}'"))),
    }
}

fn run_search(catalog: &HttpCatalog, query: &SearchQuery) -> Result<()> {
    println!("Searching {query}");
    for (index, item) in catalog.search(query)?.iter().enumerate() {
        println!("{}", format::numbered_row(index, &item.to_string()));
    }
    Ok(())
}

/// The first result decides what plays: a track result plays every track
/// result, a collection or user plays its own tracks.
fn resolve_play_tracks(catalog: &impl Catalog, items: Vec<CatalogItem>) -> Result<Vec<Track>> {
    let Some(first) = items.first() else {
        return Err(Error::not_found("anything matching the query"));
    };
    let tracks: Vec<CatalogTrack> = match first {
        CatalogItem::Track(_) => items
            .iter()
            .filter_map(|item| match item {
                CatalogItem::Track(track) => Some(track.clone()),
                _ => None,
            })
            .collect(),
        CatalogItem::Collection(collection) => collection.tracks.clone(),
        CatalogItem::User(user) => catalog.user_tracks(user.id)?,
    };
    Ok(tracks.into_iter().map(CatalogTrack::into_track).collect())
}

fn run_play(catalog: &HttpCatalog, config: &Config, query: &SearchQuery) -> Result<()> {
    println!("Playing {query}");
    let items = catalog.search(query)?;
    let tracks = resolve_play_tracks(catalog, items)?;

    let mut process = EngineProcess::spawn(&config.engine)?;
    let engine = HttpEngine::new(config.engine.port, &config.engine.password);
    if let Err(err) = engine::await_engine(&engine) {
        process.terminate();
        return Err(err);
    }

    let history = History::load(&config.history_file());
    let mut session = Session::new(engine, history);
    let result = session
        .enqueue(tracks)
        .and_then(|_| session.run(catalog));

    // Teardown order is fixed: engine first, then history, on every path.
    process.terminate();
    if let Err(err) = session.history().save() {
        warn!("failed to persist history: {err}");
    }
    result
}
