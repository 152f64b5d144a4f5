//! Line-oriented command mode.
//!
//! Entered from the playback loop with `:`. Reads lines until `quit` or
//! end-of-input; each line is shell-tokenized, the first token resolved
//! against an explicit command table with single-letter abbreviations, and
//! the rest passed as arguments. Errors are reported and mutate nothing.

use crate::catalog::{self, Catalog, CatalogItem};
use crate::engine::EngineControl;
use crate::error::{Error, Result};
use crate::format;
use crate::queue::Track;
use crate::range::{self, RangeContext};
use crate::session::Session;
use crate::terminal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Quit,
    List,
    Jump,
    Delete,
    Enqueue,
    Search,
    History,
}

fn resolve_command(name: &str) -> Option<Command> {
    match name {
        "q" | "quit" => Some(Command::Quit),
        "l" | "list" => Some(Command::List),
        "j" | "jump" => Some(Command::Jump),
        "d" | "delete" => Some(Command::Delete),
        "e" | "enqueue" => Some(Command::Enqueue),
        "s" | "search" => Some(Command::Search),
        "h" | "history" => Some(Command::History),
        _ => None,
    }
}

/// Whether the command loop keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Nested blocking command loop over the shared session state.
pub struct CommandMode<'a, E: EngineControl, C: Catalog> {
    session: &'a mut Session<E>,
    catalog: &'a C,
    /// Transient search-result cache that `enqueue` ranges index into.
    results: Vec<CatalogItem>,
}

impl<'a, E: EngineControl, C: Catalog> CommandMode<'a, E, C> {
    pub fn new(session: &'a mut Session<E>, catalog: &'a C) -> Self {
        Self {
            session,
            catalog,
            results: Vec::new(),
        }
    }

    /// Reads and dispatches lines until `quit` or end-of-input.
    pub fn run(&mut self) -> Result<()> {
        loop {
            let Some(line) = terminal::read_line(":")? else {
                break;
            };
            if line.trim().is_empty() {
                continue;
            }
            match self.dispatch(&line) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(err) => println!("{err}"),
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, line: &str) -> Result<Flow> {
        let tokens =
            shlex::split(line).ok_or_else(|| Error::Parse("unbalanced quotes".to_string()))?;
        let Some((name, args)) = tokens.split_first() else {
            return Ok(Flow::Continue);
        };
        let command = resolve_command(name)
            .ok_or_else(|| Error::Parse(format!("unknown command '{name}'")))?;
        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::List => self.list(),
            Command::Jump => self.jump(args)?,
            Command::Delete => self.delete(args)?,
            Command::Enqueue => self.enqueue(args)?,
            Command::Search => self.search(args)?,
            Command::History => self.history(args)?,
        }
        Ok(Flow::Continue)
    }

    /// Range over live queue positions; `.` is legal here.
    fn queue_range(&self, expr: &str) -> Result<Vec<usize>> {
        range::parse(
            expr,
            &RangeContext {
                current: self.session.current().and_then(|track| track.idx),
                end: self.session.queue().len(),
                allow_current: true,
            },
        )
    }

    /// Range over a cached listing; `.` has no meaning outside the queue.
    fn listing_range(&self, expr: &str, end: usize) -> Result<Vec<usize>> {
        range::parse(
            expr,
            &RangeContext {
                current: None,
                end,
                allow_current: false,
            },
        )
    }

    fn single_arg<'t>(&self, args: &'t [String], usage: &str) -> Result<&'t str> {
        match args {
            [only] => Ok(only.as_str()),
            _ => Err(Error::Parse(usage.to_string())),
        }
    }

    fn list(&self) {
        println!("Queue:");
        for track in self.session.queue().ordered() {
            println!("{}", format::queue_row(track));
        }
    }

    /// Resolves a jump target: a queue position (`.` allowed) or free text
    /// fuzzy-matched against queued titles.
    fn find_queue_track(&self, target: &str) -> Result<Track> {
        let position = if target == "." {
            Some(
                self.session
                    .current()
                    .and_then(|track| track.idx)
                    .ok_or_else(|| Error::Parse("'.' used with no current track".to_string()))?,
            )
        } else {
            target.parse::<usize>().ok()
        };
        if let Some(idx) = position {
            return self
                .session
                .queue()
                .by_idx(idx)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("queue index {idx}")));
        }
        let queued: Vec<Track> = self
            .session
            .queue()
            .ordered()
            .into_iter()
            .cloned()
            .collect();
        catalog::fuzzy_rank(queued, target, |track| track.title.as_str())
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(format!("track matching '{target}'")))
    }

    fn jump(&mut self, args: &[String]) -> Result<()> {
        let target =
            self.single_arg(args, "jump takes a target, either an index or a search string")?;
        let track = self.find_queue_track(target)?;
        let track = self.session.jump(track.id)?;
        println!("Jumping to {}", track.title);
        Ok(())
    }

    fn delete(&mut self, args: &[String]) -> Result<()> {
        let expr = self.single_arg(args, "delete takes a range argument")?;
        let indices = self.queue_range(expr)?;
        // Resolve every index before touching anything, so an out-of-bounds
        // range mutates nothing.
        let mut doomed = Vec::with_capacity(indices.len());
        for idx in indices {
            let track = self
                .session
                .queue()
                .by_idx(idx)
                .cloned()
                .ok_or_else(|| Error::not_found(format!("queue index {idx}")))?;
            doomed.push(track);
        }
        for track in &doomed {
            self.session.remove_track(track.id)?;
        }
        println!("deleted {} tracks", doomed.len());
        Ok(())
    }

    fn enqueue(&mut self, args: &[String]) -> Result<()> {
        let expr = self.single_arg(args, "enqueue takes a range argument")?;
        let indices = self.listing_range(expr, self.results.len())?;
        let mut tracks: Vec<Track> = Vec::new();
        for idx in indices {
            let item = self
                .results
                .get(idx)
                .ok_or_else(|| Error::not_found(format!("result index {idx}")))?;
            match item {
                CatalogItem::Track(track) => tracks.push(track.clone().into_track()),
                CatalogItem::Collection(collection) => tracks.extend(
                    collection
                        .tracks
                        .iter()
                        .cloned()
                        .map(catalog::CatalogTrack::into_track),
                ),
                CatalogItem::User(user) => tracks.extend(
                    self.catalog
                        .user_tracks(user.id)?
                        .into_iter()
                        .map(catalog::CatalogTrack::into_track),
                ),
            }
        }
        let added = self.session.enqueue(tracks)?;
        println!("Loaded {added} tracks");
        Ok(())
    }

    fn search(&mut self, args: &[String]) -> Result<()> {
        let query = catalog::parse_search_args(args)?;
        println!("Searching {query}");
        let items = self.catalog.search(&query)?;
        for (index, item) in items.iter().enumerate() {
            println!("{}", format::numbered_row(index, &item.to_string()));
        }
        self.results = items;
        Ok(())
    }

    fn history(&mut self, args: &[String]) -> Result<()> {
        let recent = self.session.history().recent();
        let Some(expr) = args.first() else {
            println!("History:");
            for (index, entry) in recent.iter().enumerate() {
                let row = format!("{} - {}", entry.username, entry.title);
                println!("{}", format::numbered_row(index, &row));
            }
            return Ok(());
        };
        if args.len() > 1 {
            return Err(Error::Parse("history takes at most one range".to_string()));
        }
        let indices = self.listing_range(expr, recent.len())?;
        let mut tracks = Vec::with_capacity(indices.len());
        for idx in indices {
            let entry = recent
                .get(idx)
                .ok_or_else(|| Error::not_found(format!("history index {idx}")))?;
            // Re-resolve through the catalog for a fresh stream URL.
            tracks.push(self.catalog.track_by_id(entry.id)?.into_track());
        }
        let added = self.session.enqueue(tracks)?;
        println!("Loaded {added} tracks");
        Ok(())
    }
}
