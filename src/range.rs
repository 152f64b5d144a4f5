//! Compact index-range expressions used by queue commands.
//!
//! Grammar: comma-separated tokens, each a single index or an inclusive pair
//! `a-b`. `.` stands for the current track's queue position and is only legal
//! when the calling command operates on queue positions. `*` stands for the
//! end of the queue and is only legal as the end of a pair.

use std::collections::BTreeSet;

use crate::error::{Error, Result};

/// Caller-provided context for resolving `.` and `*` endpoints.
pub struct RangeContext {
    /// Queue position of the current track, when one exists.
    pub current: Option<usize>,
    /// One past the last valid index (queue length).
    pub end: usize,
    /// Whether `.` self-reference is legal for the calling command.
    pub allow_current: bool,
}

fn resolve_endpoint(token: &str, ctx: &RangeContext) -> Result<usize> {
    if token == "." {
        if !ctx.allow_current {
            return Err(Error::Parse(
                "'.' is not supported for this command".to_string(),
            ));
        }
        return ctx
            .current
            .ok_or_else(|| Error::Parse("'.' used with no current track".to_string()));
    }
    token
        .parse::<usize>()
        .map_err(|_| Error::Parse(format!("invalid index '{token}'")))
}

/// Parses a range expression into a sorted, deduplicated index set.
///
/// Performs no bounds checking against the queue; out-of-range indices are
/// the caller's problem when resolving them to tracks.
pub fn parse(expr: &str, ctx: &RangeContext) -> Result<Vec<usize>> {
    if expr.trim().is_empty() {
        return Err(Error::Parse("empty range expression".to_string()));
    }

    let mut indices = BTreeSet::new();
    for token in expr.split(',') {
        let token = token.trim();
        match token.split_once('-') {
            Some((start, end)) => {
                let start = resolve_endpoint(start, ctx)?;
                if end == "*" {
                    // `a-*` runs to the end of the queue, empty when a is past it.
                    indices.extend(start..ctx.end);
                } else {
                    let end = resolve_endpoint(end, ctx)?;
                    if start > end {
                        return Err(Error::Parse(format!("inverted range '{token}'")));
                    }
                    indices.extend(start..=end);
                }
            }
            None => {
                if token == "*" {
                    return Err(Error::Parse(
                        "'*' is only valid as the end of a range".to_string(),
                    ));
                }
                indices.insert(resolve_endpoint(token, ctx)?);
            }
        }
    }
    Ok(indices.into_iter().collect())
}
