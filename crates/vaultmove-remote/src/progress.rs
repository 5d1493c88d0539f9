//! Parsing of the transfer tool's one-line status output.

use vaultmove_core::ProgressEvent;

/// Token that marks a status line.
const TRANSFER_MARKER: &str = "Transferred:";

/// Token preceding the remaining-time estimate.
const ETA_MARKER: &str = "ETA";

/// Turns status lines into [`ProgressEvent`]s.
///
/// Parsing is total: any input yields either an event or `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProgressParser;

impl ProgressParser {
    /// Parse one line of output.
    ///
    /// Returns `None` for blank lines and for status lines whose percentage
    /// is not a number. Other lines come back as [`ProgressEvent::RawLine`].
    pub fn parse(line: &str) -> Option<ProgressEvent> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line.contains(TRANSFER_MARKER) && line.contains('%') {
            let percent = parse_percent(line)?;
            return Some(ProgressEvent::percent(
                percent,
                parse_speed(line).unwrap_or_default(),
                parse_eta(line).unwrap_or_default(),
            ));
        }

        Some(ProgressEvent::raw(line))
    }
}

/// The integer immediately before the first `%`, clamped to 0..=100.
///
/// A fractional value is malformed.
fn parse_percent(line: &str) -> Option<u8> {
    let (before, _) = line.split_once('%')?;
    let digits_start = before.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    let prefix = &before[..digits_start];
    if digits_start == before.len() || prefix.ends_with('.') {
        return None;
    }

    let start = if prefix.ends_with('-') {
        digits_start - 1
    } else {
        digits_start
    };
    let value: i64 = before[start..].parse().ok()?;
    Some(value.clamp(0, 100) as u8)
}

/// The first comma-separated segment that ends in a rate unit.
fn parse_speed(line: &str) -> Option<String> {
    line.split(',')
        .map(str::trim)
        .find(|segment| segment.ends_with("/s") && segment.len() > 2)
        .map(str::to_string)
}

/// Text following the ETA marker up to the next space or comma.
fn parse_eta(line: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(offset) = line[search_from..].find(ETA_MARKER) {
        let start = search_from + offset;
        let end = start + ETA_MARKER.len();
        search_from = end;

        let preceded_ok = line[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let followed_ok = line[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        if !(preceded_ok && followed_ok) {
            continue;
        }

        let value: String = line[end..]
            .trim_start_matches([' ', ':'])
            .chars()
            .take_while(|c| !c.is_whitespace() && *c != ',')
            .collect();
        return (!value.is_empty()).then_some(value);
    }
    None
}
