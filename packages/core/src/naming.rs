//! Deterministic ordering and naming of conversion outputs.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::ConversionResult;

#[derive(Debug, Clone, Copy)]
enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

/// Splits a string into alternating runs of ASCII digits and everything else.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .find(|c: char| c.is_ascii_digit() != digits)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(if digits {
            Chunk::Digits(head)
        } else {
            Chunk::Text(head)
        })
    }
}

fn cmp_chunk(a: Chunk<'_>, b: Chunk<'_>) -> Ordering {
    match (a, b) {
        (Chunk::Digits(x), Chunk::Digits(y)) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (Chunk::Text(x), Chunk::Text(y)) => x
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(y.chars().flat_map(char::to_lowercase)),
        (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Less,
        (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Greater,
    }
}

/// Numeric-aware, case-insensitive string ordering.
///
/// Digit runs compare by value, so `file2` sorts before `file10`. Strings
/// that are equal under that rule (`File01` vs `file1`) fall back to a plain
/// byte comparison, which keeps the order total.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks { rest: a };
    let mut right = Chunks { rest: b };
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match cmp_chunk(x, y) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
}

/// Sort results by their original path in natural order.
pub fn sort_results(results: &mut [ConversionResult]) {
    results.sort_by(|a, b| natural_cmp(&a.original, &b.original));
}

/// A path split into directory, file stem and extension.
struct PathParts<'a> {
    dir: Option<&'a str>,
    stem: &'a str,
    ext: Option<&'a str>,
}

impl<'a> PathParts<'a> {
    fn split(path: &'a str) -> Self {
        let (dir, file) = match path.rsplit_once('/') {
            Some((dir, file)) => (Some(dir), file),
            None => (None, path),
        };
        let (stem, ext) = match file.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file, None),
        };
        Self { dir, stem, ext }
    }

    /// Rebuild the path with `suffix` appended to the stem.
    fn with_stem_suffix(&self, suffix: &str) -> String {
        let name = match self.ext {
            Some(ext) => format!("{}{suffix}.{ext}", self.stem),
            None => format!("{}{suffix}", self.stem),
        };
        in_dir(self.dir, name)
    }
}

fn in_dir(dir: Option<&str>, name: String) -> String {
    match dir {
        Some(dir) => format!("{dir}/{name}"),
        None => name,
    }
}

/// Name of the artifact produced for `original` when converting to files
/// with `target_extension`.
///
/// The directory part is kept and the extension is swapped. When the source
/// already has the target extension, `_converted` is appended to the stem so
/// outputs never shadow their inputs.
pub fn output_name(original: &str, target_extension: &str) -> String {
    let parts = PathParts::split(original);
    let target = target_extension.trim_start_matches('.');
    let stem = parts.stem;

    let name = match parts.ext {
        _ if target.is_empty() => return parts.with_stem_suffix("_converted"),
        Some(ext) if ext.eq_ignore_ascii_case(target) => format!("{stem}_converted.{target}"),
        _ => format!("{stem}.{target}"),
    };
    in_dir(parts.dir, name)
}

/// Make the artifact names of successful results unique.
///
/// Results whose names collide (`load.sas` and `load.sql` both becoming
/// `load.py`) get the source extension added to the stem (`load_sas.py`,
/// `load_sql.py`). Anything still taken gets a numeric suffix. Expects
/// `results` in their final order, so renaming is deterministic.
pub fn disambiguate_names(results: &mut [ConversionResult]) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in results.iter().filter(|r| r.success).filter_map(|r| r.converted.as_ref()) {
        *counts.entry(name.clone()).or_default() += 1;
    }
    if counts.values().all(|&n| n == 1) {
        return;
    }

    let mut taken: HashSet<String> = HashSet::new();
    for result in results.iter_mut().filter(|r| r.success) {
        let Some(name) = result.converted.as_deref() else {
            continue;
        };

        let base = match PathParts::split(&result.original).ext {
            Some(source_ext) if counts.get(name).is_some_and(|&n| n > 1) => {
                PathParts::split(name).with_stem_suffix(&format!("_{source_ext}"))
            }
            _ => name.to_string(),
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = PathParts::split(&base).with_stem_suffix(&format!("_{n}"));
            n += 1;
        }

        if candidate != name {
            tracing::debug!("Renamed artifact {} to {} for {}", name, candidate, result.original);
        }
        taken.insert(candidate.clone());
        result.converted = Some(candidate);
    }
}
