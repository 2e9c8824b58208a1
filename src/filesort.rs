//! Candidate Discovery and Ordering
//!
//! Lists a feed's source directory, keeps names matching the configured
//! glob, and orders them per the feed's sort policy.

use std::fs;
use std::io;
use std::path::Path;

use globset::GlobMatcher;
use tracing::warn;

use crate::config::SortKey;

/// Regular files in `source_dir` whose names match the glob.
///
/// Names that are not valid UTF-8 are skipped with a warning; the rest of
/// the pipeline works on string filenames.
pub fn discover(source_dir: &Path, glob: &GlobMatcher) -> io::Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(source_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            warn!(name = ?name, "skipping non-utf8 filename");
            continue;
        };
        if glob.is_match(name) {
            files.push(name.to_string());
        }
    }
    Ok(files)
}

/// Order candidate files per the feed's sort policy. Stable.
pub fn sort_files(files: &mut [String], key: &SortKey) {
    match key {
        SortKey::None => {}
        SortKey::Name => files.sort(),
        SortKey::Field(field) => {
            files.sort_by_key(|f| field_value(f, field).unwrap_or_default());
        }
    }
}

/// Extract the value of a `key-value` token from a filename.
///
/// The base name (last extension stripped) is split on `_`; each token is
/// split on `-` into a (key, value) pair; the first pair with a matching
/// key yields the sort value. Files without the key sort first, together.
fn field_value(name: &str, key: &str) -> Option<String> {
    let base = match name.rsplit_once('.') {
        Some((base, _ext)) => base,
        None => name,
    };
    base.split('_')
        .filter_map(|token| token.split_once('-'))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.to_string())
}
