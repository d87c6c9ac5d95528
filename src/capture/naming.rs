// src/capture/naming.rs

//! Collision-free log file naming.
//!
//! A *stem* is the part shared by a `.out` / `.err` pair. The search is a
//! point-in-time check against the directory, not an atomic reservation:
//! another writer can still grab the same name afterwards.

use std::path::Path;

use tracing::{debug, warn};

use crate::fs::FileSystem;

/// Counter bound for the `<prefix>-N` search.
pub const MAX_UNIQUE_FILENAME: u64 = 100_000;

/// True if no file `<dir>/<stem>.<ext>` exists for any of `extensions`.
pub fn can_use_stem(fs: &dyn FileSystem, dir: &Path, stem: &str, extensions: &[&str]) -> bool {
    extensions
        .iter()
        .all(|ext| !fs.exists(&dir.join(format!("{stem}.{ext}"))))
}

/// First unused stem among `prefix`, `prefix-1`, `prefix-2`, ...
///
/// Given `foo.out`, `foo-1.err`, `foo-2.out`, `foo-2.err`, `foo-3.out`, the
/// result for `foo` with `["out", "err"]` is `foo-4`. If every candidate up
/// to [`MAX_UNIQUE_FILENAME`] is taken, `prefix` itself is returned and the
/// caller will overwrite an existing file.
pub fn find_next_stem(fs: &dyn FileSystem, dir: &Path, prefix: &str, extensions: &[&str]) -> String {
    find_next_stem_bounded(fs, dir, prefix, extensions, MAX_UNIQUE_FILENAME)
}

pub(crate) fn find_next_stem_bounded(
    fs: &dyn FileSystem,
    dir: &Path,
    prefix: &str,
    extensions: &[&str],
    bound: u64,
) -> String {
    if can_use_stem(fs, dir, prefix, extensions) {
        return prefix.to_string();
    }

    for counter in 1..bound {
        let candidate = format!("{prefix}-{counter}");
        if can_use_stem(fs, dir, &candidate, extensions) {
            debug!(stem = %candidate, "picked log file stem");
            return candidate;
        }
    }

    warn!(
        dir = ?dir,
        prefix,
        bound,
        "no unused log file name found; reusing prefix"
    );
    prefix.to_string()
}
