//! Input validation: make sure the source is a readable PDF before any work.

use crate::config::SplitConfig;
use crate::error::SplitError;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` exists, is readable, and starts with `%PDF`.
pub fn resolve_local(path: &Path) -> Result<PathBuf, SplitError> {
    if !path.exists() {
        return Err(SplitError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(SplitError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(SplitError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(SplitError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path.to_path_buf())
}

/// Refuse an intermediate PDF path that would overwrite the source or a shard.
///
/// The intermediate file is deleted at the end of every run, and shards are
/// written while it is still open for reading.
pub fn ensure_distinct(source: &Path, config: &SplitConfig) -> Result<(), SplitError> {
    let intermediate = &config.intermediate_path;
    if same_path(source, intermediate) {
        return Err(SplitError::InvalidConfig(format!(
            "Intermediate PDF path '{}' is the input file; choose another --temp-pdf",
            intermediate.display()
        )));
    }
    if collides_with_shards(intermediate, config) {
        return Err(SplitError::InvalidConfig(format!(
            "Intermediate PDF path '{}' would be overwritten by a shard in '{}'; choose another --temp-pdf",
            intermediate.display(),
            config.output_dir.display()
        )));
    }
    Ok(())
}

/// True when `path` is named like a shard (`{prefix}_{n}.pdf`) and sits in
/// the output directory.
pub fn collides_with_shards(path: &Path, config: &SplitConfig) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let shard_like = name
        .strip_prefix(config.shard_prefix.as_str())
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(".pdf"))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
    if !shard_like {
        return false;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    same_path(parent, &config.output_dir)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        // One side does not exist yet: compare lexically.
        _ => match (std::path::absolute(a), std::path::absolute(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        },
    }
}
