use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable naming the MicroPython checkout when no root is given.
pub const ROOT_ENV: &str = "MICROPY_DIR";

const MARKER_DIRS: [&str; 2] = ["ports", "mpy-cross"];

pub fn is_root(dir: &Path) -> bool {
    MARKER_DIRS.iter().all(|m| dir.join(m).is_dir())
}

/// Check that `path` is a MicroPython source tree and return it absolute.
pub fn validate_root(path: &Path) -> Result<PathBuf> {
    let abs = absolute(path)?;
    if !is_root(&abs) {
        return Err(Error::InvalidRoot { path: abs });
    }
    Ok(abs)
}

// Start point priority:
// - explicit `--root`
// - `MICROPY_DIR`
// - current directory
// From there walk upwards until the marker directories are found.
pub fn find_root(explicit: Option<&Path>) -> Result<PathBuf> {
    let start = match explicit {
        Some(p) => p.to_path_buf(),
        None => match std::env::var_os(ROOT_ENV) {
            Some(v) if !v.is_empty() => PathBuf::from(v),
            _ => PathBuf::from("."),
        },
    };
    let start = absolute(&start)?;

    let mut cur = Some(start.as_path());
    while let Some(dir) = cur {
        if is_root(dir) {
            tracing::debug!(root = %dir.display(), "found MicroPython root");
            return Ok(dir.to_path_buf());
        }
        cur = dir.parent();
    }
    Err(Error::InvalidRoot { path: start })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        let cwd = std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))?;
        cwd.join(path)
    };
    Ok(path_clean(&joined))
}

/// Resolve `rel` against `base` without touching the filesystem.
/// `..` segments are folded, so `boards/A/../B/deploy.md` becomes `boards/B/deploy.md`.
pub fn resolve_relative(base: &Path, rel: &str) -> PathBuf {
    let rel = rel.trim();
    let pb = Path::new(rel);
    if pb.is_absolute() {
        return path_clean(pb);
    }
    path_clean(&base.join(pb))
}

fn path_clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in path.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
