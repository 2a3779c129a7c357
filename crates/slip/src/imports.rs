//! Path resolution for imports and kernels, and the import-progress tracker.
//!
//! Both the checker and the interpreter resolve the same way: an absolute
//! path that exists wins, then each configured include root in order, then
//! the working directory. The first hit is used as-is; callers canonicalize
//! before tracking.

use std::path::{Path, PathBuf};

use ahash::AHashSet;

use crate::kernel::MANIFEST_FILE;

/// Resolves a source file reference against the include roots.
#[must_use]
pub(crate) fn resolve_file(
    file_path: &str,
    include_paths: &[PathBuf],
    working_dir: &Path,
) -> Option<PathBuf> {
    let candidate = Path::new(file_path);
    if candidate.is_absolute() {
        if candidate.exists() {
            return Some(candidate.to_path_buf());
        }
        return None;
    }

    for include_path in include_paths {
        let full = include_path.join(candidate);
        if full.exists() {
            return Some(full);
        }
    }

    let working = working_dir.join(candidate);
    if working.exists() {
        return Some(working);
    }

    None
}

/// Resolves a kernel name to the directory holding its manifest.
#[must_use]
pub(crate) fn resolve_kernel_dir(
    kernel_name: &str,
    include_paths: &[PathBuf],
    working_dir: &Path,
) -> Option<PathBuf> {
    let candidate = Path::new(kernel_name);
    if candidate.is_absolute() {
        if candidate.exists() {
            return Some(candidate.to_path_buf());
        }
        return None;
    }

    for include_path in include_paths {
        let kernel_path = include_path.join(candidate);
        if kernel_path.join(MANIFEST_FILE).exists() {
            return Some(kernel_path);
        }
    }

    let working_kernel = working_dir.join(candidate);
    if working_kernel.join(MANIFEST_FILE).exists() {
        return Some(working_kernel);
    }

    None
}

/// Tracks which files have been imported, which imports are in flight (for
/// cycle detection), and the active chain (for cycle diagnostics).
#[derive(Debug, Default)]
pub(crate) struct ImportTracker {
    pub imported: AHashSet<PathBuf>,
    pub in_progress: AHashSet<PathBuf>,
    pub stack: Vec<PathBuf>,
}

impl ImportTracker {
    /// Renders the `a imports b imports c (cycle detected)` diagnostic.
    pub fn cycle_message(&self, repeated: &Path) -> String {
        let mut message = String::from("circular import detected:\n");
        for file in &self.stack {
            message.push_str(&format!("  {} imports\n", file.display()));
        }
        message.push_str(&format!("  {} (cycle detected)", repeated.display()));
        message
    }
}
