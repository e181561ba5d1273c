//! File discovery over a BIDS dataset tree.

use std::fs;
use std::path::{Path, PathBuf};

/// Query interface over a BIDS dataset.
///
/// Labels are bare entity values (`01`, not `sub-01`); `extension` carries
/// its leading dot (`.nii.gz`). Implementations return matches in a stable
/// order; callers take the first match.
pub trait DatasetQuery {
    fn find(
        &self,
        subject: &str,
        session: Option<&str>,
        suffix: &str,
        extension: &str,
    ) -> Vec<PathBuf>;
}

/// Filesystem-walking [`DatasetQuery`] over `<root>/sub-*/[ses-*/]anat/`.
#[derive(Debug, Clone)]
pub struct BidsLayout {
    root: PathBuf,
}

impl BidsLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BidsLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan_anat(&self, dir: &Path, subject: &str, suffix: &str, extension: &str) -> Vec<PathBuf> {
        let mut matches = Vec::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(_) => return matches,
        };
        let tail = format!("_{suffix}{extension}");
        let head = format!("sub-{subject}");
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if name.starts_with(&head) && name.ends_with(&tail) {
                matches.push(path);
            }
        }
        matches.sort();
        matches
    }
}

impl DatasetQuery for BidsLayout {
    fn find(
        &self,
        subject: &str,
        session: Option<&str>,
        suffix: &str,
        extension: &str,
    ) -> Vec<PathBuf> {
        let mut dir = self.root.join(format!("sub-{subject}"));
        if let Some(ses) = session {
            dir.push(format!("ses-{ses}"));
        }
        dir.push("anat");
        self.scan_anat(&dir, subject, suffix, extension)
    }
}
