// service.rs — DiffService: one patch file per executed plan.
//
// Input is the list of (path, before, after) texts the executor produced, in
// execution order. A created file has an empty `before`. Changed-line counts
// come from the line diff itself (inserted plus deleted lines), so file
// headers and hunk markers are never counted.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

use anzen_audit::hasher::hash_str;

use crate::error::DiffError;

/// One file's content before and after a write op.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteItem {
    pub rel_path: String,
    pub before: String,
    pub after: String,
}

/// Per-file facts recorded in the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub rel_path: String,
    pub before_sha256: String,
    pub after_sha256: String,
    pub changed_lines: usize,
}

/// The patch written for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffArtifact {
    pub path: PathBuf,
    pub files: Vec<FileDiff>,
}

impl DiffArtifact {
    pub fn total_changed_lines(&self) -> usize {
        self.files.iter().map(|f| f.changed_lines).sum()
    }
}

pub struct DiffService {
    diff_dir: PathBuf,
}

impl DiffService {
    pub fn new(diff_dir: impl Into<PathBuf>) -> Self {
        Self {
            diff_dir: diff_dir.into(),
        }
    }

    pub fn diff_dir(&self) -> &Path {
        &self.diff_dir
    }

    pub fn patch_path_for(&self, plan_id: &str) -> Result<PathBuf, DiffError> {
        let ok = !plan_id.is_empty()
            && plan_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !ok {
            return Err(DiffError::InvalidPlanId(plan_id.to_string()));
        }
        Ok(self.diff_dir.join(format!("{}.patch", plan_id)))
    }

    /// Render every item into one patch document and persist it.
    pub fn write_patch(&self, plan_id: &str, items: &[WriteItem]) -> Result<DiffArtifact, DiffError> {
        let path = self.patch_path_for(plan_id)?;
        let (document, files) = render(items);

        std::fs::create_dir_all(&self.diff_dir).map_err(|source| DiffError::Io {
            path: self.diff_dir.clone(),
            source,
        })?;
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(DiffError::AlreadyExists(path));
            }
            Err(source) => return Err(DiffError::Io { path, source }),
        };
        file.write_all(document.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|source| DiffError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::info!(plan_id = %plan_id, files = files.len(), path = %path.display(), "diff artifact written");
        Ok(DiffArtifact { path, files })
    }
}

/// Pure part of `write_patch`: the patch text and per-file facts.
pub fn render(items: &[WriteItem]) -> (String, Vec<FileDiff>) {
    let mut document = String::new();
    let mut files = Vec::with_capacity(items.len());

    for item in items {
        let diff = TextDiff::from_lines(item.before.as_str(), item.after.as_str());
        let changed_lines = diff
            .iter_all_changes()
            .filter(|change| change.tag() != ChangeTag::Equal)
            .count();

        let header_before = format!("a/{}", item.rel_path);
        let header_after = format!("b/{}", item.rel_path);
        let patch = diff
            .unified_diff()
            .context_radius(3)
            .header(&header_before, &header_after)
            .to_string();
        document.push_str(&patch);
        if !patch.is_empty() && !patch.ends_with('\n') {
            document.push('\n');
        }

        files.push(FileDiff {
            rel_path: item.rel_path.clone(),
            before_sha256: hash_str(&item.before),
            after_sha256: hash_str(&item.after),
            changed_lines,
        });
    }
    (document, files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PLAN: &str = "pln_20260101000000abcdef";

    fn item(path: &str, before: &str, after: &str) -> WriteItem {
        WriteItem {
            rel_path: path.into(),
            before: before.into(),
            after: after.into(),
        }
    }

    #[test]
    fn counts_only_changed_lines() {
        let (doc, files) = render(&[item("docs/a.md", "one\ntwo\nthree\n", "one\nTWO\nthree\nfour\n")]);
        // two replaced (1 delete + 1 insert) plus one added line.
        assert_eq!(files[0].changed_lines, 3);
        assert!(doc.contains("--- a/docs/a.md"));
        assert!(doc.contains("+++ b/docs/a.md"));
        assert!(doc.contains("-two"));
        assert!(doc.contains("+TWO"));
        assert!(doc.contains("+four"));
    }

    #[test]
    fn created_file_diffs_from_empty() {
        let (_, files) = render(&[item("docs/new.md", "", "a\nb\n")]);
        assert_eq!(files[0].changed_lines, 2);
        assert_eq!(files[0].before_sha256, hash_str(""));
        assert_eq!(files[0].after_sha256, hash_str("a\nb\n"));
    }

    #[test]
    fn writes_one_patch_per_plan() {
        let dir = tempdir().unwrap();
        let service = DiffService::new(dir.path().join("diff"));
        let artifact = service
            .write_patch(PLAN, &[item("docs/a.md", "x\n", "y\n"), item("docs/b.md", "", "z\n")])
            .unwrap();

        assert_eq!(artifact.path, dir.path().join("diff").join(format!("{}.patch", PLAN)));
        assert_eq!(artifact.files.len(), 2);
        assert_eq!(artifact.total_changed_lines(), 3);

        let text = std::fs::read_to_string(&artifact.path).unwrap();
        let a = text.find("a/docs/a.md").unwrap();
        let b = text.find("a/docs/b.md").unwrap();
        assert!(a < b, "files appear in execution order");
    }

    #[test]
    fn artifacts_are_write_once() {
        let dir = tempdir().unwrap();
        let service = DiffService::new(dir.path());
        service.write_patch(PLAN, &[item("docs/a.md", "", "x\n")]).unwrap();
        let err = service.write_patch(PLAN, &[item("docs/a.md", "", "y\n")]).unwrap_err();
        assert!(matches!(err, DiffError::AlreadyExists(_)));
    }

    #[test]
    fn rejects_path_like_plan_ids() {
        let dir = tempdir().unwrap();
        let service = DiffService::new(dir.path());
        assert!(matches!(service.patch_path_for("../x"), Err(DiffError::InvalidPlanId(_))));
    }
}
