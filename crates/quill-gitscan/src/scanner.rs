use std::path::Path;

use git2::{
    BranchType, Commit, Delta, DiffFormat, DiffOptions, ObjectType, Repository, Tree, TreeWalkMode,
    TreeWalkResult,
};
use quill_core::{ChangeKind, ChangeRecord, QuillError};
use tracing::debug;

/// Open the repository containing `start`, searching parent directories.
///
/// # Errors
///
/// Returns [`QuillError::Git`] if no repository encloses `start`.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use quill_gitscan::discover_repository;
///
/// let repo = discover_repository(Path::new(".")).unwrap();
/// println!("{:?}", repo.workdir());
/// ```
pub fn discover_repository(start: &Path) -> Result<Repository, QuillError> {
    Repository::discover(start).map_err(|e| {
        QuillError::Git(format!(
            "failed to discover repository from {}: {e}",
            start.display()
        ))
    })
}

/// Comparison between the trees of two resolved refs.
///
/// Holds the two snapshots for the duration of a run so that the change
/// list, patches, and head contents all come from the same pair of commits.
pub struct BranchDiff<'repo> {
    repo: &'repo Repository,
    base_tree: Tree<'repo>,
    head_tree: Tree<'repo>,
}

impl<'repo> BranchDiff<'repo> {
    /// Resolve `base_ref` and `head_ref` and load their trees.
    ///
    /// Each name is looked up as a local branch, then a remote-tracking
    /// branch, then as an arbitrary revision (`HEAD~2`, a SHA, a tag).
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::RefNotFound`] naming the first ref that does not
    /// resolve to a commit, or [`QuillError::Git`] if a tree cannot be read.
    pub fn new(repo: &'repo Repository, base_ref: &str, head_ref: &str) -> Result<Self, QuillError> {
        let base = resolve_commit(repo, base_ref)?;
        let head = resolve_commit(repo, head_ref)?;
        debug!(base = %base.id(), head = %head.id(), "resolved refs");

        let base_tree = base
            .tree()
            .map_err(|e| QuillError::Git(format!("failed to get tree of {base_ref}: {e}")))?;
        let head_tree = head
            .tree()
            .map_err(|e| QuillError::Git(format!("failed to get tree of {head_ref}: {e}")))?;

        Ok(Self {
            repo,
            base_tree,
            head_tree,
        })
    }

    /// Every changed path between the two trees, in diff order.
    ///
    /// Rename detection is off, so a moved file is reported as a deletion of
    /// the old path plus an addition of the new one.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Git`] if the diff cannot be computed.
    pub fn changes(&self) -> Result<Vec<ChangeRecord>, QuillError> {
        let mut diff_opts = DiffOptions::new();
        let diff = self
            .repo
            .diff_tree_to_tree(
                Some(&self.base_tree),
                Some(&self.head_tree),
                Some(&mut diff_opts),
            )
            .map_err(|e| QuillError::Git(format!("failed to compute diff: {e}")))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let new_path = delta.new_file().path().map(path_string);
            let old_path = delta.old_file().path().map(path_string);

            let (path, kind) = match delta.status() {
                Delta::Added => (new_path, ChangeKind::Added),
                Delta::Modified => (new_path, ChangeKind::Modified),
                Delta::Deleted => (old_path, ChangeKind::Deleted),
                Delta::Renamed => (
                    new_path,
                    ChangeKind::Renamed {
                        from: old_path.unwrap_or_default(),
                    },
                ),
                Delta::Copied => (new_path, ChangeKind::Copied),
                Delta::Typechange => (new_path, ChangeKind::TypeChanged),
                _ => (new_path.or(old_path), ChangeKind::Other),
            };

            let Some(path) = path.filter(|p| !p.is_empty()) else {
                continue;
            };
            changes.push(ChangeRecord { path, kind });
        }

        Ok(changes)
    }

    /// Unified patch of a single path between the two trees.
    ///
    /// Returns an empty string when the path did not change.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Git`] if the diff cannot be computed or printed.
    pub fn patch_for(&self, path: &str) -> Result<String, QuillError> {
        let mut diff_opts = DiffOptions::new();
        diff_opts.pathspec(path).disable_pathspec_match(true);

        let diff = self
            .repo
            .diff_tree_to_tree(
                Some(&self.base_tree),
                Some(&self.head_tree),
                Some(&mut diff_opts),
            )
            .map_err(|e| QuillError::Git(format!("failed to compute diff for {path}: {e}")))?;

        let mut patch = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                patch.push(line.origin());
            }
            patch.push_str(&String::from_utf8_lossy(line.content()));
            true
        })
        .map_err(|e| QuillError::Git(format!("failed to print patch for {path}: {e}")))?;

        Ok(patch)
    }

    /// Text of `path` in the head snapshot.
    ///
    /// Returns `Ok(None)` for binary or non-UTF-8 blobs and for entries that
    /// are not blobs at all, such as submodule commits.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::FileNotFound`] if the head tree has no such path,
    /// or [`QuillError::Git`] if the blob cannot be read.
    pub fn head_content(&self, path: &str) -> Result<Option<String>, QuillError> {
        let entry = self
            .head_tree
            .get_path(Path::new(path))
            .map_err(|_| QuillError::FileNotFound(path.into()))?;
        if entry.kind() != Some(ObjectType::Blob) {
            debug!(path, kind = ?entry.kind(), "not a blob");
            return Ok(None);
        }
        let blob = entry
            .to_object(self.repo)
            .and_then(|object| object.peel_to_blob())
            .map_err(|e| QuillError::Git(format!("failed to read blob for {path}: {e}")))?;

        if blob.is_binary() {
            return Ok(None);
        }
        Ok(String::from_utf8(blob.content().to_vec()).ok())
    }

    /// Every file path in the head snapshot, in tree order.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::Git`] if the tree cannot be walked.
    pub fn head_paths(&self) -> Result<Vec<String>, QuillError> {
        let mut paths = Vec::new();
        self.head_tree
            .walk(TreeWalkMode::PreOrder, |dir, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    if let Some(name) = entry.name() {
                        paths.push(format!("{dir}{name}"));
                    }
                }
                TreeWalkResult::Ok
            })
            .map_err(|e| QuillError::Git(format!("failed to walk head tree: {e}")))?;
        Ok(paths)
    }
}

/// List every changed path between `base_ref` and `head_ref`.
///
/// # Errors
///
/// Returns [`QuillError::RefNotFound`] if either ref does not resolve, or
/// [`QuillError::Git`] if the comparison fails.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use quill_gitscan::{discover_repository, eligible_changes, scan};
///
/// let repo = discover_repository(Path::new(".")).unwrap();
/// let changes = scan(&repo, "develop", "feature/x").unwrap();
/// for change in eligible_changes(changes) {
///     println!("{} ({})", change.path, change.kind);
/// }
/// ```
pub fn scan(
    repo: &Repository,
    base_ref: &str,
    head_ref: &str,
) -> Result<Vec<ChangeRecord>, QuillError> {
    BranchDiff::new(repo, base_ref, head_ref)?.changes()
}

/// Keep only the changes that may be dispatched: additions and modifications.
pub fn eligible_changes(changes: Vec<ChangeRecord>) -> Vec<ChangeRecord> {
    changes
        .into_iter()
        .filter(|change| change.kind.is_eligible())
        .collect()
}

fn resolve_commit<'repo>(repo: &'repo Repository, name: &str) -> Result<Commit<'repo>, QuillError> {
    let branch = repo
        .find_branch(name, BranchType::Local)
        .or_else(|_| repo.find_branch(name, BranchType::Remote));

    let commit = match branch {
        Ok(branch) => branch.get().peel_to_commit(),
        Err(_) => repo
            .revparse_single(name)
            .and_then(|object| object.peel_to_commit()),
    };

    commit.map_err(|_| QuillError::RefNotFound(name.to_string()))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Oid, Signature};
    use std::fs;

    fn commit(repo: &Repository, writes: &[(&str, &str)], removes: &[&str], message: &str) -> Oid {
        let root = repo.workdir().unwrap().to_path_buf();
        let mut index = repo.index().unwrap();
        for (path, content) in writes {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, content).unwrap();
            index.add_path(Path::new(path)).unwrap();
        }
        for path in removes {
            fs::remove_file(root.join(path)).unwrap();
            index.remove_path(Path::new(path)).unwrap();
        }
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Quill Test", "test@example.com").unwrap();
        let parents: Vec<Commit> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    fn branch_at(repo: &Repository, name: &str, oid: Oid) {
        let target = repo.find_commit(oid).unwrap();
        repo.branch(name, &target, false).unwrap();
    }

    /// `develop` holds B.cs and C.cs; `feature/x` adds A.cs, edits B.cs,
    /// deletes C.cs, and adds an image.
    fn fixture() -> (tempfile::TempDir, Repository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();

        let base = commit(
            &repo,
            &[
                ("src/B.cs", "public class B {\n    int x = 1;\n}\n"),
                (
                    "src/C.cs",
                    "internal static class C\n{\n    const string Name = \"legacy\";\n}\n",
                ),
            ],
            &[],
            "base",
        );
        branch_at(&repo, "develop", base);

        let head = commit(
            &repo,
            &[
                (
                    "src/A.cs",
                    "namespace App;\n\npublic class A\n{\n    public int Run() => 42;\n}\n",
                ),
                ("src/B.cs", "public class B {\n    int x = 2;\n}\n"),
            ],
            &["src/C.cs"],
            "feature work",
        );
        branch_at(&repo, "feature/x", head);

        let root = repo.workdir().unwrap().to_path_buf();
        fs::write(root.join("logo.png"), [0x89u8, b'P', b'N', b'G', 0, 0, 1, 2]).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("logo.png")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = Signature::now("Quill Test", "test@example.com").unwrap();
        let parent = repo.find_commit(head).unwrap();
        let with_image = repo
            .commit(Some("HEAD"), &sig, &sig, "logo", &tree, &[&parent])
            .unwrap();
        branch_at(&repo, "feature/img", with_image);

        drop(tree);
        drop(parent);
        (dir, repo)
    }

    #[test]
    fn scan_reports_every_change_kind() {
        let (_dir, repo) = fixture();
        let changes = scan(&repo, "develop", "feature/x").unwrap();

        let kind_of = |path: &str| {
            changes
                .iter()
                .find(|c| c.path == path)
                .map(|c| c.kind.clone())
        };
        assert_eq!(changes.len(), 3);
        assert_eq!(kind_of("src/A.cs"), Some(ChangeKind::Added));
        assert_eq!(kind_of("src/B.cs"), Some(ChangeKind::Modified));
        assert_eq!(kind_of("src/C.cs"), Some(ChangeKind::Deleted));
    }

    #[test]
    fn eligible_changes_drop_deletions() {
        let (_dir, repo) = fixture();
        let changes = eligible_changes(scan(&repo, "develop", "feature/x").unwrap());
        let mut paths: Vec<&str> = changes.iter().map(|c| c.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(paths, vec!["src/A.cs", "src/B.cs"]);
    }

    #[test]
    fn unknown_ref_is_reported_by_name() {
        let (_dir, repo) = fixture();
        let err = scan(&repo, "develop", "feature/missing").unwrap_err();
        assert!(matches!(err, QuillError::RefNotFound(ref name) if name == "feature/missing"));

        let err = scan(&repo, "nope", "feature/x").unwrap_err();
        assert!(matches!(err, QuillError::RefNotFound(ref name) if name == "nope"));
    }

    #[test]
    fn revisions_resolve_when_no_branch_matches() {
        let (_dir, repo) = fixture();
        let changes = scan(&repo, "feature/x~1", "feature/x").unwrap();
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn patch_contains_only_the_requested_path() {
        let (_dir, repo) = fixture();
        let diff = BranchDiff::new(&repo, "develop", "feature/x").unwrap();
        let patch = diff.patch_for("src/B.cs").unwrap();
        assert!(patch.contains("-    int x = 1;"));
        assert!(patch.contains("+    int x = 2;"));
        assert!(!patch.contains("A.cs"));
        assert!(diff.patch_for("src/unchanged.cs").unwrap().is_empty());
    }

    #[test]
    fn head_content_reads_the_head_snapshot() {
        let (_dir, repo) = fixture();
        let diff = BranchDiff::new(&repo, "develop", "feature/x").unwrap();
        assert_eq!(
            diff.head_content("src/B.cs").unwrap().as_deref(),
            Some("public class B {\n    int x = 2;\n}\n")
        );
        assert!(matches!(
            diff.head_content("src/C.cs"),
            Err(QuillError::FileNotFound(_))
        ));
    }

    #[test]
    fn binary_blobs_have_no_text() {
        let (_dir, repo) = fixture();
        let diff = BranchDiff::new(&repo, "feature/x", "feature/img").unwrap();
        let changes = diff.changes().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(diff.head_content("logo.png").unwrap(), None);
    }

    #[test]
    fn moved_file_is_a_deletion_plus_an_addition() {
        let (_dir, repo) = fixture();
        let body = "internal static class C\n{\n    const string Name = \"legacy\";\n}\n";
        let moved = commit(&repo, &[("src/Moved.cs", body)], &[], "move C");
        branch_at(&repo, "feature/move", moved);

        let changes = scan(&repo, "develop", "feature/move").unwrap();
        let kind_of = |path: &str| {
            changes
                .iter()
                .find(|c| c.path == path)
                .map(|c| c.kind.clone())
        };
        assert_eq!(kind_of("src/Moved.cs"), Some(ChangeKind::Added));
        assert_eq!(kind_of("src/C.cs"), Some(ChangeKind::Deleted));
        assert!(changes
            .iter()
            .all(|c| !matches!(c.kind, ChangeKind::Renamed { .. })));

        let eligible = eligible_changes(changes);
        assert!(eligible.iter().any(|c| c.path == "src/Moved.cs"));
    }

    #[test]
    fn submodule_entries_have_no_text() {
        let (_dir, repo) = fixture();
        let head = repo
            .find_branch("feature/x", BranchType::Local)
            .unwrap()
            .get()
            .peel_to_commit()
            .unwrap();
        let head_tree = head.tree().unwrap();
        let mut builder = repo.treebuilder(Some(&head_tree)).unwrap();
        // Any id works for a gitlink; the commit lives in another repository
        builder.insert("vendor_lib", head.id(), 0o160000).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = Signature::now("Quill Test", "test@example.com").unwrap();
        let bumped = repo
            .commit(None, &sig, &sig, "add submodule", &tree, &[&head])
            .unwrap();
        branch_at(&repo, "feature/submodule", bumped);

        let diff = BranchDiff::new(&repo, "feature/x", "feature/submodule").unwrap();
        let changes = diff.changes().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].path, "vendor_lib");
        assert_eq!(diff.head_content("vendor_lib").unwrap(), None);
        assert!(!diff.head_paths().unwrap().contains(&"vendor_lib".to_string()));
    }

    #[test]
    fn head_paths_list_the_head_snapshot() {
        let (_dir, repo) = fixture();
        let diff = BranchDiff::new(&repo, "develop", "feature/x").unwrap();
        let mut paths = diff.head_paths().unwrap();
        paths.sort_unstable();
        assert_eq!(paths, vec!["src/A.cs", "src/B.cs"]);
    }
}
