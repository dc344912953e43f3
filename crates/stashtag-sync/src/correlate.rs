//! Correlation stages: each step from a root path to catalog lookup keys is its own function.

use std::path::{Path, PathBuf};

use stashtag_adapters::{ContentClassifier, LookupError, MetadataSource};
use stashtag_core::{Fingerprint, MediaKind, PostRecord};
use stashtag_io::fingerprint_file;
use thiserror::Error;
use tracing::{debug, warn};

/// A local file and every post that shares its content hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub posts: Vec<PostRecord>,
}

#[derive(Debug, Error)]
pub enum FileError {
    #[error("fingerprinting {}: {source}", path.display())]
    Fingerprint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("metadata lookup for {}: {source}", path.display())]
    Lookup {
        path: PathBuf,
        #[source]
        source: LookupError,
    },
}

/// The file itself, or the regular files directly inside a directory, sorted by path.
/// Subdirectories are not descended into.
pub fn enumerate_candidates(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(vec![root.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub async fn lookup_file(
    source: &dyn MetadataSource,
    path: &Path,
) -> Result<Correlation, FileError> {
    let fingerprint = fingerprint_file(path).await.map_err(|source| FileError::Fingerprint {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), %fingerprint, "fingerprint computed");

    let posts = source
        .lookup_by_fingerprint(&fingerprint)
        .await
        .map_err(|source| FileError::Lookup {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Correlation {
        path: path.to_path_buf(),
        fingerprint,
        posts,
    })
}

/// Classification failures count as "not a video".
pub fn is_video(classifier: &dyn ContentClassifier, path: &Path) -> bool {
    match classifier.classify(path) {
        Ok(kind) => kind == MediaKind::Video,
        Err(err) => {
            warn!(path = %path.display(), %err, "could not determine media type");
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Ambiguity {
    Unique(PostRecord),
    NoMatch,
    Ambiguous(usize),
}

/// Only a single matching post is usable; there is no tie-breaking between several.
pub fn resolve_ambiguity(mut posts: Vec<PostRecord>) -> Ambiguity {
    match posts.len() {
        0 => Ambiguity::NoMatch,
        1 => Ambiguity::Unique(posts.remove(0)),
        n => Ambiguity::Ambiguous(n),
    }
}

/// Catalog lookup key for a local path: relative to `base` when given, always `/`-separated.
pub fn normalize_catalog_path(path: &Path, base: Option<&Path>) -> String {
    let relative = match base {
        Some(base) => pathdiff::diff_paths(path, base).unwrap_or_else(|| {
            warn!(
                path = %path.display(),
                base = %base.display(),
                "cannot relativize path; using it as is"
            );
            path.to_path_buf()
        }),
        None => path.to_path_buf(),
    };
    relative.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use stashtag_adapters::MimeClassifier;
    use tempfile::tempdir;

    fn post(id: &str) -> PostRecord {
        PostRecord {
            source_file_id: 1,
            external_id: id.into(),
            user: "u".into(),
            service: "s".into(),
            title: "t".into(),
            published_at: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn directory_scan_is_one_level_and_sorted() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("b.mp4"), b"b").unwrap();
        std::fs::write(dir.path().join("a.mp4"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/c.mp4"), b"c").unwrap();

        let files = enumerate_candidates(dir.path()).unwrap();
        assert_eq!(files, vec![dir.path().join("a.mp4"), dir.path().join("b.mp4")]);
    }

    #[test]
    fn single_file_root_is_its_own_candidate() {
        let dir = tempdir().expect("tempdir");
        let file = dir.path().join("only.mkv");
        std::fs::write(&file, b"x").unwrap();
        assert_eq!(enumerate_candidates(&file).unwrap(), vec![file]);
    }

    #[test]
    fn ambiguity_keeps_exactly_one_post() {
        assert_eq!(resolve_ambiguity(vec![]), Ambiguity::NoMatch);
        assert_eq!(resolve_ambiguity(vec![post("1")]), Ambiguity::Unique(post("1")));
        assert_eq!(resolve_ambiguity(vec![post("1"), post("2")]), Ambiguity::Ambiguous(2));
    }

    #[test]
    fn paths_are_relativized_and_slash_separated() {
        assert_eq!(
            normalize_catalog_path(
                Path::new("/data/media/clips/x.mp4"),
                Some(Path::new("/data/media")),
            ),
            "clips/x.mp4"
        );
        assert_eq!(
            normalize_catalog_path(Path::new("/data/media/clips/x.mp4"), None),
            "/data/media/clips/x.mp4"
        );
        assert_eq!(normalize_catalog_path(Path::new(r"clips\sub\x.mp4"), None), "clips/sub/x.mp4");
    }

    #[test]
    fn paths_outside_base_walk_up() {
        assert_eq!(
            normalize_catalog_path(Path::new("/data/other/x.mp4"), Some(Path::new("/data/media"))),
            "../other/x.mp4"
        );
    }

    #[test]
    fn unclassifiable_files_are_not_videos() {
        assert!(is_video(&MimeClassifier, Path::new("a.mp4")));
        assert!(!is_video(&MimeClassifier, Path::new("a.png")));
        assert!(!is_video(&MimeClassifier, Path::new("no_extension")));
    }
}
