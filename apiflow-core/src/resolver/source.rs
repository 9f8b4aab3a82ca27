use std::collections::HashMap;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::Mutex;

/// Where component documents come from.
pub trait ComponentSource: Send + Sync {
    fn is_file(&self, path: &Path) -> bool;

    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// Stable identity of `path`, used for cycle tracking and caching.
    fn canonicalize(&self, path: &Path) -> PathBuf;
}

/// Reads components from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl ComponentSource for FsSource {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| normalize_lexically(path))
    }
}

/// In-memory documents keyed by normalized path; counts reads per path.
#[derive(Debug, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, String>,
    reads: Mutex<HashMap<PathBuf, usize>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, contents: impl Into<String>) {
        self.files
            .insert(normalize_lexically(path.as_ref()), contents.into());
    }

    /// How many times `path` has been read.
    pub fn reads(&self, path: impl AsRef<Path>) -> usize {
        let key = normalize_lexically(path.as_ref());
        self.reads
            .lock()
            .map(|r| r.get(&key).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

impl ComponentSource for MemorySource {
    fn is_file(&self, path: &Path) -> bool {
        self.files.contains_key(&normalize_lexically(path))
    }

    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        let key = normalize_lexically(path);
        if let Ok(mut reads) = self.reads.lock() {
            *reads.entry(key.clone()).or_default() += 1;
        }
        self.files.get(&key).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        normalize_lexically(path)
    }
}

/// Resolves `.` and `..` without touching the filesystem.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            PathComponent::CurDir => {}
            PathComponent::ParentDir => match out.components().next_back() {
                Some(PathComponent::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root.
                Some(PathComponent::RootDir | PathComponent::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_normalization() {
        assert_eq!(
            normalize_lexically(Path::new("./components/../steps/./login.yml")),
            PathBuf::from("steps/login.yml")
        );
    }

    #[test]
    fn leading_parent_segments_are_kept() {
        assert_eq!(
            normalize_lexically(Path::new("../../shared/x.yml")),
            PathBuf::from("../../shared/x.yml")
        );
        assert_eq!(normalize_lexically(Path::new("a/../../b")), PathBuf::from("../b"));
        assert_eq!(
            normalize_lexically(Path::new("suite/../../shared/./x.yml")),
            PathBuf::from("../shared/x.yml")
        );
        assert_eq!(normalize_lexically(Path::new("/../etc")), PathBuf::from("/etc"));
    }

    #[test]
    fn memory_source_counts_reads() {
        let src = MemorySource::new().with_file("a/b.yml", "name: b");
        assert!(src.is_file(Path::new("./a/b.yml")));
        src.read_to_string(Path::new("a/b.yml")).unwrap();
        src.read_to_string(Path::new("a/./b.yml")).unwrap();
        assert_eq!(src.reads("a/b.yml"), 2);
    }
}
