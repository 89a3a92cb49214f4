use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Canonical identity of a project directory.
///
/// Two directories that denote the same filesystem location resolve to the same
/// `key`, whether they were given relative or absolute, through symlinks or
/// with `..` segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectPath {
    path: PathBuf,
    key: String,
}

impl ProjectPath {
    /// Resolves `dir` against the current working directory. An empty `dir`
    /// means the working directory itself. Never fails: when the filesystem
    /// cannot canonicalize the path a lexically cleaned absolute form is used.
    pub fn resolve(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let cwd = std::env::current_dir().ok();

        let absolute = if dir.as_os_str().is_empty() {
            cwd.unwrap_or_else(|| PathBuf::from("."))
        } else if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            match cwd {
                Some(cwd) => cwd.join(dir),
                None => dir.to_path_buf(),
            }
        };

        let path = match std::fs::canonicalize(&absolute) {
            Ok(path) => path,
            Err(_) => lexical_clean(&absolute),
        };
        let key = key_for(&path);
        Self { path, key }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Last path component, used as a display name when nothing better is known.
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.key.clone())
    }
}

impl fmt::Display for ProjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

fn key_for(path: &Path) -> String {
    let key = path.to_string_lossy().into_owned();
    if cfg!(windows) {
        key.to_lowercase()
    } else {
        key
    }
}

fn lexical_clean(path: &Path) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !cleaned.pop() {
                    cleaned.push(component.as_os_str());
                }
            }
            other => cleaned.push(other.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_resolves_to_working_directory() {
        let project = ProjectPath::resolve("");
        assert!(!project.path().as_os_str().is_empty());
        assert!(!project.key().is_empty());
        assert!(project.path().is_absolute());
    }

    #[test]
    fn resolution_is_stable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = ProjectPath::resolve(dir.path());
        let second = ProjectPath::resolve(dir.path());
        assert_eq!(first, second);
        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn relative_alias_matches_absolute() {
        let cwd = std::env::current_dir().expect("cwd");
        let dir = tempfile::tempdir_in(&cwd).expect("tempdir in cwd");
        let relative = dir
            .path()
            .strip_prefix(&cwd)
            .expect("tempdir under cwd")
            .to_path_buf();
        assert!(relative.is_relative());
        assert_eq!(
            ProjectPath::resolve(&relative).key(),
            ProjectPath::resolve(dir.path()).key()
        );
    }

    #[test]
    fn parent_segments_are_collapsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("api")).expect("mkdir");
        let roundabout = dir.path().join("api").join("..");
        assert_eq!(
            ProjectPath::resolve(roundabout).key(),
            ProjectPath::resolve(dir.path()).key()
        );
    }

    #[test]
    fn missing_directory_falls_back_to_clean_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("gone").join(".").join("web");
        let project = ProjectPath::resolve(&missing);
        assert!(project.path().is_absolute());
        assert!(project.key().ends_with("web"));
        assert!(!project.key().contains("/./"));
    }

    #[test]
    fn distinct_directories_have_distinct_keys() {
        let a = tempfile::tempdir().expect("tempdir");
        let b = tempfile::tempdir().expect("tempdir");
        assert_ne!(
            ProjectPath::resolve(a.path()).key(),
            ProjectPath::resolve(b.path()).key()
        );
    }

    #[test]
    fn lexical_clean_pops_parents() {
        assert_eq!(
            lexical_clean(Path::new("/srv/app/./web/../api")),
            PathBuf::from("/srv/app/api")
        );
    }
}
