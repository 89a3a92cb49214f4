use crate::project::ProjectPath;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Types that can be built for a project on first use.
pub trait FromProject {
    fn from_project(project: ProjectPath) -> Self;
}

/// Keyed-singleton factory: at most one `T` per canonical project path.
///
/// Lookup and construction run inside one critical section, so concurrent
/// callers for the same project always observe the same instance.
pub struct Registry<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the instance for `dir`, building it with `build` if absent.
    /// `build` runs under the registry lock and must not touch this registry.
    pub fn get_or_create_with<F>(&self, dir: impl AsRef<Path>, build: F) -> Arc<T>
    where
        F: FnOnce(ProjectPath) -> T,
    {
        let project = ProjectPath::resolve(dir);
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(project.key()) {
            return existing.clone();
        }
        let key = project.key().to_string();
        let created = Arc::new(build(project));
        entries.insert(key, created.clone());
        created
    }

    pub fn get(&self, dir: impl AsRef<Path>) -> Option<Arc<T>> {
        let project = ProjectPath::resolve(dir);
        self.entries.lock().get(project.key()).cloned()
    }

    pub fn contains(&self, dir: impl AsRef<Path>) -> bool {
        self.get(dir).is_some()
    }

    pub fn remove(&self, dir: impl AsRef<Path>) -> Option<Arc<T>> {
        let project = ProjectPath::resolve(dir);
        self.entries.lock().remove(project.key())
    }

    /// Removes the entry under `key` only if it is `instance`. An instance
    /// that was already replaced cannot evict its successor.
    pub fn remove_instance(&self, key: &str, instance: &Arc<T>) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(current) if Arc::ptr_eq(current, instance) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: FromProject> Registry<T> {
    pub fn get_or_create(&self, dir: impl AsRef<Path>) -> Arc<T> {
        self.get_or_create_with(dir, T::from_project)
    }
}
