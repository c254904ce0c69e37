use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Ordered list of scripts queued for batch runs, with an optional marked subset.
///
/// When anything is marked only the marked scripts run; otherwise the whole list does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptList {
    #[serde(default)]
    items: Vec<PathBuf>,
    #[serde(default)]
    marked: BTreeSet<PathBuf>,
}

impl ScriptList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `path` unless it is already listed.
    pub fn add(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.items.contains(&path) {
            return false;
        }
        self.items.push(path);
        true
    }

    /// Remove the item at `index`, dropping its mark too.
    pub fn remove(&mut self, index: usize) -> Option<PathBuf> {
        if index >= self.items.len() {
            return None;
        }
        let path = self.items.remove(index);
        self.marked.remove(&path);
        Some(path)
    }

    /// Flip the mark of a listed path. Returns the new mark state; unlisted paths stay unmarked.
    pub fn toggle_mark(&mut self, path: &Path) -> bool {
        if !self.items.iter().any(|p| p == path) {
            return false;
        }
        if self.marked.remove(path) {
            false
        } else {
            self.marked.insert(path.to_path_buf());
            true
        }
    }

    pub fn mark_all(&mut self) {
        self.marked = self.items.iter().cloned().collect();
    }

    pub fn unmark_all(&mut self) {
        self.marked.clear();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.marked.clear();
    }

    /// Drop items and marks whose path no longer exists.
    pub fn prune_missing(&mut self) -> usize {
        let before = self.items.len();
        self.items.retain(|p| p.exists());
        let items = &self.items;
        self.marked.retain(|p| items.contains(p));
        before - self.items.len()
    }

    #[inline]
    pub fn items(&self) -> &[PathBuf] {
        &self.items
    }

    #[inline]
    pub fn is_marked(&self, path: &Path) -> bool {
        self.marked.contains(path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Scripts a batch run should use: the marked ones in list order, or all when none are marked.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let marked: Vec<PathBuf> = self
            .items
            .iter()
            .filter(|p| self.marked.contains(*p))
            .cloned()
            .collect();
        if marked.is_empty() {
            self.items.clone()
        } else {
            marked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(paths: &[&str]) -> ScriptList {
        let mut l = ScriptList::new();
        for p in paths {
            l.add(*p);
        }
        l
    }

    #[test]
    fn add_ignores_duplicates() {
        let mut l = ScriptList::new();
        assert!(l.add("a.py"));
        assert!(!l.add("a.py"));
        assert_eq!(l.len(), 1);
    }

    #[test]
    fn candidates_prefer_marked_subset_in_list_order() {
        let mut l = list(&["a.py", "b.py", "c.py"]);
        assert_eq!(l.candidates().len(), 3);

        l.toggle_mark(Path::new("c.py"));
        l.toggle_mark(Path::new("a.py"));
        assert_eq!(
            l.candidates(),
            vec![PathBuf::from("a.py"), PathBuf::from("c.py")]
        );

        l.unmark_all();
        assert_eq!(l.candidates().len(), 3);
    }

    #[test]
    fn toggle_mark_ignores_unlisted_paths() {
        let mut l = list(&["a.py"]);
        assert!(!l.toggle_mark(Path::new("zzz.py")));
        assert!(!l.is_marked(Path::new("zzz.py")));
        assert!(l.toggle_mark(Path::new("a.py")));
        assert!(!l.toggle_mark(Path::new("a.py")));
    }

    #[test]
    fn remove_drops_mark() {
        let mut l = list(&["a.py", "b.py"]);
        l.mark_all();
        assert_eq!(l.remove(0), Some(PathBuf::from("a.py")));
        assert!(!l.is_marked(Path::new("a.py")));
        assert!(l.is_marked(Path::new("b.py")));
        assert_eq!(l.remove(5), None);
    }

    #[test]
    fn prune_missing_keeps_existing() {
        let dir = tempfile::TempDir::new().unwrap();
        let keep = dir.path().join("keep.py");
        std::fs::write(&keep, "").unwrap();

        let mut l = ScriptList::new();
        l.add(keep.clone());
        l.add(dir.path().join("gone.py"));
        l.mark_all();

        assert_eq!(l.prune_missing(), 1);
        assert_eq!(l.items(), [keep.clone()]);
        assert!(l.is_marked(&keep));
        assert_eq!(l.candidates(), vec![keep]);
    }

    #[test]
    fn json_defaults_missing_fields() {
        let l: ScriptList = serde_json::from_str(r#"{"items":["x.py"]}"#).unwrap();
        assert_eq!(l.items(), [PathBuf::from("x.py")]);
        assert!(!l.is_marked(Path::new("x.py")));
    }
}
