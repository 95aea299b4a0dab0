//! Template store: the ordered set of reference images the watch loop
//! probes for. Order is significant (it is the cycle order) and the
//! control surface may reorder entries at any time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::GrayImage;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("failed to decode template image {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("template index {index} out of range (store holds {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A reference image to look for on screen. Immutable once loaded.
#[derive(Debug)]
pub struct Template {
    name: String,
    source_path: PathBuf,
    pixels: GrayImage,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn pixels(&self) -> &GrayImage {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// Ordered collection of loaded templates. No implicit sorting.
#[derive(Debug, Default)]
pub struct TemplateStore {
    entries: Vec<Arc<Template>>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an image file and append it to the cycle.
    ///
    /// Loading a path that is already present is an idempotent no-op: the
    /// existing entry is returned and the duplicate is only logged.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<Arc<Template>, TemplateError> {
        let path = path.as_ref();
        if let Some(existing) = self.entries.iter().find(|t| t.source_path == path) {
            warn!(path = %path.display(), "template already loaded, keeping existing entry");
            return Ok(existing.clone());
        }

        let pixels = image::open(path)
            .map_err(|source| TemplateError::Decode {
                path: path.to_path_buf(),
                source,
            })?
            .to_luma8();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let template = Arc::new(Template {
            name,
            source_path: path.to_path_buf(),
            pixels,
        });
        self.entries.push(template.clone());
        info!(
            name = template.name,
            width = template.width(),
            height = template.height(),
            "loaded template"
        );
        Ok(template)
    }

    /// Remove the entry at `index`.
    pub fn remove(&mut self, index: usize) -> Result<Arc<Template>, TemplateError> {
        if index >= self.entries.len() {
            return Err(TemplateError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        let removed = self.entries.remove(index);
        info!(name = removed.name, "removed template");
        Ok(removed)
    }

    /// Swap the entry at `index` with its predecessor. Returns `Ok(false)`
    /// at the top boundary.
    pub fn move_up(&mut self, index: usize) -> Result<bool, TemplateError> {
        if index >= self.entries.len() {
            return Err(TemplateError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        if index == 0 {
            return Ok(false);
        }
        self.entries.swap(index, index - 1);
        Ok(true)
    }

    /// Swap the entry at `index` with its successor. Returns `Ok(false)` at
    /// the bottom boundary.
    pub fn move_down(&mut self, index: usize) -> Result<bool, TemplateError> {
        if index >= self.entries.len() {
            return Err(TemplateError::IndexOutOfRange {
                index,
                len: self.entries.len(),
            });
        }
        if index == self.entries.len() - 1 {
            return Ok(false);
        }
        self.entries.swap(index, index + 1);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Template>> {
        self.entries.get(index)
    }

    /// Resolve a free-running cursor against the current length and fetch
    /// the entry in one step, so callers on other threads always see a
    /// consistent (index, template) pair even while the store is mutated.
    pub fn resolve(&self, cursor: usize) -> Option<(usize, Arc<Template>)> {
        if self.entries.is_empty() {
            return None;
        }
        let index = cursor % self.entries.len();
        Some((index, self.entries[index].clone()))
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|t| t.name.clone()).collect()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|t| t.source_path.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::path::PathBuf;

    fn write_png(dir: &std::path::Path, name: &str, shade: u8) -> PathBuf {
        let path = dir.join(name);
        let img = GrayImage::from_fn(8, 6, |x, y| Luma([shade.wrapping_add((x + y) as u8)]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn load_decodes_and_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 10);
        let b = write_png(dir.path(), "b.png", 90);

        let mut store = TemplateStore::new();
        store.load(&a).unwrap();
        store.load(&b).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.names(), vec!["a.png", "b.png"]);
        assert_eq!(store.get(0).unwrap().width(), 8);
    }

    #[test]
    fn duplicate_path_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 10);

        let mut store = TemplateStore::new();
        let first = store.load(&a).unwrap();
        let second = store.load(&a).unwrap();

        assert_eq!(store.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn load_rejects_non_image_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-an-image.png");
        std::fs::write(&path, b"plain text").unwrap();

        let mut store = TemplateStore::new();
        assert!(matches!(
            store.load(&path),
            Err(TemplateError::Decode { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_checks_bounds() {
        let mut store = TemplateStore::new();
        assert!(matches!(
            store.remove(0),
            Err(TemplateError::IndexOutOfRange { index: 0, len: 0 })
        ));
    }

    #[test]
    fn reorder_is_a_noop_at_the_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_png(dir.path(), "a.png", 10);
        let b = write_png(dir.path(), "b.png", 90);

        let mut store = TemplateStore::new();
        store.load(&a).unwrap();
        store.load(&b).unwrap();

        assert!(!store.move_up(0).unwrap());
        assert!(!store.move_down(1).unwrap());
        assert_eq!(store.names(), vec!["a.png", "b.png"]);

        assert!(store.move_up(1).unwrap());
        assert_eq!(store.names(), vec!["b.png", "a.png"]);
        assert!(store.move_down(0).unwrap());
        assert_eq!(store.names(), vec!["a.png", "b.png"]);

        assert!(matches!(
            store.move_up(7),
            Err(TemplateError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn advancing_visits_every_entry_once_per_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TemplateStore::new();
        for (name, shade) in [("a.png", 10), ("b.png", 90), ("c.png", 170)] {
            store.load(write_png(dir.path(), name, shade)).unwrap();
        }

        // an arbitrary starting cursor walks the whole cycle before repeating
        let mut cursor = 7;
        let first = store.resolve(cursor).unwrap().0;
        let mut visited = Vec::new();
        for _ in 0..store.len() {
            let (index, _) = store.resolve(cursor).unwrap();
            visited.push(index);
            cursor = index + 1;
        }
        assert_eq!(visited, vec![1, 2, 0]);
        assert_eq!(store.resolve(cursor).unwrap().0, first);
    }

    #[test]
    fn resolve_wraps_the_cursor_even_after_shrinking() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TemplateStore::new();
        for (name, shade) in [("a.png", 10), ("b.png", 90), ("c.png", 170)] {
            store.load(write_png(dir.path(), name, shade)).unwrap();
        }

        assert_eq!(store.resolve(0).unwrap().0, 0);
        assert_eq!(store.resolve(4).unwrap().0, 1);
        assert_eq!(store.resolve(5).unwrap().0, 2);

        // cursor 2 was valid; after removing an entry it must wrap, not index
        // out of range
        store.remove(0).unwrap();
        let (index, template) = store.resolve(2).unwrap();
        assert_eq!(index, 0);
        assert_eq!(template.name(), "b.png");

        store.remove(0).unwrap();
        store.remove(0).unwrap();
        assert!(store.resolve(2).is_none());
    }
}
