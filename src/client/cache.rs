//! Tree of `stat`/`lstat` results keyed by path segment.

use std::collections::BTreeMap;

use crate::protocol::{DirectoryEntry, FileAttributes};

#[derive(Debug, Default)]
struct Node {
    stat: Option<FileAttributes>,
    lstat: Option<FileAttributes>,
    /// Known to be a directory, e.g. because it was listed
    directory: bool,
    children: BTreeMap<String, Node>,
}

impl Node {
    fn clear(&mut self) {
        self.stat = None;
        self.lstat = None;
        self.directory = false;
    }
}

/// Snapshot of what is cached for one path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub stat: Option<FileAttributes>,
    pub lstat: Option<FileAttributes>,
    pub directory: bool,
}

impl CacheEntry {
    pub fn is_dir(&self) -> bool {
        self.directory || self.stat.as_ref().is_some_and(FileAttributes::is_dir)
    }
}

/// Paths are expected in resolved form, segments are compared verbatim.
/// A disabled cache stores nothing and answers every lookup with a miss.
#[derive(Debug)]
pub struct StatCache {
    root: Node,
    enabled: bool,
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

impl StatCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            root: Node::default(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Disabling also forgets everything cached so far.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.clear();
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
    }

    fn node(&self, path: &str) -> Option<&Node> {
        segments(path).try_fold(&self.root, |node, segment| node.children.get(segment))
    }

    fn node_mut(&mut self, path: &str) -> Option<&mut Node> {
        segments(path).try_fold(&mut self.root, |node, segment| node.children.get_mut(segment))
    }

    fn entry(&mut self, path: &str) -> &mut Node {
        segments(path).fold(&mut self.root, |node, segment| {
            node.children.entry(segment.to_owned()).or_default()
        })
    }

    pub fn get(&self, path: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }

        self.node(path).map(|node| CacheEntry {
            stat: node.stat.clone(),
            lstat: node.lstat.clone(),
            directory: node.directory,
        })
    }

    pub fn stat(&self, path: &str) -> Option<FileAttributes> {
        self.get(path).and_then(|entry| entry.stat)
    }

    pub fn lstat(&self, path: &str) -> Option<FileAttributes> {
        self.get(path).and_then(|entry| entry.lstat)
    }

    /// True only when the cache positively knows `path` is a directory.
    pub fn is_dir(&self, path: &str) -> bool {
        self.get(path).is_some_and(|entry| entry.is_dir())
    }

    pub fn put_stat(&mut self, path: &str, attrs: FileAttributes) {
        if self.enabled {
            let node = self.entry(path);
            node.directory |= attrs.is_dir();
            node.stat = Some(attrs);
        }
    }

    pub fn put_lstat(&mut self, path: &str, attrs: FileAttributes) {
        if self.enabled {
            let node = self.entry(path);
            node.directory |= attrs.is_dir();
            node.lstat = Some(attrs);
        }
    }

    pub fn mark_directory(&mut self, path: &str) {
        if self.enabled {
            self.entry(path).directory = true;
        }
    }

    /// Records a directory listing: the directory itself exists and every
    /// child gets its `lstat` from the entry's attributes.
    pub fn put_listing(&mut self, dir: &str, entries: &[DirectoryEntry]) {
        if !self.enabled {
            return;
        }

        let node = self.entry(dir);
        node.directory = true;

        for entry in entries {
            if entry.filename == "." || entry.filename == ".." || entry.filename.contains('/') {
                continue;
            }

            let child = node.children.entry(entry.filename.clone()).or_default();
            child.directory = entry.attrs.is_dir();
            child.lstat = Some(entry.attrs.clone());
            if !entry.attrs.is_symlink() {
                child.stat = Some(entry.attrs.clone());
            }
        }
    }

    /// Forgets the attributes of `path`. Its children stay.
    pub fn invalidate(&mut self, path: &str) {
        if let Some(node) = self.node_mut(path) {
            node.clear();
        }
    }

    /// Forgets `path` and everything below it.
    pub fn invalidate_subtree(&mut self, path: &str) {
        let mut parts: Vec<&str> = segments(path).collect();
        let Some(last) = parts.pop() else {
            self.clear();
            return;
        };

        let parent = parts
            .into_iter()
            .try_fold(&mut self.root, |node, segment| node.children.get_mut(segment));

        if let Some(parent) = parent {
            if parent.children.remove(last).is_some() {
                debug!("stat cache dropped subtree {path}");
            }
        }
    }

    /// A namespace change below `path` changes its mtime too.
    pub fn invalidate_parent_of(&mut self, path: &str) {
        if let Some(parent) = super::path::parent(path) {
            self.invalidate(parent);
        }
    }
}
