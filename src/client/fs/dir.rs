use std::cmp::Ordering;

use super::Metadata;
use crate::protocol::DirectoryEntry;

/// Attribute a listing can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Case-insensitive
    Filename,
    Size,
    /// Only the `0o7777` bits are compared
    Permissions,
    Mtime,
    Atime,
    Uid,
    Gid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// How [`list`](crate::client::SftpSession::list) orders its entries.
///
/// Every order other than `None` puts `.` first, `..` second and
/// directories ahead of everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ListOrder {
    /// Keep the order the server sent
    #[default]
    None,
    DirectoriesFirst,
    By(Vec<(SortKey, Direction)>),
}

impl ListOrder {
    pub fn by(key: SortKey, direction: Direction) -> Self {
        Self::By(vec![(key, direction)])
    }

    #[must_use]
    pub fn then(self, key: SortKey, direction: Direction) -> Self {
        match self {
            Self::By(mut keys) => {
                keys.push((key, direction));
                Self::By(keys)
            }
            _ => Self::by(key, direction),
        }
    }

    /// Stable, so entries that compare equal keep the server's order.
    pub fn sort(&self, entries: &mut [DirectoryEntry]) {
        let keys: &[(SortKey, Direction)] = match self {
            Self::None => return,
            Self::DirectoriesFirst => &[],
            Self::By(keys) => keys,
        };

        entries.sort_by(|a, b| {
            rank(a)
                .cmp(&rank(b))
                .then_with(|| compare_keys(a, b, keys))
        });
    }
}

/// `.`, `..`, directories, the rest.
fn rank(entry: &DirectoryEntry) -> u8 {
    match entry.filename.as_str() {
        "." => 0,
        ".." => 1,
        _ if entry.attrs.is_dir() => 2,
        _ => 3,
    }
}

fn compare_keys(a: &DirectoryEntry, b: &DirectoryEntry, keys: &[(SortKey, Direction)]) -> Ordering {
    keys.iter()
        .map(|(key, direction)| {
            let ordering = compare_key(a, b, *key);
            match direction {
                Direction::Ascending => ordering,
                Direction::Descending => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn compare_key(a: &DirectoryEntry, b: &DirectoryEntry, key: SortKey) -> Ordering {
    match key {
        SortKey::Filename => a
            .filename
            .to_lowercase()
            .cmp(&b.filename.to_lowercase()),
        SortKey::Size => present_first(a.attrs.size, b.attrs.size),
        SortKey::Permissions => present_first(permissions(&a.attrs), permissions(&b.attrs)),
        SortKey::Mtime => present_first(
            a.attrs.mtime.map(|t| t.seconds),
            b.attrs.mtime.map(|t| t.seconds),
        ),
        SortKey::Atime => present_first(
            a.attrs.atime.map(|t| t.seconds),
            b.attrs.atime.map(|t| t.seconds),
        ),
        SortKey::Uid => present_first(a.attrs.uid, b.attrs.uid),
        SortKey::Gid => present_first(a.attrs.gid, b.attrs.gid),
    }
}

fn permissions(attrs: &Metadata) -> Option<u32> {
    attrs.permissions.map(|mode| mode & 0o7777)
}

/// Entries missing the value sort after those that have it.
fn present_first<T: Ord>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
