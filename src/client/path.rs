//! Lexical path handling against the session's working directory.

/// Resolves caller paths against the working directory without a round
/// trip. With a canonical (absolute) working directory every result is
/// absolute; without one, leading `..` segments that can not be resolved
/// are kept in front of the result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    pwd: String,
    canonical: bool,
}

impl PathResolver {
    /// `pwd` as returned by `REALPATH .`.
    pub fn canonical(pwd: impl Into<String>) -> Self {
        Self {
            pwd: pwd.into(),
            canonical: true,
        }
    }

    /// Local emulation rooted at `.`.
    pub fn emulated() -> Self {
        Self {
            pwd: ".".to_owned(),
            canonical: false,
        }
    }

    pub fn pwd(&self) -> &str {
        &self.pwd
    }

    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    pub fn set_canonical(&mut self, canonical: bool) {
        self.canonical = canonical;
    }

    pub(crate) fn set_pwd(&mut self, pwd: String) {
        self.pwd = pwd;
    }

    pub fn resolve(&self, path: &str) -> String {
        if path.starts_with('/') {
            return normalize(path);
        }

        if path.is_empty() {
            return normalize(&self.pwd);
        }

        normalize(&format!("{}/{}", self.pwd, path))
    }
}

/// Collapses empty, `.` and `..` segments. `..` above the root of an
/// absolute path is dropped; above the start of a relative path it is kept.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut before: Vec<&str> = Vec::new();
    let mut after: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if after.pop().is_none() && !absolute {
                    before.push("..");
                }
            }
            segment => after.push(segment),
        }
    }

    if absolute {
        return format!("/{}", after.join("/"));
    }

    let prefix = if before.is_empty() {
        ".".to_owned()
    } else {
        before.join("/")
    };

    if after.is_empty() {
        prefix
    } else {
        format!("{}/{}", prefix, after.join("/"))
    }
}

/// Parent directory of a normalized path, `None` for a root.
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) if trimmed.len() > 1 => Some("/"),
        Some(0) | None => None,
        Some(index) => Some(&trimmed[..index]),
    }
}

/// Last segment of a path.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
