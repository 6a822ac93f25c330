//! Path and buffer types shared by the kdfs crates.

use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Absolute path inside a projected tree, e.g. `/Passwords/Bank/username`.
///
/// Relative to the tree root, never to the mount point. Components may
/// hold any character except `/`; repeated or trailing separators are
/// rejected rather than collapsed, so every path has one spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TreePath {
    components: Vec<String>,
}

impl TreePath {
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `/a/b/c`. `/` and the empty string are the root; the leading
    /// separator is optional.
    ///
    /// # Errors
    /// - [`crate::Error::InvalidInput`] for an empty component (`/a//b`, `/a/`)
    pub fn parse(path: &str) -> crate::Result<Self> {
        let body = path.strip_prefix('/').unwrap_or(path);
        if body.is_empty() {
            return Ok(Self::root());
        }

        let components = body
            .split('/')
            .map(|component| {
                if component.is_empty() {
                    Err(crate::Error::InvalidInput(format!(
                        "Empty component in tree path '{}'",
                        path
                    )))
                } else {
                    Ok(component.to_string())
                }
            })
            .collect::<crate::Result<_>>()?;
        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Number of components below the root.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    pub fn name(&self) -> Option<&str> {
        self.components.last().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }
}

impl FromStr for TreePath {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str("/");
        }
        for component in &self.components {
            write!(f, "/{}", component)?;
        }
        Ok(())
    }
}

/// Owned secret bytes, wiped when dropped and never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SensitiveBytes(Box<[u8]>);

impl SensitiveBytes {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data.into_boxed_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for SensitiveBytes {
    fn from(value: &str) -> Self {
        Self(Box::from(value.as_bytes()))
    }
}

impl AsRef<[u8]> for SensitiveBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes(<{} bytes>)", self.0.len())
    }
}
