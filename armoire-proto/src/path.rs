use std::fmt;

use percent_encoding::percent_decode_str;

use crate::error::DavError;

/// A normalized absolute URL path: leading `/`, percent-decoded once, no
/// empty segment, `.` collapsed, `..` refused at the door.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DavPath {
    segments: Vec<String>,
}

impl DavPath {
    pub fn root() -> Self {
        Self { segments: vec![] }
    }

    pub fn parse(raw: &str) -> Result<Self, DavError> {
        if !raw.starts_with('/') {
            return Err(DavError::BadRequest);
        }
        let decoded = percent_decode_str(raw)
            .decode_utf8()
            .map_err(|_| DavError::BadRequest)?;

        let mut segments = Vec::new();
        for segment in decoded.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(DavError::BadRequest),
                other => segments.push(other.to_string()),
            }
        }
        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment; the root has none.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// The root is its own parent.
    pub fn parent(&self) -> DavPath {
        let mut segments = self.segments.clone();
        segments.pop();
        Self { segments }
    }

    /// Strict: a path is not its own ancestor.
    pub fn is_ancestor_of(&self, other: &DavPath) -> bool {
        other.segments.len() > self.segments.len() && other.segments.starts_with(&self.segments)
    }

    /// Residual below `prefix`. Defined when `prefix` equals `self` or is
    /// an ancestor of it.
    pub fn strip_prefix(&self, prefix: &DavPath) -> Option<DavPath> {
        if prefix == self || prefix.is_ancestor_of(self) {
            Some(Self {
                segments: self.segments[prefix.segments.len()..].to_vec(),
            })
        } else {
            None
        }
    }

    pub fn join(&self, child: &DavPath) -> DavPath {
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        Self { segments }
    }

    pub fn child(&self, segment: &str) -> DavPath {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self { segments }
    }
}

impl fmt::Display for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for DavPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DavPath({})", self)
    }
}

impl std::str::FromStr for DavPath {
    type Err = DavError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
