use std::fmt;
use std::sync::Arc;

/// Identity of a source image (a path, URL, or synthetic name).
///
/// Cheap to clone; equality is by string value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey(Arc<str>);

impl ImageKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImageKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ImageKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
