//! Typed metadata bag.

use std::collections::BTreeMap;

/// Tags of a single metadata directory, keyed by sanitized tag name.
pub type Directory = BTreeMap<String, String>;

/// Metadata extracted from one file: `directory name -> (tag name -> value)`.
///
/// Lookups are explicit: an unknown directory or tag is `None`, never an
/// empty string. Tag names are sanitized on insertion (see [`sanitize_tag`])
/// so they can be addressed from templates; directory names are kept as the
/// reader reports them (`"Exif IFD0"`, `"GPS"`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataBag {
    directories: BTreeMap<String, Directory>,
}

impl MetadataBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tag value, returning the previous value for that tag if any.
    pub fn insert(
        &mut self,
        directory: impl Into<String>,
        tag: impl AsRef<str>,
        value: impl Into<String>,
    ) -> Option<String> {
        self.directories.entry(directory.into()).or_default().insert(sanitize_tag(tag), value.into())
    }

    pub fn directory(&self, name: &str) -> Option<&Directory> {
        self.directories.get(name)
    }

    /// Value of `tag` in `directory`, if both exist.
    pub fn get(&self, directory: &str, tag: &str) -> Option<&str> {
        self.directories.get(directory)?.get(tag).map(String::as_str)
    }

    pub fn contains(&self, directory: &str, tag: &str) -> bool {
        self.get(directory, tag).is_some()
    }

    pub fn directories(&self) -> impl Iterator<Item = (&str, &Directory)> {
        self.directories.iter().map(|(name, tags)| (name.as_str(), tags))
    }

    /// Number of directories (not tags).
    pub fn len(&self) -> usize {
        self.directories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }
}

impl<D, T, V> FromIterator<(D, T, V)> for MetadataBag
where
    D: Into<String>,
    T: AsRef<str>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (D, T, V)>>(iter: I) -> Self {
        let mut bag = Self::new();
        for (directory, tag, value) in iter {
            bag.insert(directory, tag, value);
        }
        bag
    }
}

/// Strips every character that isn't a word character (`[A-Za-z0-9_]` plus
/// Unicode alphanumerics), so `"Date/Time Original"` becomes `"DateTimeOriginal"`.
pub fn sanitize_tag(tag: impl AsRef<str>) -> String {
    tag.as_ref().chars().filter(|c| c.is_alphanumeric() || *c == '_').collect()
}
