//! Ordered string multimap used for headers and trailers.
//!
//! HTTP/2 field names are case-insensitive and transmitted in lower case, so
//! keys are normalised on insertion. Insertion order is preserved and a key
//! may appear more than once.

/// Ordered, case-insensitive multimap of header or trailer fields.
///
/// # Examples
///
/// ```
/// use grpcframe::metadata::Metadata;
///
/// let mut md = Metadata::new();
/// md.append("X-Trace", "a");
/// md.append("x-trace", "b");
/// assert_eq!(md.get("x-TRACE"), Some("a"));
/// assert_eq!(md.get_all("x-trace").collect::<Vec<_>>(), ["a", "b"]);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, String)>,
}

impl Metadata {
    /// Create an empty map.
    #[must_use]
    pub const fn new() -> Self { Self { entries: Vec::new() } }

    /// Append `value` under `key`, keeping any existing values.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let mut key = key.into();
        key.make_ascii_lowercase();
        self.entries.push((key, value.into()));
    }

    /// Replace every value stored under `key` with `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.remove(&key);
        self.append(key, value);
    }

    /// Remove all values stored under `key`, returning how many were removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(key));
        before - self.entries.len()
    }

    /// Return the first value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Iterate over every value stored under `key` in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Whether any value is stored under `key`.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool { self.get(key).is_some() }

    /// Iterate over all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Append all entries of `other`, preserving their order.
    pub fn extend(&mut self, other: Metadata) { self.entries.extend(other.entries); }

    /// Number of entries, counting repeated keys separately.
    #[must_use]
    pub fn len(&self) -> usize { self.entries.len() }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = Metadata::new();
        for (k, v) in iter {
            md.append(k, v);
        }
        md
    }
}

impl IntoIterator for Metadata {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter { self.entries.into_iter() }
}

#[cfg(test)]
mod tests {
    use super::Metadata;

    #[test]
    fn keys_are_lowercased_on_insert() {
        let mut md = Metadata::new();
        md.append("Content-Type", "application/grpc");
        assert_eq!(md.iter().next(), Some(("content-type", "application/grpc")));
    }

    #[test]
    fn insert_replaces_all_previous_values() {
        let mut md: Metadata = [("a", "1"), ("b", "2"), ("A", "3")].into_iter().collect();
        md.insert("a", "4");
        assert_eq!(md.get_all("a").collect::<Vec<_>>(), ["4"]);
        assert_eq!(md.len(), 2);
    }

    #[test]
    fn remove_reports_count() {
        let mut md: Metadata = [("k", "1"), ("k", "2")].into_iter().collect();
        assert_eq!(md.remove("K"), 2);
        assert!(md.is_empty());
    }
}
