//! Handler identifiers and the catalog of installed/running applications.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Separator used when passing identifier lists through the environment.
///
/// Identifiers are reverse-DNS style names, so `:` never appears inside one.
/// Spaces do occur in the wild and are left alone.
pub const LIST_SEPARATOR: &str = ":";

/// Opaque application identifier, e.g. `com.example.Browser`.
///
/// Two identifiers name the same handler iff their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(String);

impl HandlerId {
    /// Build an identifier, or `None` if `id` is not an acceptable identifier.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        is_valid_identifier(&id).then_some(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every string is currently accepted. Tighten here and nowhere else.
fn is_valid_identifier(_id: &str) -> bool {
    true
}

/// Join identifiers with [`LIST_SEPARATOR`] in sorted order.
pub fn encode_list<'a>(ids: impl IntoIterator<Item = &'a HandlerId>) -> String {
    let sorted: BTreeSet<&str> = ids.into_iter().map(HandlerId::as_str).collect();
    sorted.into_iter().collect::<Vec<_>>().join(LIST_SEPARATOR)
}

/// Split a [`LIST_SEPARATOR`]-joined list, skipping empty entries.
pub fn decode_list(list: &str) -> Vec<HandlerId> {
    list.split(LIST_SEPARATOR)
        .filter(|part| !part.is_empty())
        .filter_map(HandlerId::new)
        .collect()
}

/// Source of the application facts passed to the script.
///
/// Implementations typically wrap an OS launch-services API.
#[async_trait]
pub trait AppCatalog: Send + Sync {
    /// The application that was in front when the URL was requested.
    async fn frontmost(&self) -> Option<HandlerId>;

    /// This tool's own identifier, never offered to the script.
    fn current(&self) -> Option<HandlerId>;

    /// All applications registered for `scheme`.
    async fn handlers_for_scheme(&self, scheme: &str) -> HashSet<HandlerId>;

    /// All applications currently running.
    async fn running(&self) -> HashSet<HandlerId>;
}

/// An [`AppCatalog`] backed by fixed data, usually loaded from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    pub current: Option<HandlerId>,
    pub frontmost: Option<HandlerId>,
    pub schemes: BTreeMap<String, Vec<HandlerId>>,
    pub running: Vec<HandlerId>,
}

#[async_trait]
impl AppCatalog for StaticCatalog {
    async fn frontmost(&self) -> Option<HandlerId> {
        self.frontmost.clone()
    }

    fn current(&self) -> Option<HandlerId> {
        self.current.clone()
    }

    async fn handlers_for_scheme(&self, scheme: &str) -> HashSet<HandlerId> {
        self.schemes
            .iter()
            .filter(|(registered, _)| registered.eq_ignore_ascii_case(scheme))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    async fn running(&self) -> HashSet<HandlerId> {
        self.running.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> HandlerId {
        HandlerId::new(s).unwrap()
    }

    #[test]
    fn test_any_string_is_an_identifier() {
        assert_eq!(id("org.mozilla.tor browser").as_str(), "org.mozilla.tor browser");
        assert!(HandlerId::new("").is_some());
    }

    #[test]
    fn test_identity_is_string_equality() {
        let set: HashSet<HandlerId> = [id("appA"), id("appA"), id("appB")].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_encode_list_sorted() {
        let ids = [id("com.b"), id("com.a"), id("com.c")];
        assert_eq!(encode_list(&ids), "com.a:com.b:com.c");
        assert_eq!(encode_list(&[]), "");
    }

    #[test]
    fn test_decode_list_skips_empty() {
        assert_eq!(decode_list("appA::appB:"), vec![id("appA"), id("appB")]);
        assert!(decode_list("").is_empty());
    }

    #[tokio::test]
    async fn test_static_catalog_scheme_lookup() {
        let mut catalog = StaticCatalog::default();
        catalog
            .schemes
            .insert("http".to_string(), vec![id("appA"), id("appB")]);

        let handlers = catalog.handlers_for_scheme("HTTP").await;
        assert_eq!(handlers.len(), 2);
        assert!(catalog.handlers_for_scheme("ftp").await.is_empty());
    }
}
