//! Name helpers shared across the zone store.

use bytes::Bytes;
use domain::base::name::ToName;
use domain::base::Name;

/// The name type used for everything stored in a zone.
///
/// `Bytes`-backed names are cheap to clone and are what `domain`'s own
/// zonetree and signing APIs expect, so the zone store standardizes on
/// them rather than introducing its own string type.
pub type StoredName = Name<Bytes>;

/// Whether `name` is at or below `apex`, i.e. inside `apex`'s bailiwick.
pub fn in_bailiwick(apex: &StoredName, name: &impl ToName) -> bool {
    name.to_name::<Bytes>().ends_with(apex)
}

/// The number of labels in `name`, used to pick the most specific of
/// several enclosing zones/owners (more labels = more specific).
pub fn label_count(name: &StoredName) -> usize {
    name.iter_labels().count()
}

/// Fold a name into lower-case form for use as a case-insensitive map key.
///
/// Only zones with the `fold-case` option set use this; ordinary zones
/// compare names exactly, matching RFC 1035's closed-world DNS model
/// rather than genuinely case-insensitive Unicode folding.
pub fn fold(name: &StoredName) -> StoredName {
    name.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn bailiwick_containment() {
        let apex = StoredName::from_str("example.com.").unwrap();
        let inside = StoredName::from_str("www.example.com.").unwrap();
        let outside = StoredName::from_str("www.example.net.").unwrap();
        assert!(in_bailiwick(&apex, &inside));
        assert!(in_bailiwick(&apex, &apex));
        assert!(!in_bailiwick(&apex, &outside));
    }

    #[test]
    fn fold_lowercases() {
        let n = StoredName::from_str("WWW.Example.COM.").unwrap();
        assert_eq!(fold(&n), StoredName::from_str("www.example.com.").unwrap());
    }
}
