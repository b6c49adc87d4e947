//! Type identifiers, runtime matching and specificity ordering.
//!
//! Backends declare the types they support as string identifiers of the
//! form `"namespace:dotted.path"`. An identifier may be prefixed with `~`
//! to indicate that declared subclasses are accepted, or `@` to mark the
//! type as an abstract base (which implies subclass acceptance).
//!
//! Abstract entries are always checked against a value's ancestry. For
//! concrete entries the check is skipped unless the entry's defining
//! namespace is loaded: if it was never loaded, no instance of a subclass
//! from it can exist at the call site. The [`TypeUniverse`] collaborator
//! answers the loaded question.

use crate::error::IdentError;
use crate::ident::split_symbol;
use std::fmt;
use std::sync::Arc;

/// A cheap-to-clone `"namespace:dotted.path"` type identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(Arc<str>);

impl TypeKey {
    /// Parse and validate an identifier.
    pub fn new(ident: &str) -> Result<Self, IdentError> {
        split_symbol(ident)?;
        Ok(Self(Arc::from(ident)))
    }

    /// The full `"namespace:dotted.path"` string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The namespace half of the identifier.
    pub fn namespace(&self) -> &str {
        self.0.split_once(':').map(|(ns, _)| ns).unwrap_or(&self.0)
    }

    /// The dotted-path half of the identifier.
    pub fn path(&self) -> &str {
        self.0.split_once(':').map(|(_, p)| p).unwrap_or(&self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({:?})", &*self.0)
    }
}

/// The runtime type of a dispatch value.
///
/// Carries the type's own identifier plus its declared ancestor chain.
/// There is no structural subtyping: a type is a subclass of exactly the
/// ancestors it declares.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DispatchType {
    key: TypeKey,
    ancestors: Arc<[TypeKey]>,
}

impl DispatchType {
    /// A type with no declared ancestors.
    pub fn new(ident: &str) -> Result<Self, IdentError> {
        Ok(Self {
            key: TypeKey::new(ident)?,
            ancestors: Arc::from([]),
        })
    }

    /// A type declaring the given ancestors (nearest first, not
    /// including itself).
    pub fn with_ancestors<'a>(
        ident: &str,
        ancestors: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, IdentError> {
        let ancestors = ancestors
            .into_iter()
            .map(TypeKey::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            key: TypeKey::new(ident)?,
            ancestors: ancestors.into(),
        })
    }

    /// The type's own identifier.
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// The declared ancestor chain.
    pub fn ancestors(&self) -> &[TypeKey] {
        &self.ancestors
    }
}

/// Implemented by value types that participate in dispatch.
///
/// This is the seam a library author implements for the argument types a
/// dispatchable function extracts its dispatch values from.
pub trait Dispatched {
    /// The runtime dispatch type of this value.
    fn dispatch_type(&self) -> DispatchType;
}

/// Answers whether a namespace has been loaded.
///
/// Used as the laziness guard for subclass matching against concrete
/// (non-abstract) supertypes; see the module docs.
pub trait TypeUniverse: Send + Sync {
    /// Whether the given namespace is loaded.
    fn namespace_loaded(&self, namespace: &str) -> bool;
}

/// A universe in which every namespace counts as loaded.
///
/// The right choice for statically linked programs and for tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullyLoaded;

impl TypeUniverse for FullyLoaded {
    fn namespace_loaded(&self, _namespace: &str) -> bool {
        true
    }
}

/// One parsed type identifier entry of a [`TypeSet`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeEntry {
    key: TypeKey,
    allow_subclasses: bool,
    is_abstract: bool,
}

impl TypeEntry {
    /// Parse an entry from its prefixed string form (`~` allows
    /// subclasses, `@` marks an abstract base).
    pub fn parse(ident: &str) -> Result<Self, IdentError> {
        let (allow_subclasses, is_abstract, rest) = if let Some(rest) = ident.strip_prefix('~') {
            (true, false, rest)
        } else if let Some(rest) = ident.strip_prefix('@') {
            (true, true, rest)
        } else {
            (false, false, ident)
        };
        Ok(Self {
            key: TypeKey::new(rest)?,
            allow_subclasses,
            is_abstract,
        })
    }

    /// The entry's identifier, without prefixes.
    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    /// Whether declared subclasses match this entry.
    pub fn allow_subclasses(&self) -> bool {
        self.allow_subclasses
    }

    /// Whether this entry names an abstract base.
    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Whether a concrete type matches this entry.
    pub fn matches(&self, ty: &DispatchType, universe: &dyn TypeUniverse) -> bool {
        if *ty.key() == self.key {
            return true;
        }
        if !self.allow_subclasses {
            return false;
        }
        // A concrete supertype can only have live subclasses once its
        // namespace is loaded; skip the ancestry walk entirely otherwise.
        if !self.is_abstract && !universe.namespace_loaded(self.key.namespace()) {
            return false;
        }
        ty.ancestors().contains(&self.key)
    }
}

/// A set of type identifier entries, unique by identifier.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct TypeSet {
    // Sorted by key; one entry per key.
    entries: Vec<TypeEntry>,
}

impl TypeSet {
    /// The empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a set from prefixed identifier strings.
    ///
    /// Duplicate identifiers are collapsed, keeping the first entry.
    pub fn parse<'a>(idents: impl IntoIterator<Item = &'a str>) -> Result<Self, IdentError> {
        let mut entries: Vec<TypeEntry> = Vec::new();
        for ident in idents {
            let entry = TypeEntry::parse(ident)?;
            if !entries.iter().any(|e| e.key == entry.key) {
                entries.push(entry);
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(Self { entries })
    }

    /// Whether any entry matches the concrete type.
    pub fn contains(&self, ty: &DispatchType, universe: &dyn TypeUniverse) -> bool {
        self.entries.iter().any(|e| e.matches(ty, universe))
    }

    /// Whether this set is more broadly defined than `other`, for
    /// priority purposes only.
    ///
    /// True iff `other`'s identifiers are a strict subset of this set's,
    /// or (with `subclass_tiebreak`) the identifier sets are identical
    /// and this set allows subclasses for at least one identifier where
    /// `other` does not, and never the reverse.
    ///
    /// When in doubt this returns `false` (the sets may even be equal).
    pub fn encompasses(&self, other: &TypeSet, subclass_tiebreak: bool) -> bool {
        let subset = other
            .entries
            .iter()
            .all(|o| self.entries.iter().any(|s| s.key == o.key));
        if !subset {
            return false;
        }
        if self.entries.len() != other.entries.len() {
            return true;
        }

        if !subclass_tiebreak {
            return false;
        }
        // Identical identifier sets; both sides are key-sorted.
        let mut any_subclass = false;
        for (s, o) in self.entries.iter().zip(&other.entries) {
            if s.allow_subclasses == o.allow_subclasses {
                continue;
            }
            if s.allow_subclasses {
                any_subclass = true;
            } else {
                return false;
            }
        }
        any_subclass
    }

    /// Union of two sets. On identifier collision the entry from `self`
    /// wins.
    pub fn union(&self, other: &TypeSet) -> TypeSet {
        let mut entries = self.entries.clone();
        for entry in &other.entries {
            if !entries.iter().any(|e| e.key == entry.key) {
                entries.push(entry.clone());
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        TypeSet { entries }
    }

    /// Whether any entry names an abstract base.
    pub fn is_abstract(&self) -> bool {
        self.entries.iter().any(|e| e.is_abstract)
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate the entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &TypeEntry> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchType, FullyLoaded, TypeEntry, TypeSet, TypeUniverse};

    struct NothingLoaded;

    impl TypeUniverse for NothingLoaded {
        fn namespace_loaded(&self, _namespace: &str) -> bool {
            false
        }
    }

    #[test]
    fn entry_prefixes() {
        let plain = TypeEntry::parse("builtins:int").unwrap();
        assert!(!plain.allow_subclasses() && !plain.is_abstract());

        let sub = TypeEntry::parse("~builtins:int").unwrap();
        assert!(sub.allow_subclasses() && !sub.is_abstract());
        assert_eq!(sub.key().as_str(), "builtins:int");

        let abs = TypeEntry::parse("@numbers:Real").unwrap();
        assert!(abs.allow_subclasses() && abs.is_abstract());

        assert!(TypeEntry::parse("~notanident").is_err());
    }

    #[test]
    fn exact_and_subclass_matching() {
        let entry = TypeEntry::parse("~builtins:int").unwrap();
        let int = DispatchType::new("builtins:int").unwrap();
        let sub = DispatchType::with_ancestors("mylib:int3", ["builtins:int"]).unwrap();
        let other = DispatchType::new("builtins:str").unwrap();

        assert!(entry.matches(&int, &FullyLoaded));
        assert!(entry.matches(&sub, &FullyLoaded));
        assert!(!entry.matches(&other, &FullyLoaded));

        let strict = TypeEntry::parse("builtins:int").unwrap();
        assert!(strict.matches(&int, &FullyLoaded));
        assert!(!strict.matches(&sub, &FullyLoaded));
    }

    #[test]
    fn unloaded_namespace_skips_subclass_check() {
        let concrete = TypeEntry::parse("~builtins:int").unwrap();
        let abstract_ = TypeEntry::parse("@numbers:Real").unwrap();
        let sub =
            DispatchType::with_ancestors("mylib:int3", ["builtins:int", "numbers:Real"]).unwrap();

        // Exact matches are unaffected by the universe.
        let int = DispatchType::new("builtins:int").unwrap();
        assert!(concrete.matches(&int, &NothingLoaded));

        assert!(!concrete.matches(&sub, &NothingLoaded));
        assert!(abstract_.matches(&sub, &NothingLoaded));
    }

    #[test]
    fn encompasses_strict_superset() {
        let wide = TypeSet::parse(["builtins:int", "builtins:float"]).unwrap();
        let narrow = TypeSet::parse(["builtins:int"]).unwrap();

        assert!(wide.encompasses(&narrow, false));
        assert!(!narrow.encompasses(&wide, false));
        assert!(!wide.encompasses(&wide.clone(), false));
    }

    #[test]
    fn encompasses_subclass_tiebreak() {
        let sub = TypeSet::parse(["~builtins:int"]).unwrap();
        let plain = TypeSet::parse(["builtins:int"]).unwrap();

        assert!(!sub.encompasses(&plain, false));
        assert!(sub.encompasses(&plain, true));
        assert!(!plain.encompasses(&sub, true));

        // Mixed directions never encompass.
        let a = TypeSet::parse(["~builtins:int", "builtins:float"]).unwrap();
        let b = TypeSet::parse(["builtins:int", "~builtins:float"]).unwrap();
        assert!(!a.encompasses(&b, true));
        assert!(!b.encompasses(&a, true));
    }

    #[test]
    fn union_dedupes_by_key() {
        let a = TypeSet::parse(["builtins:int"]).unwrap();
        let b = TypeSet::parse(["~builtins:int", "builtins:float"]).unwrap();
        let u = a.union(&b);
        assert_eq!(u.len(), 2);
        // Collision keeps the left entry.
        let int = u
            .iter()
            .find(|e| e.key().as_str() == "builtins:int")
            .unwrap();
        assert!(!int.allow_subclasses());
    }
}
