//! Interned strings, symbols and property keys.
//!
//! Atoms are interned per runtime: two atoms produced by the same
//! [`AtomTable`] are equal exactly when they share an allocation. That lets
//! cache guards compare names by pointer instead of walking characters.

use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxBuildHasher;

// ==================== Atom ====================

/// An interned, immutable string.
///
/// Equality and hashing are by identity. Content comparison only happens
/// inside the [`AtomTable`] when interning.
#[derive(Clone)]
pub struct Atom(Arc<str>);

impl Atom {
    /// The string contents.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in bytes. Interned strings are ASCII-or-UTF8; cache code only
    /// needs a cheap length, not a code-point count.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the atom is the empty string.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stable address of the interned allocation, used as an identity key.
    #[inline]
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as *const u8 as usize
    }

    /// True when the atom spells a valid dense-element index (a canonical
    /// base-10 integer below 2^31).
    pub fn as_element_index(&self) -> Option<u32> {
        let s = self.as_str();
        if s.is_empty() || s.len() > 10 {
            return None;
        }
        if s != "0" && s.starts_with('0') {
            return None;
        }
        let n: u64 = s.parse().ok()?;
        if n <= i32::MAX as u64 { Some(n as u32) } else { None }
    }
}

impl PartialEq for Atom {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Atom {}

impl Hash for Atom {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state);
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({:?})", self.as_str())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==================== AtomTable ====================

/// Runtime-wide intern table.
///
/// `intern` returns the canonical [`Atom`] for a string, creating it on
/// first sight. The table keeps its entries alive for the lifetime of the
/// runtime; atoms are never swept.
#[derive(Default)]
pub struct AtomTable {
    strings: Mutex<HashSet<Arc<str>, FxBuildHasher>>,
}

impl AtomTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `text`, returning the canonical atom for it.
    pub fn intern(&self, text: &str) -> Atom {
        let mut strings = self.strings.lock();
        if let Some(existing) = strings.get(text) {
            return Atom(Arc::clone(existing));
        }
        let arc: Arc<str> = Arc::from(text);
        strings.insert(Arc::clone(&arc));
        Atom(arc)
    }

    /// Number of distinct atoms interned so far.
    pub fn len(&self) -> usize {
        self.strings.lock().len()
    }

    /// True when nothing has been interned.
    pub fn is_empty(&self) -> bool {
        self.strings.lock().is_empty()
    }
}

// ==================== JsSymbol ====================

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct SymbolInner {
    id: u64,
    description: Option<Atom>,
}

/// A unique symbol. Every call to [`JsSymbol::new`] mints a fresh identity;
/// the description is purely diagnostic.
#[derive(Clone, Debug)]
pub struct JsSymbol(Arc<SymbolInner>);

impl JsSymbol {
    /// Mint a fresh symbol.
    pub fn new(description: Option<Atom>) -> Self {
        let id = NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed);
        Self(Arc::new(SymbolInner { id, description }))
    }

    /// The symbol's runtime-unique id.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    /// Optional description supplied at construction.
    pub fn description(&self) -> Option<&Atom> {
        self.0.description.as_ref()
    }
}

impl PartialEq for JsSymbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

// ==================== PropertyKey ====================

/// A property name: an interned string, a symbol, or a dense-element index.
///
/// Integer-spelled strings are canonicalized to `Index` by
/// [`PropertyKey::from_atom`], mirroring how element accesses are routed to
/// dense storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// A named property.
    Atom(Atom),
    /// A symbol-keyed property.
    Symbol(JsSymbol),
    /// A dense-element index.
    Index(u32),
}

impl PropertyKey {
    /// Build a key from an atom, canonicalizing index-spelled names.
    pub fn from_atom(atom: Atom) -> Self {
        match atom.as_element_index() {
            Some(index) => PropertyKey::Index(index),
            None => PropertyKey::Atom(atom),
        }
    }

    /// True for `Index` keys.
    #[inline]
    pub fn is_index(&self) -> bool {
        matches!(self, PropertyKey::Index(_))
    }

    /// The index payload, if this is an element key.
    #[inline]
    pub fn as_index(&self) -> Option<u32> {
        match self {
            PropertyKey::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// The atom payload, if this is a named key.
    #[inline]
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            PropertyKey::Atom(a) => Some(a),
            _ => None,
        }
    }

    /// Identity bits for dedup keys: discriminant in the top bits, payload
    /// identity in the rest.
    pub fn identity_bits(&self) -> u64 {
        match self {
            PropertyKey::Atom(a) => (1u64 << 62) | (a.identity() as u64 & ((1u64 << 62) - 1)),
            PropertyKey::Symbol(s) => (2u64 << 62) | (s.id() & ((1u64 << 62) - 1)),
            PropertyKey::Index(i) => (3u64 << 62) | u64::from(*i),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Atom(a) => write!(f, "{a}"),
            PropertyKey::Symbol(s) => match s.description() {
                Some(d) => write!(f, "Symbol({d})"),
                None => write!(f, "Symbol()"),
            },
            PropertyKey::Index(i) => write!(f, "{i}"),
        }
    }
}

// ==================== Tests ====================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_identity() {
        let table = AtomTable::new();
        let a = table.intern("length");
        let b = table.intern("length");
        let c = table.intern("name");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.identity(), b.identity());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_atoms_from_different_tables_differ() {
        let t1 = AtomTable::new();
        let t2 = AtomTable::new();
        let a = t1.intern("x");
        let b = t2.intern("x");
        assert_ne!(a, b);
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_element_index_canonicalization() {
        let table = AtomTable::new();
        assert_eq!(table.intern("0").as_element_index(), Some(0));
        assert_eq!(table.intern("42").as_element_index(), Some(42));
        assert_eq!(table.intern("007").as_element_index(), None);
        assert_eq!(table.intern("-1").as_element_index(), None);
        assert_eq!(table.intern("4294967295").as_element_index(), None);
        assert_eq!(table.intern("length").as_element_index(), None);

        let key = PropertyKey::from_atom(table.intern("7"));
        assert_eq!(key, PropertyKey::Index(7));
    }

    #[test]
    fn test_symbol_identity() {
        let table = AtomTable::new();
        let desc = table.intern("iterator");
        let s1 = JsSymbol::new(Some(desc.clone()));
        let s2 = JsSymbol::new(Some(desc));
        assert_ne!(s1, s2);
        assert_eq!(s1, s1.clone());
        assert_ne!(s1.id(), s2.id());
    }

    #[test]
    fn test_identity_bits_disjoint() {
        let table = AtomTable::new();
        let key_atom = PropertyKey::Atom(table.intern("x"));
        let key_sym = PropertyKey::Symbol(JsSymbol::new(None));
        let key_idx = PropertyKey::Index(3);
        assert_ne!(key_atom.identity_bits(), key_sym.identity_bits());
        assert_ne!(key_atom.identity_bits(), key_idx.identity_bits());
        assert_ne!(key_sym.identity_bits(), key_idx.identity_bits());
    }
}
