//! String interning for object type and field names.
//!
//! Object types and field names are interned as keywords so that alpha
//! constraints, join keys, and fact field maps compare integers instead of
//! strings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interned keyword identifier.
///
/// Keywords name object types (`:person`) and fields (`:age`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeywordId(pub(crate) u32);

impl KeywordId {
    /// Returns the raw index of this keyword.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    // =========================================================================
    // Reserved Keywords
    // =========================================================================
    // These are always interned at startup with fixed indices.

    /// Reserved object type of the root fact feeding rules that start with
    /// a negation, existential, or accumulation: `:thicket/initial-fact`
    pub const INITIAL_FACT: KeywordId = KeywordId(0);

    /// Reserved field name for single-valued facts: `:value`
    pub const VALUE: KeywordId = KeywordId(1);
}

impl fmt::Debug for KeywordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeywordId({})", self.0)
    }
}

/// Interner for keywords.
///
/// This is a simple interner that maps strings to unique IDs and back.
/// It is not thread-safe; a session owns its own copy.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Interner {
    /// Keyword storage, indexed by `KeywordId`.
    keywords: Vec<Arc<str>>,
    /// Map from keyword string to `KeywordId`.
    keyword_map: HashMap<Arc<str>, KeywordId>,
}

impl Interner {
    /// Reserved keywords that are pre-interned at startup.
    const RESERVED_KEYWORDS: &'static [&'static str] = &[
        "thicket/initial-fact", // KeywordId(0) = INITIAL_FACT
        "value",                // KeywordId(1) = VALUE
    ];

    /// Creates a new interner with reserved keywords pre-interned.
    #[must_use]
    pub fn new() -> Self {
        let mut interner = Self::default();

        for (i, &kw) in Self::RESERVED_KEYWORDS.iter().enumerate() {
            let id = interner.intern_keyword(kw);
            debug_assert_eq!(
                id.0 as usize, i,
                "Reserved keyword '{}' should have index {}, got {}",
                kw, i, id.0
            );
        }

        interner
    }

    /// Interns a keyword, returning its [`KeywordId`].
    ///
    /// The string should NOT include the leading `:`.
    ///
    /// # Panics
    ///
    /// Panics if the number of interned keywords exceeds `u32::MAX`.
    pub fn intern_keyword(&mut self, s: &str) -> KeywordId {
        if let Some(&id) = self.keyword_map.get(s) {
            return id;
        }

        let idx = u32::try_from(self.keywords.len()).expect("too many keywords");
        let arc: Arc<str> = s.into();
        self.keywords.push(arc.clone());

        let id = KeywordId(idx);
        self.keyword_map.insert(arc, id);
        id
    }

    /// Looks up a keyword without interning it.
    #[must_use]
    pub fn lookup_keyword(&self, s: &str) -> Option<KeywordId> {
        self.keyword_map.get(s).copied()
    }

    /// Gets the string for a keyword (without the leading `:`).
    #[must_use]
    pub fn get_keyword(&self, id: KeywordId) -> Option<&str> {
        self.keywords.get(id.0 as usize).map(AsRef::as_ref)
    }

    /// Returns the number of interned keywords.
    #[must_use]
    pub fn keyword_count(&self) -> usize {
        self.keywords.len()
    }

    /// Returns true if every keyword of `base` has the same id here.
    ///
    /// A session interner extends its rule base's interner; a restored
    /// session needs that to still hold.
    #[must_use]
    pub fn extends(&self, base: &Interner) -> bool {
        self.keywords.len() >= base.keywords.len()
            && self.keywords.iter().zip(&base.keywords).all(|(a, b)| a == b)
    }
}
