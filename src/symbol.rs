use std::{
    fmt::{Debug, Display},
    hash::{Hash, Hasher},
    rc::Rc,
};

use rustc_hash::FxHashSet;

/// Canonical handle for an identifier spelling.
///
/// Two symbols compare equal only when they were handed out by the same
/// [`Interner`] for the same spelling. Comparison and hashing look at the
/// address of the shared spelling, never at its characters.
#[derive(Clone)]
pub struct Symbol(Rc<str>);

impl Symbol {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Rc::as_ptr(&self.0) as *const u8 as usize).hash(state);
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{}", self.0)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct Interner {
    spellings: FxHashSet<Rc<str>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(existing) = self.spellings.get(text) {
            return Symbol(existing.clone());
        }
        let spelling: Rc<str> = Rc::from(text);
        self.spellings.insert(spelling.clone());
        Symbol(spelling)
    }

    pub fn len(&self) -> usize {
        self.spellings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spellings.is_empty()
    }
}
