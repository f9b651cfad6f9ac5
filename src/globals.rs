use rustc_hash::FxHashMap;

use crate::{bytecode::Bytecode, symbol::Symbol};

/// Handle to a slot in [`Globals`]. Handles stay valid for the table's
/// lifetime; the unit behind one may be replaced by a later definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalId(usize);

#[derive(Debug)]
struct Entry {
    name: Symbol,
    unit: Option<Bytecode>,
}

/// Owner of every compiled top-level function.
///
/// The compiler resolves names to [`GlobalId`]s through this table and the
/// VM looks the ids back up when a call executes. A name can be declared
/// before its body is compiled so recursive and forward references resolve.
#[derive(Debug, Default)]
pub struct Globals {
    ids: FxHashMap<Symbol, GlobalId>,
    entries: Vec<Entry>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves a slot for `name`, or returns the existing one.
    ///
    /// A retracted name gets its old slot back, so units compiled against
    /// it pick up the eventual definition.
    pub fn declare(&mut self, name: &Symbol) -> GlobalId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = match self.entries.iter().position(|entry| &entry.name == name) {
            Some(index) => GlobalId(index),
            None => {
                self.entries.push(Entry {
                    name: name.clone(),
                    unit: None,
                });
                GlobalId(self.entries.len() - 1)
            }
        };
        self.ids.insert(name.clone(), id);
        id
    }

    /// Stores `unit` under `name`, replacing any earlier definition.
    pub fn define(&mut self, name: &Symbol, unit: Bytecode) -> GlobalId {
        let id = self.declare(name);
        self.entries[id.0].unit = Some(unit);
        id
    }

    /// Stops `name` from resolving if it was declared but never defined.
    /// Returns whether anything was retracted.
    pub fn retract(&mut self, name: &Symbol) -> bool {
        let undefined = self
            .ids
            .get(name)
            .and_then(|id| self.entries.get(id.0))
            .is_some_and(|entry| entry.unit.is_none());
        if undefined {
            self.ids.remove(name);
        }
        undefined
    }

    pub fn resolve(&self, name: &Symbol) -> Option<GlobalId> {
        self.ids.get(name).copied()
    }

    /// The compiled unit behind `id`, if its definition has finished compiling.
    pub fn get(&self, id: GlobalId) -> Option<&Bytecode> {
        self.entries.get(id.0)?.unit.as_ref()
    }

    /// Looks a global up by spelling rather than by symbol.
    pub fn find(&self, name: &str) -> Option<GlobalId> {
        self.ids
            .iter()
            .find(|(symbol, _)| symbol.name() == name)
            .map(|(_, id)| *id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
