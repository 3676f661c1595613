use std::collections::HashMap;

use crate::node::Node;

/// Table of user-defined functions: a name mapped to the ordered body
/// expressions that followed it in `[define NAME ...]`.
#[derive(Debug, Clone, Default)]
pub struct Defs {
    entries: HashMap<String, Vec<Node>>,
}

impl Defs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a definition, replacing any previous entry under the name.
    pub fn insert(&mut self, name: String, body: Vec<Node>) {
        self.entries.insert(name, body);
    }

    /// Looks up the stored body by reference. Callers that intend to evaluate
    /// it must copy first, in case the body redefines its own function.
    pub fn get(&self, name: &str) -> Option<&[Node]> {
        self.entries.get(name).map(Vec::as_slice)
    }
}
