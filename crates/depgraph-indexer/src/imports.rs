//! Per-file import table: local alias to imported module and member.

use std::collections::HashMap;

use depgraph_core::module_id::node_id;

/// What a local name was bound to by an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Module id of the source module.
    pub module: String,
    /// Imported member, or `None` when the alias names the module itself.
    pub member: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    entries: HashMap<String, ImportEntry>,
}

impl ImportTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `alias` (possibly dotted, as in `import a.b`) to a module.
    pub fn bind_module(&mut self, alias: impl Into<String>, module: impl Into<String>) {
        self.entries.insert(
            alias.into(),
            ImportEntry {
                module: module.into(),
                member: None,
            },
        );
    }

    /// Bind `alias` to `member` of a module.
    pub fn bind_member(
        &mut self,
        alias: impl Into<String>,
        module: impl Into<String>,
        member: impl Into<String>,
    ) {
        self.entries.insert(
            alias.into(),
            ImportEntry {
                module: module.into(),
                member: Some(member.into()),
            },
        );
    }

    pub fn get(&self, alias: &str) -> Option<&ImportEntry> {
        self.entries.get(alias)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a dotted reference through the table.
    ///
    /// The longest bound dotted prefix wins. Returns `None` when no prefix is
    /// bound or when the unmatched remainder contains a computed access.
    pub fn resolve(&self, raw: &str) -> Option<String> {
        let segments: Vec<&str> = raw.split('.').collect();
        for split in (1..=segments.len()).rev() {
            let alias = segments[..split].join(".");
            let Some(entry) = self.entries.get(&alias) else {
                continue;
            };
            let remainder = segments[split..].join(".");
            if remainder.contains('[') {
                return None;
            }
            let symbol = match (&entry.member, remainder.is_empty()) {
                (Some(member), true) => Some(member.clone()),
                (Some(member), false) => Some(format!("{}.{}", member, remainder)),
                (None, true) => None,
                (None, false) => Some(remainder),
            };
            return Some(node_id(&entry.module, symbol.as_deref()));
        }
        None
    }
}
