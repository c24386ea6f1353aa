use crate::types::{NodeId, SchemaTree, ScopeId};
use serde::Serialize;
use std::collections::HashMap;
use tauschema_codec::TypeCode;

/// `next` of the root row. Never a valid row index.
pub const TERMINAL: usize = usize::MAX;

/// One row of the flattened schema. `sub` and `next` are row indices, 0 when
/// there is no link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatRow {
    pub index:       usize,
    pub tag:         u64,
    pub name:        String,
    pub ntype:       TypeCode,
    pub description: String,
    pub sub:         usize,
    pub next:        usize,
}

/// Lays out every tagged node reachable from `root` as rows in depth-first
/// preorder. A scope shared by several nodes is emitted once; every node
/// aliasing it points its `sub` at the same first row.
pub fn flatten(tree: &SchemaTree, root: NodeId) -> Vec<FlatRow> {
    let node = tree.node(root);
    let mut flat = Flattener {
        tree,
        rows: vec![FlatRow {
            index:       0,
            tag:         0,
            name:        String::new(),
            ntype:       TypeCode::None,
            description: node.description.clone(),
            sub:         0,
            next:        TERMINAL,
        }],
        first_row: HashMap::new(),
    };
    let sub = flat.scan(node.children);
    flat.rows[0].sub = sub;
    flat.rows
}

struct Flattener<'a> {
    tree:      &'a SchemaTree,
    rows:      Vec<FlatRow>,
    /// First row of every scope seen so far, 0 while it has none.
    first_row: HashMap<ScopeId, usize>,
}

impl<'a> Flattener<'a> {
    fn scan(&mut self, scope: ScopeId) -> usize {
        if let Some(&first) = self.first_row.get(&scope) {
            return first;
        }
        self.first_row.insert(scope, 0);

        let tree = self.tree;
        let mut prev: Option<usize> = None;
        for id in tree.scope(scope).iter() {
            let node = tree.node(id);
            if node.tag == 0 {
                continue;
            }
            let index = self.rows.len();
            self.rows.push(FlatRow {
                index,
                tag: node.tag,
                name: node.name.clone(),
                ntype: node.declared_type,
                description: node.description.clone(),
                sub: 0,
                next: 0,
            });
            match prev {
                // recorded before descending, so a recursive alias finds it
                None => {
                    self.first_row.insert(scope, index);
                }
                Some(p) => self.rows[p].next = index,
            }
            prev = Some(index);

            let sub = self.scan(node.children);
            self.rows[index].sub = sub;
        }
        self.first_row.get(&scope).copied().unwrap_or(0)
    }
}
