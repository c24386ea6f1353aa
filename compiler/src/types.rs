use serde::Serialize;
use std::collections::HashMap;
use tauschema_codec::TypeCode;

/// Stable index of a node in a `SchemaTree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

/// Stable index of a scope (a set of named children) in a `SchemaTree`.
///
/// Nodes typed by reference to another node share that node's `ScopeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ScopeId(pub usize);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaNode {
    pub name:           String,
    pub declared_type:  TypeCode,
    /// Nodes walked when resolving a scoped type, last one is the type itself.
    pub type_reference: Vec<NodeId>,
    /// Wire number, 0 for a pure type.
    pub tag:            u64,
    pub description:    String,
    pub derived_from:   Option<NodeId>,
    pub children:       ScopeId,
}

/// Children of a node in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    order:   Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Arena holding every node and scope built from one schema source.
#[derive(Debug, Clone, Default)]
pub struct SchemaTree {
    nodes:  Vec<SchemaNode>,
    scopes: Vec<Scope>,
}

impl SchemaTree {
    /// Creates a tree with a single root node at `NodeId(0)`.
    pub fn new() -> SchemaTree {
        let mut tree = SchemaTree::default();
        tree.new_root();
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Adds a detached, untyped and untagged node with an empty scope.
    pub fn new_root(&mut self) -> NodeId {
        self.alloc(String::new())
    }

    pub(crate) fn alloc(&mut self, name: String) -> NodeId {
        let children = ScopeId(self.scopes.len());
        self.scopes.push(Scope::default());
        let id = NodeId(self.nodes.len());
        self.nodes.push(SchemaNode {
            name,
            declared_type:  TypeCode::None,
            type_reference: Vec::new(),
            tag:            0,
            description:    String::new(),
            derived_from:   None,
            children,
        });
        id
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut SchemaNode {
        &mut self.nodes[id.0]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0]
    }

    /// Child of `parent` called `name`.
    pub fn child(&self, parent: NodeId, name: &str) -> Option<NodeId> {
        self.scope(self.node(parent).children).get(name)
    }

    /// Children of `parent` in declaration order.
    pub fn children(&self, parent: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.scope(self.node(parent).children).iter()
    }

    /// Child of `scope` carrying the positive `tag`.
    pub fn find_tag(&self, scope: ScopeId, tag: u64) -> Option<NodeId> {
        if tag == 0 {
            return None;
        }
        self.scope(scope).iter().find(|&id| self.node(id).tag == tag)
    }

    /// Appends `child` to `scope`. Uniqueness is the caller's business.
    pub(crate) fn attach(&mut self, scope: ScopeId, child: NodeId) {
        let name = self.nodes[child.0].name.clone();
        let scope = &mut self.scopes[scope.0];
        scope.order.push(child);
        scope.by_name.insert(name, child);
    }

    /// Resolves a dotted path of names starting at `from`.
    pub fn lookup(&self, from: NodeId, path: &[&str]) -> Option<NodeId> {
        path.iter().try_fold(from, |at, name| self.child(at, name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
