use crate::{
    error::SchemaError,
    parser::{parse_line, ItemLine, Line},
    types::{NodeId, SchemaTree},
    utils::quote,
};
use std::fs;
use std::mem;
use std::path::{Path, PathBuf};
use tauschema_codec::TypeCode;
use tracing::{debug, warn};

/// How the type part of an item line resolved.
enum Resolved {
    /// COLLECTION or VARIADIC, opens a scope.
    Composite(TypeCode),
    Primitive(TypeCode),
    /// Scoped type; the walked nodes, the last one is the type.
    Reference(Vec<NodeId>),
}

/// Turns schema source lines into a `SchemaTree`.
///
/// The builder keeps the open scope stack and the item that trailing
/// comment lines are appended to. Included files are built by a nested
/// builder under an isolated root in the same arena, then merged into the
/// scope that was open at the `$include` line.
pub struct TreeBuilder<'t> {
    tree:       &'t mut SchemaTree,
    root:       NodeId,
    scopes:     Vec<NodeId>,
    current:    Option<NodeId>,
    /// Absolute paths of files being loaded, shared along the include chain.
    open_files: Vec<PathBuf>,
    base_dir:   Option<PathBuf>,
    file:       String,
    line:       usize,
    strict:     bool,
}

impl<'t> TreeBuilder<'t> {
    pub fn new(tree: &'t mut SchemaTree) -> TreeBuilder<'t> {
        let root = tree.root();
        TreeBuilder::with_root(tree, root)
    }

    /// Builder that adds declarations under `root` instead of the tree root.
    pub fn with_root(tree: &'t mut SchemaTree, root: NodeId) -> TreeBuilder<'t> {
        TreeBuilder {
            tree,
            root,
            scopes:     Vec::new(),
            current:    None,
            open_files: Vec::new(),
            base_dir:   None,
            file:       "<text>".to_string(),
            line:       0,
            strict:     false,
        }
    }

    /// Reject scopes left open at the end of a file.
    pub fn strict(mut self, strict: bool) -> TreeBuilder<'t> {
        self.strict = strict;
        self
    }

    pub fn tree(&self) -> &SchemaTree {
        self.tree
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of scopes currently open.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// The item trailing comment lines are currently appended to.
    pub fn current_item(&self) -> Option<NodeId> {
        self.current
    }

    fn grammar(&self, msg: impl Into<String>) -> SchemaError {
        SchemaError::Grammar {
            msg:  msg.into(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    fn resolution(&self, msg: impl Into<String>) -> SchemaError {
        SchemaError::Resolution {
            msg:  msg.into(),
            file: self.file.clone(),
            line: self.line,
        }
    }

    /// Node whose scope receives new items.
    fn scope_node(&self) -> NodeId {
        self.scopes.last().copied().unwrap_or(self.root)
    }

    /// Process one physical line of schema source.
    pub fn add_line(&mut self, text: &str) -> Result<(), SchemaError> {
        self.line += 1;
        let line = parse_line(text).map_err(|e| self.grammar(e.0))?;
        match line {
            Line::Blank => self.close_item(),
            Line::Comment(comment) => {
                if let Some(current) = self.current {
                    let desc = &mut self.tree.node_mut(current).description;
                    desc.push('\n');
                    desc.push_str(&comment);
                }
            }
            Line::Include(paths) => {
                self.close_item();
                for path in paths {
                    self.include(&path)?;
                }
            }
            Line::End(name) => {
                self.close_item();
                self.end_scope(name.as_deref())?;
            }
            Line::Item(item) => {
                self.close_item();
                self.add_item(item)?;
            }
        }
        Ok(())
    }

    /// Build from in-memory text. Includes resolve against the current
    /// directory.
    pub fn parse_str(&mut self, text: &str) -> Result<(), SchemaError> {
        for line in text.lines() {
            self.add_line(line)?;
        }
        self.finish()
    }

    /// Load a schema file, following `$include` lines.
    pub fn load(&mut self, path: &Path) -> Result<(), SchemaError> {
        let apath = self.open_path(path)?;
        self.load_absolute(apath)
    }

    /// Closes the pending item and checks the scope stack.
    pub fn finish(&mut self) -> Result<(), SchemaError> {
        self.close_item();
        if let Some(&open) = self.scopes.last() {
            let name = &self.tree.node(open).name;
            if self.strict {
                return Err(self.resolution(format!("scope {} is not closed with END", quote(name))));
            }
            warn!(file = %self.file, scope = %name, "scope is not closed with END");
        }
        Ok(())
    }

    /// Canonical path of a file about to be opened, rejecting files already
    /// open further up the include chain.
    fn open_path(&self, path: &Path) -> Result<PathBuf, SchemaError> {
        let apath = fs::canonicalize(path).map_err(|source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if self.open_files.contains(&apath) {
            return Err(SchemaError::CircularInclude {
                path: apath,
                file: self.file.clone(),
                line: self.line,
            });
        }
        Ok(apath)
    }

    fn load_absolute(&mut self, apath: PathBuf) -> Result<(), SchemaError> {
        let text = fs::read_to_string(&apath).map_err(|source| SchemaError::Io {
            path: apath.clone(),
            source,
        })?;
        debug!(file = %apath.display(), "loading schema");

        let saved = (
            mem::replace(&mut self.file, apath.display().to_string()),
            mem::replace(&mut self.line, 0),
            mem::replace(&mut self.base_dir, apath.parent().map(Path::to_path_buf)),
        );
        self.open_files.push(apath);

        let result = self.parse_str(&text);

        self.open_files.pop();
        (self.file, self.line, self.base_dir) = saved;
        result
    }

    fn include(&mut self, path: &str) -> Result<(), SchemaError> {
        let mut full = PathBuf::from(path);
        if full.is_relative() {
            if let Some(dir) = &self.base_dir {
                full = dir.join(full);
            }
        }
        let apath = self.open_path(&full)?;
        debug!(file = %self.file, line = self.line, include = %apath.display(), "including schema");

        let sub_root = self.tree.new_root();
        let mut sub = TreeBuilder::with_root(&mut *self.tree, sub_root);
        sub.strict = self.strict;
        sub.open_files = mem::take(&mut self.open_files);
        let result = sub.load_absolute(apath);
        self.open_files = mem::take(&mut sub.open_files);
        result?;

        self.merge(sub_root)
    }

    /// Moves the top-level items under `from` into the current scope.
    fn merge(&mut self, from: NodeId) -> Result<(), SchemaError> {
        let target = self.tree.node(self.scope_node()).children;
        let incoming: Vec<NodeId> = self.tree.children(from).collect();
        for child in incoming {
            let node = self.tree.node(child);
            if self.tree.scope(target).contains(&node.name) {
                return Err(self.resolution(format!(
                    "included name {} is not unique",
                    quote(&node.name)
                )));
            }
            if let Some(other) = self.tree.find_tag(target, node.tag) {
                return Err(self.resolution(format!(
                    "included instance {} of {} is already used by {}",
                    node.tag,
                    quote(&node.name),
                    quote(&self.tree.node(other).name)
                )));
            }
            self.tree.attach(target, child);
        }
        Ok(())
    }

    /// Last chance to default the description of the pending item.
    fn close_item(&mut self) {
        if let Some(current) = self.current.take() {
            let node = self.tree.node(current);
            if node.description.is_empty() {
                if let Some(derived) = node.derived_from {
                    let desc = self.tree.node(derived).description.clone();
                    self.tree.node_mut(current).description = desc;
                }
            }
        }
    }

    fn end_scope(&mut self, name: Option<&str>) -> Result<(), SchemaError> {
        let Some(&open) = self.scopes.last() else {
            return Err(self.resolution("unmatched END"));
        };
        if let Some(name) = name {
            let scope_name = &self.tree.node(open).name;
            if scope_name != name {
                return Err(self.resolution(format!(
                    "unmatched end of current scope {}, got {}",
                    quote(scope_name),
                    quote(name)
                )));
            }
        }
        self.scopes.pop();
        Ok(())
    }

    /// Walks `path` from the root. A leading empty segment marks an absolute
    /// path and is skipped; empty segments anywhere else are errors.
    fn resolve_path(&self, path: &[String], what: &str) -> Result<Vec<NodeId>, SchemaError> {
        let mut at = self.root;
        let mut walked = Vec::with_capacity(path.len());
        for (i, segment) in path.iter().enumerate() {
            if segment.is_empty() {
                if i == 0 {
                    continue;
                }
                return Err(self.grammar(format!("name space {} must have a name", what)));
            }
            at = self
                .tree
                .child(at, segment)
                .ok_or_else(|| self.resolution(format!("{} {} not found", what, quote(segment))))?;
            walked.push(at);
        }
        if walked.is_empty() {
            return Err(self.grammar(format!("empty {} path", what)));
        }
        Ok(walked)
    }

    /// Derived items arrive here with their name path as type path, so an
    /// empty path always means the type was left out.
    fn resolve_type(&self, type_path: &[String]) -> Result<Resolved, SchemaError> {
        let keyword = |family: fn(TypeCode) -> bool| {
            type_path
                .iter()
                .find_map(|t| TypeCode::from_keyword(t).filter(|&c| family(c)))
        };

        if let Some(code) = keyword(TypeCode::is_composite) {
            if type_path.len() > 1 {
                return Err(self.grammar("name space of types not allowed with complex types"));
            }
            return Ok(Resolved::Composite(code));
        }
        if type_path.is_empty() {
            return Err(self.resolution("type must be specified"));
        }
        if let Some(code) = keyword(TypeCode::is_primitive) {
            if type_path.len() > 1 {
                return Err(self.grammar("name space of types not allowed with primitives"));
            }
            return Ok(Resolved::Primitive(code));
        }
        self.resolve_path(type_path, "type").map(Resolved::Reference)
    }

    fn add_item(&mut self, item: ItemLine) -> Result<(), SchemaError> {
        let scope = self.tree.node(self.scope_node()).children;

        let mut type_path = item.type_path.clone();
        let derived = if item.is_derived() {
            let walked = self.resolve_path(&item.name, "name")?;
            if type_path.is_empty() {
                type_path = item.name.clone();
            }
            walked.last().copied()
        } else {
            None
        };

        let name = item.leaf().to_string();
        if self.tree.scope(scope).contains(&name) {
            return Err(self.resolution(format!("name {} is not unique", quote(&name))));
        }

        let tag = match item.instance {
            Some(n) => n,
            None => derived.map_or(0, |d| self.tree.node(d).tag),
        };
        if let Some(other) = self.tree.find_tag(scope, tag) {
            return Err(self.resolution(format!(
                "the instance {} is not unique in scope, used by {}",
                tag,
                quote(&self.tree.node(other).name)
            )));
        }

        let resolved = self.resolve_type(&type_path)?;

        let id = self.tree.alloc(name);
        let (declared_type, type_reference, children) = match &resolved {
            Resolved::Composite(code) => (*code, Vec::new(), None),
            Resolved::Primitive(code) => (*code, Vec::new(), None),
            Resolved::Reference(walked) => {
                let target = self.tree.node(walked[walked.len() - 1]);
                (target.declared_type, walked.clone(), Some(target.children))
            }
        };

        let node = self.tree.node_mut(id);
        node.tag = tag;
        node.derived_from = derived;
        node.description = item.description.unwrap_or_default();
        node.declared_type = declared_type;
        node.type_reference = type_reference;
        if let Some(children) = children {
            node.children = children;
        }

        self.tree.attach(scope, id);
        if let Resolved::Composite(_) = resolved {
            self.scopes.push(id);
        }
        self.current = Some(id);
        Ok(())
    }
}
