//! tauschema-compiler
//!
//! This crate implements:
//!  1) A line grammar and tree builder for `.tsch` schema files, with
//!     scoped names, derivation, type aliasing and `$include`,
//!  2) A validator that checks (and repairs) untrusted data against a schema,
//!  3) A flattener laying the tree out as linked rows,
//!  4) `compile_rows` / `decode_compiled` for the binary TLV table,
//!  5) The `SchemaError` type, and the `Schema` facade tying it together.

pub mod error;
pub mod types;
pub mod utils;
pub mod parser;
pub mod builder;
pub mod validator;
pub mod flatten;
pub mod compiler;

pub use builder::TreeBuilder;
pub use compiler::{compile_rows, decode_compiled, CompileOptions, CompiledSchema, DecodedRow};
pub use error::SchemaError;
pub use flatten::{flatten, FlatRow, TERMINAL};
pub use types::{NodeId, SchemaNode, SchemaTree, Scope, ScopeId};
pub use validator::{validate, ValidateOptions, Validation, Verdict};

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use tauschema_codec::Value;

/// A built schema with its flattened rows and compiled forms cached.
///
/// ```
/// use tauschema_compiler::{CompileOptions, Schema, ValidateOptions, Verdict};
/// use tauschema_codec::Value;
///
/// let schema = Schema::parse("point : COLLECTION = 1\n  x : SINT = 1\nEND\n").unwrap();
/// let data = Value::from(serde_json::json!({"point": {"x": -3}}));
/// let result = schema.validate(&data, &ValidateOptions::default()).unwrap();
/// assert_eq!(result.verdict, Verdict::Trusted);
/// assert_eq!(schema.flatten().len(), 3);
/// assert_eq!(*schema.compile(CompileOptions::default()).bytes.last().unwrap(), 7);
/// ```
#[derive(Debug)]
pub struct Schema {
    tree:     SchemaTree,
    rows:     OnceCell<Vec<FlatRow>>,
    compiled: RefCell<HashMap<CompileOptions, Rc<CompiledSchema>>>,
}

impl Schema {
    fn new(tree: SchemaTree) -> Schema {
        Schema {
            tree,
            rows: OnceCell::new(),
            compiled: RefCell::new(HashMap::new()),
        }
    }

    /// Load a schema file and everything it includes.
    pub fn load(path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
        Schema::load_with(path.as_ref(), false)
    }

    /// Like `load`, but scopes left open at the end of a file are an error.
    pub fn load_strict(path: impl AsRef<Path>) -> Result<Schema, SchemaError> {
        Schema::load_with(path.as_ref(), true)
    }

    fn load_with(path: &Path, strict: bool) -> Result<Schema, SchemaError> {
        let mut tree = SchemaTree::new();
        TreeBuilder::new(&mut tree).strict(strict).load(path)?;
        Ok(Schema::new(tree))
    }

    /// Build from schema text.
    pub fn parse(text: &str) -> Result<Schema, SchemaError> {
        let mut tree = SchemaTree::new();
        TreeBuilder::new(&mut tree).parse_str(text)?;
        Ok(Schema::new(tree))
    }

    pub fn tree(&self) -> &SchemaTree {
        &self.tree
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    /// Validate `data` in place. See [`validate`].
    pub fn validate(&self, data: &Value, opts: &ValidateOptions) -> Result<Validation, SchemaError> {
        validate(&self.tree, self.root(), data, opts)
    }

    /// Flattened rows, computed on first use.
    pub fn flatten(&self) -> &[FlatRow] {
        self.rows.get_or_init(|| flatten(&self.tree, self.root()))
    }

    /// Compiled table for `opts`, computed once per option set.
    pub fn compile(&self, opts: CompileOptions) -> Rc<CompiledSchema> {
        if let Some(compiled) = self.compiled.borrow().get(&opts) {
            return Rc::clone(compiled);
        }
        let compiled = Rc::new(compile_rows(self.flatten(), opts));
        self.compiled.borrow_mut().insert(opts, Rc::clone(&compiled));
        compiled
    }
}
