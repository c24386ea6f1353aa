use crate::{
    error::SchemaError,
    types::{NodeId, SchemaTree, ScopeId},
    utils::{quote, render_path},
};
use serde::Serialize;
use std::collections::HashSet;
use tauschema_codec::{ListRef, MapRef, TypeCode, Value};
use tracing::warn;

const CIRCULAR: &str = "circular reference, branch abandoned";
const TOO_DEEP: &str = "nesting too deep, branch abandoned";

type Identity = Option<*const ()>;

/// Outcome of validating untrusted data against a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    /// Nothing had to be changed.
    Trusted,
    /// Invalid entries were removed; the data is now consistent with the schema.
    Repaired,
    /// Not a mapping, or self-referential: nothing could be done safely.
    Distrusted,
}

impl Verdict {
    /// Integer form: 1, -1 and 0.
    pub fn code(self) -> i8 {
        match self {
            Verdict::Trusted => 1,
            Verdict::Repaired => -1,
            Verdict::Distrusted => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ValidateOptions {
    /// Fail on the first defect instead of repairing.
    pub throw:     bool,
    /// Collect diagnostics.
    pub report:    bool,
    /// Deepest container nesting followed before giving up.
    pub max_depth: usize,
}

impl Default for ValidateOptions {
    fn default() -> Self {
        ValidateOptions {
            throw:     false,
            report:    false,
            max_depth: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub verdict:     Verdict,
    pub diagnostics: Vec<String>,
}

/// Check `data` against the scope of `root`, removing what does not fit.
pub fn validate(
    tree: &SchemaTree,
    root: NodeId,
    data: &Value,
    opts: &ValidateOptions,
) -> Result<Validation, SchemaError> {
    let Value::Map(map) = data else {
        return Ok(Validation {
            verdict:     Verdict::Distrusted,
            diagnostics: if opts.report {
                vec![format!("root is a {}, not a mapping", data.kind())]
            } else {
                Vec::new()
            },
        });
    };

    let mut v = Validator {
        tree,
        opts,
        active: Vec::new(),
        location: Vec::new(),
        repaired: false,
        distrusted: false,
        diagnostics: Vec::new(),
    };

    v.active.push(data.identity());
    if map.borrow().len() > 1 {
        v.defect("more than one item in the root scope")?;
    }
    v.check_map(tree.node(root).children, map)?;

    let verdict = if v.distrusted {
        Verdict::Distrusted
    } else if v.repaired {
        Verdict::Repaired
    } else {
        Verdict::Trusted
    };
    Ok(Validation {
        verdict,
        diagnostics: v.diagnostics,
    })
}

struct Validator<'a> {
    tree:        &'a SchemaTree,
    opts:        &'a ValidateOptions,
    /// Identities of the containers on the current recursion path.
    active:      Vec<Identity>,
    location:    Vec<String>,
    repaired:    bool,
    distrusted:  bool,
    diagnostics: Vec<String>,
}

impl<'a> Validator<'a> {
    fn note(&mut self, msg: &str) {
        if self.opts.report {
            let path = render_path(&self.location);
            warn!(path = %path, "{}", msg);
            self.diagnostics.push(format!("{}: {}", path, msg));
        }
    }

    /// Records a repairable defect, or fails when throwing.
    fn defect(&mut self, msg: &str) -> Result<(), SchemaError> {
        if self.opts.throw {
            return Err(SchemaError::Validation {
                path: render_path(&self.location),
                msg:  msg.to_string(),
            });
        }
        self.repaired = true;
        self.note(msg);
        Ok(())
    }

    /// Pushes a container onto the recursion path. Returns false, and marks
    /// the data as distrusted, when it is already there or too deep.
    fn enter(&mut self, value: &Value) -> bool {
        if self.on_path(value) {
            return false;
        }
        if self.active.len() >= self.opts.max_depth {
            self.abandon(TOO_DEEP);
            return false;
        }
        self.active.push(value.identity());
        true
    }

    fn abandon(&mut self, msg: &str) {
        self.distrusted = true;
        self.note(msg);
    }

    /// True, and the data distrusted, when `value` is a container already on
    /// the recursion path.
    fn on_path(&mut self, value: &Value) -> bool {
        let id = value.identity();
        if id.is_some() && self.active.contains(&id) {
            self.abandon(CIRCULAR);
            return true;
        }
        false
    }

    /// Drops an invalid value unless it is entangled with the data: a value
    /// reaching the recursion path or itself is left alone and distrusted.
    fn reject(&mut self, value: &Value, msg: &str) -> Result<bool, SchemaError> {
        if let Some(reason) = self.entangled(value) {
            self.abandon(reason);
            return Ok(true);
        }
        self.defect(msg)?;
        Ok(false)
    }

    fn entangled(&self, value: &Value) -> Option<&'static str> {
        let mut path = self.active.clone();
        let mut done = HashSet::new();
        self.scan(value, &mut path, &mut done)
    }

    fn scan(&self, value: &Value, path: &mut Vec<Identity>, done: &mut HashSet<*const ()>) -> Option<&'static str> {
        let id = value.identity()?;
        if path.contains(&Some(id)) {
            return Some(CIRCULAR);
        }
        if done.contains(&id) {
            return None;
        }
        if path.len() >= self.opts.max_depth {
            return Some(TOO_DEEP);
        }
        let children: Vec<Value> = match value {
            Value::Map(map) => map.borrow().values().cloned().collect(),
            Value::List(list) => list.borrow().clone(),
            _ => Vec::new(),
        };
        path.push(Some(id));
        let found = children.iter().find_map(|child| self.scan(child, path, done));
        path.pop();
        done.insert(id);
        found
    }

    fn leave(&mut self) {
        self.active.pop();
    }

    /// Validates every key of `map`, removing the invalid ones.
    fn check_map(&mut self, scope: ScopeId, map: &MapRef) -> Result<(), SchemaError> {
        let keys: Vec<String> = map.borrow().keys().cloned().collect();
        for key in keys {
            let Some(value) = map.borrow().get(&key).cloned() else {
                continue;
            };
            if !self.check_key(scope, &key, &value)? {
                map.borrow_mut().remove(&key);
            }
        }
        Ok(())
    }

    /// Validates every element of a variadic sequence, dropping the invalid
    /// ones.
    fn check_list(&mut self, scope: ScopeId, list: &ListRef) -> Result<(), SchemaError> {
        let items: Vec<Value> = list.borrow().clone();
        let mut keep = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            self.location.push(format!("[{}]", i));
            let valid = self.check_element(scope, item);
            self.location.pop();
            keep.push(valid?);
        }
        let mut keep = keep.into_iter();
        list.borrow_mut().retain(|_| keep.next().unwrap_or(true));
        Ok(())
    }

    fn check_element(&mut self, scope: ScopeId, item: &Value) -> Result<bool, SchemaError> {
        if self.on_path(item) {
            return Ok(true);
        }
        match item {
            // flag-style presence
            Value::Text(name) => self.check_key(scope, name, &Value::Null),
            Value::Map(map) => {
                if !self.enter(item) {
                    return Ok(true);
                }
                let result = self.check_single(scope, map);
                self.leave();
                result
            }
            other => self.reject(other, &format!("{} is not a variadic element", other.kind())),
        }
    }

    /// A variadic mapping element carries exactly one key. The first valid
    /// key is kept, everything else is removed.
    fn check_single(&mut self, scope: ScopeId, map: &MapRef) -> Result<bool, SchemaError> {
        let keys: Vec<String> = map.borrow().keys().cloned().collect();
        if keys.len() > 1 {
            self.defect("more than one item in a variadic element")?;
        }
        let mut kept = false;
        for key in keys {
            let Some(value) = map.borrow().get(&key).cloned() else {
                continue;
            };
            let keep = if kept {
                self.location.push(key.clone());
                let reason = self.entangled(&value);
                if let Some(reason) = reason {
                    self.abandon(reason);
                }
                self.location.pop();
                reason.is_some()
            } else {
                kept = self.check_key(scope, &key, &value)?;
                kept
            };
            if !keep {
                map.borrow_mut().remove(&key);
            }
        }
        if !kept {
            self.defect("empty variadic element")?;
        }
        Ok(kept)
    }

    fn check_key(&mut self, scope: ScopeId, key: &str, value: &Value) -> Result<bool, SchemaError> {
        self.location.push(key.to_string());
        let result = self.check_key_inner(scope, key, value);
        self.location.pop();
        result
    }

    fn check_key_inner(&mut self, scope: ScopeId, key: &str, value: &Value) -> Result<bool, SchemaError> {
        if self.on_path(value) {
            return Ok(true);
        }
        let tree = self.tree;
        let node = match tree.scope(scope).get(key).map(|id| tree.node(id)) {
            Some(node) if node.tag > 0 => node,
            Some(_) => return self.reject(value, &format!("{} is a type, not an item", quote(key))),
            None => return self.reject(value, &format!("{} is not in the schema", quote(key))),
        };
        if value.is_null() {
            return Ok(true);
        }

        let declared = node.declared_type;
        let valid = match declared {
            TypeCode::Collection => match value {
                Value::Map(map) => {
                    if self.enter(value) {
                        let result = self.check_map(node.children, map);
                        self.leave();
                        result?;
                    }
                    true
                }
                _ => false,
            },
            TypeCode::Variadic => match value {
                Value::List(list) => {
                    if self.enter(value) {
                        let result = self.check_list(node.children, list);
                        self.leave();
                        result?;
                    }
                    true
                }
                _ => false,
            },
            TypeCode::Bool => matches!(value, Value::Bool(_)),
            t if t.is_signed() => integral(value).is_some(),
            t if t.is_unsigned() => integral(value).is_some_and(|non_negative| non_negative),
            t if t.is_float() => matches!(value, Value::Int(_) | Value::Float(_)),
            TypeCode::Utf8 => matches!(value, Value::Text(_)),
            TypeCode::Blob => matches!(value, Value::Blob(_) | Value::Text(_)),
            other => return self.reject(value, &format!("type {} is not implemented", quote(other.keyword()))),
        };
        if valid {
            Ok(true)
        } else {
            self.reject(value, &format!("{} is not a valid {}", value.kind(), declared))
        }
    }
}

/// `Some(non_negative)` when the value is a whole number.
fn integral(value: &Value) -> Option<bool> {
    match *value {
        Value::Int(i) => Some(i >= 0),
        Value::Float(f) if f.is_finite() && f.trunc() == f => Some(f >= 0.0),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TreeBuilder;
    use serde_json::json;

    const SCHEMA: &str = "
set : COLLECTION = 1
  parameters : COLLECTION = 1
    width : UINT = 1
    height : FLOAT = 2
    depth : SINT = 3
  END
END

bits : VARIADIC = 2
  allright : BOOL = 1
  another : BOOL = 2
  errors : BOOL = 3
  kind : UINT
END

circular : COLLECTION = 20
  before : UINT = 1
  after : UINT = 2
  circular : circular = 3
  varcirc : VARIADIC = 4
    circular : circular = 1
  END
END
";

    fn tree() -> SchemaTree {
        let mut tree = SchemaTree::new();
        TreeBuilder::new(&mut tree).parse_str(SCHEMA).unwrap();
        tree
    }

    fn run(tree: &SchemaTree, data: &Value) -> Verdict {
        let opts = ValidateOptions { report: true, ..Default::default() };
        validate(tree, tree.root(), data, &opts).unwrap().verdict
    }

    #[test]
    fn test_trusted_nested_collection() {
        let tree = tree();
        let data = Value::from(json!({"set": {"parameters": {"width": 2, "height": 2.1, "depth": -1}}}));
        assert_eq!(run(&tree, &data), Verdict::Trusted);
        assert_eq!(Verdict::Trusted.code(), 1);
    }

    #[test]
    fn test_unknown_key_removed() {
        let tree = tree();
        let data = Value::from(json!({"unknownkey": "x"}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert!(data.is_empty());
        assert_eq!(Verdict::Repaired.code(), -1);
    }

    #[test]
    fn test_non_mapping_root_untouched() {
        let tree = tree();
        let data = Value::from(json!([1, 2, 3]));
        assert_eq!(run(&tree, &data), Verdict::Distrusted);
        assert_eq!(data.to_json(), Some(json!([1, 2, 3])));
        assert_eq!(Verdict::Distrusted.code(), 0);
    }

    #[test]
    fn test_type_only_key_is_invalid() {
        let tree = tree();
        let data = Value::from(json!({"bits": ["allright", "kind"]}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert_eq!(data.to_json(), Some(json!({"bits": ["allright"]})));
    }

    #[test]
    fn test_variadic_elements() {
        let tree = tree();
        let data = Value::from(json!({"bits": ["allright", {"another": true}]}));
        assert_eq!(run(&tree, &data), Verdict::Trusted);

        let data = Value::from(json!({"bits": ["allright", 1, [true], {"another": 3}, "notright"]}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert_eq!(data.to_json(), Some(json!({"bits": ["allright"]})));
    }

    #[test]
    fn test_variadic_element_with_two_keys() {
        let tree = tree();
        let data = Value::from(json!({"bits": ["allright", {"another": true, "errors": false}]}));
        let opts = ValidateOptions { report: true, ..Default::default() };
        let result = validate(&tree, tree.root(), &data, &opts).unwrap();
        assert_eq!(result.verdict, Verdict::Repaired);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.diagnostics[0].contains("more than one item in a variadic element"));
        assert_eq!(data.to_json(), Some(json!({"bits": ["allright", {"another": true}]})));
        assert_eq!(run(&tree, &data), Verdict::Trusted);
    }

    #[test]
    fn test_wrong_container_kind() {
        let tree = tree();
        let data = Value::from(json!({"bits": {"allright": true}}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert!(data.is_empty());

        let data = Value::from(json!({"set": ["notexist"]}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert!(data.is_empty());
    }

    #[test]
    fn test_null_is_a_request_marker() {
        let tree = tree();
        let data = Value::from(json!({"set": {"parameters": null}}));
        assert_eq!(run(&tree, &data), Verdict::Trusted);
    }

    #[test]
    fn test_two_root_keys() {
        let tree = tree();
        let data = Value::from(json!({"set": {}, "bits": []}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert_eq!(data.len(), 2);
    }

    #[test]
    fn test_throw_stops_at_first_defect() {
        let tree = tree();
        let data = Value::from(json!({"set": {"parameters": {"width": -4, "bogus": 1}}}));
        let opts = ValidateOptions { throw: true, ..Default::default() };
        let err = validate(&tree, tree.root(), &data, &opts).unwrap_err();
        match err {
            SchemaError::Validation { path, msg } => {
                assert_eq!(path, "set.parameters.bogus");
                assert!(!msg.is_empty());
            }
            other => panic!("unexpected error {:?}", other),
        }
        // nothing was removed
        assert_eq!(data.get("set").unwrap().get("parameters").unwrap().len(), 2);
    }

    #[test]
    fn test_primitive_types() {
        let tree = tree();
        let check = |params: serde_json::Value| {
            let data = Value::from(json!({"set": {"parameters": params}}));
            run(&tree, &data)
        };
        assert_eq!(check(json!({"width": 1.0})), Verdict::Trusted);
        assert_eq!(check(json!({"width": 2.3})), Verdict::Repaired);
        assert_eq!(check(json!({"width": -4})), Verdict::Repaired);
        assert_eq!(check(json!({"width": "1"})), Verdict::Repaired);
        assert_eq!(check(json!({"depth": -4})), Verdict::Trusted);
        assert_eq!(check(json!({"depth": true})), Verdict::Repaired);
        assert_eq!(check(json!({"height": 3})), Verdict::Trusted);
        assert_eq!(check(json!({"height": "3.5"})), Verdict::Repaired);

        let data = Value::from(json!({"bits": [{"allright": 1}]}));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert_eq!(data.to_json(), Some(json!({"bits": []})));
    }

    #[test]
    fn test_text_and_blob() {
        let mut tree = SchemaTree::new();
        TreeBuilder::new(&mut tree)
            .parse_str("doc : COLLECTION = 1\n  title : UTF8 = 1\n  body : BLOB = 2\nEND\n")
            .unwrap();
        let doc = Value::map([("title", Value::text("hi")), ("body", Value::Blob(b"\x00\x01".to_vec()))]);
        let data = Value::map([("doc", doc.clone())]);
        assert_eq!(run(&tree, &data), Verdict::Trusted);

        doc.insert("body", Value::text("plain"));
        assert_eq!(run(&tree, &data), Verdict::Trusted);

        doc.insert("title", Value::Blob(vec![1]));
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert!(!doc.contains_key("title"));
    }

    #[test]
    fn test_self_referential_mapping() {
        let tree = tree();
        let circ = Value::map([("before", Value::Int(11)), ("after", Value::Int(33))]);
        circ.insert("circular", circ.clone());
        let data = Value::map([("circular", circ.clone())]);

        let opts = ValidateOptions { throw: true, report: true, ..Default::default() };
        let result = validate(&tree, tree.root(), &data, &opts).unwrap();
        assert_eq!(result.verdict, Verdict::Distrusted);
        assert!(result.diagnostics[0].contains("circular reference"));
        assert_eq!(circ.len(), 3);

        if let Value::Map(map) = &circ {
            map.borrow_mut().clear();
        }
    }

    fn unlink(value: &Value) {
        match value {
            Value::Map(map) => map.borrow_mut().clear(),
            Value::List(list) => list.borrow_mut().clear(),
            _ => {}
        }
    }

    fn report(tree: &SchemaTree, data: &Value) -> Validation {
        let opts = ValidateOptions { report: true, ..Default::default() };
        validate(tree, tree.root(), data, &opts).unwrap()
    }

    #[test]
    fn test_enclosing_mapping_under_scalar_key() {
        let tree = tree();
        let params = Value::map([("depth", Value::Int(-1))]);
        params.insert("width", params.clone());
        let data = Value::map([("set", Value::map([("parameters", params.clone())]))]);

        let result = report(&tree, &data);
        assert_eq!(result.verdict, Verdict::Distrusted);
        assert_eq!(result.diagnostics, ["set.parameters.width: circular reference, branch abandoned"]);
        assert_eq!(params.len(), 2);
        unlink(&params);
    }

    #[test]
    fn test_enclosing_sequence_as_element() {
        let tree = tree();
        let bits = Value::list([Value::text("allright")]);
        bits.push(bits.clone());
        let data = Value::map([("bits", bits.clone())]);

        let result = report(&tree, &data);
        assert_eq!(result.verdict, Verdict::Distrusted);
        assert_eq!(result.diagnostics, ["bits[1]: circular reference, branch abandoned"]);
        assert_eq!(bits.len(), 2);
        unlink(&bits);
    }

    #[test]
    fn test_self_containing_value_under_rejected_key() {
        let tree = tree();
        let stray = Value::map([("x", Value::Int(1))]);
        stray.insert("me", stray.clone());
        let set = Value::map([("bogus", stray.clone())]);
        let data = Value::map([("set", set.clone())]);
        assert_eq!(run(&tree, &data), Verdict::Distrusted);
        assert!(set.contains_key("bogus"));
        assert_eq!(stray.len(), 2);
        unlink(&stray);

        // a self-containing sequence where a number belongs
        let ring = Value::list([]);
        ring.push(Value::list([ring.clone()]));
        let params = Value::map([("width", ring.clone())]);
        let data = Value::map([("set", Value::map([("parameters", params.clone())]))]);
        assert_eq!(run(&tree, &data), Verdict::Distrusted);
        assert!(params.contains_key("width"));
        unlink(&ring);
    }

    #[test]
    fn test_self_containing_nested_element() {
        let tree = tree();
        let inner = Value::list([]);
        inner.push(inner.clone());
        let bits = Value::list([Value::text("allright"), inner.clone()]);
        let data = Value::map([("bits", bits.clone())]);
        assert_eq!(run(&tree, &data), Verdict::Distrusted);
        assert_eq!(bits.len(), 2);
        unlink(&inner);
    }

    #[test]
    fn test_surplus_key_pointing_back_at_element() {
        let tree = tree();
        let element = Value::map([("another", Value::Bool(true))]);
        element.insert("zz", element.clone());
        let data = Value::map([("bits", Value::list([element.clone()]))]);
        assert_eq!(run(&tree, &data), Verdict::Distrusted);
        assert_eq!(element.len(), 2);
        unlink(&element);
    }

    #[test]
    fn test_shared_invalid_value_is_still_removed() {
        let tree = tree();
        let shared = Value::map([("a", Value::Int(1))]);
        let params = Value::map([("width", shared.clone()), ("height", shared.clone())]);
        let data = Value::map([("set", Value::map([("parameters", params.clone())]))]);
        assert_eq!(run(&tree, &data), Verdict::Repaired);
        assert!(params.is_empty());
    }

    #[test]
    fn test_cycle_through_variadic() {
        let tree = tree();
        let first = Value::map([("before", Value::Int(11))]);
        let second = Value::map([("before", Value::Int(12))]);
        first.insert("varcirc", Value::list([Value::map([("circular", second.clone())])]));
        second.insert("varcirc", Value::list([Value::map([("circular", first.clone())])]));
        let data = Value::map([("circular", first.clone())]);
        assert_eq!(run(&tree, &data), Verdict::Distrusted);

        if let Value::Map(map) = &first {
            map.borrow_mut().clear();
        }
    }

    #[test]
    fn test_recursive_schema_with_acyclic_data() {
        let tree = tree();
        let data = Value::map([(
            "circular",
            Value::map([
                ("circular", Value::map([("before", Value::Int(1))])),
                ("varcirc", Value::list([
                    Value::map([("circular", Value::map([("after", Value::Int(2))]))]),
                ])),
            ]),
        )]);
        assert_eq!(run(&tree, &data), Verdict::Trusted);
    }

    #[test]
    fn test_depth_limit() {
        let tree = tree();
        let mut inner = Value::map([("before", Value::Int(1))]);
        for _ in 0..10 {
            inner = Value::map([("circular", inner)]);
        }
        let data = Value::map([("circular", inner)]);
        let opts = ValidateOptions { max_depth: 4, ..Default::default() };
        let result = validate(&tree, tree.root(), &data, &opts).unwrap();
        assert_eq!(result.verdict, Verdict::Distrusted);
        assert!(result.diagnostics.is_empty());
        assert_eq!(run(&tree, &data), Verdict::Trusted);
    }
}
