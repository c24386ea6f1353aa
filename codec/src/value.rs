use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// Shared, mutable mapping container.
pub type MapRef = Rc<RefCell<BTreeMap<String, Value>>>;

/// Shared, mutable sequence container.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// This type holds untrusted nested data to be checked against a schema.
///
/// Mappings and sequences are reference counted so the same container can
/// appear in several places, including inside itself. The validator mutates
/// them in place and uses the `Rc` pointer as the container identity.
#[derive(Clone)]
pub enum Value {
    /// The request/flag marker. Accepted for any key.
    Null,
    Bool(bool),
    Int(i128),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Map(MapRef),
    List(ListRef),
}

impl Value {
    /// Build a mapping from key/value pairs.
    pub fn map<K, I>(entries: I) -> Value
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Value::Map(Rc::new(RefCell::new(map)))
    }

    /// Build a sequence from values.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    pub fn text(text: impl Into<String>) -> Value {
        Value::Text(text.into())
    }

    /// Container identity, `None` for scalars.
    pub fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Map(map) => Some(Rc::as_ptr(map) as *const ()),
            Value::List(list) => Some(Rc::as_ptr(list) as *const ()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Number of entries of a mapping or sequence, 0 for scalars.
    pub fn len(&self) -> usize {
        match self {
            Value::Map(map) => map.borrow().len(),
            Value::List(list) => list.borrow().len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a key of a mapping. Returns a cheap clone: containers share
    /// their storage with the original.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.borrow().get(key).cloned(),
            _ => None,
        }
    }

    /// Element of a sequence.
    pub fn at(&self, index: usize) -> Option<Value> {
        match self {
            Value::List(list) => list.borrow().get(index).cloned(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match self {
            Value::Map(map) => map.borrow().contains_key(key),
            _ => false,
        }
    }

    /// Insert into a mapping. Has no effect on other value kinds.
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        if let Value::Map(map) = self {
            map.borrow_mut().insert(key.into(), value);
        }
    }

    /// Append to a sequence. Has no effect on other value kinds.
    pub fn push(&self, value: Value) {
        if let Value::List(list) = self {
            list.borrow_mut().push(value);
        }
    }

    /// Short name of the value kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Map(_) => "mapping",
            Value::List(_) => "sequence",
        }
    }

    /// Render as JSON. Blobs become arrays of byte values. Returns `None` if
    /// the structure contains itself.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        let mut path = HashSet::new();
        to_json(self, &mut path)
    }
}

fn to_json(value: &Value, path: &mut HashSet<*const ()>) -> Option<serde_json::Value> {
    use serde_json::Value as Json;

    Some(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => {
            if let Ok(i) = i64::try_from(*i) {
                Json::from(i)
            } else if let Ok(u) = u64::try_from(*i) {
                Json::from(u)
            } else {
                Json::from(*i as f64)
            }
        }
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Text(s) => Json::String(s.clone()),
        Value::Blob(bytes) => Json::Array(bytes.iter().map(|&b| Json::from(b)).collect()),
        Value::Map(map) => {
            let id = Rc::as_ptr(map) as *const ();
            if !path.insert(id) {
                return None;
            }
            let mut out = serde_json::Map::new();
            for (k, v) in map.borrow().iter() {
                out.insert(k.clone(), to_json(v, path)?);
            }
            path.remove(&id);
            Json::Object(out)
        }
        Value::List(list) => {
            let id = Rc::as_ptr(list) as *const ();
            if !path.insert(id) {
                return None;
            }
            let mut out = Vec::new();
            for v in list.borrow().iter() {
                out.push(to_json(v, path)?);
            }
            path.remove(&id);
            Json::Array(out)
        }
    })
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Value {
        use serde_json::Value as Json;

        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i as i128)
                } else if let Some(u) = n.as_u64() {
                    Value::Int(u as i128)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Json::String(s) => Value::Text(s),
            Json::Array(items) => Value::list(items.into_iter().map(Value::from)),
            Json::Object(entries) => Value::map(entries.into_iter().map(|(k, v)| (k, Value::from(v)))),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Value {
        Value::Int(i as i128)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Value {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Value {
        Value::Blob(bytes)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Blob(bytes) => write!(f, "b{:?}", bytes),
            // Containers print only their shape so that cyclic data can be
            // logged.
            Value::Map(map) => write!(f, "{{..{} keys}}", map.borrow().len()),
            Value::List(list) => write!(f, "[..{} items]", list.borrow().len()),
        }
    }
}
