use crate::utils::quote;
use lazy_static::lazy_static;
use regex::Regex;
use tauschema_codec::TypeCode;

lazy_static! {
    static ref INTEGER: Regex = Regex::new(r"^-?[0-9]+$").unwrap();
    static ref INCLUDE: Regex = Regex::new(r"\$include").unwrap();
}

/// Largest instance number; compiled tables report `max_tag` as four times
/// the largest tag.
pub const MAX_INSTANCE: u64 = u64::MAX / 4;

/// Closes the innermost scope.
pub const END_KEYWORD: &str = "END";

/// Grammar error without location; the builder adds file and line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrammarError(pub String);

/// One classified physical line of schema source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Blank,
    /// Pure commentary, text after `#`.
    Comment(String),
    Include(Vec<String>),
    /// Scope close, with the optional name of the scope being closed.
    End(Option<String>),
    Item(ItemLine),
}

/// `[scopepath.]name [ ':' [scopepath.]typepath ] [ '=' integer ] [# comment]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLine {
    /// Dotted name path. A leading empty segment marks an absolute path.
    pub name:        Vec<String>,
    /// Dotted type path, empty when no type was written.
    pub type_path:   Vec<String>,
    pub instance:    Option<u64>,
    /// Trailing comment, trailing whitespace removed.
    pub description: Option<String>,
}

impl ItemLine {
    /// The name the new node gets.
    pub fn leaf(&self) -> &str {
        self.name.last().map(String::as_str).unwrap_or_default()
    }

    /// True when the name derives from an existing node.
    pub fn is_derived(&self) -> bool {
        self.name.len() > 1
    }
}

/// Identifiers that may not be used as any segment of an item name.
pub fn is_reserved(name: &str) -> bool {
    name == END_KEYWORD || (!name.is_empty() && TypeCode::from_keyword(name).is_some())
}

fn split_path(text: &str) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }
    text.split('.').map(|s| s.trim().to_string()).collect()
}

/// Classify and split one line of schema source.
pub fn parse_line(text: &str) -> Result<Line, GrammarError> {
    let line = text.trim();
    if line.is_empty() {
        return Ok(Line::Blank);
    }

    let (code, comment) = match line.split_once('#') {
        Some((code, comment)) => (code.trim(), Some(comment)),
        None => (line, None),
    };
    if code.is_empty() {
        return Ok(Line::Comment(comment.unwrap_or_default().to_string()));
    }

    if INCLUDE.is_match(code) {
        let paths: Vec<String> = INCLUDE
            .split(code)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect();
        if paths.is_empty() {
            return Err(GrammarError(format!("$include without a path; {}", code)));
        }
        return Ok(Line::Include(paths));
    }

    // name [: type] [= instance]
    let parts: Vec<&str> = code.split(':').collect();
    if parts.len() > 2 {
        return Err(GrammarError(format!("more than one ':'; {}", code)));
    }
    let (name_text, rest) = match parts.as_slice() {
        [name, rest] => (*name, *rest),
        _ => match code.split_once('=') {
            Some((name, _)) => (name, &code[name.len()..]),
            None => (code, ""),
        },
    };
    let type_num: Vec<&str> = rest.split('=').collect();
    if type_num.len() > 2 {
        return Err(GrammarError(format!("more than one '='; {}", code)));
    }
    let name = split_path(name_text);
    let type_path = split_path(type_num[0]);
    let instance = match type_num.get(1).map(|n| n.trim()) {
        None => None,
        Some(n) if INTEGER.is_match(n) => match n.parse::<u64>() {
            Ok(n) if n <= MAX_INSTANCE => Some(n),
            Ok(_) => return Err(GrammarError(format!("instance {} is too large; {}", quote(n), code))),
            Err(_) if n.starts_with('-') => {
                return Err(GrammarError(format!("the instance must be a non-negative number; {}", code)))
            }
            Err(_) => return Err(GrammarError(format!("instance {} is too large; {}", quote(n), code))),
        },
        Some(n) => return Err(GrammarError(format!("invalid instance {}; {}", quote(n), code))),
    };

    // scope closure, either `[name] : END` or a bare `END`
    let bare_end = parts.len() == 1 && instance.is_none() && name.len() == 1 && name[0] == END_KEYWORD;
    if bare_end || type_path.iter().any(|t| t == END_KEYWORD) {
        if type_path.len() > 1 {
            return Err(GrammarError(format!("name space of types not allowed with END; {}", code)));
        }
        if name.len() > 1 {
            return Err(GrammarError(format!("name space not allowed with END; {}", code)));
        }
        let closed = name.into_iter().next().filter(|n| !n.is_empty() && !bare_end);
        return Ok(Line::End(closed));
    }

    if name.last().map_or(true, |n| n.is_empty()) {
        return Err(GrammarError(format!("item must have name part; {}", code)));
    }
    if let Some(empty) = name.iter().skip(1).position(|n| n.is_empty()) {
        return Err(GrammarError(format!(
            "name space segment {} must have name; {}",
            empty + 1,
            code
        )));
    }
    if let Some(reserved) = name.iter().find(|n| is_reserved(n)) {
        return Err(GrammarError(format!("name {} is reserved; {}", quote(reserved), code)));
    }

    Ok(Line::Item(ItemLine {
        name,
        type_path,
        instance,
        description: comment
            .map(str::trim_end)
            .filter(|c| !c.is_empty())
            .map(String::from),
    }))
}
