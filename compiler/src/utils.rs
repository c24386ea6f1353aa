/// JSON-style quoting used in error messages.
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

/// Renders a data path as `a.b[2].c`.
pub fn render_path(path: &[String]) -> String {
    let mut out = String::new();
    for segment in path {
        if !segment.starts_with('[') && !out.is_empty() {
            out.push('.');
        }
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('.');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote() {
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_render_path() {
        let path: Vec<String> = ["bits", "[2]", "another"].iter().map(|s| s.to_string()).collect();
        assert_eq!(render_path(&path), "bits[2].another");
        assert_eq!(render_path(&[]), ".");
    }
}
