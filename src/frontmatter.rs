/// Minimal `---`-delimited key/value frontmatter, as used by prompt files and
/// the Ralph loop state file. Only flat `key: value` pairs are supported.
use anyhow::{bail, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frontmatter {
    pub fields: Vec<(String, String)>,
}

impl Frontmatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `[a, b]` or `a, b` as a list; empty items dropped.
    pub fn list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.trim_start_matches('[')
                    .trim_end_matches(']')
                    .split(',')
                    .map(|s| unquote(s.trim()).to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn unquote(s: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner;
        }
    }
    s
}

/// Split a document into frontmatter and body. A document that does not
/// start with `---` has no frontmatter and is all body. An unterminated
/// block or a line without `:` is an error.
pub fn split(raw: &str) -> Result<(Frontmatter, &str)> {
    let Some(rest) = raw.strip_prefix("---\n").or_else(|| raw.strip_prefix("---\r\n")) else {
        return Ok((Frontmatter::default(), raw));
    };
    let mut fields = Vec::new();
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed == "---" {
            return Ok((Frontmatter { fields }, rest[offset..].trim_start_matches(['\n', '\r'])));
        }
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            bail!("frontmatter line without ':': {trimmed}");
        };
        fields.push((key.trim().to_string(), unquote(value.trim()).to_string()));
    }
    bail!("unterminated frontmatter")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_fields_and_body() {
        let raw = "---\nname: \"Review\"\ntags: [rust, review]\n---\n\nBody text\n";
        let (fm, body) = split(raw).unwrap();
        assert_eq!(fm.get("name"), Some("Review"));
        assert_eq!(fm.list("tags"), vec!["rust", "review"]);
        assert_eq!(body, "Body text\n");
        assert_eq!(fm.get("missing"), None);
    }

    #[test]
    fn test_no_frontmatter_is_all_body() {
        let (fm, body) = split("just text").unwrap();
        assert!(fm.fields.is_empty());
        assert_eq!(body, "just text");
    }

    #[test]
    fn test_malformed() {
        assert!(split("---\nname: x\n").is_err());
        assert!(split("---\nnot a pair\n---\n").is_err());
    }

    #[test]
    fn test_value_with_colon() {
        let (fm, _) = split("---\nstarted_at: 2024-01-01T10:00:00Z\n---\n").unwrap();
        assert_eq!(fm.get("started_at"), Some("2024-01-01T10:00:00Z"));
    }
}
