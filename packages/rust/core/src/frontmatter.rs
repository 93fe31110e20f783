//! YAML front-matter extraction.
//!
//! A block opens with a `---` line at the very start of the text (an
//! optional byte-order mark may precede it) and closes with the next `---`
//! or `...` line. Blank lines directly after the closing delimiter belong
//! to the block, not the body.

use filesmith_shared::Metadata;

/// Errors raised for a block that is present but unusable.
#[derive(Debug, thiserror::Error)]
pub enum FrontMatterError {
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("front matter must be a mapping, found {0}")]
    NotAMapping(&'static str),
}

/// A parsed block and the text that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter<'a> {
    pub attributes: Metadata,
    pub body: &'a str,
}

/// Split `text` into attributes and body.
///
/// Returns `Ok(None)` when there is no complete block: no opening line or
/// no closing line.
pub fn parse(text: &str) -> Result<Option<FrontMatter<'_>>, FrontMatterError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut lines = LineCursor::new(text);

    match lines.next() {
        Some((line, _)) if is_delimiter(line, false) => {}
        _ => return Ok(None),
    }
    let yaml_start = lines.offset();

    let yaml_end = loop {
        match lines.next() {
            Some((line, start)) if is_delimiter(line, true) => break start,
            Some(_) => continue,
            None => return Ok(None),
        }
    };

    // Swallow whitespace-only lines after the closing delimiter.
    let mut body_start = lines.offset();
    while let Some((line, _)) = lines.next() {
        if !line.trim().is_empty() {
            break;
        }
        body_start = lines.offset();
    }

    let attributes = parse_attributes(&text[yaml_start..yaml_end])?;
    Ok(Some(FrontMatter {
        attributes,
        body: &text[body_start..],
    }))
}

fn is_delimiter(line: &str, closing: bool) -> bool {
    let line = line.trim_end();
    line == "---" || (closing && line == "...")
}

fn parse_attributes(yaml: &str) -> Result<Metadata, FrontMatterError> {
    if yaml.trim().is_empty() {
        return Ok(Metadata::new());
    }
    match serde_yaml_ng::from_str::<serde_json::Value>(yaml)? {
        serde_json::Value::Object(map) => Ok(map),
        serde_json::Value::Null => Ok(Metadata::new()),
        serde_json::Value::Array(_) => Err(FrontMatterError::NotAMapping("a sequence")),
        serde_json::Value::String(_) => Err(FrontMatterError::NotAMapping("a string")),
        serde_json::Value::Number(_) => Err(FrontMatterError::NotAMapping("a number")),
        serde_json::Value::Bool(_) => Err(FrontMatterError::NotAMapping("a boolean")),
    }
}

/// Line iterator that tracks byte offsets. Yields each line without its
/// terminator together with the offset where it starts.
struct LineCursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Offset just past the most recently yielded line.
    fn offset(&self) -> usize {
        self.pos
    }
}

impl<'a> Iterator for LineCursor<'a> {
    type Item = (&'a str, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.text.len() {
            return None;
        }
        let start = self.pos;
        let rest = &self.text[start..];
        let (line, consumed) = match rest.find('\n') {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some((line.strip_suffix('\r').unwrap_or(line), start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_attributes_and_body() {
        let text = "---\ntitle: A Title\ndate: 2013-12-02\n---\n\ndocument\n";
        let fm = parse(text).unwrap().unwrap();
        assert_eq!(fm.attributes["title"], json!("A Title"));
        assert_eq!(fm.attributes["date"], json!("2013-12-02"));
        assert_eq!(fm.body, "document\n");
    }

    #[test]
    fn no_block_returns_none() {
        assert!(parse("just text\n---\n").unwrap().is_none());
        assert!(parse("").unwrap().is_none());
        assert!(parse(" ---\na: 1\n---\n").unwrap().is_none());
    }

    #[test]
    fn unterminated_block_returns_none() {
        assert!(parse("---\ntitle: x\nbody\n").unwrap().is_none());
    }

    #[test]
    fn empty_block_yields_no_attributes() {
        let fm = parse("---\n---\nbody").unwrap().unwrap();
        assert!(fm.attributes.is_empty());
        assert_eq!(fm.body, "body");
    }

    #[test]
    fn dots_close_a_block() {
        let fm = parse("---\na: 1\n...\nrest").unwrap().unwrap();
        assert_eq!(fm.attributes["a"], json!(1));
        assert_eq!(fm.body, "rest");
    }

    #[test]
    fn handles_crlf_and_bom() {
        let fm = parse("\u{feff}---\r\nkey: value\r\n---\r\nbody\r\n")
            .unwrap()
            .unwrap();
        assert_eq!(fm.attributes["key"], json!("value"));
        assert_eq!(fm.body, "body\r\n");
    }

    #[test]
    fn block_at_end_of_file_leaves_empty_body() {
        let fm = parse("---\na: true\n---").unwrap().unwrap();
        assert_eq!(fm.attributes["a"], json!(true));
        assert_eq!(fm.body, "");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = parse("---\nfoo: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, FrontMatterError::Yaml(_)));
    }

    #[test]
    fn non_mapping_is_an_error() {
        let err = parse("---\n- a\n- b\n---\n").unwrap_err();
        assert!(matches!(err, FrontMatterError::NotAMapping("a sequence")));
    }

    #[test]
    fn nested_values_survive() {
        let fm = parse("---\ntags: [a, b]\nauthor:\n  name: x\n---\n")
            .unwrap()
            .unwrap();
        assert_eq!(fm.attributes["tags"], json!(["a", "b"]));
        assert_eq!(fm.attributes["author"]["name"], json!("x"));
    }
}
