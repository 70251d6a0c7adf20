//! Content files: a `key: value` header block followed by a Markdown body.
//!
//! ```text
//! id: 010
//! title: About us
//! template: main
//! weight: !2 * 10
//!
//! Everything from the first line without a `:` on is **Markdown**.
//! ```
//!
//! Header keys are normalized with [`naming::normalize`]. `id`, `title` and
//! `template` land in typed fields; anything else goes into
//! [`Header::extra`]. A value starting with `!` or `#` is evaluated as a
//! literal expression (numbers, booleans, quoted strings, `+ - * /` and
//! parentheses). Nothing else is ever executed.
//!
//! Bodies are converted with pulldown-cmark (tables enabled). Template
//! directives (`{{ … }}`, `{% … %}`) inside the body are shielded from the
//! Markdown pass so the second template pass sees them byte-for-byte.

use crate::naming;
use pulldown_cmark::{Options, Parser, html as md_html};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Printed for a box that has neither body nor HTML.
pub const EMPTY_BOX: &str = "Empty, please fill it";

const TABLE_OPEN: &str = "<table>";
const TABLE_STYLED: &str = r#"<table class="table table-striped">"#;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{0} is not valid UTF-8, please save it as UTF-8")]
    Encoding(PathBuf),
}

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Int(n) => write!(f, "{n}"),
            HeaderValue::Float(x) => write!(f, "{x}"),
            HeaderValue::Bool(b) => write!(f, "{b}"),
            HeaderValue::Text(s) => f.write_str(s),
        }
    }
}

/// Parsed header block of a content file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    /// Sort key and cross-language identifier.
    pub id: Option<String>,
    pub title: Option<String>,
    /// Template name without `.html`.
    pub template: Option<String>,
    /// Every other key, by normalized name.
    pub extra: BTreeMap<String, HeaderValue>,
}

impl Header {
    fn set(&mut self, key: String, value: HeaderValue) {
        match key.as_str() {
            "id" => self.id = Some(value.to_string()),
            "title" => self.title = Some(value.to_string()),
            "template" => self.template = Some(value.to_string()),
            _ => {
                self.extra.insert(key, value);
            }
        }
    }

    /// Look up any header key by (normalized) name.
    pub fn get(&self, key: &str) -> Option<HeaderValue> {
        let key = naming::normalize(key);
        let text = |v: &Option<String>| v.clone().map(HeaderValue::Text);
        match key.as_str() {
            "id" => text(&self.id),
            "title" => text(&self.title),
            "template" => text(&self.template),
            _ => self.extra.get(&key).cloned(),
        }
    }

    /// All keys in the header, typed fields first.
    pub fn keys(&self) -> Vec<String> {
        let typed = [
            ("id", &self.id),
            ("title", &self.title),
            ("template", &self.template),
        ];
        typed
            .iter()
            .filter(|(_, v)| v.is_some())
            .map(|(k, _)| k.to_string())
            .chain(self.extra.keys().cloned())
            .collect()
    }
}

/// One parsed content file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentBox {
    pub path: PathBuf,
    pub header: Header,
    /// Markdown body, header removed.
    pub markdown: String,
    /// Rendered body.
    pub html: String,
}

impl ContentBox {
    /// Read and parse a content file. Invalid UTF-8 is an error, never
    /// replaced.
    pub fn load(path: &Path) -> Result<Self, ContentError> {
        let bytes = fs::read(path).map_err(|source| ContentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| ContentError::Encoding(path.to_path_buf()))?;
        Ok(Self::parse(path, &text))
    }

    /// Split `text` into header and body and render the body.
    ///
    /// Header lines are read until the first line that does not split on
    /// `:` into at least two fields (a blank line included); that line and
    /// everything after it is the body.
    pub fn parse(path: &Path, text: &str) -> Self {
        let mut header = Header::default();
        let mut lines = text.lines().peekable();

        while let Some(line) = lines.peek() {
            let Some((key, value)) = line.split_once(':') else {
                break;
            };
            let key = naming::normalize(key);
            if key.is_empty() {
                break;
            }
            header.set(key, parse_value(value.trim(), path));
            lines.next();
        }

        let markdown = lines.collect::<Vec<_>>().join("\n");
        let mut content = Self {
            path: path.to_path_buf(),
            header,
            markdown,
            html: String::new(),
        };
        content.render_html();
        content
    }

    /// Convert the Markdown body to HTML.
    pub fn render_html(&mut self) {
        self.html = markdown_to_html(&self.markdown);
    }

    pub fn is_empty(&self) -> bool {
        self.html.trim().is_empty() && self.markdown.trim().is_empty()
    }
}

impl fmt::Display for ContentBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.html.is_empty() {
            f.write_str(&self.html)
        } else if !self.markdown.is_empty() {
            f.write_str(&self.markdown)
        } else {
            f.write_str(EMPTY_BOX)
        }
    }
}

/// Markdown → HTML, with template directives passed through untouched and
/// tables styled.
pub fn markdown_to_html(markdown: &str) -> String {
    let (shielded, directives) = shield_directives(markdown);
    let parser = Parser::new_ext(&shielded, Options::ENABLE_TABLES);
    let mut html = String::new();
    md_html::push_html(&mut html, parser);
    restore_directives(&html, &directives).replace(TABLE_OPEN, TABLE_STYLED)
}

// Plain ASCII so neither HTML escaping nor link-target percent-encoding
// touches the placeholder.
const SHIELD_OPEN: &str = "xPOLYSITEDIRECTIVE";
const SHIELD_CLOSE: char = 'x';

/// Replace `{{ … }}` and `{% … %}` spans with alphanumeric placeholders.
///
/// An unterminated directive is left as plain text.
fn shield_directives(text: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut directives = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find('{') {
        let close = match rest[start..].chars().nth(1) {
            Some('{') => "}}",
            Some('%') => "%}",
            _ => {
                out.push_str(&rest[..=start]);
                rest = &rest[start + 1..];
                continue;
            }
        };
        let Some(len) = rest[start + 2..].find(close) else {
            break;
        };
        let end = start + 2 + len + close.len();
        out.push_str(&rest[..start]);
        out.push_str(SHIELD_OPEN);
        out.push_str(&directives.len().to_string());
        out.push(SHIELD_CLOSE);
        directives.push(rest[start..end].to_string());
        rest = &rest[end..];
    }
    out.push_str(rest);
    (out, directives)
}

fn restore_directives(html: &str, directives: &[String]) -> String {
    if directives.is_empty() {
        return html.to_string();
    }
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find(SHIELD_OPEN) {
        let after = &rest[start + SHIELD_OPEN.len()..];
        let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let restored = after[digits..]
            .starts_with(SHIELD_CLOSE)
            .then(|| after[..digits].parse::<usize>().ok())
            .flatten()
            .and_then(|i| directives.get(i));
        out.push_str(&rest[..start]);
        match restored {
            Some(directive) => {
                out.push_str(directive);
                rest = &after[digits + SHIELD_CLOSE.len_utf8()..];
            }
            None => {
                out.push_str(SHIELD_OPEN);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Header value: literal text, or an evaluated expression after `!`/`#`.
fn parse_value(raw: &str, path: &Path) -> HeaderValue {
    let Some(expr) = raw.strip_prefix('!').or_else(|| raw.strip_prefix('#')) else {
        return HeaderValue::Text(raw.to_string());
    };
    match evaluate(expr) {
        Ok(value) => value,
        Err(reason) => {
            warn!(path = %path.display(), value = raw, "cannot evaluate header value: {reason}");
            HeaderValue::Text(raw.to_string())
        }
    }
}

// ============================================================================
// Literal expression evaluator
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(HeaderValue),
    Str(String),
    Bool(bool),
    Op(char),
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or("unterminated string")?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '0'..='9' | '.' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|ch| ch.is_ascii_digit() || **ch == '.')
                    .count();
                let text: String = chars[i..i + len].iter().collect();
                let num = if text.contains('.') {
                    HeaderValue::Float(text.parse().map_err(|_| format!("bad number '{text}'"))?)
                } else {
                    HeaderValue::Int(text.parse().map_err(|_| format!("bad number '{text}'"))?)
                };
                tokens.push(Token::Num(num));
                i += len;
            }
            _ if c.is_alphabetic() => {
                let len = chars[i..].iter().take_while(|ch| ch.is_alphanumeric()).count();
                let word: String = chars[i..i + len].iter().collect();
                match word.to_lowercase().as_str() {
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => return Err(format!("unknown name '{word}'")),
                }
                i += len;
            }
            _ => return Err(format!("unexpected character '{c}'")),
        }
    }
    Ok(tokens)
}

/// Evaluate a literal expression. No names, calls or side effects.
fn evaluate(input: &str) -> Result<HeaderValue, String> {
    let tokens = tokenize(input)?;
    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err("trailing input".into());
    }
    Ok(value)
}

struct ExprParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl ExprParser {
    fn peek_op(&self, ops: &[char]) -> Option<char> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(c)) if ops.contains(c) => Some(*c),
            _ => None,
        }
    }

    fn expr(&mut self) -> Result<HeaderValue, String> {
        let mut left = self.term()?;
        while let Some(op) = self.peek_op(&['+', '-']) {
            self.pos += 1;
            let right = self.term()?;
            left = apply(op, left, right)?;
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<HeaderValue, String> {
        let mut left = self.unary()?;
        while let Some(op) = self.peek_op(&['*', '/']) {
            self.pos += 1;
            let right = self.unary()?;
            left = apply(op, left, right)?;
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<HeaderValue, String> {
        if self.peek_op(&['-']).is_some() {
            self.pos += 1;
            return apply('-', HeaderValue::Int(0), self.unary()?);
        }
        if self.peek_op(&['+']).is_some() {
            self.pos += 1;
            return self.unary();
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<HeaderValue, String> {
        let token = self.tokens.get(self.pos).cloned().ok_or("unexpected end")?;
        self.pos += 1;
        match token {
            Token::Num(n) => Ok(n),
            Token::Str(s) => Ok(HeaderValue::Text(s)),
            Token::Bool(b) => Ok(HeaderValue::Bool(b)),
            Token::Open => {
                let value = self.expr()?;
                match self.tokens.get(self.pos) {
                    Some(Token::Close) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err("missing ')'".into()),
                }
            }
            Token::Op(c) => Err(format!("unexpected '{c}'")),
            Token::Close => Err("unexpected ')'".into()),
        }
    }
}

fn apply(op: char, left: HeaderValue, right: HeaderValue) -> Result<HeaderValue, String> {
    use HeaderValue::*;
    match (left, right) {
        (Int(a), Int(b)) => match op {
            '+' => a.checked_add(b).map(Int).ok_or_else(|| "overflow".into()),
            '-' => a.checked_sub(b).map(Int).ok_or_else(|| "overflow".into()),
            '*' => a.checked_mul(b).map(Int).ok_or_else(|| "overflow".into()),
            _ if b == 0 => Err("division by zero".into()),
            _ => Ok(Float(a as f64 / b as f64)),
        },
        (Text(a), Text(b)) if op == '+' => Ok(Text(a + &b)),
        (a, b) => {
            let (Some(x), Some(y)) = (as_float(&a), as_float(&b)) else {
                return Err(format!("cannot apply '{op}' to {a:?} and {b:?}"));
            };
            match op {
                '+' => Ok(Float(x + y)),
                '-' => Ok(Float(x - y)),
                '*' => Ok(Float(x * y)),
                _ if y == 0.0 => Err("division by zero".into()),
                _ => Ok(Float(x / y)),
            }
        }
    }
}

fn as_float(value: &HeaderValue) -> Option<f64> {
    match value {
        HeaderValue::Int(n) => Some(*n as f64),
        HeaderValue::Float(x) => Some(*x),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(text: &str) -> ContentBox {
        ContentBox::parse(Path::new("page.md"), text)
    }

    // =========================================================================
    // Header parsing
    // =========================================================================

    #[test]
    fn header_fills_typed_fields() {
        let content = parse("id: 010\ntitle: About us\ntemplate: main\n\nBody");
        assert_eq!(content.header.id.as_deref(), Some("010"));
        assert_eq!(content.header.title.as_deref(), Some("About us"));
        assert_eq!(content.header.template.as_deref(), Some("main"));
        assert!(content.header.extra.is_empty());
    }

    #[test]
    fn header_keys_are_normalized() {
        let content = parse("Sub-Title: Hello\n\nx");
        assert_eq!(
            content.header.get("sub_title"),
            Some(HeaderValue::Text("Hello".into()))
        );
        assert_eq!(
            content.header.get("Sub-Title"),
            Some(HeaderValue::Text("Hello".into()))
        );
    }

    #[test]
    fn value_keeps_later_colons() {
        let content = parse("link: http://example.com:8080/x\n\nbody");
        assert_eq!(
            content.header.get("link"),
            Some(HeaderValue::Text("http://example.com:8080/x".into()))
        );
    }

    #[test]
    fn first_single_field_line_starts_body() {
        let content = parse("id: a\nJust text\nmore: text");
        assert_eq!(content.header.id.as_deref(), Some("a"));
        assert_eq!(content.markdown, "Just text\nmore: text");
        assert!(content.header.get("more").is_none());
    }

    #[test]
    fn crlf_line_endings_are_stripped() {
        let content = parse("id: home\r\ntitle: Home\r\n\r\nHi");
        assert_eq!(content.header.id.as_deref(), Some("home"));
        assert_eq!(content.header.title.as_deref(), Some("Home"));
    }

    #[test]
    fn header_only_file_has_empty_body() {
        let content = parse("id: home\ntemplate: main");
        assert_eq!(content.markdown, "");
        assert!(content.is_empty());
        assert_eq!(content.to_string(), EMPTY_BOX);
    }

    #[test]
    fn keys_list_typed_then_extra() {
        let content = parse("weight: 3\nid: x\n\n");
        assert_eq!(content.header.keys(), vec!["id", "weight"]);
    }

    // =========================================================================
    // Expression values
    // =========================================================================

    #[test]
    fn bang_value_evaluates_arithmetic() {
        let content = parse("weight: !2 * (3 + 4)\n\n");
        assert_eq!(content.header.get("weight"), Some(HeaderValue::Int(14)));
    }

    #[test]
    fn hash_value_evaluates_literals() {
        let content = parse("draft: #true\nratio: #1.5\nname: #'a' + \"b\"\n\n");
        assert_eq!(content.header.get("draft"), Some(HeaderValue::Bool(true)));
        assert_eq!(content.header.get("ratio"), Some(HeaderValue::Float(1.5)));
        assert_eq!(content.header.get("name"), Some(HeaderValue::Text("ab".into())));
    }

    #[test]
    fn division_yields_float() {
        assert_eq!(evaluate("7 / 2"), Ok(HeaderValue::Float(3.5)));
        assert_eq!(evaluate("-3 + 1"), Ok(HeaderValue::Int(-2)));
    }

    #[test]
    fn names_are_never_evaluated() {
        let content = parse("cmd: !__import__('os')\n\n");
        assert_eq!(
            content.header.get("cmd"),
            Some(HeaderValue::Text("!__import__('os')".into()))
        );
    }

    #[test]
    fn bad_expressions_are_rejected() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("(1 + 2").is_err());
        assert!(evaluate("1 2").is_err());
        assert!(evaluate("'open").is_err());
        assert!(evaluate("true * 'x'").is_err());
    }

    // =========================================================================
    // Markdown rendering
    // =========================================================================

    #[test]
    fn body_renders_markdown() {
        let content = parse("id: a\n\n# Title\n\nSome *text*.");
        assert!(content.html.contains("<h1>Title</h1>"));
        assert!(content.html.contains("<em>text</em>"));
    }

    #[test]
    fn tables_get_styled() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains(r#"<table class="table table-striped">"#));
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn directives_survive_markdown() {
        let html = markdown_to_html(
            "Photo: {{ img.logo|thumbnail(100, 50, \"round\") }} & \"quoted\"\n\n{% if page %}x{% endif %}",
        );
        assert!(html.contains(r#"{{ img.logo|thumbnail(100, 50, "round") }}"#));
        assert!(html.contains("{% if page %}x{% endif %}"));
        assert!(html.contains("&amp;"));
    }

    #[test]
    fn directives_survive_link_and_image_targets() {
        let html = markdown_to_html("[Home]({{ page.url }}) and ![x]({{ img.logo.url }})");
        assert!(html.contains(r#"<a href="{{ page.url }}">Home</a>"#), "{html}");
        assert!(html.contains(r#"<img src="{{ img.logo.url }}" alt="x""#), "{html}");
    }

    #[test]
    fn many_directives_restore_by_index() {
        let text: String = (0..12).map(|i| format!("{{{{ v{i} }}}} ")).collect();
        let html = markdown_to_html(&text);
        for i in 0..12 {
            assert!(html.contains(&format!("{{{{ v{i} }}}}")), "{html}");
        }
        assert!(!html.contains(SHIELD_OPEN));
    }

    #[test]
    fn unterminated_directive_is_plain_text() {
        let html = markdown_to_html("a {{ b");
        assert!(html.contains("a {{ b"));
    }

    #[test]
    fn single_braces_are_untouched() {
        let (shielded, directives) = shield_directives("fn() { x }");
        assert_eq!(shielded, "fn() { x }");
        assert!(directives.is_empty());
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn load_reads_utf8_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("intro.md");
        fs::write(&path, "title: Café\n\nBonjour").unwrap();
        let content = ContentBox::load(&path).unwrap();
        assert_eq!(content.header.title.as_deref(), Some("Café"));
        assert_eq!(content.path, path);
    }

    #[test]
    fn load_rejects_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("latin1.md");
        fs::write(&path, b"title: Caf\xe9\n").unwrap();
        let result = ContentBox::load(&path);
        assert!(matches!(result, Err(ContentError::Encoding(p)) if p == path));
    }

    #[test]
    fn load_missing_file_is_read_error() {
        let result = ContentBox::load(Path::new("/nonexistent/page.md"));
        assert!(matches!(result, Err(ContentError::Read { .. })));
    }
}
