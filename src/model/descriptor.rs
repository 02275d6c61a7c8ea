//! Project descriptor parsing
//!
//! Descriptors are Leiningen `project.clj` files. Only the literal parts of
//! the `defproject` form are read: the project symbol, the version string and
//! the `:dependencies` vector. Nothing is evaluated, so descriptors that
//! compute their version (`~(slurp ...)`, `~version`) are unresolvable.

use thiserror::Error;

use super::maven::is_snapshot;

/// Default descriptor file name
pub const DESCRIPTOR_FILE: &str = "project.clj";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor is not valid UTF-8")]
    NotUtf8,
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unbalanced delimiter {0:?} at byte {1}")]
    Unbalanced(char, usize),
    #[error("no defproject form found")]
    NoDefproject,
    #[error("defproject name is not a symbol")]
    BadName,
    #[error("defproject version is not a literal string")]
    UnresolvableVersion,
    #[error("forms nested deeper than {0} levels")]
    TooDeep(usize),
}

/// A dependency declared in a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub version: String,
}

/// The literal metadata of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// `group/artifact`; a bare `artifact` is normalized to `artifact/artifact`
    pub name: String,
    pub version: String,
    pub dependencies: Vec<Dependency>,
}

impl ProjectInfo {
    /// True when any dependency is pinned to an unreleased version
    pub fn has_snapshot_deps(&self) -> bool {
        self.dependencies.iter().any(|d| is_snapshot(&d.version))
    }
}

/// Normalize a project symbol to `group/artifact`
pub fn normalize_name(symbol: &str) -> String {
    if symbol.contains('/') {
        symbol.to_string()
    } else {
        format!("{symbol}/{symbol}")
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Form {
    List(Vec<Form>),
    Vector(Vec<Form>),
    Str(String),
    Symbol(String),
    Keyword(String),
    /// Anything that only has meaning when evaluated
    Opaque,
    /// A `#_` discarded form
    Discarded,
}

/// Deepest form nesting accepted before giving up
const MAX_DEPTH: usize = 512;

struct Reader<'a> {
    src: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Reader<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            src: text.as_bytes(),
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\r' | b'\n' | b',' => self.pos += 1,
                b';' => {
                    while let Some(c) = self.peek() {
                        self.pos += 1;
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// Next form, or `None` at end of input
    fn next_form(&mut self) -> Result<Option<Form>, DescriptorError> {
        if self.depth >= MAX_DEPTH {
            return Err(DescriptorError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let form = self.read_form();
        self.depth -= 1;
        form
    }

    fn read_form(&mut self) -> Result<Option<Form>, DescriptorError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Ok(None);
        };
        let form = match c {
            b'(' => Form::List(self.read_seq(b')')?),
            b'[' => Form::Vector(self.read_seq(b']')?),
            b'{' => {
                self.read_seq(b'}')?;
                Form::Opaque
            }
            b')' | b']' | b'}' => return Err(DescriptorError::Unbalanced(c as char, self.pos)),
            b'"' => Form::Str(self.read_string()?),
            b'\'' | b'`' | b'~' | b'@' => {
                self.pos += 1;
                if self.peek() == Some(b'@') {
                    self.pos += 1;
                }
                self.required_form()?;
                Form::Opaque
            }
            b'^' => {
                // metadata applies to the following form
                self.pos += 1;
                self.required_form()?;
                return self.next_form();
            }
            b'#' => return self.read_dispatch(),
            b'\\' => {
                self.pos += 1;
                self.read_token();
                Form::Opaque
            }
            _ => {
                let token = self.read_token();
                if let Some(kw) = token.strip_prefix(':') {
                    Form::Keyword(kw.to_string())
                } else if token.starts_with(|c: char| c.is_ascii_digit()) {
                    Form::Opaque
                } else {
                    Form::Symbol(token)
                }
            }
        };
        Ok(Some(form))
    }

    fn required_form(&mut self) -> Result<Form, DescriptorError> {
        self.next_form()?.ok_or(DescriptorError::UnexpectedEof)
    }

    fn read_dispatch(&mut self) -> Result<Option<Form>, DescriptorError> {
        self.pos += 1;
        match self.peek() {
            Some(b'_') => {
                self.pos += 1;
                self.required_form()?;
                Ok(Some(Form::Discarded))
            }
            Some(b'{') => {
                self.read_seq(b'}')?;
                Ok(Some(Form::Opaque))
            }
            Some(b'(') => {
                self.read_seq(b')')?;
                Ok(Some(Form::Opaque))
            }
            Some(b'"') => {
                self.read_string()?;
                Ok(Some(Form::Opaque))
            }
            Some(_) => {
                // reader conditionals, tagged literals, var quotes
                self.read_token();
                self.required_form()?;
                Ok(Some(Form::Opaque))
            }
            None => Err(DescriptorError::UnexpectedEof),
        }
    }

    fn read_seq(&mut self, close: u8) -> Result<Vec<Form>, DescriptorError> {
        let open_at = self.pos;
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(DescriptorError::Unbalanced(close as char, open_at)),
                Some(c) if c == close => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => match self.required_form()? {
                    Form::Discarded => {}
                    form => items.push(form),
                },
            }
        }
    }

    fn read_string(&mut self) -> Result<String, DescriptorError> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let c = self.peek().ok_or(DescriptorError::UnexpectedEof)?;
            self.pos += 1;
            match c {
                b'"' => break,
                b'\\' => {
                    let escaped = self.peek().ok_or(DescriptorError::UnexpectedEof)?;
                    self.pos += 1;
                    out.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        other => other,
                    });
                }
                other => out.push(other),
            }
        }
        String::from_utf8(out).map_err(|_| DescriptorError::NotUtf8)
    }

    fn read_token(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() || b"()[]{}\",;".contains(&c) {
                break;
            }
            self.pos += 1;
        }
        String::from_utf8_lossy(&self.src[start..self.pos]).into_owned()
    }
}

fn read_dependencies(value: &Form) -> Vec<Dependency> {
    let Form::Vector(entries) = value else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Form::Vector(parts) => match (parts.first(), parts.get(1)) {
                (Some(Form::Symbol(name)), Some(Form::Str(version))) => Some(Dependency {
                    name: normalize_name(name),
                    version: version.clone(),
                }),
                _ => None,
            },
            _ => None,
        })
        .collect()
}

/// Parse the `defproject` form of a descriptor
pub fn parse_descriptor(text: &str) -> Result<ProjectInfo, DescriptorError> {
    let mut reader = Reader::new(text);
    while let Some(form) = reader.next_form()? {
        let Form::List(items) = form else {
            continue;
        };
        if !matches!(items.first(), Some(Form::Symbol(head)) if head == "defproject") {
            continue;
        }

        let name = match items.get(1) {
            Some(Form::Symbol(name)) => normalize_name(name),
            _ => return Err(DescriptorError::BadName),
        };
        let version = match items.get(2) {
            Some(Form::Str(version)) => version.clone(),
            _ => return Err(DescriptorError::UnresolvableVersion),
        };

        let mut dependencies = Vec::new();
        for pair in items[3..].chunks(2) {
            if let [Form::Keyword(key), value] = pair {
                if key == "dependencies" {
                    dependencies = read_dependencies(value);
                }
            }
        }

        return Ok(ProjectInfo {
            name,
            version,
            dependencies,
        });
    }
    Err(DescriptorError::NoDefproject)
}

/// Parse raw descriptor content, degrading every failure to `None`
pub fn read_descriptor(content: &[u8]) -> Option<ProjectInfo> {
    let text = match std::str::from_utf8(content) {
        Ok(text) => text,
        Err(_) => {
            tracing::debug!("descriptor content is not UTF-8");
            return None;
        }
    };
    match parse_descriptor(text) {
        Ok(info) => Some(info),
        Err(e) => {
            tracing::debug!("unresolvable descriptor: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
;; widget service
(defproject org.example/widget "1.4.0-SNAPSHOT"
  :description "Widgets, with \"quotes\""
  :url "http://example.org"
  :dependencies [[org.clojure/clojure "1.11.1"]
                 [cheshire "5.12.0" :exclusions [com.fasterxml.jackson.core/jackson-core]]
                 #_[ignored "0.0.1"]]
  :profiles {:dev {:dependencies [[midje "1.10.9"]]}}
  :jvm-opts ^:replace ["-Xmx1g"])
"#;

    #[test]
    fn test_parse_sample() {
        let info = parse_descriptor(SAMPLE).unwrap();
        assert_eq!(info.name, "org.example/widget");
        assert_eq!(info.version, "1.4.0-SNAPSHOT");
        assert_eq!(
            info.dependencies,
            vec![
                Dependency {
                    name: "org.clojure/clojure".to_string(),
                    version: "1.11.1".to_string()
                },
                Dependency {
                    name: "cheshire/cheshire".to_string(),
                    version: "5.12.0".to_string()
                },
            ]
        );
        assert!(!info.has_snapshot_deps());
    }

    #[test]
    fn test_snapshot_dependencies() {
        let text = r#"(defproject app "0.1.0" :dependencies [[lib "2.0.0-SNAPSHOT"]])"#;
        let info = parse_descriptor(text).unwrap();
        assert_eq!(info.name, "app/app");
        assert!(info.has_snapshot_deps());
    }

    #[test]
    fn test_forms_before_defproject() {
        let text = r#"(def version "9.9.9")
(defproject app "0.2.0")"#;
        assert_eq!(parse_descriptor(text).unwrap().version, "0.2.0");
    }

    #[test]
    fn test_computed_version_is_unresolvable() {
        let text = r#"(defproject app ~(slurp "VERSION") :dependencies [])"#;
        assert_eq!(parse_descriptor(text), Err(DescriptorError::UnresolvableVersion));
        assert!(read_descriptor(text.as_bytes()).is_none());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let nested = |depth: usize| {
            format!(
                "(defproject a \"1.0\" :x {}{})",
                "[".repeat(depth),
                "]".repeat(depth)
            )
        };

        let shallow = parse_descriptor(&nested(100)).unwrap();
        assert_eq!(shallow.version, "1.0");

        let deep = nested(20_000);
        assert_eq!(parse_descriptor(&deep), Err(DescriptorError::TooDeep(MAX_DEPTH)));
        assert!(read_descriptor(deep.as_bytes()).is_none());

        let metadata = format!("(defproject a \"1.0\" {}x)", "^:m ".repeat(20_000));
        assert!(read_descriptor(metadata.as_bytes()).is_none());
    }

    #[test]
    fn test_malformed_input() {
        assert!(matches!(
            parse_descriptor(r#"(defproject app "1.0" :dependencies [[a "1"]"#),
            Err(DescriptorError::Unbalanced(']', _))
        ));
        assert_eq!(parse_descriptor("(ns foo)"), Err(DescriptorError::NoDefproject));
        assert_eq!(parse_descriptor(r#"(defproject "app" "1.0")"#), Err(DescriptorError::BadName));
        assert!(read_descriptor(&[0xff, 0xfe, b'(']).is_none());
    }
}
