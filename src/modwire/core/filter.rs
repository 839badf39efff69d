//! LDAP-style filter expressions over capability properties.
//!
//! The grammar is the classic one: `(&(a=1)(b>=2))`, `(|(..)(..))`,
//! `(!(..))`, with `=`, `~=`, `>=`, `<=` comparisons, `(attr=*)` presence
//! tests and `*` substring patterns inside `=` values. Comparisons are
//! version-aware when the attribute's value is a [`Version`].

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;

use crate::core::capability::Value;
use crate::core::interning::InternedString;
use crate::core::version::Version;
use crate::util::errors::InvalidFilterError;

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// `(attr=*)`
    Present(InternedString),
    Comparison {
        attr: InternedString,
        op: CompareOp,
        value: InternedString,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Approx,
    Ge,
    Le,
}

impl Filter {
    /// A `(attr=value)` equality test.
    pub fn eq(attr: &str, value: &str) -> Filter {
        Filter::Comparison {
            attr: InternedString::new(attr),
            op: CompareOp::Eq,
            value: InternedString::new(value),
        }
    }

    /// Conjoins two filters into `(&(self)(other))`.
    pub fn and(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    /// Evaluates the filter against a property map.
    ///
    /// Absent attributes fail every comparison, so `(!(attr=x))` matches a
    /// capability that lacks `attr` entirely.
    pub fn matches(&self, properties: &IndexMap<InternedString, Value>) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|f| f.matches(properties)),
            Filter::Or(parts) => parts.iter().any(|f| f.matches(properties)),
            Filter::Not(inner) => !inner.matches(properties),
            Filter::Present(attr) => properties.contains_key(attr.as_str()),
            Filter::Comparison { attr, op, value } => match properties.get(attr.as_str()) {
                Some(actual) => compare(actual, *op, value.as_str()),
                None => false,
            },
        }
    }

    /// The package name targeted by this filter: the value of the first
    /// `(package=..)` equality, wildcards included; `(package=*)` yields
    /// `*`. `None` when the filter does not constrain the package
    /// attribute.
    pub fn target_package(&self) -> Option<InternedString> {
        match self {
            Filter::And(parts) | Filter::Or(parts) => {
                parts.iter().find_map(|f| f.target_package())
            }
            Filter::Not(_) => None,
            Filter::Present(attr) => {
                if attr.as_str() == "package" {
                    Some(InternedString::new("*"))
                } else {
                    None
                }
            }
            Filter::Comparison { attr, op, value } => {
                if attr.as_str() == "package" && *op == CompareOp::Eq {
                    Some(*value)
                } else {
                    None
                }
            }
        }
    }

    /// Specializes a dynamic-import pattern to the package actually
    /// requested: every `package` equality (wildcarded or not) collapses to
    /// the literal name, and one is conjoined if the pattern had none. The
    /// pattern `p.*` must accept the package `p` itself, which a plain
    /// substring conjunction would reject.
    pub fn pinned_to_package(&self, pkg: &str) -> Filter {
        let pkg = InternedString::new(pkg);
        let mut pinned = self.pin(pkg);
        if pinned.target_package() != Some(pkg) {
            pinned = pinned.and(Filter::eq("package", pkg.as_str()));
        }
        pinned
    }

    fn pin(&self, pkg: InternedString) -> Filter {
        match self {
            Filter::And(parts) => Filter::And(parts.iter().map(|f| f.pin(pkg)).collect()),
            Filter::Or(parts) => Filter::Or(parts.iter().map(|f| f.pin(pkg)).collect()),
            Filter::Not(inner) => Filter::Not(Box::new(inner.pin(pkg))),
            Filter::Present(attr) if attr.as_str() == "package" => Filter::Comparison {
                attr: *attr,
                op: CompareOp::Eq,
                value: pkg,
            },
            Filter::Comparison { attr, op, .. }
                if attr.as_str() == "package" && *op == CompareOp::Eq =>
            {
                Filter::Comparison {
                    attr: *attr,
                    op: CompareOp::Eq,
                    value: pkg,
                }
            }
            other => other.clone(),
        }
    }
}

fn compare(actual: &Value, op: CompareOp, literal: &str) -> bool {
    match actual {
        Value::Version(have) => match literal.parse::<Version>() {
            Ok(want) => match op {
                CompareOp::Eq | CompareOp::Approx => *have == want,
                CompareOp::Ge => *have >= want,
                CompareOp::Le => *have <= want,
            },
            Err(_) => false,
        },
        Value::Str(have) => match op {
            CompareOp::Eq => {
                if literal.contains('*') {
                    wildcard_match(literal, have.as_str())
                } else {
                    have.as_str() == literal
                }
            }
            CompareOp::Approx => have.as_str().eq_ignore_ascii_case(literal.trim()),
            CompareOp::Ge => have.as_str() >= literal,
            CompareOp::Le => have.as_str() <= literal,
        },
    }
}

/// Matches `pattern` (with `*` wildcards) against `input`.
fn wildcard_match(pattern: &str, input: &str) -> bool {
    let mut pieces = pattern.split('*');
    let first = pieces.next().unwrap_or("");
    if !input.starts_with(first) {
        return false;
    }
    let mut rest = &input[first.len()..];
    let mut pieces = pieces.peekable();
    while let Some(piece) = pieces.next() {
        if pieces.peek().is_none() {
            // Last piece anchors at the end.
            return piece.is_empty() || rest.ends_with(piece);
        }
        match rest.find(piece) {
            Some(idx) => rest = &rest[idx + piece.len()..],
            None => return false,
        }
    }
    rest.is_empty()
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(parts) => {
                write!(f, "(&")?;
                for p in parts {
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Filter::Or(parts) => {
                write!(f, "(|")?;
                for p in parts {
                    write!(f, "{}", p)?;
                }
                write!(f, ")")
            }
            Filter::Not(inner) => write!(f, "(!{})", inner),
            Filter::Present(attr) => write!(f, "({}=*)", attr),
            Filter::Comparison { attr, op, value } => {
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Approx => "~=",
                    CompareOp::Ge => ">=",
                    CompareOp::Le => "<=",
                };
                write!(f, "({}{}{})", attr, op, value)
            }
        }
    }
}

impl FromStr for Filter {
    type Err = InvalidFilterError;

    fn from_str(s: &str) -> Result<Filter, InvalidFilterError> {
        let mut parser = Parser {
            expr: s,
            bytes: s.as_bytes(),
            pos: 0,
        };
        parser.skip_whitespace();
        let filter = parser.filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.bytes.len() {
            return Err(parser.error("trailing characters after filter"));
        }
        Ok(filter)
    }
}

struct Parser<'a> {
    expr: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> InvalidFilterError {
        InvalidFilterError::new(self.expr, self.pos, reason)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, b: u8) -> Result<(), InvalidFilterError> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(match b {
                b'(' => "expected `(`",
                b')' => "expected `)`",
                _ => "unexpected character",
            }))
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn filter(&mut self) -> Result<Filter, InvalidFilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, InvalidFilterError> {
        let mut list = Vec::new();
        while self.peek() == Some(b'(') {
            list.push(self.filter()?);
        }
        if list.is_empty() {
            return Err(self.error("empty operand list"));
        }
        Ok(list)
    }

    fn item(&mut self) -> Result<Filter, InvalidFilterError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b'=' | b'<' | b'>' | b'~' | b'(' | b')') {
                break;
            }
            self.pos += 1;
        }
        let attr = self.expr[start..self.pos].trim();
        if attr.is_empty() {
            return Err(self.error("empty attribute name"));
        }
        let attr = InternedString::new(attr);

        let op = match self.bump() {
            Some(b'=') => CompareOp::Eq,
            Some(b'>') => {
                self.expect(b'=')?;
                CompareOp::Ge
            }
            Some(b'<') => {
                self.expect(b'=')?;
                CompareOp::Le
            }
            Some(b'~') => {
                self.expect(b'=')?;
                CompareOp::Approx
            }
            _ => return Err(self.error("expected comparison operator")),
        };

        let mut value = String::new();
        loop {
            match self.peek() {
                Some(b')') => break,
                Some(b'(') => return Err(self.error("unescaped `(` in value")),
                Some(b'\\') => {
                    self.pos += 1;
                    match self.bump() {
                        Some(b) => value.push(b as char),
                        None => return Err(self.error("dangling escape")),
                    }
                }
                Some(_) => {
                    // Multi-byte characters pass through untouched.
                    let next = self.expr[self.pos..]
                        .char_indices()
                        .nth(1)
                        .map(|(i, _)| self.pos + i)
                        .unwrap_or(self.bytes.len());
                    value.push_str(&self.expr[self.pos..next]);
                    self.pos = next;
                }
                None => return Err(self.error("unexpected end of filter")),
            }
        }

        if op == CompareOp::Eq && value == "*" {
            return Ok(Filter::Present(attr));
        }
        Ok(Filter::Comparison {
            attr,
            op,
            value: InternedString::new(&value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capability::Value;

    fn props(pairs: &[(&str, Value)]) -> IndexMap<InternedString, Value> {
        pairs
            .iter()
            .map(|(k, v)| (InternedString::new(k), v.clone()))
            .collect()
    }

    fn ver(s: &str) -> Value {
        Value::Version(s.parse().unwrap())
    }

    fn st(s: &str) -> Value {
        Value::Str(InternedString::new(s))
    }

    #[test]
    fn parse_round_trip() {
        for s in [
            "(package=org.example.api)",
            "(&(package=p)(version>=1.0.0))",
            "(|(a=1)(b~=x)(!(c<=2)))",
            "(name=*)",
            "(name=prefix*suffix)",
        ] {
            let f: Filter = s.parse().unwrap();
            assert_eq!(f.to_string(), s);
        }
    }

    #[test]
    fn parse_errors() {
        for s in ["", "(", "(a)", "(a=1", "(&)", "(a=1))", "(a=(b))"] {
            assert!(s.parse::<Filter>().is_err(), "`{}` should not parse", s);
        }
    }

    #[test]
    fn version_aware_comparison() {
        let f: Filter = "(&(package=p)(version>=1.10.0))".parse().unwrap();
        assert!(f.matches(&props(&[("package", st("p")), ("version", ver("1.10.0"))])));
        assert!(f.matches(&props(&[("package", st("p")), ("version", ver("2.0.0"))])));
        assert!(!f.matches(&props(&[("package", st("p")), ("version", ver("1.9.0"))])));
        assert!(!f.matches(&props(&[("package", st("q")), ("version", ver("2.0.0"))])));
    }

    #[test]
    fn absent_attribute_fails_comparison() {
        let f: Filter = "(version>=1.0.0)".parse().unwrap();
        assert!(!f.matches(&props(&[("package", st("p"))])));
        let f: Filter = "(!(version>=1.0.0))".parse().unwrap();
        assert!(f.matches(&props(&[("package", st("p"))])));
    }

    #[test]
    fn substring_and_presence() {
        let f: Filter = "(package=org.example.*)".parse().unwrap();
        assert!(f.matches(&props(&[("package", st("org.example.api"))])));
        assert!(!f.matches(&props(&[("package", st("org.other.api"))])));

        let f: Filter = "(package=*)".parse().unwrap();
        assert!(f.matches(&props(&[("package", st("anything"))])));
        assert!(!f.matches(&props(&[("module", st("m"))])));
    }

    #[test]
    fn escaped_values() {
        let f: Filter = r"(path=a\(b\))".parse().unwrap();
        assert!(f.matches(&props(&[("path", st("a(b)"))])));
    }

    #[test]
    fn target_package_extraction() {
        let f: Filter = "(&(package=p)(version>=1.0.0))".parse().unwrap();
        assert_eq!(f.target_package().unwrap().as_str(), "p");
        let f: Filter = "(version>=1.0.0)".parse().unwrap();
        assert!(f.target_package().is_none());
        let f: Filter = "(package=p.*)".parse().unwrap();
        assert_eq!(f.target_package().unwrap().as_str(), "p.*");
        let f: Filter = "(package=*)".parse().unwrap();
        assert_eq!(f.target_package().unwrap().as_str(), "*");
    }

    #[test]
    fn pinning_a_dynamic_pattern() {
        // A wildcard pattern pinned to a concrete package accepts the bare
        // prefix package, which the raw substring comparison would not.
        let pattern: Filter = "(&(package=p.*)(version>=1.0.0))".parse().unwrap();
        let pinned = pattern.pinned_to_package("p");
        assert!(pinned.matches(&props(&[("package", st("p")), ("version", ver("1.0.0"))])));
        assert!(!pinned.matches(&props(&[("package", st("p.q")), ("version", ver("1.0.0"))])));
        assert!(!pinned.matches(&props(&[("package", st("p")), ("version", ver("0.9.0"))])));

        let any: Filter = "(package=*)".parse().unwrap();
        let pinned = any.pinned_to_package("q.r");
        assert!(pinned.matches(&props(&[("package", st("q.r"))])));
        assert!(!pinned.matches(&props(&[("package", st("q"))])));

        // A pattern with no package term gets one conjoined.
        let bare: Filter = "(version>=1.0.0)".parse().unwrap();
        let pinned = bare.pinned_to_package("p");
        assert!(pinned.matches(&props(&[("package", st("p")), ("version", ver("2.0.0"))])));
        assert!(!pinned.matches(&props(&[("package", st("x")), ("version", ver("2.0.0"))])));
    }
}
