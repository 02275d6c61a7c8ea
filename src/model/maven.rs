//! Maven version ordering and version ranges
//!
//! Implements the ordering of Maven's `ComparableVersion`: versions split into
//! numeric and qualifier items on `.`, `-` and digit/letter transitions, with
//! well-known qualifiers ranked `alpha < beta < milestone < rc < snapshot <
//! (release) < sp`. A `-SNAPSHOT` version therefore sorts just below its
//! release.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

const QUALIFIERS: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];
const RELEASE_INDEX: &str = "5";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// Decimal digits with leading zeros stripped
    Int(String),
    Str(String),
    List(Vec<Item>),
}

impl Item {
    fn int(digits: &str) -> Item {
        let trimmed = digits.trim_start_matches('0');
        Item::Int(trimmed.to_string())
    }

    fn string(value: &str, followed_by_digit: bool) -> Item {
        let value = if followed_by_digit && value.len() == 1 {
            match value {
                "a" => "alpha",
                "b" => "beta",
                "m" => "milestone",
                other => other,
            }
        } else {
            value
        };
        let value = match value {
            "ga" | "final" | "release" => "",
            "cr" => "rc",
            other => other,
        };
        Item::Str(value.to_string())
    }

    fn is_null(&self) -> bool {
        match self {
            Item::Int(digits) => digits.is_empty(),
            Item::Str(s) => comparable_qualifier(s) == RELEASE_INDEX,
            Item::List(items) => items.is_empty(),
        }
    }

    fn compare(&self, other: Option<&Item>) -> Ordering {
        match (self, other) {
            (Item::Int(digits), None) => {
                if digits.is_empty() {
                    Ordering::Equal
                } else {
                    Ordering::Greater
                }
            }
            (Item::Int(a), Some(Item::Int(b))) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            (Item::Int(_), Some(_)) => Ordering::Greater,

            (Item::Str(s), None) => comparable_qualifier(s).as_str().cmp(RELEASE_INDEX),
            (Item::Str(_), Some(Item::Int(_))) => Ordering::Less,
            (Item::Str(a), Some(Item::Str(b))) => comparable_qualifier(a).cmp(&comparable_qualifier(b)),
            (Item::Str(_), Some(Item::List(_))) => Ordering::Less,

            (Item::List(items), None) => match items.first() {
                Some(first) => first.compare(None),
                None => Ordering::Equal,
            },
            (Item::List(_), Some(Item::Int(_))) => Ordering::Less,
            (Item::List(_), Some(Item::Str(_))) => Ordering::Greater,
            (Item::List(a), Some(Item::List(b))) => compare_lists(a, b),
        }
    }
}

fn compare_lists(a: &[Item], b: &[Item]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let result = match (a.get(i), b.get(i)) {
            (Some(left), right) => left.compare(right),
            (None, Some(right)) => right.compare(None).reverse(),
            (None, None) => Ordering::Equal,
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}

fn comparable_qualifier(qualifier: &str) -> String {
    match QUALIFIERS.iter().position(|q| *q == qualifier) {
        Some(i) => i.to_string(),
        None => format!("{}-{}", QUALIFIERS.len(), qualifier),
    }
}

/// Remove null items from the tail. Trailing sub-lists are stepped over, so
/// `1.0-SNAPSHOT` and `1-SNAPSHOT` normalize alike. Inner lists go first.
fn normalize(items: &mut Vec<Item>) {
    for item in items.iter_mut() {
        if let Item::List(inner) = item {
            normalize(inner);
        }
    }
    let mut i = items.len();
    while i > 0 {
        i -= 1;
        if items[i].is_null() {
            items.remove(i);
        } else if !matches!(items[i], Item::List(_)) {
            break;
        }
    }
}

fn parse_item(is_digit: bool, text: &str, followed_by_digit: bool) -> Item {
    if is_digit {
        Item::int(text)
    } else {
        Item::string(text, followed_by_digit)
    }
}

/// A version comparable under Maven's ordering rules
#[derive(Debug, Clone)]
pub struct MavenVersion {
    original: String,
    items: Vec<Item>,
}

impl MavenVersion {
    pub fn parse(version: &str) -> Self {
        let canonical = version.to_ascii_lowercase();
        let chars: Vec<char> = canonical.chars().collect();

        // Nested lists are tracked as a stack of open vectors; closing pops
        // the innermost into its parent.
        let mut stack: Vec<Vec<Item>> = vec![Vec::new()];
        let mut is_digit = false;
        let mut start = 0;

        let text = |from: usize, to: usize| -> String { chars[from..to].iter().collect() };

        for i in 0..chars.len() {
            let c = chars[i];
            let top = stack.len() - 1;
            if c == '.' {
                if i == start {
                    stack[top].push(Item::Int(String::new()));
                } else {
                    stack[top].push(parse_item(is_digit, &text(start, i), false));
                }
                start = i + 1;
            } else if c == '-' {
                if i == start {
                    stack[top].push(Item::Int(String::new()));
                } else {
                    stack[top].push(parse_item(is_digit, &text(start, i), false));
                }
                start = i + 1;
                stack.push(Vec::new());
            } else if c.is_ascii_digit() {
                if !is_digit && i > start {
                    stack[top].push(Item::string(&text(start, i), true));
                    start = i;
                    stack.push(Vec::new());
                }
                is_digit = true;
            } else {
                if is_digit && i > start {
                    stack[top].push(parse_item(true, &text(start, i), false));
                    start = i;
                    stack.push(Vec::new());
                }
                is_digit = false;
            }
        }
        if chars.len() > start {
            let top = stack.len() - 1;
            stack[top].push(parse_item(is_digit, &text(start, chars.len()), false));
        }

        while stack.len() > 1 {
            let inner = stack.pop().unwrap_or_default();
            if let Some(parent) = stack.last_mut() {
                parent.push(Item::List(inner));
            }
        }
        let mut items = stack.pop().unwrap_or_default();
        normalize(&mut items);

        MavenVersion {
            original: version.to_string(),
            items,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn is_snapshot(&self) -> bool {
        is_snapshot(&self.original)
    }
}

/// True for versions carrying the unreleased `-SNAPSHOT` marker
pub fn is_snapshot(version: &str) -> bool {
    version.to_ascii_uppercase().ends_with("SNAPSHOT")
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_lists(&self.items, &other.items)
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("unbalanced version range: {0}")]
    Unbalanced(String),
    #[error("version range has more than two bounds: {0}")]
    TooManyBounds(String),
    #[error("single version must be surrounded by []: {0}")]
    SingleNotInclusive(String),
    #[error("lower bound is above upper bound: {0}")]
    Inverted(String),
}

#[derive(Debug, Clone)]
struct Bound {
    version: MavenVersion,
    inclusive: bool,
}

#[derive(Debug, Clone)]
struct Restriction {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Restriction {
    fn contains(&self, version: &MavenVersion) -> bool {
        if let Some(lower) = &self.lower {
            match version.cmp(&lower.version) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match version.cmp(&upper.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }

    fn parse(spec: &str) -> Result<Restriction, RangeError> {
        let lower_inclusive = spec.starts_with('[');
        let upper_inclusive = spec.ends_with(']');
        let inner = spec[1..spec.len() - 1].trim();

        match inner.split_once(',') {
            None => {
                if !(lower_inclusive && upper_inclusive) {
                    return Err(RangeError::SingleNotInclusive(spec.to_string()));
                }
                let version = MavenVersion::parse(inner);
                Ok(Restriction {
                    lower: Some(Bound { version: version.clone(), inclusive: true }),
                    upper: Some(Bound { version, inclusive: true }),
                })
            }
            Some((low, high)) => {
                if high.contains(',') {
                    return Err(RangeError::TooManyBounds(spec.to_string()));
                }
                let (low, high) = (low.trim(), high.trim());
                let lower = (!low.is_empty()).then(|| Bound {
                    version: MavenVersion::parse(low),
                    inclusive: lower_inclusive,
                });
                let upper = (!high.is_empty()).then(|| Bound {
                    version: MavenVersion::parse(high),
                    inclusive: upper_inclusive,
                });
                if let (Some(l), Some(u)) = (&lower, &upper) {
                    if l.version > u.version {
                        return Err(RangeError::Inverted(spec.to_string()));
                    }
                }
                Ok(Restriction { lower, upper })
            }
        }
    }
}

/// A Maven version range such as `[1.0,2.0)` or `(,1.0],[1.2,)`
#[derive(Debug, Clone)]
pub struct VersionRange {
    spec: String,
    restrictions: Vec<Restriction>,
}

impl VersionRange {
    pub fn parse(spec: &str) -> Result<Self, RangeError> {
        let mut restrictions = Vec::new();
        let mut rest = spec.trim();

        while !rest.is_empty() {
            if !(rest.starts_with('[') || rest.starts_with('(')) {
                return Err(RangeError::Unbalanced(spec.to_string()));
            }
            let close = rest
                .find([']', ')'])
                .ok_or_else(|| RangeError::Unbalanced(spec.to_string()))?;
            restrictions.push(Restriction::parse(&rest[..=close])?);
            rest = rest[close + 1..].trim_start();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim_start();
            }
        }

        if restrictions.is_empty() {
            return Err(RangeError::Unbalanced(spec.to_string()));
        }
        Ok(VersionRange {
            spec: spec.to_string(),
            restrictions,
        })
    }

    pub fn contains(&self, version: &MavenVersion) -> bool {
        self.restrictions.iter().any(|r| r.contains(version))
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec)
    }
}

/// A user-supplied version constraint: either a Maven range or a plain
/// prefix of the version string.
#[derive(Debug, Clone)]
pub enum VersionConstraint {
    Range(VersionRange),
    Prefix(String),
}

impl VersionConstraint {
    pub fn parse(spec: &str) -> Result<Self, RangeError> {
        let spec = spec.trim();
        if spec.starts_with('[') || spec.starts_with('(') {
            Ok(VersionConstraint::Range(VersionRange::parse(spec)?))
        } else {
            Ok(VersionConstraint::Prefix(spec.to_string()))
        }
    }

    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionConstraint::Range(range) => range.contains(&MavenVersion::parse(version)),
            VersionConstraint::Prefix(prefix) => version.starts_with(prefix.as_str()),
        }
    }
}
