//! Member path resolution.
//!
//! Path text is a restricted surface compared to binding expressions: dotted
//! names, constant indexers, and optional markers only. Arbitrary
//! sub-expression indexers belong to the expression parser, not here.
//!
//! Resolution is cached globally per unique path string; resolving the same
//! text twice yields the same `Arc<MemberPath>`.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use thiserror::Error;
use tracing::trace;

use tether_core::Value;
use tether_core::provider::ITEM_MEMBER;

/// Malformed path text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("expected member name at offset {position}")]
    ExpectedName { position: usize },
    #[error("unexpected character '{found}' at offset {position}")]
    UnexpectedChar { position: usize, found: char },
    #[error("unterminated indexer starting at offset {position}")]
    UnterminatedIndex { position: usize },
    #[error("invalid indexer argument at offset {position}")]
    InvalidIndex { position: usize },
}

/// One step of a member path.
///
/// Indexer segments use the `Item` member name and carry their constant
/// arguments; plain segments have empty `args`.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: Arc<str>,
    pub args: Vec<Value>,
    pub optional: bool,
}

impl PathSegment {
    #[must_use]
    pub fn is_indexer(&self) -> bool {
        !self.args.is_empty()
    }
}

/// A parsed member path. The empty path addresses the root itself.
#[derive(Debug)]
pub struct MemberPath {
    text: Arc<str>,
    segments: Vec<PathSegment>,
}

static CACHE: Lazy<DashMap<Arc<str>, Arc<MemberPath>, ahash::RandomState>> =
    Lazy::new(DashMap::default);

impl MemberPath {
    /// Resolve path text, reusing the shared instance for seen text.
    /// Failures are not cached.
    pub fn resolve(text: &str) -> Result<Arc<Self>, PathError> {
        if let Some(hit) = CACHE.get(text) {
            return Ok(Arc::clone(&hit));
        }
        trace!(text, "resolving member path");
        let segments = parse_path(text)?;
        let path = Arc::new(Self {
            text: Arc::from(text),
            segments,
        });
        let entry = CACHE
            .entry(Arc::clone(&path.text))
            .or_insert_with(|| Arc::clone(&path));
        Ok(Arc::clone(&entry))
    }

    #[must_use]
    pub fn text(&self) -> &Arc<str> {
        &self.text
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True for the zero-segment path, which observes the root directly.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

fn parse_path(text: &str) -> Result<Vec<PathSegment>, PathError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut segments = Vec::new();
    let mut pos = 0usize; // index into `chars`

    if chars.is_empty() {
        return Ok(segments);
    }

    // First segment has no leading separator.
    match chars[pos].1 {
        '[' => segments.push(parse_indexer(&chars, &mut pos, false)?),
        _ => segments.push(parse_name(&chars, &mut pos, false)?),
    }

    while pos < chars.len() {
        let (offset, ch) = chars[pos];
        match ch {
            '.' => {
                pos += 1;
                segments.push(parse_name(&chars, &mut pos, false)?);
            }
            '[' => segments.push(parse_indexer(&chars, &mut pos, false)?),
            '?' => {
                match chars.get(pos + 1) {
                    Some((_, '.')) => {
                        pos += 2;
                        segments.push(parse_name(&chars, &mut pos, true)?);
                    }
                    Some((_, '[')) => {
                        pos += 1;
                        segments.push(parse_indexer(&chars, &mut pos, true)?);
                    }
                    _ => {
                        return Err(PathError::UnexpectedChar {
                            position: offset,
                            found: ch,
                        });
                    }
                };
            }
            other => {
                return Err(PathError::UnexpectedChar {
                    position: offset,
                    found: other,
                });
            }
        }
    }
    Ok(segments)
}

fn parse_name(
    chars: &[(usize, char)],
    pos: &mut usize,
    optional: bool,
) -> Result<PathSegment, PathError> {
    let start = *pos;
    while *pos < chars.len() {
        let c = chars[*pos].1;
        let valid = if *pos == start {
            c.is_alphabetic() || c == '_'
        } else {
            c.is_alphanumeric() || c == '_'
        };
        if !valid {
            break;
        }
        *pos += 1;
    }
    if *pos == start {
        let position = chars.get(start).map_or_else(
            || chars.last().map_or(0, |(o, c)| o + c.len_utf8()),
            |(o, _)| *o,
        );
        return Err(PathError::ExpectedName { position });
    }
    let name: String = chars[start..*pos].iter().map(|(_, c)| *c).collect();
    Ok(PathSegment {
        name: Arc::from(name.as_str()),
        args: Vec::new(),
        optional,
    })
}

fn parse_indexer(
    chars: &[(usize, char)],
    pos: &mut usize,
    optional: bool,
) -> Result<PathSegment, PathError> {
    let open = chars[*pos].0;
    *pos += 1; // '['
    let mut args = Vec::new();
    loop {
        skip_spaces(chars, pos);
        let Some(&(offset, ch)) = chars.get(*pos) else {
            return Err(PathError::UnterminatedIndex { position: open });
        };
        match ch {
            '"' => args.push(parse_string_arg(chars, pos)?),
            '-' => args.push(parse_int_arg(chars, pos)?),
            c if c.is_ascii_digit() => args.push(parse_int_arg(chars, pos)?),
            _ => {
                return Err(PathError::InvalidIndex { position: offset });
            }
        }
        skip_spaces(chars, pos);
        match chars.get(*pos) {
            Some((_, ',')) => *pos += 1,
            Some((_, ']')) => {
                *pos += 1;
                break;
            }
            Some(&(offset, _)) => return Err(PathError::InvalidIndex { position: offset }),
            None => return Err(PathError::UnterminatedIndex { position: open }),
        }
    }
    Ok(PathSegment {
        name: Arc::from(ITEM_MEMBER),
        args,
        optional,
    })
}

fn parse_int_arg(chars: &[(usize, char)], pos: &mut usize) -> Result<Value, PathError> {
    let start = *pos;
    if chars[*pos].1 == '-' {
        *pos += 1;
    }
    while chars.get(*pos).is_some_and(|(_, c)| c.is_ascii_digit()) {
        *pos += 1;
    }
    let text: String = chars[start..*pos].iter().map(|(_, c)| *c).collect();
    text.parse::<i64>()
        .map(Value::Int)
        .map_err(|_| PathError::InvalidIndex {
            position: chars[start].0,
        })
}

fn parse_string_arg(chars: &[(usize, char)], pos: &mut usize) -> Result<Value, PathError> {
    let open = chars[*pos].0;
    *pos += 1; // '"'
    let mut text = String::new();
    loop {
        let Some(&(_, ch)) = chars.get(*pos) else {
            return Err(PathError::UnterminatedIndex { position: open });
        };
        *pos += 1;
        match ch {
            '"' => break,
            '\\' => {
                let Some(&(offset, escaped)) = chars.get(*pos) else {
                    return Err(PathError::UnterminatedIndex { position: open });
                };
                *pos += 1;
                match escaped {
                    '"' => text.push('"'),
                    '\\' => text.push('\\'),
                    _ => return Err(PathError::InvalidIndex { position: offset }),
                }
            }
            other => text.push(other),
        }
    }
    Ok(Value::Str(Arc::from(text.as_str())))
}

fn skip_spaces(chars: &[(usize, char)], pos: &mut usize) {
    while chars.get(*pos).is_some_and(|(_, c)| *c == ' ') {
        *pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(path: &MemberPath) -> Vec<&str> {
        path.segments().iter().map(|s| &*s.name).collect()
    }

    #[test]
    fn plain_path() {
        let path = MemberPath::resolve("A.B.C").unwrap();
        assert_eq!(names(&path), ["A", "B", "C"]);
        assert!(path.segments().iter().all(|s| !s.optional));
    }

    #[test]
    fn empty_path_is_the_root() {
        let path = MemberPath::resolve("").unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn indexer_segments() {
        let path = MemberPath::resolve("Items[0].Name").unwrap();
        assert_eq!(names(&path), ["Items", "Item", "Name"]);
        assert_eq!(path.segments()[1].args, vec![Value::Int(0)]);
        assert!(path.segments()[1].is_indexer());
    }

    #[test]
    fn string_and_multi_args() {
        let path = MemberPath::resolve("Map[\"key\"]").unwrap();
        assert_eq!(path.segments()[1].args, vec![Value::from("key")]);
        let path = MemberPath::resolve("Grid[1, 2]").unwrap();
        assert_eq!(path.segments()[1].args, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn optional_markers() {
        let path = MemberPath::resolve("A?.B?[0]").unwrap();
        assert!(!path.segments()[0].optional);
        assert!(path.segments()[1].optional);
        assert!(path.segments()[2].optional);
    }

    #[test]
    fn resolution_is_cached() {
        let a = MemberPath::resolve("Cached.Path").unwrap();
        let b = MemberPath::resolve("Cached.Path").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn malformed_paths() {
        assert_eq!(
            MemberPath::resolve("A..B").unwrap_err(),
            PathError::ExpectedName { position: 2 }
        );
        assert_eq!(
            MemberPath::resolve("A.").unwrap_err(),
            PathError::ExpectedName { position: 2 }
        );
        assert_eq!(
            MemberPath::resolve("A[1").unwrap_err(),
            PathError::UnterminatedIndex { position: 1 }
        );
        assert_eq!(
            MemberPath::resolve("A[x]").unwrap_err(),
            PathError::InvalidIndex { position: 2 }
        );
        assert!(matches!(
            MemberPath::resolve("A?B").unwrap_err(),
            PathError::UnexpectedChar { position: 1, .. }
        ));
    }
}
