//! 结构路径：点分键名 + 方括号数组下标，例如 `a.b[2].c`
//!
//! 路径是平面视图与源文档之间的寻址方式。空键名以及含 `.`、`[`、`]` 的键名
//! 渲染为带引号的方括号形式（`a["v1.2"]`），引号内 `"` 与 `\` 以反斜杠转义，
//! 因此任意路径渲染后都能解析回同一路径。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    Key(String),
    Index(usize),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("路径括号未闭合: {text}")]
    UnterminatedBracket { text: String },
    #[error("数组下标无效: [{index}]")]
    InvalidIndex { index: String },
    #[error("下标之后存在多余字符: {segment}")]
    TrailingText { segment: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    /// 根路径（空步骤序列）
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, PathError> {
        let mut steps = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            if let Some(tail) = rest.strip_prefix('.') {
                rest = tail;
                continue;
            }
            let Some(inner) = rest.strip_prefix('[') else {
                let end = rest.find(|c: char| c == '.' || c == '[').unwrap_or(rest.len());
                steps.push(Step::Key(rest[..end].to_string()));
                rest = &rest[end..];
                continue;
            };
            let unterminated = || PathError::UnterminatedBracket {
                text: text.to_string(),
            };
            rest = match inner.strip_prefix('"') {
                Some(quoted) => {
                    let (key, after) = parse_quoted(quoted).ok_or_else(unterminated)?;
                    steps.push(Step::Key(key));
                    after.strip_prefix(']').ok_or_else(unterminated)?
                }
                None => {
                    let close = inner.find(']').ok_or_else(unterminated)?;
                    let digits = &inner[..close];
                    let index = digits
                        .trim()
                        .parse::<usize>()
                        .map_err(|_| PathError::InvalidIndex {
                            index: digits.to_string(),
                        })?;
                    steps.push(Step::Index(index));
                    &inner[close + 1..]
                }
            };
            if !(rest.is_empty() || rest.starts_with('.') || rest.starts_with('[')) {
                return Err(PathError::TrailingText {
                    segment: text.to_string(),
                });
            }
        }
        Ok(Self { steps })
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            match step {
                Step::Key(key) if needs_quotes(key) => {
                    out.push_str("[\"");
                    for c in key.chars() {
                        if c == '"' || c == '\\' {
                            out.push('\\');
                        }
                        out.push(c);
                    }
                    out.push_str("\"]");
                }
                Step::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                Step::Index(index) => {
                    out.push('[');
                    out.push_str(&index.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    pub fn push_key(&mut self, key: impl Into<String>) {
        self.steps.push(Step::Key(key.into()));
    }

    pub fn push_index(&mut self, index: usize) {
        self.steps.push(Step::Index(index));
    }

    pub fn pop(&mut self) -> Option<Step> {
        self.steps.pop()
    }

    pub fn child_key(&self, key: impl Into<String>) -> Self {
        let mut out = self.clone();
        out.push_key(key);
        out
    }

    pub fn child_index(&self, index: usize) -> Self {
        let mut out = self.clone();
        out.push_index(index);
        out
    }

    pub fn join(&self, tail: &Path) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(tail.steps.iter().cloned());
        Self { steps }
    }

    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.steps.starts_with(&prefix.steps)
    }

    /// 前 `len` 个步骤构成的路径
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            steps: self.steps[..len.min(self.steps.len())].to_vec(),
        }
    }
}

fn needs_quotes(key: &str) -> bool {
    key.is_empty() || key.contains(|c: char| matches!(c, '.' | '[' | ']'))
}

/// 读取引号内的键名（起始引号已去掉），返回键名与闭合引号之后的剩余文本
fn parse_quoted(text: &str) -> Option<(String, &str)> {
    let mut key = String::new();
    let mut chars = text.char_indices();
    while let Some((pos, c)) = chars.next() {
        match c {
            '\\' => key.push(chars.next()?.1),
            '"' => return Some((key, &text[pos + 1..])),
            _ => key.push(c),
        }
    }
    None
}

impl From<Vec<Step>> for Path {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Path::parse(&s)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.render()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> Step {
        Step::Key(k.to_string())
    }

    #[test]
    fn test_parse_keys_and_indexes() {
        let path = Path::parse("a.b[2].c").unwrap();
        assert_eq!(
            path.steps(),
            &[key("a"), key("b"), Step::Index(2), key("c")]
        );
    }

    #[test]
    fn test_repeated_brackets_and_leading_index() {
        let path = Path::parse("[0].grid[1][2]").unwrap();
        assert_eq!(
            path.steps(),
            &[Step::Index(0), key("grid"), Step::Index(1), Step::Index(2)]
        );
        assert_eq!(path.render(), "[0].grid[1][2]");
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        let path = Path::parse("..users..name.").unwrap();
        assert_eq!(path.steps(), &[key("users"), key("name")]);
        assert!(Path::parse("").unwrap().is_root());
    }

    #[test]
    fn test_render_round_trip() {
        for text in ["a.b[2].c", "users", "users[0].tags[3].k", "[4]", ""] {
            assert_eq!(Path::parse(text).unwrap().render(), text, "往返失败: {text}");
        }
    }

    #[test]
    fn test_awkward_keys_are_quoted() {
        for k in ["v1.2", "a[0]", "", "say \"hi\"", "back\\slash]"] {
            let path = Path::root().child_key("rows").child_index(1).child_key(k);
            let text = path.render();
            assert_eq!(Path::parse(&text).unwrap(), path, "往返失败: {text}");
        }
        assert_eq!(Path::root().child_key("v1.2").render(), r#"["v1.2"]"#);
        assert_eq!(Path::root().child_key("c").child_key("v1.2").render(), r#"c["v1.2"]"#);
        assert_eq!(
            Path::parse(r#"c["v1.2"].x"#).unwrap().steps(),
            &[key("c"), key("v1.2"), key("x")]
        );
        assert!(matches!(
            Path::parse(r#"["v1.2"#).unwrap_err(),
            PathError::UnterminatedBracket { .. }
        ));
    }

    #[test]
    fn test_unterminated_bracket() {
        let err = Path::parse("a.b[2.c").unwrap_err();
        assert!(matches!(err, PathError::UnterminatedBracket { .. }));
    }

    #[test]
    fn test_invalid_index_and_trailing_text() {
        assert!(matches!(
            Path::parse("a[x]").unwrap_err(),
            PathError::InvalidIndex { .. }
        ));
        assert!(matches!(
            Path::parse("a[-1]").unwrap_err(),
            PathError::InvalidIndex { .. }
        ));
        assert!(matches!(
            Path::parse("a[1]b").unwrap_err(),
            PathError::TrailingText { .. }
        ));
    }

    #[test]
    fn test_builders_and_prefix() {
        let table = Path::parse("users").unwrap();
        let cell = table.child_index(3).child_key("name");
        assert_eq!(cell.render(), "users[3].name");
        assert!(cell.starts_with(&table));
        assert_eq!(cell.prefix(2).render(), "users[3]");
        assert_eq!(table.join(&Path::parse("[1].x").unwrap()).render(), "users[1].x");
    }

    #[test]
    fn test_serde_as_text() {
        let path = Path::parse("a[1].b").unwrap();
        assert_eq!(serde_json::to_string(&path).unwrap(), r#""a[1].b""#);
        let back: Path = serde_json::from_str(r#""a[1].b""#).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<Path>(r#""a[1""#).is_err());
    }
}
