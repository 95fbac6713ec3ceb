//! Splits template source into text and action segments, then tokenizes
//! the inside of each action.

use serde_json::Number;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.a.b.c`
    Field(Vec<String>),
    /// `.`
    Dot,
    /// `$name.a.b`, where the bare root is `$`.
    Variable(String, Vec<String>),
    Ident(String),
    Str(String),
    Number(Number),
    Bool(bool),
    Nil,
    LParen,
    RParen,
    Pipe,
    Declare,
    Assign,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Segment {
    Text(String),
    Action { tokens: Vec<Token>, line: usize },
    Comment,
}

/// Lex a whole template, applying `{{-` / `-}}` trim markers to neighbouring text.
pub(crate) fn lex(source: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut line = 1;
    let mut trim_next_text = false;

    while !rest.is_empty() {
        let Some(start) = rest.find(OPEN) else {
            push_text(&mut segments, rest, trim_next_text);
            break;
        };

        let text = &rest[..start];
        line += text.matches('\n').count();
        let after_open = &rest[start + OPEN.len()..];

        let trim_left = has_left_trim(after_open);
        if trim_left {
            push_text(&mut segments, text.trim_end(), trim_next_text);
        } else {
            push_text(&mut segments, text, trim_next_text);
        }

        let inner_start = if trim_left { &after_open[2..] } else { after_open };
        let close = find_close(inner_start)
            .ok_or_else(|| format!("line {}: unclosed action", line))?;
        let inner = &inner_start[..close];
        rest = &inner_start[close + CLOSE.len()..];

        let (inner, trim_right) = match inner.strip_suffix('-') {
            Some(stripped) if stripped.ends_with(is_trim_space) => (stripped, true),
            _ => (inner, false),
        };
        trim_next_text = trim_right;

        let body = inner.trim();
        if let Some(comment) = body.strip_prefix("/*") {
            if !comment.ends_with("*/") {
                return Err(format!("line {}: unclosed comment", line));
            }
            segments.push(Segment::Comment);
        } else {
            let tokens = tokenize(body).map_err(|e| format!("line {}: {}", line, e))?;
            if tokens.is_empty() {
                return Err(format!("line {}: missing value for command", line));
            }
            segments.push(Segment::Action { tokens, line });
        }
        line += inner.matches('\n').count();
    }

    Ok(segments)
}

fn push_text(segments: &mut Vec<Segment>, text: &str, trim_start: bool) {
    let text = if trim_start { text.trim_start() } else { text };
    if !text.is_empty() {
        segments.push(Segment::Text(text.to_string()));
    }
}

fn has_left_trim(after_open: &str) -> bool {
    let mut chars = after_open.chars();
    chars.next() == Some('-') && chars.next().is_some_and(is_trim_space)
}

/// Trim markers only recognise ASCII spacing next to the dash.
fn is_trim_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

/// Find the closing delimiter, skipping over quoted strings and comments.
fn find_close(inner: &str) -> Option<usize> {
    let bytes = inner.as_bytes();
    let mut i = 0;
    let trimmed_start = inner.len() - inner.trim_start().len();
    if inner[trimmed_start..].starts_with("/*") {
        let end = inner[trimmed_start + 2..].find("*/")? + trimmed_start + 4;
        return inner[end..].find(CLOSE).map(|p| p + end);
    }
    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    i += 1;
                }
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') => return Some(i),
            _ => {}
        }
        i += 1;
    }
    None
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn tokenize(body: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Declare);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '.' => {
                if chars.get(i + 1).copied().is_some_and(is_ident_char) {
                    let (fields, next) = read_fields(&chars, i);
                    tokens.push(Token::Field(fields));
                    i = next;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            '$' => {
                let mut j = i + 1;
                while j < chars.len() && is_ident_char(chars[j]) {
                    j += 1;
                }
                let name: String = chars[i..j].iter().collect();
                let (fields, next) = read_fields(&chars, j);
                tokens.push(Token::Variable(name, fields));
                i = next;
            }
            '"' => {
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err("unterminated quoted string".to_string()),
                        Some('"') => break,
                        Some('\\') => {
                            let escaped = chars
                                .get(j + 1)
                                .ok_or_else(|| "unterminated quoted string".to_string())?;
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => *other,
                            });
                            j += 2;
                        }
                        Some(other) => {
                            value.push(*other);
                            j += 1;
                        }
                    }
                }
                tokens.push(Token::Str(value));
                i = j + 1;
            }
            '`' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&c| c == '`')
                    .ok_or_else(|| "unterminated raw string".to_string())?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(char::is_ascii_digit)) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].is_ascii_digit() || chars[j] == '.') {
                    j += 1;
                }
                let literal: String = chars[i..j].iter().collect();
                tokens.push(Token::Number(parse_number(&literal)?));
                i = j;
            }
            c if is_ident_char(c) => {
                let mut j = i;
                while j < chars.len() && is_ident_char(chars[j]) {
                    j += 1;
                }
                let word: String = chars[i..j].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(word),
                });
                i = j;
            }
            other => return Err(format!("unexpected {:?} in command", other)),
        }
    }

    Ok(tokens)
}

/// Read a `.a.b.c` chain starting at `start` (which may not be a dot).
fn read_fields(chars: &[char], start: usize) -> (Vec<String>, usize) {
    let mut fields = Vec::new();
    let mut i = start;
    while chars.get(i) == Some(&'.') && chars.get(i + 1).copied().is_some_and(is_ident_char) {
        let mut j = i + 1;
        while j < chars.len() && is_ident_char(chars[j]) {
            j += 1;
        }
        fields.push(chars[i + 1..j].iter().collect());
        i = j;
    }
    (fields, i)
}

fn parse_number(literal: &str) -> Result<Number, String> {
    if let Ok(n) = literal.parse::<i64>() {
        return Ok(Number::from(n));
    }
    literal
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| format!("bad number syntax: {:?}", literal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(tokens: Vec<Token>) -> Segment {
        Segment::Action { tokens, line: 1 }
    }

    #[test]
    fn test_text_and_field() {
        let segments = lex("Hello {{.user.name}}!").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("Hello ".into()),
                action(vec![Token::Field(vec!["user".into(), "name".into()])]),
                Segment::Text("!".into()),
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let segments = lex("a  \n{{- .x -}}\n  b").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("a".into()),
                action(vec![Token::Field(vec!["x".into()])]),
                Segment::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_trim_marker_needs_ascii_space() {
        let err = lex("{{-\u{00A0}.x}}").unwrap_err();
        assert!(err.contains("unexpected '-'"), "{}", err);
        assert!(lex("{{.x -\u{2003}}}").is_err());
        assert_eq!(lex("{{-\t.x\r-}}").unwrap(), vec![action(vec![Token::Field(vec!["x".into()])])]);
    }

    #[test]
    fn test_negative_number_is_not_trim() {
        let segments = lex("{{-3}}").unwrap();
        assert_eq!(segments, vec![action(vec![Token::Number(Number::from(-3))])]);
    }

    #[test]
    fn test_declaration_and_pipe() {
        let segments = lex(r#"{{$x := .a | printf "%s}}" }}"#).unwrap();
        assert_eq!(
            segments,
            vec![action(vec![
                Token::Variable("$x".into(), vec![]),
                Token::Declare,
                Token::Field(vec!["a".into()]),
                Token::Pipe,
                Token::Ident("printf".into()),
                Token::Str("%s}}".into()),
            ])]
        );
    }

    #[test]
    fn test_comment() {
        let segments = lex("a{{/* note }} */}}b").unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Text("a".into()),
                Segment::Comment,
                Segment::Text("b".into()),
            ]
        );
    }

    #[test]
    fn test_unclosed_action() {
        let err = lex("line one\n{{ .x ").unwrap_err();
        assert!(err.contains("line 2"));
    }
}
