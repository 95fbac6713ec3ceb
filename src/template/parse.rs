//! Builds the node tree from lexed segments.

use serde_json::Number;

use super::funcs;
use super::lexer::{Segment, Token};

#[derive(Debug, Clone)]
pub(crate) enum Node {
    Text(String),
    Action(Pipeline),
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Range {
        branch: Branch,
        otherwise: Option<Vec<Node>>,
    },
    With {
        branch: Branch,
        otherwise: Option<Vec<Node>>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Branch {
    pub pipe: Pipeline,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone)]
pub(crate) struct Pipeline {
    /// Variables declared (`:=`) or assigned (`=`) by this pipeline.
    pub decl: Vec<String>,
    pub is_assign: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone)]
pub(crate) struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Variable(String, Vec<String>),
    Function(String),
    Str(String),
    Number(Number),
    Bool(bool),
    Nil,
    Pipeline(Box<Pipeline>),
}

enum Stop {
    End,
    Else(Vec<Token>),
    Eof,
}

pub(crate) fn parse(segments: Vec<Segment>) -> Result<Vec<Node>, String> {
    let mut parser = Parser {
        segments: segments.into_iter(),
        declared: vec!["$".to_string()],
    };
    let (nodes, stop) = parser.parse_list()?;
    match stop {
        Stop::Eof => Ok(nodes),
        Stop::End => Err("unexpected {{end}}".to_string()),
        Stop::Else(_) => Err("unexpected {{else}}".to_string()),
    }
}

struct Parser {
    segments: std::vec::IntoIter<Segment>,
    /// Variables in scope, checked at parse time like undefined functions.
    declared: Vec<String>,
}

impl Parser {
    fn parse_list(&mut self) -> Result<(Vec<Node>, Stop), String> {
        let mut nodes = Vec::new();

        while let Some(segment) = self.segments.next() {
            let (tokens, line) = match segment {
                Segment::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Segment::Comment => continue,
                Segment::Action { tokens, line } => (tokens, line),
            };

            let keyword = match tokens.first() {
                Some(Token::Ident(word)) => word.as_str(),
                _ => "",
            };
            let at = |e: String| format!("line {}: {}", line, e);

            match keyword {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(at("unexpected tokens after end".to_string()));
                    }
                    return Ok((nodes, Stop::End));
                }
                "else" => return Ok((nodes, Stop::Else(tokens[1..].to_vec()))),
                "if" => nodes.push(self.parse_if(&tokens[1..]).map_err(at)?),
                "range" => {
                    let scope = self.declared.len();
                    let pipe = self.parse_pipeline(&tokens[1..], "range").map_err(at)?;
                    let (body, otherwise) = self.parse_body("range").map_err(at)?;
                    self.declared.truncate(scope);
                    nodes.push(Node::Range {
                        branch: Branch { pipe, body },
                        otherwise,
                    });
                }
                "with" => {
                    let scope = self.declared.len();
                    let pipe = self.parse_pipeline(&tokens[1..], "with").map_err(at)?;
                    let (body, otherwise) = self.parse_body("with").map_err(at)?;
                    self.declared.truncate(scope);
                    nodes.push(Node::With {
                        branch: Branch { pipe, body },
                        otherwise,
                    });
                }
                "define" | "template" | "block" | "break" | "continue" => {
                    return Err(at(format!("unsupported action {:?}", keyword)));
                }
                _ => nodes.push(Node::Action(
                    self.parse_pipeline(&tokens, "command").map_err(at)?,
                )),
            }
        }

        Ok((nodes, Stop::Eof))
    }

    /// Parse a block body followed by an optional plain `{{else}}` list.
    fn parse_body(&mut self, context: &str) -> Result<(Vec<Node>, Option<Vec<Node>>), String> {
        let (body, stop) = self.parse_list()?;
        match stop {
            Stop::End => Ok((body, None)),
            Stop::Else(rest) if rest.is_empty() => {
                let (otherwise, stop) = self.parse_list()?;
                match stop {
                    Stop::End => Ok((body, Some(otherwise))),
                    Stop::Else(_) => Err(format!("expected end; found else in {}", context)),
                    Stop::Eof => Err(format!("unexpected EOF in {}", context)),
                }
            }
            Stop::Else(_) => Err(format!("unexpected tokens after else in {}", context)),
            Stop::Eof => Err(format!("unexpected EOF in {}", context)),
        }
    }

    fn parse_if(&mut self, tokens: &[Token]) -> Result<Node, String> {
        let scope = self.declared.len();
        let mut branches = Vec::new();
        let mut pipe = self.parse_pipeline(tokens, "if")?;

        loop {
            let (body, stop) = self.parse_list()?;
            branches.push(Branch { pipe, body });
            match stop {
                Stop::End => {
                    self.declared.truncate(scope);
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    });
                }
                Stop::Else(rest) if rest.is_empty() => {
                    let (otherwise, stop) = self.parse_list()?;
                    self.declared.truncate(scope);
                    return match stop {
                        Stop::End => Ok(Node::If {
                            branches,
                            otherwise: Some(otherwise),
                        }),
                        Stop::Else(_) => Err("expected end; found else in if".to_string()),
                        Stop::Eof => Err("unexpected EOF in if".to_string()),
                    };
                }
                Stop::Else(rest) => match rest.first() {
                    Some(Token::Ident(word)) if word == "if" => {
                        pipe = self.parse_pipeline(&rest[1..], "if")?;
                    }
                    _ => return Err("unexpected tokens after else in if".to_string()),
                },
                Stop::Eof => return Err("unexpected EOF in if".to_string()),
            }
        }
    }

    fn parse_pipeline(&mut self, tokens: &[Token], context: &str) -> Result<Pipeline, String> {
        let (decl, is_assign, rest) = self.split_declaration(tokens, context)?;
        if rest.is_empty() {
            return Err(format!("missing value for {}", context));
        }

        let mut commands = Vec::new();
        for part in split_top_level(rest, &Token::Pipe)? {
            if part.is_empty() {
                return Err(format!("missing command in {} pipeline", context));
            }
            commands.push(self.parse_command(part)?);
        }

        if !is_assign {
            self.declared.extend(decl.iter().cloned());
        }

        Ok(Pipeline {
            decl,
            is_assign,
            commands,
        })
    }

    fn split_declaration<'t>(
        &self,
        tokens: &'t [Token],
        context: &str,
    ) -> Result<(Vec<String>, bool, &'t [Token]), String> {
        let op = tokens
            .iter()
            .position(|t| matches!(t, Token::Declare | Token::Assign));
        let Some(op) = op else {
            return Ok((Vec::new(), false, tokens));
        };

        let mut decl = Vec::new();
        for (i, token) in tokens[..op].iter().enumerate() {
            match (i % 2, token) {
                (0, Token::Variable(name, fields)) if fields.is_empty() => decl.push(name.clone()),
                (1, Token::Comma) => {}
                _ => return Err(format!("bad declaration in {}", context)),
            }
        }
        let max = if context == "range" { 2 } else { 1 };
        if decl.is_empty() || decl.len() > max || op % 2 == 0 {
            return Err(format!("bad declaration in {}", context));
        }

        let is_assign = matches!(tokens[op], Token::Assign);
        if is_assign {
            for name in &decl {
                if !self.declared.contains(name) {
                    return Err(format!("undefined variable {:?}", name));
                }
            }
        }
        Ok((decl, is_assign, &tokens[op + 1..]))
    }

    fn parse_command(&mut self, tokens: &[Token]) -> Result<Command, String> {
        let mut args = Vec::new();
        let mut i = 0;

        while i < tokens.len() {
            let operand = match &tokens[i] {
                Token::Dot => Operand::Dot,
                Token::Field(fields) => Operand::Field(fields.clone()),
                Token::Variable(name, fields) => {
                    if !self.declared.contains(name) {
                        return Err(format!("undefined variable {:?}", name));
                    }
                    Operand::Variable(name.clone(), fields.clone())
                }
                Token::Ident(name) => {
                    if !funcs::exists(name) {
                        return Err(format!("function {:?} not defined", name));
                    }
                    Operand::Function(name.clone())
                }
                Token::Str(s) => Operand::Str(s.clone()),
                Token::Number(n) => Operand::Number(n.clone()),
                Token::Bool(b) => Operand::Bool(*b),
                Token::Nil => Operand::Nil,
                Token::LParen => {
                    let close = matching_paren(tokens, i)?;
                    let inner = self.parse_pipeline(&tokens[i + 1..close], "parenthesized pipeline")?;
                    if !inner.decl.is_empty() {
                        return Err("declaration inside parentheses".to_string());
                    }
                    i = close;
                    Operand::Pipeline(Box::new(inner))
                }
                Token::RParen => return Err("unexpected right paren".to_string()),
                other => return Err(format!("unexpected {:?} in operand", other)),
            };
            args.push(operand);
            i += 1;
        }

        if args.len() > 1 && !matches!(args[0], Operand::Function(_)) {
            return Err("can't give argument to non-function".to_string());
        }
        Ok(Command { args })
    }
}

fn matching_paren(tokens: &[Token], open: usize) -> Result<usize, String> {
    let mut depth = 0;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Err("unclosed left paren".to_string())
}

fn split_top_level<'t>(tokens: &'t [Token], sep: &Token) -> Result<Vec<&'t [Token]>, String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth -= 1;
                if depth < 0 {
                    return Err("unexpected right paren".to_string());
                }
            }
            t if depth == 0 && t == sep => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    Ok(parts)
}
