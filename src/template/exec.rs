//! Tree-walking executor.

use serde_json::{Map, Value};

use super::funcs;
use super::parse::{Branch, Command, Node, Operand, Pipeline};

/// Upper bound for `{{range N}}` over an integer.
pub(crate) const MAX_RANGE_COUNT: u64 = 100_000;

pub(crate) fn execute(nodes: &[Node], data: &Value) -> Result<String, String> {
    let mut state = State {
        vars: vec![("$".to_string(), data.clone())],
        out: String::new(),
    };
    state.walk(nodes, data)?;
    Ok(state.out)
}

struct State {
    vars: Vec<(String, Value)>,
    out: String,
}

impl State {
    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<(), String> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(pipe) => {
                    let value = self.eval_pipeline(pipe, dot)?;
                    if pipe.decl.is_empty() {
                        self.out.push_str(&to_text(&value));
                    }
                }
                Node::If {
                    branches,
                    otherwise,
                } => self.walk_if(branches, otherwise.as_deref(), dot)?,
                Node::With { branch, otherwise } => {
                    let scope = self.vars.len();
                    let value = self.eval_pipeline(&branch.pipe, dot)?;
                    if is_true(&value) {
                        self.walk(&branch.body, &value)?;
                    } else if let Some(otherwise) = otherwise {
                        self.walk(otherwise, dot)?;
                    }
                    self.vars.truncate(scope);
                }
                Node::Range { branch, otherwise } => {
                    self.walk_range(branch, otherwise.as_deref(), dot)?
                }
            }
        }
        Ok(())
    }

    fn walk_if(
        &mut self,
        branches: &[Branch],
        otherwise: Option<&[Node]>,
        dot: &Value,
    ) -> Result<(), String> {
        let scope = self.vars.len();
        let mut taken = false;
        for branch in branches {
            if is_true(&self.eval_pipeline(&branch.pipe, dot)?) {
                self.walk(&branch.body, dot)?;
                taken = true;
                break;
            }
        }
        if !taken {
            if let Some(otherwise) = otherwise {
                self.walk(otherwise, dot)?;
            }
        }
        self.vars.truncate(scope);
        Ok(())
    }

    fn walk_range(
        &mut self,
        branch: &Branch,
        otherwise: Option<&[Node]>,
        dot: &Value,
    ) -> Result<(), String> {
        let scope = self.vars.len();
        // Evaluate without binding; range binds per element.
        let plain = Pipeline {
            decl: Vec::new(),
            is_assign: false,
            commands: branch.pipe.commands.clone(),
        };
        let collection = self.eval_pipeline(&plain, dot)?;

        let items: Vec<(Value, Value)> = match &collection {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v.clone()))
                .collect(),
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone()))
                .collect(),
            Value::Number(n) if n.as_u64().is_some() => {
                let count = n.as_u64().unwrap_or(0);
                if count > MAX_RANGE_COUNT {
                    return Err(format!(
                        "range count {} exceeds limit of {}",
                        count, MAX_RANGE_COUNT
                    ));
                }
                (0..count).map(|i| (Value::from(i), Value::from(i))).collect()
            }
            Value::Null => Vec::new(),
            other => return Err(format!("range can't iterate over {}", to_text(other))),
        };

        if items.is_empty() {
            if let Some(otherwise) = otherwise {
                self.walk(otherwise, dot)?;
            }
            return Ok(());
        }

        for (key, item) in items {
            match branch.pipe.decl.as_slice() {
                [] => {}
                [elem] => self.bind(elem, item.clone(), branch.pipe.is_assign),
                [index, elem] => {
                    self.bind(index, key, branch.pipe.is_assign);
                    self.bind(elem, item.clone(), branch.pipe.is_assign);
                }
                _ => return Err("too many range variables".to_string()),
            }
            let iteration = self.vars.len();
            self.walk(&branch.body, &item)?;
            self.vars.truncate(iteration);
        }
        self.vars.truncate(scope);
        Ok(())
    }

    fn bind(&mut self, name: &str, value: Value, is_assign: bool) {
        if is_assign {
            if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                slot.1 = value;
                return;
            }
        }
        self.vars.push((name.to_string(), value));
    }

    fn lookup_var(&self, name: &str) -> Result<&Value, String> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| format!("undefined variable {:?}", name))
    }

    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value, String> {
        let mut value: Option<Value> = None;
        for command in &pipe.commands {
            value = Some(self.eval_command(command, dot, value)?);
        }
        let value = value.unwrap_or(Value::Null);
        if let [name] = pipe.decl.as_slice() {
            self.bind(name, value.clone(), pipe.is_assign);
        }
        Ok(value)
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
    ) -> Result<Value, String> {
        if let Some(Operand::Function(name)) = command.args.first() {
            let mut args = Vec::with_capacity(command.args.len());
            for operand in &command.args[1..] {
                args.push(self.eval_operand(operand, dot)?);
            }
            if let Some(piped) = piped {
                args.push(piped);
            }
            return funcs::call(name, &args).map_err(|e| format!("error calling {}: {}", name, e));
        }

        if piped.is_some() {
            return Err("can't give argument to non-function".to_string());
        }
        match command.args.first() {
            Some(operand) => self.eval_operand(operand, dot),
            None => Err("empty command".to_string()),
        }
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value, String> {
        Ok(match operand {
            Operand::Dot => dot.clone(),
            Operand::Field(fields) => walk_fields(dot, fields)?,
            Operand::Variable(name, fields) => walk_fields(self.lookup_var(name)?, fields)?,
            Operand::Function(name) => funcs::call(name, &[])?,
            Operand::Str(s) => Value::String(s.clone()),
            Operand::Number(n) => Value::Number(n.clone()),
            Operand::Bool(b) => Value::Bool(*b),
            Operand::Nil => Value::Null,
            Operand::Pipeline(pipe) => self.eval_pipeline(pipe, dot)?,
        })
    }
}

/// Missing keys resolve to null and render as empty text.
fn walk_fields(base: &Value, fields: &[String]) -> Result<Value, String> {
    let mut current = base;
    for field in fields {
        current = match current {
            Value::Object(map) => match map.get(field) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            Value::Null => return Ok(Value::Null),
            other => {
                return Err(format!(
                    "can't evaluate field {} in type {}",
                    field,
                    type_name(other)
                ))
            }
        };
    }
    Ok(current.clone())
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Truthiness: false, zero, nil and empty strings or collections are false.
pub(crate) fn is_true(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// Render a value as output text. Lists and maps print in a bracketed form.
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(to_text).collect();
            format!("[{}]", inner.join(" "))
        }
        Value::Object(map) => format!("map[{}]", map_text(map)),
    }
}

fn map_text(map: &Map<String, Value>) -> String {
    map.iter()
        .map(|(k, v)| format!("{}:{}", k, to_text(v)))
        .collect::<Vec<_>>()
        .join(" ")
}
