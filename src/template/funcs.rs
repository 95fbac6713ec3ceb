//! Function library available to every template.
//!
//! Piped values arrive as the final argument, so `{{.tags | join ", "}}`
//! calls `join(", ", tags)`.

use serde_json::Value;

use super::exec::{is_true, to_text, type_name};

type Func = fn(&[Value]) -> Result<Value, String>;

/// Widest padding `indent` will produce.
pub(crate) const MAX_INDENT: u64 = 1024;

const FUNCS: &[(&str, Func)] = &[
    // Go-style builtins
    ("and", and),
    ("or", or),
    ("not", not),
    ("eq", eq),
    ("ne", ne),
    ("lt", lt),
    ("le", le),
    ("gt", gt),
    ("ge", ge),
    ("len", len),
    ("index", index),
    ("print", print),
    ("printf", printf),
    // Case conversion
    ("camel_case", camel_case),
    ("pascal_case", pascal_case),
    ("snake_case", snake_case),
    ("kebab_case", kebab_case),
    ("title_case", title_case),
    ("slugify", slugify),
    // Lists
    ("join", join),
    ("join_and", join_and),
    ("unique", unique),
    ("first", first),
    ("last", last),
    ("split", split),
    // Text
    ("indent", indent),
    ("default_if_empty", default_if_empty),
    ("lower", lower),
    ("upper", upper),
    ("trim", trim),
    ("replace", replace),
    ("contains", contains),
    ("has_prefix", has_prefix),
    ("has_suffix", has_suffix),
];

pub(crate) fn exists(name: &str) -> bool {
    FUNCS.iter().any(|(n, _)| *n == name)
}

pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, String> {
    let (_, func) = FUNCS
        .iter()
        .find(|(n, _)| *n == name)
        .ok_or_else(|| format!("function {:?} not defined", name))?;
    func(args)
}

fn arity(args: &[Value], n: usize) -> Result<(), String> {
    if args.len() != n {
        return Err(format!("wrong number of args: want {}, got {}", n, args.len()));
    }
    Ok(())
}

fn as_str(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        Value::Bool(_) | Value::Number(_) => Ok(to_text(value)),
        other => Err(format!("expected string, got {}", type_name(other))),
    }
}

fn as_list(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::Null => Ok(Vec::new()),
        other => Err(format!("expected list, got {}", type_name(other))),
    }
}

fn as_strings(value: &Value) -> Result<Vec<String>, String> {
    as_list(value)?.iter().map(as_str).collect()
}

// --- builtins ---

fn and(args: &[Value]) -> Result<Value, String> {
    if args.is_empty() {
        return Err("and: missing arguments".to_string());
    }
    Ok(args
        .iter()
        .find(|v| !is_true(v))
        .unwrap_or(&args[args.len() - 1])
        .clone())
}

fn or(args: &[Value]) -> Result<Value, String> {
    if args.is_empty() {
        return Err("or: missing arguments".to_string());
    }
    Ok(args
        .iter()
        .find(|v| is_true(v))
        .unwrap_or(&args[args.len() - 1])
        .clone())
}

fn not(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::Bool(!is_true(&args[0])))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn eq(args: &[Value]) -> Result<Value, String> {
    if args.len() < 2 {
        return Err("eq: missing argument for comparison".to_string());
    }
    Ok(Value::Bool(args[1..].iter().any(|v| values_equal(&args[0], v))))
}

fn ne(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(!values_equal(&args[0], &args[1])))
}

fn compare(args: &[Value]) -> Result<std::cmp::Ordering, String> {
    arity(args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Number(a), Value::Number(b)) => {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.partial_cmp(&b).ok_or_else(|| "incomparable numbers".to_string())
        }
        (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
        (a, b) => Err(format!(
            "incompatible types for comparison: {} and {}",
            type_name(a),
            type_name(b)
        )),
    }
}

fn lt(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(compare(args)?.is_lt()))
}

fn le(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(compare(args)?.is_le()))
}

fn gt(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(compare(args)?.is_gt()))
}

fn ge(args: &[Value]) -> Result<Value, String> {
    Ok(Value::Bool(compare(args)?.is_ge()))
}

fn len(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(m) => m.len(),
        Value::Null => 0,
        other => return Err(format!("len of {}", type_name(other))),
    };
    Ok(Value::from(n))
}

fn index(args: &[Value]) -> Result<Value, String> {
    let Some((first, keys)) = args.split_first() else {
        return Err("index: missing arguments".to_string());
    };
    let mut current = first.clone();
    for key in keys {
        current = match (&current, key) {
            (Value::Array(items), Value::Number(n)) => {
                let i = n
                    .as_u64()
                    .ok_or_else(|| format!("index {} out of range", n))? as usize;
                items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| format!("index {} out of range", i))?
            }
            (Value::Object(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Null),
            (Value::Null, _) => Value::Null,
            (c, k) => {
                return Err(format!(
                    "can't index {} with {}",
                    type_name(c),
                    type_name(k)
                ))
            }
        };
    }
    Ok(current)
}

fn print(args: &[Value]) -> Result<Value, String> {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        let between_non_strings =
            i > 0 && !args[i - 1].is_string() && !arg.is_string();
        if between_non_strings {
            out.push(' ');
        }
        out.push_str(&to_text(arg));
    }
    Ok(Value::String(out))
}

/// Supports `%s`, `%v`, `%d`, `%q` and `%%`.
fn printf(args: &[Value]) -> Result<Value, String> {
    let Some((format, rest)) = args.split_first() else {
        return Err("printf: missing format".to_string());
    };
    let format = as_str(format)?;
    let mut rest = rest.iter();
    let mut out = String::new();
    let mut chars = format.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = rest.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        match verb {
            's' | 'v' => out.push_str(&to_text(arg)),
            'd' => match arg.as_i64() {
                Some(n) => out.push_str(&n.to_string()),
                None => out.push_str(&format!("%!d({})", to_text(arg))),
            },
            'q' => out.push_str(&Value::String(to_text(arg)).to_string()),
            other => out.push_str(&format!("%!{}({})", other, to_text(arg))),
        }
    }
    Ok(Value::String(out))
}

// --- case conversion ---

/// Split text into words on separators, lower-to-upper transitions and
/// acronym boundaries (`HTTPServer` -> `HTTP`, `Server`).
fn words(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_is_lower)
            {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn one_string(args: &[Value]) -> Result<String, String> {
    arity(args, 1)?;
    as_str(&args[0])
}

fn camel_case(args: &[Value]) -> Result<Value, String> {
    let words = words(&one_string(args)?);
    let out: String = words
        .iter()
        .enumerate()
        .map(|(i, w)| if i == 0 { w.to_lowercase() } else { capitalize(w) })
        .collect();
    Ok(Value::String(out))
}

fn pascal_case(args: &[Value]) -> Result<Value, String> {
    let out: String = words(&one_string(args)?).iter().map(|w| capitalize(w)).collect();
    Ok(Value::String(out))
}

fn snake_case(args: &[Value]) -> Result<Value, String> {
    let words: Vec<String> = words(&one_string(args)?).iter().map(|w| w.to_lowercase()).collect();
    Ok(Value::String(words.join("_")))
}

fn kebab_case(args: &[Value]) -> Result<Value, String> {
    let words: Vec<String> = words(&one_string(args)?).iter().map(|w| w.to_lowercase()).collect();
    Ok(Value::String(words.join("-")))
}

fn title_case(args: &[Value]) -> Result<Value, String> {
    let words: Vec<String> = words(&one_string(args)?).iter().map(|w| capitalize(w)).collect();
    Ok(Value::String(words.join(" ")))
}

fn slugify(args: &[Value]) -> Result<Value, String> {
    let text = one_string(args)?.to_lowercase();
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    Ok(Value::String(slug.trim_matches('-').to_string()))
}

// --- lists ---

fn oxford(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{} and {}", a, b),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

/// `join list` reads as English; `join sep list` (or `list | join sep`)
/// uses the separator.
fn join(args: &[Value]) -> Result<Value, String> {
    match args {
        [list] => Ok(Value::String(oxford(&as_strings(list)?))),
        [a, b] => {
            let (sep, list) = if a.is_array() { (b, a) } else { (a, b) };
            Ok(Value::String(as_strings(list)?.join(&as_str(sep)?)))
        }
        _ => Err(format!("wrong number of args: want 1 or 2, got {}", args.len())),
    }
}

fn join_and(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(Value::String(oxford(&as_strings(&args[0])?)))
}

fn unique(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    let mut seen: Vec<Value> = Vec::new();
    for item in as_list(&args[0])? {
        if !seen.iter().any(|s| values_equal(s, &item)) {
            seen.push(item);
        }
    }
    Ok(Value::Array(seen))
}

fn first(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(as_list(&args[0])?.into_iter().next().unwrap_or(Value::Null))
}

fn last(args: &[Value]) -> Result<Value, String> {
    arity(args, 1)?;
    Ok(as_list(&args[0])?.pop().unwrap_or(Value::Null))
}

/// `split sep text`
fn split(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let sep = as_str(&args[0])?;
    let text = as_str(&args[1])?;
    if text.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    Ok(Value::Array(
        text.split(sep.as_str())
            .map(|s| Value::String(s.to_string()))
            .collect(),
    ))
}

// --- text ---

/// `indent n text`: prefix each non-blank line with n spaces.
fn indent(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let width = args[0]
        .as_u64()
        .ok_or_else(|| format!("indent width must be a number, got {}", type_name(&args[0])))?;
    if width > MAX_INDENT {
        return Err(format!("indent width {} exceeds limit of {}", width, MAX_INDENT));
    }
    let pad = " ".repeat(width as usize);
    let text = as_str(&args[1])?;
    let out: Vec<String> = text
        .split('\n')
        .map(|line| {
            if line.trim().is_empty() {
                line.to_string()
            } else {
                format!("{}{}", pad, line)
            }
        })
        .collect();
    Ok(Value::String(out.join("\n")))
}

/// `default_if_empty fallback value`: empty strings, empty lists and nil are
/// replaced; everything else (zero and false included) passes through.
fn default_if_empty(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let empty = match &args[1] {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    };
    Ok(if empty { args[0].clone() } else { args[1].clone() })
}

fn lower(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(one_string(args)?.to_lowercase()))
}

fn upper(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(one_string(args)?.to_uppercase()))
}

fn trim(args: &[Value]) -> Result<Value, String> {
    Ok(Value::String(one_string(args)?.trim().to_string()))
}

/// `replace old new text`
fn replace(args: &[Value]) -> Result<Value, String> {
    arity(args, 3)?;
    let text = as_str(&args[2])?;
    Ok(Value::String(text.replace(&as_str(&args[0])?, &as_str(&args[1])?)))
}

/// `contains needle haystack`, where haystack is a string or a list.
fn contains(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    let found = match &args[1] {
        Value::Array(items) => items.iter().any(|v| values_equal(v, &args[0])),
        other => as_str(other)?.contains(&as_str(&args[0])?),
    };
    Ok(Value::Bool(found))
}

fn has_prefix(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(as_str(&args[1])?.starts_with(&as_str(&args[0])?)))
}

fn has_suffix(args: &[Value]) -> Result<Value, String> {
    arity(args, 2)?;
    Ok(Value::Bool(as_str(&args[1])?.ends_with(&as_str(&args[0])?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(camel_case(&[s("user_account id")]).unwrap(), s("userAccountId"));
        assert_eq!(pascal_case(&[s("user-account")]).unwrap(), s("UserAccount"));
        assert_eq!(snake_case(&[s("HTTPServerError")]).unwrap(), s("http_server_error"));
        assert_eq!(kebab_case(&[s("myRuleName")]).unwrap(), s("my-rule-name"));
        assert_eq!(title_case(&[s("hello_world")]).unwrap(), s("Hello World"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify(&[s("  Go: Testing & Mocks!  ")]).unwrap(), s("go-testing-mocks"));
    }

    #[test]
    fn test_join_and() {
        assert_eq!(join_and(&[json!([])]).unwrap(), s(""));
        assert_eq!(join_and(&[json!(["Go"])]).unwrap(), s("Go"));
        assert_eq!(join_and(&[json!(["Go", "Rust"])]).unwrap(), s("Go and Rust"));
        assert_eq!(
            join_and(&[json!(["Go", "Rust", "Zig"])]).unwrap(),
            s("Go, Rust, and Zig")
        );
    }

    #[test]
    fn test_join_separator_either_order() {
        assert_eq!(join(&[s(","), json!(["a", "b"])]).unwrap(), s("a,b"));
        assert_eq!(join(&[json!(["a", "b"]), s(" | ")]).unwrap(), s("a | b"));
        assert_eq!(join(&[json!(["a", "b", "c"])]).unwrap(), s("a, b, and c"));
    }

    #[test]
    fn test_unique_is_stable() {
        assert_eq!(unique(&[json!(["b", "a", "b", "c", "a"])]).unwrap(), json!(["b", "a", "c"]));
    }

    #[test]
    fn test_indent_skips_blank_lines() {
        assert_eq!(indent(&[json!(2), s("a\n\nb")]).unwrap(), s("  a\n\n  b"));
    }

    #[test]
    fn test_indent_width_is_capped() {
        assert!(indent(&[json!(MAX_INDENT), s("a")]).is_ok());
        let err = indent(&[json!(99_999_999_999u64), s("a")]).unwrap_err();
        assert!(err.contains("exceeds limit"), "{}", err);
    }

    #[test]
    fn test_default_if_empty() {
        assert_eq!(default_if_empty(&[s("x"), s("")]).unwrap(), s("x"));
        assert_eq!(default_if_empty(&[s("x"), json!([])]).unwrap(), s("x"));
        assert_eq!(default_if_empty(&[s("x"), Value::Null]).unwrap(), s("x"));
        assert_eq!(default_if_empty(&[s("x"), json!(0)]).unwrap(), json!(0));
        assert_eq!(default_if_empty(&[s("x"), json!(false)]).unwrap(), json!(false));
    }

    #[test]
    fn test_printf() {
        assert_eq!(
            printf(&[s("%s has %d rules (%q) 100%%"), s("go"), json!(3), s("x")]).unwrap(),
            s("go has 3 rules (\"x\") 100%")
        );
    }
}
