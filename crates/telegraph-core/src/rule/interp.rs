//! Tree-walking interpreter for compiled rules
//!
//! Expressions evaluate to `Option<Value>`, where `None` is `undefined`.
//! Undefined only survives as far as a variable or the rule result; once it
//! is stored in a list or map, or used as an operand, it reads as `null`.

use super::ast::{
    AssignOp, BinaryOp, Element, Entry, Expr, Key, LogicalOp, Place, Program, Property, Stmt,
    UnaryOp,
};
use super::EvalError;
use crate::{Value, ValueMap};
use indexmap::IndexMap;

type EvalResult<T> = Result<T, EvalError>;

/// Names resolved to builtin namespaces when not shadowed by a binding
const NAMESPACES: &[&str] = &["Math", "Object", "JSON", "Array"];

/// Run a program against a set of bindings
///
/// Bindings are copied into a local scope, so assignments never reach the
/// caller's values. Returns `None` when the program produces no value,
/// including when it evaluates to `undefined`.
pub fn run(program: &Program, bindings: &ValueMap) -> EvalResult<Option<Value>> {
    let mut scope = Scope {
        vars: bindings
            .iter()
            .map(|(name, value)| (name.clone(), Some(value.clone())))
            .collect(),
    };
    match program {
        Program::Expression(expr) => scope.eval_maybe(expr),
        Program::Block(body) => match scope.exec_block(body)? {
            Flow::Return(value) => Ok(value),
            Flow::Next => Ok(None),
        },
    }
}

enum Flow {
    Next,
    Return(Option<Value>),
}

struct Scope {
    /// `None` marks a variable holding `undefined`
    vars: IndexMap<String, Option<Value>>,
}

impl Scope {
    fn exec_block(&mut self, body: &[Stmt]) -> EvalResult<Flow> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Next)
    }

    fn exec(&mut self, stmt: &Stmt) -> EvalResult<Flow> {
        match stmt {
            Stmt::Let { name, init } => {
                let value = match init {
                    Some(expr) => self.eval_maybe(expr)?,
                    None => None,
                };
                self.vars.insert(name.clone(), value);
            }
            Stmt::Assign { target, op, value } => self.assign(target, *op, value)?,
            Stmt::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_maybe(expr)?,
                    None => None,
                };
                return Ok(Flow::Return(value));
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let branch = if self.eval(cond)?.is_truthy() {
                    then_branch
                } else {
                    else_branch
                };
                return self.exec_block(branch);
            }
            Stmt::Block(body) => return self.exec_block(body),
            Stmt::Expr(expr) => {
                self.eval_maybe(expr)?;
            }
        }
        Ok(Flow::Next)
    }

    fn assign(&mut self, place: &Place, op: AssignOp, value: &Expr) -> EvalResult<()> {
        let rhs = self.eval_maybe(value)?;
        let keys = place
            .path
            .iter()
            .map(|property| self.member_key(property))
            .collect::<EvalResult<Vec<_>>>()?;

        let root = self
            .vars
            .get_mut(&place.root)
            .ok_or_else(|| EvalError::UnknownVariable(place.root.clone()))?;
        if keys.is_empty() && op == AssignOp::Set {
            *root = rhs;
            return Ok(());
        }
        let rhs = rhs.unwrap_or(Value::Null);
        let slot = locate(root.get_or_insert(Value::Null), &keys)?;
        let next = match op.binary() {
            None => rhs,
            Some(bin) => binary(bin, slot, &rhs)?,
        };
        *slot = next;
        Ok(())
    }

    fn member_key(&mut self, property: &Property) -> EvalResult<Value> {
        match property {
            Property::Name(name) => Ok(Value::String(name.clone())),
            Property::Index(expr) => self.eval(expr),
        }
    }

    /// Evaluate where only a value makes sense; `undefined` reads as `null`
    fn eval(&mut self, expr: &Expr) -> EvalResult<Value> {
        Ok(self.eval_maybe(expr)?.unwrap_or(Value::Null))
    }

    fn eval_maybe(&mut self, expr: &Expr) -> EvalResult<Option<Value>> {
        match expr {
            Expr::Literal(value) => Ok(Some(value.clone())),
            Expr::Undefined => Ok(None),
            Expr::Ident(name) => self
                .vars
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownVariable(name.clone())),
            Expr::Array(elements) => Ok(Some(Value::List(self.eval_elements(elements)?))),
            Expr::Object(entries) => {
                let mut map = ValueMap::new();
                for entry in entries {
                    match entry {
                        Entry::Field(key, expr) => {
                            let key = match key {
                                Key::Static(name) => name.clone(),
                                Key::Computed(expr) => key_text(&self.eval(expr)?),
                            };
                            let value = self.eval(expr)?;
                            map.insert(key, value);
                        }
                        Entry::Spread(expr) => match self.eval(expr)? {
                            Value::Map(other) => map.extend(other),
                            Value::List(items) => map.extend(
                                items
                                    .into_iter()
                                    .enumerate()
                                    .map(|(i, v)| (i.to_string(), v)),
                            ),
                            // Spreading null or a scalar contributes nothing
                            _ => {}
                        },
                    }
                }
                Ok(Some(Value::Map(map)))
            }
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let object = self.eval_maybe(object)?;
                let object = match object {
                    None | Some(Value::Null) if *optional => return Ok(None),
                    other => other.unwrap_or(Value::Null),
                };
                let key = self.member_key(property)?;
                get_member(&object, &key)
            }
            Expr::Call { callee, args } => self.eval_call(callee, args),
            Expr::Unary(UnaryOp::TypeOf, operand) => {
                if let Expr::Ident(name) = operand.as_ref() {
                    if !self.vars.contains_key(name) {
                        return Ok(Some(Value::from("undefined")));
                    }
                }
                let kind = self.eval_maybe(operand)?.as_ref().map_or("undefined", type_of);
                Ok(Some(Value::from(kind)))
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand)?;
                unary(*op, value).map(Some)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right).map(Some)
            }
            Expr::Logical(op, left, right) => {
                let left = self.eval_maybe(left)?;
                // undefined is falsy and nullish
                let truthy = left.as_ref().is_some_and(Value::is_truthy);
                let short_circuit = match op {
                    LogicalOp::And => !truthy,
                    LogicalOp::Or => truthy,
                    LogicalOp::Nullish => left.as_ref().is_some_and(|v| !v.is_null()),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_maybe(right)
                }
            }
            Expr::Conditional(cond, then_expr, else_expr) => {
                if self.eval(cond)?.is_truthy() {
                    self.eval_maybe(then_expr)
                } else {
                    self.eval_maybe(else_expr)
                }
            }
        }
    }

    fn eval_elements(&mut self, elements: &[Element]) -> EvalResult<Vec<Value>> {
        let mut out = Vec::with_capacity(elements.len());
        for element in elements {
            match element {
                Element::Item(expr) => out.push(self.eval(expr)?),
                Element::Spread(expr) => match self.eval(expr)? {
                    Value::List(items) => out.extend(items),
                    Value::String(s) => out.extend(s.chars().map(|c| Value::String(c.to_string()))),
                    other => {
                        return Err(EvalError::InvalidOperand {
                            op: "spread",
                            got: other.type_name(),
                        })
                    }
                },
            }
        }
        Ok(out)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Element]) -> EvalResult<Option<Value>> {
        let Expr::Member {
            object,
            property: Property::Name(method),
            optional,
        } = callee
        else {
            return Err(EvalError::NotCallable(callee_name(callee)));
        };

        if let Expr::Ident(namespace) = object.as_ref() {
            if NAMESPACES.contains(&namespace.as_str()) && !self.vars.contains_key(namespace) {
                let args = self.eval_elements(args)?;
                return call_static(namespace, method, &args).map(Some);
            }
        }

        let receiver = match self.eval_maybe(object)? {
            None | Some(Value::Null) if *optional => return Ok(None),
            other => other.unwrap_or(Value::Null),
        };
        let args = self.eval_elements(args)?;
        call_method(&receiver, method, &args).map(Some)
    }
}

/// Walk `keys` from `current`, creating the final map entry if missing
fn locate<'a>(mut current: &'a mut Value, keys: &[Value]) -> EvalResult<&'a mut Value> {
    for key in keys {
        current = match current {
            Value::Map(map) => map.entry(key_text(key)).or_insert(Value::Null),
            Value::List(list) => {
                let index = list_index(key)
                    .filter(|i| *i <= list.len())
                    .ok_or_else(|| EvalError::InvalidAssignment(format!("list index {}", key)))?;
                if index == list.len() {
                    list.push(Value::Null);
                }
                &mut list[index]
            }
            Value::Null => {
                return Err(EvalError::NullAccess {
                    property: key_text(key),
                })
            }
            other => {
                return Err(EvalError::InvalidAssignment(format!(
                    "cannot set property '{}' on {}",
                    key_text(key),
                    other.type_name()
                )))
            }
        };
    }
    Ok(current)
}

/// Read a property; a missing key or index is `undefined`
fn get_member(object: &Value, key: &Value) -> EvalResult<Option<Value>> {
    match object {
        Value::Null => Err(EvalError::NullAccess {
            property: key_text(key),
        }),
        Value::Map(map) => Ok(map.get(&key_text(key)).cloned()),
        Value::List(list) => {
            if key.as_str() == Some("length") {
                return Ok(Some(Value::Int(list.len() as i64)));
            }
            Ok(list_index(key).and_then(|i| list.get(i).cloned()))
        }
        Value::String(s) => {
            if key.as_str() == Some("length") {
                return Ok(Some(Value::Int(s.chars().count() as i64)));
            }
            Ok(list_index(key)
                .and_then(|i| s.chars().nth(i))
                .map(|c| Value::String(c.to_string())))
        }
        _ => Ok(None),
    }
}

fn list_index(key: &Value) -> Option<usize> {
    match key {
        Value::String(s) => s.parse().ok(),
        other => other.as_int().and_then(|i| usize::try_from(i).ok()),
    }
}

/// Property-key form of a value (`obj[1]` and `obj["1"]` are the same key)
fn key_text(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => to_text(other),
    }
}

/// String conversion used by `+`, `join` and keys
fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::List(items) => items
            .iter()
            .map(|v| if v.is_null() { String::new() } else { to_text(v) })
            .collect::<Vec<_>>()
            .join(","),
        Value::Map(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null | Value::List(_) | Value::Map(_) => "object",
        Value::Bool(_) => "boolean",
        Value::Int(_) | Value::Float(_) => "number",
        Value::String(_) => "string",
    }
}

fn callee_name(callee: &Expr) -> String {
    match callee {
        Expr::Ident(name) => name.clone(),
        Expr::Member {
            property: Property::Name(name),
            ..
        } => name.clone(),
        _ => "expression".to_string(),
    }
}

fn number(op: &'static str, value: &Value) -> EvalResult<f64> {
    value.as_float().ok_or(EvalError::InvalidOperand {
        op,
        got: value.type_name(),
    })
}

/// Convert a float result back to an integer when it is exactly integral
fn normalize(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < 9.0e15 {
        Value::Int(f as i64)
    } else {
        Value::Float(f)
    }
}

fn unary(op: UnaryOp, value: Value) -> EvalResult<Value> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(i as f64)))),
            other => Ok(Value::Float(-number("-", &other)?)),
        },
        UnaryOp::Plus => match value {
            Value::Int(_) | Value::Float(_) => Ok(value),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            Value::Null => Ok(Value::Int(0)),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(normalize)
                .map_err(|_| EvalError::InvalidOperand {
                    op: "+",
                    got: "string",
                }),
            other => Err(EvalError::InvalidOperand {
                op: "+",
                got: other.type_name(),
            }),
        },
        UnaryOp::TypeOf => Ok(Value::from(type_of(&value))),
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOp::Add
            if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) =>
        {
            Ok(Value::String(to_text(left) + &to_text(right)))
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            arithmetic(op, left, right)
        }
        BinaryOp::StrictEq | BinaryOp::LooseEq => Ok(Value::Bool(left == right)),
        BinaryOp::StrictNe | BinaryOp::LooseNe => Ok(Value::Bool(left != right)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => compare(op, left, right),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let exact = match op {
            BinaryOp::Add => a.checked_add(b),
            BinaryOp::Sub => a.checked_sub(b),
            BinaryOp::Mul => a.checked_mul(b),
            BinaryOp::Div if b == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Div => a.checked_rem(b).filter(|r| *r == 0).and_then(|_| a.checked_div(b)),
            BinaryOp::Mod if b == 0 => return Err(EvalError::DivisionByZero),
            BinaryOp::Mod => a.checked_rem(b),
            _ => None,
        };
        if let Some(i) = exact {
            return Ok(Value::Int(i));
        }
    }

    let symbol = match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        _ => "%",
    };
    let a = number(symbol, left)?;
    let b = number(symbol, right)?;
    match op {
        BinaryOp::Add => Ok(Value::Float(a + b)),
        BinaryOp::Sub => Ok(Value::Float(a - b)),
        BinaryOp::Mul => Ok(Value::Float(a * b)),
        _ if b == 0.0 => Err(EvalError::DivisionByZero),
        BinaryOp::Div => Ok(Value::Float(a / b)),
        _ => Ok(Value::Float(a % b)),
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => match (left.as_float(), right.as_float()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(EvalError::TypeMismatch {
                    op: "comparison",
                    left: left.type_name(),
                    right: right.type_name(),
                })
            }
        },
    };
    // NaN compares false against everything
    let result = ordering.is_some_and(|ord| match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        _ => ord.is_ge(),
    });
    Ok(Value::Bool(result))
}

fn arg<'a>(args: &'a [Value], index: usize) -> &'a Value {
    static NULL: Value = Value::Null;
    args.get(index).unwrap_or(&NULL)
}

fn call_static(namespace: &str, name: &str, args: &[Value]) -> EvalResult<Value> {
    match (namespace, name) {
        ("Math", "min") | ("Math", "max") => {
            if args.is_empty() {
                return Err(EvalError::InvalidArgument(format!(
                    "Math.{} needs at least one argument",
                    name
                )));
            }
            let (op, want_min) = if name == "min" {
                ("Math.min", true)
            } else {
                ("Math.max", false)
            };
            let mut best = &args[0];
            number(op, best)?;
            for candidate in &args[1..] {
                let c = number(op, candidate)?;
                let b = number(op, best)?;
                if (want_min && c < b) || (!want_min && c > b) {
                    best = candidate;
                }
            }
            Ok(best.clone())
        }
        ("Math", "abs") => match arg(args, 0) {
            Value::Int(i) => Ok(i
                .checked_abs()
                .map(Value::Int)
                .unwrap_or(Value::Float((*i as f64).abs()))),
            other => Ok(Value::Float(number("abs", other)?.abs())),
        },
        ("Math", "floor") | ("Math", "ceil") | ("Math", "round") => match arg(args, 0) {
            Value::Int(i) => Ok(Value::Int(*i)),
            other => {
                let rounded = match name {
                    "floor" => number("Math.floor", other)?.floor(),
                    "ceil" => number("Math.ceil", other)?.ceil(),
                    _ => (number("Math.round", other)? + 0.5).floor(),
                };
                Ok(normalize(rounded))
            }
        },
        ("Object", "keys") | ("Object", "values") => {
            let keys = name == "keys";
            match arg(args, 0) {
                Value::Map(map) => Ok(Value::List(if keys {
                    map.keys().map(|k| Value::String(k.clone())).collect()
                } else {
                    map.values().cloned().collect()
                })),
                Value::List(items) => Ok(Value::List(if keys {
                    (0..items.len()).map(|i| Value::String(i.to_string())).collect()
                } else {
                    items.clone()
                })),
                Value::Null => Err(EvalError::InvalidArgument(format!(
                    "Object.{} called on null",
                    name
                ))),
                _ => Ok(Value::List(Vec::new())),
            }
        }
        ("JSON", "stringify") => Ok(Value::String(arg(args, 0).to_string())),
        ("Array", "isArray") => Ok(Value::Bool(matches!(arg(args, 0), Value::List(_)))),
        _ => Err(EvalError::UnknownMethod {
            method: format!("{}.{}", namespace, name),
            receiver: "namespace",
        }),
    }
}

/// Resolve JS-style `slice` bounds against a length
fn slice_bounds(args: &[Value], len: usize) -> EvalResult<(usize, usize)> {
    let resolve = |value: &Value, default: usize| -> EvalResult<usize> {
        if value.is_null() {
            return Ok(default);
        }
        let i = value
            .as_float()
            .ok_or(EvalError::InvalidOperand {
                op: "slice",
                got: value.type_name(),
            })?
            .trunc() as i64;
        let len = len as i64;
        let clamped = if i < 0 { (len + i).max(0) } else { i.min(len) };
        Ok(clamped as usize)
    };
    let start = resolve(arg(args, 0), 0)?;
    let end = resolve(arg(args, 1), len)?;
    Ok((start, end.max(start)))
}

fn call_method(receiver: &Value, method: &str, args: &[Value]) -> EvalResult<Value> {
    match (receiver, method) {
        (Value::List(items), "includes") => Ok(Value::Bool(items.contains(arg(args, 0)))),
        (Value::List(items), "indexOf") => Ok(Value::Int(
            items
                .iter()
                .position(|v| v == arg(args, 0))
                .map_or(-1, |i| i as i64),
        )),
        (Value::List(items), "concat") => {
            let mut out = items.clone();
            for value in args {
                match value {
                    Value::List(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::List(out))
        }
        (Value::List(items), "slice") => {
            let (start, end) = slice_bounds(args, items.len())?;
            Ok(Value::List(items[start..end].to_vec()))
        }
        (Value::List(items), "join") => {
            let separator = match arg(args, 0) {
                Value::Null => ",".to_string(),
                other => to_text(other),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|v| if v.is_null() { String::new() } else { to_text(v) })
                .collect();
            Ok(Value::String(parts.join(&separator)))
        }
        (Value::String(s), "includes") => Ok(Value::Bool(s.contains(&to_text(arg(args, 0))))),
        (Value::String(s), "startsWith") => Ok(Value::Bool(s.starts_with(&to_text(arg(args, 0))))),
        (Value::String(s), "endsWith") => Ok(Value::Bool(s.ends_with(&to_text(arg(args, 0))))),
        (Value::String(s), "indexOf") => Ok(Value::Int(
            s.find(&to_text(arg(args, 0)))
                .map_or(-1, |byte| s[..byte].chars().count() as i64),
        )),
        (Value::String(s), "slice") => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(args, chars.len())?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        (Value::String(s), "toUpperCase") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "toLowerCase") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "concat") => Ok(Value::String(
            args.iter().fold(s.clone(), |acc, v| acc + &to_text(v)),
        )),
        (Value::Map(map), "hasOwnProperty") => {
            Ok(Value::Bool(map.contains_key(&key_text(arg(args, 0)))))
        }
        (Value::Null, _) => Err(EvalError::NullAccess {
            property: method.to_string(),
        }),
        (other, _) => Err(EvalError::UnknownMethod {
            method: method.to_string(),
            receiver: other.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::parser::parse_program;

    fn eval_with(source: &str, bindings: &[(&str, Value)]) -> EvalResult<Option<Value>> {
        let program = parse_program(source, 64).unwrap();
        let vars: ValueMap = bindings
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        run(&program, &vars)
    }

    fn eval(source: &str) -> Value {
        eval_with(source, &[]).unwrap().unwrap()
    }

    fn state(count: i64) -> Value {
        [("count", count)].into_iter().collect()
    }

    #[test]
    fn test_arithmetic_stays_integral() {
        assert_eq!(eval("1 + 2 * 3"), Value::Int(7));
        assert_eq!(eval("6 / 3"), Value::Int(2));
        assert_eq!(eval("7 / 2"), Value::Float(3.5));
        assert_eq!(eval("7 % 4"), Value::Int(3));
        assert_eq!(eval("1.5 + 1"), Value::Float(2.5));
        assert_eq!(eval("-(2 - 5)"), Value::Int(3));
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval("'n=' + 3"), Value::from("n=3"));
        assert_eq!(eval("'a' + null"), Value::from("anull"));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert_eq!(eval_with("1 / 0", &[]), Err(EvalError::DivisionByZero));
        assert_eq!(eval_with("1 % 0", &[]), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_eq!(eval("0 || 'fallback'"), Value::from("fallback"));
        assert_eq!(eval("'a' && 'b'"), Value::from("b"));
        assert_eq!(eval("null ?? 4"), Value::Int(4));
        assert_eq!(eval("0 ?? 4"), Value::Int(0));
        assert_eq!(eval("!0"), Value::Bool(true));
    }

    #[test]
    fn test_member_access() {
        let payload: Value = [("type", Value::from("ping")), ("items", Value::from(vec![1i64, 2, 3]))]
            .into_iter()
            .collect();
        let bindings = [("payload", payload)];
        assert_eq!(
            eval_with("payload.type === 'ping'", &bindings).unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(eval_with("payload.items[1]", &bindings).unwrap(), Some(Value::Int(2)));
        assert_eq!(eval_with("payload.items.length", &bindings).unwrap(), Some(Value::Int(3)));
        assert_eq!(eval_with("payload.missing", &bindings).unwrap(), None);
        assert_eq!(eval_with("payload.items[9]", &bindings).unwrap(), None);
        assert_eq!(eval_with("payload.missing?.deeper", &bindings).unwrap(), None);
    }

    #[test]
    fn test_undefined_is_no_value() {
        let bindings = [("payload", Value::Map(ValueMap::new()))];
        assert_eq!(eval_with("undefined", &[]).unwrap(), None);
        assert_eq!(eval_with("return undefined;", &[]).unwrap(), None);
        assert_eq!(eval_with("return payload.next;", &bindings).unwrap(), None);
        assert_eq!(eval_with("let next; return next;", &[]).unwrap(), None);
        assert_eq!(eval_with("let next = payload.next; return next;", &bindings).unwrap(), None);
        assert_eq!(eval_with("payload.next || undefined", &bindings).unwrap(), None);
        assert_eq!(eval_with("true ? undefined : 1", &[]).unwrap(), None);
        // null is a value
        assert_eq!(eval_with("return null;", &[]).unwrap(), Some(Value::Null));
        assert_eq!(eval_with("payload.next ?? null", &bindings).unwrap(), Some(Value::Null));
    }

    #[test]
    fn test_undefined_reads_as_null_inside_values() {
        let bindings = [("payload", Value::Map(ValueMap::new()))];
        assert_eq!(
            eval_with("[payload.next]", &bindings).unwrap(),
            Some(Value::List(vec![Value::Null]))
        );
        assert_eq!(eval("typeof undefined"), Value::from("undefined"));
        assert_eq!(eval("undefined === null"), Value::Bool(true));
    }

    #[test]
    fn test_member_of_null_is_an_error() {
        let result = eval_with("payload.type", &[("payload", Value::Null)]);
        assert_eq!(
            result,
            Err(EvalError::NullAccess {
                property: "type".into()
            })
        );
    }

    #[test]
    fn test_unknown_variable() {
        assert_eq!(
            eval_with("nope + 1", &[]),
            Err(EvalError::UnknownVariable("nope".into()))
        );
        assert_eq!(eval("typeof nope"), Value::from("undefined"));
    }

    #[test]
    fn test_object_spread_and_shorthand() {
        let result = eval_with(
            "{...state, count: state.count + 1, seen}",
            &[("state", state(0)), ("seen", Value::Bool(true))],
        )
        .unwrap()
        .unwrap();
        assert_eq!(result.get("count"), Some(&Value::Int(1)));
        assert_eq!(result.get("seen"), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_block_without_return_has_no_value() {
        assert_eq!(eval_with("let x = 1;", &[]).unwrap(), None);
        assert_eq!(eval_with("return;", &[]).unwrap(), None);
        assert_eq!(eval_with("return 5;", &[]).unwrap(), Some(Value::Int(5)));
    }

    #[test]
    fn test_assignment_mutates_only_local_copy() {
        let bindings = ValueMap::from_iter([("state".to_string(), state(1))]);
        let program = parse_program("state.count += 1; state.extra = [1]; return state;", 64).unwrap();
        let result = run(&program, &bindings).unwrap().unwrap();
        assert_eq!(result.get("count"), Some(&Value::Int(2)));
        assert_eq!(result.get("extra"), Some(&Value::from(vec![1i64])));
        // Caller's bindings are untouched
        assert_eq!(bindings["state"].get("count"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_if_else_chain() {
        let source = "if (state.count > 5) { return 'high'; } else if (state.count > 1) return 'mid'; else return 'low';";
        assert_eq!(
            eval_with(source, &[("state", state(3))]).unwrap(),
            Some(Value::from("mid"))
        );
        assert_eq!(
            eval_with(source, &[("state", state(0))]).unwrap(),
            Some(Value::from("low"))
        );
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("Math.max(1, 5, 3)"), Value::Int(5));
        assert_eq!(eval("Math.min(2, 1.5)"), Value::Float(1.5));
        assert_eq!(eval("Math.floor(2.7)"), Value::Int(2));
        assert_eq!(eval("Math.round(2.5)"), Value::Int(3));
        assert_eq!(eval("Object.keys({a: 1, b: 2})"), Value::from(vec!["a", "b"]));
        assert_eq!(eval("JSON.stringify({a: [1, null]})"), Value::from(r#"{"a":[1,null]}"#));
        assert_eq!(eval("Array.isArray([])"), Value::Bool(true));
    }

    #[test]
    fn test_methods() {
        assert_eq!(eval("[1, 2, 3].includes(2)"), Value::Bool(true));
        assert_eq!(eval("[1, 2, 3].indexOf(9)"), Value::Int(-1));
        assert_eq!(eval("[1].concat([2, 3], 4)"), Value::from(vec![1i64, 2, 3, 4]));
        assert_eq!(eval("[1, 2, 3, 4].slice(-2)"), Value::from(vec![3i64, 4]));
        assert_eq!(eval("['a', 'b'].join('-')"), Value::from("a-b"));
        assert_eq!(eval("'Hello'.toUpperCase()"), Value::from("HELLO"));
        assert_eq!(eval("'hello'.slice(1, 3)"), Value::from("el"));
    }

    #[test]
    fn test_shadowed_namespace_is_a_value() {
        let math: Value = [("max", 3i64)].into_iter().collect();
        assert_eq!(
            eval_with("Math.max", &[("Math", math)]).unwrap(),
            Some(Value::Int(3))
        );
    }

    #[test]
    fn test_comparison_type_mismatch() {
        assert!(matches!(
            eval_with("[] < 1", &[]),
            Err(EvalError::TypeMismatch { .. })
        ));
        assert_eq!(eval("'a' < 'b'"), Value::Bool(true));
    }
}
