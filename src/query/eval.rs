//! In-memory evaluation of filters over JSON documents.
use regex::Regex;
use serde_json::Value as Json;
use std::cmp::Ordering;

use super::{Clause, Error, ExprGroup, FieldPath, Filter, Op, Value};

type Document = serde_json::Map<String, Json>;

/// Returns true if `doc` satisfies every clause of `filter`.
pub fn matches(filter: &Filter, doc: &Document) -> Result<bool, Error> {
    for clause in filter.clauses() {
        let ok = match clause {
            Clause::Expr(expr) => eval_op(lookup(doc, expr.field()), expr.op())?,
            Clause::ElemMatch { array, group } => eval_elem_match(lookup(doc, array), group)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Resolves a dotted path through nested objects.
pub fn lookup<'a>(doc: &'a Document, path: &FieldPath) -> Option<&'a Json> {
    let mut segments = path.segments();
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn eval_elem_match(array: Option<&Json>, group: &ExprGroup<Value>) -> Result<bool, Error> {
    let Some(Json::Array(items)) = array else {
        return Ok(false);
    };

    'items: for item in items {
        let Some(item) = item.as_object() else {
            continue;
        };
        for expr in group.iter() {
            if !eval_op(lookup(item, expr.field()), expr.op())? {
                continue 'items;
            }
        }
        return Ok(true);
    }

    Ok(false)
}

fn eval_op(found: Option<&Json>, op: &Op<Value>) -> Result<bool, Error> {
    let ordered = |v: &Value, accept: fn(Ordering) -> bool| {
        found
            .and_then(|j| compare(j, v))
            .map(accept)
            .unwrap_or(false)
    };

    let res = match op {
        Op::Eq(v) => found.is_some_and(|j| equals(j, v)),
        Op::Neq(v) => !found.is_some_and(|j| equals(j, v)),
        Op::Lt(v) => ordered(v, Ordering::is_lt),
        Op::Leq(v) => ordered(v, Ordering::is_le),
        Op::Gt(v) => ordered(v, Ordering::is_gt),
        Op::Geq(v) => ordered(v, Ordering::is_ge),
        Op::Ex => found.is_some(),
        Op::Nex => found.is_none(),
        Op::Between(range) => ordered(&range.min, Ordering::is_ge) && ordered(&range.max, Ordering::is_le),
        Op::In(items) => found.is_some_and(|j| items.iter().any(|v| equals(j, v))),
        Op::Match(v) => {
            let Value::Text(pattern) = v else {
                return Ok(false);
            };
            let re = Regex::new(pattern)?;
            found
                .and_then(Json::as_str)
                .is_some_and(|s| re.is_match(s))
        }
    };

    Ok(res)
}

fn equals(json: &Json, value: &Value) -> bool {
    match (json, value) {
        (Json::Number(n), Value::Integer(i)) => {
            n.as_i64() == Some(*i) || n.as_f64() == Some(*i as f64)
        }
        (Json::Number(n), Value::Float(f)) => n.as_f64() == Some(*f),
        (Json::String(s), Value::Text(t)) => s == t,
        (Json::Bool(b), Value::Boolean(c)) => b == c,
        _ => false,
    }
}

fn compare(json: &Json, value: &Value) -> Option<Ordering> {
    let lhs = json.as_f64()?;
    let rhs = match value {
        Value::Integer(i) => *i as f64,
        Value::Float(f) => *f,
        _ => return None,
    };
    lhs.partial_cmp(&rhs)
}
