use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};
use std::fmt;

/// Host-language value as seen by the constant evaluator.
///
/// Mirrors the dynamic value space of the source language: `Undefined` and
/// `Null` are distinct, numbers are IEEE doubles, objects keep insertion
/// order. `Opaque` carries handles that have no literal encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Opaque(Handle),
}

/// Non-literal external values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Handle {
    /// A host closure; only valid where code is packaged, never as data.
    Closure { name: String },
    /// A provisioned table that exposes integration operations.
    Table { name: String },
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Closure { name } => write!(f, "[Function {name}]"),
            Handle::Table { name } => write!(f, "[Table {name}]"),
        }
    }
}

impl Value {
    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    #[inline]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(Handle::Closure { .. }) => "function",
            Value::Opaque(Handle::Table { .. }) => "table",
        }
    }

    /// True if an opaque handle appears anywhere inside the value.
    pub fn contains_opaque(&self) -> bool {
        match self {
            Value::Opaque(_) => true,
            Value::Array(items) => items.iter().any(Value::contains_opaque),
            Value::Object(map) => map.values().any(Value::contains_opaque),
            _ => false,
        }
    }

    /// Key usable as an object property name (`string` or `number`).
    pub fn property_key(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    /// Own-property lookup. A missing key is `None`, never an error.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self {
            Value::Object(map) => map.get(key).cloned(),
            Value::Array(items) => {
                if key == "length" {
                    return Some(Value::Number(items.len() as f64));
                }
                key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
            }
            Value::String(s) if key == "length" => {
                Some(Value::Number(s.encode_utf16().count() as f64))
            }
            _ => None,
        }
    }

    /// Source-language `String(value)`.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Opaque(handle) => handle.to_string(),
        }
    }

    /// Source-language `Number(value)`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s),
            Value::Array(items) => match items.as_slice() {
                [] => 0.0,
                [single] => parse_number(&single.to_display_string()),
                _ => f64::NAN,
            },
            Value::Object(_) | Value::Opaque(_) => f64::NAN,
        }
    }

    /// Dynamic `+`: concatenation when either primitive form is a string,
    /// numeric addition otherwise.
    pub fn add(&self, other: &Value) -> Value {
        let left = self.to_primitive();
        let right = other.to_primitive();
        if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
            let mut out = left.to_display_string();
            out.push_str(&right.to_display_string());
            Value::String(out)
        } else {
            Value::Number(left.to_number() + right.to_number())
        }
    }

    fn to_primitive(&self) -> Value {
        match self {
            Value::Array(_) | Value::Object(_) | Value::Opaque(_) => {
                Value::String(self.to_display_string())
            }
            other => other.clone(),
        }
    }

    /// JSON encoding of a folded constant.
    ///
    /// `undefined` array elements are dropped and `undefined` properties are
    /// omitted; a bare `undefined` encodes as `null`. Opaque handles also
    /// encode as `null`, so callers reject them first via
    /// [`Value::contains_opaque`].
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null | Value::Opaque(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .filter(|v| !matches!(v, Value::Undefined))
                    .map(Value::to_json)
                    .collect(),
            ),
            Value::Object(map) => {
                let out: Map<String, serde_json::Value> = map
                    .iter()
                    .filter(|(_, v)| !matches!(v, Value::Undefined))
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(out)
            }
        }
    }
}

/// `Number.prototype.toString()`: shortest round-trip digits, positional
/// between `1e-7` and `1e21`, exponent form (`1e+21`, `1e-7`) outside.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }

    let sign = if n < 0.0 { "-" } else { "" };
    let scientific = format!("{:e}", n.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return n.to_string();
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let Ok(exponent) = exponent.parse::<i32>() else {
        return n.to_string();
    };
    let k = digits.len() as i32;
    // Position of the decimal point relative to the first digit.
    let point = exponent + 1;

    let body = if k <= point && point <= 21 {
        format!("{digits}{}", "0".repeat((point - k) as usize))
    } else if 0 < point && point <= 21 {
        let (int, frac) = digits.split_at(point as usize);
        format!("{int}.{frac}")
    } else if -6 < point && point <= 0 {
        format!("0.{}{digits}", "0".repeat((-point) as usize))
    } else {
        let e = point - 1;
        let e_sign = if e < 0 { '-' } else { '+' };
        let (head, tail) = digits.split_at(1);
        if tail.is_empty() {
            format!("{head}e{e_sign}{}", e.abs())
        } else {
            format!("{head}.{tail}e{e_sign}{}", e.abs())
        }
    };
    format!("{sign}{body}")
}

/// String to number conversion: trimmed, empty is `0`, `Infinity` with an
/// optional sign, unsigned `0x`/`0o`/`0b` integers, decimal literals.
/// Anything else is `NaN`.
fn parse_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| c.is_whitespace() || c == '\u{feff}');
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &trimmed[2..];
        if digits.is_empty() {
            return f64::NAN;
        }
        return digits.chars().try_fold(0.0f64, |acc, c| {
            c.to_digit(radix).map(|d| acc * f64::from(radix) + f64::from(d))
        })
        .unwrap_or(f64::NAN);
    }

    if is_decimal_literal(trimmed) {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

fn is_decimal_literal(s: &str) -> bool {
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(i) => (&unsigned[..i], Some(&unsigned[i + 1..])),
        None => (unsigned, None),
    };
    let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if (int.is_empty() && frac.is_empty()) || !all_digits(int) || !all_digits(frac) {
        return false;
    }
    match exponent {
        None => true,
        Some(e) => {
            let e = e.strip_prefix(['+', '-']).unwrap_or(e);
            !e.is_empty() && all_digits(e)
        }
    }
}

fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() <= 9_007_199_254_740_991.0 {
        serde_json::Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
