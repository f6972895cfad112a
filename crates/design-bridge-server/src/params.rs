//! Query and form parameters as tool arguments.

use design_bridge_core::ToolArgs;
use serde_json::{Number, Value};

/// Merge query then form pairs into tool arguments. Later pairs win, so form
/// values override query values. Each value is typed by `schema` when it
/// describes the key.
pub fn merge_params<I>(pairs: I, schema: Option<&Value>) -> ToolArgs
where
    I: IntoIterator<Item = (String, String)>,
{
    pairs
        .into_iter()
        .map(|(key, value)| {
            let value = coerce_for(schema, &key, &value);
            (key, value)
        })
        .collect()
}

/// Convert `raw` to the type the input schema declares for `key`.
///
/// `boolean`, `integer` and `number` properties are parsed, and a value that
/// does not parse stays a string for the server to reject. Every other
/// declared type is passed through as a string. Keys the schema does not
/// type fall back to [`coerce`].
#[must_use]
pub fn coerce_for(schema: Option<&Value>, key: &str, raw: &str) -> Value {
    let parsed = match declared_type(schema, key) {
        None => return coerce(raw),
        Some("boolean") => match raw {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        Some("integer") => raw.parse::<i64>().ok().map(Value::from),
        Some("number") => raw
            .parse::<i64>()
            .ok()
            .map(Value::from)
            .or_else(|| parse_float(raw)),
        Some(_) => None,
    };
    parsed.unwrap_or_else(|| Value::String(raw.to_string()))
}

/// `properties.<key>.type`, skipping `null` in a type union.
fn declared_type<'a>(schema: Option<&'a Value>, key: &str) -> Option<&'a str> {
    match schema?.get("properties")?.get(key)?.get("type")? {
        Value::String(ty) => Some(ty),
        Value::Array(types) => types
            .iter()
            .filter_map(Value::as_str)
            .find(|ty| *ty != "null"),
        _ => None,
    }
}

fn parse_float(raw: &str) -> Option<Value> {
    raw.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
}

/// Interpret an untyped parameter: `true`/`false` become booleans, canonical
/// integers and finite decimals become numbers, everything else stays a
/// string.
#[must_use]
pub fn coerce(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok(n) = raw.parse::<i64>() {
        // Leave "007" and "+5" alone.
        if n.to_string() == raw {
            return Value::Number(n.into());
        }
    }

    let looks_decimal = raw.contains('.')
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
        && !raw.starts_with('.')
        && !raw.ends_with('.');
    if looks_decimal {
        if let Some(n) = parse_float(raw) {
            return n;
        }
    }

    Value::String(raw.to_string())
}
