//! Named accessors over the gateway's positional, schema-less arrays.
//!
//! Every accessor returns `None` (or an empty list) for shapes it does not
//! recognize instead of panicking on out-of-range indexing.

use serde_json::Value;

/// Position 0 of a tuple that answers a call.
pub const RESPONSE_MARKER: &str = "wrb.fr";
/// Position of the numeric error-code slot in a response tuple.
pub const ERROR_SLOT: usize = 5;

/// `value[index]` when `value` is an array.
pub fn at(value: &Value, index: usize) -> Option<&Value> {
    value.as_array()?.get(index)
}

/// Follows a chain of array indices, e.g. `[0, 4]` for `value[0][4]`.
pub fn at_path<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, &index| at(current, index))
}

pub fn str_at(value: &Value, index: usize) -> Option<&str> {
    at(value, index)?.as_str()
}

/// Position 0: the response-kind marker.
pub fn tuple_marker(tuple: &Value) -> Option<&str> {
    str_at(tuple, 0)
}

/// Position 1: the call identifier the tuple answers.
pub fn tuple_rpc_id(tuple: &Value) -> Option<&str> {
    str_at(tuple, 1)
}

/// Position 2: the payload. Tuples shorter than three positions are malformed
/// and carry no payload.
pub fn tuple_payload(tuple: &Value) -> Option<&Value> {
    let items = tuple.as_array()?;
    if items.len() < 3 {
        return None;
    }
    items.get(2)
}

/// A well-formed response tuple (marker plus at least three positions).
pub fn is_response_tuple(tuple: &Value) -> bool {
    tuple_marker(tuple) == Some(RESPONSE_MARKER)
        && tuple.as_array().is_some_and(|items| items.len() >= 3)
}

/// A well-formed response tuple answering `rpc_id`.
pub fn is_response_for(tuple: &Value, rpc_id: &str) -> bool {
    is_response_tuple(tuple) && tuple_rpc_id(tuple) == Some(rpc_id)
}

/// Numeric codes in the error slot: a bare number or any numbers nested in
/// an array. Anything else yields no codes.
pub fn error_codes(tuple: &Value) -> Vec<i64> {
    let mut codes = Vec::new();
    if let Some(slot) = at(tuple, ERROR_SLOT) {
        collect_codes(slot, &mut codes);
    }
    codes
}

fn collect_codes(value: &Value, codes: &mut Vec<i64>) {
    match value {
        Value::Number(number) => {
            let code = number.as_i64().or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.fract() == 0.0)
                    .map(|float| float as i64)
            });
            codes.extend(code);
        }
        Value::Array(items) => items.iter().for_each(|item| collect_codes(item, codes)),
        _ => {}
    }
}
