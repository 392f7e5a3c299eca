//! Event bridge: turns an arbitrary binary record into a typed event and
//! runs it through the compiled expression index.

pub mod decode;
pub mod infer;

use crate::core::config::{AttributeType, BinaryFormat};
use crate::matching::schema::Schema;
use a_tree::ATree;
use self::decode::{decode_map, Value};
use tracing::{debug, warn};

/// Decode `payload` under `format`, project its fields through the
/// schema, and return the ids of all matching subscriptions.
///
/// `None` means the message could not be evaluated at all (decode
/// failure, non-map root, or a search error) and is distinct from
/// `Some(vec![])`, which means the message was evaluated and matched
/// nothing.
///
/// Field coercion: schema-unknown keys are dropped; a present field
/// whose value does not fit the declared type is marked undefined (so
/// predicates can distinguish "unknown" from "unset"); list fields skip
/// ill-typed elements rather than going undefined; absent fields are
/// simply left unset.
pub fn deserialize_and_match(
    tree: &ATree<u64>,
    schema: &Schema,
    format: BinaryFormat,
    payload: &[u8],
) -> Option<Vec<u64>> {
    let fields = match decode_map(format, payload) {
        Ok(fields) => fields,
        Err(err) => {
            debug!(format = format.name(), error = %err, "payload decode failed");
            return None;
        }
    };

    let mut builder = tree.make_event();
    for (key, value) in &fields {
        let Some(kind) = schema.lookup(key) else {
            continue;
        };

        let result = match (kind, value) {
            (AttributeType::Boolean, Value::Bool(b)) => builder.with_boolean(key, *b),
            (AttributeType::Integer, Value::Int(i)) => builder.with_integer(key, *i),
            (AttributeType::Float, Value::Float(f)) => builder.with_float(key, *f),
            (AttributeType::Float, Value::Int(i)) => builder.with_float(key, *i as f64),
            (AttributeType::String, Value::Str(s)) => builder.with_string(key, s),
            (AttributeType::StringList, Value::Array(items)) => {
                let strings: Vec<&str> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Str(s) => Some(s.as_str()),
                        _ => None,
                    })
                    .collect();
                builder.with_string_list(key, &strings)
            }
            (AttributeType::IntegerList, Value::Array(items)) => {
                let integers: Vec<i64> = items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Int(i) => Some(*i),
                        _ => None,
                    })
                    .collect();
                builder.with_integer_list(key, &integers)
            }
            _ => builder.with_undefined(key),
        };

        if let Err(err) = result {
            debug!(field = key, error = %err, "failed to set event field, marking undefined");
            let _ = builder.with_undefined(key);
        }
    }

    let event = match builder.build() {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "event build failed");
            return None;
        }
    };

    match tree.search(event) {
        Ok(report) => Some(report.matches().iter().map(|&&id| id).collect()),
        Err(err) => {
            warn!(error = %err, "expression index search failed");
            None
        }
    }
}
