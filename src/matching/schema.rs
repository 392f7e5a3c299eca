use crate::core::config::{AttributeDef, AttributeType};
use std::collections::HashMap;

/// Indexed view of the declared attributes: name to type with O(1)
/// lookup. Immutable for the life of the process.
#[derive(Debug, Clone)]
pub struct Schema {
    types: HashMap<String, AttributeType>,
}

impl Schema {
    pub fn new(defs: &[AttributeDef]) -> Self {
        let types = defs
            .iter()
            .map(|d| (d.name.clone(), d.kind))
            .collect();
        Self { types }
    }

    pub fn lookup(&self, name: &str) -> Option<AttributeType> {
        self.types.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<AttributeDef> {
        vec![
            AttributeDef {
                name: "severity".to_string(),
                kind: AttributeType::Integer,
            },
            AttributeDef {
                name: "location".to_string(),
                kind: AttributeType::String,
            },
        ]
    }

    #[test]
    fn lookup_finds_declared_attributes() {
        let schema = Schema::new(&defs());
        assert_eq!(schema.lookup("severity"), Some(AttributeType::Integer));
        assert_eq!(schema.lookup("location"), Some(AttributeType::String));
        assert_eq!(schema.lookup("unknown"), None);
        assert_eq!(schema.len(), 2);
        assert!(!schema.is_empty());
    }
}
