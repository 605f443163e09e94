//! Validating an action's runtime `input` object against its
//! [`InputSchema`], the last gate before the egress proxy builds an
//! upstream request.

use serde_json::Value;

use crate::types::{InputSchema, PropertySchema};

/// Validate `input` against `schema`.
///
/// On success `input` is guaranteed to be a JSON object containing only
/// declared properties (unless `additionalProperties` is set), with every
/// `required` key present and every declared property matching its type,
/// length, range, or enum constraint.
pub fn validate_input(schema: &InputSchema, input: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let Value::Object(object) = input else {
        return Err(vec!["input must be a JSON object".to_owned()]);
    };

    for required in &schema.required {
        if !object.contains_key(required) {
            errors.push(format!("input is missing required property {required:?}"));
        }
    }

    if !schema.additional_properties {
        for key in object.keys() {
            if !schema.properties.contains_key(key) {
                errors.push(format!("input has unknown property {key:?}"));
            }
        }
    }

    for (key, value) in object {
        if let Some(property) = schema.properties.get(key) {
            check_property(key, property, value, &mut errors);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_property(key: &str, schema: &PropertySchema, value: &Value, errors: &mut Vec<String>) {
    match schema {
        PropertySchema::String { min_length, max_length, enum_values } => {
            let Value::String(s) = value else {
                errors.push(format!("input.{key} must be a string"));
                return;
            };
            let len = s.chars().count() as u64;
            if let Some(min) = min_length {
                if len < *min {
                    errors.push(format!("input.{key} must be at least {min} characters"));
                }
            }
            if let Some(max) = max_length {
                if len > *max {
                    errors.push(format!("input.{key} must be at most {max} characters"));
                }
            }
            if let Some(allowed) = enum_values {
                if !allowed.contains(s) {
                    errors.push(format!("input.{key} must be one of {allowed:?}"));
                }
            }
        }
        PropertySchema::Integer { minimum, maximum } => {
            let Some(n) = value.as_i64().filter(|_| value.is_i64() || value.is_u64()) else {
                errors.push(format!("input.{key} must be an integer"));
                return;
            };
            if let Some(min) = minimum {
                if n < *min {
                    errors.push(format!("input.{key} must be >= {min}"));
                }
            }
            if let Some(max) = maximum {
                if n > *max {
                    errors.push(format!("input.{key} must be <= {max}"));
                }
            }
        }
        PropertySchema::Number { minimum, maximum } => {
            let Some(n) = value.as_f64() else {
                errors.push(format!("input.{key} must be a number"));
                return;
            };
            if !n.is_finite() {
                errors.push(format!("input.{key} must be a finite number"));
                return;
            }
            if let Some(min) = minimum {
                if n < *min {
                    errors.push(format!("input.{key} must be >= {min}"));
                }
            }
            if let Some(max) = maximum {
                if n > *max {
                    errors.push(format!("input.{key} must be <= {max}"));
                }
            }
        }
        PropertySchema::Boolean => {
            if !value.is_boolean() {
                errors.push(format!("input.{key} must be a boolean"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{BTreeMap, BTreeSet};

    fn schema() -> InputSchema {
        let mut properties = BTreeMap::new();
        properties.insert(
            "channelId".to_owned(),
            PropertySchema::String { min_length: Some(1), max_length: Some(128), enum_values: None },
        );
        properties.insert(
            "maxResults".to_owned(),
            PropertySchema::Integer { minimum: Some(1), maximum: Some(50) },
        );
        InputSchema {
            properties,
            required: BTreeSet::from(["channelId".to_owned()]),
            additional_properties: false,
        }
    }

    #[test]
    fn accepts_valid_input() {
        let input = json!({"channelId": "UC_x5XG1OV2P6uZZ5FSM9Ttw", "maxResults": 10});
        assert!(validate_input(&schema(), &input).is_ok());
    }

    #[test]
    fn accepts_empty_input_when_nothing_required() {
        let empty_schema = InputSchema {
            properties: BTreeMap::new(),
            required: BTreeSet::new(),
            additional_properties: false,
        };
        assert!(validate_input(&empty_schema, &json!({})).is_ok());
    }

    #[test]
    fn rejects_missing_required_property() {
        let errors = validate_input(&schema(), &json!({})).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("channelId")));
    }

    #[test]
    fn rejects_unknown_property_when_additional_properties_false() {
        let input = json!({"channelId": "x", "evil": true});
        let errors = validate_input(&schema(), &input).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("evil")));
    }

    #[test]
    fn rejects_integer_out_of_range() {
        let input = json!({"channelId": "x", "maxResults": 500});
        let errors = validate_input(&schema(), &input).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("maxResults")));
    }

    #[test]
    fn rejects_non_object_input() {
        let errors = validate_input(&schema(), &json!("not an object")).unwrap_err();
        assert_eq!(errors, vec!["input must be a JSON object".to_owned()]);
    }
}
