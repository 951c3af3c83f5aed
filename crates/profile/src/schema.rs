//! JSON schema for profile documents.

/// JSON Schema for a profile (YAML profiles are validated after conversion
/// to JSON values).
pub const PROFILE_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "$id": "https://hostspec.dev/schemas/profile.json",
  "title": "Hostspec Profile",
  "type": "object",
  "required": ["name", "controls"],
  "properties": {
    "name": { "type": "string", "minLength": 1 },
    "title": { "type": ["string", "null"] },
    "version": { "type": ["string", "null"] },
    "controls": {
      "type": "array",
      "items": { "$ref": "#/definitions/control" }
    }
  },
  "definitions": {
    "control": {
      "type": "object",
      "required": ["id"],
      "additionalProperties": false,
      "properties": {
        "id": { "type": "string", "minLength": 1 },
        "title": { "type": ["string", "null"] },
        "desc": { "type": ["string", "null"] },
        "impact": {
          "oneOf": [
            { "type": "string", "enum": ["none", "low", "medium", "high", "critical"] },
            { "type": "number", "minimum": 0.0, "maximum": 1.0 }
          ]
        },
        "tags": { "type": "array", "items": { "type": "string" } },
        "refs": { "type": "array", "items": { "type": "string" } },
        "describe": {
          "type": "array",
          "items": { "$ref": "#/definitions/assertion" }
        }
      }
    },
    "assertion": {
      "type": "object",
      "required": ["resource"],
      "additionalProperties": false,
      "properties": {
        "resource": { "type": "string", "minLength": 1 },
        "args": { "type": "array" },
        "its": { "type": "string", "minLength": 1 },
        "should": { "type": "string", "minLength": 1 },
        "should_not": { "type": "string", "minLength": 1 },
        "expected": {}
      },
      "oneOf": [
        { "required": ["should"], "not": { "required": ["should_not"] } },
        { "required": ["should_not"], "not": { "required": ["should"] } }
      ]
    }
  }
}"##;

/// Parsed profile schema.
pub fn profile_schema() -> serde_json::Value {
    serde_json::from_str(PROFILE_SCHEMA).expect("Invalid profile schema")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_valid_json() {
        let schema = profile_schema();
        assert!(schema.is_object());
        assert_eq!(schema["title"], "Hostspec Profile");
    }

    #[test]
    fn test_schema_keeps_definition_refs() {
        let schema = profile_schema();
        assert_eq!(
            schema["properties"]["controls"]["items"]["$ref"],
            "#/definitions/control"
        );
        assert_eq!(
            schema["definitions"]["control"]["properties"]["describe"]["items"]["$ref"],
            "#/definitions/assertion"
        );
    }
}
