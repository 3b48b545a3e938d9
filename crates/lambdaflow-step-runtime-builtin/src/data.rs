//! Data-shaping steps: templates, field extraction, key renaming, field
//! selection, flattening, ids.

use async_trait::async_trait;
use lambdaflow_config::ValueMap;
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepRequest};
use minijinja::Environment;
use serde_json::{Value, json};

use crate::step::{Step, config_str, invalid_config, invalid_input, json_source, lookup};

/// Renders `config.template` against the input with minijinja.
///
/// ```json
/// { "template": "Hello {{ user.name | title }}, you have {{ items | length }} items" }
/// ```
pub struct TextTemplate;

#[async_trait]
impl Step for TextTemplate {
  fn kind(&self) -> &'static str {
    "texttemplate"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let template = config_str(request, "template")
      .ok_or_else(|| invalid_config(self.kind(), "missing template"))?;

    let env = Environment::new();
    let context = minijinja::Value::from_serialize(&request.input);
    let text = env
      .render_str(template, context)
      .map_err(|e| invalid_config(self.kind(), format!("failed to render template: {e}")))?;

    Ok(
      ExecutionResult::success("Template rendered", json!({ "text": text }))
        .with_details(json!({ "template": template })),
    )
  }
}

/// Picks one value out of `input.json` (or the input) by dotted path.
pub struct ExtractField;

#[async_trait]
impl Step for ExtractField {
  fn kind(&self) -> &'static str {
    "extractfield"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let field_path = config_str(request, "fieldPath")
      .ok_or_else(|| invalid_config(self.kind(), "missing fieldPath"))?;

    let found = lookup(json_source(&request.input), field_path);
    let details = json!({ "fieldPath": field_path, "found": found.is_some() });
    let value = found.cloned().unwrap_or(Value::Null);

    Ok(ExecutionResult::success(format!("Extracted \"{field_path}\""), value).with_details(details))
  }
}

/// Builds a new object from `config.mapping` (`{"newKey": "path"}`), given as
/// an object or a JSON string. Paths are looked up from the input, e.g.
/// `json.rows[0].Summary`. A missing path yields `null` and is listed in the
/// details.
pub struct RenameJsonKeys;

#[async_trait]
impl Step for RenameJsonKeys {
  fn kind(&self) -> &'static str {
    "renamejsonkeys"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let mapping = match request.config.get("mapping") {
      Some(Value::Object(mapping)) => mapping.clone(),
      Some(Value::String(text)) if !text.trim().is_empty() => {
        match serde_json::from_str::<Value>(text) {
          Ok(Value::Object(mapping)) => mapping,
          Ok(_) => {
            return Err(invalid_config(
              self.kind(),
              "mapping must be a JSON object of new keys to paths",
            ));
          }
          Err(e) => {
            return Err(invalid_config(
              self.kind(),
              format!("mapping is not valid JSON: {e}"),
            ));
          }
        }
      }
      _ => return Err(invalid_config(self.kind(), "missing mapping")),
    };

    let mut renamed = ValueMap::new();
    let mut missing = ValueMap::new();
    for (new_key, path) in &mapping {
      let path = path.as_str().ok_or_else(|| {
        invalid_config(self.kind(), format!("path for '{new_key}' must be a string"))
      })?;
      let value = match lookup(&request.input, path) {
        Some(value) => value.clone(),
        None => {
          missing.insert(new_key.clone(), Value::String(path.to_string()));
          Value::Null
        }
      };
      renamed.insert(new_key.clone(), value);
    }

    let summary = if missing.is_empty() {
      format!("Renamed {} keys", renamed.len())
    } else {
      format!("Renamed {} keys, {} missing", renamed.len(), missing.len())
    };
    let details = json!({ "mapping": mapping, "result": renamed, "missing": missing });
    let mut output = renamed.clone();
    output.insert("json".to_string(), Value::Object(renamed));

    Ok(ExecutionResult::success(summary, Value::Object(output)).with_details(details))
  }
}

/// Keeps only `config.fields` of `input.json` (or the input). A string
/// `input.json` is parsed first.
pub struct BuildJson;

#[async_trait]
impl Step for BuildJson {
  fn kind(&self) -> &'static str {
    "buildjson"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let fields: Vec<&str> = request
      .config
      .get("fields")
      .and_then(Value::as_array)
      .map(|fields| fields.iter().filter_map(Value::as_str).collect())
      .unwrap_or_default();
    if fields.is_empty() {
      return Err(invalid_config(self.kind(), "no fields specified to build JSON"));
    }

    let parsed;
    let source = match request.input.get("json") {
      Some(Value::String(text)) => {
        parsed = serde_json::from_str::<Value>(text)
          .map_err(|e| invalid_input(self.kind(), format!("input json is not valid JSON: {e}")))?;
        &parsed
      }
      _ => json_source(&request.input),
    };
    let Value::Object(source) = source else {
      return Err(invalid_input(self.kind(), "expected a JSON object to build from"));
    };

    let built: ValueMap = fields
      .iter()
      .filter_map(|field| source.get(*field).map(|value| (field.to_string(), value.clone())))
      .collect();
    let details = json!({ "fieldsUsed": fields, "fieldsFound": built.len() });
    let mut output = built.clone();
    output.insert("json".to_string(), Value::Object(built));

    Ok(
      ExecutionResult::success(
        format!("Built JSON with {} fields", fields.len()),
        Value::Object(output),
      )
      .with_details(details),
    )
  }
}

/// Flattens nested objects to dotted keys. Arrays are kept as leaves.
pub struct FlattenJson;

#[async_trait]
impl Step for FlattenJson {
  fn kind(&self) -> &'static str {
    "flattenjson"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let Value::Object(source) = json_source(&request.input) else {
      return Err(invalid_input(self.kind(), "expected a JSON object"));
    };

    let mut flattened = ValueMap::new();
    flatten_into(&mut flattened, "", source);
    let fields = flattened.len();

    Ok(
      ExecutionResult::success(
        format!("Flattened JSON with {fields} fields"),
        json!({ "json": flattened }),
      )
      .with_details(json!({ "fields": fields })),
    )
  }
}

fn flatten_into(target: &mut ValueMap, prefix: &str, source: &ValueMap) {
  for (key, value) in source {
    let path = if prefix.is_empty() {
      key.clone()
    } else {
      format!("{prefix}.{key}")
    };
    match value {
      Value::Object(nested) if !nested.is_empty() => flatten_into(target, &path, nested),
      other => {
        target.insert(path, other.clone());
      }
    }
  }
}

/// Emits `{<key>: uuid-v4}`.
pub struct GenerateUuid;

#[async_trait]
impl Step for GenerateUuid {
  fn kind(&self) -> &'static str {
    "generateuuid"
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let key = config_str(request, "key").unwrap_or("id");
    match config_str(request, "type").unwrap_or("uuid") {
      "uuid" => {}
      other => {
        return Err(invalid_config(
          self.kind(),
          format!("unsupported id type '{other}', only 'uuid' is available"),
        ));
      }
    }

    let mut output = ValueMap::new();
    output.insert(
      key.to_string(),
      Value::String(uuid::Uuid::new_v4().to_string()),
    );
    Ok(ExecutionResult::success(
      format!("Generated UUID with key '{key}'"),
      Value::Object(output),
    ))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::step::request;

  #[tokio::test]
  async fn test_template_renders_input() {
    let result = TextTemplate
      .run(&request(
        "texttemplate",
        json!({"template": "Hello {{ user.name | title }} ({{ items | length }})"}),
        json!({"user": {"name": "ada"}, "items": [1, 2, 3]}),
      ))
      .await
      .unwrap();

    assert_eq!(result.output["text"], "Hello Ada (3)");
  }

  #[tokio::test]
  async fn test_template_missing_value_renders_empty() {
    let result = TextTemplate
      .run(&request(
        "texttemplate",
        json!({"template": "[{{ nothing }}]"}),
        json!({}),
      ))
      .await
      .unwrap();

    assert_eq!(result.output["text"], "[]");
  }

  #[tokio::test]
  async fn test_template_errors() {
    let missing = TextTemplate
      .run(&request("texttemplate", json!({}), json!({})))
      .await
      .unwrap_err();
    assert!(matches!(missing, StepError::InvalidConfig { .. }));

    let broken = TextTemplate
      .run(&request(
        "texttemplate",
        json!({"template": "{{ unclosed"}),
        json!({}),
      ))
      .await
      .unwrap_err();
    assert!(broken.to_string().contains("failed to render template"));
  }

  #[tokio::test]
  async fn test_extract_field() {
    let input = json!({"json": {"order": {"lines": [{"sku": "A1"}]}}});

    let result = ExtractField
      .run(&request(
        "extractfield",
        json!({"fieldPath": "order.lines.0.sku"}),
        input.clone(),
      ))
      .await
      .unwrap();
    assert_eq!(result.output, json!("A1"));
    assert_eq!(result.details["found"], true);

    let missing = ExtractField
      .run(&request("extractfield", json!({"fieldPath": "order.id"}), input))
      .await
      .unwrap();
    assert_eq!(missing.output, Value::Null);
    assert_eq!(missing.details["found"], false);
  }

  #[tokio::test]
  async fn test_rename_json_keys() {
    let input = json!({"json": {"rows": [{"Summary": "ok", "Id": 7}]}});
    let result = RenameJsonKeys
      .run(&request(
        "renamejsonkeys",
        json!({"mapping": r#"{"summary": "json.rows[0].Summary", "owner": "json.owner"}"#}),
        input,
      ))
      .await
      .unwrap();

    assert_eq!(result.output["summary"], "ok");
    assert_eq!(result.output["json"], json!({"summary": "ok", "owner": null}));
    assert_eq!(result.details["missing"], json!({"owner": "json.owner"}));
    assert_eq!(result.summary, "Renamed 2 keys, 1 missing");
  }

  #[tokio::test]
  async fn test_rename_json_keys_rejects_bad_mapping() {
    for mapping in [json!("{not json"), json!("[1]"), json!({"a": 1}), json!("")] {
      let err = RenameJsonKeys
        .run(&request("renamejsonkeys", json!({ "mapping": mapping }), json!({})))
        .await
        .unwrap_err();
      assert!(matches!(err, StepError::InvalidConfig { .. }), "{err}");
    }
  }

  #[tokio::test]
  async fn test_build_json_keeps_listed_fields() {
    let result = BuildJson
      .run(&request(
        "buildjson",
        json!({"fields": ["name", "email", "phone"]}),
        json!({"json": {"name": "ada", "email": "a@b.c", "password": "x"}}),
      ))
      .await
      .unwrap();

    assert_eq!(result.output["json"], json!({"name": "ada", "email": "a@b.c"}));
    assert_eq!(result.output["name"], "ada");
    assert!(result.output.get("password").is_none());
    assert_eq!(result.details["fieldsFound"], 2);
  }

  #[tokio::test]
  async fn test_build_json_parses_string_source() {
    let result = BuildJson
      .run(&request(
        "buildjson",
        json!({"fields": ["id"]}),
        json!({"json": r#"{"id": 3, "other": true}"#}),
      ))
      .await
      .unwrap();
    assert_eq!(result.output["json"], json!({"id": 3}));

    let err = BuildJson
      .run(&request("buildjson", json!({"fields": ["id"]}), json!({"json": "{oops"})))
      .await
      .unwrap_err();
    assert!(matches!(err, StepError::InvalidInput { .. }));

    let err = BuildJson
      .run(&request("buildjson", json!({"fields": []}), json!({})))
      .await
      .unwrap_err();
    assert!(matches!(err, StepError::InvalidConfig { .. }));
  }

  #[tokio::test]
  async fn test_flatten_json() {
    let result = FlattenJson
      .run(&request(
        "flattenjson",
        json!({}),
        json!({"a": {"b": 1, "c": {"d": [1, 2]}}, "e": "x", "f": {}}),
      ))
      .await
      .unwrap();

    assert_eq!(
      result.output["json"],
      json!({"a.b": 1, "a.c.d": [1, 2], "e": "x", "f": {}})
    );
  }

  #[tokio::test]
  async fn test_flatten_rejects_arrays() {
    let err = FlattenJson
      .run(&request("flattenjson", json!({}), json!([1, 2])))
      .await
      .unwrap_err();
    assert!(matches!(err, StepError::InvalidInput { .. }));
  }

  #[tokio::test]
  async fn test_generate_uuid() {
    let result = GenerateUuid
      .run(&request("generateuuid", json!({"key": "orderId"}), json!({})))
      .await
      .unwrap();
    let id = result.output["orderId"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());

    let default_key = GenerateUuid
      .run(&request("generateuuid", json!({}), json!({})))
      .await
      .unwrap();
    assert!(default_key.output["id"].is_string());

    let err = GenerateUuid
      .run(&request("generateuuid", json!({"type": "nanoid"}), json!({})))
      .await
      .unwrap_err();
    assert!(matches!(err, StepError::InvalidConfig { .. }));
  }
}
