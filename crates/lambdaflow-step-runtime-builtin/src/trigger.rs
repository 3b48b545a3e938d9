//! Trigger steps normalize an incoming event payload into workflow data.
//!
//! A trigger node is usually the start node of a run, so its input is the raw
//! event. Record-shaped events are wrapped as `{records: [...]}` so that a
//! downstream loop can iterate them.

use async_trait::async_trait;
use lambdaflow_step_runtime::{ExecutionResult, StepError, StepRequest};
use serde_json::{Value, json};

use crate::step::{Step, invalid_input};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
  ApiGateway,
  Schedule,
  EventBridge,
  Sns,
  S3,
  DynamoDb,
  Manual,
}

impl TriggerSource {
  pub const ALL: [TriggerSource; 7] = [
    Self::ApiGateway,
    Self::Schedule,
    Self::EventBridge,
    Self::Sns,
    Self::S3,
    Self::DynamoDb,
    Self::Manual,
  ];

  pub fn kind(self) -> &'static str {
    match self {
      Self::ApiGateway => "apigatewaytrigger",
      Self::Schedule => "scheduletrigger",
      Self::EventBridge => "eventbridgetrigger",
      Self::Sns => "snstrigger",
      Self::S3 => "s3trigger",
      Self::DynamoDb => "dynamodbtrigger",
      Self::Manual => "manualtrigger",
    }
  }
}

pub struct Trigger(pub TriggerSource);

#[async_trait]
impl Step for Trigger {
  fn kind(&self) -> &'static str {
    self.0.kind()
  }

  async fn run(&self, request: &StepRequest) -> Result<ExecutionResult, StepError> {
    let input = &request.input;
    let result = match self.0 {
      TriggerSource::ApiGateway => api_gateway(input),
      TriggerSource::Schedule => ExecutionResult::success("Scheduled trigger invoked", input.clone())
        .with_details(json!({ "cron": request.config.get("cron") })),
      TriggerSource::EventBridge => {
        let output = input.get("detail").cloned().unwrap_or_else(|| input.clone());
        ExecutionResult::success("Triggered by EventBridge", output).with_details(json!({
          "source": input.get("source"),
          "detailType": input.get("detail-type"),
          "id": input.get("id"),
        }))
      }
      TriggerSource::Sns => sns(self.kind(), input)?,
      TriggerSource::S3 => {
        let records: Vec<Value> = records(input).iter().map(s3_record).collect();
        ExecutionResult::success("Triggered by S3 event", json!({ "records": records }))
      }
      TriggerSource::DynamoDb => {
        let records: Vec<Value> = records(input).iter().map(dynamodb_record).collect();
        ExecutionResult::success("Triggered by DynamoDB event", json!({ "records": records }))
      }
      TriggerSource::Manual => ExecutionResult::success("Triggered manually", input.clone()),
    };
    Ok(result)
  }
}

fn records(input: &Value) -> &[Value] {
  input
    .get("Records")
    .and_then(Value::as_array)
    .map(Vec::as_slice)
    .unwrap_or(&[])
}

/// A JSON string body is parsed; a body that does not parse is reported and
/// the raw event passed on.
fn api_gateway(input: &Value) -> ExecutionResult {
  let details = json!({
    "method": input.get("httpMethod").or_else(|| input.get("method")),
    "path": input.get("path"),
  });
  let output = match input.get("body") {
    Some(Value::String(body)) if !body.trim().is_empty() => {
      match serde_json::from_str::<Value>(body) {
        Ok(parsed) => parsed,
        Err(e) => {
          return ExecutionResult::success("Invalid JSON in body", input.clone())
            .with_details(json!({ "error": e.to_string() }));
        }
      }
    }
    Some(Value::String(_)) | Some(Value::Null) | None => input.clone(),
    Some(body) => body.clone(),
  };
  ExecutionResult::success("Triggered via API Gateway", output).with_details(details)
}

fn sns(kind: &str, input: &Value) -> Result<ExecutionResult, StepError> {
  let Some(message) = records(input).first().and_then(|record| record.get("Sns")) else {
    return Ok(ExecutionResult::success("Triggered via SNS", input.clone()));
  };

  let output = match message.get("Message").and_then(Value::as_str) {
    Some(text) => serde_json::from_str(text)
      .map_err(|e| invalid_input(kind, format!("SNS message is not JSON: {e}")))?,
    None => json!({}),
  };
  Ok(
    ExecutionResult::success("Triggered via SNS", output).with_details(json!({
      "messageId": message.get("MessageId"),
      "subject": message.get("Subject"),
    })),
  )
}

fn s3_record(record: &Value) -> Value {
  let raw_key = record
    .pointer("/s3/object/key")
    .and_then(Value::as_str)
    .unwrap_or_default()
    .replace('+', " ");
  let key = urlencoding::decode(&raw_key)
    .map(|decoded| decoded.into_owned())
    .unwrap_or_else(|_| raw_key.clone());

  json!({
    "eventName": record.get("eventName"),
    "bucket": record.pointer("/s3/bucket/name"),
    "key": key,
    "size": record.pointer("/s3/object/size"),
    "time": record.get("eventTime"),
  })
}

fn dynamodb_record(record: &Value) -> Value {
  let table_name = record
    .get("eventSourceARN")
    .and_then(Value::as_str)
    .and_then(|arn| arn.split('/').nth(1))
    .unwrap_or("Unknown");

  json!({
    "eventName": record.get("eventName"),
    "eventID": record.get("eventID"),
    "tableName": table_name,
    "keys": record.pointer("/dynamodb/Keys").cloned().unwrap_or_else(|| json!({})),
    "newImage": record.pointer("/dynamodb/NewImage"),
    "oldImage": record.pointer("/dynamodb/OldImage"),
  })
}
