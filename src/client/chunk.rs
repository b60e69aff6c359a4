//! Completion chunk parsing and accumulation.
//!
//! The stream delivers a completion in fragments; [`ResponseData::fold`]
//! replays them in arrival order into one assembled response.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;

use crate::client::message::Message;
use crate::core::error::GptError;

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallDelta {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCallDelta>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: Delta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

/// A function call ready for dispatch: name plus each argument re-serialized
/// to JSON text, keyed by parameter name.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExecution {
    pub name: String,
    pub arguments: HashMap<String, String>,
}

/// Response assembled from the chunk sequence of one request.
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    /// Set once a chunk carries a finish reason.
    pub ready: bool,
    pub content: String,
    pub function_name: Option<String>,
    /// Concatenated argument fragments; one JSON object once complete.
    pub function_arguments: String,
    /// The latest content fragment, for incremental display.
    pub delta_text: Option<String>,
}

impl ResponseData {
    /// Fold the next event payload into the accumulated response.
    pub fn fold(previous: Option<ResponseData>, payload: &str) -> Result<ResponseData, GptError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|err| GptError::Protocol(format!("invalid chunk JSON: {}", err)))?;

        if let Some(error) = value.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(GptError::Upstream(message));
        }

        let chunk: CompletionChunk = serde_json::from_value(value)
            .map_err(|err| GptError::Protocol(format!("malformed chunk: {}", err)))?;
        let choice = chunk
            .choices
            .first()
            .ok_or_else(|| GptError::Protocol("chunk has no choices".to_string()))?;

        let mut data = previous.unwrap_or_default();
        data.ready = choice.finish_reason.is_some();
        data.delta_text = None;

        if let Some(content) = &choice.delta.content {
            if !content.is_empty() {
                // Trailing newlines are stripped per fragment, not from the
                // accumulated buffer.
                let fragment = content.trim_end_matches('\n').to_string();
                data.content.push_str(&fragment);
                data.delta_text = Some(fragment);
            }
        }

        if let Some(call) = &choice.delta.function_call {
            if let Some(name) = &call.name {
                // The first named fragment wins for the whole turn.
                if data.function_name.is_none() {
                    data.function_name = Some(name.clone());
                }
            }
            if let Some(arguments) = &call.arguments {
                data.function_arguments.push_str(arguments);
            }
        }

        Ok(data)
    }

    /// The assistant message to store, if the response carried content.
    pub fn assistant_message(&self) -> Option<Message> {
        if self.ready && !self.content.is_empty() {
            Some(Message::assistant(self.content.clone()))
        } else {
            None
        }
    }

    /// The function call to dispatch, if the response requested one.
    ///
    /// Each argument value is re-serialized to JSON text so the registry can
    /// decode it against the declared parameter type. Empty arguments text is
    /// an empty argument map.
    pub fn function_execution(&self) -> Result<Option<FunctionExecution>, GptError> {
        if !self.ready {
            return Ok(None);
        }
        let Some(name) = &self.function_name else {
            return Ok(None);
        };

        let arguments = if self.function_arguments.trim().is_empty() {
            HashMap::new()
        } else {
            let value: Value = serde_json::from_str(&self.function_arguments).map_err(|err| {
                GptError::Protocol(format!("function arguments are not valid JSON: {}", err))
            })?;
            let Value::Object(entries) = value else {
                return Err(GptError::Protocol(
                    "function arguments are not a JSON object".to_string(),
                ));
            };
            let mut arguments = HashMap::new();
            for (key, value) in entries {
                arguments.insert(key, serde_json::to_string(&value)?);
            }
            arguments
        };

        Ok(Some(FunctionExecution {
            name: name.clone(),
            arguments,
        }))
    }
}
