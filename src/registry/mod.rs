//! Registry of model-callable functions.
//!
//! Each registered function carries a schema descriptor (name, documented
//! parameters, return presence) plus the async handler that actually runs it.
//! The registry is built once through [`RegistryBuilder`] and read-only
//! afterwards; dispatching decodes the model's textual arguments against the
//! declared parameter types before invoking the handler.

mod builder;

pub use builder::{FunctionBuilder, ParameterSpec, RegistryBuilder};

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::error::GptError;
use crate::schema::{self, ParamType};

/// Decoded arguments handed to a handler, keyed by parameter name.
pub type CommandArgs = HashMap<String, Value>;

/// What one invocation produces. `Ok(None)` is the return of a void function.
pub type CommandResult = Result<Option<Value>, Box<dyn std::error::Error + Send + Sync>>;

pub(crate) type CommandFn =
    Box<dyn Fn(CommandArgs) -> BoxFuture<'static, CommandResult> + Send + Sync>;

/// A single declared parameter, immutable once the registry is built.
#[derive(Debug)]
pub struct Parameter {
    pub name: String,
    pub ty: ParamType,
    pub description: String,
    /// Present iff the parameter is optional; substituted when the model
    /// omits the argument.
    pub default: Option<Value>,
}

impl Parameter {
    pub fn is_optional(&self) -> bool {
        self.default.is_some()
    }

    fn json_schema(&self) -> Result<Value, GptError> {
        let mut schema = schema::json_schema(&self.ty)?;
        if let Value::Object(object) = &mut schema {
            object.insert("description".to_string(), json!(self.description));
        }
        Ok(schema)
    }
}

/// Descriptor and handler for one registered function.
pub struct Function {
    pub name: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub has_return: bool,
    handler: CommandFn,
}

impl Function {
    /// JSON schema in the chat-completions `functions` format.
    pub fn json_schema(&self) -> Result<Value, GptError> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for parameter in &self.parameters {
            properties.insert(parameter.name.clone(), parameter.json_schema()?);
            if !parameter.is_optional() {
                required.push(Value::String(parameter.name.clone()));
            }
        }
        Ok(json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        }))
    }
}

/// Ordered mapping of function name to descriptor.
pub struct FunctionRegistry {
    functions: Vec<Function>,
}

impl std::fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field(
                "functions",
                &self.functions.iter().map(|func| &func.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl FunctionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub(crate) fn from_functions(functions: Vec<Function>) -> Self {
        Self { functions }
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Schemas for every registered function, in registration order.
    pub fn schemas(&self) -> Result<Vec<Value>, GptError> {
        self.functions.iter().map(Function::json_schema).collect()
    }

    /// Decode `raw_args` against the named function's parameters and invoke it.
    ///
    /// Optional parameters absent from `raw_args` get their declared default
    /// without decoding. The result is the return value serialized to JSON
    /// text, or `None` for a void function.
    pub async fn execute(
        &self,
        name: &str,
        raw_args: &HashMap<String, String>,
    ) -> Result<Option<String>, GptError> {
        let function = self
            .get(name)
            .ok_or_else(|| GptError::FunctionNotFound(name.to_string()))?;

        let mut args = CommandArgs::new();
        for parameter in &function.parameters {
            match raw_args.get(&parameter.name) {
                Some(text) => {
                    let value = schema::decode(text, &parameter.ty).map_err(|err| {
                        GptError::ArgumentDecode {
                            parameter: parameter.name.clone(),
                            reason: err.to_string(),
                        }
                    })?;
                    args.insert(parameter.name.clone(), value);
                }
                None => match &parameter.default {
                    Some(default) => {
                        args.insert(parameter.name.clone(), default.clone());
                    }
                    None => {
                        return Err(GptError::MissingArgument {
                            function: name.to_string(),
                            parameter: parameter.name.clone(),
                        });
                    }
                },
            }
        }

        debug!(function = %name, args = args.len(), "invoking handler");
        let result = (function.handler)(args)
            .await
            .map_err(|source| GptError::Execution {
                function: name.to_string(),
                source,
            })?;

        if !function.has_return {
            return Ok(None);
        }
        let value = result.unwrap_or(Value::Null);
        Ok(Some(serde_json::to_string(&value)?))
    }
}
