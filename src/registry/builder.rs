//! Builder for [`FunctionRegistry`].
//!
//! Registration replaces the runtime reflection a dynamic language would use:
//! every function is declared explicitly with its parameters, defaults and
//! handler, and `build` validates that the declarations are complete before
//! any of them can reach the model.

use std::collections::HashSet;
use std::future::Future;

use serde_json::Value;

use super::{CommandArgs, CommandFn, CommandResult, Function, FunctionRegistry, Parameter};
use crate::core::error::GptError;
use crate::schema::{self, ParamType};

/// Raw parameter declaration; validated at build time.
#[derive(Debug, Default)]
pub struct ParameterSpec {
    name: String,
    ty: Option<ParamType>,
    description: Option<String>,
    default: Option<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn typed(mut self, ty: ParamType) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declaring a default makes the parameter optional.
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

struct FunctionSpec {
    name: String,
    description: String,
    parameters: Vec<ParameterSpec>,
    has_return: bool,
    handler: CommandFn,
}

/// Collects function declarations; `build` turns them into a registry.
#[derive(Default)]
pub struct RegistryBuilder {
    functions: Vec<FunctionSpec>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start declaring a function. Finish with [`FunctionBuilder::handler`]
    /// (void) or [`FunctionBuilder::returning`] (value-returning).
    pub fn function(
        self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> FunctionBuilder {
        FunctionBuilder {
            registry: self,
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Validate all declarations and produce the registry.
    pub fn build(self) -> Result<FunctionRegistry, GptError> {
        let mut seen = HashSet::new();
        let mut functions = Vec::with_capacity(self.functions.len());

        for spec in self.functions {
            if !seen.insert(spec.name.clone()) {
                return Err(GptError::DuplicateFunction(spec.name));
            }
            // The function's own documentation is checked before any parameter.
            if spec.description.trim().is_empty() {
                return Err(GptError::MissingFunctionDoc(spec.name));
            }

            let mut parameters = Vec::with_capacity(spec.parameters.len());
            for parameter in spec.parameters {
                let ty = parameter.ty.ok_or_else(|| GptError::MissingParameterType {
                    function: spec.name.clone(),
                    parameter: parameter.name.clone(),
                })?;
                // Untranslatable types are a programming error; fail here
                // rather than on the first request.
                schema::json_schema(&ty)?;
                let description = parameter
                    .description
                    .filter(|text| !text.trim().is_empty())
                    .ok_or_else(|| GptError::MissingParameterDoc {
                        function: spec.name.clone(),
                        parameter: parameter.name.clone(),
                    })?;
                parameters.push(Parameter {
                    name: parameter.name,
                    ty,
                    description,
                    default: parameter.default,
                });
            }

            functions.push(Function {
                name: spec.name,
                description: spec.description,
                parameters,
                has_return: spec.has_return,
                handler: spec.handler,
            });
        }

        Ok(FunctionRegistry::from_functions(functions))
    }
}

/// In-progress declaration of a single function.
pub struct FunctionBuilder {
    registry: RegistryBuilder,
    name: String,
    description: String,
    parameters: Vec<ParameterSpec>,
}

impl FunctionBuilder {
    /// Declare a required, documented parameter.
    pub fn param(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        description: impl Into<String>,
    ) -> Self {
        self.parameters
            .push(ParameterSpec::new(name).typed(ty).described(description));
        self
    }

    /// Declare an optional parameter with the default substituted when the
    /// model omits the argument.
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        ty: ParamType,
        default: Value,
        description: impl Into<String>,
    ) -> Self {
        self.parameters.push(
            ParameterSpec::new(name)
                .typed(ty)
                .described(description)
                .with_default(default),
        );
        self
    }

    /// Declare a parameter from a raw declaration (useful for declarative tables).
    pub fn param_spec(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    /// Attach the handler for a function with no return value.
    pub fn handler<F, Fut>(self, f: F) -> RegistryBuilder
    where
        F: Fn(CommandArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.finish(false, f)
    }

    /// Attach the handler for a function whose return value is fed back to
    /// the model.
    pub fn returning<F, Fut>(self, f: F) -> RegistryBuilder
    where
        F: Fn(CommandArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.finish(true, f)
    }

    fn finish<F, Fut>(mut self, has_return: bool, f: F) -> RegistryBuilder
    where
        F: Fn(CommandArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let handler: CommandFn = Box::new(move |args| Box::pin(f(args)));
        self.registry.functions.push(FunctionSpec {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            has_return,
            handler,
        });
        self.registry
    }
}
