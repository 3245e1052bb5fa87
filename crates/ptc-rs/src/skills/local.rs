//! In-process functions exposed as skills.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::json_schema_for;

/// Boxed future produced by a local function handler.
pub type LocalFuture = Pin<Box<dyn Future<Output = Result<Value, String>> + Send>>;

/// Type-erased async handler for [`LocalFunction`].
type ErasedHandler = Arc<dyn Fn(Map<String, Value>) -> LocalFuture + Send + Sync>;

/// Data type of a skill parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    /// No type constraint.
    Any,
}

impl ParamType {
    /// JSON Schema `type` keyword, if constrained.
    pub fn json_type(self) -> Option<&'static str> {
        match self {
            ParamType::String => Some("string"),
            ParamType::Integer => Some("integer"),
            ParamType::Number => Some("number"),
            ParamType::Boolean => Some("boolean"),
            ParamType::Array => Some("array"),
            ParamType::Object => Some("object"),
            ParamType::Any => None,
        }
    }

    /// Python type hint used in generated stubs.
    pub fn python_hint(self) -> &'static str {
        match self {
            ParamType::String => "str",
            ParamType::Integer => "int",
            ParamType::Number => "float",
            ParamType::Boolean => "bool",
            ParamType::Array => "list",
            ParamType::Object => "dict",
            ParamType::Any => "Any",
        }
    }

    /// Placeholder literal for usage examples.
    pub fn placeholder(self) -> &'static str {
        match self {
            ParamType::String => "\"...\"",
            ParamType::Integer => "1",
            ParamType::Number => "1.0",
            ParamType::Boolean => "True",
            ParamType::Array => "[]",
            ParamType::Object => "{}",
            ParamType::Any => "None",
        }
    }

    /// Read the type of a property schema. Nullable unions such as
    /// `["integer", "null"]` resolve to the non-null member.
    pub fn from_schema(schema: &Value) -> Self {
        let ty = match schema.get("type") {
            Some(Value::String(s)) => Some(s.as_str()),
            Some(Value::Array(types)) => types
                .iter()
                .filter_map(Value::as_str)
                .find(|t| *t != "null"),
            _ => None,
        };
        match ty {
            Some("string") => ParamType::String,
            Some("integer") => ParamType::Integer,
            Some("number") => ParamType::Number,
            Some("boolean") => ParamType::Boolean,
            Some("array") => ParamType::Array,
            Some("object") => ParamType::Object,
            _ => ParamType::Any,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type().unwrap_or("any"))
    }
}

/// One named parameter of a skill.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
    pub description: String,
    /// `None` marks a required parameter.
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            description: String::new(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ParamType, default: Value) -> Self {
        Self {
            name: name.into(),
            ty,
            description: String::new(),
            default: Some(default),
        }
    }

    /// Attach a description (builder pattern).
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Read the parameter list out of an object schema, required parameters
/// first, each group in property order.
pub fn params_from_schema(schema: &Value) -> Vec<Param> {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut params: Vec<Param> = props
        .iter()
        .map(|(name, prop)| {
            let default = if required.contains(&name.as_str()) {
                None
            } else {
                Some(prop.get("default").cloned().unwrap_or(Value::Null))
            };
            Param {
                name: name.clone(),
                ty: ParamType::from_schema(prop),
                description: prop
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                default,
            }
        })
        .collect();
    params.sort_by_key(|p| !p.is_required());
    params
}

/// Build an object schema from an explicit parameter list.
fn schema_from_params(params: &[Param]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();
    for p in params {
        let mut prop = Map::new();
        if let Some(ty) = p.ty.json_type() {
            prop.insert("type".into(), json!(ty));
        }
        if !p.description.is_empty() {
            prop.insert("description".into(), json!(p.description));
        }
        match &p.default {
            None => required.push(json!(p.name)),
            Some(Value::Null) => {}
            Some(default) => {
                prop.insert("default".into(), default.clone());
            }
        }
        properties.insert(p.name.clone(), Value::Object(prop));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// A function registered in-process and callable from generated bindings.
///
/// The docstring is used verbatim as the skill description. Handlers run on
/// the bridge's task; errors they return and panics they raise are both
/// turned into a failed call, never propagated.
#[derive(Clone)]
pub struct LocalFunction {
    name: String,
    doc: String,
    params: Vec<Param>,
    schema: Value,
    fill_defaults: bool,
    handler: ErasedHandler,
}

impl LocalFunction {
    /// Register a function with an explicit parameter list. The handler
    /// receives keyword arguments with declared defaults filled in.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        doc: impl Into<String>,
        params: Vec<Param>,
        handler: F,
    ) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        let schema = schema_from_params(&params);
        Self {
            name: name.into(),
            doc: doc.into(),
            params,
            schema,
            fill_defaults: true,
            handler: Arc::new(move |kwargs: Map<String, Value>| -> LocalFuture {
                Box::pin(handler(kwargs))
            }),
        }
    }

    /// Register a function whose parameters are derived from the JSON
    /// Schema of `A`. Keyword arguments are deserialized into `A`; the
    /// returned value is serialized back to JSON.
    ///
    /// ```ignore
    /// #[derive(Deserialize, JsonSchema)]
    /// struct AddArgs {
    ///     /// First operand.
    ///     a: i64,
    ///     /// Second operand.
    ///     b: i64,
    /// }
    ///
    /// let add = LocalFunction::typed("add", "Add two integers.", |args: AddArgs| async move {
    ///     Ok(args.a + args.b)
    /// });
    /// ```
    pub fn typed<A, R, F, Fut>(name: impl Into<String>, doc: impl Into<String>, handler: F) -> Self
    where
        A: JsonSchema + DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, String>> + Send + 'static,
    {
        let schema = json_schema_for::<A>();
        let params = params_from_schema(&schema);
        let erased = move |kwargs: Map<String, Value>| -> LocalFuture {
            let args: A = match serde_json::from_value(Value::Object(kwargs)) {
                Ok(a) => a,
                Err(e) => return Box::pin(async move { Err(format!("invalid arguments: {e}")) }),
            };
            let fut = handler(args);
            Box::pin(async move {
                let out = fut.await?;
                serde_json::to_value(out).map_err(|e| format!("result is not JSON: {e}"))
            })
        };
        Self {
            name: name.into(),
            doc: doc.into(),
            params,
            schema,
            fill_defaults: false,
            handler: Arc::new(erased),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// JSON Schema the keyword arguments are validated against.
    pub fn input_schema(&self) -> &Value {
        &self.schema
    }

    /// Run the handler. Panics are caught and reported as errors.
    pub async fn invoke(&self, mut kwargs: Map<String, Value>) -> Result<Value, String> {
        if self.fill_defaults {
            for p in &self.params {
                if let Some(default) = &p.default
                    && !kwargs.contains_key(&p.name)
                {
                    kwargs.insert(p.name.clone(), default.clone());
                }
            }
        }
        let handler = Arc::clone(&self.handler);
        match AssertUnwindSafe(async move { handler(kwargs).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(panic_message(panic.as_ref())),
        }
    }
}

impl fmt::Debug for LocalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFunction")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

/// Validate keyword arguments against a skill's input schema.
///
/// Returns a message listing every violation, formatted so the model can
/// correct its call. An invalid schema skips validation.
pub fn validate_arguments(schema: &Value, kwargs: &Map<String, Value>) -> Result<(), String> {
    let Ok(validator) = jsonschema::validator_for(schema) else {
        return Ok(());
    };
    let instance = Value::Object(kwargs.clone());
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("argument validation failed:\n{}", errors.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize, JsonSchema)]
    struct GreetArgs {
        /// Who to greet.
        name: String,
        /// How many times.
        times: Option<u32>,
    }

    fn greet() -> LocalFunction {
        LocalFunction::typed("greet", "Greet someone.", |args: GreetArgs| async move {
            Ok(format!("hello {}", args.name).repeat(args.times.unwrap_or(1) as usize))
        })
    }

    #[test]
    fn typed_function_derives_params() {
        let f = greet();
        let params = f.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "name");
        assert_eq!(params[0].ty, ParamType::String);
        assert!(params[0].is_required());
        assert_eq!(params[0].description, "Who to greet.");
        assert_eq!(params[1].name, "times");
        assert_eq!(params[1].ty, ParamType::Integer);
        assert_eq!(params[1].default, Some(Value::Null));
    }

    #[test]
    fn explicit_params_build_schema() {
        let f = LocalFunction::new(
            "read_lines",
            "Read lines.",
            vec![
                Param::required("path", ParamType::String).describe("File path"),
                Param::optional("limit", ParamType::Integer, json!(10)),
            ],
            |_| async { Ok(Value::Null) },
        );
        let schema = f.input_schema();
        assert_eq!(schema["required"], json!(["path"]));
        assert_eq!(schema["properties"]["path"]["description"], "File path");
        assert_eq!(schema["properties"]["limit"]["default"], 10);
    }

    #[tokio::test]
    async fn typed_invoke_round_trips() {
        let mut kwargs = Map::new();
        kwargs.insert("name".into(), json!("ada"));
        kwargs.insert("times".into(), json!(2));
        assert_eq!(greet().invoke(kwargs).await.unwrap(), json!("hello adahello ada"));
    }

    #[tokio::test]
    async fn defaults_are_filled_for_explicit_params() {
        let f = LocalFunction::new(
            "limit",
            "Echo the limit.",
            vec![Param::optional("limit", ParamType::Integer, json!(10))],
            |kwargs| async move { Ok(kwargs["limit"].clone()) },
        );
        assert_eq!(f.invoke(Map::new()).await.unwrap(), json!(10));
    }

    #[tokio::test]
    async fn handler_errors_and_panics_are_contained() {
        let failing = LocalFunction::new("fail", "", vec![], |_| async {
            Err("disk full".to_string())
        });
        assert_eq!(failing.invoke(Map::new()).await.unwrap_err(), "disk full");

        let panicking = LocalFunction::new("boom", "", vec![], |_| async {
            if true {
                panic!("kaboom");
            }
            Ok(Value::Null)
        });
        let err = panicking.invoke(Map::new()).await.unwrap_err();
        assert!(err.contains("kaboom"), "{err}");
    }

    #[tokio::test]
    async fn bad_typed_arguments_are_reported() {
        let mut kwargs = Map::new();
        kwargs.insert("name".into(), json!(42));
        let err = greet().invoke(kwargs).await.unwrap_err();
        assert!(err.starts_with("invalid arguments"), "{err}");
    }

    #[test]
    fn validation_lists_violations() {
        let schema = json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        });
        assert!(validate_arguments(&schema, &Map::new()).is_err());

        let mut ok = Map::new();
        ok.insert("path".into(), json!("a.txt"));
        assert!(validate_arguments(&schema, &ok).is_ok());
    }

    #[test]
    fn nullable_union_resolves_to_member() {
        assert_eq!(
            ParamType::from_schema(&json!({"type": ["integer", "null"]})),
            ParamType::Integer
        );
        assert_eq!(ParamType::from_schema(&json!({})), ParamType::Any);
    }
}
