use std::{fmt, marker::PhantomData, sync::Arc};

use jsonschema::{Draft, JSONSchema};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::CoreError;

pub trait SchemaCapability: Send + Sync {
    fn validate(&self, data: &Value) -> bool;

    fn to_portable_schema(&self) -> Value;

    fn violations(&self, data: &Value) -> Vec<String> {
        if self.validate(data) {
            Vec::new()
        } else {
            vec!["value does not match schema".to_string()]
        }
    }
}

#[derive(Clone)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Arc<dyn SchemaCapability>,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: Arc<dyn SchemaCapability>) -> Self {
        Self { name: name.into(), schema }
    }
}

impl fmt::Debug for ResponseSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSchema")
            .field("name", &self.name)
            .field("schema", &self.schema.to_portable_schema())
            .finish()
    }
}

pub struct JsonSchemaCapability {
    schema: Value,
    compiled: JSONSchema,
}

impl JsonSchemaCapability {
    pub fn new(schema: Value) -> Result<Self, CoreError> {
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&schema)
            .map_err(|err| CoreError::InvalidRequest(format!("invalid response schema: {err}")))?;
        Ok(Self { schema, compiled })
    }
}

impl SchemaCapability for JsonSchemaCapability {
    fn validate(&self, data: &Value) -> bool {
        self.compiled.is_valid(data)
    }

    fn to_portable_schema(&self) -> Value {
        self.schema.clone()
    }

    fn violations(&self, data: &Value) -> Vec<String> {
        match self.compiled.validate(data) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() { error.to_string() } else { format!("{path}: {error}") }
                })
                .collect(),
        }
    }
}

pub struct TypedSchema<T> {
    portable: Value,
    _marker: PhantomData<fn() -> T>,
}

impl<T: JsonSchema + DeserializeOwned> TypedSchema<T> {
    pub fn new() -> Self {
        let schema = schemars::schema_for!(T);
        let portable = serde_json::to_value(&schema).unwrap_or_else(|_| json!({}));
        Self { portable, _marker: PhantomData }
    }
}

impl<T: JsonSchema + DeserializeOwned> Default for TypedSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: JsonSchema + DeserializeOwned> SchemaCapability for TypedSchema<T> {
    fn validate(&self, data: &Value) -> bool {
        T::deserialize(data).is_ok()
    }

    fn to_portable_schema(&self) -> Value {
        self.portable.clone()
    }

    fn violations(&self, data: &Value) -> Vec<String> {
        match T::deserialize(data) {
            Ok(_) => Vec::new(),
            Err(err) => vec![err.to_string()],
        }
    }
}
