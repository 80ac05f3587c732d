//! Contract between the rendered form and the reactive field model.

use crate::schema::{FieldDescriptor, FormDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("action {action} is not applicable to '{id}'")]
    NotApplicable { action: String, id: String },
    #[error("invalid value for {property} on '{id}': {reason}")]
    InvalidValue {
        id: String,
        property: String,
        reason: String,
    },
}

/// Model property names that can appear in a change.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Property {
    Required,
    ValidationMessage,
    Value,
    Visible,
    Enabled,
    ReadOnly,
    Label,
    Description,
    Items,
    ActiveChild,
    Valid,
    Enum,
    EnumNames,
    Other(String),
}

impl Property {
    pub fn as_str(&self) -> &str {
        match self {
            Property::Required => "required",
            Property::ValidationMessage => "validationMessage",
            Property::Value => "value",
            Property::Visible => "visible",
            Property::Enabled => "enabled",
            Property::ReadOnly => "readOnly",
            Property::Label => "label",
            Property::Description => "description",
            Property::Items => "items",
            Property::ActiveChild => "activeChild",
            Property::Valid => "valid",
            Property::Enum => "enum",
            Property::EnumNames => "enumNames",
            Property::Other(name) => name,
        }
    }
}

impl From<String> for Property {
    fn from(value: String) -> Self {
        match value.as_str() {
            "required" => Property::Required,
            "validationMessage" => Property::ValidationMessage,
            "value" => Property::Value,
            "visible" => Property::Visible,
            "enabled" => Property::Enabled,
            "readOnly" => Property::ReadOnly,
            "label" => Property::Label,
            "description" => Property::Description,
            "items" => Property::Items,
            "activeChild" => Property::ActiveChild,
            "valid" => Property::Valid,
            "enum" => Property::Enum,
            "enumNames" => Property::EnumNames,
            _ => Property::Other(value),
        }
    }
}

impl From<Property> for String {
    fn from(value: Property) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One property diff emitted by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub property_name: Property,
    #[serde(default)]
    pub current_value: Value,
    #[serde(default)]
    pub prev_value: Value,
}

impl Change {
    pub fn new(property: Property, current: Value, prev: Value) -> Self {
        Self {
            property_name: property,
            current_value: current,
            prev_value: prev,
        }
    }
}

/// The field state after the change plus the diffs that produced it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FieldChangedPayload {
    pub field: FieldDescriptor,
    #[serde(default)]
    pub changes: Vec<Change>,
}

impl FieldChangedPayload {
    pub fn touches(&self, property: &Property) -> bool {
        self.changes.iter().any(|c| &c.property_name == property)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ModelEvent {
    FieldChanged(FieldChangedPayload),
    /// Form-level change (for example the active child moved).
    Change(FieldChangedPayload),
    SubmitSuccess(Value),
    SubmitFailure(Value),
    SubmitError(Value),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Action {
    Click,
    Focus,
    Submit,
    AddInstance(usize),
    RemoveInstance(usize),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click => f.write_str("click"),
            Action::Focus => f.write_str("focus"),
            Action::Submit => f.write_str("submit"),
            Action::AddInstance(i) => write!(f, "addInstance({i})"),
            Action::RemoveInstance(i) => write!(f, "removeInstance({i})"),
        }
    }
}

/// The reactive model a rendered form is bound to.
///
/// Events are delivered in emission order on every receiver returned by
/// [`FieldModelRuntime::subscribe`].
#[async_trait]
pub trait FieldModelRuntime: Send + Sync {
    fn get_state(&self) -> FormDefinition;
    fn field_state(&self, id: &str) -> Option<FieldDescriptor>;
    fn set_value(&self, id: &str, value: Value) -> Result<(), ModelError>;
    fn set_property(&self, id: &str, property: &Property, value: Value) -> Result<(), ModelError>;
    fn dispatch(&self, id: &str, action: Action) -> Result<(), ModelError>;
    fn subscribe(&self) -> UnboundedReceiver<ModelEvent>;
    fn import_data(&self, data: &Value);
    fn export_data(&self) -> Value;
    /// Resolves once pending rule evaluations have settled.
    async fn wait_for_promises(&self);
}

/// A model bound to one field id.
#[derive(Clone)]
pub struct FieldHandle {
    model: Arc<dyn FieldModelRuntime>,
    id: String,
}

impl FieldHandle {
    pub fn new(model: Arc<dyn FieldModelRuntime>, id: impl Into<String>) -> Self {
        Self {
            model,
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> Option<FieldDescriptor> {
        self.model.field_state(&self.id)
    }

    pub fn set_value(&self, value: Value) -> Result<(), ModelError> {
        self.model.set_value(&self.id, value)
    }

    pub fn set_property(&self, property: Property, value: Value) -> Result<(), ModelError> {
        self.model.set_property(&self.id, &property, value)
    }

    pub fn dispatch(&self, action: Action) -> Result<(), ModelError> {
        self.model.dispatch(&self.id, action)
    }

    pub fn model(&self) -> &Arc<dyn FieldModelRuntime> {
        &self.model
    }
}

impl fmt::Debug for FieldHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldHandle").field("id", &self.id).finish()
    }
}
