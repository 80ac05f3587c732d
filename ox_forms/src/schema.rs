use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Closed set of field kinds a definition can carry.
///
/// Unknown kinds are kept as `Custom` so that a definition produced by a newer
/// authoring environment still decodes; they render as plain inputs.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, Default)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    TextInput,
    NumberInput,
    DateInput,
    Email,
    Telephone,
    FileInput,
    Multiline,
    DropDown,
    Checkbox,
    Radio,
    RadioGroup,
    CheckboxGroup,
    PlainText,
    Button,
    Panel,
    Image,
    Heading,
    Captcha,
    Form,
    Custom(String),
}

/// Which group of native constraint attributes applies to a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConstraintKind {
    Text,
    Numeric,
    File,
    Panel,
    Unconstrained,
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::TextInput => "text-input",
            FieldType::NumberInput => "number-input",
            FieldType::DateInput => "date-input",
            FieldType::Email => "email",
            FieldType::Telephone => "telephone-input",
            FieldType::FileInput => "file-input",
            FieldType::Multiline => "multiline-input",
            FieldType::DropDown => "drop-down",
            FieldType::Checkbox => "checkbox",
            FieldType::Radio => "radio",
            FieldType::RadioGroup => "radio-group",
            FieldType::CheckboxGroup => "checkbox-group",
            FieldType::PlainText => "plain-text",
            FieldType::Button => "button",
            FieldType::Panel => "panel",
            FieldType::Image => "image",
            FieldType::Heading => "heading",
            FieldType::Captcha => "captcha",
            FieldType::Form => "form",
            FieldType::Custom(other) => other,
        }
    }

    /// The HTML-facing type: used for wrapper class names and `<input type>`.
    pub fn render_type(&self) -> String {
        match self {
            FieldType::Telephone => "tel".to_string(),
            other => other.as_str().replace("-input", ""),
        }
    }

    pub fn constraint_kind(&self) -> ConstraintKind {
        match self {
            FieldType::TextInput | FieldType::Email | FieldType::Telephone => ConstraintKind::Text,
            FieldType::NumberInput | FieldType::DateInput => ConstraintKind::Numeric,
            FieldType::FileInput => ConstraintKind::File,
            FieldType::Panel => ConstraintKind::Panel,
            FieldType::Custom(_) => match self.render_type().as_str() {
                "password" | "text" | "tel" | "email" => ConstraintKind::Text,
                "number" | "range" | "date" => ConstraintKind::Numeric,
                "file" => ConstraintKind::File,
                _ => ConstraintKind::Unconstrained,
            },
            FieldType::Multiline
            | FieldType::DropDown
            | FieldType::Checkbox
            | FieldType::Radio
            | FieldType::RadioGroup
            | FieldType::CheckboxGroup
            | FieldType::PlainText
            | FieldType::Button
            | FieldType::Image
            | FieldType::Heading
            | FieldType::Captcha
            | FieldType::Form => ConstraintKind::Unconstrained,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, FieldType::RadioGroup | FieldType::CheckboxGroup)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, FieldType::Panel | FieldType::Form)
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "text-input" | "text" => FieldType::TextInput,
            "number-input" => FieldType::NumberInput,
            "date-input" => FieldType::DateInput,
            "email" | "email-input" => FieldType::Email,
            "telephone-input" | "tel" => FieldType::Telephone,
            "file-input" => FieldType::FileInput,
            "multiline-input" | "multiline" => FieldType::Multiline,
            "drop-down" => FieldType::DropDown,
            "checkbox" => FieldType::Checkbox,
            "radio" => FieldType::Radio,
            "radio-group" => FieldType::RadioGroup,
            "checkbox-group" => FieldType::CheckboxGroup,
            "plain-text" => FieldType::PlainText,
            "button" => FieldType::Button,
            "panel" => FieldType::Panel,
            "image" => FieldType::Image,
            "heading" => FieldType::Heading,
            "captcha" => FieldType::Captcha,
            "form" => FieldType::Form,
            _ => FieldType::Custom(value),
        }
    }
}

impl From<&str> for FieldType {
    fn from(value: &str) -> Self {
        FieldType::from(value.to_string())
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_text: Option<bool>,
}

impl Label {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Validity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default)]
    pub expression_mismatch: bool,
    #[serde(default)]
    pub custom_constraint: bool,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A child entry of a panel. Entries that do not describe a field are kept
/// verbatim so the rest of the panel can still render.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FieldItem {
    Field(Box<FieldDescriptor>),
    Malformed(Value),
}

impl FieldItem {
    pub fn as_field(&self) -> Option<&FieldDescriptor> {
        match self {
            FieldItem::Field(fd) => Some(fd),
            FieldItem::Malformed(_) => None,
        }
    }
}

impl From<FieldDescriptor> for FieldItem {
    fn from(value: FieldDescriptor) -> Self {
        FieldItem::Field(Box::new(value))
    }
}

/// One node of a form definition tree.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// Semantic data type (`string`, `number`, `file[]`, ...).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(rename = ":type", default, skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validity: Option<Validity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rich_text: Option<bool>,
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enum_names: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiple: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occur: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_occur: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_file_size: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_complete: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_css_class_names: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub constraint_messages: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeatable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_child: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<FieldItem>>,
    /// Authoring view: child map keyed by node name.
    #[serde(rename = ":items", default, skip_serializing_if = "Option::is_none")]
    pub authored_items: Option<Map<String, Value>>,
    /// Authoring view: author-controlled order of `:items`.
    #[serde(rename = ":itemsOrder", default, skip_serializing_if = "Option::is_none")]
    pub items_order: Option<Vec<String>>,
    /// Everything else the definition carries (`Column Span`, `Fieldset`, `uri`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FieldDescriptor {
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(Label::new(label));
        self
    }

    pub fn with_items(mut self, items: Vec<FieldDescriptor>) -> Self {
        self.items = Some(items.into_iter().map(FieldItem::from).collect());
        self
    }

    pub fn kind(&self) -> FieldType {
        self.field_type.clone().unwrap_or_default()
    }

    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn label_text(&self) -> Option<&str> {
        self.label
            .as_ref()
            .map(|l| l.value.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn is_repeatable(&self) -> bool {
        self.repeatable == Some(true)
            || self.property("repeatable").and_then(Value::as_bool) == Some(true)
    }

    pub fn is_required(&self) -> bool {
        self.required == Some(true)
    }

    /// Field children; malformed entries are skipped.
    pub fn children(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.items
            .iter()
            .flatten()
            .filter_map(FieldItem::as_field)
    }

    /// Minimum repeat count from `minOccur` or `properties.min`.
    pub fn min_occurrences(&self) -> usize {
        self.min_occur
            .as_ref()
            .or_else(|| self.property("min"))
            .and_then(value_as_i64)
            .map(|v| v.max(0) as usize)
            .unwrap_or(0)
    }

    /// Maximum repeat count; `None` means unbounded.
    pub fn max_occurrences(&self) -> Option<usize> {
        self.max_occur
            .as_ref()
            .or_else(|| self.property("max"))
            .and_then(value_as_i64)
            .filter(|v| *v >= 0)
            .map(|v| v as usize)
    }

    /// Reads a property by its model name through the serialized view.
    pub fn get_named(&self, key: &str) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|v| v.get(key).cloned())
            .unwrap_or(Value::Null)
    }

    /// Writes a property by its model name; `null` clears it.
    pub fn set_named(&mut self, key: &str, value: Value) -> Result<(), serde_json::Error> {
        let mut view = serde_json::to_value(&*self)?;
        if let Value::Object(map) = &mut view {
            if value.is_null() {
                map.remove(key);
            } else {
                map.insert(key.to_string(), value);
            }
        }
        *self = serde_json::from_value(view)?;
        Ok(())
    }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A whole form: the root panel plus its submission settings.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thank_you_msg: Option<String>,
    #[serde(flatten)]
    pub root: FieldDescriptor,
}

impl FormDefinition {
    pub fn new(root: FieldDescriptor) -> Self {
        Self {
            root,
            ..Default::default()
        }
    }

    pub fn from_value(value: Value) -> Result<Self, crate::FormError> {
        serde_json::from_value(value)
            .map_err(|e| crate::FormError::MalformedDefinition(e.to_string()))
    }
}

impl Deref for FormDefinition {
    type Target = FieldDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.root
    }
}

impl DerefMut for FormDefinition {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.root
    }
}

/// JavaScript-style truthiness, used wherever the authoring format treats
/// `0`, `""` and `false` as "not set".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// String form of a value as it would land in an attribute or input.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(value_to_string).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}
