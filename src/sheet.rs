//! Spreadsheet (document) sourced forms: `{":type": "sheet", "data": [rows]}`
//! where every row describes one field or fieldset.

use log::{debug, warn};
use ox_forms::error::FormError;
use ox_forms::schema::{FieldDescriptor, FieldType, FormDefinition, Label};
use ox_forms::util::IdGenerator;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    })
}

/// One row of the form sheet.
#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SheetRow {
    #[serde(rename = "Name", deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(rename = "Type", deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(rename = "Label", deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(rename = "Value", deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(rename = "Placeholder", deserialize_with = "lenient_string")]
    pub placeholder: String,
    #[serde(rename = "Mandatory", deserialize_with = "lenient_string")]
    pub mandatory: String,
    #[serde(rename = "Options", deserialize_with = "lenient_string")]
    pub options: String,
    #[serde(rename = "Fieldset", deserialize_with = "lenient_string")]
    pub fieldset: String,
    #[serde(rename = "Repeatable", deserialize_with = "lenient_string")]
    pub repeatable: String,
    #[serde(rename = "Min", deserialize_with = "lenient_string")]
    pub min: String,
    #[serde(rename = "Max", deserialize_with = "lenient_string")]
    pub max: String,
    #[serde(rename = "Description", deserialize_with = "lenient_string")]
    pub description: String,
}

fn flag(cell: &str) -> bool {
    matches!(cell.to_lowercase().as_str(), "true" | "x" | "yes" | "y" | "1")
}

fn options(cell: &str) -> Vec<Value> {
    if cell.starts_with("https://") {
        return vec![Value::String(cell.to_string())];
    }
    cell.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(|o| Value::String(o.to_string()))
        .collect()
}

fn number(cell: &str) -> Option<Value> {
    cell.parse::<i64>().ok().map(Value::from)
}

/// Field type for a sheet `Type` cell. Choice types become groups when the
/// row lists options.
pub fn field_type(kind: &str, has_options: bool) -> FieldType {
    match kind.to_lowercase().as_str() {
        "" | "text" => FieldType::TextInput,
        "number" => FieldType::NumberInput,
        "date" => FieldType::DateInput,
        "email" => FieldType::Email,
        "tel" | "phone" => FieldType::Telephone,
        "file" => FieldType::FileInput,
        "textarea" => FieldType::Multiline,
        "select" => FieldType::DropDown,
        "radio" if has_options => FieldType::RadioGroup,
        "radio" => FieldType::Radio,
        "checkbox" if has_options => FieldType::CheckboxGroup,
        "checkbox" => FieldType::Checkbox,
        "submit" | "reset" | "button" => FieldType::Button,
        "fieldset" => FieldType::Panel,
        "plaintext" | "plain-text" => FieldType::PlainText,
        other => FieldType::from(other.to_string()),
    }
}

/// True for payloads that carry sheet rows instead of a form definition.
pub fn is_document_based(definition: &Value) -> bool {
    definition.get(":type").and_then(Value::as_str) == Some("sheet")
        && definition.get("data").map(|d| !d.is_null()).unwrap_or(false)
}

fn descriptor(row: &SheetRow, ids: &IdGenerator) -> FieldDescriptor {
    let choices = options(&row.options);
    let kind = field_type(&row.kind, !choices.is_empty());
    let name = if row.name.is_empty() { row.kind.clone() } else { row.name.clone() };
    let mut fd = FieldDescriptor::new(ids.next(&name), kind.clone()).with_name(name.clone());

    let label = if row.label.is_empty() && kind == FieldType::Button {
        name
    } else {
        row.label.clone()
    };
    if !label.is_empty() {
        fd.label = Some(Label::new(label));
    }
    if !row.value.is_empty() {
        fd.value = Some(Value::String(row.value.clone()));
    }
    if !row.placeholder.is_empty() {
        fd.placeholder = Some(row.placeholder.clone());
    }
    if !row.description.is_empty() {
        fd.description = Some(row.description.clone());
    }
    if flag(&row.mandatory) {
        fd.required = Some(true);
    }
    if !choices.is_empty() {
        fd.enum_names = Some(choices.clone());
        fd.enum_values = Some(choices);
    }
    match row.kind.to_lowercase().as_str() {
        "submit" => fd.button_type = Some("submit".to_string()),
        "reset" => fd.button_type = Some("reset".to_string()),
        _ => {}
    }
    if kind == FieldType::Panel && flag(&row.repeatable) {
        fd.repeatable = Some(true);
        fd.min_occur = number(&row.min);
        fd.max_occur = number(&row.max);
        for (key, cell) in [("min", &row.min), ("max", &row.max)] {
            if let Some(n) = number(cell) {
                fd.properties.insert(key.to_string(), n);
            }
        }
    } else if kind == FieldType::NumberInput || kind == FieldType::DateInput {
        fd.minimum = number(&row.min).or_else(|| (!row.min.is_empty()).then(|| Value::String(row.min.clone())));
        fd.maximum = number(&row.max).or_else(|| (!row.max.is_empty()).then(|| Value::String(row.max.clone())));
    }
    fd
}

enum Slot {
    Field(FieldDescriptor),
    Fieldset(String),
}

/// Turns sheet rows into a form definition. Rows naming a `Fieldset` are
/// placed inside the fieldset row of that name; a fieldset that is never
/// declared leaves its rows at the top level.
pub fn transform(sheet: &Value, form_id: &str) -> Result<FormDefinition, FormError> {
    let rows: Vec<SheetRow> = serde_json::from_value(sheet.get("data").cloned().unwrap_or(Value::Null))
        .map_err(|e| FormError::MalformedDefinition(format!("sheet rows: {e}")))?;
    let ids = IdGenerator::new();

    let mut panels: HashMap<String, (FieldDescriptor, Vec<FieldDescriptor>)> = HashMap::new();
    for row in rows.iter().filter(|r| r.kind.eq_ignore_ascii_case("fieldset")) {
        if panels.contains_key(&row.name) {
            warn!("Fieldset '{}' is declared more than once; keeping the first", row.name);
            continue;
        }
        panels.insert(row.name.clone(), (descriptor(row, &ids), Vec::new()));
    }

    let mut slots = Vec::new();
    for row in &rows {
        if row.kind.eq_ignore_ascii_case("fieldset") {
            slots.push(Slot::Fieldset(row.name.clone()));
            continue;
        }
        let fd = descriptor(row, &ids);
        if row.fieldset.is_empty() {
            slots.push(Slot::Field(fd));
            continue;
        }
        match panels.get_mut(&row.fieldset) {
            Some((_, children)) => children.push(fd),
            None => {
                warn!("Field '{}' names unknown fieldset '{}'", row.name, row.fieldset);
                slots.push(Slot::Field(fd));
            }
        }
    }

    let items: Vec<FieldDescriptor> = slots
        .into_iter()
        .filter_map(|slot| match slot {
            Slot::Field(fd) => Some(fd),
            Slot::Fieldset(name) => panels
                .remove(&name)
                .map(|(panel, children)| panel.with_items(children)),
        })
        .collect();
    debug!("Sheet form '{}' has {} top-level fields", form_id, items.len());

    let mut definition = FormDefinition::new(FieldDescriptor::new(form_id, FieldType::Form).with_items(items));
    definition.action = sheet.get("action").and_then(Value::as_str).map(str::to_string);
    Ok(definition)
}
