//! Model change → DOM mutation.
//!
//! [`plan_mutation`] is a pure mapping from one property change to the DOM
//! effect it calls for; [`apply_mutation`] performs that effect on a rendered
//! field.

use log::debug;
use ox_forms::context::FormContext;
use ox_forms::dom::Element;
use ox_forms::fields::{
    create_dropdown_using_enum, create_help_text, create_label, create_picture,
    create_radio_or_checkbox_using_enum,
};
use ox_forms::model::{Change, Property};
use ox_forms::schema::{value_to_string, FieldDescriptor, FieldType, Label};
use ox_forms::validation::update_or_create_invalid_msg;
use serde_json::Value;

/// Render types that keep separate edit and display values.
const DUAL_VALUE_TYPES: &[&str] = &["number", "date", "text", "email"];

#[derive(Clone, Debug, PartialEq)]
pub enum DomMutation {
    SetRequired(bool),
    ShowValidationMessage(String),
    SetValue(Value),
    SetVisible(bool),
    SetEnabled(bool),
    SetReadOnly(bool),
    SetLabel(Label),
    SetDescription(String),
    /// Drop the repeat instance with this id.
    RemoveInstance(String),
    /// Render a new repeat instance into the field's repeat wrapper.
    RenderInstance(Box<FieldDescriptor>),
    ActivateChild(String),
    ClearInvalid,
    RebuildOptions,
}

fn label_of(value: &Value) -> Option<Label> {
    match value {
        Value::String(text) => Some(Label::new(text.clone())),
        Value::Object(_) => serde_json::from_value(value.clone()).ok(),
        _ => None,
    }
}

fn active_id(field: &FieldDescriptor, current: &Value) -> Option<String> {
    current
        .get("id")
        .and_then(Value::as_str)
        .or_else(|| current.as_str())
        .map(str::to_string)
        .or_else(|| field.active_child.clone())
}

/// The DOM effect `change` calls for on `field`, if any.
pub fn plan_mutation(field: &FieldDescriptor, change: &Change) -> Option<DomMutation> {
    let current = &change.current_value;
    let mutation = match &change.property_name {
        Property::Required => DomMutation::SetRequired(current.as_bool() == Some(true)),
        Property::ValidationMessage => {
            let custom = field
                .validity
                .as_ref()
                .is_some_and(|v| v.expression_mismatch || v.custom_constraint);
            if !custom {
                return None;
            }
            DomMutation::ShowValidationMessage(value_to_string(current))
        }
        Property::Value => DomMutation::SetValue(current.clone()),
        Property::Visible => DomMutation::SetVisible(current.as_bool() != Some(false)),
        Property::Enabled => DomMutation::SetEnabled(current.as_bool() != Some(false)),
        Property::ReadOnly => DomMutation::SetReadOnly(current.as_bool() == Some(true)),
        Property::Label => DomMutation::SetLabel(label_of(current)?),
        Property::Description => DomMutation::SetDescription(value_to_string(current)),
        Property::Items => {
            if current.is_null() {
                let id = change.prev_value.get("id").and_then(Value::as_str)?;
                DomMutation::RemoveInstance(id.to_string())
            } else {
                let instance = serde_json::from_value::<FieldDescriptor>(current.clone()).ok()?;
                DomMutation::RenderInstance(Box::new(instance))
            }
        }
        Property::ActiveChild => DomMutation::ActivateChild(active_id(field, current)?),
        Property::Valid => {
            if current.as_bool() != Some(true) {
                return None;
            }
            DomMutation::ClearInvalid
        }
        Property::Enum | Property::EnumNames => DomMutation::RebuildOptions,
        Property::Other(_) => return None,
    };
    Some(mutation)
}

fn matches_option(value: &Value, candidate: &str) -> bool {
    match value {
        Value::Array(values) => values.iter().any(|v| value_to_string(v) == candidate),
        Value::Null => false,
        other => value_to_string(other) == candidate,
    }
}

fn disable_element(element: &Element, disabled: bool) {
    element.toggle_attr("disabled", disabled);
    element.toggle_attr("aria-readonly", disabled);
}

fn group_inputs(field_el: &Element, field: &FieldDescriptor) -> Vec<Element> {
    let group = format!("{}_{}", field.id, field.name_or_empty());
    field_el.query_all(|e| e.is("input") && e.name() == group)
}

fn is_rating(field: &FieldDescriptor) -> bool {
    field.component_type.as_deref() == Some("rating")
}

fn toggle_rating(wrapper: Option<&Element>, disabled: bool) {
    if let Some(rating) = wrapper.and_then(|w| w.query(|e| e.has_class("rating"))) {
        rating.toggle_class("disabled", Some(disabled));
    }
}

/// Marks `id` as the active field: clears the previous marker, flags the
/// wrapper, focuses the control and scrolls to it unless focus was already
/// inside it.
pub fn handle_active_child(form: &Element, id: &str) {
    for active in form.query_all(|e| e.data("active").as_deref() == Some("true")) {
        active.remove_data("active");
    }
    let Some(target) = form.by_id(id) else {
        return;
    };
    if let Some(wrapper) = target.closest(|e| e.has_class("field-wrapper")) {
        wrapper.set_data("active", true);
    }
    let focused_within = target
        .document()
        .active_element()
        .is_some_and(|active| active == target || target.contains(&active));
    target.focus();
    if !focused_within {
        target.scroll_into_view();
    }
}

fn apply_value(ctx: &FormContext, field_el: &Element, field: &FieldDescriptor, value: &Value) {
    let text = value_to_string(value);
    let kind = field.kind();
    let formatted = field.display_format.is_some() || field.display_value_expression.is_some();
    if field_el.is("input") && formatted && DUAL_VALUE_TYPES.contains(&field_el.input_type().as_str()) {
        let display = field.display_value.as_ref().map(value_to_string).unwrap_or_default();
        field_el.set_attr("edit-value", &text);
        field_el.set_attr("display-value", &display);
        if !field_el.is_focused() {
            field_el.set_value(&display);
        }
    } else if kind.is_group() {
        for input in group_inputs(field_el, field) {
            input.set_checked(matches_option(value, &input.value()));
        }
    } else if kind == FieldType::Checkbox {
        field_el.set_checked(matches_option(value, &field_el.value()));
    } else if kind == FieldType::PlainText {
        field_el.set_inner_html(&text);
    } else if kind == FieldType::Image {
        let alt = field_el
            .query(|e| e.is("img"))
            .and_then(|img| img.attr("alt"))
            .unwrap_or_default();
        if let Some(picture) = field_el.query(|e| e.is("picture")) {
            picture.replace_with(&create_picture(ctx.document(), &text, &alt));
        }
    } else if field_el.input_type() != "file" {
        field_el.set_value(&text);
    }
}

fn apply_label(ctx: &FormContext, field_el: &Element, wrapper: &Element, field: &FieldDescriptor, label: &Label) {
    if let Some(label_el) = wrapper.query(|e| e.has_class("field-label")) {
        label_el.set_text(&label.value);
        if let Some(visible) = label.visible {
            label_el.set_data("visible", visible);
        }
    } else if field.kind() == FieldType::Button {
        field_el.set_text(&label.value);
    } else if !label.value.is_empty() {
        let labelled = FieldDescriptor {
            id: field.id.clone(),
            label: Some(label.clone()),
            ..Default::default()
        };
        if let Some(label_el) = create_label(ctx.document(), &labelled, "label") {
            wrapper.prepend(&label_el);
        }
    }
}

/// Applies `mutation` to `field_el`, the element rendered for `field`.
///
/// Instance rendering is asynchronous and tracked by the bridge, so
/// [`DomMutation::RenderInstance`] is a no-op here.
pub fn apply_mutation(ctx: &FormContext, form: &Element, field_el: &Element, field: &FieldDescriptor, mutation: &DomMutation) {
    let wrapper = field_el.closest(|e| e.has_class("field-wrapper"));
    match mutation {
        DomMutation::SetRequired(required) => {
            if let Some(wrapper) = &wrapper {
                wrapper.set_data("required", required);
            }
        }
        DomMutation::ShowValidationMessage(message) => {
            field_el.set_custom_validity(message);
            update_or_create_invalid_msg(field_el, message);
        }
        DomMutation::SetValue(value) => apply_value(ctx, field_el, field, value),
        DomMutation::SetVisible(visible) => {
            let Some(wrapper) = &wrapper else { return };
            wrapper.set_data("visible", visible);
            if field.kind() == FieldType::Panel && !visible {
                if let Some(dialog) = wrapper.query(|e| e.is("dialog")).filter(Element::is_open) {
                    dialog.close();
                }
            }
        }
        DomMutation::SetEnabled(enabled) => {
            let read_only = field.read_only == Some(true);
            let kind = field.kind();
            if kind.is_group() {
                if !read_only {
                    for input in group_inputs(field_el, field) {
                        disable_element(&input, !enabled);
                    }
                }
            } else if kind == FieldType::DropDown {
                if !read_only {
                    disable_element(field_el, !enabled);
                }
            } else if is_rating(field) {
                if !read_only {
                    toggle_rating(wrapper.as_ref(), !enabled);
                }
            } else {
                field_el.toggle_attr("disabled", !enabled);
            }
        }
        DomMutation::SetReadOnly(read_only) => {
            let kind = field.kind();
            if kind.is_group() {
                for input in group_inputs(field_el, field) {
                    disable_element(&input, *read_only);
                }
            } else if kind == FieldType::DropDown {
                disable_element(field_el, *read_only);
            } else if is_rating(field) {
                toggle_rating(wrapper.as_ref(), *read_only);
            } else {
                field_el.toggle_attr("disabled", *read_only);
            }
        }
        DomMutation::SetLabel(label) => {
            if let Some(wrapper) = &wrapper {
                apply_label(ctx, field_el, wrapper, field, label);
            }
        }
        DomMutation::SetDescription(description) => {
            let Some(wrapper) = &wrapper else { return };
            match wrapper.query(|e| e.has_class("field-description")) {
                Some(help) => help.set_inner_html(description),
                None if !description.is_empty() => {
                    wrapper.append(&create_help_text(ctx.document(), &field.id, description));
                }
                None => {}
            }
        }
        DomMutation::RemoveInstance(id) => {
            if let Some(instance) = field_el.by_id(id) {
                instance.release();
            }
        }
        DomMutation::RenderInstance(_) => {}
        DomMutation::ActivateChild(id) => handle_active_child(form, id),
        DomMutation::ClearInvalid => {
            update_or_create_invalid_msg(field_el, "");
            if !field_el.custom_validity().is_empty() {
                field_el.set_custom_validity("");
            }
        }
        DomMutation::RebuildOptions => match field.kind() {
            FieldType::RadioGroup | FieldType::CheckboxGroup => {
                create_radio_or_checkbox_using_enum(ctx, field, field_el);
            }
            FieldType::DropDown => {
                if let Some(url) = create_dropdown_using_enum(ctx, field, field_el) {
                    debug!("Options of '{}' now come from {}", field.id, url);
                }
            }
            _ => {}
        },
    }
}
