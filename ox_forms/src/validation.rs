//! Native-constraint validation over rendered controls.
//!
//! Validity is computed from the control's attributes, mapped onto the
//! configured message table and shown inline in the field's help text.

use crate::config::ErrorMessages;
use crate::dom::{Element, EventKind};
use crate::fields::create_help_text;
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// Pattern applied to `type=email` inputs.
pub const EMAIL_PATTERN: &str =
    r"([A-Za-z0-9][._]?)+[A-Za-z0-9]@[A-Za-z0-9]+(\.?[A-Za-z0-9]){2}\.([A-Za-z0-9]{2,4})?";

static EMAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^(?:{EMAIL_PATTERN})$")).expect("valid regex"));

/// Violation kinds in the order they are reported, with the message key and
/// the attribute substituted for `$0`.
const VIOLATIONS: &[(Violation, &str, &str)] = &[
    (Violation::PatternMismatch, "pattern", "type"),
    (Violation::RangeOverflow, "maximum", "max"),
    (Violation::RangeUnderflow, "minimum", "min"),
    (Violation::TooLong, "maxLength", "maxlength"),
    (Violation::TooShort, "minLength", "minlength"),
    (Violation::ValueMissing, "required", "required"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    PatternMismatch,
    RangeOverflow,
    RangeUnderflow,
    TooLong,
    TooShort,
    ValueMissing,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidityState {
    pub value_missing: bool,
    pub pattern_mismatch: bool,
    pub range_overflow: bool,
    pub range_underflow: bool,
    pub too_long: bool,
    pub too_short: bool,
    pub custom_error: bool,
}

impl ValidityState {
    pub fn valid(&self) -> bool {
        *self == ValidityState::default()
    }

    pub fn has(&self, violation: Violation) -> bool {
        match violation {
            Violation::PatternMismatch => self.pattern_mismatch,
            Violation::RangeOverflow => self.range_overflow,
            Violation::RangeUnderflow => self.range_underflow,
            Violation::TooLong => self.too_long,
            Violation::TooShort => self.too_short,
            Violation::ValueMissing => self.value_missing,
        }
    }
}

fn is_control(element: &Element) -> bool {
    element.is("input") || element.is("select") || element.is("textarea")
}

fn form_of(element: &Element) -> Element {
    element
        .closest(|e| e.is("form"))
        .unwrap_or_else(|| element.document().body())
}

fn compare(value: &str, bound: &str) -> Option<std::cmp::Ordering> {
    match (value.trim().parse::<f64>(), bound.trim().parse::<f64>()) {
        (Ok(v), Ok(b)) => v.partial_cmp(&b),
        _ if !bound.is_empty() => Some(value.cmp(bound)),
        _ => None,
    }
}

fn value_missing(control: &Element) -> bool {
    if !control.has_attr("required") || control.disabled() {
        return false;
    }
    match control.input_type().as_str() {
        "checkbox" => !control.checked(),
        "radio" => {
            let name = control.name();
            !form_of(control)
                .query_all(|e| e.is("input") && e.input_type() == "radio" && e.name() == name)
                .iter()
                .any(Element::checked)
        }
        _ => control.value().is_empty(),
    }
}

/// Computes the constraint validity of a form control.
pub fn validity_of(control: &Element) -> ValidityState {
    let mut state = ValidityState {
        value_missing: value_missing(control),
        custom_error: !control.custom_validity().is_empty(),
        ..Default::default()
    };
    let value = control.value();
    let checkable = matches!(control.input_type().as_str(), "checkbox" | "radio");
    if value.is_empty() || checkable || control.is("select") {
        return state;
    }
    if let Some(pattern) = control.attr("pattern") {
        match Regex::new(&format!("^(?:{pattern})$")) {
            Ok(re) => state.pattern_mismatch = !re.is_match(&value),
            Err(e) => debug!("Ignoring invalid pattern on '{}': {}", control.name(), e),
        }
    } else if control.input_type() == "email" {
        state.pattern_mismatch = !EMAIL.is_match(&value);
    }
    if let Some(max) = control.attr("max") {
        state.range_overflow = compare(&value, &max) == Some(std::cmp::Ordering::Greater);
    }
    if let Some(min) = control.attr("min") {
        state.range_underflow = compare(&value, &min) == Some(std::cmp::Ordering::Less);
    }
    let length = value.chars().count();
    if let Some(max) = control.attr("maxlength").and_then(|v| v.parse::<usize>().ok()) {
        state.too_long = length > max;
    }
    if let Some(min) = control.attr("minlength").and_then(|v| v.parse::<usize>().ok()) {
        state.too_short = length < min;
    }
    state
}

/// The element that shows a control's message: its wrapper, or for grouped
/// options the fieldset named by `data-fieldset`.
pub fn field_container(control: &Element) -> Option<Element> {
    let wrapper = control.closest(|e| e.has_class("field-wrapper"))?;
    let grouped = matches!(control.input_type().as_str(), "radio" | "checkbox");
    if let (true, Some(fieldset)) = (grouped, wrapper.data("fieldset")) {
        let named = form_of(control).query(|e| e.is("fieldset") && e.name() == fieldset);
        if named.is_some() {
            return named;
        }
    }
    Some(wrapper)
}

/// Shows `message` under the control, or clears it (restoring the stashed
/// description) when empty.
pub fn update_or_create_invalid_msg(control: &Element, message: &str) -> Option<Element> {
    let container = field_container(control)?;
    let existing = container
        .children()
        .into_iter()
        .find(|c| c.has_class("field-description"));
    let help = existing.unwrap_or_else(|| {
        let id = control.id_attr().unwrap_or_default();
        let help = create_help_text(control.document(), &id, "");
        container.append(&help);
        help
    });
    if !message.is_empty() {
        container.add_class("field-invalid");
        help.set_text(message);
        return Some(help);
    }
    container.remove_class("field-invalid");
    match container.data("description") {
        Some(description) => {
            help.set_inner_html(&description);
            Some(help)
        }
        None => {
            help.remove();
            None
        }
    }
}

fn sync_checkbox_group_required(control: &Element) {
    if control.data("fieldType").as_deref() != Some("checkbox-group") {
        return;
    }
    let Some(wrapper) = control.closest(|e| e.has_class("field-wrapper")) else {
        return;
    };
    if wrapper.data("required").as_deref() != Some("true") {
        return;
    }
    let boxes = wrapper.query_all(|e| e.is("input") && e.input_type() == "checkbox");
    let any_checked = boxes.iter().any(Element::checked);
    for checkbox in boxes {
        checkbox.toggle_attr("required", !any_checked);
    }
}

/// Message for the first violation, honouring per-field overrides
/// (`data-{key}-error-message` on the wrapper).
pub fn message_for(control: &Element, validity: &ValidityState, messages: &ErrorMessages) -> String {
    if validity.custom_error {
        return control.custom_validity();
    }
    let wrapper = control.closest(|e| e.has_class("field-wrapper"));
    for (violation, key, attribute) in VIOLATIONS {
        if !validity.has(*violation) {
            continue;
        }
        let custom = wrapper
            .as_ref()
            .and_then(|w| w.data(&format!("{key}ErrorMessage")));
        if let Some(custom) = custom {
            return custom;
        }
        let template = messages.get(key).unwrap_or_default();
        let substitution = control.attr(attribute).unwrap_or_default();
        return template.replacen("$0", &substitution, 1);
    }
    String::new()
}

/// Re-validates a control and updates its inline message; returns validity.
pub fn check_validation(control: &Element, messages: &ErrorMessages) -> bool {
    sync_checkbox_group_required(control);
    let validity = validity_of(control);
    if validity.valid() {
        update_or_create_invalid_msg(control, "");
        return true;
    }
    let message = message_for(control, &validity, messages);
    update_or_create_invalid_msg(control, &message);
    false
}

/// Wires `invalid` and `change` handling for every control in `form`.
pub fn enable_validation(form: &Element, messages: &ErrorMessages) {
    for control in form.query_all(is_control) {
        let messages = messages.clone();
        control.add_listener(EventKind::Invalid, move |event| {
            check_validation(&event.target, &messages);
        });
    }
    let messages = messages.clone();
    form.add_listener(EventKind::Change, move |event| {
        if is_control(&event.target) {
            check_validation(&event.target, &messages);
        }
    });
}

/// Validates every enabled control, firing `invalid` on failures; the first
/// failing control receives focus.
pub fn report_validity(form: &Element) -> bool {
    let invalid: Vec<Element> = form
        .query_all(|e| is_control(e) && !e.disabled())
        .into_iter()
        .filter(|c| !validity_of(c).valid())
        .collect();
    for control in &invalid {
        control.dispatch(EventKind::Invalid, serde_json::Value::Null);
    }
    if let Some(first) = invalid.first() {
        first.focus();
    }
    invalid.is_empty()
}

/// Checked values of the checkbox group named `name`.
pub fn get_checkbox_group_value(form: &Element, name: &str) -> Vec<String> {
    form.query_all(|e| e.is("input") && e.input_type() == "checkbox" && e.name() == name)
        .into_iter()
        .filter(Element::checked)
        .map(|e| e.value())
        .collect()
}
