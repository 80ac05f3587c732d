//! Field renderers: one DOM fragment per field kind.

use crate::constraints::set_constraints;
use crate::context::FormContext;
use crate::dom::{el, Document, Element, EventKind};
use crate::schema::{is_truthy, value_to_string, FieldDescriptor, FieldType, Label};
use crate::util::{strip_tags, to_class_name};
use crate::validation::EMAIL_PATTERN;
use log::debug;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Render types that switch between an edit and a display value.
const DUAL_VALUE_TYPES: &[&str] = &["number", "date", "text", "email"];

/// A rendered field plus the option list it still has to load, if any.
pub struct RenderedField {
    pub element: Element,
    pub remote_options: Option<(Element, String)>,
}

pub fn create_label(doc: &Document, fd: &FieldDescriptor, tag: &str) -> Option<Element> {
    let label = fd.label.as_ref().filter(|l| !l.value.is_empty())?;
    let element = el(doc, tag)
        .attr("for", &fd.id)
        .class("field-label")
        .build();
    if label.rich_text == Some(true) {
        element.set_inner_html(&strip_tags(&label.value, None));
    } else {
        element.set_text(&label.value);
    }
    if label.visible == Some(false) {
        element.set_data("visible", "false");
    }
    if let Some(tooltip) = &fd.tooltip {
        element.set_attr("title", &strip_tags(tooltip, Some("")));
    }
    Some(element)
}

/// Wrapper carrying `data-id`, the type/name class hooks and the label.
pub fn create_field_wrapper(doc: &Document, fd: &FieldDescriptor, tag: &str, label_tag: &str) -> Element {
    let wrapper = doc.create_element(tag);
    let render_type = fd.kind().render_type();
    match fd.name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => wrapper.set_attr(
            "class",
            &format!("{}-wrapper field-{}", render_type, to_class_name(name)),
        ),
        None => wrapper.set_attr("class", &format!("{}-wrapper", render_type)),
    }
    if let Some(fieldset) = fd.extra.get("Fieldset").filter(|v| is_truthy(v)) {
        wrapper.set_data("fieldset", value_to_string(fieldset));
    }
    wrapper.set_data("id", &fd.id);
    if fd.visible == Some(false) {
        wrapper.set_data("visible", "false");
    }
    if fd.kind() == FieldType::NumberInput {
        if let Some(data_type) = &fd.data_type {
            wrapper.set_data("type", data_type);
        }
    }
    wrapper.add_class("field-wrapper");
    if let Some(label) = create_label(doc, fd, label_tag) {
        wrapper.append(&label);
    }
    wrapper
}

pub fn create_help_text(doc: &Document, id: &str, description: &str) -> Element {
    let help = el(doc, "div")
        .class("field-description")
        .attr("aria-live", "polite")
        .attr("id", &format!("{id}-description"))
        .build();
    help.set_inner_html(description);
    help
}

pub fn create_button(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    if let Some(button_type) = &fd.button_type {
        wrapper.add_class(&format!("{button_type}-wrapper"));
    }
    let label_hidden = fd.label.as_ref().and_then(|l| l.visible) == Some(false);
    let text = fd.label.as_ref().map(|l| l.value.as_str()).unwrap_or_default();
    let button = el(doc, "button")
        .attr("type", fd.button_type.as_deref().unwrap_or("button"))
        .class("button")
        .attr("id", &fd.id)
        .attr("name", fd.name_or_empty())
        .build();
    button.set_text(if label_hidden { "" } else { text });
    if label_hidden {
        button.set_attr("aria-label", text);
    }
    if fd.enabled == Some(false) {
        button.set_disabled(true);
    }
    wrapper.replace_children(&[button]);
    wrapper
}

fn set_placeholder(element: &Element, fd: &FieldDescriptor) {
    if let Some(placeholder) = fd.placeholder.as_deref().filter(|p| !p.is_empty()) {
        element.set_attr("placeholder", placeholder);
    }
}

pub fn create_input(doc: &Document, fd: &FieldDescriptor) -> Element {
    let input = doc.create_element("input");
    input.set_attr("type", &fd.kind().render_type());
    if fd.kind() == FieldType::NumberInput && fd.data_type.as_deref() == Some("number") {
        input.set_attr("step", "any");
    }
    set_placeholder(&input, fd);
    set_constraints(&input, fd);
    input
}

/// Single checkbox or radio: value is `enum[0]`, `enum[1]` is the unchecked value.
pub fn create_radio_or_checkbox(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    let input = create_input(doc, fd);
    let options = fd.enum_values.as_deref().unwrap_or_default();
    if let Some(value) = options.first() {
        input.set_value(&value_to_string(value));
    }
    if let Some(unchecked) = options.get(1) {
        input.set_data("uncheckedValue", value_to_string(unchecked));
    }
    if fd.kind() == FieldType::Checkbox
        && fd.property("variant").and_then(Value::as_str) == Some("switch")
    {
        wrapper.add_class("switch");
        if let Some(alignment) = fd.property("alignment").and_then(Value::as_str) {
            wrapper.add_class(alignment);
        }
    }
    wrapper.prepend(&input);
    wrapper
}

fn option_label(label: &Value) -> String {
    match label {
        Value::Object(map) => map.get("value").map(value_to_string).unwrap_or_default(),
        other => value_to_string(other),
    }
}

fn value_matches(current: Option<&Value>, candidate: &str) -> bool {
    match current {
        Some(Value::Array(values)) => values.iter().any(|v| value_to_string(v) == candidate),
        Some(value) if !value.is_null() => value_to_string(value) == candidate,
        _ => false,
    }
}

/// Expands `enum`/`enumNames` into one input per option inside `wrapper`.
///
/// Option inputs share the name `{id}_{name}` so groups stay distinct from
/// same-named fields elsewhere.
pub fn create_radio_or_checkbox_using_enum(ctx: &FormContext, fd: &FieldDescriptor, wrapper: &Element) {
    let doc = ctx.document();
    let legend = wrapper.query(|e| e.is("legend"));
    wrapper.clear();
    if let Some(legend) = &legend {
        wrapper.append(legend);
    }
    let option_type = if fd.kind() == FieldType::CheckboxGroup {
        FieldType::Checkbox
    } else {
        FieldType::Radio
    };
    let values = fd.enum_values.clone().unwrap_or_default();
    let names = fd
        .enum_names
        .clone()
        .filter(|names| names.len() == values.len())
        .unwrap_or_else(|| values.clone());
    let group_name = format!("{}_{}", fd.id, fd.name_or_empty());
    let layout = fd
        .property("afs:layout")
        .and_then(|l| l.get("orientation"))
        .and_then(Value::as_str);

    if fd.property("variant").and_then(Value::as_str) == Some("cards") {
        wrapper.add_class("cards");
    } else {
        wrapper.remove_class("cards");
    }
    match layout {
        Some("horizontal") => wrapper.add_class("horizontal"),
        Some("vertical") => wrapper.remove_class("horizontal"),
        _ => {}
    }

    for (index, value) in values.iter().enumerate() {
        let label = names
            .get(index)
            .map(option_label)
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| value_to_string(value));
        let option_id = ctx.ids().next(fd.name_or_empty());
        let option = FieldDescriptor {
            id: option_id.clone(),
            name: fd.name.clone(),
            field_type: Some(option_type.clone()),
            label: Some(Label::new(label)),
            enum_values: Some(vec![value.clone()]),
            required: fd.required,
            ..Default::default()
        };
        let field = create_radio_or_checkbox(doc, &option);
        field.remove_class("field-wrapper");
        field.remove_class(&format!("field-{}", to_class_name(fd.name_or_empty())));
        if let Some(input) = field.query(|e| e.is("input")) {
            input.set_id(&option_id);
            input.set_data("fieldType", fd.kind().as_str());
            input.set_attr("name", &group_name);
            input.set_checked(value_matches(fd.value.as_ref(), &value_to_string(value)));
            let carries_required = (index == 0 && option_type == FieldType::Radio)
                || option_type == FieldType::Checkbox;
            if carries_required && fd.is_required() {
                input.set_attr("required", "required");
            }
            if fd.enabled == Some(false) || fd.read_only == Some(true) {
                input.set_attr("disabled", "disabled");
            }
        }
        wrapper.append(&field);
    }
}

fn append_option(doc: &Document, select: &Element, fd: &FieldDescriptor, label: &Value, value: &Value) -> bool {
    let text = option_label(label).trim().to_string();
    let raw_value = value_to_string(value).trim().to_string();
    let option_value = if raw_value.is_empty() { text.clone() } else { raw_value };
    let option = el(doc, "option").attr("value", &option_value).text(&text).build();
    let selected = value_matches(fd.value.as_ref(), &option_value);
    if selected {
        option.set_attr("selected", "");
    }
    select.append(&option);
    selected
}

/// Fills a `<select>` from `enum`/`enumNames`. A single `https://` entry on an
/// allowed host is returned instead, to be loaded with [`apply_remote_options`].
pub fn create_dropdown_using_enum(ctx: &FormContext, fd: &FieldDescriptor, select: &Element) -> Option<String> {
    let doc = ctx.document();
    select.clear();
    select.toggle_attr("required", fd.is_required());
    select.set_attr(
        "title",
        &fd.tooltip.as_deref().map(|t| strip_tags(t, Some(""))).unwrap_or_default(),
    );
    select.toggle_attr("readonly", fd.read_only == Some(true));
    let multiple = matches!(
        fd.data_type.as_deref(),
        Some("string[]") | Some("boolean[]") | Some("number[]")
    );
    select.toggle_attr("multiple", multiple);

    let placeholder = fd.placeholder.as_deref().filter(|p| !p.is_empty()).map(|p| {
        let option = el(doc, "option").text(p).attr("value", "").build();
        option.set_attr("disabled", "");
        select.append(&option);
        option
    });

    let options = fd.enum_values.clone().unwrap_or_default();
    let names = fd.enum_names.clone().unwrap_or_else(|| options.clone());
    let mut remote = None;
    let mut any_selected = false;

    let single_url = match options.as_slice() {
        [Value::String(url)] if url.starts_with("https://") => Some(url.clone()),
        _ => None,
    };
    if let Some(url) = single_url {
        match Url::parse(&url) {
            Ok(parsed) if parsed.host_str().map(|h| ctx.config().allows_option_host(h)).unwrap_or(false) => {
                remote = Some(url);
            }
            _ => debug!("Ignoring option source {} for '{}'", url, fd.id),
        }
    } else if options.len() != names.len() {
        for value in &options {
            any_selected |= append_option(doc, select, fd, value, value);
        }
    } else {
        for (value, label) in options.iter().zip(names.iter()) {
            any_selected |= append_option(doc, select, fd, label, value);
        }
    }

    if let Some(placeholder) = placeholder {
        if !any_selected {
            placeholder.set_attr("selected", "");
        }
    }
    remote
}

/// Appends options fetched from an option sheet (`{data: [{Option, Value}]}`).
pub fn apply_remote_options(doc: &Document, select: &Element, fd: &FieldDescriptor, sheet: &Value) -> usize {
    let rows = sheet.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
    for row in &rows {
        let label = row.get("Option").cloned().unwrap_or(Value::Null);
        let value = row.get("Value").cloned().unwrap_or(Value::Null);
        append_option(doc, select, fd, &label, &value);
    }
    rows.len()
}

fn create_text_area(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    let input = doc.create_element("textarea");
    set_placeholder(&input, fd);
    wrapper.append(&input);
    wrapper
}

fn create_select(ctx: &FormContext, fd: &FieldDescriptor) -> RenderedField {
    let doc = ctx.document();
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    let select = doc.create_element("select");
    let remote = create_dropdown_using_enum(ctx, fd, &select);
    wrapper.append(&select);
    RenderedField {
        element: wrapper,
        remote_options: remote.map(|url| (select, url)),
    }
}

fn create_heading(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    let text = fd
        .value
        .as_ref()
        .filter(|v| is_truthy(v))
        .map(value_to_string)
        .or_else(|| fd.label_text().map(str::to_string))
        .unwrap_or_default();
    let heading = el(doc, "h2").text(&text).attr("id", &fd.id).build();
    wrapper.append(&heading);
    wrapper
}

fn create_repeatable_panel(wrapper: &Element, fd: &FieldDescriptor) {
    set_constraints(wrapper, fd);
    wrapper.set_data("repeatable", "true");
    wrapper.set_data("index", fd.index.unwrap_or(0));
    for (key, value) in &fd.properties {
        if key.starts_with("fd:") {
            continue;
        }
        match value {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                wrapper.set_data(key, value_to_string(value));
            }
            _ => {}
        }
    }
}

pub fn create_field_set(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "fieldset", "legend");
    wrapper.set_id(&fd.id);
    wrapper.set_attr("name", fd.name_or_empty());
    if fd.kind() == FieldType::Panel {
        wrapper.add_class("panel-wrapper");
    }
    if fd.is_repeatable() {
        create_repeatable_panel(&wrapper, fd);
    }
    wrapper
}

fn set_constraint_messages(element: &Element, fd: &FieldDescriptor) {
    for (key, message) in &fd.constraint_messages {
        element.set_data(&format!("{key}ErrorMessage"), value_to_string(message));
    }
}

fn create_radio_or_checkbox_group(ctx: &FormContext, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_set(ctx.document(), fd);
    create_radio_or_checkbox_using_enum(ctx, fd, &wrapper);
    wrapper.set_data("required", fd.is_required());
    if let Some(tooltip) = &fd.tooltip {
        wrapper.set_attr("title", &strip_tags(tooltip, Some("")));
    }
    set_constraint_messages(&wrapper, fd);
    wrapper
}

fn create_plain_text(doc: &Document, fd: &FieldDescriptor) -> Element {
    let paragraph = doc.create_element("p");
    let text = fd.value.as_ref().map(value_to_string).unwrap_or_default();
    if fd.rich_text == Some(true) {
        paragraph.set_inner_html(&strip_tags(&text, None));
    } else {
        paragraph.set_text(&text);
    }
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    wrapper.set_id(&fd.id);
    wrapper.replace_children(&[paragraph]);
    wrapper
}

/// `<picture><img></picture>` for an image path.
pub fn create_picture(doc: &Document, src: &str, alt: &str) -> Element {
    let picture = doc.create_element("picture");
    let img = el(doc, "img")
        .attr("src", src)
        .attr("alt", alt)
        .attr("loading", "lazy")
        .build();
    picture.append(&img);
    picture
}

fn create_image(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    wrapper.set_id(&fd.id);
    let path = fd
        .value
        .as_ref()
        .filter(|v| is_truthy(v))
        .map(value_to_string)
        .or_else(|| fd.property("fd:repoPath").map(value_to_string))
        .unwrap_or_default();
    let alt = fd.alt_text.clone().unwrap_or_else(|| fd.name_or_empty().to_string());
    wrapper.append(&create_picture(doc, &path, &alt));
    wrapper
}

/// Placeholder shown where the captcha widget will be mounted.
pub fn create_captcha_placeholder(doc: &Document, fd: &FieldDescriptor) -> Element {
    let wrapper = create_field_wrapper(doc, fd, "div", "label");
    wrapper.set_text("CAPTCHA");
    wrapper
}

fn swap_to_edit(input: &Element, edit_type: &str) {
    input.set_attr("type", edit_type);
    input.set_value(&input.attr("edit-value").unwrap_or_default());
}

fn swap_to_display(input: &Element) {
    input.set_attr("type", "text");
    input.set_value(&input.attr("display-value").unwrap_or_default());
}

fn install_dual_value(input: &Element, fd: &FieldDescriptor, edit_type: String) {
    input.set_attr(
        "edit-value",
        &fd.value.as_ref().map(value_to_string).unwrap_or_default(),
    );
    let display = fd.display_value.as_ref().map(value_to_string).unwrap_or_default();
    input.set_attr("display-value", &display);
    input.set_attr("type", "text");
    input.set_value(&display);

    let touched = Arc::new(AtomicBool::new(false));
    let edit_type = Arc::new(edit_type);

    {
        let weak = input.downgrade();
        let touched = touched.clone();
        let edit_type = edit_type.clone();
        input.add_listener(EventKind::TouchStart, move |_| {
            let Some(input) = weak.upgrade() else { return };
            touched.store(true, Ordering::SeqCst);
            input.set_attr("type", &edit_type);
            if let Some(edit) = input.attr("edit-value").filter(|v| !v.is_empty()) {
                input.set_value(&edit);
            }
        });
    }
    {
        let weak = input.downgrade();
        input.add_listener(EventKind::Focus, move |_| {
            let Some(input) = weak.upgrade() else { return };
            swap_to_edit(&input, &edit_type);
            touched.store(false, Ordering::SeqCst);
        });
    }
    let weak = input.downgrade();
    input.add_listener(EventKind::Blur, move |_| {
        if let Some(input) = weak.upgrade() {
            swap_to_display(&input);
        }
    });
}

/// Applies the descriptor's state to the first control inside `element`.
pub fn input_decorator(fd: &FieldDescriptor, element: &Element) {
    let Some(input) = element.query(|e| e.is("input") || e.is("textarea") || e.is("select")) else {
        return;
    };
    input.set_id(&fd.id);
    input.set_attr("name", fd.name_or_empty());
    if let Some(tooltip) = &fd.tooltip {
        input.set_attr("title", &strip_tags(tooltip, Some("")));
    }
    input.toggle_attr("readonly", fd.read_only == Some(true));
    input.set_attr("autocomplete", fd.auto_complete.as_deref().unwrap_or("off"));
    input.set_disabled(fd.enabled == Some(false));
    if fd.kind() == FieldType::DropDown && fd.read_only == Some(true) {
        input.set_disabled(true);
    }

    let render_type = fd.kind().render_type();
    let formatted = fd.display_format.is_some() || fd.display_value_expression.is_some();
    let input_type = input.input_type();
    if DUAL_VALUE_TYPES.contains(&render_type.as_str()) && formatted {
        install_dual_value(&input, fd, render_type);
    } else if input_type != "file" {
        input.set_value(&fd.value.as_ref().map(value_to_string).unwrap_or_default());
        if input_type == "radio" || input_type == "checkbox" {
            let own = fd
                .enum_values
                .as_ref()
                .and_then(|e| e.first())
                .map(value_to_string)
                .unwrap_or_else(|| "on".to_string());
            input.set_value(&own);
            input.set_checked(value_matches(fd.value.as_ref(), &own));
        }
    } else {
        input.toggle_attr("multiple", fd.data_type.as_deref() == Some("file[]"));
    }

    if fd.is_required() {
        input.set_attr("required", "required");
    }
    if fd.description.is_some() {
        input.set_attr("aria-describedby", &format!("{}-description", fd.id));
    }
    if let Some(v) = fd.min_items.as_ref().filter(|v| is_truthy(v)) {
        input.set_data("minItems", value_to_string(v));
    }
    if let Some(v) = fd.max_items.as_ref().filter(|v| is_truthy(v)) {
        input.set_data("maxItems", value_to_string(v));
    }
    if let Some(v) = fd.max_file_size.as_ref().filter(|v| is_truthy(v)) {
        input.set_data("maxFileSize", value_to_string(v));
    }
    if let Some(default) = &fd.default {
        input.set_attr("value", &value_to_string(default));
    }
    if input.input_type() == "email" {
        input.set_attr("pattern", EMAIL_PATTERN);
    }
    set_constraint_messages(element, fd);
    element.set_data("required", fd.is_required());
}

/// Renders the element for one descriptor (without recursing into panels).
pub fn render_field(ctx: &FormContext, fd: &FieldDescriptor) -> RenderedField {
    let doc = ctx.document();
    let mut remote_options = None;
    let element = match fd.kind() {
        FieldType::DropDown => {
            let rendered = create_select(ctx, fd);
            remote_options = rendered.remote_options;
            rendered.element
        }
        FieldType::PlainText => create_plain_text(doc, fd),
        FieldType::Checkbox | FieldType::Radio => create_radio_or_checkbox(doc, fd),
        FieldType::Button => create_button(doc, fd),
        FieldType::Multiline => create_text_area(doc, fd),
        FieldType::Panel | FieldType::Form => create_field_set(doc, fd),
        FieldType::RadioGroup | FieldType::CheckboxGroup => create_radio_or_checkbox_group(ctx, fd),
        FieldType::Image => create_image(doc, fd),
        FieldType::Heading => create_heading(doc, fd),
        FieldType::Captcha => create_captcha_placeholder(doc, fd),
        FieldType::TextInput
        | FieldType::NumberInput
        | FieldType::DateInput
        | FieldType::Email
        | FieldType::Telephone
        | FieldType::FileInput
        | FieldType::Custom(_) => {
            let wrapper = create_field_wrapper(doc, fd, "div", "label");
            wrapper.append(&create_input(doc, fd));
            wrapper
        }
    };
    if let Some(description) = fd.description.as_deref().filter(|d| !d.is_empty()) {
        element.append(&create_help_text(doc, &fd.id, description));
        element.set_data("description", description);
    }
    if !fd.kind().is_group() && fd.kind() != FieldType::Captcha {
        input_decorator(fd, &element);
    }
    RenderedField {
        element,
        remote_options,
    }
}

/// Adds `col-{n}` for `Column Span` / `properties.colspan`.
pub fn col_span_decorator(fd: &FieldDescriptor, element: &Element) {
    let span = fd
        .extra
        .get("Column Span")
        .or_else(|| fd.property("colspan"))
        .filter(|v| is_truthy(v));
    if let Some(span) = span {
        element.add_class(&format!("col-{}", value_to_string(span)));
    }
}

/// Gives a rendered panel its legend if it lacks one.
pub fn decorate_panel_container(doc: &Document, panel: &FieldDescriptor, container: &Element) {
    if !container.has_class("panel-wrapper") || panel.label_text().is_none() {
        return;
    }
    let container_id = container.data("id").unwrap_or_default();
    let has_legend = container
        .query(|e| e.is("legend") && e.attr("for").as_deref() == Some(container_id.as_str()))
        .is_some();
    if !has_legend {
        if let Some(legend) = create_label(doc, panel, "legend") {
            container.prepend(&legend);
        }
    }
}
