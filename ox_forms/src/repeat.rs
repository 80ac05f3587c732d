//! Repeat manager: turns rendered repeatable panels into add/remove capable
//! repeat groups.
//!
//! Sheet-sourced forms clone and remove DOM instances directly. Model-backed
//! forms dispatch `AddInstance`/`RemoveInstance` to the field model and let the
//! rule engine bridge render the result; bookkeeping then runs on the next
//! animation frame.

use crate::context::FormContext;
use crate::dom::{el, Document, Element, EventKind, WeakElement};
use crate::model::{Action, FieldChangedPayload, FieldHandle, Property};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use std::sync::{Arc, Weak};

static INDEX_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\d+$").expect("valid regex"));

const DEFAULT_VARIANT: &str = "addDeleteButtons";
const NO_BUTTONS: &str = "noButtons";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatStrategy {
    /// Direct DOM cloning.
    Document,
    /// Field model actions; DOM follows the model's `items` changes.
    Model,
}

fn is_instance(element: &Element) -> bool {
    element.data("repeatable").as_deref() == Some("true")
}

/// Instances directly owned by a repeat wrapper, in order.
pub fn instances(wrapper: &Element) -> Vec<Element> {
    wrapper.children().into_iter().filter(is_instance).collect()
}

fn repeat_actions(wrapper: &Element) -> Option<Element> {
    wrapper
        .children()
        .into_iter()
        .find(|c| c.has_class("repeat-actions"))
}

/// `button.item-{icon}` with an icon slot and a text label.
pub fn create_button(doc: &Document, label: &str, icon: &str) -> Element {
    let button = el(doc, "button")
        .class(&format!("item-{icon}"))
        .attr("type", "button")
        .build();
    let text = el(doc, "span").text(label).build();
    button.append_all(&[doc.create_element("i"), text]);
    button
}

/// Recomputes the data attributes presentation keys off:
/// `data-add-instance`, `data-remove-instance` and `data-instance-count`.
pub fn update_repeat_state(wrapper: &Element) {
    let count = instances(wrapper).len() as i64;
    let min = wrapper
        .data("min")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(0);
    let max = wrapper
        .data("max")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v != 0)
        .unwrap_or(-1);
    wrapper.set_data("addInstance", max == -1 || count < max);
    wrapper.set_data("removeInstance", count > min);
    wrapper.set_data("instanceCount", count);
}

/// Scopes radio/checkbox names to an instance: `name` for the first,
/// `name-{index}` for the rest.
pub fn update_radio_checkbox_names(instance: &Element, index: usize) {
    if !is_instance(instance) {
        return;
    }
    let checkable =
        instance.query_all(|e| e.is("input") && matches!(e.input_type().as_str(), "radio" | "checkbox"));
    for input in checkable {
        let name = input.name();
        let base = INDEX_SUFFIX.replace(&name, "");
        let expected = if index > 0 {
            format!("{base}-{index}")
        } else {
            base.into_owned()
        };
        if name != expected {
            input.set_attr("name", &expected);
        }
    }
}

/// Relabels and re-identifies an instance for position `index`. Missing
/// legends or names are skipped.
pub fn update(ctx: &FormContext, fieldset: &Element, index: usize, label_template: Option<&str>) {
    let legend = fieldset
        .children()
        .into_iter()
        .find(|c| c.has_class("field-label"));
    if let (Some(legend), Some(template)) = (legend, label_template) {
        legend.set_text(&template.replacen('#', &(index + 1).to_string(), 1));
    }
    if fieldset.id_attr().is_none() && !fieldset.name().is_empty() {
        fieldset.set_id(&ctx.ids().next(&fieldset.name()));
    }
    fieldset.set_data("index", index);
    if index == 0 {
        return;
    }
    for wrapper in fieldset.query_all(|e| e.has_class("field-wrapper")) {
        let Some(input) = wrapper.query(|e| {
            e.is("input") || e.is("select") || e.is("button") || e.is("textarea")
        }) else {
            continue;
        };
        let name = input.name();
        if name.is_empty() {
            continue;
        }
        let id = ctx.ids().next(&name);
        input.set_id(&id);
        if let Some(label) = wrapper.query(|e| e.is("label")) {
            label.set_attr("for", &id);
        }
        if let Some(description) = wrapper.query(|e| e.has_class("field-description")) {
            input.set_attr("aria-describedby", &format!("{id}-description"));
            description.set_id(&format!("{id}-description"));
        }
    }
}

/// One repeat wrapper and the state needed to grow or shrink it.
pub struct RepeatGroup {
    wrapper: WeakElement,
    form: WeakElement,
    template: WeakElement,
    template_id: Option<String>,
    template_removed: bool,
    label_template: Option<String>,
    strategy: RepeatStrategy,
    manager_id: Option<String>,
    ctx: Weak<FormContext>,
}

impl RepeatGroup {
    pub fn strategy(&self) -> RepeatStrategy {
        self.strategy
    }

    pub fn wrapper(&self) -> Option<Element> {
        self.wrapper.upgrade()
    }

    fn min(wrapper: &Element) -> usize {
        wrapper
            .data("min")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0)
    }

    fn max(wrapper: &Element) -> Option<usize> {
        wrapper
            .data("max")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v > 0)
            .map(|v| v as usize)
    }

    fn manager(&self) -> Option<FieldHandle> {
        let ctx = self.ctx.upgrade()?;
        ctx.field(self.manager_id.as_deref()?)
    }

    /// Instance count as the model sees it, falling back to the DOM.
    fn model_count(&self, handle: &FieldHandle, wrapper: &Element) -> usize {
        handle
            .state()
            .map(|state| state.children().filter(|c| c.is_repeatable()).count())
            .unwrap_or_else(|| instances(wrapper).len())
    }

    pub fn add_instance(self: &Arc<Self>) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        let count = instances(&wrapper).len();
        if Self::max(&wrapper).is_some_and(|max| count >= max) {
            debug!("Repeat group is at its maximum of {} instances", count);
            return;
        }
        match self.strategy {
            RepeatStrategy::Model => {
                let Some(handle) = self.manager() else {
                    warn!("No field model bound to repeat group; add ignored");
                    return;
                };
                let index = self.model_count(&handle, &wrapper);
                if let Err(e) = handle.dispatch(Action::AddInstance(index)) {
                    warn!("addInstance on '{}' failed: {}", handle.id(), e);
                }
            }
            RepeatStrategy::Document => self.clone_instance(&wrapper, count),
        }
    }

    fn clone_instance(self: &Arc<Self>, wrapper: &Element, index: usize) {
        let (Some(ctx), Some(template)) = (self.ctx.upgrade(), self.template.upgrade()) else {
            return;
        };
        let fresh = template.clone_node(true);
        fresh.set_data("index", index);
        update(&ctx, &fresh, index, self.label_template.as_deref());
        update_radio_checkbox_names(&fresh, index);
        match repeat_actions(wrapper) {
            Some(actions) => actions.before(&fresh),
            None => wrapper.append(&fresh),
        }
        self.insert_remove_button(&fresh, wrapper);
        self.add_remove_buttons(wrapper);
        update_repeat_state(wrapper);
        if let Some(form) = self.form.upgrade() {
            form.dispatch(
                EventKind::ItemAdd,
                json!({ "item": { "name": fresh.name(), "id": fresh.id_attr() } }),
            );
        }
    }

    pub fn remove_instance(self: &Arc<Self>, fieldset: &Element) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        let current = instances(&wrapper);
        if current.len() <= Self::min(&wrapper) {
            debug!("Repeat group is at its minimum of {} instances", current.len());
            return;
        }
        let Some(position) = current.iter().position(|i| i == fieldset) else {
            return;
        };
        match self.strategy {
            RepeatStrategy::Model => {
                let Some(handle) = self.manager() else {
                    warn!("No field model bound to repeat group; remove ignored");
                    return;
                };
                if let Err(e) = handle.dispatch(Action::RemoveInstance(position)) {
                    warn!("removeInstance on '{}' failed: {}", handle.id(), e);
                }
            }
            RepeatStrategy::Document => {
                let Some(ctx) = self.ctx.upgrade() else {
                    return;
                };
                fieldset.release();
                let remaining = instances(&wrapper);
                for (index, instance) in remaining.iter().enumerate() {
                    update(&ctx, instance, index, self.label_template.as_deref());
                }
                for (index, instance) in remaining.iter().enumerate() {
                    update_radio_checkbox_names(instance, index);
                }
                update_repeat_state(&wrapper);
            }
        }
    }

    fn insert_remove_button(self: &Arc<Self>, fieldset: &Element, wrapper: &Element) {
        let label = wrapper
            .data("repeatDeleteButtonLabel")
            .or_else(|| fieldset.data("repeatDeleteButtonLabel"))
            .unwrap_or_else(|| "Delete".to_string());
        let button = create_button(fieldset.document(), &label, "remove");
        let group = Arc::clone(self);
        let target = fieldset.downgrade();
        button.add_listener(EventKind::Click, move |_| {
            if let Some(fieldset) = target.upgrade() {
                group.remove_instance(&fieldset);
            }
        });
        fieldset.append(&button);
    }

    fn add_remove_buttons(self: &Arc<Self>, wrapper: &Element) {
        for instance in instances(wrapper) {
            if instance.query(|e| e.has_class("item-remove")).is_none() {
                self.insert_remove_button(&instance, wrapper);
            }
        }
    }

    fn insert_add_button(self: &Arc<Self>, wrapper: &Element) {
        let label = wrapper
            .data("repeatAddButtonLabel")
            .unwrap_or_else(|| "Add".to_string());
        let doc = wrapper.document();
        let actions = el(doc, "div").class("repeat-actions").build();
        let button = create_button(doc, &label, "add");
        let group = Arc::clone(self);
        button.add_listener(EventKind::Click, move |_| group.add_instance());
        actions.append(&button);
        wrapper.append(&actions);
    }

    /// Post-`items` bookkeeping for model-backed groups.
    pub fn refresh(self: &Arc<Self>) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        for (index, instance) in instances(&wrapper).iter().enumerate() {
            instance.set_data("index", index);
            update_radio_checkbox_names(instance, index);
        }
        if let Some(actions) = repeat_actions(&wrapper) {
            wrapper.append(&actions);
        }
        self.add_remove_buttons(&wrapper);
        update_repeat_state(&wrapper);
    }

    /// Brings the model in line with a template that was dropped for `min = 0`.
    fn sync_with_model(&self, handle: &FieldHandle) {
        let (Some(wrapper), Some(template_id)) = (self.wrapper.upgrade(), &self.template_id) else {
            return;
        };
        if !self.template_removed || !instances(&wrapper).is_empty() {
            return;
        }
        let Some(state) = handle.state() else {
            return;
        };
        let position = state
            .children()
            .filter(|c| c.is_repeatable())
            .position(|c| &c.id == template_id);
        if let Some(position) = position {
            if let Err(e) = handle.dispatch(Action::RemoveInstance(position)) {
                warn!("Could not drop template instance '{}': {}", template_id, e);
            }
        }
    }

    fn setup_model(self: &Arc<Self>, ctx: &FormContext, container: &Element) {
        let group = Arc::clone(self);
        ctx.subscribe(
            container,
            Arc::new(move |_: &Element, handle: FieldHandle| {
                group.sync_with_model(&handle)
            }),
        );
        let Some(manager_id) = &self.manager_id else {
            return;
        };
        let group = Arc::clone(self);
        ctx.on_field_change(
            manager_id,
            Arc::new(move |payload: &FieldChangedPayload| {
                if !payload.touches(&Property::Items) {
                    return;
                }
                if let Some(ctx) = group.ctx.upgrade() {
                    let group = Arc::clone(&group);
                    ctx.request_animation_frame(move || group.refresh());
                }
            }),
        );
    }
}

/// Following siblings that are further instances of the same group.
fn collect_instances(first: &Element) -> Vec<Element> {
    let mut found = vec![first.clone()];
    let mut next = first.next_sibling();
    while let Some(sibling) = next {
        if !is_instance(&sibling) {
            break;
        }
        next = sibling.next_sibling();
        found.push(sibling);
    }
    found
}

/// Wraps every rendered repeatable panel (`data-index=0`) and its sibling
/// instances in a `.repeat-wrapper` with add/remove handling.
pub fn materialize_repeat_groups(form: &Element, ctx: &Arc<FormContext>) -> Vec<Arc<RepeatGroup>> {
    let strategy = if form.data("source").as_deref() == Some("aem") {
        RepeatStrategy::Model
    } else {
        RepeatStrategy::Document
    };
    let templates = form.query_all(|e| is_instance(e) && e.data("index").as_deref() == Some("0"));
    let mut groups = Vec::with_capacity(templates.len());

    for first in templates {
        let doc = form.document();
        let members = collect_instances(&first);
        let wrapper = doc.create_element("div");
        wrapper.set_data("min", first.data("min").unwrap_or_else(|| "0".to_string()));
        if let Some(max) = first.data("max") {
            wrapper.set_data("max", max);
        }
        wrapper.set_data(
            "variant",
            first.data("variant").unwrap_or_else(|| DEFAULT_VARIANT.to_string()),
        );
        wrapper.set_data(
            "repeatAddButtonLabel",
            first.data("repeatAddButtonLabel").unwrap_or_else(|| "Add".to_string()),
        );
        wrapper.set_data(
            "repeatDeleteButtonLabel",
            first
                .data("repeatDeleteButtonLabel")
                .unwrap_or_else(|| "Delete".to_string()),
        );
        wrapper.add_class("repeat-wrapper");
        first.before(&wrapper);
        wrapper.append_all(&members);
        for stale in wrapper.query_all(|e| e.has_class("item-remove") || e.has_class("repeat-actions")) {
            stale.remove();
        }

        let template = first.clone_node(true);
        template.remove_attr("id");
        let label_template = first
            .children()
            .into_iter()
            .find(|c| c.has_class("field-label"))
            .map(|legend| legend.text_content());

        let min = RepeatGroup::min(&wrapper);
        let template_removed = min == 0;
        if template_removed {
            first.remove();
        } else {
            update(ctx, &first, 0, label_template.as_deref());
        }

        let container = wrapper
            .parent()
            .and_then(|p| p.closest(|e| e.is("fieldset") && e.has_attr("data-id")))
            .unwrap_or_else(|| form.clone());
        let group = Arc::new(RepeatGroup {
            wrapper: wrapper.downgrade(),
            form: form.downgrade(),
            template: template.downgrade(),
            template_id: first.data("id"),
            template_removed,
            label_template,
            strategy,
            manager_id: container.data("id"),
            ctx: Arc::downgrade(ctx),
        });

        match strategy {
            RepeatStrategy::Model => group.setup_model(ctx, &container),
            RepeatStrategy::Document => {
                for (index, instance) in instances(&wrapper).iter().enumerate() {
                    update_radio_checkbox_names(instance, index);
                }
            }
        }
        if members.len() > min {
            group.add_remove_buttons(&wrapper);
        }
        if first.data("variant").as_deref() != Some(NO_BUTTONS) {
            group.insert_add_button(&wrapper);
        }
        update_repeat_state(&wrapper);
        debug!(
            "Repeat group '{}' ready with {} instances ({:?})",
            first.name(),
            instances(&wrapper).len(),
            strategy
        );
        groups.push(group);
    }
    groups
}
