//! Reference field model: a reactive tree over a form definition.
//!
//! Every mutation goes through the [`FieldModelRuntime`] methods and is
//! reported to subscribers as a `fieldChanged`/`change` event carrying the
//! field's new state and the property diffs. Expression evaluation and custom
//! functions are not part of this model.

use async_trait::async_trait;
use log::debug;
use ox_forms::model::{Action, Change, FieldChangedPayload, FieldModelRuntime, ModelError, ModelEvent, Property};
use ox_forms::schema::{is_truthy, FieldDescriptor, FieldItem, FieldType, FormDefinition};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

pub const ROOT_QUALIFIED_NAME: &str = "$form";
const ROOT_ID: &str = "$form";
const REQUIRED_MESSAGE: &str = "Please fill in this field.";

/// Creates field models for the bridge and the worker.
pub trait RuntimeFactory: Send + Sync {
    /// Model for a freshly decoded definition.
    fn create(&self, definition: FormDefinition) -> Arc<dyn FieldModelRuntime>;
    /// Model rebuilt from a state snapshot taken from another model.
    fn restore(&self, state: FormDefinition) -> Arc<dyn FieldModelRuntime>;
}

#[derive(Default, Clone, Copy, Debug)]
pub struct FormRuntimeFactory;

impl RuntimeFactory for FormRuntimeFactory {
    fn create(&self, definition: FormDefinition) -> Arc<dyn FieldModelRuntime> {
        Arc::new(FormRuntime::new(definition))
    }

    fn restore(&self, state: FormDefinition) -> Arc<dyn FieldModelRuntime> {
        Arc::new(FormRuntime::from_state(state))
    }
}

/// Repeat bookkeeping for a panel whose children are repeatable.
struct Manager {
    template: FieldDescriptor,
    /// Position in `items` where instances start.
    slot: usize,
    next_suffix: usize,
}

impl Manager {
    fn min(&self) -> usize {
        self.template.min_occurrences()
    }

    fn max(&self) -> Option<usize> {
        self.template.max_occurrences().filter(|max| *max > 0)
    }
}

struct State {
    form: FormDefinition,
    managers: HashMap<String, Manager>,
    subscribers: Vec<UnboundedSender<ModelEvent>>,
}

impl State {
    fn emit(&mut self, event: ModelEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

pub struct FormRuntime {
    state: Mutex<State>,
}

fn find<'a>(node: &'a FieldDescriptor, id: &str) -> Option<&'a FieldDescriptor> {
    if node.id == id {
        return Some(node);
    }
    node.children().find_map(|child| find(child, id))
}

fn find_mut<'a>(node: &'a mut FieldDescriptor, id: &str) -> Option<&'a mut FieldDescriptor> {
    if node.id == id {
        return Some(node);
    }
    node.items.as_mut()?.iter_mut().find_map(|item| match item {
        FieldItem::Field(child) => find_mut(child, id),
        FieldItem::Malformed(_) => None,
    })
}

fn has_value(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(values)) => !values.is_empty(),
        Some(value) => is_truthy(value),
        None => false,
    }
}

fn segment(field: &FieldDescriptor) -> String {
    field
        .name
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| field.id.clone())
}

/// Qualified names: `{parent}.{name}`, `{parent}.{name}[{index}]` for
/// repeatable instances. `force` overwrites names already present.
fn assign_names(node: &mut FieldDescriptor, qualified_name: String, force: bool) {
    if force || node.qualified_name.is_none() {
        node.qualified_name = Some(qualified_name);
    }
    let parent_name = node.qualified_name.clone().unwrap_or_default();
    let parent_id = node.id.clone();
    let mut repeat_index: HashMap<String, usize> = HashMap::new();
    let Some(items) = node.items.as_mut() else {
        return;
    };
    for (position, item) in items.iter_mut().enumerate() {
        let FieldItem::Field(child) = item else {
            continue;
        };
        if child.id.is_empty() {
            child.id = format!("{parent_id}-{position}");
        }
        let name = segment(child);
        let qualified = if child.is_repeatable() {
            let index = repeat_index.entry(name.clone()).or_insert(0);
            child.index = Some(*index);
            let qualified = format!("{parent_name}.{name}[{index}]");
            *index += 1;
            qualified
        } else {
            format!("{parent_name}.{name}")
        };
        assign_names(child, qualified, force);
    }
}

/// Re-numbers the instances of a manager after a structural change.
fn reindex(manager: &mut FieldDescriptor) {
    let parent_name = manager.qualified_name.clone().unwrap_or_default();
    let mut counters: HashMap<String, usize> = HashMap::new();
    for item in manager.items.iter_mut().flatten() {
        let FieldItem::Field(child) = item else {
            continue;
        };
        if !child.is_repeatable() {
            continue;
        }
        let name = segment(child);
        let index = counters.entry(name.clone()).or_insert(0);
        child.index = Some(*index);
        assign_names(child, format!("{parent_name}.{name}[{index}]"), true);
        *index += 1;
    }
}

fn reset_values(node: &mut FieldDescriptor) {
    node.value = node.default.clone();
    node.display_value = None;
    node.valid = None;
    for item in node.items.iter_mut().flatten() {
        if let FieldItem::Field(child) = item {
            reset_values(child);
        }
    }
}

fn suffix_ids(node: &mut FieldDescriptor, suffix: usize) {
    node.id = format!("{}-{}", node.id, suffix);
    for item in node.items.iter_mut().flatten() {
        if let FieldItem::Field(child) = item {
            suffix_ids(child, suffix);
        }
    }
}

/// `items` positions of the repeatable children.
fn instance_positions(items: &[FieldItem]) -> Vec<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.as_field().is_some_and(FieldDescriptor::is_repeatable))
        .map(|(position, _)| position)
        .collect()
}

fn instance_count(node: &FieldDescriptor) -> usize {
    node.children().filter(|c| c.is_repeatable()).count()
}

fn unique_suffix(root: &FieldDescriptor, template_id: &str, start: usize) -> usize {
    let mut suffix = start;
    while find(root, &format!("{template_id}-{suffix}")).is_some() {
        suffix += 1;
    }
    suffix
}

fn insert_instance(node: &mut FieldDescriptor, instance: FieldDescriptor, position: usize, slot: usize) {
    let items = node.items.get_or_insert_with(Vec::new);
    let positions = instance_positions(items);
    let at = match positions.get(position) {
        Some(at) => *at,
        None => positions
            .last()
            .map(|last| last + 1)
            .unwrap_or_else(|| slot.min(items.len())),
    };
    items.insert(at, FieldItem::from(instance));
}

/// Registers every instance manager under `node`; with `fill`, managers are
/// grown to `max(min, 1)` instances.
fn collect_managers(node: &mut FieldDescriptor, managers: &mut HashMap<String, Manager>, fill: bool) {
    let template = node.items.as_ref().and_then(|items| {
        let slot = instance_positions(items).into_iter().next()?;
        items[slot].as_field().cloned().map(|fd| (fd, slot))
    });
    if let Some((mut template, slot)) = template {
        reset_values(&mut template);
        let mut manager = Manager {
            template,
            slot,
            next_suffix: 1,
        };
        if fill {
            let target = manager.min().max(1);
            let mut count = instance_count(node);
            while count < target {
                let suffix = unique_suffix(node, &manager.template.id, manager.next_suffix);
                let mut instance = manager.template.clone();
                suffix_ids(&mut instance, suffix);
                manager.next_suffix = suffix + 1;
                insert_instance(node, instance, count, slot);
                count += 1;
            }
            reindex(node);
        }
        managers.insert(node.id.clone(), manager);
    }
    for item in node.items.iter_mut().flatten() {
        if let FieldItem::Field(child) = item {
            collect_managers(child, managers, fill);
        }
    }
}

fn collect_missing(node: &FieldDescriptor, missing: &mut Vec<String>) {
    for child in node.children() {
        if child.visible == Some(false) {
            continue;
        }
        if child.kind().is_container() {
            collect_missing(child, missing);
        } else if child.is_required() && !has_value(child.value.as_ref()) {
            missing.push(child.id.clone());
        }
    }
}

fn export_node(node: &FieldDescriptor, out: &mut Map<String, Value>) {
    for child in node.children() {
        let name = segment(child);
        if child.is_repeatable() {
            let mut row = Map::new();
            export_node(child, &mut row);
            if let Value::Array(rows) = out
                .entry(name)
                .or_insert_with(|| Value::Array(Vec::new()))
            {
                rows.push(Value::Object(row));
            }
        } else if child.kind().is_container() {
            if child.name_or_empty().is_empty() {
                export_node(child, out);
            } else {
                let mut nested = Map::new();
                export_node(child, &mut nested);
                out.insert(name, Value::Object(nested));
            }
        } else if !child.name_or_empty().is_empty()
            && !matches!(
                child.kind(),
                FieldType::Button | FieldType::PlainText | FieldType::Image | FieldType::Heading
            )
        {
            out.insert(name, child.value.clone().unwrap_or(Value::Null));
        }
    }
}

fn to_value(field: &FieldDescriptor) -> Result<Value, ModelError> {
    serde_json::to_value(field).map_err(|e| ModelError::InvalidValue {
        id: field.id.clone(),
        property: "items".to_string(),
        reason: e.to_string(),
    })
}

impl FormRuntime {
    /// Builds the model for a decoded definition. Instance managers start
    /// with `max(min, 1)` instances.
    pub fn new(definition: FormDefinition) -> Self {
        Self::build(definition, true)
    }

    /// Rebuilds a model from a state snapshot without touching its instances.
    pub fn from_state(state: FormDefinition) -> Self {
        Self::build(state, false)
    }

    fn build(mut form: FormDefinition, fill: bool) -> Self {
        if form.root.id.is_empty() {
            form.root.id = ROOT_ID.to_string();
        }
        let root_name = form
            .root
            .qualified_name
            .clone()
            .unwrap_or_else(|| ROOT_QUALIFIED_NAME.to_string());
        assign_names(&mut form.root, root_name, false);
        let mut managers = HashMap::new();
        collect_managers(&mut form.root, &mut managers, fill);
        debug!(
            "Field model for '{}' built with {} instance managers",
            form.root.id,
            managers.len()
        );
        Self {
            state: Mutex::new(State {
                form,
                managers,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn root_id(&self) -> String {
        self.lock().form.root.id.clone()
    }

    pub fn is_instance_manager(&self, id: &str) -> bool {
        self.lock().managers.contains_key(id)
    }

    fn not_applicable(action: &Action, id: &str) -> ModelError {
        ModelError::NotApplicable {
            action: action.to_string(),
            id: id.to_string(),
        }
    }

    fn focus(&self, id: &str) -> Result<(), ModelError> {
        let mut state = self.lock();
        let root = &mut state.form.root;
        let previous = root.active_child.clone();
        if previous.as_deref() == Some(id) {
            return Ok(());
        }
        root.active_child = Some(id.to_string());
        let change = Change::new(
            Property::ActiveChild,
            json!({ "id": id }),
            previous.map(|p| json!({ "id": p })).unwrap_or(Value::Null),
        );
        let payload = FieldChangedPayload {
            field: root.clone(),
            changes: vec![change],
        };
        state.emit(ModelEvent::Change(payload));
        Ok(())
    }

    fn submit(&self) {
        let mut state = self.lock();
        let mut missing = Vec::new();
        collect_missing(&state.form.root, &mut missing);
        if missing.is_empty() {
            let mut data = Map::new();
            export_node(&state.form.root, &mut data);
            let mut body = json!({ "data": data });
            if let Some(message) = &state.form.thank_you_msg {
                body["thankYouMessage"] = json!(message);
            }
            if let Some(url) = &state.form.redirect_url {
                body["redirectUrl"] = json!(url);
            }
            debug!("Submitting form '{}'", state.form.root.id);
            state.emit(ModelEvent::SubmitSuccess(body));
            return;
        }
        for id in &missing {
            let Some(field) = find_mut(&mut state.form.root, id) else {
                continue;
            };
            let mut changes = Vec::new();
            if field.valid != Some(false) {
                let previous = field.valid.map(Value::Bool).unwrap_or(Value::Null);
                field.valid = Some(false);
                changes.push(Change::new(Property::Valid, Value::Bool(false), previous));
            }
            if field.validation_message.as_deref() != Some(REQUIRED_MESSAGE) {
                let previous = field
                    .validation_message
                    .replace(REQUIRED_MESSAGE.to_string())
                    .map(Value::String)
                    .unwrap_or(Value::Null);
                changes.push(Change::new(
                    Property::ValidationMessage,
                    json!(REQUIRED_MESSAGE),
                    previous,
                ));
            }
            if !changes.is_empty() {
                let payload = FieldChangedPayload {
                    field: field.clone(),
                    changes,
                };
                state.emit(ModelEvent::FieldChanged(payload));
            }
        }
        state.emit(ModelEvent::SubmitFailure(json!({ "invalid": missing })));
    }

    fn add_instance(&self, manager_id: &str, index: usize) -> Result<(), ModelError> {
        let action = Action::AddInstance(index);
        let mut guard = self.lock();
        let State { form, managers, .. } = &mut *guard;
        let manager = managers
            .get_mut(manager_id)
            .ok_or_else(|| Self::not_applicable(&action, manager_id))?;
        let count = find(&form.root, manager_id)
            .map(instance_count)
            .ok_or_else(|| ModelError::UnknownField(manager_id.to_string()))?;
        if manager.max().is_some_and(|max| count >= max) {
            return Err(Self::not_applicable(&action, manager_id));
        }
        let suffix = unique_suffix(&form.root, &manager.template.id, manager.next_suffix);
        manager.next_suffix = suffix + 1;
        let mut instance = manager.template.clone();
        suffix_ids(&mut instance, suffix);
        let instance_id = instance.id.clone();
        let slot = manager.slot;
        collect_managers(&mut instance, managers, true);

        let node = find_mut(&mut form.root, manager_id)
            .ok_or_else(|| ModelError::UnknownField(manager_id.to_string()))?;
        insert_instance(node, instance, index.min(count), slot);
        reindex(node);
        let added = find(node, &instance_id)
            .map(to_value)
            .transpose()?
            .unwrap_or(Value::Null);
        let payload = FieldChangedPayload {
            field: node.clone(),
            changes: vec![Change::new(Property::Items, added, Value::Null)],
        };
        guard.emit(ModelEvent::FieldChanged(payload));
        Ok(())
    }

    fn remove_instance(&self, manager_id: &str, index: usize) -> Result<(), ModelError> {
        let action = Action::RemoveInstance(index);
        let mut guard = self.lock();
        let State { form, managers, .. } = &mut *guard;
        let min = managers
            .get(manager_id)
            .map(Manager::min)
            .ok_or_else(|| Self::not_applicable(&action, manager_id))?;
        let node = find_mut(&mut form.root, manager_id)
            .ok_or_else(|| ModelError::UnknownField(manager_id.to_string()))?;
        let positions = node.items.as_deref().map(instance_positions).unwrap_or_default();
        if positions.len() <= min {
            return Err(Self::not_applicable(&action, manager_id));
        }
        let Some(at) = positions.get(index).copied() else {
            return Err(Self::not_applicable(&action, manager_id));
        };
        let removed = match node.items.as_mut() {
            Some(items) => items.remove(at),
            None => return Err(Self::not_applicable(&action, manager_id)),
        };
        reindex(node);
        let previous = match removed.as_field() {
            Some(field) => json!({ "id": field.id, "qualifiedName": field.qualified_name }),
            None => Value::Null,
        };
        let payload = FieldChangedPayload {
            field: node.clone(),
            changes: vec![Change::new(Property::Items, Value::Null, previous)],
        };
        guard.emit(ModelEvent::FieldChanged(payload));
        Ok(())
    }

    fn import_into(&self, container_id: &str, data: &Map<String, Value>) {
        let Some(container) = self.field_state(container_id) else {
            return;
        };
        let repeat_name = self
            .lock()
            .managers
            .get(container_id)
            .map(|m| segment(&m.template));
        if let Some(Value::Array(rows)) = repeat_name.as_ref().and_then(|name| data.get(name)) {
            let mut count = instance_count(&container);
            while count < rows.len() {
                if let Err(e) = self.add_instance(container_id, count) {
                    debug!("Prefill stopped growing '{}': {}", container_id, e);
                    break;
                }
                count += 1;
            }
            let instances: Vec<String> = self
                .field_state(container_id)
                .map(|c| {
                    c.children()
                        .filter(|child| child.is_repeatable())
                        .map(|child| child.id.clone())
                        .collect()
                })
                .unwrap_or_default();
            for (id, row) in instances.iter().zip(rows) {
                if let Value::Object(row) = row {
                    self.import_into(id, row);
                }
            }
        }
        for child in container.children().filter(|c| !c.is_repeatable()) {
            let name = child.name_or_empty();
            if child.kind().is_container() {
                if name.is_empty() {
                    self.import_into(&child.id, data);
                } else if let Some(Value::Object(nested)) = data.get(name) {
                    self.import_into(&child.id, nested);
                }
            } else if let Some(value) = data.get(name).filter(|_| !name.is_empty()) {
                if let Err(e) = self.set_value(&child.id, value.clone()) {
                    debug!("Prefill skipped '{}': {}", child.id, e);
                }
            }
        }
    }
}

#[async_trait]
impl FieldModelRuntime for FormRuntime {
    fn get_state(&self) -> FormDefinition {
        self.lock().form.clone()
    }

    fn field_state(&self, id: &str) -> Option<FieldDescriptor> {
        find(&self.lock().form.root, id).cloned()
    }

    fn set_value(&self, id: &str, value: Value) -> Result<(), ModelError> {
        let mut state = self.lock();
        let field = find_mut(&mut state.form.root, id)
            .ok_or_else(|| ModelError::UnknownField(id.to_string()))?;
        if field.kind().is_container() {
            return Err(ModelError::InvalidValue {
                id: id.to_string(),
                property: Property::Value.to_string(),
                reason: "containers carry no value".to_string(),
            });
        }
        if field.value.as_ref() == Some(&value) {
            return Ok(());
        }
        let previous = field.value.replace(value.clone()).unwrap_or(Value::Null);
        if field.display_format.is_some() || field.display_value_expression.is_some() {
            field.display_value = Some(value.clone());
        }
        let mut changes = vec![Change::new(Property::Value, value.clone(), previous)];
        if field.is_required() {
            let valid = has_value(Some(&value));
            if field.valid != Some(valid) {
                let previous = field.valid.map(Value::Bool).unwrap_or(Value::Null);
                field.valid = Some(valid);
                changes.push(Change::new(Property::Valid, Value::Bool(valid), previous));
            }
        }
        let payload = FieldChangedPayload {
            field: field.clone(),
            changes,
        };
        state.emit(ModelEvent::FieldChanged(payload));
        Ok(())
    }

    fn set_property(&self, id: &str, property: &Property, value: Value) -> Result<(), ModelError> {
        match property {
            Property::Value => return self.set_value(id, value),
            Property::Items => {
                return Err(ModelError::InvalidValue {
                    id: id.to_string(),
                    property: property.to_string(),
                    reason: "use addInstance/removeInstance".to_string(),
                })
            }
            _ => {}
        }
        let mut state = self.lock();
        let field = find_mut(&mut state.form.root, id)
            .ok_or_else(|| ModelError::UnknownField(id.to_string()))?;
        let previous = field.get_named(property.as_str());
        if previous == value {
            return Ok(());
        }
        field
            .set_named(property.as_str(), value.clone())
            .map_err(|e| ModelError::InvalidValue {
                id: id.to_string(),
                property: property.to_string(),
                reason: e.to_string(),
            })?;
        let payload = FieldChangedPayload {
            field: field.clone(),
            changes: vec![Change::new(property.clone(), value, previous)],
        };
        state.emit(ModelEvent::FieldChanged(payload));
        Ok(())
    }

    fn dispatch(&self, id: &str, action: Action) -> Result<(), ModelError> {
        let target = self
            .field_state(id)
            .ok_or_else(|| ModelError::UnknownField(id.to_string()))?;
        debug!("Dispatching {} on '{}'", action, id);
        match action {
            Action::Click => {
                if target.kind() == FieldType::Button && target.button_type.as_deref() == Some("submit") {
                    self.submit();
                }
                Ok(())
            }
            Action::Focus => self.focus(id),
            Action::Submit => {
                self.submit();
                Ok(())
            }
            Action::AddInstance(index) => self.add_instance(id, index),
            Action::RemoveInstance(index) => self.remove_instance(id, index),
        }
    }

    fn subscribe(&self) -> UnboundedReceiver<ModelEvent> {
        let (tx, rx) = unbounded_channel();
        self.lock().subscribers.push(tx);
        rx
    }

    fn import_data(&self, data: &Value) {
        let Value::Object(data) = data else {
            debug!("Ignoring non-object prefill data");
            return;
        };
        let root = self.root_id();
        self.import_into(&root, data);
    }

    fn export_data(&self) -> Value {
        let mut data = Map::new();
        export_node(&self.lock().form.root, &mut data);
        Value::Object(data)
    }

    async fn wait_for_promises(&self) {
        debug!("No pending rule evaluations");
    }
}
