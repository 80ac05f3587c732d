use crate::context::FormContext;
use crate::dom::Element;
use crate::schema::FieldDescriptor;
use crate::traits::ComponentDecorator;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps component names to decorators.
#[derive(Default, Clone)]
pub struct ComponentRegistry {
    decorators: HashMap<String, Arc<dyn ComponentDecorator>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decorator: Arc<dyn ComponentDecorator>) {
        self.decorators
            .insert(decorator.component_name().to_string(), decorator);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ComponentDecorator>> {
        self.decorators.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.decorators.keys().cloned().collect();
        names.sort();
        names
    }

    /// Component name of a field: `properties["fd:viewType"]`, else the last
    /// segment of `:type`.
    pub fn component_of(field: &FieldDescriptor) -> Option<String> {
        field
            .property("fd:viewType")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| {
                field
                    .component_type
                    .as_deref()
                    .and_then(|t| t.rsplit('/').next())
                    .map(str::to_string)
            })
            .filter(|name| !name.is_empty())
    }

    /// Runs the matching decorator, if any. Decorator failures are logged and
    /// do not affect the rest of the form.
    pub async fn decorate(
        &self,
        element: &Element,
        field: &FieldDescriptor,
        container: Option<&Element>,
        ctx: &Arc<FormContext>,
    ) {
        let Some(name) = Self::component_of(field) else {
            return;
        };
        let Some(decorator) = self.get(&name) else {
            return;
        };
        debug!("Decorating '{}' with component '{}'", field.id, name);
        if let Err(e) = decorator.decorate(element, field, container, ctx).await {
            warn!("Component '{}' failed on field '{}': {:#}", name, field.id, e);
        }
    }
}
