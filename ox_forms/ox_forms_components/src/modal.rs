//! Modal panel: the panel's content moves into a `<dialog>` that opens when
//! the model makes the panel visible. Closing the dialog hides the panel in
//! the model again.

use anyhow::Error;
use async_trait::async_trait;
use log::{debug, warn};
use ox_forms::context::FormContext;
use ox_forms::dom::{el, Element, EventKind, WeakElement};
use ox_forms::model::{FieldChangedPayload, FieldHandle, Property};
use ox_forms::schema::FieldDescriptor;
use ox_forms::traits::ComponentDecorator;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct ModalState {
    dialog: Option<WeakElement>,
    wrapper: Option<WeakElement>,
    /// Nodes the panel owned before decoration; they travel between the
    /// panel and the dialog.
    content: Vec<WeakElement>,
    field: Option<FieldHandle>,
}

pub struct Modal {
    panel: WeakElement,
    state: Mutex<ModalState>,
}

impl Modal {
    /// Moves the panel content into a dialog wrapped in `div.modal`.
    pub fn decorate(panel: &Element) -> Arc<Self> {
        let modal = Arc::new(Self {
            panel: panel.downgrade(),
            state: Mutex::new(ModalState::default()),
        });
        let dialog = modal.create_dialog(panel);
        let wrapper = el(panel.document(), "div").class("modal").build();
        wrapper.append(&dialog);
        panel.append(&wrapper);
        let mut state = modal.state();
        state.dialog = Some(dialog.downgrade());
        state.wrapper = Some(wrapper.downgrade());
        drop(state);
        modal
    }

    fn state(&self) -> MutexGuard<'_, ModalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn dialog(&self) -> Option<Element> {
        self.state().dialog.as_ref().and_then(WeakElement::upgrade)
    }

    pub fn set_field(&self, field: FieldHandle) {
        self.state().field = Some(field);
    }

    fn create_dialog(self: &Arc<Self>, panel: &Element) -> Element {
        let doc = panel.document();
        let dialog = doc.create_element("dialog");
        let content = el(doc, "div").class("modal-content").build();
        let nodes: Vec<Element> = {
            let mut state = self.state();
            if state.content.is_empty() {
                state.content = panel.child_nodes().iter().map(Element::downgrade).collect();
            }
            state.content.iter().filter_map(WeakElement::upgrade).collect()
        };
        content.append_all(&nodes);
        dialog.append(&content);

        let close = el(doc, "button")
            .class("close-button")
            .attr("aria-label", "Close")
            .attr("type", "button")
            .build();
        close.append(&el(doc, "span").class("icon").class("icon-close").build());
        dialog.append(&close);
        let target = dialog.downgrade();
        close.add_listener(EventKind::Click, move |_| {
            if let Some(dialog) = target.upgrade() {
                dialog.close();
            }
        });

        let modal = Arc::clone(self);
        dialog.add_listener(EventKind::Close, move |event| modal.on_close(&event.target));
        dialog
    }

    fn on_close(&self, dialog: &Element) {
        dialog.document().body().remove_class("modal-open");
        let content = dialog.query(|e| e.has_class("modal-content"));
        if let (Some(panel), Some(content)) = (self.panel.upgrade(), content) {
            panel.append_all(&content.child_nodes());
        }
        dialog.remove();
        let field = self.state().field.clone();
        if let Some(field) = field {
            if let Err(e) = field.set_property(Property::Visible, Value::Bool(false)) {
                warn!("Could not hide modal panel '{}': {}", field.id(), e);
            }
        }
    }

    /// Opens the dialog, rebuilding it when a previous close removed it.
    pub fn show_modal(self: &Arc<Self>) {
        let Some(panel) = self.panel.upgrade() else {
            return;
        };
        let dialog = match self.dialog().filter(|d| d.parent().is_some()) {
            Some(dialog) => dialog,
            None => {
                let dialog = self.create_dialog(&panel);
                let wrapper = self.state().wrapper.as_ref().and_then(WeakElement::upgrade);
                if let Some(wrapper) = wrapper {
                    wrapper.append(&dialog);
                }
                self.state().dialog = Some(dialog.downgrade());
                dialog
            }
        };
        if dialog.parent().is_some() {
            dialog.show_modal();
            dialog.document().body().add_class("modal-open");
        }
    }
}

fn shows_panel(payload: &FieldChangedPayload) -> bool {
    payload
        .changes
        .iter()
        .any(|c| c.property_name == Property::Visible && c.current_value == Value::Bool(true))
}

pub struct ModalComponent;

#[async_trait]
impl ComponentDecorator for ModalComponent {
    fn component_name(&self) -> &str {
        "modal"
    }

    async fn decorate(
        &self,
        element: &Element,
        _field: &FieldDescriptor,
        _container: Option<&Element>,
        ctx: &Arc<FormContext>,
    ) -> Result<(), Error> {
        let modal = Modal::decorate(element);
        let bound = Arc::clone(&modal);
        ctx.subscribe(
            element,
            Arc::new(move |_: &Element, handle: FieldHandle| bound.set_field(handle)),
        );
        if let Some(id) = element.data("id") {
            ctx.on_field_change(
                &id,
                Arc::new(move |payload: &FieldChangedPayload| {
                    if shows_panel(payload) {
                        modal.show_modal();
                    }
                }),
            );
            debug!("Panel '{}' decorated as a modal", id);
        }
        Ok(())
    }
}
