use anyhow::Error;
use async_trait::async_trait;
use ox_forms::context::FormContext;
use ox_forms::dom::{Element, EventKind};
use ox_forms::schema::FieldDescriptor;
use ox_forms::traits::ComponentDecorator;
use std::sync::Arc;

const COLLAPSED: &str = "accordion-collapse";

fn sections(panel: &Element) -> Vec<Element> {
    panel.children().into_iter().filter(|c| c.is("fieldset")).collect()
}

/// Collapses every section of `panel` except `tab`; `tab` is opened when
/// `force_open`, toggled otherwise.
pub fn handle_accordion_navigation(panel: &Element, tab: &Element, force_open: bool) {
    for other in sections(panel) {
        if &other != tab {
            other.add_class(COLLAPSED);
        }
    }
    if force_open {
        tab.remove_class(COLLAPSED);
    } else {
        tab.toggle_class(COLLAPSED, None);
    }
}

/// Turns the direct child fieldsets of a panel into accordion sections with
/// only the first one open.
pub fn decorate_accordion(panel: &Element) {
    panel.add_class("accordion");
    for (index, tab) in sections(panel).into_iter().enumerate() {
        tab.set_data("index", index);
        if index != 0 {
            tab.toggle_class(COLLAPSED, None);
        }
        let Some(legend) = tab.children().into_iter().find(|c| c.is("legend")) else {
            continue;
        };
        legend.add_class("accordion-legend");
        let (panel, tab) = (panel.downgrade(), tab.downgrade());
        legend.add_listener(EventKind::Click, move |_| {
            if let (Some(panel), Some(tab)) = (panel.upgrade(), tab.upgrade()) {
                handle_accordion_navigation(&panel, &tab, false);
            }
        });
    }
}

pub struct AccordionComponent;

#[async_trait]
impl ComponentDecorator for AccordionComponent {
    fn component_name(&self) -> &str {
        "accordion"
    }

    async fn decorate(
        &self,
        element: &Element,
        _field: &FieldDescriptor,
        _container: Option<&Element>,
        _ctx: &Arc<FormContext>,
    ) -> Result<(), Error> {
        decorate_accordion(element);
        Ok(())
    }
}
