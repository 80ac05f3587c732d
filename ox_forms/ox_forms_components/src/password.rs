use anyhow::{anyhow, Error};
use async_trait::async_trait;
use ox_forms::context::FormContext;
use ox_forms::dom::{el, Element, EventKind};
use ox_forms::schema::FieldDescriptor;
use ox_forms::traits::ComponentDecorator;
use std::sync::Arc;

/// Masks the text input of `field_div` and adds an eye icon that toggles
/// between masked and plain text.
pub fn password_layout(field_div: &Element) -> Result<(), Error> {
    let input = field_div
        .query(|e| e.is("input") && e.input_type() == "text")
        .ok_or_else(|| anyhow!("no text input to mask"))?;
    input.set_attr("type", "password");

    let toggle = el(field_div.document(), "i")
        .class("bi-eye-slash")
        .attr("id", "togglePassword")
        .build();
    input.after(&toggle);

    let (target, icon) = (input.downgrade(), toggle.downgrade());
    toggle.add_listener(EventKind::Click, move |_| {
        let (Some(input), Some(icon)) = (target.upgrade(), icon.upgrade()) else {
            return;
        };
        let masked = input.attr("type").as_deref() != Some("password");
        input.set_attr("type", if masked { "password" } else { "text" });
        icon.toggle_class("bi-eye", Some(!masked));
        icon.toggle_class("bi-eye-slash", Some(masked));
    });
    Ok(())
}

pub struct PasswordComponent;

#[async_trait]
impl ComponentDecorator for PasswordComponent {
    fn component_name(&self) -> &str {
        "password"
    }

    async fn decorate(
        &self,
        element: &Element,
        _field: &FieldDescriptor,
        _container: Option<&Element>,
        _ctx: &Arc<FormContext>,
    ) -> Result<(), Error> {
        password_layout(element)
    }
}
