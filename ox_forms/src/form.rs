use crate::captcha::ReCaptcha;
use crate::context::{FormContext, FormSource};
use crate::dom::Element;
use crate::render::{ItemAccessor, RenditionGenerator};
use crate::repeat::{materialize_repeat_groups, RepeatGroup};
use crate::schema::FormDefinition;
use crate::validation::enable_validation;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

/// A rendered `<form>` and the integrations attached to it.
pub struct RenderedForm {
    pub form: Element,
    pub captcha: Option<Arc<ReCaptcha>>,
    pub repeat_groups: Vec<Arc<RepeatGroup>>,
}

/// Renders the definition into a new `<form>`, then attaches captcha,
/// validation and repeat handling.
pub async fn create_form(ctx: &Arc<FormContext>, definition: &FormDefinition) -> RenderedForm {
    let form = ctx.document().create_element("form");
    form.set_data("action", definition.action.as_deref().unwrap_or_default());
    form.set_data("source", ctx.source().as_str());
    form.set_data("id", &definition.id);
    form.set_attr("novalidate", "");
    if let Some(classes) = &definition.applied_css_class_names {
        form.set_attr("class", classes);
    }
    debug!("Rendering form '{}' ({})", ctx.form_id(), ctx.source().as_str());
    RenditionGenerator::new(ctx.clone())
        .generate(&definition.root, &form)
        .await;

    let captcha = ctx.captcha().map(|field| {
        let captcha = Arc::new(ReCaptcha::new(&field, ctx.tokens().clone()));
        if let Err(e) = captcha.load_captcha(&form, ctx.page().as_ref()) {
            debug!("Captcha not loaded for '{}': {}", ctx.form_id(), e);
        }
        captcha
    });

    enable_validation(&form, &ctx.config().error_messages);
    let repeat_groups = materialize_repeat_groups(&form, ctx);
    RenderedForm {
        form,
        captcha,
        repeat_groups,
    }
}

/// Authoring rendition: children in author order, no rule engine.
pub async fn create_form_for_authoring(ctx: &Arc<FormContext>, definition: &FormDefinition) -> Element {
    let form = ctx.document().create_element("form");
    RenditionGenerator::new(ctx.clone())
        .with_accessor(ItemAccessor::AuthoringOrder)
        .generate(&definition.root, &form)
        .await;
    form
}

/// The dataset contract of a decorated form block.
pub fn apply_form_dataset(form: &Element, definition: &FormDefinition, source: FormSource, rules: bool, pathname: Option<&str>) {
    form.set_data("redirectUrl", definition.redirect_url.as_deref().unwrap_or_default());
    form.set_data("thankYouMsg", definition.thank_you_msg.as_deref().unwrap_or_default());
    let action = definition
        .action
        .clone()
        .filter(|a| !a.is_empty())
        .or_else(|| pathname.map(|p| p.split(".json").next().unwrap_or_default().to_string()))
        .unwrap_or_default();
    form.set_data("action", action);
    form.set_data("source", source.as_str());
    form.set_data("rules", rules);
    form.set_data("id", &definition.id);
    if source == FormSource::Aem {
        if let Some(path) = definition.property("fd:path").and_then(Value::as_str) {
            form.set_data("formpath", path);
        }
    }
}
