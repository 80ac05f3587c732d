//! Submission outcome handling and sheet-backed submission.

use crate::captcha::ReCaptcha;
use crate::context::FormContext;
use crate::dom::{el, Element, EventKind};
use crate::validation::report_validity;
use log::{debug, info, warn};
use serde_json::{json, Map, Value};
use uuid::Uuid;

const DEFAULT_THANK_YOU: &str = "Thanks for your submission";

fn submit_button(form: &Element) -> Option<Element> {
    form.query(|e| e.is("button") && e.attr("type").as_deref() == Some("submit"))
}

fn finish_submitting(form: &Element) {
    form.set_attr("data-submitting", "false");
    if let Some(button) = submit_button(form) {
        button.set_disabled(false);
    }
}

/// Navigates to the redirect URL, or shows the thank-you message above the
/// form and resets it.
pub fn submit_success(ctx: &FormContext, form: &Element, body: &Value) {
    let pick = |dataset: Option<String>, key: &str| {
        dataset
            .filter(|v| !v.is_empty())
            .or_else(|| body.get(key).and_then(Value::as_str).map(str::to_string))
    };
    let redirect = pick(form.data("redirectUrl"), "redirectUrl");
    let thank_you = pick(form.data("thankYouMsg"), "thankYouMessage");
    if let Some(url) = redirect {
        ctx.page().navigate(&url);
    } else {
        let existing = form
            .parent()
            .and_then(|p| p.query(|e| e.has_class("form-message") && e.has_class("success-message")));
        let message = existing.unwrap_or_else(|| {
            el(ctx.document(), "div")
                .class("form-message")
                .class("success-message")
                .build()
        });
        message.set_inner_html(thank_you.as_deref().unwrap_or(DEFAULT_THANK_YOU));
        form.before(&message);
        message.scroll_into_view();
        form.dispatch(EventKind::Reset, Value::Null);
    }
    finish_submitting(form);
    info!("Form '{}' submitted", ctx.form_id());
}

/// Shows the generic error message at the top of the form.
pub fn submit_failure(ctx: &FormContext, form: &Element) {
    let message = form
        .query(|e| e.has_class("form-message") && e.has_class("error-message"))
        .unwrap_or_else(|| {
            el(ctx.document(), "div")
                .class("form-message")
                .class("error-message")
                .build()
        });
    message.set_inner_html(&ctx.config().submit_error_message);
    form.prepend(&message);
    message.scroll_into_view();
    finish_submitting(form);
}

/// Name/value pairs of the enabled, named controls; checked checkboxes of the
/// same name are joined with commas.
pub fn construct_payload(form: &Element) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("__id__".to_string(), Value::String(Uuid::new_v4().to_string()));
    let controls = form.query_all(|e| e.is("input") || e.is("select") || e.is("textarea"));
    for control in controls {
        let name = control.name();
        if name.is_empty() || control.disabled() {
            continue;
        }
        let value = control.value();
        match control.input_type().as_str() {
            "radio" => {
                if control.checked() {
                    payload.insert(name, Value::String(value));
                }
            }
            "checkbox" => {
                if control.checked() {
                    let joined = match payload.get(&name).and_then(Value::as_str) {
                        Some(previous) => format!("{previous},{value}"),
                        None => value,
                    };
                    payload.insert(name, Value::String(joined));
                }
            }
            "file" => {}
            _ => {
                payload.insert(name, Value::String(value));
            }
        }
    }
    payload
}

/// Submit handling for forms without a rule engine: validates, then posts
/// `{data}` to the form action. Returns whether a request was sent.
pub async fn handle_submit(ctx: &FormContext, form: &Element, captcha: Option<&ReCaptcha>) -> bool {
    if !report_validity(form) {
        if let Some(invalid) = form.document().active_element() {
            invalid.scroll_into_view();
        }
        return false;
    }
    if form.attr("data-submitting").as_deref() == Some("true") {
        debug!("Submission already in progress for '{}'", ctx.form_id());
        return false;
    }
    form.set_attr("data-submitting", "true");
    if let Some(button) = submit_button(form) {
        button.set_disabled(true);
    }
    let mut payload = construct_payload(form);
    if let Some(captcha) = captcha {
        if let Some(token) = captcha.get_token().await {
            payload.insert(captcha.id().to_string(), Value::String(token));
        }
    }
    let action = form.data("action").unwrap_or_default();
    match ctx.http().post_json(&action, &json!({ "data": payload })).await {
        Ok(response) if response.is_success() => {
            let body = response.json().unwrap_or(Value::Null);
            submit_success(ctx, form, &body);
        }
        Ok(response) => {
            warn!("Submission to {} failed with status {}", action, response.status);
            submit_failure(ctx, form);
        }
        Err(e) => {
            warn!("Submission failed: {}", e);
            submit_failure(ctx, form);
        }
    }
    true
}
