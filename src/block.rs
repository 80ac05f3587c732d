//! The form block entry point: finds the definition a block carries, picks
//! the sheet or model path and swaps the block content for the live form.

use crate::fetch::{extract_form_definition, fetch_form};
use crate::sheet;
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info};
use ox_forms::config::FormsConfig;
use ox_forms::context::{FormContext, FormSource};
use ox_forms::decode::{add_request_context, StaticRequest};
use ox_forms::dom::{Element, EventKind};
use ox_forms::form::{apply_form_dataset, create_form, create_form_for_authoring, RenderedForm};
use ox_forms::schema::FormDefinition;
use ox_forms::submit::handle_submit;
use ox_forms::util::extract_id_from_url;
use ox_forms_rules::{init_adaptive_form, PageRequest, RuleEngineBridge, RuntimeFactory};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Where the page hosting the block lives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PageLocation {
    /// `scheme://host[:port]` of the page; links starting with it are same-origin.
    pub origin: Option<String>,
    pub pathname: String,
    /// Query string, including the leading `?`.
    pub search: String,
    /// Raw `Cookie` header value.
    pub cookies: String,
}

impl PageLocation {
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            ..Default::default()
        }
    }

    /// Path component of a link, resolved against the page origin.
    pub fn path_of(&self, href: &str) -> String {
        let base = self.origin.as_deref().and_then(|o| Url::parse(o).ok());
        match Url::options().base_url(base.as_ref()).parse(href) {
            Ok(url) => url.path().to_string(),
            Err(_) => href.split(['?', '#']).next().unwrap_or_default().to_string(),
        }
    }
}

/// What a block turned into.
pub enum DecoratedForm {
    /// Model-backed form with a live rule engine.
    Adaptive(Arc<RuleEngineBridge>),
    /// Sheet form; submit and reset are handled without a rule engine.
    Sheet(RenderedForm),
    /// Authoring rendition of an `edit-mode` block.
    Authoring(Element),
}

impl DecoratedForm {
    pub fn form(&self) -> &Element {
        match self {
            DecoratedForm::Adaptive(bridge) => bridge.form(),
            DecoratedForm::Sheet(rendered) => &rendered.form,
            DecoratedForm::Authoring(form) => form,
        }
    }
}

fn text<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Resolves and stores the submit action of a raw definition.
///
/// Spreadsheet-backed submissions go to the submission service with the
/// page path base64 encoded; everything else is the configured submit base
/// plus the authored action.
pub fn resolve_action(definition: &mut Value, config: &FormsConfig, pathname: &str) -> String {
    let properties = definition.get("properties");
    let submit = properties.and_then(|p| p.get("fd:submit"));
    let action_type = text(submit.and_then(|s| s.get("actionName")))
        .or_else(|| text(properties.and_then(|p| p.get("actionType"))));
    let spreadsheet = text(submit.and_then(|s| s.pointer("/spreadsheet/spreadsheetUrl")))
        .or_else(|| text(properties.and_then(|p| p.get("spreadsheetUrl"))));

    let action = if action_type == Some("spreadsheet") && spreadsheet.is_some() {
        format!("{}{}", config.submission_service, STANDARD.encode(pathname))
    } else {
        config.externalize(definition.get("action").and_then(Value::as_str).unwrap_or_default())
    };
    if let Value::Object(map) = definition {
        map.insert("action".to_string(), Value::String(action.clone()));
    }
    action
}

fn run_detached(task: BoxFuture<'static, ()>) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(task);
        }
        Err(_) => futures::executor::block_on(task),
    }
}

/// Renders a sheet form and wires its submit and reset handling: submit
/// posts the form data, reset renders a new form in place of this one.
pub fn render_sheet_form(
    ctx: Arc<FormContext>,
    definition: FormDefinition,
    pathname: Option<String>,
) -> BoxFuture<'static, RenderedForm> {
    async move {
        let rendered = create_form(&ctx, &definition).await;
        let form = rendered.form.clone();
        apply_form_dataset(&form, &definition, FormSource::Sheet, false, pathname.as_deref());

        let target = form.downgrade();
        let (submit_ctx, captcha) = (ctx.clone(), rendered.captcha.clone());
        form.add_listener(EventKind::Submit, move |_| {
            let Some(form) = target.upgrade() else { return };
            let (ctx, captcha) = (submit_ctx.clone(), captcha.clone());
            run_detached(
                async move {
                    handle_submit(&ctx, &form, captcha.as_deref()).await;
                }
                .boxed(),
            );
        });

        let target = form.downgrade();
        form.add_listener(EventKind::Reset, move |_| {
            let Some(old) = target.upgrade() else { return };
            let (ctx, definition, pathname) = (ctx.fresh(), definition.clone(), pathname.clone());
            run_detached(
                async move {
                    let fresh = render_sheet_form(ctx.clone(), definition, pathname).await;
                    old.replace_with(&fresh.form);
                    old.release();
                    debug!("Sheet form '{}' re-rendered after reset", ctx.form_id());
                }
                .boxed(),
            );
        });
        rendered
    }
    .boxed()
}

async fn decorate_definition(
    block: &Element,
    base: &Arc<FormContext>,
    location: &PageLocation,
    factory: Arc<dyn RuntimeFactory>,
    container: Element,
    mut raw: Value,
    pathname: Option<String>,
) -> Result<DecoratedForm> {
    let page_path = pathname.clone().unwrap_or_else(|| location.pathname.clone());
    let action = resolve_action(&mut raw, base.config(), &page_path);
    let form_id = extract_id_from_url(&action);

    if sheet::is_document_based(&raw) {
        let definition = sheet::transform(&raw, &form_id).context("transforming sheet rows")?;
        let ctx = base.for_form(form_id, FormSource::Sheet);
        let rendered = render_sheet_form(ctx, definition, pathname).await;
        container.replace_with(&rendered.form);
        return Ok(DecoratedForm::Sheet(rendered));
    }

    add_request_context(&mut raw, &StaticRequest::new(location.search.clone(), location.cookies.clone()));
    let definition = FormDefinition::from_value(raw).context("reading form definition")?;
    let ctx = base.for_form(form_id, FormSource::Aem);

    if block.has_class("edit-mode") {
        let form = create_form_for_authoring(&ctx, &definition).await;
        apply_form_dataset(&form, &definition, FormSource::Aem, true, pathname.as_deref());
        container.replace_with(&form);
        return Ok(DecoratedForm::Authoring(form));
    }

    let request = PageRequest {
        search: location.search.clone(),
        pathname: pathname.clone(),
    };
    let bridge = init_adaptive_form(ctx, definition.clone(), &request, factory)
        .await
        .context("initializing adaptive form")?;
    apply_form_dataset(bridge.form(), &definition, FormSource::Aem, true, pathname.as_deref());
    container.replace_with(bridge.form());
    bridge.spawn_event_loop();
    Ok(DecoratedForm::Adaptive(bridge))
}

async fn try_decorate(
    block: &Element,
    base: &Arc<FormContext>,
    location: &PageLocation,
    factory: Arc<dyn RuntimeFactory>,
) -> Result<Option<DecoratedForm>> {
    let (container, raw, pathname) = match block.query(|e| e.is("a") && e.has_attr("href")) {
        Some(anchor) => {
            let href = anchor.attr("href").unwrap_or_default();
            let raw = fetch_form(base.http().as_ref(), &href, location.origin.as_deref())
                .await
                .with_context(|| format!("fetching form {href}"))?;
            (anchor, raw, Some(location.path_of(&href)))
        }
        None => match extract_form_definition(block).context("decoding embedded form")? {
            Some((container, raw)) => (container, Some(raw), None),
            None => (block.clone(), None, None),
        },
    };
    let Some(raw) = raw else {
        debug!("Block carries no form definition");
        return Ok(None);
    };
    decorate_definition(block, base, location, factory, container, raw, pathname)
        .await
        .map(Some)
}

/// Decorates a form block in place.
///
/// The block either links to its form (`a[href]`) or embeds it in a
/// `<pre><code>` block; that element is replaced by the rendered `<form>`.
/// A block without a definition is left as is; a block whose form cannot be
/// fetched, decoded or initialized is logged and emptied.
pub async fn decorate(
    block: &Element,
    base: &Arc<FormContext>,
    location: &PageLocation,
    factory: Arc<dyn RuntimeFactory>,
) -> Option<DecoratedForm> {
    match try_decorate(block, base, location, factory).await {
        Ok(Some(decorated)) => {
            info!(
                "Form block decorated as '{}' ({})",
                decorated.form().data("id").unwrap_or_default(),
                decorated.form().data("source").unwrap_or_default()
            );
            Some(decorated)
        }
        Ok(None) => None,
        Err(e) => {
            error!("Form block could not be decorated: {:#}", e);
            block.clear();
            None
        }
    }
}
