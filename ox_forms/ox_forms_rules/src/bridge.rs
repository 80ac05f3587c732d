//! Rule engine bridge: keeps a rendered form and its field model in sync.
//!
//! Model events are turned into DOM mutations through [`plan_mutation`] and
//! [`apply_mutation`]; DOM `change`, `focusin`, button `click` and form
//! `submit` events are turned into model updates.

use crate::dispatch::{apply_mutation, handle_active_child, plan_mutation, DomMutation};
use crate::error::BridgeError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use log::{debug, warn};
use ox_forms::captcha::ReCaptcha;
use ox_forms::context::FormContext;
use ox_forms::dom::{Element, Event, EventKind};
use ox_forms::model::{Action, FieldChangedPayload, FieldModelRuntime, ModelEvent};
use ox_forms::render::RenditionGenerator;
use ox_forms::schema::{FieldDescriptor, FieldItem};
use ox_forms::submit::{submit_failure, submit_success};
use ox_forms::validation::get_checkbox_group_value;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc::UnboundedReceiver;

type RenderPromise = Shared<BoxFuture<'static, ()>>;

/// Upper bound on drain rounds in [`RuleEngineBridge::process_pending`].
const MAX_SETTLE_ROUNDS: usize = 64;

/// `qualified` names `key` or something inside it.
pub(crate) fn within(qualified: &str, key: &str) -> bool {
    match qualified.strip_prefix(key) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

pub struct RuleEngineBridge {
    ctx: Arc<FormContext>,
    form: Element,
    model: Arc<dyn FieldModelRuntime>,
    root_id: String,
    lifecycle: Arc<Lifecycle>,
    captcha: Option<Arc<ReCaptcha>>,
    events: tokio::sync::Mutex<UnboundedReceiver<ModelEvent>>,
    render_promises: Mutex<HashMap<String, RenderPromise>>,
}

impl RuleEngineBridge {
    /// Binds `model` to the rendered `form`: replays component subscriptions,
    /// subscribes to model events and installs the DOM listeners.
    pub fn attach(
        ctx: Arc<FormContext>,
        form: Element,
        captcha: Option<Arc<ReCaptcha>>,
        lifecycle: Arc<Lifecycle>,
        model: Arc<dyn FieldModelRuntime>,
    ) -> Arc<Self> {
        let events = model.subscribe();
        let root_id = model.get_state().root.id;
        let bridge = Arc::new(Self {
            ctx: ctx.clone(),
            form,
            model: model.clone(),
            root_id,
            lifecycle,
            captcha,
            events: tokio::sync::Mutex::new(events),
            render_promises: Mutex::new(HashMap::new()),
        });
        ctx.attach_model(model);
        bridge.install_listeners();
        debug!("Rule engine attached to form '{}'", ctx.form_id());
        bridge
    }

    pub fn form(&self) -> &Element {
        &self.form
    }

    pub fn model(&self) -> &Arc<dyn FieldModelRuntime> {
        &self.model
    }

    pub fn lifecycle(&self) -> &Arc<Lifecycle> {
        &self.lifecycle
    }

    fn promises(&self) -> MutexGuard<'_, HashMap<String, RenderPromise>> {
        self.render_promises
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn install_listeners(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.form.add_listener(EventKind::Change, move |event| {
            if let Some(bridge) = live(&weak) {
                bridge.on_dom_change(event);
            }
        });
        let weak = Arc::downgrade(self);
        self.form.add_listener(EventKind::FocusIn, move |event| {
            if let Some(bridge) = live(&weak) {
                bridge.on_focus_in(&event.target);
            }
        });
        let weak = Arc::downgrade(self);
        self.form.add_listener(EventKind::Click, move |event| {
            if let Some(bridge) = live(&weak) {
                bridge.on_click(&event.target);
            }
        });
        let weak = Arc::downgrade(self);
        self.form.add_listener(EventKind::Submit, move |_| {
            if let Some(bridge) = live(&weak) {
                bridge.spawn_submit(None);
            }
        });
    }

    fn on_dom_change(&self, event: &Event) {
        let target = &event.target;
        let Some(id) = target
            .closest(|e| e.has_class("field-wrapper"))
            .and_then(|wrapper| wrapper.data("id"))
        else {
            return;
        };
        let input_type = target.input_type();
        let grouped = target.data("fieldType");
        let value = match (input_type.as_str(), grouped.as_deref()) {
            ("checkbox", Some("checkbox-group")) => {
                json!(get_checkbox_group_value(&self.form, &target.name()))
            }
            ("radio", Some("radio-group")) => json!(target.value()),
            ("checkbox", _) => {
                if target.checked() {
                    json!(target.value())
                } else {
                    target
                        .data("uncheckedValue")
                        .map(Value::String)
                        .unwrap_or(Value::Null)
                }
            }
            ("file", _) => event
                .detail
                .get("files")
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new())),
            _ => json!(target.value()),
        };
        if let Err(e) = self.model.set_value(&id, value) {
            warn!("Change on '{}' not applied to the model: {}", id, e);
        }
    }

    fn on_focus_in(&self, target: &Element) {
        let id = if matches!(target.input_type().as_str(), "radio" | "checkbox") {
            target
                .closest(|e| e.has_class("field-wrapper"))
                .and_then(|wrapper| wrapper.data("id"))
        } else {
            target.id_attr()
        };
        let Some(id) = id else { return };
        if let Err(e) = self.model.dispatch(&id, Action::Focus) {
            debug!("Focus on '{}' ignored: {}", id, e);
        }
    }

    fn on_click(self: &Arc<Self>, target: &Element) {
        if !target.is("button") {
            return;
        }
        let Some(id) = target.id_attr() else { return };
        if target.attr("type").as_deref() == Some("submit") {
            self.spawn_submit(Some(id));
            return;
        }
        if self.model.field_state(&id).is_some() {
            if let Err(e) = self.model.dispatch(&id, Action::Click) {
                warn!("Click on '{}' failed: {}", id, e);
            }
        }
    }

    fn spawn_submit(self: &Arc<Self>, button: Option<String>) {
        let bridge = Arc::clone(self);
        let submission = async move {
            if let Err(e) = bridge.submit(button).await {
                warn!("Submission not started: {}", e);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(submission);
            }
            Err(_) => futures::executor::block_on(submission),
        }
    }

    /// Starts a submission: fetches the captcha token into the model, then
    /// clicks `button` (or submits the form) in the model.
    ///
    /// When the model rejects the submission the form moves to
    /// `SubmitFailure`, so it can be submitted again.
    pub async fn submit(&self, button: Option<String>) -> Result<(), BridgeError> {
        self.lifecycle.transition(LifecycleState::Submitting)?;
        self.form.set_attr("data-submitting", "true");
        let started = self.start_submission(button).await;
        if started.is_err() {
            self.form.set_attr("data-submitting", "false");
            if let Err(e) = self.lifecycle.transition(LifecycleState::SubmitFailure) {
                debug!("{}", e);
            }
        }
        started
    }

    async fn start_submission(&self, button: Option<String>) -> Result<(), BridgeError> {
        if let Some(captcha) = &self.captcha {
            if let Some(token) = captcha.get_token().await {
                self.model.set_value(captcha.id(), Value::String(token))?;
            }
        }
        match button.filter(|id| self.model.field_state(id).is_some()) {
            Some(id) => self.model.dispatch(&id, Action::Click)?,
            None => self.model.dispatch(&self.root_id, Action::Submit)?,
        }
        Ok(())
    }

    /// The element rendered for field `id`; the form itself for the root.
    fn element_for(&self, id: &str) -> Option<Element> {
        if self.form.data("id").as_deref() == Some(id) || id == self.root_id {
            return Some(self.form.clone());
        }
        self.form.by_id(id)
    }

    fn pending_render(&self, qualified_name: &str) -> Option<(String, RenderPromise)> {
        self.promises()
            .iter()
            .find(|(key, _)| within(qualified_name, key))
            .map(|(key, promise)| (key.clone(), promise.clone()))
    }

    /// Applies one `fieldChanged` payload. When the field is not rendered yet
    /// but an instance render covering it is in flight, waits for that render
    /// and retries once it is done.
    pub fn apply_field_changed(&self, payload: FieldChangedPayload) -> BoxFuture<'_, ()> {
        async move {
            let field = &payload.field;
            let Some(field_el) = self.element_for(&field.id) else {
                let pending = field
                    .qualified_name
                    .as_deref()
                    .and_then(|qualified| self.pending_render(qualified));
                match pending {
                    Some((key, render)) => {
                        render.await;
                        self.promises().remove(&key);
                        self.apply_field_changed(payload).await;
                    }
                    None => debug!("Field '{}' is not rendered; change dropped", field.id),
                }
                return;
            };
            for change in &payload.changes {
                let Some(mutation) = plan_mutation(field, change) else {
                    continue;
                };
                match mutation {
                    DomMutation::RenderInstance(instance) => self.render_instance(&field_el, *instance),
                    other => apply_mutation(&self.ctx, &self.form, &field_el, field, &other),
                }
            }
            self.ctx.notify_field_changed(&payload);
        }
        .boxed()
    }

    fn render_instance(&self, manager: &Element, instance: FieldDescriptor) {
        let wrapper = manager
            .children()
            .into_iter()
            .find(|c| c.has_class("repeat-wrapper"))
            .or_else(|| manager.query(|e| e.has_class("repeat-wrapper")));
        let Some(wrapper) = wrapper else {
            warn!("No repeat wrapper for instance '{}'", instance.id);
            return;
        };
        let key = instance
            .qualified_name
            .clone()
            .unwrap_or_else(|| instance.id.clone());
        let panel = FieldDescriptor {
            items: Some(vec![FieldItem::from(instance)]),
            ..Default::default()
        };
        let render = RenditionGenerator::generate_owned(self.ctx.clone(), panel, wrapper).shared();
        debug!("Rendering repeat instance {}", key);
        self.promises().insert(key, render);
    }

    fn form_changed(&self, payload: &FieldChangedPayload) {
        for change in &payload.changes {
            if let Some(DomMutation::ActivateChild(id)) = plan_mutation(&payload.field, change) {
                handle_active_child(&self.form, &id);
            }
        }
    }

    pub async fn handle_event(&self, event: ModelEvent) {
        match event {
            ModelEvent::FieldChanged(payload) => self.apply_field_changed(payload).await,
            ModelEvent::Change(payload) => self.form_changed(&payload),
            ModelEvent::SubmitSuccess(body) => {
                if let Err(e) = self.lifecycle.transition(LifecycleState::SubmitSuccess) {
                    debug!("{}", e);
                }
                submit_success(&self.ctx, &self.form, &body);
            }
            ModelEvent::SubmitFailure(body) | ModelEvent::SubmitError(body) => {
                if let Err(e) = self.lifecycle.transition(LifecycleState::SubmitFailure) {
                    debug!("{}", e);
                }
                warn!("Submission of '{}' failed: {}", self.ctx.form_id(), body);
                submit_failure(&self.ctx, &self.form);
                self.ctx.page().alert(&self.ctx.config().submit_error_message);
            }
        }
    }

    /// Waits for in-flight instance renders, then runs deferred frames.
    /// Returns whether anything ran.
    async fn settle(&self) -> bool {
        let renders: Vec<RenderPromise> = self.promises().drain().map(|(_, render)| render).collect();
        let rendered = !renders.is_empty();
        join_all(renders).await;
        let frames = self.ctx.run_animation_frame();
        rendered || frames > 0
    }

    /// Handles every queued model event and the work it triggers; returns the
    /// number of events handled.
    pub async fn process_pending(&self) -> usize {
        let mut events = self.events.lock().await;
        let mut handled = 0;
        for _ in 0..MAX_SETTLE_ROUNDS {
            let mut progressed = false;
            while let Ok(event) = events.try_recv() {
                self.handle_event(event).await;
                handled += 1;
                progressed = true;
            }
            progressed |= self.settle().await;
            if !progressed {
                break;
            }
        }
        handled
    }

    /// Event loop for hosts with a Tokio runtime; ends when the model goes
    /// away or the bridge is disposed.
    pub async fn run(self: Arc<Self>) {
        loop {
            let event = self.events.lock().await.recv().await;
            let Some(event) = event else { break };
            if self.lifecycle.is_disposed() {
                break;
            }
            self.handle_event(event).await;
            self.process_pending().await;
        }
        debug!("Rule engine event loop for '{}' stopped", self.ctx.form_id());
    }

    pub fn spawn_event_loop(self: &Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        let handle = tokio::runtime::Handle::try_current().ok()?;
        Some(handle.spawn(Arc::clone(self).run()))
    }

    /// Detaches the model; DOM listeners become inert.
    pub fn dispose(&self) {
        if let Err(e) = self.lifecycle.transition(LifecycleState::Disposed) {
            debug!("{}", e);
        }
        self.ctx.detach_model();
        self.promises().clear();
        debug!("Rule engine for '{}' disposed", self.ctx.form_id());
    }
}

fn live(weak: &Weak<RuleEngineBridge>) -> Option<Arc<RuleEngineBridge>> {
    weak.upgrade().filter(|bridge| !bridge.lifecycle.is_disposed())
}
