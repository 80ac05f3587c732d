//! Per-form-instance state shared by the renderer, the repeat manager, the
//! rule engine bridge and component decorators.

use crate::captcha::{TokenSource, UnavailableTokenSource};
use crate::config::FormsConfig;
use crate::dom::{Document, Element, WeakElement};
use crate::http::{HttpClient, OfflineClient};
use crate::model::{FieldChangedPayload, FieldHandle, FieldModelRuntime};
use crate::registry::ComponentRegistry;
use crate::schema::FieldDescriptor;
use crate::traits::{LoggingPageHost, PageHost};
use crate::util::IdGenerator;
use log::{debug, warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

pub type SubscriptionCallback = Arc<dyn Fn(&Element, FieldHandle) + Send + Sync>;
pub type FieldChangeListener = Arc<dyn Fn(&FieldChangedPayload) + Send + Sync>;
type FrameCallback = Box<dyn FnOnce() + Send>;

/// Where the definition came from; decides the repeat strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FormSource {
    /// Model-backed adaptive form.
    #[default]
    Aem,
    /// Spreadsheet/document backed form without a rule engine.
    Sheet,
}

impl FormSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormSource::Aem => "aem",
            FormSource::Sheet => "sheet",
        }
    }
}

struct Subscription {
    field_id: String,
    element: WeakElement,
    callback: SubscriptionCallback,
}

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct FormContext {
    form_id: String,
    instance_id: Uuid,
    source: FormSource,
    document: Document,
    config: Arc<FormsConfig>,
    registry: Arc<ComponentRegistry>,
    http: Arc<dyn HttpClient>,
    page: Arc<dyn PageHost>,
    tokens: Arc<dyn TokenSource>,
    ids: IdGenerator,
    model: RwLock<Option<Arc<dyn FieldModelRuntime>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    field_listeners: Mutex<HashMap<String, Vec<FieldChangeListener>>>,
    frames: Mutex<Vec<FrameCallback>>,
    captcha: Mutex<Option<FieldDescriptor>>,
}

impl fmt::Debug for FormContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormContext")
            .field("form_id", &self.form_id)
            .field("instance_id", &self.instance_id)
            .field("source", &self.source)
            .finish()
    }
}

pub struct FormContextBuilder {
    form_id: String,
    source: FormSource,
    document: Document,
    config: Arc<FormsConfig>,
    registry: Arc<ComponentRegistry>,
    http: Arc<dyn HttpClient>,
    page: Arc<dyn PageHost>,
    tokens: Arc<dyn TokenSource>,
}

impl FormContextBuilder {
    pub fn form_id(mut self, form_id: impl Into<String>) -> Self {
        self.form_id = form_id.into();
        self
    }

    pub fn source(mut self, source: FormSource) -> Self {
        self.source = source;
        self
    }

    pub fn config(mut self, config: Arc<FormsConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = http;
        self
    }

    pub fn page(mut self, page: Arc<dyn PageHost>) -> Self {
        self.page = page;
        self
    }

    pub fn tokens(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn build(self) -> Arc<FormContext> {
        Arc::new(FormContext {
            form_id: self.form_id,
            instance_id: Uuid::new_v4(),
            source: self.source,
            document: self.document,
            config: self.config,
            registry: self.registry,
            http: self.http,
            page: self.page,
            tokens: self.tokens,
            ids: IdGenerator::new(),
            model: RwLock::new(None),
            subscriptions: Mutex::new(Vec::new()),
            field_listeners: Mutex::new(HashMap::new()),
            frames: Mutex::new(Vec::new()),
            captcha: Mutex::new(None),
        })
    }
}

impl FormContext {
    pub fn builder(document: Document) -> FormContextBuilder {
        FormContextBuilder {
            form_id: String::new(),
            source: FormSource::Aem,
            document,
            config: Arc::new(FormsConfig::default()),
            registry: Arc::new(ComponentRegistry::new()),
            http: Arc::new(OfflineClient),
            page: Arc::new(LoggingPageHost),
            tokens: Arc::new(UnavailableTokenSource),
        }
    }

    /// A new, empty instance over the same document and collaborators.
    pub fn fresh(&self) -> Arc<FormContext> {
        self.for_form(self.form_id.clone(), self.source)
    }

    /// An instance for another form sharing this document and collaborators.
    pub fn for_form(&self, form_id: impl Into<String>, source: FormSource) -> Arc<FormContext> {
        FormContext::builder(self.document.clone())
            .form_id(form_id)
            .source(source)
            .config(self.config.clone())
            .registry(self.registry.clone())
            .http(self.http.clone())
            .page(self.page.clone())
            .tokens(self.tokens.clone())
            .build()
    }

    pub fn form_id(&self) -> &str {
        &self.form_id
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn source(&self) -> FormSource {
        self.source
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn config(&self) -> &FormsConfig {
        &self.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn http(&self) -> &Arc<dyn HttpClient> {
        &self.http
    }

    pub fn page(&self) -> &Arc<dyn PageHost> {
        &self.page
    }

    pub fn tokens(&self) -> &Arc<dyn TokenSource> {
        &self.tokens
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    // ---- captcha side channel ----

    pub fn set_captcha(&self, field: FieldDescriptor) {
        *guard(&self.captcha) = Some(field);
    }

    pub fn captcha(&self) -> Option<FieldDescriptor> {
        guard(&self.captcha).clone()
    }

    // ---- model ----

    pub fn model(&self) -> Option<Arc<dyn FieldModelRuntime>> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn field(&self, id: &str) -> Option<FieldHandle> {
        self.model().map(|model| FieldHandle::new(model, id))
    }

    /// Binds the live model and replays every registered subscription.
    pub fn attach_model(&self, model: Arc<dyn FieldModelRuntime>) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = Some(model.clone());
        let pending: Vec<(String, WeakElement, SubscriptionCallback)> = guard(&self.subscriptions)
            .iter()
            .map(|s| (s.field_id.clone(), s.element.clone(), s.callback.clone()))
            .collect();
        debug!(
            "Model attached to form '{}', replaying {} subscriptions",
            self.form_id,
            pending.len()
        );
        for (field_id, element, callback) in pending {
            if let Some(element) = element.upgrade() {
                callback(&element, FieldHandle::new(model.clone(), field_id));
            }
        }
    }

    pub fn detach_model(&self) {
        *self.model.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Registers `callback` for the field rendered as `element` (its
    /// `data-id`). Fires at once when a model is already attached, otherwise
    /// when one is.
    pub fn subscribe(&self, element: &Element, callback: SubscriptionCallback) {
        let Some(field_id) = element.data("id") else {
            warn!("Cannot subscribe to an element without data-id: {:?}", element);
            return;
        };
        if let Some(model) = self.model() {
            callback(element, FieldHandle::new(model, field_id.clone()));
        }
        guard(&self.subscriptions).push(Subscription {
            field_id,
            element: element.downgrade(),
            callback,
        });
    }

    // ---- per-field change listeners ----

    pub fn on_field_change(&self, field_id: &str, listener: FieldChangeListener) {
        guard(&self.field_listeners)
            .entry(field_id.to_string())
            .or_default()
            .push(listener);
    }

    /// Delivers an applied change to the listeners of its field.
    pub fn notify_field_changed(&self, payload: &FieldChangedPayload) {
        let listeners: Vec<FieldChangeListener> = guard(&self.field_listeners)
            .get(&payload.field.id)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(payload);
        }
    }

    // ---- deferred work ----

    pub fn request_animation_frame(&self, callback: impl FnOnce() + Send + 'static) {
        guard(&self.frames).push(Box::new(callback));
    }

    pub fn has_pending_frames(&self) -> bool {
        !guard(&self.frames).is_empty()
    }

    /// Runs callbacks queued so far; returns how many ran.
    pub fn run_animation_frame(&self) -> usize {
        let callbacks = std::mem::take(&mut *guard(&self.frames));
        let count = callbacks.len();
        for callback in callbacks {
            callback();
        }
        count
    }
}
