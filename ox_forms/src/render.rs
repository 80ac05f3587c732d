//! Rendition generator: walks a definition tree and builds the DOM for it.

use crate::context::FormContext;
use crate::dom::Element;
use crate::error::FormError;
use crate::fields::{
    apply_remote_options, col_span_decorator, create_captcha_placeholder, decorate_panel_container,
    render_field,
};
use crate::schema::{FieldDescriptor, FieldItem, FieldType};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use log::{debug, warn};
use serde_json::Value;
use std::sync::Arc;

/// How a panel's children are read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ItemAccessor {
    /// The `items` array.
    #[default]
    Items,
    /// `:items` in `:itemsOrder` order (authoring export).
    AuthoringOrder,
}

impl ItemAccessor {
    pub fn children(&self, panel: &FieldDescriptor) -> Vec<FieldItem> {
        match self {
            ItemAccessor::Items => panel.items.clone().unwrap_or_default(),
            ItemAccessor::AuthoringOrder => {
                let (Some(order), Some(items)) = (&panel.items_order, &panel.authored_items) else {
                    return Vec::new();
                };
                order
                    .iter()
                    .filter_map(|key| items.get(key))
                    .map(|raw| match serde_json::from_value::<FieldDescriptor>(raw.clone()) {
                        Ok(fd) => FieldItem::from(fd),
                        Err(_) => FieldItem::Malformed(raw.clone()),
                    })
                    .collect()
            }
        }
    }
}

pub struct RenditionGenerator {
    ctx: Arc<FormContext>,
    accessor: ItemAccessor,
}

impl RenditionGenerator {
    pub fn new(ctx: Arc<FormContext>) -> Self {
        Self {
            ctx,
            accessor: ItemAccessor::Items,
        }
    }

    pub fn with_accessor(mut self, accessor: ItemAccessor) -> Self {
        self.accessor = accessor;
        self
    }

    /// Renders `panel`'s children into `container`. Children render
    /// concurrently and are appended in definition order.
    pub fn generate<'a>(&'a self, panel: &'a FieldDescriptor, container: &'a Element) -> BoxFuture<'a, ()> {
        async move {
            let children = self.accessor.children(panel);
            let rendered = join_all(children.iter().map(|item| self.render_item(item, container))).await;
            for element in rendered.into_iter().flatten() {
                container.append(&element);
            }
            decorate_panel_container(self.ctx.document(), panel, container);
            self.ctx.registry().decorate(container, panel, None, &self.ctx).await;
        }
        .boxed()
    }

    /// Owned variant of [`generate`](Self::generate) for work that outlives
    /// the caller's borrows (in-flight repeat renders).
    pub fn generate_owned(
        ctx: Arc<FormContext>,
        panel: FieldDescriptor,
        container: Element,
    ) -> BoxFuture<'static, ()> {
        async move {
            RenditionGenerator::new(ctx).generate(&panel, &container).await;
        }
        .boxed()
    }

    async fn render_item(&self, item: &FieldItem, container: &Element) -> Option<Element> {
        let Some(field) = item.as_field() else {
            warn!(
                "Skipping malformed child of '{}' in form '{}'",
                container.data("id").unwrap_or_default(),
                self.ctx.form_id()
            );
            return None;
        };
        let mut field = field.clone();
        if field.value.is_none() {
            field.value = Some(Value::String(String::new()));
        }
        self.render_child(&field, container).await
    }

    /// Renders one descriptor (and its subtree when it is a panel).
    pub async fn render_child(&self, field: &FieldDescriptor, container: &Element) -> Option<Element> {
        let doc = self.ctx.document();
        if field.kind() == FieldType::Captcha {
            self.ctx.set_captcha(field.clone());
            return Some(create_captcha_placeholder(doc, field));
        }
        let rendered = render_field(&self.ctx, field);
        let element = rendered.element;
        if let Some(classes) = &field.applied_css_class_names {
            for class in classes.split_whitespace() {
                element.add_class(class);
            }
        }
        col_span_decorator(field, &element);
        if let Some((select, url)) = rendered.remote_options {
            self.load_options(field, &select, &url).await;
        }
        if field.kind().is_container() {
            self.generate(field, &element).await;
            return Some(element);
        }
        self.ctx
            .registry()
            .decorate(&element, field, Some(container), &self.ctx)
            .await;
        Some(element)
    }

    async fn load_options(&self, field: &FieldDescriptor, select: &Element, url: &str) {
        let fetched = self.ctx.http().get(url).await.and_then(|response| {
            if response.is_success() {
                response.json()
            } else {
                Err(FormError::network(url, format!("status {}", response.status)))
            }
        });
        let sheet = match fetched {
            Ok(sheet) => sheet,
            Err(e) => {
                warn!("Options for '{}' unavailable: {}", field.id, e);
                return;
            }
        };
        let count = apply_remote_options(self.ctx.document(), select, field, &sheet);
        debug!("Loaded {} options for '{}' from {}", count, field.id, url);
    }
}
