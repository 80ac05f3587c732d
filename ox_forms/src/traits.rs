use crate::context::FormContext;
use crate::dom::Element;
use crate::schema::FieldDescriptor;
use anyhow::Error;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;

/// Upgrades a rendered field or panel after the core rendition, e.g. turning
/// a panel into a modal dialog or an accordion.
#[async_trait]
pub trait ComponentDecorator: Send + Sync {
    /// Name the decorator is registered under (`fd:viewType` or the last
    /// segment of `:type`).
    fn component_name(&self) -> &str;

    async fn decorate(
        &self,
        element: &Element,
        field: &FieldDescriptor,
        container: Option<&Element>,
        ctx: &Arc<FormContext>,
    ) -> Result<(), Error>;
}

/// Page-level side effects the form may trigger.
pub trait PageHost: Send + Sync {
    /// Blocking, author-facing notification.
    fn alert(&self, message: &str);
    fn navigate(&self, url: &str);
}

/// Host that only records effects in the log.
#[derive(Default)]
pub struct LoggingPageHost;

impl PageHost for LoggingPageHost {
    fn alert(&self, message: &str) {
        warn!("alert: {}", message);
    }

    fn navigate(&self, url: &str) {
        info!("navigate: {}", url);
    }
}
