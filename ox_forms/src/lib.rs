pub mod captcha;
pub mod config;
pub mod constraints;
pub mod context;
pub mod decode;
pub mod dom;
pub mod error;
pub mod fields;
pub mod form;
pub mod http;
pub mod model;
pub mod registry;
pub mod render;
pub mod repeat;
pub mod schema;
pub mod submit;
pub mod traits;
pub mod util;
pub mod validation;

pub use config::{ErrorMessages, FormsConfig};
pub use context::{FormContext, FormSource};
pub use decode::{add_request_context, decode, decode_definition, RequestEnvironment, StaticRequest};
pub use dom::{Document, Element, EventKind};
pub use error::FormError;
pub use form::{create_form, create_form_for_authoring, RenderedForm};
pub use http::{HttpClient, HttpResponse, OfflineClient, ReqwestClient};
pub use model::{Action, Change, FieldChangedPayload, FieldHandle, FieldModelRuntime, ModelError, ModelEvent, Property};
pub use registry::ComponentRegistry;
pub use render::{ItemAccessor, RenditionGenerator};
pub use schema::{FieldDescriptor, FieldItem, FieldType, FormDefinition, Label};
pub use traits::{ComponentDecorator, PageHost};

#[cfg(test)]
mod tests;
