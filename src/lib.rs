pub mod block;
pub mod fetch;
pub mod sheet;

pub use block::{decorate, render_sheet_form, resolve_action, DecoratedForm, PageLocation};
pub use fetch::{extract_code_block, extract_form_definition, fetch_form, form_url};
pub use sheet::{is_document_based, transform, SheetRow};
