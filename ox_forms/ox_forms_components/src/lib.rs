//! Standard form components, applied through the renderer's decorator hook
//! (`fd:viewType` or the last segment of `:type`).

pub mod accordion;
pub mod modal;
pub mod password;

use log::debug;
use ox_forms::registry::ComponentRegistry;
use std::sync::Arc;

pub use accordion::{decorate_accordion, handle_accordion_navigation, AccordionComponent};
pub use modal::{Modal, ModalComponent};
pub use password::{password_layout, PasswordComponent};

pub fn register_standard_components(registry: &mut ComponentRegistry) {
    registry.register(Arc::new(ModalComponent));
    registry.register(Arc::new(AccordionComponent));
    registry.register(Arc::new(PasswordComponent));
    debug!("Registered components: {:?}", registry.names());
}

/// Plugin entry point for hosts that load components dynamically.
///
/// # Safety
/// `registry` must be null or point to a live, exclusively borrowed
/// [`ComponentRegistry`].
#[no_mangle]
pub unsafe extern "C" fn ox_forms_plugin_init(registry: *mut ComponentRegistry) -> i32 {
    if registry.is_null() {
        return 1;
    }
    let registry = &mut *registry;
    register_standard_components(registry);
    0
}
