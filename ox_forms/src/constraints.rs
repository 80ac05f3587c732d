use crate::dom::Element;
use crate::schema::{is_truthy, value_to_string, ConstraintKind, FieldDescriptor};
use serde_json::Value;

/// Native constraint attributes for a field, derived from its type. Only
/// constraints that are set (truthy) are returned.
pub fn constraint_attributes(fd: &FieldDescriptor) -> Vec<(&'static str, String)> {
    let candidates: Vec<(&'static str, Option<&Value>)> = match fd.kind().constraint_kind() {
        ConstraintKind::Text => vec![
            ("maxlength", fd.max_length.as_ref()),
            ("minlength", fd.min_length.as_ref()),
            ("pattern", fd.pattern.as_ref()),
        ],
        ConstraintKind::Numeric => vec![
            ("max", fd.maximum.as_ref()),
            ("min", fd.minimum.as_ref()),
            ("step", fd.step.as_ref()),
        ],
        ConstraintKind::File => vec![
            ("accept", fd.accept.as_ref()),
            ("multiple", fd.multiple.as_ref()),
        ],
        ConstraintKind::Panel => vec![
            ("data-max", fd.max_occur.as_ref()),
            ("data-min", fd.min_occur.as_ref()),
        ],
        ConstraintKind::Unconstrained => Vec::new(),
    };
    candidates
        .into_iter()
        .filter_map(|(attr, value)| {
            value
                .filter(|v| is_truthy(v))
                .map(|v| (attr, value_to_string(v)))
        })
        .collect()
}

pub fn set_constraints(element: &Element, fd: &FieldDescriptor) {
    for (attr, value) in constraint_attributes(fd) {
        element.set_attr(attr, &value);
    }
}
