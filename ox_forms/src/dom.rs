//! A small, thread-safe document model.
//!
//! Nodes live in an arena owned by a [`Document`]; an [`Element`] is a cheap
//! handle (document + node id). Only the subset of DOM behaviour the form
//! engine relies on is modelled: attributes and dataset, value/checked
//! properties, tree mutation, predicate queries, focus tracking, dialogs,
//! custom validity and bubbling event listeners.
//!
//! Listeners are stored inside the arena, so closures should capture
//! [`WeakElement`]s rather than [`Element`]s to avoid keeping the document
//! alive through itself.
//!
//! Arena slots are never reused. Detaching a node keeps its subtree intact
//! for reinsertion; [`Element::release`] frees the contents of a subtree that
//! is gone for good (a replaced form, a removed repeat instance).

use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

pub type NodeId = usize;

const BODY: NodeId = 0;
const TEXT_TAG: &str = "#text";
const RAW_TAG: &str = "#raw";
const VOID_TAGS: &[&str] = &["input", "img", "br", "hr", "source", "meta", "link"];

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    Change,
    Input,
    Focus,
    FocusIn,
    Blur,
    Click,
    TouchStart,
    Submit,
    Reset,
    Invalid,
    Close,
    ItemAdd,
}

impl EventKind {
    pub fn bubbles(&self) -> bool {
        matches!(
            self,
            EventKind::Change
                | EventKind::Input
                | EventKind::FocusIn
                | EventKind::Click
                | EventKind::Submit
                | EventKind::Reset
        )
    }
}

#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub target: Element,
    pub detail: Value,
}

pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

#[derive(Default)]
struct Node {
    tag: String,
    text: String,
    attrs: Vec<(String, String)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    value: Option<String>,
    checked: Option<bool>,
    custom_validity: String,
    listeners: Vec<(EventKind, Listener)>,
}

impl Node {
    fn element(tag: &str) -> Self {
        Node {
            tag: tag.to_ascii_lowercase(),
            ..Default::default()
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    fn set_attr(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == name) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((name.to_string(), value.to_string())),
        }
    }

    fn remove_attr(&mut self, name: &str) {
        self.attrs.retain(|(k, _)| k != name);
    }
}

#[derive(Default)]
struct Arena {
    nodes: Vec<Node>,
    active: Option<NodeId>,
    scrolled: Vec<NodeId>,
}

impl Arena {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id].parent.take() {
            self.nodes[parent].children.retain(|c| *c != id);
        }
    }

    /// Drops the contents of `id` and its subtree. Slots are not reused, so
    /// stale handles keep pointing at an empty detached node.
    fn release(&mut self, id: NodeId) -> Vec<Node> {
        self.detach(id);
        let mut freed = Vec::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let mut node = std::mem::take(&mut self.nodes[id]);
            pending.append(&mut node.children);
            if self.active == Some(id) {
                self.active = None;
            }
            freed.push(node);
        }
        freed
    }

    fn text_of(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match node.tag.as_str() {
            TEXT_TAG => out.push_str(&node.text),
            RAW_TAG => out.push_str(&strip_markup(&node.text)),
            _ => {
                for child in &node.children {
                    self.text_of(*child, out);
                }
            }
        }
    }

    fn is_ancestor(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        while let Some(parent) = self.nodes[id].parent {
            if parent == ancestor {
                return true;
            }
            id = parent;
        }
        false
    }

    fn copy(&mut self, id: NodeId, deep: bool) -> NodeId {
        let source = &self.nodes[id];
        let node = Node {
            tag: source.tag.clone(),
            text: source.text.clone(),
            attrs: source.attrs.clone(),
            value: source.value.clone(),
            checked: source.checked,
            custom_validity: source.custom_validity.clone(),
            ..Default::default()
        };
        let children = if deep { source.children.clone() } else { Vec::new() };
        let copy = self.push(node);
        for child in children {
            let child_copy = self.copy(child, true);
            self.nodes[child_copy].parent = Some(copy);
            self.nodes[copy].children.push(child_copy);
        }
        copy
    }

    fn serialize(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match node.tag.as_str() {
            TEXT_TAG => out.push_str(&escape(&node.text)),
            RAW_TAG => out.push_str(&node.text),
            tag => {
                out.push('<');
                out.push_str(tag);
                for (k, v) in &node.attrs {
                    if k == "value" && node.value.is_some() {
                        continue;
                    }
                    if k == "checked" && node.checked.is_some() {
                        continue;
                    }
                    out.push(' ');
                    out.push_str(k);
                    if !v.is_empty() {
                        out.push_str("=\"");
                        out.push_str(&escape(v));
                        out.push('"');
                    }
                }
                if tag == "input" {
                    if let Some(value) = &node.value {
                        out.push_str(" value=\"");
                        out.push_str(&escape(value));
                        out.push('"');
                    }
                }
                if node.checked == Some(true) {
                    out.push_str(" checked");
                }
                out.push('>');
                if VOID_TAGS.contains(&tag) {
                    return;
                }
                if tag == "textarea" {
                    if let Some(value) = &node.value {
                        out.push_str(&escape(value));
                        out.push_str("</textarea>");
                        return;
                    }
                }
                for child in &node.children {
                    self.serialize(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn lock(inner: &Mutex<Arena>) -> MutexGuard<'_, Arena> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// `repeatAddButtonLabel` -> `repeat-add-button-label`
pub fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Clone)]
pub struct Document {
    inner: Arc<Mutex<Arena>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let mut arena = Arena::default();
        arena.push(Node::element("body"));
        Self {
            inner: Arc::new(Mutex::new(arena)),
        }
    }

    pub fn body(&self) -> Element {
        self.handle(BODY)
    }

    pub fn create_element(&self, tag: &str) -> Element {
        let id = lock(&self.inner).push(Node::element(tag));
        self.handle(id)
    }

    pub fn create_text(&self, text: &str) -> Element {
        let node = Node {
            tag: TEXT_TAG.to_string(),
            text: text.to_string(),
            ..Default::default()
        };
        let id = lock(&self.inner).push(node);
        self.handle(id)
    }

    pub fn active_element(&self) -> Option<Element> {
        let active = lock(&self.inner).active;
        active.map(|id| self.handle(id))
    }

    /// Elements that were scrolled into view, oldest first.
    pub fn scrolled(&self) -> Vec<Element> {
        let ids = lock(&self.inner).scrolled.clone();
        ids.into_iter().map(|id| self.handle(id)).collect()
    }

    pub fn same(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn handle(&self, id: NodeId) -> Element {
        Element {
            doc: self.clone(),
            id,
        }
    }

    fn arena(&self) -> MutexGuard<'_, Arena> {
        lock(&self.inner)
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.arena().nodes.len())
            .finish()
    }
}

#[derive(Clone)]
pub struct Element {
    doc: Document,
    id: NodeId,
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.doc.same(&other.doc)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arena = self.doc.arena();
        let node = &arena.nodes[self.id];
        write!(f, "<{}", node.tag)?;
        if let Some(id) = node.attr("id") {
            write!(f, " id=\"{id}\"")?;
        }
        if let Some(class) = node.attr("class") {
            write!(f, " class=\"{class}\"")?;
        }
        write!(f, "> #{}", self.id)
    }
}

/// Non-owning handle for use inside listeners.
#[derive(Clone)]
pub struct WeakElement {
    doc: Weak<Mutex<Arena>>,
    id: NodeId,
}

impl WeakElement {
    pub fn upgrade(&self) -> Option<Element> {
        self.doc.upgrade().map(|inner| Element {
            doc: Document { inner },
            id: self.id,
        })
    }
}

impl Element {
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn downgrade(&self) -> WeakElement {
        WeakElement {
            doc: Arc::downgrade(&self.doc.inner),
            id: self.id,
        }
    }

    fn wrap(&self, id: NodeId) -> Element {
        self.doc.handle(id)
    }

    pub fn tag(&self) -> String {
        self.doc.arena().nodes[self.id].tag.clone()
    }

    pub fn is(&self, tag: &str) -> bool {
        self.doc.arena().nodes[self.id].tag == tag
    }

    pub fn is_text(&self) -> bool {
        let arena = self.doc.arena();
        let tag = arena.nodes[self.id].tag.as_str();
        tag == TEXT_TAG || tag == RAW_TAG
    }

    // ---- attributes ----

    pub fn attr(&self, name: &str) -> Option<String> {
        self.doc.arena().nodes[self.id].attr(name).map(str::to_string)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.doc.arena().nodes[self.id].attr(name).is_some()
    }

    pub fn set_attr(&self, name: &str, value: &str) {
        self.doc.arena().nodes[self.id].set_attr(name, value);
    }

    pub fn remove_attr(&self, name: &str) {
        self.doc.arena().nodes[self.id].remove_attr(name);
    }

    pub fn toggle_attr(&self, name: &str, on: bool) {
        if on {
            if !self.has_attr(name) {
                self.set_attr(name, "");
            }
        } else {
            self.remove_attr(name);
        }
    }

    pub fn id_attr(&self) -> Option<String> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn set_id(&self, id: &str) {
        self.set_attr("id", id);
    }

    pub fn name(&self) -> String {
        self.attr("name").unwrap_or_default()
    }

    pub fn input_type(&self) -> String {
        self.attr("type").unwrap_or_default()
    }

    // ---- dataset ----

    pub fn data(&self, key: &str) -> Option<String> {
        self.attr(&format!("data-{}", kebab_case(key)))
    }

    pub fn set_data(&self, key: &str, value: impl ToString) {
        self.set_attr(&format!("data-{}", kebab_case(key)), &value.to_string());
    }

    pub fn remove_data(&self, key: &str) {
        self.remove_attr(&format!("data-{}", kebab_case(key)));
    }

    // ---- classes ----

    pub fn classes(&self) -> Vec<String> {
        self.attr("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().iter().any(|c| c == class)
    }

    pub fn add_class(&self, class: &str) {
        let mut classes = self.classes();
        for c in class.split_whitespace() {
            if !classes.iter().any(|existing| existing == c) {
                classes.push(c.to_string());
            }
        }
        self.set_attr("class", &classes.join(" "));
    }

    pub fn remove_class(&self, class: &str) {
        let classes: Vec<String> = self.classes().into_iter().filter(|c| c != class).collect();
        if classes.is_empty() {
            self.remove_attr("class");
        } else {
            self.set_attr("class", &classes.join(" "));
        }
    }

    /// Returns whether the class is present afterwards.
    pub fn toggle_class(&self, class: &str, force: Option<bool>) -> bool {
        let on = force.unwrap_or(!self.has_class(class));
        if on {
            self.add_class(class);
        } else {
            self.remove_class(class);
        }
        on
    }

    // ---- properties ----

    pub fn value(&self) -> String {
        if self.is("select") {
            return self
                .query_all(|e| e.is("option"))
                .into_iter()
                .find(|o| o.has_attr("selected"))
                .map(|o| o.option_value())
                .unwrap_or_default();
        }
        let arena = self.doc.arena();
        let node = &arena.nodes[self.id];
        if let Some(value) = &node.value {
            return value.clone();
        }
        if node.tag == "textarea" {
            let mut out = String::new();
            arena.text_of(self.id, &mut out);
            return out;
        }
        match node.attr("value") {
            Some(v) => v.to_string(),
            None if node.attr("type") == Some("checkbox") || node.attr("type") == Some("radio") => {
                "on".to_string()
            }
            None => String::new(),
        }
    }

    pub fn set_value(&self, value: &str) {
        if self.is("select") {
            for option in self.query_all(|e| e.is("option")) {
                option.toggle_attr("selected", option.option_value() == value);
            }
            return;
        }
        self.doc.arena().nodes[self.id].value = Some(value.to_string());
    }

    fn option_value(&self) -> String {
        self.attr("value").unwrap_or_else(|| self.text_content())
    }

    pub fn checked(&self) -> bool {
        let arena = self.doc.arena();
        let node = &arena.nodes[self.id];
        node.checked.unwrap_or_else(|| node.attr("checked").is_some())
    }

    pub fn set_checked(&self, checked: bool) {
        self.doc.arena().nodes[self.id].checked = Some(checked);
    }

    pub fn disabled(&self) -> bool {
        self.has_attr("disabled")
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.toggle_attr("disabled", disabled);
    }

    pub fn custom_validity(&self) -> String {
        self.doc.arena().nodes[self.id].custom_validity.clone()
    }

    pub fn set_custom_validity(&self, message: &str) {
        self.doc.arena().nodes[self.id].custom_validity = message.to_string();
    }

    // ---- text ----

    pub fn text_content(&self) -> String {
        let arena = self.doc.arena();
        let mut out = String::new();
        arena.text_of(self.id, &mut out);
        out
    }

    pub fn set_text(&self, text: &str) {
        let node = self.doc.create_text(text);
        self.replace_children(&[node]);
    }

    /// Replaces the children with a markup fragment kept verbatim.
    pub fn set_inner_html(&self, html: &str) {
        let node = Node {
            tag: RAW_TAG.to_string(),
            text: html.to_string(),
            ..Default::default()
        };
        let raw = self.doc.arena().push(node);
        let raw = self.wrap(raw);
        self.replace_children(&[raw]);
    }

    pub fn inner_html(&self) -> String {
        let arena = self.doc.arena();
        let mut out = String::new();
        for child in &arena.nodes[self.id].children {
            arena.serialize(*child, &mut out);
        }
        out
    }

    pub fn to_html(&self) -> String {
        let arena = self.doc.arena();
        let mut out = String::new();
        arena.serialize(self.id, &mut out);
        out
    }

    // ---- tree ----

    pub fn parent(&self) -> Option<Element> {
        let parent = self.doc.arena().nodes[self.id].parent;
        parent.map(|id| self.wrap(id))
    }

    /// Child elements, text nodes excluded.
    pub fn children(&self) -> Vec<Element> {
        self.child_nodes().into_iter().filter(|c| !c.is_text()).collect()
    }

    pub fn child_nodes(&self) -> Vec<Element> {
        let ids = self.doc.arena().nodes[self.id].children.clone();
        ids.into_iter().map(|id| self.wrap(id)).collect()
    }

    pub fn first_child(&self) -> Option<Element> {
        self.child_nodes().into_iter().next()
    }

    pub fn next_sibling(&self) -> Option<Element> {
        let parent = self.parent()?;
        parent
            .children()
            .into_iter()
            .skip_while(|c| c != self)
            .nth(1)
    }

    pub fn append(&self, child: &Element) {
        let mut arena = self.doc.arena();
        if child.id == self.id || arena.is_ancestor(child.id, self.id) {
            return;
        }
        arena.detach(child.id);
        arena.nodes[child.id].parent = Some(self.id);
        arena.nodes[self.id].children.push(child.id);
    }

    pub fn append_all(&self, children: &[Element]) {
        for child in children {
            self.append(child);
        }
    }

    pub fn prepend(&self, child: &Element) {
        let mut arena = self.doc.arena();
        if child.id == self.id || arena.is_ancestor(child.id, self.id) {
            return;
        }
        arena.detach(child.id);
        arena.nodes[child.id].parent = Some(self.id);
        arena.nodes[self.id].children.insert(0, child.id);
    }

    /// Inserts `node` as the previous sibling of `self`.
    pub fn before(&self, node: &Element) {
        self.insert_adjacent(node, 0);
    }

    /// Inserts `node` as the next sibling of `self`.
    pub fn after(&self, node: &Element) {
        self.insert_adjacent(node, 1);
    }

    fn insert_adjacent(&self, node: &Element, offset: usize) {
        let mut arena = self.doc.arena();
        let Some(parent) = arena.nodes[self.id].parent else {
            return;
        };
        if node.id == self.id || arena.is_ancestor(node.id, parent) || node.id == parent {
            return;
        }
        arena.detach(node.id);
        let position = arena.nodes[parent]
            .children
            .iter()
            .position(|c| *c == self.id)
            .unwrap_or(0);
        arena.nodes[node.id].parent = Some(parent);
        arena.nodes[parent].children.insert(position + offset, node.id);
    }

    pub fn remove(&self) {
        self.doc.arena().detach(self.id);
    }

    /// Removes the node and frees its subtree: children, attributes and
    /// listeners are dropped. Use for nodes that are never reinserted.
    pub fn release(&self) {
        if self.id == BODY {
            return;
        }
        // Listener captures are dropped after the arena lock is released.
        let freed = self.doc.arena().release(self.id);
        drop(freed);
    }

    pub fn replace_with(&self, node: &Element) {
        if node == self {
            return;
        }
        self.before(node);
        self.remove();
    }

    pub fn replace_children(&self, children: &[Element]) {
        self.clear();
        self.append_all(children);
    }

    pub fn clear(&self) {
        let mut arena = self.doc.arena();
        let children = std::mem::take(&mut arena.nodes[self.id].children);
        for child in children {
            arena.nodes[child].parent = None;
        }
    }

    /// Copies the node (and its subtree when `deep`); listeners are not copied.
    pub fn clone_node(&self, deep: bool) -> Element {
        let id = self.doc.arena().copy(self.id, deep);
        self.wrap(id)
    }

    pub fn contains(&self, other: &Element) -> bool {
        other == self || self.doc.arena().is_ancestor(self.id, other.id)
    }

    pub fn is_connected(&self) -> bool {
        self.id == BODY || self.doc.arena().is_ancestor(BODY, self.id)
    }

    // ---- queries ----

    /// First descendant (document order) matching the predicate.
    pub fn query(&self, predicate: impl Fn(&Element) -> bool) -> Option<Element> {
        let mut stack: Vec<Element> = self.children().into_iter().rev().collect();
        while let Some(el) = stack.pop() {
            if predicate(&el) {
                return Some(el);
            }
            stack.extend(el.children().into_iter().rev());
        }
        None
    }

    pub fn query_all(&self, predicate: impl Fn(&Element) -> bool) -> Vec<Element> {
        let mut found = Vec::new();
        let mut stack: Vec<Element> = self.children().into_iter().rev().collect();
        while let Some(el) = stack.pop() {
            if predicate(&el) {
                found.push(el.clone());
            }
            stack.extend(el.children().into_iter().rev());
        }
        found
    }

    /// Self or nearest ancestor matching the predicate.
    pub fn closest(&self, predicate: impl Fn(&Element) -> bool) -> Option<Element> {
        let mut current = Some(self.clone());
        while let Some(el) = current {
            if !el.is_text() && predicate(&el) {
                return Some(el);
            }
            current = el.parent();
        }
        None
    }

    pub fn by_id(&self, id: &str) -> Option<Element> {
        self.query(|e| e.attr("id").as_deref() == Some(id))
    }

    // ---- focus, scrolling, dialogs ----

    pub fn focus(&self) {
        self.doc.arena().active = Some(self.id);
        self.dispatch(EventKind::Focus, Value::Null);
        self.dispatch(EventKind::FocusIn, Value::Null);
    }

    pub fn blur(&self) {
        {
            let mut arena = self.doc.arena();
            if arena.active == Some(self.id) {
                arena.active = None;
            }
        }
        self.dispatch(EventKind::Blur, Value::Null);
    }

    pub fn is_focused(&self) -> bool {
        self.doc.arena().active == Some(self.id)
    }

    pub fn scroll_into_view(&self) {
        self.doc.arena().scrolled.push(self.id);
    }

    pub fn is_open(&self) -> bool {
        self.has_attr("open")
    }

    pub fn show_modal(&self) {
        self.toggle_attr("open", true);
    }

    /// Closes an open dialog and fires `close`.
    pub fn close(&self) {
        if self.is_open() {
            self.remove_attr("open");
            self.dispatch(EventKind::Close, Value::Null);
        }
    }

    // ---- events ----

    pub fn add_listener(&self, kind: EventKind, listener: impl Fn(&Event) + Send + Sync + 'static) {
        self.doc.arena().nodes[self.id]
            .listeners
            .push((kind, Arc::new(listener)));
    }

    pub fn dispatch(&self, kind: EventKind, detail: Value) {
        let event = Event {
            kind: kind.clone(),
            target: self.clone(),
            detail,
        };
        let mut current = Some(self.id);
        while let Some(id) = current {
            let (listeners, parent) = {
                let arena = self.doc.arena();
                let node = &arena.nodes[id];
                let listeners: Vec<Listener> = node
                    .listeners
                    .iter()
                    .filter(|(k, _)| *k == kind)
                    .map(|(_, l)| l.clone())
                    .collect();
                (listeners, node.parent)
            };
            for listener in listeners {
                listener(&event);
            }
            current = if kind.bubbles() { parent } else { None };
        }
    }

    pub fn click(&self) {
        self.dispatch(EventKind::Click, Value::Null);
    }
}

/// Element constructor helper: `el(&doc, "div").class("x").attr("id", "y")`.
pub struct ElementBuilder {
    element: Element,
}

impl ElementBuilder {
    pub fn class(self, class: &str) -> Self {
        self.element.add_class(class);
        self
    }

    pub fn attr(self, name: &str, value: &str) -> Self {
        self.element.set_attr(name, value);
        self
    }

    pub fn text(self, text: &str) -> Self {
        self.element.set_text(text);
        self
    }

    pub fn build(self) -> Element {
        self.element
    }
}

pub fn el(doc: &Document, tag: &str) -> ElementBuilder {
    ElementBuilder {
        element: doc.create_element(tag),
    }
}
