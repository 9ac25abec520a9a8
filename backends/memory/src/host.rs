//! A document of host nodes kept in memory.
//!
//! Nodes live in an index arena and are never freed: detached nodes stay addressable
//! so tests can assert on what happened to them. Every call the reconciler makes is
//! recorded as a [`HostOp`].

use core::fmt::{self, Display, Write as _};
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use eddy_core::{EventHandler, HostConfig, HostUpdate, Microtask, PropValue, Props};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::MemoryHostError;

/// Handle to a node of a [`MemoryHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Position of the node in its document.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One host call, as recorded by [`MemoryHost::take_ops`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum HostOp {
    /// `create_instance`.
    CreateElement {
        /// The new node.
        id: NodeId,
        /// Its tag.
        tag: String,
    },
    /// `create_text_instance`.
    CreateText {
        /// The new node.
        id: NodeId,
        /// Its content.
        text: String,
    },
    /// `append_initial_child`.
    AppendInitial {
        /// The parent being built.
        parent: NodeId,
        /// The appended node.
        child: NodeId,
    },
    /// `append_child_to_container`.
    Append {
        /// The attached parent.
        parent: NodeId,
        /// The appended node.
        child: NodeId,
    },
    /// `insert_child_to_container`.
    Insert {
        /// The attached parent.
        parent: NodeId,
        /// The inserted node.
        child: NodeId,
        /// The node it was inserted before.
        before: NodeId,
    },
    /// `remove_child`.
    Remove {
        /// The former parent.
        parent: NodeId,
        /// The removed node.
        child: NodeId,
    },
    /// `commit_update` with new text.
    SetText {
        /// The updated node.
        id: NodeId,
        /// Its new content.
        text: String,
    },
    /// `commit_update` with new attributes.
    SetProps {
        /// The updated node.
        id: NodeId,
        /// Names of added, changed or removed attributes.
        changed: Vec<String>,
    },
}

#[derive(Debug)]
enum NodeKind {
    Container(String),
    Element { tag: String, props: Props },
    Text(String),
}

#[derive(Debug)]
struct HostNode {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug, Default)]
struct Document {
    nodes: Vec<HostNode>,
    ops: Vec<HostOp>,
    rejected: BTreeSet<String>,
}

impl Document {
    fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(HostNode {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn node(&self, id: NodeId) -> Result<&HostNode, MemoryHostError> {
        self.nodes
            .get(id.index())
            .ok_or(MemoryHostError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HostNode, MemoryHostError> {
        self.nodes
            .get_mut(id.index())
            .ok_or(MemoryHostError::UnknownNode(id))
    }

    fn check_parent(&self, id: NodeId) -> Result<(), MemoryHostError> {
        match self.node(id)?.kind {
            NodeKind::Text(_) => Err(MemoryHostError::NotAParent(id)),
            _ => Ok(()),
        }
    }

    /// Unlinks `child` from whatever parent it has. Appending an attached node moves it.
    fn detach(&mut self, child: NodeId) -> Result<(), MemoryHostError> {
        let Some(parent) = self.node_mut(child)?.parent.take() else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|&id| id != child);
        Ok(())
    }

    fn append(&mut self, parent: NodeId, child: NodeId) -> Result<(), MemoryHostError> {
        self.check_parent(parent)?;
        self.node(child)?;
        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        before: NodeId,
    ) -> Result<(), MemoryHostError> {
        self.check_parent(parent)?;
        self.node(child)?;
        if !self.node(parent)?.children.contains(&before) {
            return Err(MemoryHostError::NotAChild {
                parent,
                child: before,
            });
        }
        self.detach(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let position = siblings
            .iter()
            .position(|&id| id == before)
            .unwrap_or(siblings.len());
        siblings.insert(position, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn remove(&mut self, parent: NodeId, child: NodeId) -> Result<(), MemoryHostError> {
        let siblings = &mut self.node_mut(parent)?.children;
        let Some(position) = siblings.iter().position(|&id| id == child) else {
            return Err(MemoryHostError::NotAChild { parent, child });
        };
        siblings.remove(position);
        self.node_mut(child)?.parent = None;
        Ok(())
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Ok(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Container(_) => self.write_children(node, out),
            NodeKind::Text(text) => escape_into(text, out),
            NodeKind::Element { tag, props } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in props.attrs() {
                    write_attr(name, value, out);
                }
                out.push('>');
                self.write_children(node, out);
                let _ = write!(out, "</{tag}>");
            }
        }
    }

    fn write_children(&self, node: &HostNode, out: &mut String) {
        for &child in &node.children {
            self.write_html(child, out);
        }
    }

    fn snapshot(&self, id: NodeId) -> Value {
        let Ok(node) = self.node(id) else {
            return Value::Null;
        };
        let children: Vec<Value> = node.children.iter().map(|&child| self.snapshot(child)).collect();
        match &node.kind {
            NodeKind::Container(name) => json!({ "container": name, "children": children }),
            NodeKind::Text(text) => Value::String(text.clone()),
            NodeKind::Element { tag, props } => {
                let attrs: Map<String, Value> = props
                    .attrs()
                    .filter(|(_, value)| value.as_handler().is_none())
                    .map(|(name, value)| {
                        (
                            name.to_owned(),
                            serde_json::to_value(value).unwrap_or(Value::Null),
                        )
                    })
                    .collect();
                json!({ "tag": tag, "attrs": attrs, "children": children })
            }
        }
    }

    fn text_into(&self, id: NodeId, out: &mut String) {
        let Ok(node) = self.node(id) else {
            return;
        };
        if let NodeKind::Text(text) = &node.kind {
            out.push_str(text);
        }
        for &child in &node.children {
            self.text_into(child, out);
        }
    }
}

fn write_attr(name: &str, value: &PropValue, out: &mut String) {
    match value {
        PropValue::Null | PropValue::Bool(false) | PropValue::Handler(_) => {}
        PropValue::Bool(true) => {
            out.push(' ');
            out.push_str(name);
        }
        _ => {
            let _ = write!(out, " {name}=\"");
            write_attr_value(value, out);
            out.push('"');
        }
    }
}

fn write_attr_value(value: &PropValue, out: &mut String) {
    match value {
        PropValue::Null | PropValue::Handler(_) => {}
        PropValue::Bool(flag) => {
            let _ = write!(out, "{flag}");
        }
        PropValue::Int(number) => {
            let _ = write!(out, "{number}");
        }
        PropValue::Float(number) => {
            let _ = write!(out, "{number}");
        }
        PropValue::Str(text) => escape_into(text, out),
        PropValue::List(values) => {
            for (position, item) in values.iter().enumerate() {
                if position > 0 {
                    out.push(' ');
                }
                write_attr_value(item, out);
            }
        }
    }
}

fn escape_into(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}

fn changed_attrs(old: &Props, new: &Props) -> Vec<String> {
    let mut changed: Vec<String> = new
        .attrs()
        .filter(|(name, value)| old.get(name) != Some(*value))
        .map(|(name, _)| name.to_owned())
        .collect();
    changed.extend(
        old.attrs()
            .filter(|(name, _)| new.get(name).is_none())
            .map(|(name, _)| name.to_owned()),
    );
    changed.sort();
    changed
}

/// An in-memory host document.
///
/// Cloning yields another handle to the same document, so the reconciler and the
/// test driving it can share one host.
#[derive(Clone, Default)]
pub struct MemoryHost {
    document: Rc<RefCell<Document>>,
    microtasks: Rc<RefCell<VecDeque<Microtask>>>,
}

impl fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryHost")
            .field("nodes", &self.node_count())
            .field("microtasks", &self.pending_microtasks())
            .finish_non_exhaustive()
    }
}

impl MemoryHost {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached container node to mount a root into.
    pub fn create_container(&self, name: impl Into<String>) -> NodeId {
        self.document
            .borrow_mut()
            .push(NodeKind::Container(name.into()))
    }

    /// Makes `create_instance` fail for elements of type `tag`.
    pub fn reject_tag(&self, tag: impl Into<String>) {
        self.document.borrow_mut().rejected.insert(tag.into());
    }

    /// Returns and clears the recorded host calls.
    pub fn take_ops(&self) -> Vec<HostOp> {
        core::mem::take(&mut self.document.borrow_mut().ops)
    }

    /// Number of nodes ever created, detached ones included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.document.borrow().nodes.len()
    }

    /// Children of `id` in document order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.document
            .borrow()
            .node(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Parent of `id`, if attached.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.document.borrow().node(id).ok().and_then(|node| node.parent)
    }

    /// Tag of an element node.
    #[must_use]
    pub fn tag(&self, id: NodeId) -> Option<String> {
        match &self.document.borrow().node(id).ok()?.kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Attributes of an element node.
    #[must_use]
    pub fn props(&self, id: NodeId) -> Option<Props> {
        match &self.document.borrow().node(id).ok()?.kind {
            NodeKind::Element { props, .. } => Some(props.clone()),
            _ => None,
        }
    }

    /// Concatenated text content of `id` and its descendants.
    #[must_use]
    pub fn text_of(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.document.borrow().text_into(id, &mut out);
        out
    }

    /// Serializes the subtree under `id` as markup. Handlers are left out.
    #[must_use]
    pub fn render_to_string(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.document.borrow().write_html(id, &mut out);
        out
    }

    /// A JSON view of the subtree under `id`.
    #[must_use]
    pub fn snapshot(&self, id: NodeId) -> Value {
        self.document.borrow().snapshot(id)
    }

    /// First element under `root` (depth first, `root` included) whose string
    /// attribute `name` equals `value`.
    #[must_use]
    pub fn find_by_attr(&self, root: NodeId, name: &str, value: &str) -> Option<NodeId> {
        let document = self.document.borrow();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = document.node(id).ok()?;
            if let NodeKind::Element { props, .. } = &node.kind {
                if props.get_str(name) == Some(value) {
                    return Some(id);
                }
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// Number of microtasks waiting to run.
    #[must_use]
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// Runs queued microtasks, including the ones they queue, until none are left.
    /// Returns how many ran.
    pub fn flush_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let task = self.microtasks.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, "flushed microtasks");
        }
        ran
    }

    pub(crate) fn handler_path(&self, target: NodeId, event: &str) -> Vec<(NodeId, EventHandler)> {
        let document = self.document.borrow();
        let mut path = Vec::new();
        let mut cursor = Some(target);
        while let Some(id) = cursor {
            let Ok(node) = document.node(id) else {
                break;
            };
            if let NodeKind::Element { props, .. } = &node.kind {
                if let Some(handler) = props.handler(event) {
                    path.push((id, handler.clone()));
                }
            }
            cursor = node.parent;
        }
        path
    }

    fn with_document<R>(
        &self,
        f: impl FnOnce(&mut Document) -> Result<R, MemoryHostError>,
    ) -> Result<R, MemoryHostError> {
        f(&mut self.document.borrow_mut())
    }
}

impl HostConfig for MemoryHost {
    type Instance = NodeId;
    type Error = MemoryHostError;

    fn create_instance(&self, ty: &str, props: &Props) -> Result<NodeId, MemoryHostError> {
        self.with_document(|document| {
            if document.rejected.contains(ty) {
                return Err(MemoryHostError::RejectedTag(ty.to_owned()));
            }
            let id = document.push(NodeKind::Element {
                tag: ty.to_owned(),
                props: props.clone(),
            });
            document.ops.push(HostOp::CreateElement {
                id,
                tag: ty.to_owned(),
            });
            Ok(id)
        })
    }

    fn create_text_instance(&self, text: &str) -> Result<NodeId, MemoryHostError> {
        self.with_document(|document| {
            let id = document.push(NodeKind::Text(text.to_owned()));
            document.ops.push(HostOp::CreateText {
                id,
                text: text.to_owned(),
            });
            Ok(id)
        })
    }

    fn append_initial_child(&self, parent: &NodeId, child: &NodeId) -> Result<(), MemoryHostError> {
        let (parent, child) = (*parent, *child);
        self.with_document(|document| {
            document.append(parent, child)?;
            document.ops.push(HostOp::AppendInitial { parent, child });
            Ok(())
        })
    }

    fn append_child_to_container(
        &self,
        container: &NodeId,
        child: &NodeId,
    ) -> Result<(), MemoryHostError> {
        let (parent, child) = (*container, *child);
        self.with_document(|document| {
            document.append(parent, child)?;
            document.ops.push(HostOp::Append { parent, child });
            Ok(())
        })
    }

    fn insert_child_to_container(
        &self,
        child: &NodeId,
        container: &NodeId,
        before: &NodeId,
    ) -> Result<(), MemoryHostError> {
        let (parent, child, before) = (*container, *child, *before);
        self.with_document(|document| {
            document.insert_before(parent, child, before)?;
            document.ops.push(HostOp::Insert {
                parent,
                child,
                before,
            });
            Ok(())
        })
    }

    fn remove_child(&self, child: &NodeId, container: &NodeId) -> Result<(), MemoryHostError> {
        let (parent, child) = (*container, *child);
        self.with_document(|document| {
            document.remove(parent, child)?;
            document.ops.push(HostOp::Remove { parent, child });
            Ok(())
        })
    }

    fn commit_update(&self, instance: &NodeId, update: HostUpdate<'_>) -> Result<(), MemoryHostError> {
        let id = *instance;
        self.with_document(|document| {
            let node = document.node_mut(id)?;
            let op = match (&mut node.kind, update) {
                (NodeKind::Text(text), HostUpdate::Text { new, .. }) => {
                    new.clone_into(text);
                    HostOp::SetText {
                        id,
                        text: new.to_owned(),
                    }
                }
                (NodeKind::Element { props, .. }, HostUpdate::Props { old, new, .. }) => {
                    new.clone_into(props);
                    HostOp::SetProps {
                        id,
                        changed: changed_attrs(old, new),
                    }
                }
                (_, HostUpdate::Text { .. }) => {
                    return Err(MemoryHostError::KindMismatch {
                        id,
                        expected: "a text node",
                    });
                }
                (_, HostUpdate::Props { .. }) => {
                    return Err(MemoryHostError::KindMismatch {
                        id,
                        expected: "an element",
                    });
                }
            };
            document.ops.push(op);
            Ok(())
        })
    }

    fn schedule_microtask(&self, task: Microtask) {
        self.microtasks.borrow_mut().push_back(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_moves_attached_nodes() {
        let host = MemoryHost::new();
        let left = host.create_container("left");
        let right = host.create_container("right");
        let text = host.create_text_instance("hi").unwrap();

        host.append_child_to_container(&left, &text).unwrap();
        host.append_child_to_container(&right, &text).unwrap();

        assert!(host.children(left).is_empty());
        assert_eq!(host.children(right), vec![text]);
        assert_eq!(host.parent(text), Some(right));
    }

    #[test]
    fn insert_requires_reference_child() {
        let host = MemoryHost::new();
        let container = host.create_container("root");
        let a = host.create_text_instance("a").unwrap();
        let b = host.create_text_instance("b").unwrap();

        let err = host.insert_child_to_container(&a, &container, &b).unwrap_err();
        assert_eq!(
            err,
            MemoryHostError::NotAChild {
                parent: container,
                child: b
            }
        );

        host.append_child_to_container(&container, &b).unwrap();
        host.insert_child_to_container(&a, &container, &b).unwrap();
        assert_eq!(host.text_of(container), "ab");
    }

    #[test]
    fn markup_skips_handlers_and_escapes() {
        let host = MemoryHost::new();
        let container = host.create_container("root");
        let props = Props::new()
            .with("id", "x&y")
            .with("hidden", true)
            .with("onClick", EventHandler::new(|_| {}));
        let div = host.create_instance("div", &props).unwrap();
        let text = host.create_text_instance("1 < 2").unwrap();
        host.append_initial_child(&div, &text).unwrap();
        host.append_child_to_container(&container, &div).unwrap();

        assert_eq!(
            host.render_to_string(container),
            "<div hidden id=\"x&amp;y\">1 &lt; 2</div>"
        );
        assert_eq!(
            host.snapshot(div),
            json!({ "tag": "div", "attrs": { "hidden": true, "id": "x&y" }, "children": ["1 < 2"] })
        );
    }

    #[test]
    fn prop_updates_record_changed_names() {
        let host = MemoryHost::new();
        let old = Props::new().with("a", 1).with("b", 2);
        let new = Props::new().with("a", 1).with("c", 3);
        let div = host.create_instance("div", &old).unwrap();
        host.take_ops();

        host.commit_update(
            &div,
            HostUpdate::Props {
                ty: "div",
                old: &old,
                new: &new,
            },
        )
        .unwrap();

        assert_eq!(
            host.take_ops(),
            vec![HostOp::SetProps {
                id: div,
                changed: vec!["b".to_owned(), "c".to_owned()],
            }]
        );
        assert_eq!(host.props(div), Some(new));
    }

    #[test]
    fn text_update_on_element_is_rejected() {
        let host = MemoryHost::new();
        let div = host.create_instance("div", &Props::new()).unwrap();
        let err = host
            .commit_update(&div, HostUpdate::Text { old: "", new: "x" })
            .unwrap_err();
        assert!(matches!(err, MemoryHostError::KindMismatch { .. }));
    }

    #[test]
    fn microtasks_run_in_order_until_drained() {
        let host = MemoryHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let inner_host = host.clone();
        let inner_log = log.clone();
        host.schedule_microtask(Box::new(move || {
            inner_log.borrow_mut().push(1);
            let nested_log = inner_log.clone();
            inner_host.schedule_microtask(Box::new(move || nested_log.borrow_mut().push(3)));
        }));
        let second = log.clone();
        host.schedule_microtask(Box::new(move || second.borrow_mut().push(2)));

        assert_eq!(host.flush_microtasks(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
    }
}
