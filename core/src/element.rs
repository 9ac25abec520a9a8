//! Element descriptions.
//!
//! A [`Node`] is the plain description of a desired tree that callers hand to
//! [`Reconciler::update_container`](crate::Reconciler::update_container) and that
//! components return. Descriptions are immutable and cheap to clone: elements and
//! props sit behind `Rc`.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::any::{Any, TypeId, type_name};
use core::fmt::{self, Debug};

use crate::hooks::Hooks;
use crate::update_queue::ShallowMerge;

/// Stable identity of a child among its siblings.
pub type Key = Rc<str>;

/// A description of zero or more children.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
    /// Renders nothing.
    #[default]
    Empty,
    /// A text leaf.
    Text(Rc<str>),
    /// A host element, component or fragment.
    Element(Rc<Element>),
    /// An ordered sequence, reconciled by key.
    List(Vec<Node>),
}

impl Node {
    /// Whether this node renders nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Returns the element if this node is one.
    #[must_use]
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(element) => Some(&**element),
            _ => None,
        }
    }
}

impl From<&str> for Node {
    fn from(value: &str) -> Self {
        Self::Text(value.into())
    }
}

impl From<String> for Node {
    fn from(value: String) -> Self {
        Self::Text(value.into())
    }
}

impl From<Rc<str>> for Node {
    fn from(value: Rc<str>) -> Self {
        Self::Text(value)
    }
}

macro_rules! impl_text_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Node {
                fn from(value: $ty) -> Self {
                    Self::Text(alloc::format!("{value}").into())
                }
            }
        )*
    };
}

impl_text_from_number!(i32, i64, u32, u64, usize, f64);

impl From<Element> for Node {
    fn from(value: Element) -> Self {
        Self::Element(Rc::new(value))
    }
}

impl From<ElementBuilder> for Node {
    fn from(value: ElementBuilder) -> Self {
        Self::Element(Rc::new(value.build()))
    }
}

impl From<Vec<Self>> for Node {
    fn from(value: Vec<Self>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

impl<T: Into<Self>> FromIterator<T> for Node {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::List(iter.into_iter().map(Into::into).collect())
    }
}

/// A single described element.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    ty: ElementType,
    key: Option<Key>,
    props: Rc<Props>,
}

impl Element {
    /// Creates an element from its parts.
    #[must_use]
    pub fn new(ty: ElementType, key: Option<Key>, props: Props) -> Self {
        Self {
            ty,
            key,
            props: Rc::new(props),
        }
    }

    /// The element type.
    #[must_use]
    pub const fn ty(&self) -> &ElementType {
        &self.ty
    }

    /// The explicit key, if any.
    #[must_use]
    pub const fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// The element props, children included.
    #[must_use]
    pub const fn props(&self) -> &Rc<Props> {
        &self.props
    }
}

/// What an element turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    /// A host node with the given tag.
    Host(Rc<str>),
    /// A function component.
    Component(Component),
    /// A transparent group of children.
    Fragment,
}

type RenderFn = dyn Fn(&mut Hooks<'_>, &Props) -> anyhow::Result<Node>;

/// A function component.
///
/// Two components are the same type when they wrap the same Rust function type, so
/// building a `Component` from the same function on every render keeps its state.
#[derive(Clone)]
pub struct Component {
    id: TypeId,
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    /// Wraps a render function, naming the component after the function.
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> anyhow::Result<Node> + 'static,
    {
        let full = type_name::<F>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Self::named(name, render)
    }

    /// Wraps a render function under an explicit display name.
    pub fn named<F>(name: &'static str, render: F) -> Self
    where
        F: Fn(&mut Hooks<'_>, &Props) -> anyhow::Result<Node> + 'static,
    {
        Self {
            id: TypeId::of::<F>(),
            name,
            render: Rc::new(render),
        }
    }

    /// The display name used in diagnostics.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn render(&self, hooks: &mut Hooks<'_>, props: &Props) -> anyhow::Result<Node> {
        (self.render)(hooks, props)
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Component").field(&self.name).finish()
    }
}

/// Callback stored under an `on*` prop.
///
/// The argument is the host's event payload; hosts document what they pass.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&dyn Any)>);

impl EventHandler {
    /// Wraps a callback.
    pub fn new(handler: impl Fn(&dyn Any) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    /// Invokes the callback.
    pub fn call(&self, event: &dyn Any) {
        (self.0)(event);
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl_debug!(EventHandler);

/// Returns the prop name an event handler is stored under: `click` becomes `onClick`.
#[must_use]
pub fn event_prop_name(event: &str) -> String {
    let mut chars = event.chars();
    let mut name = String::from("on");
    if let Some(first) = chars.next() {
        name.extend(first.to_uppercase());
        name.push_str(chars.as_str());
    }
    name
}

/// A single attribute value.
///
/// Equality is identity-like: floats compare by bit pattern and handlers by pointer.
/// The same comparison is used for effect dependencies.
#[derive(Debug, Clone)]
pub enum PropValue {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    Str(Rc<str>),
    /// Ordered list of values.
    List(Vec<PropValue>),
    /// Event callback.
    Handler(EventHandler),
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => a == b,
            _ => false,
        }
    }
}

impl PropValue {
    /// Returns the string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(&**value),
            _ => None,
        }
    }

    /// Returns the handler payload, if any.
    #[must_use]
    pub const fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        Self::Int(value.into())
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::Str(value.into())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::Str(value.into())
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        Self::Str(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        Self::Handler(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for PropValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for PropValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for PropValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Int(value) => serializer.serialize_i64(*value),
            Self::Float(value) => serializer.serialize_f64(*value),
            Self::Str(value) => serializer.serialize_str(value),
            Self::List(values) => serializer.collect_seq(values),
            Self::Handler(_) => serializer.serialize_str("[handler]"),
        }
    }
}

/// Attributes and children of an element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Props {
    attrs: BTreeMap<String, PropValue>,
    children: Node,
}

impl Props {
    /// Empty props.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `self` with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<PropValue>) {
        self.attrs.insert(name.into(), value.into());
    }

    /// Looks up an attribute.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    /// Looks up a string attribute.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PropValue::as_str)
    }

    /// Looks up the handler registered for `event` (`click` reads `onClick`).
    #[must_use]
    pub fn handler(&self, event: &str) -> Option<&EventHandler> {
        self.get(&event_prop_name(event))
            .and_then(PropValue::as_handler)
    }

    /// Iterates attributes in name order.
    pub fn attrs(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.attrs.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// The children description.
    #[must_use]
    pub const fn children(&self) -> &Node {
        &self.children
    }

    /// Replaces the children description.
    pub fn set_children(&mut self, children: impl Into<Node>) {
        self.children = children.into();
    }

    /// Whether both props carry the same attributes, ignoring children.
    #[must_use]
    pub fn same_attributes(&self, other: &Self) -> bool {
        self.attrs == other.attrs
    }
}

impl ShallowMerge for Props {
    fn shallow_merge(&self, partial: &Self) -> Self {
        let mut merged = self.clone();
        for (name, value) in &partial.attrs {
            merged.attrs.insert(name.clone(), value.clone());
        }
        if !partial.children.is_empty() {
            merged.children = partial.children.clone();
        }
        merged
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Props {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.attrs.iter())
    }
}

/// Builder for [`Element`] values. Converts into [`Node`].
#[derive(Debug, Clone)]
#[must_use]
pub struct ElementBuilder {
    ty: ElementType,
    key: Option<Key>,
    props: Props,
    children: Vec<Node>,
    list: bool,
}

impl ElementBuilder {
    /// Starts an element of the given type.
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            props: Props::new(),
            children: Vec::new(),
            list: false,
        }
    }

    /// Sets the key.
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets an attribute.
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.props.set(name, value);
        self
    }

    /// Registers a handler for `event`.
    pub fn on(mut self, event: &str, handler: impl Fn(&dyn Any) + 'static) -> Self {
        self.props
            .set(event_prop_name(event), EventHandler::new(handler));
        self
    }

    /// Appends one child.
    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends a sequence of children. The result is always reconciled as a list,
    /// even when the sequence holds a single item.
    pub fn children<I, N>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self.list = true;
        self
    }

    /// Finishes the element.
    #[must_use]
    pub fn build(self) -> Element {
        let Self {
            ty,
            key,
            mut props,
            mut children,
            list,
        } = self;
        let children = match children.len() {
            0 if !list => Node::Empty,
            1 if !list => children.pop().unwrap_or_default(),
            _ => Node::List(children),
        };
        props.set_children(children);
        Element::new(ty, key, props)
    }
}

/// Starts a host element.
pub fn h(tag: &str) -> ElementBuilder {
    ElementBuilder::new(ElementType::Host(tag.into()))
}

/// Starts a component element.
pub fn component(component: &Component) -> ElementBuilder {
    ElementBuilder::new(ElementType::Component(component.clone()))
}

/// Starts a fragment.
pub fn fragment() -> ElementBuilder {
    ElementBuilder::new(ElementType::Fragment)
}

/// A text leaf.
pub fn text(content: impl Into<Rc<str>>) -> Node {
    Node::Text(content.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut Hooks<'_>, _: &Props) -> anyhow::Result<Node> {
        Ok(Node::Empty)
    }

    fn other(_: &mut Hooks<'_>, _: &Props) -> anyhow::Result<Node> {
        Ok(Node::Empty)
    }

    #[test]
    fn component_identity_follows_function() {
        assert_eq!(Component::new(noop), Component::new(noop));
        assert_ne!(Component::new(noop), Component::new(other));
        assert_eq!(Component::new(noop).name(), "noop");
    }

    #[test]
    fn builder_keeps_single_child_unwrapped() {
        let single = h("p").child("hi").build();
        assert_eq!(single.props().children(), &Node::Text("hi".into()));

        let listed = h("ul").children(["a"]).build();
        assert!(matches!(listed.props().children(), Node::List(items) if items.len() == 1));
    }

    #[test]
    fn handlers_compare_by_identity() {
        let a = EventHandler::new(|_| {});
        let b = EventHandler::new(|_| {});
        assert_eq!(PropValue::from(a.clone()), PropValue::from(a));
        assert_ne!(
            PropValue::Handler(b),
            PropValue::Handler(EventHandler::new(|_| {}))
        );
        assert_eq!(PropValue::Float(f64::NAN), PropValue::Float(f64::NAN));
    }

    #[test]
    fn props_merge_is_shallow() {
        let base = Props::new().with("a", 1).with("b", 2);
        let merged = base.shallow_merge(&Props::new().with("b", 3));
        assert_eq!(merged.get("a"), Some(&PropValue::Int(1)));
        assert_eq!(merged.get("b"), Some(&PropValue::Int(3)));
        assert_eq!(event_prop_name("click"), "onClick");
    }
}
