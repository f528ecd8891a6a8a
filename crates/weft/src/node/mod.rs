use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;

use crate::error::{BoundaryFailure, RenderError};

pub type BoundaryResult = Result<BoundaryOutput, BoundaryFailure>;
pub type BoundaryTask = Box<dyn FnOnce() -> BoxFuture<'static, BoundaryResult> + Send>;
pub type ComponentFn = Box<dyn FnOnce(serde_json::Value) -> Result<Node, RenderError> + Send>;

/// A renderable tree. Every shape the renderer understands is a variant here.
pub enum Node {
    Leaf(Leaf),
    Element(Element),
    List(Vec<Node>),
    Component(Component),
    Boundary(Boundary),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Leaf {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

pub struct Element {
    pub tag: String,
    pub attrs: Vec<(String, AttrValue)>,
    pub children: Vec<Node>,
    /// Trusted markup written verbatim in place of `children`.
    pub inner_html: Option<String>,
}

pub struct Component {
    pub name: String,
    pub props: serde_json::Value,
    pub render: ComponentFn,
}

pub struct Boundary {
    pub fallback: Box<Node>,
    pub task: BoundaryTask,
    pub priority: i32,
    pub needs_activation: bool,
}

/// What a boundary task resolves to.
pub struct BoundaryOutput {
    pub node: Node,
    pub state: Option<ResumeState>,
}

/// Activation state handed to the consumer through the resumability chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeState {
    Value(serde_json::Value),
    Unserializable(String),
}

impl ResumeState {
    pub fn capture<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => Self::Value(value),
            Err(e) => Self::Unserializable(e.to_string()),
        }
    }
}

impl BoundaryOutput {
    pub fn new(node: impl Into<Node>) -> Self {
        Self { node: node.into(), state: None }
    }

    pub fn with_state<T: Serialize + ?Sized>(mut self, state: &T) -> Self {
        self.state = Some(ResumeState::capture(state));
        self
    }
}

impl From<Node> for BoundaryOutput {
    fn from(node: Node) -> Self {
        Self::new(node)
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Leaf(Leaf::Text(text.into()))
    }

    pub fn empty() -> Self {
        Node::Leaf(Leaf::Empty)
    }

    pub fn list(children: impl IntoIterator<Item = Node>) -> Self {
        Node::List(children.into_iter().collect())
    }

    pub fn element(tag: impl Into<String>) -> Element {
        Element::new(tag)
    }

    pub fn component<F>(name: impl Into<String>, props: serde_json::Value, render: F) -> Self
    where
        F: FnOnce(serde_json::Value) -> Result<Node, RenderError> + Send + 'static,
    {
        Node::Component(Component { name: name.into(), props, render: Box::new(render) })
    }

    /// Boundary whose content resolves to a subtree.
    pub fn boundary<F, Fut, O>(fallback: impl Into<Node>, task: F) -> Boundary
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<O, BoundaryFailure>> + Send + 'static,
        O: Into<BoundaryOutput>,
    {
        Boundary {
            fallback: Box::new(fallback.into()),
            task: Box::new(move || task().map(|result| result.map(Into::into)).boxed()),
            priority: 0,
            needs_activation: true,
        }
    }
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self { tag: tag.into(), attrs: Vec::new(), children: Vec::new(), inner_html: None }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn dangerously_set_inner_html(mut self, html: impl Into<String>) -> Self {
        self.inner_html = Some(html.into());
        self
    }
}

impl Boundary {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn needs_activation(mut self, needs_activation: bool) -> Self {
        self.needs_activation = needs_activation;
        self
    }
}

impl From<&str> for Node {
    fn from(text: &str) -> Self {
        Node::text(text)
    }
}

impl From<String> for Node {
    fn from(text: String) -> Self {
        Node::Leaf(Leaf::Text(text))
    }
}

impl From<i64> for Node {
    fn from(value: i64) -> Self {
        Node::Leaf(Leaf::Int(value))
    }
}

impl From<f64> for Node {
    fn from(value: f64) -> Self {
        Node::Leaf(Leaf::Float(value))
    }
}

impl From<bool> for Node {
    fn from(value: bool) -> Self {
        Node::Leaf(Leaf::Bool(value))
    }
}

impl From<Vec<Node>> for Node {
    fn from(children: Vec<Node>) -> Self {
        Node::List(children)
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<Boundary> for Node {
    fn from(boundary: Boundary) -> Self {
        Node::Boundary(boundary)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(value: Option<T>) -> Self {
        value.map_or(Node::Leaf(Leaf::Empty), Into::into)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Leaf(leaf) => f.debug_tuple("Leaf").field(leaf).finish(),
            Node::Element(element) => f
                .debug_struct("Element")
                .field("tag", &element.tag)
                .field("attrs", &element.attrs)
                .field("children", &element.children)
                .field("inner_html", &element.inner_html)
                .finish(),
            Node::List(children) => f.debug_tuple("List").field(children).finish(),
            Node::Component(component) => f
                .debug_struct("Component")
                .field("name", &component.name)
                .field("props", &component.props)
                .finish_non_exhaustive(),
            Node::Boundary(boundary) => f
                .debug_struct("Boundary")
                .field("fallback", &boundary.fallback)
                .field("priority", &boundary.priority)
                .field("needs_activation", &boundary.needs_activation)
                .finish_non_exhaustive(),
        }
    }
}
