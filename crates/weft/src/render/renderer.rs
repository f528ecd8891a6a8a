use tracing::{debug, trace};

use super::html::{
    attribute_alias, escape_html, format_number, is_valid_attribute_name, is_valid_tag_name,
    is_void_element, placeholder_close, placeholder_open, write_attribute,
};
use crate::error::RenderError;
use crate::node::{Boundary, BoundaryTask, Element, Leaf, Node};
use crate::scheduler::{BoundaryId, BoundaryUnit};

pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Where boundary work goes once its placeholder is written.
pub trait BoundaryHost {
    fn allocate_id(&mut self) -> BoundaryId;

    fn register(&mut self, unit: BoundaryUnit, task: BoundaryTask) -> Result<(), RenderError>;
}

/// Walks a node tree synchronously. Boundaries are replaced by a placeholder
/// holding their fallback and handed to the host; the walk never waits.
pub struct FragmentRenderer<'a, H: BoundaryHost + ?Sized> {
    host: &'a mut H,
    max_depth: usize,
    parent: Option<BoundaryId>,
    registered: Vec<BoundaryId>,
}

impl<'a, H: BoundaryHost + ?Sized> FragmentRenderer<'a, H> {
    pub fn new(host: &'a mut H) -> Self {
        Self { host, max_depth: DEFAULT_MAX_DEPTH, parent: None, registered: Vec::new() }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Marks every boundary found by this renderer as nested in `parent`.
    pub fn within(mut self, parent: BoundaryId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn render(&mut self, node: Node) -> Result<String, RenderError> {
        let mut out = String::with_capacity(256);
        self.render_node(node, &mut out, 0, false)?;
        Ok(out)
    }

    /// Ids of every boundary this renderer handed to the host, in order.
    pub fn into_registered(self) -> Vec<BoundaryId> {
        self.registered
    }

    fn render_node(
        &mut self,
        node: Node,
        out: &mut String,
        depth: usize,
        in_fallback: bool,
    ) -> Result<(), RenderError> {
        if depth > self.max_depth {
            return Err(RenderError::DepthExceeded(self.max_depth));
        }

        match node {
            Node::Leaf(leaf) => {
                render_leaf(&leaf, out);
                Ok(())
            }
            Node::Element(element) => self.render_element(element, out, depth, in_fallback),
            Node::List(children) => {
                for child in children {
                    self.render_node(child, out, depth + 1, in_fallback)?;
                }
                Ok(())
            }
            Node::Component(component) => {
                trace!("Rendering component '{}'", component.name);
                let name = component.name;
                let rendered = (component.render)(component.props).map_err(|e| match e {
                    RenderError::Component { .. } => e,
                    other => RenderError::component(name, other.to_string()),
                })?;
                self.render_node(rendered, out, depth + 1, in_fallback)
            }
            Node::Boundary(boundary) => {
                if in_fallback {
                    return Err(RenderError::SuspendingFallback);
                }
                self.render_boundary(boundary, out, depth)
            }
        }
    }

    fn render_element(
        &mut self,
        element: Element,
        out: &mut String,
        depth: usize,
        in_fallback: bool,
    ) -> Result<(), RenderError> {
        let Element { tag, attrs, children, inner_html } = element;

        if !is_valid_tag_name(&tag) {
            return Err(RenderError::InvalidTag(tag));
        }

        out.push('<');
        out.push_str(&tag);
        for (name, value) in &attrs {
            if !is_valid_attribute_name(name) {
                return Err(RenderError::InvalidAttribute(name.clone()));
            }
            write_attribute(out, attribute_alias(name), value);
        }

        if is_void_element(&tag) {
            out.push_str(" />");
            return Ok(());
        }

        out.push('>');

        match inner_html {
            Some(html) => {
                if !children.is_empty() {
                    debug!("<{}> has both inner_html and children; children are ignored", tag);
                }
                out.push_str(&html);
            }
            None => {
                for child in children {
                    self.render_node(child, out, depth + 1, in_fallback)?;
                }
            }
        }

        out.push_str("</");
        out.push_str(&tag);
        out.push('>');
        Ok(())
    }

    fn render_boundary(
        &mut self,
        boundary: Boundary,
        out: &mut String,
        depth: usize,
    ) -> Result<(), RenderError> {
        let Boundary { fallback, task, priority, needs_activation } = boundary;

        let mut fallback_markup = String::new();
        self.render_node(*fallback, &mut fallback_markup, depth + 1, true)?;

        let id = self.host.allocate_id();

        out.push_str(&placeholder_open(id));
        out.push_str(&fallback_markup);
        out.push_str(&placeholder_close());

        let unit = BoundaryUnit::new(id, fallback_markup)
            .with_priority(priority)
            .with_needs_activation(needs_activation)
            .with_parent(self.parent);
        self.host.register(unit, task)?;
        self.registered.push(id);

        debug!("Registered boundary {} (priority {})", id, priority);
        Ok(())
    }
}

fn render_leaf(leaf: &Leaf, out: &mut String) {
    match leaf {
        Leaf::Text(text) => out.push_str(&escape_html(text)),
        Leaf::Int(value) => out.push_str(&value.to_string()),
        Leaf::Float(value) => out.push_str(&format_number(*value)),
        Leaf::Bool(_) | Leaf::Empty => {}
    }
}
