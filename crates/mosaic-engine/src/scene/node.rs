use crate::assets::ImageKey;
use crate::cache::Filter;
use crate::coords::{Matrix2D, Rect};
use crate::paint::Color;
use crate::text::FontId;

use super::{Frame, NodeId};

/// Local transform of a node, composed as translate · rotate/skew · scale · (-reg).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Degrees.
    pub rotation: f32,
    /// Degrees.
    pub skew_x: f32,
    /// Degrees.
    pub skew_y: f32,
    pub reg_x: f32,
    pub reg_y: f32,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            reg_x: 0.0,
            reg_y: 0.0,
        }
    }
}

impl Transform {
    pub fn at(x: f32, y: f32) -> Self {
        Self { x, y, ..Self::default() }
    }

    /// Appends this transform to `parent`, returning the concatenated matrix.
    pub fn concat(&self, parent: &Matrix2D) -> Matrix2D {
        let mut m = *parent;
        m.append_transform(
            self.x,
            self.y,
            self.scale_x,
            self.scale_y,
            self.rotation,
            self.skew_x,
            self.skew_y,
            self.reg_x,
            self.reg_y,
        );
        m
    }
}

/// Single line of text drawn with a loaded font.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLeaf {
    pub text: String,
    pub font: FontId,
    pub size: f32,
    pub color: Color,
}

/// An image drawn directly, optionally cropped to `source_rect` (source pixels).
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub image: ImageKey,
    pub source_rect: Option<Rect>,
}

/// Render style of a node. Decides how the batch assembler treats it.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Groups children; draws nothing itself.
    Container,
    /// A frame of a sprite sheet or a whole bitmap.
    Textured(Frame),
    Text(TextLeaf),
    RawImage(RawImage),
    /// Rendered by something outside the batch renderer; skipped.
    Foreign,
}

/// A scene-graph node. Created detached, then inserted into a [`Scene`](super::Scene).
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub transform: Transform,
    pub alpha: f32,
    pub visible: bool,
    pub filters: Vec<Box<dyn Filter>>,
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,
    pub(crate) concatenated: Matrix2D,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            transform: Transform::default(),
            alpha: 1.0,
            visible: true,
            filters: Vec::new(),
            parent: None,
            children: Vec::new(),
            concatenated: Matrix2D::IDENTITY,
        }
    }

    pub fn container() -> Self {
        Self::new(NodeKind::Container)
    }

    pub fn textured(frame: Frame) -> Self {
        Self::new(NodeKind::Textured(frame))
    }

    pub fn raw_image(image: impl Into<ImageKey>) -> Self {
        Self::new(NodeKind::RawImage(RawImage { image: image.into(), source_rect: None }))
    }

    pub fn text(text: impl Into<String>, font: FontId, size: f32, color: Color) -> Self {
        Self::new(NodeKind::Text(TextLeaf { text: text.into(), font, size, color }))
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.transform.x = x;
        self.transform.y = y;
        self
    }

    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Matrix computed during the most recent walk that reached this node.
    pub fn concatenated_matrix(&self) -> Matrix2D {
        self.concatenated
    }
}
