//! Typed walk over exported document trees.
//!
//! Objects are classified by their `_type` discriminant before a visitor sees
//! them. An image's `asset` field is part of the image node and is never
//! walked as a child, so asset references do not surface as document
//! references.

use serde_json::{Map, Value};

use cmsmigrate_shared::Reference;

/// An object node, classified by `_type`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TypedNode<'a> {
    /// `{ _type: "reference", _ref: <non-empty> }`
    Reference { target: &'a str },
    /// `{ _type: "image", asset: { _ref: <non-empty> } }`
    Image { asset_ref: &'a str },
    /// Any other object.
    Object(&'a Map<String, Value>),
}

impl<'a> TypedNode<'a> {
    pub fn classify(map: &'a Map<String, Value>) -> Self {
        let non_empty = |v: Option<&'a Value>| v.and_then(Value::as_str).filter(|s| !s.is_empty());

        match map.get("_type").and_then(Value::as_str) {
            Some("reference") => match non_empty(map.get("_ref")) {
                Some(target) => Self::Reference { target },
                None => Self::Object(map),
            },
            Some("image") => match non_empty(map.get("asset").and_then(|a| a.get("_ref"))) {
                Some(asset_ref) => Self::Image { asset_ref },
                None => Self::Object(map),
            },
            _ => Self::Object(map),
        }
    }
}

/// Whether the walker should look inside the node just visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Descend,
    Skip,
}

pub trait Visitor<'a> {
    fn visit(&mut self, node: TypedNode<'a>) -> Walk;
}

/// Depth-first walk over arrays and objects.
pub fn walk<'a, V: Visitor<'a>>(value: &'a Value, visitor: &mut V) {
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, visitor);
            }
        }
        Value::Object(map) => {
            let node = TypedNode::classify(map);
            if visitor.visit(node) == Walk::Skip {
                return;
            }
            let is_image = matches!(node, TypedNode::Image { .. });
            for (key, child) in map {
                if is_image && key == "asset" {
                    continue;
                }
                walk(child, visitor);
            }
        }
        _ => {}
    }
}

struct ReferenceCollector(Vec<Reference>);

impl<'a> Visitor<'a> for ReferenceCollector {
    fn visit(&mut self, node: TypedNode<'a>) -> Walk {
        match node {
            TypedNode::Reference { target } => {
                self.0.push(Reference::to(target));
                Walk::Skip
            }
            _ => Walk::Descend,
        }
    }
}

struct AssetCollector(Vec<Reference>);

impl<'a> Visitor<'a> for AssetCollector {
    fn visit(&mut self, node: TypedNode<'a>) -> Walk {
        match node {
            TypedNode::Image { asset_ref } => {
                self.0.push(Reference::to(asset_ref));
                Walk::Skip
            }
            _ => Walk::Descend,
        }
    }
}

/// Every document reference in `doc`, in traversal order.
pub fn find_references(doc: &Value) -> Vec<Reference> {
    let mut collector = ReferenceCollector(Vec::new());
    walk(doc, &mut collector);
    collector.0
}

/// Every image asset reference in `doc`, in traversal order.
pub fn find_asset_references(doc: &Value) -> Vec<Reference> {
    let mut collector = AssetCollector(Vec::new());
    walk(doc, &mut collector);
    collector.0
}
