use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::node::Document;
use crate::ops::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }

    pub fn compare(&self, other: &Point) -> Ordering {
        match crate::path::compare(&self.path, &other.path) {
            Ordering::Equal if self.path.len() == other.path.len() => {
                self.offset.cmp(&other.offset)
            }
            Ordering::Equal => self.path.len().cmp(&other.path.len()),
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn new(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    pub fn is_backward(&self) -> bool {
        self.anchor.compare(&self.focus) == Ordering::Greater
    }

    /// `(start, end)` in document order.
    pub fn edges(&self) -> (&Point, &Point) {
        if self.is_backward() {
            (&self.focus, &self.anchor)
        } else {
            (&self.anchor, &self.focus)
        }
    }

    pub fn start(&self) -> &Point {
        self.edges().0
    }

    pub fn end(&self) -> &Point {
        self.edges().1
    }

    pub fn points_mut(&mut self) -> [&mut Point; 2] {
        [&mut self.anchor, &mut self.focus]
    }

    /// Range covering the whole document, `None` for a document without text.
    pub fn whole(doc: &Document) -> Option<Self> {
        Some(Self::new(doc.start_point()?, doc.end_point()?))
    }
}

/// Clamps both points onto existing text leaves. Points that fell off the
/// tree snap to the nearest leaf, or to the document start.
pub fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    Selection {
        anchor: normalize_point(doc, &selection.anchor),
        focus: normalize_point(doc, &selection.focus),
    }
}

pub fn normalize_point(doc: &Document, point: &Point) -> Point {
    if let Some(leaf) = doc.leaf(&point.path) {
        return Point::new(
            point.path.clone(),
            clamp_to_char_boundary(&leaf.text, point.offset),
        );
    }
    if doc.has_path(&point.path) {
        if let Some(first) = doc.first_text_point(&point.path) {
            return first;
        }
    }
    doc.point_before(&point.path)
        .or_else(|| doc.point_from(&point.path))
        .or_else(|| doc.start_point())
        .unwrap_or_else(|| Point::new(vec![0, 0], 0))
}

pub fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}
