//! Read access to the graph's visual attributes.

use glam::Vec3;
use std::ops::Range;

/// The four icon decorator slots around a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decorator {
    NorthWest,
    NorthEast,
    SouthEast,
    SouthWest,
}

impl Decorator {
    pub const ALL: [Self; 4] = [
        Self::NorthWest,
        Self::NorthEast,
        Self::SouthEast,
        Self::SouthWest,
    ];
}

/// Per-vertex, per-link and scene attributes of the graph being displayed.
///
/// Implementations are read from producer threads while staging, never from
/// the render thread.
pub trait VisualAccess: Sync {
    fn vertex_count(&self) -> usize;
    fn vertex_id(&self, vertex: usize) -> i32;
    fn position(&self, vertex: usize) -> Vec3;
    /// Position the vertex morphs towards as the camera's morph mix goes to 1.
    fn alternate_position(&self, vertex: usize) -> Vec3 {
        self.position(vertex)
    }
    fn radius(&self, vertex: usize) -> f32;
    fn vertex_colour(&self, vertex: usize) -> Vec3;
    /// Visibility in `[0, 1]`, compared against the camera's window.
    fn vertex_visibility(&self, vertex: usize) -> f32;
    fn vertex_selected(&self, vertex: usize) -> bool;
    fn vertex_dimmed(&self, vertex: usize) -> bool;
    fn foreground_icon(&self, vertex: usize) -> String;
    fn background_icon(&self, vertex: usize) -> String;
    fn decorator(&self, vertex: usize, decorator: Decorator) -> Option<String>;

    fn link_count(&self) -> usize;
    fn link_id(&self, link: usize) -> i32;
    /// Index of the link's lower vertex.
    fn link_low_vertex(&self, link: usize) -> usize;
    fn link_high_vertex(&self, link: usize) -> usize;
    fn link_colour(&self, link: usize) -> Vec3;
    fn link_width(&self, link: usize) -> f32;
    fn link_selected(&self, link: usize) -> bool;
    fn link_dimmed(&self, link: usize) -> bool;
    fn link_visibility(&self, link: usize) -> f32;

    fn highlight_colour(&self) -> Vec3;
    fn background_colour(&self) -> Vec3;
}

/// The elements touched by a change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisualChange {
    elements: Vec<usize>,
}

impl VisualChange {
    pub fn new(mut elements: Vec<usize>) -> Self {
        elements.sort_unstable();
        elements.dedup();
        Self { elements }
    }

    /// Every element in `0..count`.
    pub fn all(count: usize) -> Self {
        Self {
            elements: (0..count).collect(),
        }
    }

    /// The smallest contiguous span covering every touched element.
    pub fn range(&self) -> Option<Range<usize>> {
        let first = *self.elements.first()?;
        let last = *self.elements.last()?;
        Some(first..last + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.elements.iter().copied()
    }
}

impl FromIterator<usize> for VisualChange {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_spans_unsorted_elements() {
        let change: VisualChange = [7, 2, 5, 2].into_iter().collect();
        assert_eq!(change.len(), 3);
        assert_eq!(change.range(), Some(2..8));
    }

    #[test]
    fn empty_change_has_no_range() {
        assert!(VisualChange::default().range().is_none());
        assert_eq!(VisualChange::all(4).range(), Some(0..4));
    }
}
