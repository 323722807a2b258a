//! Wireframe data handed to the CAD viewer.
//!
//! The backend produces `{ "vertices": [[x, y, z], ...], "edges": [[a, b], ...] }`.
//! Each edge becomes one line segment between the two referenced vertices.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Vertex = [f64; 3];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<[usize; 2]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Segment {
    pub start: Vertex,
    pub end: Vertex,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("edge {edge} references vertex {index}, but only {len} vertices exist")]
    EdgeOutOfRange { edge: usize, index: usize, len: usize },
}

impl Geometry {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Resolve edges to segments, in edge order.
    pub fn segments(&self) -> Result<Vec<Segment>, GeometryError> {
        self.edges
            .iter()
            .enumerate()
            .map(|(edge, &[a, b])| {
                Ok(Segment {
                    start: self.vertex(edge, a)?,
                    end: self.vertex(edge, b)?,
                })
            })
            .collect()
    }

    fn vertex(&self, edge: usize, index: usize) -> Result<Vertex, GeometryError> {
        self.vertices
            .get(index)
            .copied()
            .ok_or(GeometryError::EdgeOutOfRange {
                edge,
                index,
                len: self.vertices.len(),
            })
    }
}
