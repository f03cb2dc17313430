//! Triangle soup input for navigation mesh generation

use crate::{Error, Result};
use glam::Vec3;

use std::fs;
use std::path::Path;

/// An indexed triangle list, 3 indices per triangle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<i32>,
}

impl TriMesh {
    pub fn new(vertices: Vec<Vec3>, indices: Vec<i32>) -> Self {
        Self { vertices, indices }
    }

    pub fn vert_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn tri_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Loads a mesh from a Wavefront OBJ file
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_obj_str(&content)
    }

    /// Parses OBJ content from a string
    ///
    /// Only `v` and `f` records are read. Polygonal faces are fan triangulated and
    /// negative (relative) indices are resolved against the vertices seen so far.
    ///
    /// ```
    /// use nav_common::TriMesh;
    ///
    /// let mesh = TriMesh::from_obj_str("v 0 0 0\nv 1 0 0\nv 0 0 1\nf 1 2 3\n").unwrap();
    /// assert_eq!(mesh.vert_count(), 3);
    /// assert_eq!(mesh.tri_count(), 1);
    /// ```
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::default();
        for (line_no, line) in content.lines().enumerate() {
            mesh.parse_obj_line(line)
                .map_err(|e| Error::InvalidMesh(format!("line {}: {}", line_no + 1, e)))?;
        }
        Ok(mesh)
    }

    fn parse_obj_line(&mut self, line: &str) -> std::result::Result<(), String> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let mut coords = [0.0f32; 3];
                for (axis, c) in coords.iter_mut().enumerate() {
                    *c = tokens
                        .next()
                        .ok_or_else(|| format!("vertex is missing coordinate {}", axis))?
                        .parse::<f32>()
                        .map_err(|_| format!("vertex coordinate {} is not a number", axis))?;
                }
                self.vertices.push(Vec3::from_array(coords));
            }
            Some("f") => {
                let mut face = Vec::with_capacity(4);
                for token in tokens {
                    let index = token
                        .split('/')
                        .next()
                        .and_then(|s| s.parse::<i32>().ok())
                        .ok_or_else(|| format!("invalid face index '{}'", token))?;
                    let resolved = if index < 0 {
                        self.vertices.len() as i32 + index
                    } else {
                        index - 1
                    };
                    face.push(resolved);
                }
                if face.len() < 3 {
                    return Err("face has fewer than 3 vertices".to_string());
                }
                for i in 1..face.len() - 1 {
                    self.indices.extend_from_slice(&[face[0], face[i], face[i + 1]]);
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Checks that the index list describes whole triangles referencing existing vertices
    pub fn validate(&self) -> Result<()> {
        if self.indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let count = self.vertices.len() as i32;
        if let Some(bad) = self.indices.iter().find(|&&i| i < 0 || i >= count) {
            return Err(Error::InvalidMesh(format!(
                "index {} out of range for {} vertices",
                bad, count
            )));
        }
        Ok(())
    }

    /// Axis-aligned bounds of the vertices, zero for an empty mesh
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        crate::calc_bounds(&self.vertices).unwrap_or((Vec3::ZERO, Vec3::ZERO))
    }

    /// Appends another mesh, rebasing its indices
    pub fn append(&mut self, other: &TriMesh) {
        let base = self.vertices.len() as i32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }
}
