use crate::environment::Vertex;
use glam::{Mat3, Vec3};

/// CPU-side triangle list uploaded by `Environment::calculate_mesh`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshGeometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshGeometry {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Appends `other`, rebasing its indices.
    pub fn merge(&mut self, other: &MeshGeometry) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + base));
    }

    pub fn transformed(mut self, rotation: Mat3) -> Self {
        for v in &mut self.vertices {
            v.position = (rotation * Vec3::from(v.position)).to_array();
            v.normal = (rotation * Vec3::from(v.normal)).normalize_or_zero().to_array();
        }
        self
    }

    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut iter = self.vertices.iter().map(|v| Vec3::from(v.position));
        let first = iter.next()?;
        Some(iter.fold((first, first), |(min, max), p| (min.min(p), max.max(p))))
    }
}

fn vertex(position: Vec3, normal: Vec3) -> Vertex {
    Vertex::new(position.to_array(), normal.normalize_or_zero().to_array(), [0.0, 0.0])
}

pub fn create_box(center: Vec3, size: Vec3) -> MeshGeometry {
    let h = size * 0.5;
    let corners = [
        Vec3::new(-h.x, -h.y, -h.z),
        Vec3::new(h.x, -h.y, -h.z),
        Vec3::new(h.x, h.y, -h.z),
        Vec3::new(-h.x, h.y, -h.z),
        Vec3::new(-h.x, -h.y, h.z),
        Vec3::new(h.x, -h.y, h.z),
        Vec3::new(h.x, h.y, h.z),
        Vec3::new(-h.x, h.y, h.z),
    ];
    let vertices = corners.iter().map(|&c| vertex(center + c, c)).collect();
    let indices = vec![
        0, 2, 1, 0, 3, 2, //
        4, 5, 6, 4, 6, 7, //
        0, 1, 5, 0, 5, 4, //
        1, 2, 6, 1, 6, 5, //
        2, 3, 7, 2, 7, 6, //
        3, 0, 4, 3, 4, 7,
    ];
    MeshGeometry::new(vertices, indices)
}

/// Unit cube at the origin with uv-less normals.
pub fn create_cube() -> MeshGeometry {
    create_box(Vec3::ZERO, Vec3::ONE)
}

/// Quad in the XY plane facing +Z.
pub fn create_quad(center: Vec3, width: f32, height: f32) -> MeshGeometry {
    let sx = width * 0.5;
    let sy = height * 0.5;
    let mut vertices: Vec<Vertex> = [(-sx, -sy), (sx, -sy), (sx, sy), (-sx, sy)]
        .iter()
        .map(|&(x, y)| vertex(center + Vec3::new(x, y, 0.0), Vec3::Z))
        .collect();
    for (v, uv) in vertices.iter_mut().zip([[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]) {
        v.uv = uv;
    }
    MeshGeometry::new(vertices, vec![0, 1, 2, 0, 2, 3])
}

/// Flat ring in the XY plane, then rotated.
pub fn create_ring(radius: f32, thickness: f32, segments: usize, rotation: Mat3) -> MeshGeometry {
    let n = segments.max(16);
    let mut vertices = Vec::with_capacity(n * 2);
    let mut indices = Vec::with_capacity(n * 6);
    for i in 0..n {
        let t = (i as f32 / n as f32) * std::f32::consts::TAU;
        let dir = Vec3::new(t.cos(), t.sin(), 0.0);
        vertices.push(vertex(rotation * (dir * (radius + thickness)), rotation * Vec3::Z));
        vertices.push(vertex(rotation * (dir * (radius - thickness)), rotation * Vec3::Z));
    }
    let n = n as u32;
    for i in 0..n {
        let i0 = i * 2;
        let i1 = i * 2 + 1;
        let j0 = ((i + 1) % n) * 2;
        let j1 = ((i + 1) % n) * 2 + 1;
        indices.extend_from_slice(&[i0, j0, j1, i0, j1, i1]);
    }
    MeshGeometry::new(vertices, indices)
}

pub fn create_disk(radius: f32, segments: usize) -> MeshGeometry {
    let n = segments.max(12);
    let mut vertices = Vec::with_capacity(n + 1);
    let mut indices = Vec::with_capacity(n * 3);
    vertices.push(vertex(Vec3::ZERO, Vec3::Z));
    for i in 0..n {
        let t = (i as f32 / n as f32) * std::f32::consts::TAU;
        vertices.push(vertex(Vec3::new(radius * t.cos(), radius * t.sin(), 0.0), Vec3::Z));
    }
    let n = n as u32;
    for i in 0..n {
        let b = i + 1;
        let c = if i + 1 == n { 1 } else { i + 2 };
        indices.extend_from_slice(&[0, b, c]);
    }
    MeshGeometry::new(vertices, indices)
}

/// Arrow along +X: a thin shaft and a square pyramid head.
pub fn create_arrow(length: f32, shaft: f32) -> MeshGeometry {
    let head = length * 0.2;
    let mut geometry = create_box(
        Vec3::new((length - head) * 0.5, 0.0, 0.0),
        Vec3::new(length - head, shaft, shaft),
    );
    let w = shaft * 3.0;
    let base = length - head;
    let tip = vertex(Vec3::new(length, 0.0, 0.0), Vec3::X);
    let ring = [(-w, -w), (w, -w), (w, w), (-w, w)]
        .map(|(y, z)| vertex(Vec3::new(base, y, z), Vec3::new(0.0, y, z)));
    let mut vertices = vec![tip];
    vertices.extend_from_slice(&ring);
    let pyramid = MeshGeometry::new(
        vertices,
        vec![0, 1, 2, 0, 2, 3, 0, 3, 4, 0, 4, 1, 1, 3, 2, 1, 4, 3],
    );
    geometry.merge(&pyramid);
    geometry
}

/// Ground plane in XZ facing +Y.
pub fn create_plane(size: f32) -> MeshGeometry {
    create_quad(Vec3::ZERO, size, size).transformed(Mat3::from_rotation_x(-std::f32::consts::FRAC_PI_2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices_in_range(g: &MeshGeometry) -> bool {
        g.indices.iter().all(|&i| (i as usize) < g.vertices.len())
    }

    #[test]
    fn generators_produce_valid_triangle_lists() {
        let shapes = [
            create_cube(),
            create_quad(Vec3::ZERO, 1.0, 2.0),
            create_ring(1.1, 0.02, 8, Mat3::IDENTITY),
            create_disk(0.8, 4),
            create_arrow(1.0, 0.03),
            create_plane(10.0),
        ];
        for shape in &shapes {
            assert!(!shape.is_empty());
            assert_eq!(shape.indices.len() % 3, 0);
            assert!(indices_in_range(shape));
        }
        assert_eq!(shapes[2].vertices.len(), 32, "ring is clamped to 16 segments");
        assert_eq!(shapes[3].triangle_count(), 12, "disk is clamped to 12 segments");
    }

    #[test]
    fn arrow_points_along_x() {
        let (min, max) = create_arrow(1.0, 0.03).bounds().unwrap();
        assert!((max.x - 1.0).abs() < 1e-6);
        assert!(min.x >= -1e-6);
        assert!(max.y < 0.2 && max.z < 0.2);
    }

    #[test]
    fn rotated_ring_lies_in_the_rotated_plane() {
        let ring = create_ring(1.0, 0.01, 32, Mat3::from_rotation_x(-std::f32::consts::FRAC_PI_2));
        let (min, max) = ring.bounds().unwrap();
        assert!(max.y - min.y < 1e-4, "ring around Y lies in XZ");
    }

    #[test]
    fn merge_rebases_indices() {
        let mut a = create_quad(Vec3::ZERO, 1.0, 1.0);
        a.merge(&create_quad(Vec3::X, 1.0, 1.0));
        assert_eq!(a.vertices.len(), 8);
        assert_eq!(&a.indices[6..], &[4, 5, 6, 4, 6, 7]);
    }
}
