use image::RgbImage;

use crate::mesh::{Point3, Vector3};

pub type Matrix4 = nalgebra::Matrix4<f64>;
pub type Vector2 = nalgebra::Vector2<f64>;

pub struct ProjectedPoint {
    pub pixel: Vector2,
    pub depth: f64,
}

/// A calibrated photograph usable as a texture source. The position in
/// the view collection doubles as the label id during view selection.
pub struct TextureView {
    pub id: usize,
    pub world_to_camera: Matrix4,
    pub focal: [f64; 2],
    pub principal: [f64; 2],
    pub image: RgbImage,
}

impl TextureView {
    pub fn new(
        id: usize,
        world_to_camera: Matrix4,
        focal: [f64; 2],
        principal: [f64; 2],
        image: RgbImage,
    ) -> TextureView {
        TextureView {
            id,
            world_to_camera,
            focal,
            principal,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn camera_position(&self) -> Point3 {
        // For a rigid transform [R|t] the camera center is -Rᵀt.
        let r = self.world_to_camera.fixed_slice::<3, 3>(0, 0);
        let t = self.world_to_camera.fixed_slice::<3, 1>(0, 3);
        Point3::from(-(r.transpose() * t))
    }

    /// Projects a world point onto the image plane. The camera looks
    /// along its +z axis, so a non-positive depth means the point lies
    /// behind the camera and the pixel coordinate is meaningless.
    pub fn project(&self, point: &Point3) -> ProjectedPoint {
        let c = self.world_to_camera.transform_point(point);
        let depth = c.z;
        let pixel = Vector2::new(
            self.principal[0] + self.focal[0] * c.x / depth,
            self.principal[1] + self.focal[1] * c.y / depth,
        );
        ProjectedPoint { pixel, depth }
    }

    pub fn inside(&self, pixel: Vector2) -> bool {
        pixel[0] >= 0.0
            && pixel[1] >= 0.0
            && pixel[0] <= (self.width() - 1) as f64
            && pixel[1] <= (self.height() - 1) as f64
    }

    /// Distance from a pixel to the closest image border, in pixels.
    pub fn border_distance(&self, pixel: Vector2) -> f64 {
        let w = (self.width() - 1) as f64;
        let h = (self.height() - 1) as f64;
        f64::min(
            f64::min(pixel[0], w - pixel[0]),
            f64::min(pixel[1], h - pixel[1]),
        )
    }

    pub fn viewing_direction(&self) -> Vector3 {
        let r = self.world_to_camera.fixed_slice::<3, 3>(0, 0);
        r.transpose() * Vector3::z()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontal_view(width: u32, height: u32) -> TextureView {
        TextureView::new(
            0,
            Matrix4::identity(),
            [50.0, 50.0],
            [width as f64 / 2.0, height as f64 / 2.0],
            RgbImage::new(width, height),
        )
    }

    #[test]
    fn test_projection() {
        let view = frontal_view(64, 64);

        let p = view.project(&Point3::new(0.0, 0.0, 2.0));
        assert!((p.pixel - Vector2::new(32.0, 32.0)).norm() < 1e-12);
        assert!((p.depth - 2.0).abs() < 1e-12);

        let p = view.project(&Point3::new(0.5, -0.5, 2.0));
        assert!((p.pixel - Vector2::new(44.5, 19.5)).norm() < 1e-12);
        assert!(view.inside(p.pixel));

        let p = view.project(&Point3::new(0.0, 0.0, -1.0));
        assert!(p.depth < 0.0);
    }

    #[test]
    fn test_camera_position_and_direction() {
        let mut xf = Matrix4::identity();
        xf[(0, 3)] = -1.0;
        xf[(2, 3)] = 3.0;
        let mut view = frontal_view(64, 64);
        view.world_to_camera = xf;

        let c = view.camera_position();
        assert!((c - Point3::new(1.0, 0.0, -3.0)).norm() < 1e-12);
        let d = view.viewing_direction();
        assert!((d - Vector3::z()).norm() < 1e-12);
    }

    #[test]
    fn test_border_distance() {
        let view = frontal_view(64, 32);
        let d = view.border_distance(Vector2::new(5.0, 10.0));
        assert!((d - 5.0).abs() < 1e-12);
        let d = view.border_distance(Vector2::new(60.0, 10.0));
        assert!((d - 3.0).abs() < 1e-12);
    }
}
