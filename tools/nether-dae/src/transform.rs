//! Animatable transform primitives
//!
//! Each scene node owns an ordered list of [`TransformTarget`]s. A target owns
//! its raw data buffer (the values animation channels write into) plus a copy
//! of the rest-pose values, and keeps a derived form (matrix, axis/angle or
//! vector) in sync with the buffer.

use glam::{Mat4, Vec3};
use smallvec::SmallVec;

use crate::document::{ElementId, TransformElement, TransformKind};

const IDENTITY_MATRIX: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
];

/// Data buffer plus rest-pose copy
#[derive(Debug, Clone, PartialEq)]
pub struct TransformData<const N: usize> {
    pub data: [f32; N],
    pub original: [f32; N],
}

impl<const N: usize> TransformData<N> {
    fn new(values: [f32; N]) -> Self {
        Self {
            data: values,
            original: values,
        }
    }
}

/// Transform primitive with its derived form
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    /// Row-major 4x4 matrix as stored in the document
    Matrix {
        buffer: TransformData<16>,
        matrix: Mat4,
    },
    /// Axis (xyz) and angle in degrees
    Rotate {
        buffer: TransformData<4>,
        axis: Vec3,
        angle: f32,
    },
    Translate {
        buffer: TransformData<3>,
        offset: Vec3,
    },
    Scale {
        buffer: TransformData<3>,
        factor: Vec3,
    },
}

/// One animatable transform of a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct TransformTarget {
    pub sid: Option<String>,
    pub op: TransformOp,
    /// Animations with at least one channel writing into this target
    animations: SmallVec<[ElementId; 2]>,
}

impl TransformTarget {
    pub fn new(sid: Option<String>, kind: TransformKind, values: &[f32]) -> Self {
        let op = match kind {
            TransformKind::Matrix => TransformOp::Matrix {
                buffer: TransformData::new(fill_values(kind, values, IDENTITY_MATRIX)),
                matrix: Mat4::IDENTITY,
            },
            TransformKind::Rotate => TransformOp::Rotate {
                buffer: TransformData::new(fill_values(kind, values, [0.0, 0.0, 1.0, 0.0])),
                axis: Vec3::Z,
                angle: 0.0,
            },
            TransformKind::Translate => TransformOp::Translate {
                buffer: TransformData::new(fill_values(kind, values, [0.0; 3])),
                offset: Vec3::ZERO,
            },
            TransformKind::Scale => TransformOp::Scale {
                buffer: TransformData::new(fill_values(kind, values, [1.0; 3])),
                factor: Vec3::ONE,
            },
        };
        let mut target = Self {
            sid,
            op,
            animations: SmallVec::new(),
        };
        target.update_from_data();
        target
    }

    /// Build from a document transform element
    pub fn from_element(sid: Option<String>, element: &TransformElement) -> Self {
        Self::new(sid, element.kind, &element.values)
    }

    pub fn kind(&self) -> TransformKind {
        match self.op {
            TransformOp::Matrix { .. } => TransformKind::Matrix,
            TransformOp::Rotate { .. } => TransformKind::Rotate,
            TransformOp::Translate { .. } => TransformKind::Translate,
            TransformOp::Scale { .. } => TransformKind::Scale,
        }
    }

    /// Current (possibly animated) data buffer
    pub fn data(&self) -> &[f32] {
        match &self.op {
            TransformOp::Matrix { buffer, .. } => &buffer.data,
            TransformOp::Rotate { buffer, .. } => &buffer.data,
            TransformOp::Translate { buffer, .. } | TransformOp::Scale { buffer, .. } => {
                &buffer.data
            }
        }
    }

    /// Rest-pose data buffer
    pub fn original(&self) -> &[f32] {
        match &self.op {
            TransformOp::Matrix { buffer, .. } => &buffer.original,
            TransformOp::Rotate { buffer, .. } => &buffer.original,
            TransformOp::Translate { buffer, .. } | TransformOp::Scale { buffer, .. } => {
                &buffer.original
            }
        }
    }

    fn data_mut(&mut self) -> &mut [f32] {
        match &mut self.op {
            TransformOp::Matrix { buffer, .. } => &mut buffer.data,
            TransformOp::Rotate { buffer, .. } => &mut buffer.data,
            TransformOp::Translate { buffer, .. } | TransformOp::Scale { buffer, .. } => {
                &mut buffer.data
            }
        }
    }

    /// Recompute the derived form from the data buffer
    pub fn update_from_data(&mut self) {
        match &mut self.op {
            TransformOp::Matrix { buffer, matrix } => {
                *matrix = Mat4::from_cols_array(&buffer.data).transpose();
            }
            TransformOp::Rotate {
                buffer,
                axis,
                angle,
            } => {
                let [x, y, z, a] = buffer.data;
                *axis = Vec3::new(x, y, z);
                *angle = a;
            }
            TransformOp::Translate { buffer, offset } => {
                *offset = Vec3::from_array(buffer.data);
            }
            TransformOp::Scale { buffer, factor } => {
                *factor = Vec3::from_array(buffer.data);
            }
        }
    }

    /// Post-multiply `matrix` by this transform
    pub fn apply_transformation(&self, matrix: &mut Mat4) {
        *matrix *= self.matrix();
    }

    /// This transform as a matrix
    pub fn matrix(&self) -> Mat4 {
        match &self.op {
            TransformOp::Matrix { matrix, .. } => *matrix,
            TransformOp::Rotate { axis, angle, .. } => {
                let axis = axis.normalize_or_zero();
                if axis == Vec3::ZERO {
                    Mat4::IDENTITY
                } else {
                    Mat4::from_axis_angle(axis, angle.to_radians())
                }
            }
            TransformOp::Translate { offset, .. } => Mat4::from_translation(*offset),
            TransformOp::Scale { factor, .. } => Mat4::from_scale(*factor),
        }
    }

    /// Write animated values into the data buffer at `offset`
    ///
    /// Values that would run past the end of the buffer are dropped.
    pub fn apply_animation(&mut self, offset: usize, values: &[f32]) {
        let data = self.data_mut();
        if offset >= data.len() {
            return;
        }
        let count = values.len().min(data.len() - offset);
        data[offset..offset + count].copy_from_slice(&values[..count]);
        self.update_from_data();
    }

    /// Restore the rest-pose values
    pub fn reset_animation(&mut self) {
        match &mut self.op {
            TransformOp::Matrix { buffer, .. } => buffer.data = buffer.original,
            TransformOp::Rotate { buffer, .. } => buffer.data = buffer.original,
            TransformOp::Translate { buffer, .. } | TransformOp::Scale { buffer, .. } => {
                buffer.data = buffer.original
            }
        }
        self.update_from_data();
    }

    /// Record that a channel of `animation` writes into this target
    pub fn register_animation(&mut self, animation: ElementId) {
        if !self.animations.contains(&animation) {
            self.animations.push(animation);
        }
    }

    /// `animation == None` asks whether any channel targets this transform
    pub fn is_animated_by(&self, animation: Option<ElementId>) -> bool {
        match animation {
            Some(animation) => self.animations.contains(&animation),
            None => !self.animations.is_empty(),
        }
    }
}

/// Copy `values` into a fixed buffer, falling back to `default` on a length mismatch
fn fill_values<const N: usize>(kind: TransformKind, values: &[f32], default: [f32; N]) -> [f32; N] {
    match <[f32; N]>::try_from(values) {
        Ok(array) => array,
        Err(_) => {
            tracing::error!(
                "{:?} transform has {} values, expected {}; using identity",
                kind,
                values.len(),
                N
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Mat4, b: Mat4) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn test_matrix_is_row_major() {
        let values = [
            1.0, 0.0, 0.0, 5.0, //
            0.0, 1.0, 0.0, 6.0, //
            0.0, 0.0, 1.0, 7.0, //
            0.0, 0.0, 0.0, 1.0,
        ];
        let target = TransformTarget::new(None, TransformKind::Matrix, &values);
        assert_eq!(
            target.matrix().transform_point3(Vec3::ZERO),
            Vec3::new(5.0, 6.0, 7.0)
        );
    }

    #[test]
    fn test_rotate_uses_degrees() {
        let target = TransformTarget::new(None, TransformKind::Rotate, &[0.0, 0.0, 1.0, 90.0]);
        let p = target.matrix().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn test_wrong_length_falls_back_to_identity() {
        let target = TransformTarget::new(None, TransformKind::Matrix, &[1.0, 2.0]);
        assert_eq!(target.matrix(), Mat4::IDENTITY);
        let target = TransformTarget::new(None, TransformKind::Scale, &[2.0]);
        assert_eq!(target.matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_apply_transformation_post_multiplies() {
        let translate = TransformTarget::new(None, TransformKind::Translate, &[1.0, 0.0, 0.0]);
        let scale = TransformTarget::new(None, TransformKind::Scale, &[2.0, 2.0, 2.0]);
        let mut m = Mat4::IDENTITY;
        translate.apply_transformation(&mut m);
        scale.apply_transformation(&mut m);
        // Scale is applied to the point first, then the translation
        assert!(m.transform_point3(Vec3::X).abs_diff_eq(Vec3::new(3.0, 0.0, 0.0), 1e-6));
        assert!(approx_eq(
            m,
            Mat4::from_translation(Vec3::X) * Mat4::from_scale(Vec3::splat(2.0))
        ));
    }

    #[test]
    fn test_reset_restores_bit_identical_rest_pose() {
        let rest = [0.1f32, 0.2, 0.3];
        let mut target = TransformTarget::new(None, TransformKind::Translate, &rest);
        let before: Vec<u32> = target.data().iter().map(|v| v.to_bits()).collect();

        target.apply_animation(0, &[9.0, 8.0]);
        target.apply_animation(2, &[1.0 / 3.0]);
        target.apply_animation(1, &[f32::NAN]);
        assert_ne!(target.data()[0], 0.1);

        target.reset_animation();
        let after: Vec<u32> = target.data().iter().map(|v| v.to_bits()).collect();
        assert_eq!(before, after);
        assert_eq!(target.matrix(), Mat4::from_translation(Vec3::new(0.1, 0.2, 0.3)));
    }

    #[test]
    fn test_apply_animation_updates_derived_form() {
        let mut target = TransformTarget::new(None, TransformKind::Rotate, &[1.0, 0.0, 0.0, 0.0]);
        target.apply_animation(3, &[180.0]);
        let TransformOp::Rotate { angle, .. } = target.op else {
            panic!("expected rotate");
        };
        assert_eq!(angle, 180.0);
        // Out of range writes are ignored
        target.apply_animation(4, &[1.0]);
        assert_eq!(target.data(), &[1.0, 0.0, 0.0, 180.0]);
    }

    #[test]
    fn test_is_animated_by() {
        let mut target = TransformTarget::new(None, TransformKind::Scale, &[1.0, 1.0, 1.0]);
        assert!(!target.is_animated_by(None));
        target.register_animation(ElementId(7));
        assert!(target.is_animated_by(None));
        assert!(target.is_animated_by(Some(ElementId(7))));
        assert!(!target.is_animated_by(Some(ElementId(8))));
    }
}
