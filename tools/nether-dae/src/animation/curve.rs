//! Keyframe interpolation

/// Interpolation of one keyframe segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    #[default]
    Linear,
    Bezier,
    Hermite,
    Step,
}

impl Interpolation {
    /// Parse a `Name_array` entry; `None` for unsupported types
    pub fn parse(label: &str) -> Option<Self> {
        match label.to_ascii_uppercase().as_str() {
            "LINEAR" => Some(Self::Linear),
            "BEZIER" => Some(Self::Bezier),
            "HERMITE" => Some(Self::Hermite),
            "STEP" => Some(Self::Step),
            _ => None,
        }
    }
}

/// Control values of one component over one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub p0: f32,
    pub p1: f32,
    /// Out tangent of the first key
    pub t0: f32,
    /// In tangent of the second key
    pub t1: f32,
}

impl Segment {
    /// Evaluate at `s` in `[0, 1]`
    pub fn evaluate(&self, interpolation: Interpolation, s: f32) -> f32 {
        match interpolation {
            Interpolation::Linear => self.p0 + (self.p1 - self.p0) * s,
            Interpolation::Step => self.p0,
            Interpolation::Bezier => {
                let u = 1.0 - s;
                u * u * u * self.p0
                    + 3.0 * s * u * u * self.t0
                    + 3.0 * s * s * u * self.t1
                    + s * s * s * self.p1
            }
            Interpolation::Hermite => {
                let s2 = s * s;
                let s3 = s2 * s;
                (2.0 * s3 - 3.0 * s2 + 1.0) * self.p0
                    + (s3 - 2.0 * s2 + s) * self.t0
                    + (-2.0 * s3 + 3.0 * s2) * self.p1
                    + (s3 - s2) * self.t1
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEGMENT: Segment = Segment {
        p0: 0.0,
        p1: 10.0,
        t0: 2.0,
        t1: 8.0,
    };

    #[test]
    fn test_parse() {
        assert_eq!(Interpolation::parse("LINEAR"), Some(Interpolation::Linear));
        assert_eq!(Interpolation::parse("bezier"), Some(Interpolation::Bezier));
        assert_eq!(Interpolation::parse("CARDINAL"), None);
    }

    #[test]
    fn test_endpoints() {
        for interpolation in [Interpolation::Linear, Interpolation::Bezier, Interpolation::Hermite] {
            assert!((SEGMENT.evaluate(interpolation, 0.0) - 0.0).abs() < 1e-6);
            assert!((SEGMENT.evaluate(interpolation, 1.0) - 10.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_midpoints() {
        assert_eq!(SEGMENT.evaluate(Interpolation::Linear, 0.5), 5.0);
        assert_eq!(SEGMENT.evaluate(Interpolation::Step, 0.99), 0.0);
        // 0.125*0 + 0.375*2 + 0.375*8 + 0.125*10
        assert!((SEGMENT.evaluate(Interpolation::Bezier, 0.5) - 5.0).abs() < 1e-6);
        // 0.5*0 + 0.125*2 + 0.5*10 - 0.125*8
        assert!((SEGMENT.evaluate(Interpolation::Hermite, 0.5) - 4.25).abs() < 1e-6);
    }
}
