use crate::{
    error::{Error, Result},
    pose::Connection,
};

/// Three landmark indices describing an angle measured at `vertex`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Joint {
    pub first: usize,
    pub vertex: usize,
    pub second: usize,
}

/// Finds the landmark shared by two connections and their free endpoints.
///
/// `first` is the free endpoint of `a`, `second` the free endpoint of `b`.
pub fn shared_vertex(a: Connection, b: Connection) -> Result<Joint> {
    joint_from_pairs(a.landmarks(), b.landmarks()).ok_or(Error::Topology(a, b))
}

fn joint_from_pairs((a0, a1): (usize, usize), (b0, b1): (usize, usize)) -> Option<Joint> {
    // Degenerate pairs never form an angle.
    if a0 == a1 || b0 == b1 {
        return None;
    }

    let vertex = match (a0 == b0 || a0 == b1, a1 == b0 || a1 == b1) {
        (true, false) => a0,
        (false, true) => a1,
        _ => return None,
    };

    let first = if a0 == vertex { a1 } else { a0 };
    let second = if b0 == vertex { b1 } else { b0 };
    if first == second {
        return None;
    }

    Some(Joint {
        first,
        vertex,
        second,
    })
}

/// Angle in degrees at `p2` between the rays towards `p1` and `p3`.
///
/// Works for planar (`N = 2`) and spatial (`N = 3`) points. Returns 0 when
/// either ray has zero length. The result is always within `[0, 180]`.
pub fn joint_angle_degrees<const N: usize>(p1: [f32; N], p2: [f32; N], p3: [f32; N]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm1 = 0.0f32;
    let mut norm2 = 0.0f32;
    for i in 0..N {
        let v1 = p1[i] - p2[i];
        let v2 = p3[i] - p2[i];
        dot += v1 * v2;
        norm1 += v1 * v1;
        norm2 += v2 * v2;
    }

    if norm1 == 0.0 || norm2 == 0.0 {
        return 0.0;
    }

    let cosine = dot / (norm1.sqrt() * norm2.sqrt());
    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}
