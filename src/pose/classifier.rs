use std::sync::Arc;

use serde::Deserialize;

use crate::{
    error::{Error, Result},
    pose::{
        AngleRule, Connection, PoseCatalog,
        angle::{Joint, joint_angle_degrees, shared_vertex},
    },
    types::Landmark,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AngleMode {
    /// x/y only.
    #[default]
    Planar,
    /// x/y/z; depth noise makes this mode use a stricter tolerance.
    Spatial,
}

impl AngleMode {
    pub fn default_tolerance(self) -> f32 {
        match self {
            AngleMode::Planar => 20.0,
            AngleMode::Spatial => 10.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStyle {
    #[default]
    Normal,
    Correct,
    Wrong,
}

impl ConnectionStyle {
    pub fn color(self) -> [u8; 3] {
        match self {
            ConnectionStyle::Normal => [128, 128, 128],
            ConnectionStyle::Correct => [48, 255, 48],
            ConnectionStyle::Wrong => [255, 48, 48],
        }
    }

    pub fn thickness(self) -> u32 {
        match self {
            ConnectionStyle::Normal | ConnectionStyle::Correct => 2,
            ConnectionStyle::Wrong => 3,
        }
    }
}

/// Style of every connection in the topology table for one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Classification {
    styles: [ConnectionStyle; Connection::COUNT],
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            styles: [ConnectionStyle::Normal; Connection::COUNT],
        }
    }
}

impl Classification {
    pub fn style(&self, connection: Connection) -> ConnectionStyle {
        self.styles[connection.ordinal()]
    }

    fn set(&mut self, connection: Connection, style: ConnectionStyle) {
        self.styles[connection.ordinal()] = style;
    }

    pub fn iter(&self) -> impl Iterator<Item = (Connection, ConnectionStyle)> + '_ {
        Connection::ALL.iter().copied().zip(self.styles.iter().copied())
    }

    pub fn any_wrong(&self) -> bool {
        self.styles.contains(&ConnectionStyle::Wrong)
    }
}

/// Judges landmarks against the rules of the active pose.
#[derive(Clone, Debug)]
pub struct ConnectionClassifier {
    catalog: Arc<PoseCatalog>,
    mode: AngleMode,
    tolerance: f32,
}

impl ConnectionClassifier {
    pub fn new(catalog: Arc<PoseCatalog>, mode: AngleMode) -> Self {
        Self {
            catalog,
            mode,
            tolerance: mode.default_tolerance(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn catalog(&self) -> &PoseCatalog {
        &self.catalog
    }

    pub fn mode(&self) -> AngleMode {
        self.mode
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Rules run in catalog order; a later rule overrides the style an
    /// earlier rule gave to a shared connection.
    pub fn classify(&self, pose_name: &str, landmarks: &[Landmark]) -> Classification {
        let mut classification = Classification::default();
        if landmarks.is_empty() {
            return classification;
        }
        let Some(pose) = self.catalog.get(pose_name) else {
            return classification;
        };

        for rule in &pose.rules {
            let angle = match self.measure(rule, landmarks) {
                Ok(angle) => angle,
                Err(err) => {
                    log::warn!("skipping rule of pose {:?}: {err}", pose.name);
                    continue;
                }
            };

            let style = if (angle - rule.expected_degrees).abs() < self.tolerance {
                ConnectionStyle::Correct
            } else {
                ConnectionStyle::Wrong
            };
            classification.set(rule.connection_a, style);
            classification.set(rule.connection_b, style);
        }

        classification
    }

    fn measure(&self, rule: &AngleRule, landmarks: &[Landmark]) -> Result<f32> {
        let Joint {
            first,
            vertex,
            second,
        } = shared_vertex(rule.connection_a, rule.connection_b)?;

        let fetch = |index: usize| {
            landmarks
                .get(index)
                .copied()
                .ok_or(Error::LandmarkOutOfRange(index, landmarks.len()))
        };
        let (p1, p2, p3) = (fetch(first)?, fetch(vertex)?, fetch(second)?);

        Ok(match self.mode {
            AngleMode::Planar => joint_angle_degrees([p1.x, p1.y], [p2.x, p2.y], [p3.x, p3.y]),
            AngleMode::Spatial => joint_angle_degrees(spatial(p1), spatial(p2), spatial(p3)),
        })
    }
}

fn spatial(landmark: Landmark) -> [f32; 3] {
    [landmark.x, landmark.y, landmark.z.unwrap_or(0.0)]
}
