use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, de};

/// Number of landmarks the body landmark model reports per person.
pub const LANDMARK_COUNT: usize = 33;

macro_rules! connections {
    ($($variant:ident = ($a:expr, $b:expr) => $name:literal,)*) => {
        /// Named skeletal segment between two body landmarks.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Connection {
            $($variant,)*
        }

        impl Connection {
            pub const ALL: &'static [Connection] = &[$(Connection::$variant,)*];
            pub const COUNT: usize = Self::ALL.len();

            pub fn landmarks(self) -> (usize, usize) {
                match self {
                    $(Connection::$variant => ($a, $b),)*
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $(Connection::$variant => $name,)*
                }
            }
        }

        impl FromStr for Connection {
            type Err = UnknownConnection;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok(Connection::$variant),)*
                    _ => Err(UnknownConnection(s.to_string())),
                }
            }
        }
    };
}

connections! {
    // face
    NoseToLeftEyeInner = (0, 1) => "NOSE_TO_LEFT_EYE_INNER",
    LeftEyeInnerToLeftEye = (1, 2) => "LEFT_EYE_INNER_TO_LEFT_EYE",
    LeftEyeToLeftEyeOuter = (2, 3) => "LEFT_EYE_TO_LEFT_EYE_OUTER",
    LeftEyeOuterToLeftEar = (3, 7) => "LEFT_EYE_OUTER_TO_LEFT_EAR",
    NoseToRightEyeInner = (0, 4) => "NOSE_TO_RIGHT_EYE_INNER",
    RightEyeInnerToRightEye = (4, 5) => "RIGHT_EYE_INNER_TO_RIGHT_EYE",
    RightEyeToRightEyeOuter = (5, 6) => "RIGHT_EYE_TO_RIGHT_EYE_OUTER",
    RightEyeOuterToRightEar = (6, 8) => "RIGHT_EYE_OUTER_TO_RIGHT_EAR",
    NoseToLeftEar = (0, 7) => "NOSE_TO_LEFT_EAR",
    NoseToRightEar = (0, 8) => "NOSE_TO_RIGHT_EAR",
    MouthLeftToMouthRight = (9, 10) => "MOUTH_LEFT_TO_MOUTH_RIGHT",
    // torso
    LeftShoulderToRightShoulder = (11, 12) => "LEFT_SHOULDER_TO_RIGHT_SHOULDER",
    LeftShoulderToLeftHip = (11, 23) => "LEFT_SHOULDER_TO_LEFT_HIP",
    RightShoulderToRightHip = (12, 24) => "RIGHT_SHOULDER_TO_RIGHT_HIP",
    LeftHipToRightHip = (23, 24) => "LEFT_HIP_TO_RIGHT_HIP",
    // left arm
    LeftShoulderToLeftElbow = (11, 13) => "LEFT_SHOULDER_TO_LEFT_ELBOW",
    LeftElbowToLeftWrist = (13, 15) => "LEFT_ELBOW_TO_LEFT_WRIST",
    LeftWristToLeftPinky = (15, 17) => "LEFT_WRIST_TO_LEFT_PINKY",
    LeftWristToLeftIndex = (15, 19) => "LEFT_WRIST_TO_LEFT_INDEX",
    LeftWristToLeftThumb = (15, 21) => "LEFT_WRIST_TO_LEFT_THUMB",
    LeftPinkyToLeftIndex = (17, 19) => "LEFT_PINKY_TO_LEFT_INDEX",
    // right arm
    RightShoulderToRightElbow = (12, 14) => "RIGHT_SHOULDER_TO_RIGHT_ELBOW",
    RightElbowToRightWrist = (14, 16) => "RIGHT_ELBOW_TO_RIGHT_WRIST",
    RightWristToRightPinky = (16, 18) => "RIGHT_WRIST_TO_RIGHT_PINKY",
    RightWristToRightIndex = (16, 20) => "RIGHT_WRIST_TO_RIGHT_INDEX",
    RightWristToRightThumb = (16, 22) => "RIGHT_WRIST_TO_RIGHT_THUMB",
    RightPinkyToRightIndex = (18, 20) => "RIGHT_PINKY_TO_RIGHT_INDEX",
    // left leg
    LeftHipToLeftKnee = (23, 25) => "LEFT_HIP_TO_LEFT_KNEE",
    LeftKneeToLeftAnkle = (25, 27) => "LEFT_KNEE_TO_LEFT_ANKLE",
    LeftAnkleToLeftHeel = (27, 29) => "LEFT_ANKLE_TO_LEFT_HEEL",
    LeftAnkleToLeftFootIndex = (27, 31) => "LEFT_ANKLE_TO_LEFT_FOOT_INDEX",
    LeftFoot = (29, 31) => "LEFT_FOOT",
    // right leg
    RightHipToRightKnee = (24, 26) => "RIGHT_HIP_TO_RIGHT_KNEE",
    RightKneeToRightAnkle = (26, 28) => "RIGHT_KNEE_TO_RIGHT_ANKLE",
    RightAnkleToRightHeel = (28, 30) => "RIGHT_ANKLE_TO_RIGHT_HEEL",
    RightAnkleToRightFootIndex = (28, 32) => "RIGHT_ANKLE_TO_RIGHT_FOOT_INDEX",
    RightFoot = (30, 32) => "RIGHT_FOOT",
}

impl Connection {
    /// Position of this connection in [`Connection::ALL`].
    pub fn ordinal(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown body connection: {0}")]
pub struct UnknownConnection(pub String);

impl<'de> Deserialize<'de> for Connection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(de::Error::custom)
    }
}
