//! Landmark index tables for the supported face detector models
//!
//! Indices are tied to the detector model version. Swapping the upstream
//! detector means adding a new layout here, never editing indices in place.

use crate::types::EyeSide;
use serde::{Deserialize, Serialize};

/// MediaPipe Face Mesh with iris refinement (478 landmarks)
pub mod mediapipe {
    /// Left eye: outer corner, upper lid x2, inner corner, lower lid x2
    pub const LEFT_EYE_CONTOUR: [usize; 6] = [33, 160, 158, 133, 153, 144];
    /// Right eye, same ordering as the left
    pub const RIGHT_EYE_CONTOUR: [usize; 6] = [362, 387, 385, 263, 380, 373];
    /// Left iris; the first entry is the iris center
    pub const LEFT_IRIS: [usize; 5] = [468, 469, 470, 471, 472];
    /// Right iris; the first entry is the iris center
    pub const RIGHT_IRIS: [usize; 5] = [473, 474, 475, 476, 477];
    pub const LANDMARK_COUNT: usize = 478;
}

/// face-api.js / dlib 68-point layout (no iris landmarks)
pub mod face_api_68 {
    pub const LEFT_EYE_CONTOUR: [usize; 6] = [36, 37, 38, 39, 40, 41];
    pub const RIGHT_EYE_CONTOUR: [usize; 6] = [42, 43, 44, 45, 46, 47];
    pub const LANDMARK_COUNT: usize = 68;
}

/// Index sets for one eye
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeIndices {
    /// Six EAR-ordered contour landmarks
    pub contour: [usize; 6],
    /// Iris landmarks, empty when the model has none
    pub iris: &'static [usize],
}

/// Named per-eye index tables of one detector model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkLayout {
    pub name: &'static str,
    pub left: EyeIndices,
    pub right: EyeIndices,
}

impl LandmarkLayout {
    pub fn eye(&self, side: EyeSide) -> &EyeIndices {
        match side {
            EyeSide::Left => &self.left,
            EyeSide::Right => &self.right,
        }
    }

    /// Minimum frame length for every contour index to be addressable
    pub fn required_len(&self) -> usize {
        self.left
            .contour
            .iter()
            .chain(self.right.contour.iter())
            .max()
            .map(|i| i + 1)
            .unwrap_or(0)
    }

    pub fn has_iris(&self) -> bool {
        !self.left.iris.is_empty() && !self.right.iris.is_empty()
    }
}

pub const MEDIAPIPE_FACE_MESH: LandmarkLayout = LandmarkLayout {
    name: "mediapipe-face-mesh",
    left: EyeIndices {
        contour: mediapipe::LEFT_EYE_CONTOUR,
        iris: &mediapipe::LEFT_IRIS,
    },
    right: EyeIndices {
        contour: mediapipe::RIGHT_EYE_CONTOUR,
        iris: &mediapipe::RIGHT_IRIS,
    },
};

pub const FACE_API_68: LandmarkLayout = LandmarkLayout {
    name: "face-api-68",
    left: EyeIndices {
        contour: face_api_68::LEFT_EYE_CONTOUR,
        iris: &[],
    },
    right: EyeIndices {
        contour: face_api_68::RIGHT_EYE_CONTOUR,
        iris: &[],
    },
};

/// Which detector model produced the frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandmarkModel {
    #[serde(rename = "mediapipe-face-mesh")]
    MediaPipeFaceMesh,
    #[serde(rename = "face-api-68")]
    FaceApi68,
}

impl LandmarkModel {
    pub const ALL: [LandmarkModel; 2] = [Self::MediaPipeFaceMesh, Self::FaceApi68];

    pub fn layout(&self) -> &'static LandmarkLayout {
        match self {
            Self::MediaPipeFaceMesh => &MEDIAPIPE_FACE_MESH,
            Self::FaceApi68 => &FACE_API_68,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.layout().name
    }
}
