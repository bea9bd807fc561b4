//! Hand landmark types.

type Position = [f32; 3];

/// A landmark in 3D space.
///
/// For image landmarks, `x` and `y` are normalized to the image size (`0.0..=1.0`) and `z` is the
/// depth relative to the wrist, on roughly the same scale as `x`. For world landmarks, all three
/// coordinates are in metres, relative to the hand's approximate geometric center.
#[derive(Debug, PartialEq, PartialOrd, Clone, Copy)]
pub struct Landmark {
    pos: Position,
    visibility: Option<f32>,
    presence: Option<f32>,
}

impl Landmark {
    pub fn new(position: Position) -> Self {
        Self {
            pos: position,
            visibility: None,
            presence: None,
        }
    }

    pub fn with_visibility(self, visibility: f32) -> Self {
        Self {
            visibility: Some(visibility),
            ..self
        }
    }

    pub fn with_presence(self, presence: f32) -> Self {
        Self {
            presence: Some(presence),
            ..self
        }
    }

    #[inline]
    pub fn position(&self) -> Position {
        self.pos
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.pos[0]
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.pos[1]
    }

    #[inline]
    pub fn z(&self) -> f32 {
        self.pos[2]
    }

    /// Likelihood of the landmark being visible (not occluded) in the image, if estimated.
    #[inline]
    pub fn visibility(&self) -> Option<f32> {
        self.visibility
    }

    /// Likelihood of the landmark being inside the image frame, if estimated.
    #[inline]
    pub fn presence(&self) -> Option<f32> {
        self.presence
    }
}

/// Names for the 21 hand landmarks, in the order the landmark model outputs them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

impl HandLandmark {
    /// Number of landmarks the model reports per hand.
    pub const COUNT: usize = 21;

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Pairs of landmarks that are joined by a line when drawing a hand skeleton.
pub const HAND_CONNECTIONS: &[(HandLandmark, HandLandmark)] = {
    use HandLandmark::*;
    &[
        // Thumb:
        (Wrist, ThumbCmc),
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (Wrist, IndexFingerMcp),
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky, closing the palm:
        (RingFingerMcp, PinkyMcp),
        (Wrist, PinkyMcp),
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_match_model_order() {
        assert_eq!(HandLandmark::Wrist.index(), 0);
        assert_eq!(HandLandmark::MiddleFingerMcp.index(), 9);
        assert_eq!(HandLandmark::PinkyTip.index(), HandLandmark::COUNT - 1);
    }

    #[test]
    fn connections_cover_every_landmark() {
        let mut seen = [false; HandLandmark::COUNT];
        for (a, b) in HAND_CONNECTIONS {
            seen[a.index()] = true;
            seen[b.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
        assert_eq!(HAND_CONNECTIONS.len(), 21);
    }

    #[test]
    fn landmark_accessors() {
        let lm = Landmark::new([0.25, 0.5, -0.1])
            .with_visibility(0.9)
            .with_presence(0.8);
        assert_eq!(lm.x(), 0.25);
        assert_eq!(lm.y(), 0.5);
        assert_eq!(lm.z(), -0.1);
        assert_eq!(lm.position(), [0.25, 0.5, -0.1]);
        assert_eq!(lm.visibility(), Some(0.9));
        assert_eq!(lm.presence(), Some(0.8));
        assert_eq!(Landmark::new([0.0; 3]).visibility(), None);
    }
}
