//! Hand landmark inference collaborator.
//!
//! The landmark model runs outside this crate, behind [`HandLandmarker`]. Services are created
//! by a [`LandmarkerFactory`] from the current [`LandmarkerOptions`] and report every processed
//! frame through the [`ResultCallback`] they were created with.

use std::{sync::Arc, time::Duration};

use crate::{
    capture::{Frame, Orientation},
    config::LandmarkerOptions,
    landmark::Landmark,
    resolution::Resolution,
};

/// A classification label with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub index: i32,
    pub score: f32,
    pub name: String,
}

/// Detection output for one frame.
///
/// All three lists have one entry per detected hand, in the same order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HandLandmarkerResult {
    /// Normalized image landmarks, [`HandLandmark::COUNT`] per hand.
    ///
    /// [`HandLandmark::COUNT`]: crate::landmark::HandLandmark::COUNT
    pub landmarks: Vec<Vec<Landmark>>,
    /// World landmarks in metres.
    pub world_landmarks: Vec<Vec<Landmark>>,
    /// Left/right classification of each hand.
    pub handedness: Vec<Vec<Category>>,
}

impl HandLandmarkerResult {
    /// Returns the number of hands in this result.
    pub fn num_hands(&self) -> usize {
        self.landmarks.len()
    }

    /// Returns `true` if no hand was detected.
    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// Everything a service reports for one processed frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBundle {
    /// Time between submitting the frame and the result becoming available.
    pub inference_time: Duration,
    /// Resolution of the frame the result was computed on.
    ///
    /// Informational only: overlays are placed using the camera's
    /// [`video_resolution`](crate::capture::CameraFeed::video_resolution).
    pub image_size: Resolution,
    pub results: Vec<HandLandmarkerResult>,
}

impl ResultBundle {
    /// Returns the first result, which is the one drawn on screen.
    pub fn first(&self) -> Option<&HandLandmarkerResult> {
        self.results.first()
    }
}

/// Errors reported by a [`HandLandmarker`].
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    /// Live-stream detection requires strictly increasing timestamps.
    #[error("timestamp {timestamp_ms} ms is not greater than the previous one ({previous_ms} ms)")]
    NonMonotonicTimestamp { timestamp_ms: u64, previous_ms: u64 },
    /// The frame could not be processed.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Callback invoked by a service with the outcome of every `detect_async` call.
///
/// May be called from any thread, in completion order.
pub type ResultCallback = Arc<dyn Fn(Result<ResultBundle, InferenceError>) + Send + Sync>;

/// A running hand landmark detection service in live-stream mode.
pub trait HandLandmarker: Send + Sync {
    /// Submits a frame for asynchronous detection.
    ///
    /// The result is delivered through the service's [`ResultCallback`]. An `Err` return means
    /// the frame was rejected up front and no callback will follow for it.
    fn detect_async(
        &self,
        frame: &Frame,
        orientation: Orientation,
        timestamp_ms: u64,
    ) -> Result<(), InferenceError>;
}

/// Creates [`HandLandmarker`] services.
pub trait LandmarkerFactory: Send + Sync {
    fn create(
        &self,
        options: &LandmarkerOptions,
        on_result: ResultCallback,
    ) -> anyhow::Result<Arc<dyn HandLandmarker>>;
}

impl<F> LandmarkerFactory for F
where
    F: Fn(&LandmarkerOptions, ResultCallback) -> anyhow::Result<Arc<dyn HandLandmarker>>
        + Send
        + Sync,
{
    fn create(
        &self,
        options: &LandmarkerOptions,
        on_result: ResultCallback,
    ) -> anyhow::Result<Arc<dyn HandLandmarker>> {
        self(options, on_result)
    }
}

/// Receives the raw outcome of every inference, before any overlay is computed.
///
/// Called on the UI context.
pub trait ResultObserver: Send + Sync {
    fn did_perform_inference(&self, outcome: Result<&ResultBundle, &InferenceError>);
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn first_result() {
        let mut bundle = ResultBundle {
            inference_time: Duration::from_millis(12),
            image_size: Resolution::RES_VGA,
            results: Vec::new(),
        };
        assert!(bundle.first().is_none());

        bundle.results.push(HandLandmarkerResult {
            landmarks: vec![vec![Landmark::new([0.5, 0.5, 0.0]); 21]],
            ..Default::default()
        });
        bundle.results.push(HandLandmarkerResult::default());
        let first = bundle.first().unwrap();
        assert_eq!(first.num_hands(), 1);
        assert!(!first.is_empty());
        assert!(bundle.results[1].is_empty());
    }

    #[test]
    fn error_messages() {
        let err = InferenceError::NonMonotonicTimestamp {
            timestamp_ms: 5,
            previous_ms: 9,
        };
        assert_eq!(
            err.to_string(),
            "timestamp 5 ms is not greater than the previous one (9 ms)"
        );
        let err = InferenceError::from(anyhow!("model crashed"));
        assert_eq!(err.to_string(), "model crashed");
    }

    struct Nop;

    impl HandLandmarker for Nop {
        fn detect_async(&self, _: &Frame, _: Orientation, _: u64) -> Result<(), InferenceError> {
            Ok(())
        }
    }

    #[test]
    fn closures_are_factories() {
        let factory = |options: &LandmarkerOptions, _: ResultCallback| {
            anyhow::ensure!(options.num_hands() < 3, "too many hands");
            Ok(Arc::new(Nop) as Arc<dyn HandLandmarker>)
        };
        let cb: ResultCallback = Arc::new(|_| {});
        let factory: &dyn LandmarkerFactory = &factory;
        factory
            .create(&LandmarkerOptions::default(), cb.clone())
            .unwrap();
        factory
            .create(&LandmarkerOptions::default().with_num_hands(3), cb)
            .err()
            .unwrap();
    }
}
