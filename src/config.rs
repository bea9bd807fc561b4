//! Hand landmarker configuration and change notification.
//!
//! # Environment Variables
//!
//! [`LandmarkerOptions::from_env`] starts from the defaults and applies these overrides:
//!
//! * `HANDCAM_MODEL_PATH`: path to the model bundle.
//! * `HANDCAM_NUM_HANDS`: maximum number of hands to detect.
//! * `HANDCAM_DETECTION_CONFIDENCE`: minimum hand detection confidence.
//! * `HANDCAM_PRESENCE_CONFIDENCE`: minimum hand presence confidence.
//! * `HANDCAM_TRACKING_CONFIDENCE`: minimum tracking confidence.
//! * `HANDCAM_COMPUTE`: `cpu` or `gpu`.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, Mutex, PoisonError, RwLock, Weak},
};

use crate::drop::{defer, Defer};

const ENV_VAR_MODEL_PATH: &str = "HANDCAM_MODEL_PATH";
const ENV_VAR_NUM_HANDS: &str = "HANDCAM_NUM_HANDS";
const ENV_VAR_DETECTION_CONFIDENCE: &str = "HANDCAM_DETECTION_CONFIDENCE";
const ENV_VAR_PRESENCE_CONFIDENCE: &str = "HANDCAM_PRESENCE_CONFIDENCE";
const ENV_VAR_TRACKING_CONFIDENCE: &str = "HANDCAM_TRACKING_CONFIDENCE";
const ENV_VAR_COMPUTE: &str = "HANDCAM_COMPUTE";

/// Errors produced when validating or loading a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("`num_hands` must be at least 1")]
    NoHands,
    #[error("`{name}` must be in range 0.0..=1.0, got {value}")]
    ConfidenceOutOfRange { name: &'static str, value: f32 },
    #[error("invalid value '{value}' for `{var}`")]
    InvalidEnv { var: &'static str, value: String },
}

/// Hardware the inference service should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compute {
    #[default]
    Cpu,
    Gpu,
}

impl FromStr for Compute {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "gpu" => Ok(Self::Gpu),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        })
    }
}

/// Parameters used to construct a hand landmarker service.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkerOptions {
    model_path: PathBuf,
    num_hands: u32,
    min_hand_detection_confidence: f32,
    min_hand_presence_confidence: f32,
    min_tracking_confidence: f32,
    compute: Compute,
}

impl Default for LandmarkerOptions {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(Self::DEFAULT_MODEL_PATH),
            num_hands: 1,
            min_hand_detection_confidence: 0.5,
            min_hand_presence_confidence: 0.5,
            min_tracking_confidence: 0.5,
            compute: Compute::Cpu,
        }
    }
}

impl LandmarkerOptions {
    pub const DEFAULT_MODEL_PATH: &'static str = "hand_landmarker.task";

    /// Builds options from the defaults, overridden by `HANDCAM_*` environment variables.
    ///
    /// The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        let read = |var: &'static str| {
            let value = lookup(var);
            if let Some(value) = &value {
                log::debug!("config override: `{var}` is set to '{value}'");
            }
            value
        };

        if let Some(path) = read(ENV_VAR_MODEL_PATH) {
            options.model_path = path.into();
        }
        if let Some(value) = read(ENV_VAR_NUM_HANDS) {
            options.num_hands = parse_env(ENV_VAR_NUM_HANDS, value)?;
        }
        if let Some(value) = read(ENV_VAR_DETECTION_CONFIDENCE) {
            options.min_hand_detection_confidence = parse_env(ENV_VAR_DETECTION_CONFIDENCE, value)?;
        }
        if let Some(value) = read(ENV_VAR_PRESENCE_CONFIDENCE) {
            options.min_hand_presence_confidence = parse_env(ENV_VAR_PRESENCE_CONFIDENCE, value)?;
        }
        if let Some(value) = read(ENV_VAR_TRACKING_CONFIDENCE) {
            options.min_tracking_confidence = parse_env(ENV_VAR_TRACKING_CONFIDENCE, value)?;
        }
        if let Some(value) = read(ENV_VAR_COMPUTE) {
            options.compute = parse_env(ENV_VAR_COMPUTE, value)?;
        }

        options.validate()?;
        Ok(options)
    }

    /// Sets the path of the model bundle to load.
    #[inline]
    pub fn with_model_path(self, path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: path.into(),
            ..self
        }
    }

    /// Sets the maximum number of hands the service will report per frame.
    #[inline]
    pub fn with_num_hands(self, num_hands: u32) -> Self {
        Self { num_hands, ..self }
    }

    /// Sets the minimum confidence for the palm detector to report a hand.
    #[inline]
    pub fn with_min_hand_detection_confidence(self, confidence: f32) -> Self {
        Self {
            min_hand_detection_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum hand presence score for the landmark model.
    #[inline]
    pub fn with_min_hand_presence_confidence(self, confidence: f32) -> Self {
        Self {
            min_hand_presence_confidence: confidence,
            ..self
        }
    }

    /// Sets the minimum confidence below which tracking is considered lost and detection runs
    /// again.
    #[inline]
    pub fn with_min_tracking_confidence(self, confidence: f32) -> Self {
        Self {
            min_tracking_confidence: confidence,
            ..self
        }
    }

    /// Selects the hardware the service runs on.
    #[inline]
    pub fn with_compute(self, compute: Compute) -> Self {
        Self { compute, ..self }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn num_hands(&self) -> u32 {
        self.num_hands
    }

    pub fn min_hand_detection_confidence(&self) -> f32 {
        self.min_hand_detection_confidence
    }

    pub fn min_hand_presence_confidence(&self) -> f32 {
        self.min_hand_presence_confidence
    }

    pub fn min_tracking_confidence(&self) -> f32 {
        self.min_tracking_confidence
    }

    pub fn compute(&self) -> Compute {
        self.compute
    }

    /// Checks that the hand count is nonzero and every confidence lies in `0.0..=1.0`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_hands == 0 {
            return Err(ConfigError::NoHands);
        }

        for (name, value) in [
            (
                "min_hand_detection_confidence",
                self.min_hand_detection_confidence,
            ),
            (
                "min_hand_presence_confidence",
                self.min_hand_presence_confidence,
            ),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ConfidenceOutOfRange { name, value });
            }
        }

        Ok(())
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

type Callback = Arc<dyn Fn(&LandmarkerOptions) + Send + Sync>;

struct Subscribers {
    next_id: u64,
    list: Vec<(u64, Callback)>,
}

/// Shared, observable [`LandmarkerOptions`].
///
/// Interested parties register a callback with [`ConfigStore::subscribe`] and are notified after
/// every effective change made through [`ConfigStore::update`] or [`ConfigStore::set`].
/// Callbacks run on the thread that made the change, after all internal locks are released.
pub struct ConfigStore {
    options: RwLock<LandmarkerOptions>,
    subscribers: Mutex<Subscribers>,
}

impl ConfigStore {
    /// Creates a store holding `options`, which must be valid.
    pub fn new(options: LandmarkerOptions) -> Result<Arc<Self>, ConfigError> {
        options.validate()?;
        Ok(Arc::new(Self {
            options: RwLock::new(options),
            subscribers: Mutex::new(Subscribers {
                next_id: 0,
                list: Vec::new(),
            }),
        }))
    }

    /// Returns a copy of the current options.
    pub fn options(&self) -> LandmarkerOptions {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `f` to a copy of the current options and stores the result if it is valid.
    ///
    /// Subscribers are notified only if the options actually changed. On error, the stored
    /// options are left untouched.
    pub fn update(&self, f: impl FnOnce(&mut LandmarkerOptions)) -> Result<(), ConfigError> {
        let mut options = self.options();
        f(&mut options);
        self.set(options)
    }

    /// Replaces the options, notifying subscribers if they changed.
    pub fn set(&self, options: LandmarkerOptions) -> Result<(), ConfigError> {
        options.validate()?;
        {
            let mut current = self.options.write().unwrap_or_else(PoisonError::into_inner);
            if *current == options {
                return Ok(());
            }
            *current = options.clone();
        }

        let callbacks = self
            .lock_subscribers()
            .list
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect::<Vec<_>>();
        log::debug!(
            "configuration changed, notifying {} subscriber(s)",
            callbacks.len()
        );
        for cb in callbacks {
            cb(&options);
        }
        Ok(())
    }

    /// Registers `callback` to be invoked with the new options after every change.
    ///
    /// The registration lasts until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&LandmarkerOptions) + Send + Sync + 'static,
    {
        let id = {
            let mut subs = self.lock_subscribers();
            let id = subs.next_id;
            subs.next_id += 1;
            subs.list.push((id, Arc::new(callback)));
            id
        };

        let store = Arc::downgrade(self);
        let unsubscribe: Box<dyn FnOnce() + Send> = Box::new(move || unsubscribe(&store, id));
        Subscription {
            _unsubscribe: defer(unsubscribe),
        }
    }

    /// Returns the number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().list.len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn unsubscribe(store: &Weak<ConfigStore>, id: u64) {
    if let Some(store) = store.upgrade() {
        store.lock_subscribers().list.retain(|(i, _)| *i != id);
    }
}

/// Registration handle returned by [`ConfigStore::subscribe`]. Unsubscribes when dropped.
#[must_use = "dropping a `Subscription` unsubscribes immediately"]
pub struct Subscription {
    _unsubscribe: Defer<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Subscription")
    }
}
