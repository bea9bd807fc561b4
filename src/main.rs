//! Runs the hand tracking controller against a synthetic camera and landmarker, and writes the
//! last drawn overlay to `handcam-overlay.png`.

use std::{
    f32::consts::{FRAC_PI_2, PI},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, PoisonError, Weak,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use anyhow::bail;
use handcam::{
    capture::{CameraFeed, CameraStatus, CaptureListener, DeviceOrientation, Frame, Orientation},
    config::{ConfigStore, LandmarkerOptions},
    controller::HandTrackingController,
    inference::{
        HandLandmarker, HandLandmarkerResult, InferenceError, ResultBundle, ResultCallback,
    },
    landmark::{HandLandmark, Landmark},
    overlay::{ContentFit, Size, Viewport},
    render::ImagePresenter,
    resolution::Resolution,
    timer::FpsCounter,
    worker::Worker,
};
use image::{Rgba, RgbaImage};

const FRAMES: u32 = 90;
const FPS: u64 = 30;
const OUTPUT: &str = "handcam-overlay.png";

fn main() -> anyhow::Result<()> {
    handcam::init_logger!();

    let options = LandmarkerOptions::from_env()?;
    log::info!("using model {}", options.model_path().display());
    let config = ConfigStore::new(options)?;

    let camera = Arc::new(SyntheticCamera::new(Resolution::RES_VGA, FRAMES));
    let presenter = Arc::new(ImagePresenter::new(Viewport {
        size: Size::new(480.0, 640.0),
        fit: ContentFit::Fill,
        orientation: Orientation::from_device(DeviceOrientation::LandscapeLeft),
    }));

    let controller = HandTrackingController::builder(
        camera.clone(),
        Arc::new(SyntheticLandmarker::create),
        presenter.clone(),
    )
    .config(config.clone())
    .build()?;

    controller.view_will_appear();

    thread::sleep(Duration::from_secs(1));
    log::info!("switching to two hands");
    config.update(|options| *options = options.clone().with_num_hands(2))?;

    camera.wait();
    controller.sync()?;
    controller.view_will_disappear();

    if !presenter.alerts().is_empty() {
        bail!("controller raised alerts: {:?}", presenter.alerts());
    }
    log::info!("drew {} overlays", presenter.draw_calls());
    presenter.save(OUTPUT)?;
    log::info!("wrote {OUTPUT}");
    Ok(())
}

/// A camera that produces a moving gradient at a fixed frame rate.
struct SyntheticCamera {
    resolution: Resolution,
    frames: u32,
    listener: Mutex<Option<Weak<dyn CaptureListener>>>,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticCamera {
    fn new(resolution: Resolution, frames: u32) -> Self {
        Self {
            resolution,
            frames,
            listener: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        }
    }

    /// Blocks until the capture thread has delivered all of its frames or was stopped.
    fn wait(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.join().ok();
        }
    }
}

fn gradient(resolution: Resolution, phase: u32) -> RgbaImage {
    RgbaImage::from_fn(resolution.width(), resolution.height(), |x, y| {
        let r = ((x + phase * 4) % 256) as u8;
        let g = (y % 256) as u8;
        Rgba([r, g, 128, 255])
    })
}

impl CameraFeed for SyntheticCamera {
    fn set_listener(&self, listener: Weak<dyn CaptureListener>) {
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(listener);
    }

    fn start_session(&self, on_status: Box<dyn FnOnce(CameraStatus) + Send>) {
        let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        else {
            on_status(CameraStatus::Failed);
            return;
        };

        self.running.store(true, Ordering::Relaxed);
        let running = self.running.clone();
        let (resolution, frames) = (self.resolution, self.frames);
        let spawned = thread::Builder::new()
            .name("synthetic camera".into())
            .spawn(move || {
                let interval = Duration::from_millis(1000 / FPS);
                let mut fps = FpsCounter::new("camera");
                for i in 0..frames {
                    let start = Instant::now();
                    if !running.load(Ordering::Relaxed) {
                        break;
                    }
                    let Some(listener) = listener.upgrade() else { break };
                    listener.on_frame(Frame::new(gradient(resolution, i)), Orientation::Left);
                    drop(listener);
                    fps.tick();
                    thread::sleep(interval.saturating_sub(start.elapsed()));
                }
                log::debug!("synthetic camera finished");
            });

        match spawned {
            Ok(handle) => {
                *self.thread.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                on_status(CameraStatus::Success);
            }
            Err(e) => {
                log::error!("failed to spawn capture thread: {e}");
                on_status(CameraStatus::Failed);
            }
        }
    }

    fn stop_session(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    fn resume_interrupted(&self, on_resumed: Box<dyn FnOnce(bool) + Send>) {
        on_resumed(self.running.load(Ordering::Relaxed));
    }

    fn video_resolution(&self) -> Resolution {
        self.resolution
    }
}

/// A landmarker that "detects" an animated open hand on its own worker thread.
struct SyntheticLandmarker {
    worker: Worker,
    num_hands: u32,
    last_timestamp: AtomicU64,
    on_result: ResultCallback,
}

impl SyntheticLandmarker {
    fn create(
        options: &LandmarkerOptions,
        on_result: ResultCallback,
    ) -> anyhow::Result<Arc<dyn HandLandmarker>> {
        let worker = Worker::builder().name("synthetic landmarker").spawn()?;
        Ok(Arc::new(Self {
            worker,
            num_hands: options.num_hands(),
            last_timestamp: AtomicU64::new(0),
            on_result,
        }))
    }
}

impl HandLandmarker for SyntheticLandmarker {
    fn detect_async(
        &self,
        frame: &Frame,
        _orientation: Orientation,
        timestamp_ms: u64,
    ) -> Result<(), InferenceError> {
        let previous_ms = self.last_timestamp.swap(timestamp_ms, Ordering::Relaxed);
        if timestamp_ms <= previous_ms {
            return Err(InferenceError::NonMonotonicTimestamp {
                timestamp_ms,
                previous_ms,
            });
        }

        let image_size = frame.resolution();
        let num_hands = self.num_hands;
        let on_result = self.on_result.clone();
        self.worker.dispatch(move || {
            let start = Instant::now();
            let t = (timestamp_ms % 4000) as f32 / 4000.0 * 2.0 * PI;
            let landmarks = (0..num_hands)
                .map(|i| {
                    let center_x = (i + 1) as f32 / (num_hands + 1) as f32;
                    open_hand(center_x, 0.7, t + i as f32 * PI)
                })
                .collect();
            on_result(Ok(ResultBundle {
                inference_time: start.elapsed(),
                image_size,
                results: vec![HandLandmarkerResult {
                    landmarks,
                    ..Default::default()
                }],
            }));
        });
        Ok(())
    }
}

/// Builds an open hand with its wrist at (`x`, `y`), waving by an angle derived from `t`.
fn open_hand(x: f32, y: f32, t: f32) -> Vec<Landmark> {
    let tilt = t.sin() * 0.3;
    let mut landmarks = vec![Landmark::new([x, y, 0.0])];
    // Thumb, then index through pinky; 4 joints each.
    for finger in 0..5 {
        let angle = -FRAC_PI_2 + tilt + (finger as f32 - 2.0) * 0.35;
        let (dx, dy) = (angle.cos(), angle.sin());
        for joint in 1..=4 {
            let dist = 0.06 * joint as f32 + if finger == 0 { 0.0 } else { 0.04 };
            landmarks.push(Landmark::new([x + dx * dist, y + dy * dist, 0.0]));
        }
    }
    debug_assert_eq!(landmarks.len(), HandLandmark::COUNT);
    landmarks
}
