//! Live hand tracking controller.
//!
//! [`HandTrackingController`] glues a [`CameraFeed`], a [`LandmarkerFactory`] and a [`Presenter`]
//! together:
//!
//! - Frames coming from the camera are timestamped and handed to the *frame relay* worker, which
//!   submits them to whichever hand landmarker service is currently installed. If there is none
//!   (during reconfiguration, or while the session is interrupted), the frame is dropped.
//! - Results coming from the service are marshaled onto the *UI* worker, forwarded to the
//!   optional [`ResultObserver`], converted into overlay geometry and drawn.
//! - Session events and configuration changes drive a two-state lifecycle. While *active*, a
//!   service is installed and the controller is subscribed to configuration changes; while
//!   *inactive*, neither is the case.
//!
//! Every presenter call happens on the UI worker.

use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::{
    capture::{CameraFeed, CameraStatus, CaptureListener, Frame, Orientation},
    config::{ConfigStore, LandmarkerOptions, Subscription},
    inference::{
        HandLandmarker, InferenceError, LandmarkerFactory, ResultBundle, ResultCallback,
        ResultObserver,
    },
    overlay::hand_overlays,
    present::{Alert, Presenter},
    slot::ServiceSlot,
    timer::{FpsCounter, FrameClock},
    worker::{DispatchError, Dispatcher, PromiseDropped, Worker},
};

/// Builder for a [`HandTrackingController`].
pub struct ControllerBuilder {
    camera: Arc<dyn CameraFeed>,
    factory: Arc<dyn LandmarkerFactory>,
    presenter: Arc<dyn Presenter>,
    config: Option<Arc<ConfigStore>>,
    observer: Option<Arc<dyn ResultObserver>>,
    frame_queue_capacity: usize,
}

impl ControllerBuilder {
    /// Default number of frames that may wait for the frame relay worker.
    pub const DEFAULT_FRAME_QUEUE_CAPACITY: usize = 1;

    /// Sets the configuration store the service is built from.
    ///
    /// By default, a private store holding [`LandmarkerOptions::default`] is used.
    pub fn config(self, config: Arc<ConfigStore>) -> Self {
        Self {
            config: Some(config),
            ..self
        }
    }

    /// Sets the observer that receives every raw inference outcome.
    pub fn observer(self, observer: Arc<dyn ResultObserver>) -> Self {
        Self {
            observer: Some(observer),
            ..self
        }
    }

    /// Sets how many frames may be queued for the frame relay worker before new frames are
    /// discarded.
    pub fn frame_queue_capacity(self, capacity: usize) -> Self {
        Self {
            frame_queue_capacity: capacity,
            ..self
        }
    }

    /// Spawns the worker threads and registers with the camera.
    pub fn build(self) -> anyhow::Result<HandTrackingController> {
        let config = match self.config {
            Some(config) => config,
            None => ConfigStore::new(LandmarkerOptions::default())?,
        };

        let ui = Worker::builder().name("ui").spawn()?;
        let relay = Worker::builder()
            .name("frame relay")
            .capacity(self.frame_queue_capacity)
            .spawn()?;

        let core = Arc::new_cyclic(|this| Core {
            this: this.clone(),
            camera: self.camera,
            factory: self.factory,
            presenter: self.presenter,
            observer: self.observer,
            config,
            slot: ServiceSlot::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
            ui: ui.dispatcher(),
            relay: relay.dispatcher(),
            clock: FrameClock::new(),
            relay_fps: Mutex::new(FpsCounter::new("frame relay")),
            result_fps: Mutex::new(FpsCounter::new("results")),
        });

        let listener: Arc<dyn CaptureListener> = core.clone();
        core.camera.set_listener(Arc::downgrade(&listener));

        Ok(HandTrackingController { core, ui, relay })
    }
}

#[derive(Default)]
struct Lifecycle {
    /// Between `view_will_appear` and `view_will_disappear`. Session events queued on the UI
    /// worker may only activate while visible.
    visible: bool,
    active: bool,
    subscription: Option<Subscription>,
}

/// State shared between the controller handle, its workers, the camera, and the service.
struct Core {
    this: Weak<Core>,
    camera: Arc<dyn CameraFeed>,
    factory: Arc<dyn LandmarkerFactory>,
    presenter: Arc<dyn Presenter>,
    observer: Option<Arc<dyn ResultObserver>>,
    config: Arc<ConfigStore>,
    slot: ServiceSlot<dyn HandLandmarker>,
    lifecycle: Mutex<Lifecycle>,
    ui: Dispatcher,
    relay: Dispatcher,
    clock: FrameClock,
    relay_fps: Mutex<FpsCounter>,
    result_fps: Mutex<FpsCounter>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Core {
    /// Runs `f` on the UI worker, if the controller is still alive by then.
    fn on_ui(&self, f: impl FnOnce(&Core) + Send + 'static) {
        let this = self.this.clone();
        self.ui.dispatch(move || {
            if let Some(core) = this.upgrade() {
                f(&core);
            }
        });
    }

    // Lifecycle transitions are serialized by the `lifecycle` lock.

    fn show(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.visible = true;
        self.enter_active(&mut lifecycle);
        log::debug!("hand tracking activated");
    }

    fn hide(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.visible = false;
        self.exit_active(&mut lifecycle);
    }

    fn activate(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if !lifecycle.visible {
            log::trace!("view is not visible, staying inactive");
            return;
        }
        self.enter_active(&mut lifecycle);
        log::debug!("hand tracking activated");
    }

    fn enter_active(&self, lifecycle: &mut Lifecycle) {
        // Unsubscribe first so there is never more than one subscription.
        drop(lifecycle.subscription.take());
        self.install_service();
        lifecycle.subscription = Some(self.subscribe());
        lifecycle.active = true;
    }

    fn deactivate(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        self.exit_active(&mut lifecycle);
    }

    fn exit_active(&self, lifecycle: &mut Lifecycle) {
        drop(lifecycle.subscription.take());
        drop(self.slot.take());
        if lifecycle.active {
            log::debug!("hand tracking deactivated");
        }
        lifecycle.active = false;
    }

    fn reconfigure(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if !lifecycle.active {
            log::trace!("ignoring configuration change while inactive");
            return;
        }
        log::debug!("configuration changed, recreating hand landmarker");
        self.enter_active(&mut lifecycle);
    }

    /// Tears down the current service and installs a new one built from the current options.
    fn install_service(&self) {
        drop(self.slot.take());

        let options = self.config.options();
        match self.factory.create(&options, self.result_callback()) {
            Ok(service) => {
                log::debug!(
                    "created hand landmarker (hands={}, detection={}, presence={}, tracking={}, compute={})",
                    options.num_hands(),
                    options.min_hand_detection_confidence(),
                    options.min_hand_presence_confidence(),
                    options.min_tracking_confidence(),
                    options.compute(),
                );
                self.slot.set(Some(service));
            }
            Err(e) => {
                log::warn!("failed to create hand landmarker: {e:#}");
                let reason = format!("{e:#}");
                self.on_ui(move |core| {
                    core.presenter
                        .present_alert(Alert::ServiceUnavailable { reason })
                });
            }
        }
    }

    fn subscribe(&self) -> Subscription {
        let this = self.this.clone();
        self.config.subscribe(move |_| {
            if let Some(core) = this.upgrade() {
                core.on_ui(Core::reconfigure);
            }
        })
    }

    fn result_callback(&self) -> ResultCallback {
        let this = self.this.clone();
        Arc::new(move |outcome| {
            if let Some(core) = this.upgrade() {
                core.on_ui(move |core| core.deliver_result(outcome));
            }
        })
    }

    /// Runs on the frame relay worker.
    fn relay_frame(&self, frame: Frame, orientation: Orientation, timestamp_ms: u64) {
        let Some(service) = self.slot.get() else {
            log::trace!("no hand landmarker installed, dropping frame {timestamp_ms}");
            return;
        };
        if let Err(e) = service.detect_async(&frame, orientation, timestamp_ms) {
            log::warn!("hand landmarker rejected frame {timestamp_ms}: {e}");
        }
        lock(&self.relay_fps).tick();
    }

    /// Runs on the UI worker.
    fn deliver_result(&self, outcome: Result<ResultBundle, InferenceError>) {
        if let Some(observer) = &self.observer {
            observer.did_perform_inference(outcome.as_ref());
        }

        let bundle = match outcome {
            Ok(bundle) => bundle,
            Err(e) => {
                log::warn!("hand landmark detection failed: {e}");
                return;
            }
        };
        lock(&self.result_fps).tick();

        let viewport = self.presenter.viewport();
        let overlays = match bundle.first() {
            Some(result) => hand_overlays(
                &result.landmarks,
                self.camera.video_resolution(),
                &viewport,
            ),
            None => Vec::new(),
        };
        if overlays.is_empty() {
            // Nothing to draw, but the previous hands are gone.
            self.presenter.clear_overlays();
            return;
        }
        self.presenter
            .draw_overlays(&overlays, viewport.size, viewport.fit);
    }

    fn handle_camera_status(&self, status: CameraStatus) {
        match status {
            CameraStatus::Success => {
                self.presenter.set_resume_visible(false);
                self.presenter.set_unavailable_visible(false);
            }
            CameraStatus::Failed => self.presenter.present_alert(Alert::ConfigurationFailed),
            CameraStatus::PermissionDenied => {
                self.presenter.present_alert(Alert::PermissionDenied)
            }
        }
    }

    fn handle_resume(&self, resumed: bool) {
        if resumed {
            self.presenter.set_resume_visible(false);
            self.presenter.set_unavailable_visible(false);
            self.activate();
        } else {
            self.presenter.present_alert(Alert::ResumeFailed);
        }
    }
}

impl CaptureListener for Core {
    fn on_frame(&self, frame: Frame, orientation: Orientation) {
        let timestamp_ms = self.clock.now_ms();
        let this = self.this.clone();
        let res = self.relay.try_dispatch(move || {
            if let Some(core) = this.upgrade() {
                core.relay_frame(frame, orientation, timestamp_ms);
            }
        });
        match res {
            Ok(()) => {}
            Err(DispatchError::Full) => {
                log::trace!("frame relay busy, discarding frame {timestamp_ms}")
            }
            Err(DispatchError::Closed) => {}
        }
    }

    fn on_interrupted(&self, can_resume_manually: bool) {
        log::debug!("camera session interrupted (can_resume_manually={can_resume_manually})");
        self.on_ui(move |core| {
            if can_resume_manually {
                core.presenter.set_resume_visible(true);
            } else {
                core.presenter.set_unavailable_visible(true);
            }
            core.deactivate();
        });
    }

    fn on_interruption_ended(&self) {
        log::debug!("camera session interruption ended");
        self.on_ui(|core| {
            core.presenter.set_unavailable_visible(false);
            core.presenter.set_resume_visible(false);
            core.activate();
        });
    }

    fn on_runtime_error(&self) {
        log::debug!("camera session runtime error");
        self.on_ui(|core| {
            core.presenter.set_resume_visible(true);
            core.deactivate();
        });
    }
}

/// Coordinates camera capture, hand landmark detection, and overlay presentation.
///
/// Dropping the controller deactivates it (unsubscribing from configuration changes and
/// releasing the service) and joins its worker threads. It does not stop the camera session;
/// call [`HandTrackingController::view_will_disappear`] for that.
pub struct HandTrackingController {
    core: Arc<Core>,
    ui: Worker,
    relay: Worker,
}

impl HandTrackingController {
    /// Starts building a controller from its collaborators.
    pub fn builder(
        camera: Arc<dyn CameraFeed>,
        factory: Arc<dyn LandmarkerFactory>,
        presenter: Arc<dyn Presenter>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            camera,
            factory,
            presenter,
            config: None,
            observer: None,
            frame_queue_capacity: ControllerBuilder::DEFAULT_FRAME_QUEUE_CAPACITY,
        }
    }

    /// Activates hand tracking and starts the camera session.
    pub fn view_will_appear(&self) {
        self.core.show();
        let this = self.core.this.clone();
        self.core.camera.start_session(Box::new(move |status| {
            if let Some(core) = this.upgrade() {
                core.on_ui(move |core| core.handle_camera_status(status));
            }
        }));
    }

    /// Stops the camera session and deactivates hand tracking.
    ///
    /// Session events that are still queued (an interruption ending, a successful resume) do
    /// not reactivate the controller until [`HandTrackingController::view_will_appear`] is
    /// called again.
    pub fn view_will_disappear(&self) {
        self.core.camera.stop_session();
        self.core.hide();
    }

    /// Handles a tap on the resume control: tries to restart an interrupted session, and
    /// reactivates hand tracking if that worked.
    pub fn resume_tapped(&self) {
        let this = self.core.this.clone();
        self.core.camera.resume_interrupted(Box::new(move |resumed| {
            if let Some(core) = this.upgrade() {
                core.on_ui(move |core| core.handle_resume(resumed));
            }
        }));
    }

    /// Returns whether the controller is active.
    pub fn is_active(&self) -> bool {
        lock(&self.core.lifecycle).active
    }

    /// Returns the currently installed service, if any.
    pub fn service(&self) -> Option<Arc<dyn HandLandmarker>> {
        self.core.slot.get()
    }

    /// Returns the configuration store the service is built from.
    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.core.config
    }

    /// Blocks until all work queued on the UI and frame relay workers so far has completed.
    ///
    /// Work queued by that work (for example, results a service delivers on another thread) is
    /// not waited for.
    pub fn sync(&self) -> Result<(), PromiseDropped> {
        self.relay.sync()?;
        self.ui.sync()
    }
}

impl Drop for HandTrackingController {
    fn drop(&mut self) {
        self.core.hide();
    }
}

impl fmt::Debug for HandTrackingController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandTrackingController")
            .field("active", &self.is_active())
            .field("slot", &self.core.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crossbeam::channel::{self, Receiver, Sender};
    use image::RgbaImage;

    use crate::{overlay::Viewport, render::ImagePresenter, resolution::Resolution};

    use super::*;

    #[derive(Default)]
    struct StillCamera {
        listener: Mutex<Option<Weak<dyn CaptureListener>>>,
    }

    impl StillCamera {
        fn frame(&self) {
            let listener = lock(&self.listener).as_ref().and_then(Weak::upgrade);
            if let Some(listener) = listener {
                listener.on_frame(Frame::new(RgbaImage::new(4, 4)), Orientation::Up);
            }
        }
    }

    impl CameraFeed for StillCamera {
        fn set_listener(&self, listener: Weak<dyn CaptureListener>) {
            *lock(&self.listener) = Some(listener);
        }
        fn start_session(&self, on_status: Box<dyn FnOnce(CameraStatus) + Send>) {
            on_status(CameraStatus::Success);
        }
        fn stop_session(&self) {}
        fn resume_interrupted(&self, on_resumed: Box<dyn FnOnce(bool) + Send>) {
            on_resumed(true);
        }
        fn video_resolution(&self) -> Resolution {
            Resolution::new(4, 4)
        }
    }

    /// Blocks in `detect_async` until released, reporting when it has started.
    struct GatedLandmarker {
        calls: Arc<AtomicUsize>,
        entered: Sender<()>,
        gate: Receiver<()>,
    }

    impl HandLandmarker for GatedLandmarker {
        fn detect_async(&self, _: &Frame, _: Orientation, _: u64) -> Result<(), InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.send(()).unwrap();
            self.gate.recv().unwrap();
            Ok(())
        }
    }

    #[test]
    fn busy_relay_drops_frames() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (entered_tx, entered_rx) = channel::unbounded();
        let (gate_tx, gate_rx) = channel::unbounded();

        let camera = Arc::new(StillCamera::default());
        let factory = {
            let calls = calls.clone();
            move |_: &LandmarkerOptions, _: ResultCallback| {
                let landmarker: Arc<dyn HandLandmarker> = Arc::new(GatedLandmarker {
                    calls: calls.clone(),
                    entered: entered_tx.clone(),
                    gate: gate_rx.clone(),
                });
                anyhow::Ok(landmarker)
            }
        };
        let presenter = Arc::new(ImagePresenter::new(Viewport::default()));
        let controller =
            HandTrackingController::builder(camera.clone(), Arc::new(factory), presenter)
                .build()
                .unwrap();
        controller.view_will_appear();

        camera.frame();
        entered_rx.recv().unwrap();
        // One frame fits in the queue, the rest are discarded.
        for _ in 0..4 {
            camera.frame();
        }
        for _ in 0..2 {
            gate_tx.send(()).unwrap();
        }
        controller.sync().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn deactivate_is_idempotent() {
        fn no_model(
            _: &LandmarkerOptions,
            _: ResultCallback,
        ) -> anyhow::Result<Arc<dyn HandLandmarker>> {
            anyhow::bail!("no model")
        }

        let camera = Arc::new(StillCamera::default());
        let presenter = Arc::new(ImagePresenter::new(Viewport::default()));
        let controller =
            HandTrackingController::builder(camera, Arc::new(no_model), presenter.clone())
                .build()
                .unwrap();
        assert_eq!(controller.config().subscriber_count(), 0);

        controller.view_will_disappear();
        controller.view_will_disappear();
        assert!(!controller.is_active());
        assert!(controller.service().is_none());
        controller.sync().unwrap();
        assert!(presenter.alerts().is_empty());
    }
}
