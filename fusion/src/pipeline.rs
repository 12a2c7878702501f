//! Per-frame orchestration of the five stages.

use std::fmt;
use std::time::{Duration, Instant};

use glam::Mat4;
use log::{debug, warn};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::common::{Error, Result};
use crate::frame::{CameraIntrinsics, DepthFrame, PointNormalMap, Volume};
use crate::icp::PoseEstimator;
use crate::stage::{DepthSource, Measurement, SurfacePrediction, VolumetricUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum Stage {
    Acquisition,
    Measurement,
    PoseEstimation,
    VolumetricUpdate,
    SurfacePrediction,
}

/// Wall-clock time of each stage in the most recent run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageTimings {
    durations: [Duration; 5],
}

impl StageTimings {
    pub fn get(&self, stage: Stage) -> Duration {
        self.durations[stage as usize]
    }

    pub fn total(&self) -> Duration {
        self.durations.iter().sum()
    }

    fn set(&mut self, stage: Stage, elapsed: Duration) {
        self.durations[stage as usize] = elapsed;
    }
}

impl fmt::Display for StageTimings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in Stage::iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:.2?}", stage, self.get(stage))?;
        }
        Ok(())
    }
}

fn timed<T>(timings: &mut StageTimings, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let start = Instant::now();
    let result = f();
    timings.set(stage, start.elapsed());
    result
}

/// Drives one frame through acquisition, measurement, pose estimation,
/// volumetric update and surface prediction.
///
/// The pipeline owns the latest artifact of every stage and hands it back
/// to the producing stage on the next run for reuse. The predicted map and
/// pose of one run are the tracking reference of the next.
#[derive(Default)]
pub struct Pipeline {
    source: Option<Box<dyn DepthSource>>,
    measurement: Option<Box<dyn Measurement>>,
    estimator: Option<Box<dyn PoseEstimator>>,
    update: Option<Box<dyn VolumetricUpdate>>,
    prediction: Option<Box<dyn SurfacePrediction>>,

    frame: Option<DepthFrame>,
    measured: Option<PointNormalMap>,
    pose: Option<Mat4>,
    volume: Option<Volume>,
    predicted: Option<PointNormalMap>,
    timings: StageTimings,
    frames: usize,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source(&mut self, source: impl DepthSource + 'static) -> &mut Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn set_measurement(&mut self, measurement: impl Measurement + 'static) -> &mut Self {
        self.measurement = Some(Box::new(measurement));
        self
    }

    pub fn set_estimator(&mut self, estimator: impl PoseEstimator + 'static) -> &mut Self {
        self.estimator = Some(Box::new(estimator));
        self
    }

    pub fn set_update(&mut self, update: impl VolumetricUpdate + 'static) -> &mut Self {
        self.update = Some(Box::new(update));
        self
    }

    pub fn set_prediction(&mut self, prediction: impl SurfacePrediction + 'static) -> &mut Self {
        self.prediction = Some(Box::new(prediction));
        self
    }

    /// Stages without a bound collaborator.
    pub fn missing_stages(&self) -> Vec<Stage> {
        Stage::iter()
            .filter(|stage| match stage {
                Stage::Acquisition => self.source.is_none(),
                Stage::Measurement => self.measurement.is_none(),
                Stage::PoseEstimation => self.estimator.is_none(),
                Stage::VolumetricUpdate => self.update.is_none(),
                Stage::SurfacePrediction => self.prediction.is_none(),
            })
            .collect()
    }

    /// Processes the next frame.
    ///
    /// Fails without touching any stage when a collaborator is unbound. A
    /// failing stage ends the run with its error; artifacts already produced
    /// in this run are kept. The pose and predicted map only change together:
    /// up to a failed volumetric update both stay from the previous run, and
    /// a failed surface prediction clears both like [`Pipeline::reset`].
    pub fn run(&mut self) -> Result<()> {
        let (Some(source), Some(measurement), Some(estimator), Some(update), Some(prediction)) = (
            self.source.as_mut(),
            self.measurement.as_mut(),
            self.estimator.as_mut(),
            self.update.as_mut(),
            self.prediction.as_mut(),
        ) else {
            let missing: Vec<String> = self.missing_stages().iter().map(|s| s.to_string()).collect();
            return Err(Error::Config(format!(
                "pipeline stages not bound: {}",
                missing.join(", ")
            )));
        };

        let camera: CameraIntrinsics = source.camera();
        let timings = &mut self.timings;

        let recycled = self.frame.take();
        let frame = self.frame.insert(timed(timings, Stage::Acquisition, || {
            source.next_frame(recycled)
        })?);

        let recycled = self.measured.take();
        let measured = self.measured.insert(timed(timings, Stage::Measurement, || {
            measurement.measure(frame, &camera, recycled)
        })?);

        let pose = timed(timings, Stage::PoseEstimation, || {
            estimator.estimate(measured, self.predicted.as_mut(), self.pose.as_ref())
        })?;

        let recycled = self.volume.take();
        let volume = self.volume.insert(timed(timings, Stage::VolumetricUpdate, || {
            update.integrate(frame, &camera, &pose, recycled)
        })?);

        // Pose and predicted map are committed together; the recycled map is
        // gone once prediction fails, so tracking restarts.
        let recycled = self.predicted.take();
        match timed(timings, Stage::SurfacePrediction, || {
            prediction.predict(volume, &pose, &camera, recycled)
        }) {
            Ok(predicted) => {
                self.predicted = Some(predicted);
                self.pose = Some(pose);
            }
            Err(err) => {
                warn!("Surface prediction failed, tracking restarts: {}", err);
                self.pose = None;
                estimator.reset();
                return Err(err);
            }
        }

        self.frames += 1;
        debug!("Frame {}: {}", self.frames, self.timings);
        Ok(())
    }

    /// Forgets the tracking reference so the next run starts from the
    /// estimator's initial pose.
    pub fn reset(&mut self) {
        self.pose = None;
        self.predicted = None;
        if let Some(estimator) = self.estimator.as_mut() {
            estimator.reset();
        }
    }

    pub fn timings(&self) -> &StageTimings {
        &self.timings
    }

    /// Number of frames fully processed.
    pub fn frames_processed(&self) -> usize {
        self.frames
    }

    pub fn camera(&self) -> Option<CameraIntrinsics> {
        self.source.as_ref().map(|source| source.camera())
    }

    pub fn frame(&self) -> Option<&DepthFrame> {
        self.frame.as_ref()
    }

    pub fn frame_mut(&mut self) -> Option<&mut DepthFrame> {
        self.frame.as_mut()
    }

    pub fn measured_map(&self) -> Option<&PointNormalMap> {
        self.measured.as_ref()
    }

    pub fn measured_map_mut(&mut self) -> Option<&mut PointNormalMap> {
        self.measured.as_mut()
    }

    pub fn pose(&self) -> Option<&Mat4> {
        self.pose.as_ref()
    }

    pub fn volume(&self) -> Option<&Volume> {
        self.volume.as_ref()
    }

    pub fn volume_mut(&mut self) -> Option<&mut Volume> {
        self.volume.as_mut()
    }

    pub fn predicted_map(&self) -> Option<&PointNormalMap> {
        self.predicted.as_ref()
    }

    pub fn predicted_map_mut(&mut self) -> Option<&mut PointNormalMap> {
        self.predicted.as_mut()
    }
}
