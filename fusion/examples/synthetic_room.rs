//! Tracks a camera panning through an analytic box room.
//!
//! Runs the device estimator when a GPU is available and the host estimator
//! otherwise.

use anyhow::Context;
use glam::{Mat4, Vec3};
use log::{info, warn};

use fusion::prelude::*;

fn main() -> anyhow::Result<()> {
    let config = FusionConfig::from_yaml(include_str!("../config/fusion.yaml"))?;
    common::setup_logging(&config.log_level);

    let room = SyntheticRoom::default();
    let frames = if common::is_debug() { 20 } else { 90 };
    let synthetic = SyntheticSource::pan(
        room,
        config.camera,
        frames,
        0.004,
        Vec3::new(0.003, 0.0, 0.004),
    );
    let truth = synthetic.trajectory().to_vec();

    let mut source: Box<dyn DepthSource> = Box::new(synthetic);
    if let Some(capacity) = config.source.buffer_capacity {
        source = Box::new(BufferedSource::new(source, capacity)?);
    }
    if let Some(fps) = config.source.max_fps {
        source = Box::new(RateLimitedSource::new(source, fps)?);
    }

    let mut pipeline = Pipeline::new();
    pipeline
        .set_source(source)
        .set_measurement(BackProjection::new())
        .set_update(
            |frame: &mut DepthFrame,
             _: &CameraIntrinsics,
             _: &Mat4,
             recycled: Option<Volume>|
             -> fusion::Result<Volume> {
                let valid = frame.get()?.iter().filter(|d| d.is_finite()).count();
                let mut buffer = HostValue::recycle(recycled.map(|volume| volume.buffer));
                buffer.get_mut().push(valid as f32);
                Ok(Volume {
                    buffer: buffer.into(),
                    width: 1,
                    height: 1,
                    depth: 1,
                })
            },
        )
        .set_prediction(
            move |_: &mut Volume,
                  pose: &Mat4,
                  camera: &CameraIntrinsics,
                  _: Option<PointNormalMap>|
                  -> fusion::Result<PointNormalMap> {
                Ok(PipelineValue::from_vec(room.render(camera, pose).global_map))
            },
        );

    match ComputeContext::new() {
        Ok(context) => {
            info!("Tracking on the device");
            let queue = context.create_queue();
            pipeline.set_estimator(DevicePoseEstimator::new(
                &queue,
                config.device_icp(),
                config.camera,
            )?);
        }
        Err(e) => {
            warn!("{}; tracking on the host", e);
            pipeline.set_estimator(HostPoseEstimator::new(config.icp.clone(), config.camera)?);
        }
    }

    let mut worst = 0.0f32;
    for (index, expected) in truth.iter().enumerate() {
        pipeline
            .run()
            .with_context(|| format!("frame {} failed", index))?;

        let pose = pipeline.pose().context("pose missing after a run")?;
        let error = pose::max_difference(pose, expected);
        worst = worst.max(error);
        info!(
            "Frame {}: pose error {:.5}, {}",
            index,
            error,
            pipeline.timings()
        );
    }

    info!(
        "Tracked {} frames, worst pose error {:.5}",
        pipeline.frames_processed(),
        worst
    );
    Ok(())
}
