//! Synchronous acquisition of a single frame.

use std::path::PathBuf;

use anyhow::Context;
use vimba::{Camera, Features, Frame, TransportLayerType};

use crate::{
    bitmap::{self, ImageLayout},
    controller::ApiController,
};

const PACKET_SIZE_POLLS: usize = 100;
const PACKET_SIZE_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct GrabOptions {
    pub camera_id: String,
    pub output: PathBuf,
    pub raw: bool,
    pub timeout_ms: u32,
}

/// Announce one frame, capture into it and hand it to `on_frame`.
///
/// Capture is ended and the frame revoked afterwards whatever the outcome.
pub fn acquire_single_frame<T>(
    camera: &Camera<'_>,
    timeout_ms: u32,
    on_frame: impl FnOnce(&Frame) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let buffer = camera.allocate_buffer()?;
    let mut frame = Frame::new(buffer);
    camera.frame_announce(&mut frame)?;

    let result = capture_into(camera, &mut frame, timeout_ms).and_then(|()| on_frame(&frame));

    if let Err(e) = camera.capture_end() {
        tracing::warn!("ending capture: {e}");
    }
    if let Err(e) = camera.capture_queue_flush() {
        tracing::warn!("flushing capture queue: {e}");
    }
    if let Err(e) = camera.frame_revoke(&mut frame) {
        tracing::warn!("revoking frame: {e}");
    }
    result
}

fn capture_into(camera: &Camera<'_>, frame: &mut Frame, timeout_ms: u32) -> anyhow::Result<()> {
    let features = camera.features();
    camera.capture_start()?;
    camera.capture_frame_queue(frame)?;
    features.command_run("AcquisitionStart")?;

    let waited = camera.capture_frame_wait(frame, timeout_ms);

    if let Err(e) = features.command_run("AcquisitionStop") {
        tracing::warn!("stopping acquisition: {e}");
    }
    waited.with_context(|| format!("waiting {timeout_ms} ms for a frame"))?;
    frame.ensure_complete()?;
    tracing::debug!(
        "frame {} received at {}: {}x{}, {} bytes",
        frame.frame_id(),
        frame.timestamp(),
        frame.width(),
        frame.height(),
        frame.buffer_size()
    );
    Ok(())
}

/// Let a GigE camera negotiate the largest packet size the link supports.
///
/// The command belongs to the camera's first stream. Failures are logged and
/// otherwise ignored.
pub fn adjust_packet_size(controller: &ApiController, camera: &Camera<'_>) {
    let is_gige = match (camera.info(), controller.lib().transport_layers()) {
        (Ok(info), Ok(tls)) => info.transport_layer_type(&tls) == TransportLayerType::GigE,
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("could not determine transport layer: {e}");
            false
        }
    };
    if !is_gige {
        return;
    }
    let stream = match camera.stream_features(0) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("could not adjust packet size: {e}");
            return;
        }
    };
    match stream.command_run_and_wait(
        "GVSPAdjustPacketSize",
        PACKET_SIZE_POLL_INTERVAL,
        PACKET_SIZE_POLLS,
    ) {
        Ok(true) => tracing::info!("GVSPAdjustPacketSize finished"),
        Ok(false) => tracing::warn!("GVSPAdjustPacketSize still running, continuing anyway"),
        Err(e) => tracing::warn!("could not adjust packet size: {e}"),
    }
}

/// Make sure the camera delivers a format the bitmap writer can handle.
fn prepare_pixel_format(features: &Features<'_>) -> anyhow::Result<()> {
    let current = features.enum_entry("PixelFormat")?;
    let available = features.enum_range("PixelFormat")?;
    let chosen = bitmap::choose_pixel_format(&current, &available).ok_or_else(|| {
        anyhow::anyhow!(
            "pixel format {current} cannot be written as a bitmap and the camera offers none of {:?}; use --raw",
            bitmap::PREFERRED_PIXEL_FORMATS
        )
    })?;
    if chosen != current {
        features
            .set_enum_entry("PixelFormat", chosen)
            .with_context(|| format!("setting PixelFormat to {chosen}"))?;
        tracing::info!("PixelFormat changed from {current} to {chosen}");
    }
    Ok(())
}

fn write_frame(frame: &Frame, output: &std::path::Path, raw: bool) -> anyhow::Result<()> {
    let data = frame.image_data();
    if raw {
        match frame.pixel_format() {
            Ok(fmt) => bitmap::check_raw_len(
                data.len(),
                frame.width(),
                frame.height(),
                fmt.bits_per_pixel(),
            )?,
            Err(e) => tracing::debug!("not checking raw image size: {e}"),
        }
        return bitmap::write_raw(output, data);
    }
    let name = frame.pixel_format_name()?;
    let layout = ImageLayout::from_pixel_format_name(name).ok_or_else(|| {
        anyhow::anyhow!("received {name} frame, which cannot be written as a bitmap")
    })?;
    bitmap::write_bitmap(output, layout, frame.width(), frame.height(), data)
}

pub fn synchronous_grab(controller: &ApiController, opts: &GrabOptions) -> anyhow::Result<()> {
    let camera = controller.open_camera(&opts.camera_id)?;
    adjust_packet_size(controller, &camera);

    if !opts.raw {
        prepare_pixel_format(&camera.features())?;
    }

    acquire_single_frame(&camera, opts.timeout_ms, |frame| {
        write_frame(frame, &opts.output, opts.raw)?;
        println!(
            "Frame {} ({}x{}) written to {}",
            frame.frame_id(),
            frame.width(),
            frame.height(),
            opts.output.display()
        );
        Ok(())
    })?;

    camera.close()?;
    Ok(())
}
