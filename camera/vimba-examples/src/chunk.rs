//! Listing the ancillary (chunk) data attached to a frame.

use vimba::FeatureInfo;

use crate::{controller::ApiController, grab};

pub fn format_feature_row(info: &FeatureInfo, value: &str) -> String {
    let unit = if info.unit.is_empty() {
        String::new()
    } else {
        format!(" {}", info.unit)
    };
    format!(
        "{:<32} {:<8} {} {}{}",
        info.name, info.data_type, info.flags, value, unit
    )
}

/// Value to write back to `ChunkModeActive` once the frame was listed, given
/// what it read before chunk mode was switched on.
fn chunk_mode_to_restore(previous: Option<bool>) -> Option<bool> {
    match previous {
        Some(false) => Some(false),
        _ => None,
    }
}

pub fn list_chunk_data(
    controller: &ApiController,
    camera_id: &str,
    timeout_ms: u32,
) -> anyhow::Result<()> {
    let camera = controller.open_camera(camera_id)?;
    grab::adjust_packet_size(controller, &camera);

    let features = camera.features();
    let previous = match features.boolean("ChunkModeActive") {
        Ok(active) => Some(active),
        Err(e) => {
            tracing::warn!("could not read ChunkModeActive: {e}");
            None
        }
    };
    if let Err(e) = features.set_boolean("ChunkModeActive", true) {
        tracing::warn!("could not enable ChunkModeActive: {e}");
    }

    let listed = grab::acquire_single_frame(&camera, timeout_ms, |frame| {
        if !frame.has_chunk_data() {
            println!("Frame {} carries no chunk data.", frame.frame_id());
            return Ok(());
        }
        let mut rows = Vec::new();
        camera.chunk_data_access(frame, |features| {
            for info in features.list()? {
                let value = features
                    .value_string(&info)
                    .unwrap_or_else(|e| format!("<error: {e}>"));
                rows.push(format_feature_row(&info, &value));
            }
            Ok(())
        })?;
        println!(
            "Frame {}: {} chunk features",
            frame.frame_id(),
            rows.len()
        );
        for row in rows {
            println!("  {row}");
        }
        Ok(())
    });

    if let Some(active) = chunk_mode_to_restore(previous) {
        if let Err(e) = features.set_boolean("ChunkModeActive", active) {
            tracing::warn!("could not restore ChunkModeActive to {active}: {e}");
        }
    }
    listed?;

    camera.close()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vimba::{FeatureDataType, FeatureFlags};

    fn info(name: &str, data_type: FeatureDataType, unit: &str) -> FeatureInfo {
        FeatureInfo {
            name: name.into(),
            display_name: name.into(),
            category: "/ChunkDataControl".into(),
            unit: unit.into(),
            data_type,
            flags: FeatureFlags::new(FeatureFlags::READ | FeatureFlags::VOLATILE),
        }
    }

    #[test]
    fn chunk_mode_is_restored_only_when_it_was_off() {
        assert_eq!(chunk_mode_to_restore(Some(false)), Some(false));
        assert_eq!(chunk_mode_to_restore(Some(true)), None);
        // unreadable before the grab, so nothing to go back to
        assert_eq!(chunk_mode_to_restore(None), None);
    }

    #[test]
    fn rows_carry_type_flags_value_and_unit() {
        let row = format_feature_row(
            &info("ChunkExposureTime", FeatureDataType::Float, "us"),
            "4992.5",
        );
        assert!(row.starts_with("ChunkExposureTime "));
        assert!(row.ends_with("float    R-V- 4992.5 us"));

        let row = format_feature_row(&info("ChunkFrameID", FeatureDataType::Int, ""), "17");
        assert!(row.ends_with("int      R-V- 17"));
    }
}
