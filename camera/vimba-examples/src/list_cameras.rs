use vimba::{AccessMode, CameraInfo, InterfaceInfo, TransportLayerInfo, TransportLayerType};

use crate::controller::ApiController;

/// What gets printed for one camera.
#[derive(Debug, Clone)]
pub struct CameraSummary {
    pub camera_name: String,
    pub model_name: String,
    pub camera_id: String,
    pub serial: String,
    pub interface_id: Option<String>,
    pub transport_layer_type: TransportLayerType,
    pub permitted_access: AccessMode,
}

impl CameraSummary {
    pub fn new(
        info: &CameraInfo,
        interfaces: &[InterfaceInfo],
        transport_layers: &[TransportLayerInfo],
    ) -> Self {
        Self {
            camera_name: info.camera_name.clone(),
            model_name: info.model_name.clone(),
            camera_id: info.camera_id_string.clone(),
            serial: info.serial_string.clone(),
            interface_id: info.interface(interfaces).map(|i| i.id.clone()),
            transport_layer_type: info.transport_layer_type(transport_layers),
            permitted_access: info.permitted_access,
        }
    }
}

impl std::fmt::Display for CameraSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "/// Camera Name    : {}", self.camera_name)?;
        writeln!(f, "/// Model Name     : {}", self.model_name)?;
        writeln!(f, "/// Camera ID      : {}", self.camera_id)?;
        writeln!(f, "/// Serial Number  : {}", self.serial)?;
        writeln!(
            f,
            "/// @ Interface ID : {}",
            self.interface_id.as_deref().unwrap_or("<unknown>")
        )?;
        writeln!(f, "/// Transport Layer: {}", self.transport_layer_type)?;
        writeln!(f, "/// Access         : {}", self.permitted_access)
    }
}

pub fn list_cameras(controller: &ApiController) -> anyhow::Result<()> {
    let lib = controller.lib();
    let transport_layers = lib.transport_layers()?;
    let interfaces = lib.interfaces()?;
    let cameras = lib.cameras()?;
    tracing::debug!(
        "{} transport layers, {} interfaces, {} cameras",
        transport_layers.len(),
        interfaces.len(),
        cameras.len()
    );

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Cameras found: {}", cameras.len());
    for info in cameras.iter() {
        println!();
        print!(
            "{}",
            CameraSummary::new(info, &interfaces, &transport_layers)
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lines() {
        let summary = CameraSummary {
            camera_name: "Allied Vision 1800 U-500m".into(),
            model_name: "1800 U-500m".into(),
            camera_id: "DEV_1AB22C00041B".into(),
            serial: "0041B".into(),
            interface_id: None,
            transport_layer_type: TransportLayerType::U3v,
            permitted_access: AccessMode::new(
                vimba::access_mode::FULL.as_u32() | vimba::access_mode::READ.as_u32(),
            ),
        };
        let text = summary.to_string();
        assert!(text.contains("/// Camera ID      : DEV_1AB22C00041B\n"));
        assert!(text.contains("/// @ Interface ID : <unknown>\n"));
        assert!(text.contains("/// Transport Layer: USB3 Vision Standard\n"));
        assert!(text.ends_with("/// Access         : Full access, Read access\n"));
    }
}
