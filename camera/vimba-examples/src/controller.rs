//! Ownership of the started API, shared by every subcommand.

use std::path::{Path, PathBuf};

use anyhow::Context;
use vimba::{Camera, PersistSettings, VersionInfo, VimbaLibrary};

/// How long to wait for `UserSetLoad` before giving up.
const USER_SET_LOAD_POLLS: usize = 100;
const USER_SET_LOAD_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(20);

/// The started VmbC API.
///
/// The API is shut down when this is dropped, after every camera borrowed
/// from it has been closed.
pub struct ApiController {
    lib: VimbaLibrary,
    persist: PersistSettings,
}

impl ApiController {
    /// Load VmbC (from `vmbc_path` if given) and start the API.
    pub fn start(vmbc_path: Option<&Path>, persist: PersistSettings) -> anyhow::Result<Self> {
        let lib = match vmbc_path {
            Some(path) => VimbaLibrary::from_dynamic_lib_path(path),
            None => VimbaLibrary::new(),
        }
        .context("starting the VmbC API")?;
        Ok(Self { lib, persist })
    }

    pub fn lib(&self) -> &VimbaLibrary {
        &self.lib
    }

    pub fn version(&self) -> vimba::Result<VersionInfo> {
        self.lib.version()
    }

    pub fn camera_ids(&self) -> vimba::Result<Vec<String>> {
        Ok(self
            .lib
            .cameras()?
            .into_iter()
            .map(|info| info.camera_id_string)
            .collect())
    }

    pub fn first_camera_id(&self) -> anyhow::Result<String> {
        self.camera_ids()?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("no cameras detected"))
    }

    pub fn open_camera(&self, camera_id: &str) -> anyhow::Result<Camera<'_>> {
        tracing::info!("Opening camera {camera_id}");
        Camera::open(camera_id, vimba::access_mode::FULL, &self.lib.vimba_lib)
            .with_context(|| format!("opening camera {camera_id}"))
    }

    pub fn save_settings(&self, camera: &Camera<'_>, path: &Path) -> anyhow::Result<()> {
        tracing::info!("Saving settings to {}", path.display());
        camera
            .camera_settings_save(path, &self.persist)
            .with_context(|| format!("saving settings to {}", path.display()))
    }

    pub fn load_settings(&self, camera: &Camera<'_>, path: &Path) -> anyhow::Result<()> {
        check_settings_file(path)?;
        tracing::info!(
            "Loading settings from {} (up to {} iterations)",
            path.display(),
            self.persist.max_iterations
        );
        camera
            .camera_settings_load(path, &self.persist)
            .with_context(|| format!("loading settings from {}", path.display()))
    }

    /// Select the factory `Default` user set and load it into the camera.
    pub fn restore_default_user_set(&self, camera: &Camera<'_>) -> anyhow::Result<()> {
        let features = camera.features();
        features
            .set_enum_entry("UserSetSelector", "Default")
            .context("selecting the default user set")?;
        let done = features
            .command_run_and_wait(
                "UserSetLoad",
                USER_SET_LOAD_POLL_INTERVAL,
                USER_SET_LOAD_POLLS,
            )
            .context("loading the default user set")?;
        if !done {
            anyhow::bail!("UserSetLoad did not finish");
        }
        tracing::info!("Restored factory default user set");
        Ok(())
    }
}

/// Fail before calling the SDK if a settings file cannot be read.
pub fn check_settings_file(path: &Path) -> anyhow::Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("settings file {} not readable", path.display()))?;
    if !meta.is_file() {
        anyhow::bail!("settings file {} is not a regular file", path.display());
    }
    Ok(())
}

/// `<camera id>.xml`, with characters that are awkward in file names replaced.
pub fn default_settings_path(camera_id: &str) -> PathBuf {
    let stem: String = camera_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    PathBuf::from(format!("{stem}.xml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_from_camera_id() {
        assert_eq!(
            default_settings_path("DEV_000F315B91E2"),
            PathBuf::from("DEV_000F315B91E2.xml")
        );
        assert_eq!(
            default_settings_path("DEV_1AB2:2C00/041B"),
            PathBuf::from("DEV_1AB2_2C00_041B.xml")
        );
    }

    #[test]
    fn missing_settings_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.xml");
        let err = check_settings_file(&missing).unwrap_err();
        assert!(err.to_string().contains("not readable"));

        assert!(check_settings_file(dir.path()).is_err());

        let present = dir.path().join("cam.xml");
        std::fs::write(&present, "<CameraSettings/>").unwrap();
        check_settings_file(&present).unwrap();
    }
}
