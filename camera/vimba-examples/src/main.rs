use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use vimba::{PersistSettings, PersistType};

mod bitmap;
mod chunk;
mod controller;
mod grab;
mod list_cameras;
mod logging;

use controller::ApiController;

#[derive(Debug, Parser)]
#[command(author, version, about = "Example programs for the Allied Vision VmbC camera API")]
struct Cli {
    /// Path to the VmbC shared library. When unset, `VIMBA_X_HOME` or the
    /// platform default install location is used.
    #[arg(long, env = "VMBC_LIB_PATH", global = true)]
    vmbc_path: Option<PathBuf>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Also write log messages to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List transport layers, interfaces and cameras.
    ListCameras,
    /// Print the version of the VmbC API.
    Version,
    /// Save or load camera settings.
    Settings {
        #[command(flatten)]
        persist: PersistArgs,
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Grab a single frame and write it as a bitmap or raw file.
    Grab(GrabArgs),
    /// Grab a single frame and list its ancillary (chunk) data.
    ListChunkData {
        #[command(flatten)]
        camera: CameraSelect,
        /// Milliseconds to wait for the frame.
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u32,
    },
}

#[derive(Debug, Args)]
struct CameraSelect {
    /// Camera to open. Defaults to the first camera found.
    #[arg(long, conflicts_with = "ip")]
    camera_id: Option<String>,
    /// Open a GigE camera by IPv4 address.
    #[arg(long)]
    ip: Option<String>,
}

impl CameraSelect {
    fn resolve(&self, controller: &ApiController) -> anyhow::Result<String> {
        if let Some(ip) = &self.ip {
            let host_order = vimba::ip_address_to_host_u32(ip)?;
            tracing::debug!("camera IP {ip} (0x{host_order:08X})");
            return Ok(ip.trim().to_string());
        }
        match &self.camera_id {
            Some(id) => Ok(id.clone()),
            None => controller.first_camera_id(),
        }
    }
}

/// Which features are persisted.
#[derive(Debug, Clone, Copy, clap::ValueEnum, Default, PartialEq)]
enum PersistTypeArg {
    /// Every feature, including look-up tables.
    All,
    /// Only features marked streamable.
    #[default]
    Streamable,
    /// Every feature except look-up tables.
    NoLut,
}

impl From<PersistTypeArg> for PersistType {
    fn from(arg: PersistTypeArg) -> Self {
        match arg {
            PersistTypeArg::All => PersistType::All,
            PersistTypeArg::Streamable => PersistType::Streamable,
            PersistTypeArg::NoLut => PersistType::NoLut,
        }
    }
}

#[derive(Debug, Args)]
struct PersistArgs {
    #[arg(long, value_enum, default_value_t)]
    persist_type: PersistTypeArg,
    /// Passes made when loading, to resolve dependent features.
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,
}

impl PersistArgs {
    fn to_settings(&self) -> PersistSettings {
        PersistSettings {
            persist_type: self.persist_type.into(),
            max_iterations: self.max_iterations,
            ..Default::default()
        }
    }
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Save the camera's settings to an XML file.
    Save {
        #[command(flatten)]
        camera: CameraSelect,
        /// Output file. Defaults to `<camera id>.xml`.
        file: Option<PathBuf>,
    },
    /// Load settings from an XML file into the camera.
    Load {
        #[command(flatten)]
        camera: CameraSelect,
        file: PathBuf,
    },
    /// Save settings, restore the factory user set, then load them again.
    RoundTrip {
        #[command(flatten)]
        camera: CameraSelect,
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct GrabArgs {
    #[command(flatten)]
    camera: CameraSelect,
    /// Output file.
    #[arg(short, long, default_value = "SynchronousGrab.bmp")]
    output: PathBuf,
    /// Write the image bytes unchanged instead of a bitmap.
    #[arg(long)]
    raw: bool,
    /// Milliseconds to wait for the frame.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u32,
}

fn run_settings(controller: &ApiController, action: &SettingsAction) -> anyhow::Result<()> {
    match action {
        SettingsAction::Save { camera, file } => {
            let camera_id = camera.resolve(controller)?;
            let path = file
                .clone()
                .unwrap_or_else(|| controller::default_settings_path(&camera_id));
            let cam = controller.open_camera(&camera_id)?;
            controller.save_settings(&cam, &path)?;
            cam.close()?;
            println!("Settings of {camera_id} saved to {}", path.display());
        }
        SettingsAction::Load { camera, file } => {
            controller::check_settings_file(file)?;
            let camera_id = camera.resolve(controller)?;
            let cam = controller.open_camera(&camera_id)?;
            controller.load_settings(&cam, file)?;
            cam.close()?;
            println!("Settings from {} loaded into {camera_id}", file.display());
        }
        SettingsAction::RoundTrip { camera, file } => {
            let camera_id = camera.resolve(controller)?;
            let cam = controller.open_camera(&camera_id)?;
            controller.save_settings(&cam, file)?;
            controller.restore_default_user_set(&cam)?;
            controller.load_settings(&cam, file)?;
            cam.close()?;
            println!(
                "Settings of {camera_id} saved, reset to factory defaults and restored from {}",
                file.display()
            );
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_file.as_deref())?;

    let persist = match &cli.command {
        Command::Settings { persist, .. } => persist.to_settings(),
        _ => PersistSettings::default(),
    };
    let controller = ApiController::start(cli.vmbc_path.as_deref(), persist)?;

    match &cli.command {
        Command::ListCameras => list_cameras::list_cameras(&controller)?,
        Command::Version => {
            println!("Vimba X C API Version: {}", controller.version()?);
        }
        Command::Settings { action, .. } => run_settings(&controller, action)?,
        Command::Grab(args) => {
            let opts = grab::GrabOptions {
                camera_id: args.camera.resolve(&controller)?,
                output: args.output.clone(),
                raw: args.raw,
                timeout_ms: args.timeout_ms,
            };
            grab::synchronous_grab(&controller, &opts)?;
        }
        Command::ListChunkData { camera, timeout_ms } => {
            let camera_id = camera.resolve(&controller)?;
            chunk::list_chunk_data(&controller, &camera_id, *timeout_ms)?;
        }
    }
    // `controller` is dropped here, which calls `VmbShutdown`.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn grab_defaults() {
        let cli = Cli::try_parse_from(["vmbc-examples", "grab"]).unwrap();
        match cli.command {
            Command::Grab(args) => {
                assert_eq!(args.output, PathBuf::from("SynchronousGrab.bmp"));
                assert!(!args.raw);
                assert_eq!(args.timeout_ms, 2000);
                assert!(args.camera.camera_id.is_none());
            }
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn camera_id_and_ip_conflict() {
        let result = Cli::try_parse_from([
            "vmbc-examples",
            "grab",
            "--camera-id",
            "DEV_1",
            "--ip",
            "192.168.0.2",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn settings_options() {
        let cli = Cli::try_parse_from([
            "vmbc-examples",
            "settings",
            "--persist-type",
            "no-lut",
            "--max-iterations",
            "3",
            "load",
            "cam.xml",
        ])
        .unwrap();
        match cli.command {
            Command::Settings { persist, action } => {
                let settings = persist.to_settings();
                assert_eq!(settings.persist_type, PersistType::NoLut);
                assert_eq!(settings.max_iterations, 3);
                assert_eq!(settings.logging_level, 4);
                assert!(matches!(action, SettingsAction::Load { .. }));
            }
            other => panic!("parsed {other:?}"),
        }
    }

    #[test]
    fn persist_type_values() {
        let parse = |value: &str| {
            Cli::try_parse_from(["vmbc-examples", "settings", "--persist-type", value, "load", "a.xml"])
        };
        for (value, expected) in [
            ("all", PersistType::All),
            ("streamable", PersistType::Streamable),
            ("no-lut", PersistType::NoLut),
        ] {
            match parse(value).unwrap().command {
                Command::Settings { persist, .. } => {
                    assert_eq!(persist.to_settings().persist_type, expected)
                }
                other => panic!("parsed {other:?}"),
            }
        }
        assert!(parse("everything").is_err());

        let cli = Cli::try_parse_from(["vmbc-examples", "settings", "load", "a.xml"]).unwrap();
        match cli.command {
            Command::Settings { persist, .. } => {
                assert_eq!(persist.persist_type, PersistTypeArg::Streamable)
            }
            other => panic!("parsed {other:?}"),
        }
    }
}
