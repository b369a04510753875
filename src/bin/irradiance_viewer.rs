//! Bake an HDR environment into IBL cubemaps and inspect them interactively

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use winit::event_loop::EventLoop;

use ibl_capture::backend::traits::BackendError;
use ibl_capture::window::{self, WindowError};
use ibl_capture::{
    bake_from_file, BakeConfig, BakeReport, CaptureBackend, CaptureError, IblMaps, SoftwareBackend,
    Viewer, ViewerConfig, WgpuBackend, Window,
};

/// Backend that runs the two capture passes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum CliBakeBackend {
    /// GPU capture through wgpu (recommended)
    #[default]
    Wgpu,
    /// CPU reference rasterizer; results are uploaded to the GPU for viewing
    Software,
}

#[derive(Parser, Debug)]
#[command(
    name = "irradiance_viewer",
    about = "Bake environment and diffuse irradiance cubemaps from an equirectangular HDR image",
    version
)]
struct Args {
    /// Equirectangular Radiance HDR image
    hdr: PathBuf,

    /// Backend used for baking.
    #[arg(long, default_value = "wgpu", value_enum)]
    backend: CliBakeBackend,

    /// Environment cubemap face size in pixels.
    #[arg(long, default_value = "512")]
    env_size: u32,

    /// Irradiance cubemap face size in pixels.
    #[arg(long, default_value = "32")]
    irradiance_size: u32,

    /// Convolution step in radians (defaults to pi/64).
    #[arg(long)]
    sample_delta: Option<f32>,

    /// Fail on the first incomplete framebuffer.
    #[arg(long, conflicts_with = "lenient")]
    strict: bool,

    /// Log and skip faces whose framebuffer is incomplete.
    #[arg(long, conflicts_with = "strict")]
    lenient: bool,

    /// Bake, print the report and exit without opening a window.
    #[arg(long)]
    headless: bool,

    /// Initial window width in pixels.
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Initial window height in pixels.
    #[arg(long, default_value = "720")]
    height: u32,

    /// Disable vertical sync.
    #[arg(long)]
    no_vsync: bool,
}

impl Args {
    fn bake_config(&self) -> BakeConfig {
        let mut config = BakeConfig::default()
            .with_environment_size(self.env_size)
            .with_irradiance_size(self.irradiance_size);
        if let Some(delta) = self.sample_delta {
            config = config.with_sample_delta(delta);
        }
        if self.strict {
            config = config.with_strict_checks(true);
        } else if self.lenient {
            config = config.with_strict_checks(false);
        }
        config
    }

    fn viewer_config(&self) -> ViewerConfig {
        ViewerConfig {
            width: self.width,
            height: self.height,
            vsync: !self.no_vsync,
            ..ViewerConfig::default()
        }
    }
}

#[derive(Error, Debug)]
enum AppError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Window(#[from] WindowError),
}

fn log_report(report: &BakeReport) {
    for pass in [&report.environment, &report.irradiance] {
        log::info!(
            "{}: {} faces at {}x{}",
            pass.program,
            pass.faces_captured,
            pass.face_size,
            pass.face_size
        );
        if !pass.incomplete_faces.is_empty() {
            log::warn!("{}: skipped faces {:?}", pass.program, pass.incomplete_faces);
        }
    }
    log::info!("Bake finished in {:.2?}", report.elapsed);
}

fn bake_on<B: CaptureBackend>(backend: &mut B, args: &Args) -> Result<IblMaps, AppError> {
    let (maps, report) = bake_from_file(backend, &args.hdr, &args.bake_config())?;
    log_report(&report);
    Ok(maps)
}

fn run_headless(args: &Args) -> Result<(), AppError> {
    match args.backend {
        CliBakeBackend::Wgpu => {
            let mut backend = WgpuBackend::new_headless(args.width, args.height)?;
            bake_on(&mut backend, args)?.destroy(&mut backend);
        }
        CliBakeBackend::Software => {
            let mut backend = SoftwareBackend::new(args.width, args.height);
            bake_on(&mut backend, args)?.destroy(&mut backend);
        }
    }
    Ok(())
}

fn run_viewer(args: &Args) -> Result<(), AppError> {
    let config = args.viewer_config();
    let event_loop = EventLoop::new().map_err(WindowError::from)?;
    let window = Window::new(&event_loop, &config.title, config.width, config.height)?;
    let mut backend = WgpuBackend::new(window.window_arc(), config.vsync)?;
    log::info!("Rendering on {}", backend.adapter_name());

    let maps = match args.backend {
        CliBakeBackend::Wgpu => bake_on(&mut backend, args)?,
        CliBakeBackend::Software => {
            let (width, height) = window.dimensions();
            let mut software = SoftwareBackend::new(width, height);
            bake_on(&mut software, args)?.transfer(&mut software, &mut backend)?
        }
    };

    let viewer = Viewer::new(&window, backend, maps, &config)?;
    window::run(event_loop, window, viewer)?;
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let result = if args.headless {
        run_headless(&args)
    } else {
        run_viewer(&args)
    };

    if let Err(e) = result {
        log::error!("{}", e);
        std::process::exit(1);
    }
}
