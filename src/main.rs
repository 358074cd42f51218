//! asi-guide-capture binary: list cameras and run a guide capture loop.

use std::path::PathBuf;

use asi_guide_capture::validation::image_stats;
use asi_guide_capture::{
    logger, AsiSdk, CameraError, CameraSelector, CancellationToken, CaptureOptions, Config,
    GuideImage, Rect, ZwoCamera,
};
use clap::Parser;
use tracing::{error, info, warn};

/// Parse a sub-frame given as `x,y,width,height`.
fn parse_subframe(s: &str) -> Result<Rect, String> {
    let parts: Vec<i32> = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse()
                .map_err(|_| format!("'{part}' is not a valid integer"))
        })
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        &[x, y, width, height] if width > 0 && height > 0 => Ok(Rect::new(x, y, width, height)),
        &[_, _, _, _] => Err("sub-frame width and height must be greater than 0".to_owned()),
        _ => Err(format!("invalid sub-frame '{s}'. Use x,y,width,height")),
    }
}

/// ZWO ASI guide camera capture
#[derive(Parser, Debug)]
#[command(name = "asi-guide-capture")]
#[command(version, about = "Capture guide frames from a ZWO ASI camera")]
struct Cli {
    /// Config file (defaults to <config dir>/asi-guide-capture/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Camera index, or "default" for the first camera
    #[arg(long, default_value = "default")]
    camera: CameraSelector,

    /// Exposure in milliseconds
    #[arg(short, long)]
    exposure: Option<u32>,

    /// Number of frames to capture; 0 runs until Ctrl+C
    #[arg(short = 'n', long)]
    frames: Option<u32>,

    /// Sub-frame as x,y,width,height in binned pixels
    #[arg(long, value_parser = parse_subframe)]
    subframe: Option<Rect>,

    /// Binning factor
    #[arg(short, long)]
    binning: Option<u32>,

    /// Guide gain in percent (0-100)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(0..=100))]
    gain: Option<u32>,

    /// List connected cameras and exit
    #[arg(long)]
    list: bool,
}

fn main() {
    logger::init("info");
    if let Err(err) = run(Cli::parse()) {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(binning) = cli.binning {
        config.camera.binning = binning;
    }

    let sdk = AsiSdk::load()?;
    let mut camera = ZwoCamera::new(sdk, config.camera.clone());
    if let Some(gain) = cli.gain {
        camera.set_gain_percent(gain);
    }

    if cli.list {
        let cameras = camera.list_cameras();
        if cameras.is_empty() {
            println!("No cameras found");
        }
        for entry in cameras {
            println!("{}\t{}", entry.selector, entry.name);
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let handler_token = cancel.clone();
    ctrlc::set_handler(move || handler_token.cancel())?;

    let session = camera.connect(cli.camera)?;
    let full = session.geometry.full_size();
    info!(
        name = %session.name,
        width = full.width,
        height = full.height,
        binning = session.geometry.binning(),
        pixel_size = session.geometry.pixel_size_um(),
        "camera ready"
    );

    let exposure = cli.exposure.unwrap_or(config.capture.exposure_ms);
    let frames = cli.frames.unwrap_or(config.capture.frames);
    let subframe = cli.subframe.unwrap_or_else(|| config.capture.subframe_rect());
    let options = CaptureOptions {
        subtract_dark: config.capture.subtract_dark,
        reconstruct_color: config.capture.reconstruct_color,
    };

    let mut image = GuideImage::new();
    let mut captured = 0u32;
    while frames == 0 || captured < frames {
        match camera.capture(exposure, &mut image, options, subframe, &cancel) {
            Ok(()) => {}
            Err(CameraError::CaptureCancelled) => break,
            Err(err) => return Err(err.into()),
        }
        captured += 1;

        match image_stats(&image, image.subframe()) {
            Ok(stats) => info!(
                frame = captured,
                min = stats.min,
                max = stats.max,
                mean = stats.mean,
                "frame captured"
            ),
            Err(err) => warn!(frame = captured, %err, "no statistics"),
        }
    }

    info!(frames = captured, "capture finished");
    camera.disconnect();
    Ok(())
}
