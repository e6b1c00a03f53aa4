//! # Thermalink CLI
//!
//! Command-line interface for rasterizing and printing receipts.
//!
//! ## Usage
//!
//! ```bash
//! # Preview text as a PNG
//! thermalink render-text --png out.png --bold --align center "TOTAL  $4.20"
//!
//! # Write the raw job bytes for an image
//! thermalink render-image --out logo.bin --threshold bayer logo.png
//!
//! # List bound printers
//! thermalink scan
//!
//! # Print text, an image or a prepared job file
//! thermalink print --text "Hello" --device 00:11:22:33:44:55
//! thermalink print --image logo.png
//! thermalink print --raw logo.bin
//! ```
//!
//! Set `RUST_LOG=debug` to trace transport state transitions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use thermalink::{
    PrinterConfig, ThermalinkError,
    printer::{Config, PrinterProfile},
    protocol::PrintJob,
    raster::{
        self, Alignment, BitmapCanvas, ImageRasterizer, TextStyle, ThresholdPolicy,
        font::{FontBook, TtfFont},
    },
    transport::{
        Session,
        platform::event_channel,
        rfcomm::{DEFAULT_DEVICE, RfcommPlatform},
    },
};

/// Thermalink - Thermal receipt printer utility
#[derive(Parser, Debug)]
#[command(name = "thermalink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON config file (printer profile and transport tuning)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Printer profile: pt210, tsp650ii or custom:WIDTH (overrides the config file)
    #[arg(long, global = true)]
    printer: Option<PrinterProfile>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rasterize text to a PNG preview or a job file
    RenderText {
        /// Text to render (`\n` breaks lines)
        text: String,

        #[command(flatten)]
        style: StyleArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Rasterize an image to a PNG preview or a job file
    RenderImage {
        /// Image file (PNG, JPEG, ...)
        path: PathBuf,

        #[command(flatten)]
        image: ImageArgs,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List printers bound to RFCOMM devices
    Scan {
        /// How long to wait for more devices (seconds)
        #[arg(long, default_value = "2")]
        wait: u64,
    },

    /// Send text, an image or a raw job to the printer
    Print {
        /// Text to print
        #[arg(long, conflicts_with_all = ["image", "raw"])]
        text: Option<String>,

        /// Image file to print
        #[arg(long, value_name = "FILE", conflicts_with = "raw")]
        image: Option<PathBuf>,

        /// Job file sent byte for byte
        #[arg(long, value_name = "FILE")]
        raw: Option<PathBuf>,

        #[command(flatten)]
        style: StyleArgs,

        #[command(flatten)]
        image_args: ImageArgs,

        /// Printer MAC address or device path
        #[arg(long, default_value = DEFAULT_DEVICE)]
        device: String,

        /// Skip the trailing feed and cut
        #[arg(long)]
        no_cut: bool,

        /// Open the cash drawer after printing
        #[arg(long)]
        drawer: bool,
    },
}

#[derive(Args, Debug)]
struct ImageArgs {
    /// Threshold policy: fixed, fixed:N, bayer or floyd-steinberg
    #[arg(long, default_value = "fixed", value_parser = ThresholdPolicy::parse)]
    threshold: ThresholdPolicy,

    /// Scale the image to this many dots instead of the paper width
    #[arg(long, value_name = "DOTS")]
    image_width: Option<usize>,

    /// Placement of a narrow image: left, center or right
    #[arg(long, default_value = "center", value_parser = parse_alignment)]
    image_align: Alignment,
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// Font family
    #[arg(long, default_value = "monospace")]
    font: String,

    /// TrueType font file, registered under the --font family
    #[arg(long, value_name = "FILE")]
    ttf: Option<PathBuf>,

    /// Font size in points
    #[arg(long, default_value = "8.5")]
    size: f32,

    #[arg(long)]
    bold: bool,

    #[arg(long)]
    italic: bool,

    #[arg(long)]
    underline: bool,

    #[arg(long)]
    double_width: bool,

    #[arg(long)]
    double_height: bool,

    /// Extra dots between characters
    #[arg(long, default_value = "0")]
    letter_spacing: usize,

    /// Extra dots between lines
    #[arg(long, default_value = "0")]
    line_spacing: usize,

    /// left, center or right
    #[arg(long, default_value = "left", value_parser = parse_alignment)]
    align: Alignment,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Save a PNG preview
    #[arg(long, value_name = "FILE")]
    png: Option<PathBuf>,

    /// Save the complete job bytes
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), ThermalinkError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(profile) = cli.printer {
        config.printer = profile;
    }
    let printer = config.printer.config();

    match cli.command {
        Commands::RenderText {
            text,
            style,
            output,
        } => {
            let canvas = render_text(&text, &style, &printer)?;
            println!("Rendered {}x{} dots", canvas.width(), canvas.height());
            save_outputs(&canvas, &output, &printer)?;
        }

        Commands::RenderImage {
            path,
            image,
            output,
        } => {
            let canvas = render_image(&path, &image, &printer)?;
            println!("Rendered {}x{} dots", canvas.width(), canvas.height());
            save_outputs(&canvas, &output, &printer)?;
        }

        Commands::Scan { wait } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(scan(config, Duration::from_secs(wait)))?;
        }

        Commands::Print {
            text,
            image,
            raw,
            style,
            image_args,
            device,
            no_cut,
            drawer,
        } => {
            let data = if let Some(path) = raw {
                std::fs::read(&path)?
            } else {
                let canvas = if let Some(text) = text {
                    render_text(&text, &style, &printer)?
                } else if let Some(path) = image {
                    render_image(&path, &image_args, &printer)?
                } else {
                    return Err(ThermalinkError::Config(
                        "Nothing to print. Use --text, --image or --raw".to_string(),
                    ));
                };
                build_job(&canvas, &printer, !no_cut)
            };
            let data = if drawer {
                PrintJob::bare(&printer).raw(&data).open_drawer().build()
            } else {
                data
            };

            println!("Sending {} bytes to {}...", data.len(), device);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(print(config, &device, &data))?;
            println!("Printed successfully!");
        }
    }

    Ok(())
}

fn parse_alignment(s: &str) -> Result<Alignment, String> {
    Alignment::parse(s).map_err(|e| e.to_string())
}

fn render_text(
    text: &str,
    args: &StyleArgs,
    printer: &PrinterConfig,
) -> Result<BitmapCanvas, ThermalinkError> {
    let mut fonts = FontBook::default();
    if let Some(path) = &args.ttf {
        fonts.register_ttf(TtfFont::from_file(&args.font, path)?);
    }

    let mut style = TextStyle::new(&args.font, args.size)
        .letter_spacing(args.letter_spacing)
        .line_spacing(args.line_spacing)
        .align(args.align);
    style.bold = args.bold;
    style.italic = args.italic;
    style.underline = args.underline;
    style.double_width = args.double_width;
    style.double_height = args.double_height;

    raster::rasterize_text(text, &style, &fonts, printer)
}

fn render_image(
    path: &Path,
    args: &ImageArgs,
    printer: &PrinterConfig,
) -> Result<BitmapCanvas, ThermalinkError> {
    let bytes = std::fs::read(path)?;
    let mut rasterizer = ImageRasterizer::new(printer.width_dots as usize)
        .policy(args.threshold)
        .align(args.image_align);
    if let Some(dots) = args.image_width {
        rasterizer = rasterizer.image_width(dots);
    }
    rasterizer.rasterize_bytes(&bytes)
}

fn build_job(canvas: &BitmapCanvas, printer: &PrinterConfig, cut: bool) -> Vec<u8> {
    let job = PrintJob::new(printer).image(canvas);
    if cut {
        job.feed_mm(5.0).cut().build()
    } else {
        job.build()
    }
}

fn save_outputs(
    canvas: &BitmapCanvas,
    output: &OutputArgs,
    printer: &PrinterConfig,
) -> Result<(), ThermalinkError> {
    if output.png.is_none() && output.out.is_none() {
        println!("Nothing saved. Use --png or --out");
    }
    if let Some(path) = &output.png {
        canvas
            .to_gray_image()
            .save(path)
            .map_err(|e| ThermalinkError::UnsupportedImageFormat(format!("Failed to save PNG: {}", e)))?;
        println!("Saved preview to {}", path.display());
    }
    if let Some(path) = &output.out {
        let data = build_job(canvas, printer, true);
        std::fs::write(path, &data)?;
        println!("Saved {} bytes to {}", data.len(), path.display());
    }
    Ok(())
}

fn new_session(config: Config) -> Session {
    let (events_tx, events_rx) = event_channel();
    Session::new(
        Box::new(RfcommPlatform::new(events_tx)),
        events_rx,
        config.transport,
    )
}

async fn scan(config: Config, wait: Duration) -> Result<(), ThermalinkError> {
    let mut session = new_session(config);
    session.start_scan().await?;

    let mut count = 0;
    while let Some(device) = session.next_device(wait).await? {
        println!("  {}", device);
        count += 1;
    }
    session.stop_scan().await?;

    if count == 0 {
        println!("No printers found. Pair and bind one with 'rfcomm bind 0 <MAC>'.");
    }
    Ok(())
}

async fn print(config: Config, device: &str, data: &[u8]) -> Result<(), ThermalinkError> {
    let mut session = new_session(config);
    session.connect(&device.into()).await?;

    let result = session.submit(data).await;
    session.disconnect().await?;

    let result = result?.into_result()?;
    log::info!(
        "{} bytes in {} chunks",
        result.bytes_delivered,
        result.chunks_delivered
    );
    Ok(())
}
