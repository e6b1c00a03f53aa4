//! # Pipeline Tests
//!
//! Content in, printer bytes out: rasterize text or an image, assemble the
//! job, then decode the raster commands and check the pixels survived.

use image::{DynamicImage, GrayImage, Luma};
use pretty_assertions::assert_eq;

use thermalink::PrinterConfig;
use thermalink::protocol::{Dialect, PrintJob, RasterEncoder, decode};
use thermalink::raster::{self, BitmapCanvas, FontBook, ImageRasterizer, TextStyle, ThresholdPolicy};

/// Half black, half white, `width` x `height`.
fn split_image(width: u32, height: u32) -> DynamicImage {
    let img = GrayImage::from_fn(width, height, |x, _| {
        if x < width / 2 { Luma([0]) } else { Luma([255]) }
    });
    DynamicImage::ImageLuma8(img)
}

/// Raster portion of a job built without feed or cut.
fn raster_part(job: &[u8]) -> &[u8] {
    &job[Dialect::EscPos.init().len()..]
}

// ============================================================================
// TEXT
// ============================================================================

#[test]
fn test_text_job_decodes_to_canvas() {
    let printer = PrinterConfig::PT210;
    let fonts = FontBook::default();
    let canvas =
        raster::rasterize_text("RECEIPT #42\nThank you!", &TextStyle::default(), &fonts, &printer)
            .unwrap();

    assert_eq!(canvas.width(), 384);
    assert!(canvas.count_ink() > 0);

    let job = PrintJob::new(&printer).image(&canvas).build();
    assert_eq!(&job[..2], &[0x1B, 0x40]);

    let decoded = decode(raster_part(&job)).unwrap();
    assert_eq!(decoded, canvas);
}

#[test]
fn test_text_job_is_banded() {
    let printer = PrinterConfig::PT210;
    let fonts = FontBook::default();
    let text = "one\ntwo\nthree\nfour";
    let canvas = raster::rasterize_text(text, &TextStyle::default(), &fonts, &printer).unwrap();
    assert!(canvas.height() > printer.max_band_rows as usize);

    let job = PrintJob::new(&printer).image(&canvas).build();
    let bands = canvas.height().div_ceil(printer.max_band_rows as usize);
    let header_len = Dialect::EscPos.raster_header_len();
    assert_eq!(
        raster_part(&job).len(),
        bands * header_len + canvas.height() * canvas.stride()
    );
}

#[test]
fn test_centered_bold_text() {
    let printer = PrinterConfig::PT210;
    let fonts = FontBook::default();
    let style = TextStyle::default().bold().center();
    let canvas = raster::rasterize_text("MMMM", &style, &fonts, &printer).unwrap();

    let ink_columns: Vec<usize> = (0..canvas.width())
        .filter(|&x| (0..canvas.height()).any(|y| canvas.get_pixel(x, y)))
        .collect();
    let left = ink_columns[0];
    let right = canvas.width() - 1 - ink_columns[ink_columns.len() - 1];

    assert!(left > 150 && right > 150, "left {} right {}", left, right);
    assert!(left.abs_diff(right) <= 1, "left {} right {}", left, right);
}

#[test]
fn test_centered_italic_underlined_text() {
    let printer = PrinterConfig::TSP650II;
    let fonts = FontBook::default();
    let mut style = TextStyle::default().center();
    style.italic = true;
    style.underline = true;
    let canvas = raster::rasterize_text("Total", &style, &fonts, &printer).unwrap();

    let ink_columns: Vec<usize> = (0..canvas.width())
        .filter(|&x| (0..canvas.height()).any(|y| canvas.get_pixel(x, y)))
        .collect();
    let left = ink_columns[0];
    let right = canvas.width() - 1 - ink_columns[ink_columns.len() - 1];
    assert!(left.abs_diff(right) <= 1, "left {} right {}", left, right);
}

#[test]
fn test_unknown_font_fails_before_encoding() {
    let fonts = FontBook::default();
    let style = TextStyle::new("Comic Sans", 12.0);
    assert!(raster::rasterize_text("hi", &style, &fonts, &PrinterConfig::PT210).is_err());
}

// ============================================================================
// IMAGES
// ============================================================================

#[test]
fn test_image_scales_to_printer_width() {
    let canvas = raster::rasterize_image(&split_image(100, 50), 384).unwrap();
    assert_eq!(canvas.width(), 384);
    assert_eq!(canvas.height(), 192);

    assert!(canvas.get_pixel(10, 100));
    assert!(!canvas.get_pixel(370, 100));
}

#[test]
fn test_image_header_escpos() {
    let canvas = raster::rasterize_image(&split_image(384, 24), 384).unwrap();
    let bytes = RasterEncoder::new(Dialect::EscPos).encode(&canvas);

    assert_eq!(&bytes[..8], &[0x1D, 0x76, 0x30, 0x00, 48, 0, 24, 0]);
    assert_eq!(bytes.len(), 8 + 48 * 24);
    // Left half black: first 24 bytes of each row are 0xFF
    assert_eq!(&bytes[8..8 + 24], &[0xFF; 24]);
    assert_eq!(&bytes[8 + 24..8 + 48], &[0x00; 24]);
}

#[test]
fn test_image_job_starprnt() {
    let printer = PrinterConfig::TSP650II;
    let canvas = ImageRasterizer::new(printer.width_dots as usize)
        .policy(ThresholdPolicy::Bayer)
        .rasterize(&split_image(288, 100))
        .unwrap();
    assert_eq!(canvas.height(), 200);

    let job = PrintJob::new(&printer).image(&canvas).cut().build();
    assert_eq!(&job[2..11], &[0x1B, 0x1D, 0x53, 0x01, 72, 0, 200, 0, 0]);
    assert_eq!(&job[job.len() - 3..], &[0x1B, b'd', 2]);
}

#[test]
fn test_png_bytes_round_trip_through_job() {
    let mut png = Vec::new();
    split_image(64, 16)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();

    let canvas = ImageRasterizer::new(64).rasterize_bytes(&png).unwrap();
    let decoded = decode(&RasterEncoder::default().encode(&canvas)).unwrap();
    assert_eq!(decoded, canvas);
}

#[test]
fn test_garbage_image_bytes() {
    let err = ImageRasterizer::new(384)
        .rasterize_bytes(b"definitely not a png")
        .unwrap_err();
    assert!(matches!(
        err,
        thermalink::ThermalinkError::UnsupportedImageFormat(_)
    ));
}

// ============================================================================
// JOBS
// ============================================================================

#[test]
fn test_blank_canvas_job() {
    let printer = PrinterConfig::PT210;
    let canvas = BitmapCanvas::new(384, 8).unwrap();
    let job = PrintJob::new(&printer).image(&canvas).feed_mm(3.0).cut().build();

    let mut expected = vec![0x1B, 0x40, 0x1D, 0x76, 0x30, 0x00, 48, 0, 8, 0];
    expected.extend(vec![0u8; 48 * 8]);
    expected.extend([0x1B, b'J', 24]);
    expected.extend([0x1D, b'V', 0]);
    assert_eq!(job, expected);
}
