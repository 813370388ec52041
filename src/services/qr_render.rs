use std::path::Path;
use image::{Rgb, RgbImage};
use qrcode::{EcLevel, QrCode};
use crate::utils::config::QrConfig;
use crate::utils::errors::{AppError, ConfigError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QrOptions {
    pub fill: Rgb<u8>,
    pub background: Rgb<u8>,
    pub box_size: u32,
    pub border: u32,
}

impl QrOptions {
    pub fn from_config(config: &QrConfig) -> Result<Self> {
        Ok(Self {
            fill: parse_color(&config.fill)?,
            background: parse_color(&config.background)?,
            box_size: config.box_size,
            border: config.border,
        })
    }
}

/// Encodes `text` at error-correction level H and paints it module by module.
pub fn render_qr(text: &str, options: &QrOptions) -> Result<RgbImage> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::H)
        .map_err(|e| AppError::InvalidInput(format!("Cannot encode QR code: {}", e)))?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = image_side(modules, options)?;

    let mut img = RgbImage::from_pixel(side, side, options.background);
    for (idx, color) in colors.iter().enumerate() {
        if *color != qrcode::Color::Dark {
            continue;
        }
        let col = idx as u32 % modules;
        let row = idx as u32 / modules;
        let x0 = (col + options.border) * options.box_size;
        let y0 = (row + options.border) * options.box_size;
        for y in y0..y0 + options.box_size {
            for x in x0..x0 + options.box_size {
                img.put_pixel(x, y, options.fill);
            }
        }
    }

    log::debug!("Rendered QR code version {:?} ({} modules, {}px)", code.version(), modules, side);
    Ok(img)
}

const MAX_SIDE_PX: u32 = 20_000;

// (modules + 2 * border) * box_size, refused when it overflows or gets absurdly large
fn image_side(modules: u32, options: &QrOptions) -> Result<u32> {
    options
        .border
        .checked_mul(2)
        .and_then(|b| b.checked_add(modules))
        .and_then(|m| m.checked_mul(options.box_size))
        .filter(|side| *side <= MAX_SIDE_PX)
        .ok_or_else(|| {
            AppError::InvalidInput(format!(
                "QR image too large: {} modules, border {}, box size {} (limit {}px per side)",
                modules, options.border, options.box_size, MAX_SIDE_PX
            ))
        })
}

pub fn save_qr(text: &str, options: &QrOptions, output: &Path) -> Result<()> {
    let img = render_qr(text, options)?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    img.save_with_format(output, image::ImageFormat::Png)
        .map_err(|e| AppError::Export(format!("Failed to save {}: {}", output.display(), e)))?;
    log::info!("QR code saved at {}", output.display());
    Ok(())
}

/// Accepts a handful of colour names or `#rrggbb`.
pub fn parse_color(value: &str) -> Result<Rgb<u8>> {
    let lowered = value.trim().to_lowercase();
    let named = match lowered.as_str() {
        "black" => Some([0, 0, 0]),
        "white" => Some([255, 255, 255]),
        "red" => Some([255, 0, 0]),
        "pink" => Some([255, 192, 203]),
        "hotpink" => Some([255, 105, 180]),
        "green" => Some([0, 128, 0]),
        "blue" => Some([0, 0, 255]),
        "navy" => Some([0, 0, 128]),
        "purple" => Some([128, 0, 128]),
        "orange" => Some([255, 165, 0]),
        "yellow" => Some([255, 255, 0]),
        "gray" | "grey" => Some([128, 128, 128]),
        _ => None,
    };
    if let Some(rgb) = named {
        return Ok(Rgb(rgb));
    }

    let invalid = || ConfigError::InvalidValue { field: "color".to_string(), value: value.to_string() };
    let hex = lowered.strip_prefix('#').ok_or_else(invalid)?;
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid().into());
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());
    Ok(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
