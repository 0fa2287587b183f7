//! Image captcha generation
//!
//! Renders a short random code into a noisy JPEG. Glyphs come from a built-in
//! 5x7 bitmap font, so no font files are needed at runtime.

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;

/// Characters used in codes; `0/O` and `1/I` are left out because they read alike
pub const CAPTCHA_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

const CODE_LENGTH: usize = 4;
const SCALE: u32 = 4;
const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;
const CELL_WIDTH: u32 = GLYPH_WIDTH * SCALE + 8;
const PADDING: u32 = 8;
const WIDTH: u32 = CELL_WIDTH * CODE_LENGTH as u32 + PADDING * 2;
const HEIGHT: u32 = GLYPH_HEIGHT * SCALE + 16;
const JPEG_QUALITY: u8 = 85;

/// A generated challenge
#[derive(Debug, Clone)]
pub struct Captcha {
    pub text: String,
    /// JPEG-encoded image
    pub image: Vec<u8>,
}

/// Produces image challenges
pub trait CaptchaGenerator: Send + Sync {
    fn generate(&self) -> Result<Captcha>;
}

/// Bitmap-font captcha rendered with the `image` crate
#[derive(Debug, Default, Clone)]
pub struct ImageCaptcha;

impl ImageCaptcha {
    pub fn new() -> Self {
        Self
    }

    fn random_text(rng: &mut impl Rng) -> String {
        (0..CODE_LENGTH)
            .filter_map(|_| CAPTCHA_ALPHABET.choose(rng).map(|&c| c as char))
            .collect()
    }

    fn render(text: &str, rng: &mut impl Rng) -> RgbImage {
        let background = Rgb([
            rng.gen_range(220..=255),
            rng.gen_range(220..=255),
            rng.gen_range(220..=255),
        ]);
        let mut img = RgbImage::from_pixel(WIDTH, HEIGHT, background);

        for _ in 0..(WIDTH * HEIGHT / 12) {
            let x = rng.gen_range(0..WIDTH);
            let y = rng.gen_range(0..HEIGHT);
            img.put_pixel(x, y, random_dark(rng, 120, 200));
        }

        for (i, ch) in text.chars().enumerate() {
            let Some(rows) = glyph(ch) else { continue };
            let color = random_dark(rng, 0, 110);
            let x0 = PADDING + i as u32 * CELL_WIDTH + rng.gen_range(0..=6);
            let y0 = rng.gen_range(2..=(HEIGHT - GLYPH_HEIGHT * SCALE - 2));
            draw_glyph(&mut img, rows, x0, y0, color);
        }

        for _ in 0..3 {
            let color = random_dark(rng, 40, 160);
            let (y_start, y_end) = (rng.gen_range(0..HEIGHT), rng.gen_range(0..HEIGHT));
            draw_line(&mut img, y_start, y_end, color);
        }

        img
    }
}

impl CaptchaGenerator for ImageCaptcha {
    fn generate(&self) -> Result<Captcha> {
        let mut rng = rand::thread_rng();
        let text = Self::random_text(&mut rng);
        let img = Self::render(&text, &mut rng);

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY)
            .encode(img.as_raw(), WIDTH, HEIGHT, ExtendedColorType::Rgb8)
            .context("Failed to encode captcha image")?;

        Ok(Captcha { text, image: bytes })
    }
}

fn random_dark(rng: &mut impl Rng, low: u8, high: u8) -> Rgb<u8> {
    Rgb([
        rng.gen_range(low..=high),
        rng.gen_range(low..=high),
        rng.gen_range(low..=high),
    ])
}

fn draw_glyph(img: &mut RgbImage, rows: &[u8; 7], x0: u32, y0: u32, color: Rgb<u8>) {
    for (row, bits) in rows.iter().enumerate() {
        for col in 0..GLYPH_WIDTH {
            if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                continue;
            }
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    let x = x0 + col * SCALE + dx;
                    let y = y0 + row as u32 * SCALE + dy;
                    if x < img.width() && y < img.height() {
                        img.put_pixel(x, y, color);
                    }
                }
            }
        }
    }
}

/// Straight line across the full width
fn draw_line(img: &mut RgbImage, y_start: u32, y_end: u32, color: Rgb<u8>) {
    let width = img.width().max(2) - 1;
    for x in 0..img.width() {
        let t = x as f32 / width as f32;
        let y = (y_start as f32 + (y_end as f32 - y_start as f32) * t).round() as u32;
        if y < img.height() {
            img.put_pixel(x, y, color);
        }
    }
}

/// 5x7 bitmap rows, most significant of the low five bits on the left
fn glyph(ch: char) -> Option<&'static [u8; 7]> {
    let rows: &'static [u8; 7] = match ch {
        'A' => &[0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => &[0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => &[0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => &[0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => &[0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => &[0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => &[0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => &[0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'J' => &[0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => &[0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => &[0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => &[0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => &[0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'P' => &[0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => &[0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => &[0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => &[0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => &[0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => &[0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => &[0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => &[0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => &[0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => &[0x11, 0x11, 0x0A, 0x04, 0x04, 0x04, 0x04],
        'Z' => &[0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        '2' => &[0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => &[0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => &[0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => &[0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => &[0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => &[0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => &[0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => &[0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_captcha() {
        let captcha = ImageCaptcha::new().generate().unwrap();

        assert_eq!(captcha.text.len(), 4);
        assert!(captcha
            .text
            .bytes()
            .all(|b| CAPTCHA_ALPHABET.contains(&b)));
        // JPEG SOI marker
        assert_eq!(&captcha.image[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_captcha_decodes_to_expected_size() {
        let captcha = ImageCaptcha::new().generate().unwrap();
        let decoded = image::load_from_memory(&captcha.image).unwrap();
        assert_eq!(decoded.width(), WIDTH);
        assert_eq!(decoded.height(), HEIGHT);
    }

    #[test]
    fn test_every_alphabet_char_has_a_glyph() {
        for &c in CAPTCHA_ALPHABET {
            assert!(glyph(c as char).is_some(), "missing glyph for {}", c as char);
        }
        assert!(glyph('O').is_none());
        assert!(glyph('1').is_none());
    }

    #[test]
    fn test_codes_vary() {
        let generator = ImageCaptcha::new();
        let texts: std::collections::HashSet<String> =
            (0..20).map(|_| generator.generate().unwrap().text).collect();
        assert!(texts.len() > 1);
    }
}
