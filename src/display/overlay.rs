//! Caption rendering straight into the RGB frame with a 5x7 bitmap font

use image::{Rgb, RgbImage};

use crate::inference::DetectionResult;

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const ADVANCE: i32 = GLYPH_WIDTH + 1;
const PADDING: i32 = 4;
const BACKDROP: Rgb<u8> = Rgb([0, 0, 0]);

/// Where and how large the caption is drawn.
#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub x: i32,
    pub y: i32,
    pub scale: i32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            x: 10,
            y: 16,
            scale: 2,
        }
    }
}

/// Draw `result`'s caption in its color on a dark strip in the top-left corner.
pub fn annotate(frame: &mut RgbImage, result: &DetectionResult, style: OverlayStyle) {
    let text = result.caption();
    let scale = style.scale.max(1);
    let text_width = text.chars().count() as i32 * ADVANCE * scale;

    fill_rect(
        frame,
        style.x - PADDING,
        style.y - PADDING,
        style.x + text_width + PADDING,
        style.y + GLYPH_HEIGHT * scale + PADDING,
        BACKDROP,
    );
    draw_text(frame, style.x, style.y, scale, &text, result.color());
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, scale: i32, text: &str, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);

    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 0 {
                        continue;
                    }
                    for dy in 0..scale {
                        for dx in 0..scale {
                            let px = x + col * scale + dx;
                            let py = y + row as i32 * scale + dy;
                            if (0..width).contains(&px) && (0..height).contains(&py) {
                                image.put_pixel(px as u32, py as u32, color);
                            }
                        }
                    }
                }
            }
        }
        x += ADVANCE * scale;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let bits = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_caption_character_has_a_glyph() {
        for result in [
            DetectionResult::classify(0.95, 0.8),
            DetectionResult::classify(0.123, 0.8),
            DetectionResult {
                stale: true,
                ..DetectionResult::default()
            },
        ] {
            for ch in result.caption().chars().flat_map(|c| c.to_uppercase()) {
                assert!(glyph_bits(ch).is_some(), "missing glyph for {ch:?}");
            }
        }
    }

    #[test]
    fn caption_is_drawn_in_label_color() {
        let mut frame = RgbImage::from_pixel(320, 80, Rgb([7, 7, 7]));
        let result = DetectionResult::classify(0.95, 0.8);
        annotate(&mut frame, &result, OverlayStyle::default());

        let red = frame.pixels().filter(|p| **p == Rgb([255, 0, 0])).count();
        let backdrop = frame.pixels().filter(|p| **p == BACKDROP).count();
        assert!(red > 0);
        assert!(backdrop > 0);
        assert_eq!(*frame.get_pixel(319, 79), Rgb([7, 7, 7]));
    }

    #[test]
    fn tiny_frames_are_clipped_not_panicking() {
        let mut frame = RgbImage::new(3, 3);
        annotate(&mut frame, &DetectionResult::default(), OverlayStyle::default());
        let mut empty = RgbImage::new(0, 0);
        annotate(&mut empty, &DetectionResult::default(), OverlayStyle::default());
    }
}
