//! Post-processing of rendered pages: trim the white margins and stack the
//! pages into one image.

use image::ColorType;
use image::ImageEncoder;
use image::Rgb;
use image::RgbImage;
use image::codecs::png::PngEncoder;
use image::imageops;

use crate::error::Result;
use crate::error::ServerError;

const CROP_PADDING: u32 = 10;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Decodes each page, crops it and stacks the results top to bottom,
/// horizontally centered. Returns PNG bytes.
pub fn stack_pages(pages: &[Vec<u8>]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(ServerError::NoPages);
    }
    let cropped = pages
        .iter()
        .map(|bytes| {
            image::load_from_memory(bytes)
                .map(|page| crop_to_content(&page.to_rgb8()))
                .map_err(|err| ServerError::Image(err.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;
    encode_png(&stack_vertically(&cropped))
}

/// Bounding box of non-white pixels as `(x, y, width, height)`.
fn content_bounds(page: &RgbImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in page.enumerate_pixels() {
        if *pixel == WHITE {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((left, top, right, bottom)) => {
                (left.min(x), top.min(y), right.max(x), bottom.max(y))
            }
        });
    }
    bounds.map(|(left, top, right, bottom)| (left, top, right - left + 1, bottom - top + 1))
}

/// Crops to the content plus padding. Blank pages are kept as they are.
fn crop_to_content(page: &RgbImage) -> RgbImage {
    let Some((x, y, width, height)) = content_bounds(page) else {
        return page.clone();
    };
    let left = x.saturating_sub(CROP_PADDING);
    let top = y.saturating_sub(CROP_PADDING);
    let right = (x + width + CROP_PADDING).min(page.width());
    let bottom = (y + height + CROP_PADDING).min(page.height());
    imageops::crop_imm(page, left, top, right - left, bottom - top).to_image()
}

fn stack_vertically(pages: &[RgbImage]) -> RgbImage {
    let width = pages.iter().map(RgbImage::width).max().unwrap_or(0);
    let height = pages.iter().map(RgbImage::height).sum();
    let mut canvas = RgbImage::from_pixel(width, height, WHITE);
    let mut offset = 0;
    for page in pages {
        let x = (width - page.width()) / 2;
        imageops::replace(&mut canvas, page, i64::from(x), i64::from(offset));
        offset += page.height();
    }
    canvas
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ColorType::Rgb8.into(),
        )
        .map_err(|err| ServerError::Image(err.to_string()))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use image::ImageFormat;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn page_with_block(width: u32, height: u32, block: (u32, u32, u32, u32)) -> RgbImage {
        let mut page = RgbImage::from_pixel(width, height, WHITE);
        let (bx, by, bw, bh) = block;
        for x in bx..bx + bw {
            for y in by..by + bh {
                page.put_pixel(x, y, Rgb([0, 0, 0]));
            }
        }
        page
    }

    fn png(page: &RgbImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        page.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .expect("encode");
        bytes
    }

    #[test]
    fn crop_keeps_padding_around_content() {
        let page = page_with_block(200, 100, (50, 40, 20, 10));
        let cropped = crop_to_content(&page);
        assert_eq!(cropped.dimensions(), (40, 30));
    }

    #[test]
    fn padding_is_clamped_at_the_edges() {
        let page = page_with_block(100, 100, (0, 0, 5, 5));
        assert_eq!(crop_to_content(&page).dimensions(), (15, 15));
    }

    #[test]
    fn blank_pages_are_not_cropped() {
        let page = RgbImage::from_pixel(30, 20, WHITE);
        assert_eq!(crop_to_content(&page).dimensions(), (30, 20));
    }

    #[test]
    fn pages_are_stacked_and_centered() {
        let wide = page_with_block(300, 300, (100, 100, 60, 20));
        let narrow = page_with_block(300, 300, (100, 100, 20, 20));

        let bytes = stack_pages(&[png(&wide), png(&narrow)]).expect("stack");
        let stacked = image::load_from_memory(&bytes).expect("decode");

        assert_eq!(stacked.dimensions(), (80, 80));
        // The narrow page starts at x = (80 - 40) / 2 = 20, its content 10px in.
        let rgb = stacked.to_rgb8();
        assert_eq!(*rgb.get_pixel(30, 50), Rgb([0, 0, 0]));
        assert_eq!(*rgb.get_pixel(29, 50), WHITE);
    }

    #[test]
    fn no_pages_is_an_error() {
        assert!(matches!(stack_pages(&[]), Err(ServerError::NoPages)));
    }

    #[test]
    fn undecodable_page_is_an_image_error() {
        let err = stack_pages(&[b"not a png".to_vec()]).expect_err("garbage");
        assert!(matches!(err, ServerError::Image(_)));
    }
}
