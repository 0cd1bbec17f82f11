//! Writing a grabbed frame to disk, either as a bitmap or as raw bytes.

use std::path::Path;

use anyhow::Context;

/// Pixel layouts the bitmap writer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageLayout {
    Mono8,
    Rgb8,
    Bgr8,
}

/// Pixel formats tried, in order, when the camera's current format cannot be
/// written as a bitmap.
pub const PREFERRED_PIXEL_FORMATS: [&str; 3] = ["RGB8", "BGR8", "Mono8"];

impl ImageLayout {
    pub fn from_pixel_format_name(name: &str) -> Option<Self> {
        match name {
            "Mono8" => Some(Self::Mono8),
            "RGB8" | "RGB8Packed" => Some(Self::Rgb8),
            "BGR8" | "BGR8Packed" => Some(Self::Bgr8),
            _ => None,
        }
    }

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Mono8 => 1,
            Self::Rgb8 | Self::Bgr8 => 3,
        }
    }
}

/// Pick the pixel format to grab with for bitmap output.
///
/// The current format is kept when the writer supports it. Otherwise the
/// first entry of [PREFERRED_PIXEL_FORMATS] the camera offers is used.
pub fn choose_pixel_format<'a>(current: &'a str, available: &'a [String]) -> Option<&'a str> {
    if ImageLayout::from_pixel_format_name(current).is_some() {
        return Some(current);
    }
    PREFERRED_PIXEL_FORMATS.iter().find_map(|wanted| {
        available
            .iter()
            .map(String::as_str)
            .find(|offered| offered == wanted)
    })
}

pub fn write_bitmap(
    path: &Path,
    layout: ImageLayout,
    width: u32,
    height: u32,
    data: &[u8],
) -> anyhow::Result<()> {
    let expected = width as usize * height as usize * layout.bytes_per_pixel();
    if data.len() < expected {
        anyhow::bail!(
            "image buffer has {} bytes, {width}x{height} {layout:?} needs {expected}",
            data.len()
        );
    }
    let data = &data[..expected];

    let (pixels, color) = match layout {
        ImageLayout::Mono8 => (data.to_vec(), image::ColorType::L8),
        ImageLayout::Rgb8 => (data.to_vec(), image::ColorType::Rgb8),
        ImageLayout::Bgr8 => {
            let rgb = data
                .chunks_exact(3)
                .flat_map(|bgr| [bgr[2], bgr[1], bgr[0]])
                .collect::<Vec<u8>>();
            (rgb, image::ColorType::Rgb8)
        }
    };

    image::save_buffer_with_format(path, &pixels, width, height, color, image::ImageFormat::Bmp)
        .with_context(|| format!("writing bitmap {}", path.display()))
}

/// Reject a raw image shorter than `width * height` pixels of
/// `bits_per_pixel` bits.
pub fn check_raw_len(
    len: usize,
    width: u32,
    height: u32,
    bits_per_pixel: u8,
) -> anyhow::Result<()> {
    let expected = (width as usize * height as usize * bits_per_pixel as usize).div_ceil(8);
    if len < expected {
        anyhow::bail!(
            "image buffer has {len} bytes, {width}x{height} at {bits_per_pixel} bits needs {expected}"
        );
    }
    Ok(())
}

pub fn write_raw(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_supported_current_format() {
        let available = vec!["BayerRG8".to_string(), "Mono8".to_string()];
        assert_eq!(choose_pixel_format("Mono8", &available), Some("Mono8"));
    }

    #[test]
    fn falls_back_in_preference_order() {
        let available = vec![
            "Mono8".to_string(),
            "BayerRG8".to_string(),
            "BGR8".to_string(),
        ];
        assert_eq!(choose_pixel_format("BayerRG8", &available), Some("BGR8"));
        let only_bayer = vec!["BayerRG8".to_string(), "BayerRG12".to_string()];
        assert_eq!(choose_pixel_format("BayerRG8", &only_bayer), None);
    }

    #[test]
    fn mono_bitmap_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.bmp");
        let data: Vec<u8> = (0..8).map(|i| i * 30).collect();
        write_bitmap(&path, ImageLayout::Mono8, 4, 2, &data).unwrap();

        let img = image::open(&path).unwrap().to_luma8();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(3, 1).0, [210]);
        assert_eq!(img.get_pixel(0, 0).0, [0]);
    }

    #[test]
    fn bgr_is_swapped_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bgr.bmp");
        // one blue pixel, one red pixel
        let data = [255u8, 0, 0, 0, 0, 255];
        write_bitmap(&path, ImageLayout::Bgr8, 2, 1, &data).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 0, 0]);
    }

    #[test]
    fn trailing_bytes_are_ignored_and_short_buffers_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("padded.bmp");
        write_bitmap(&path, ImageLayout::Mono8, 2, 2, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(image::open(&path).unwrap().to_luma8().into_raw(), vec![1, 2, 3, 4]);

        let err = write_bitmap(&path, ImageLayout::Rgb8, 2, 2, &[0; 11]).unwrap_err();
        assert!(err.to_string().contains("needs 12"));
    }

    #[test]
    fn received_format_names_map_to_layouts() {
        // Names as `vimba::pixel_format_name` reports them for a frame.
        assert_eq!(ImageLayout::from_pixel_format_name("BGR8"), Some(ImageLayout::Bgr8));
        assert_eq!(ImageLayout::from_pixel_format_name("RGB8"), Some(ImageLayout::Rgb8));
        assert_eq!(ImageLayout::from_pixel_format_name("Mono8"), Some(ImageLayout::Mono8));
        assert_eq!(ImageLayout::from_pixel_format_name("BayerGR8"), None);
    }

    #[test]
    fn raw_length_follows_bits_per_pixel() {
        check_raw_len(12, 2, 2, 24).unwrap();
        check_raw_len(4, 2, 2, 8).unwrap();
        let err = check_raw_len(11, 2, 2, 24).unwrap_err();
        assert!(err.to_string().contains("needs 12"));
    }

    #[test]
    fn raw_output_is_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.raw");
        let data = [9u8, 8, 7, 6, 5];
        write_raw(&path, &data).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);
    }
}
