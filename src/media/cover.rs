use std::path::{Path, PathBuf};

use image::{ColorType, ImageFormat, ImageReader, Rgb, RgbImage, imageops, imageops::FilterType};

use super::{MediaError, tags::read_tags};

/// Pulls the picture tag out of `audio` and writes it next to `dest_base`
/// with an extension matching the real image format.
///
/// Returns `None` when there is no picture, the picture is empty or the
/// bytes do not decode as an image. Blocking.
pub fn extract_embedded_cover(audio: &Path, dest_base: &Path) -> Option<PathBuf> {
    let picture = read_tags(audio).picture?;
    persist_picture(&picture, dest_base)
}

fn persist_picture(bytes: &[u8], dest_base: &Path) -> Option<PathBuf> {
    if bytes.is_empty() {
        return None;
    }

    let format = match image::guess_format(bytes) {
        Ok(f) => f,
        Err(e) => {
            log::warn!("Embedded cover has unknown format: {e}");
            return None;
        }
    };
    if let Err(e) = image::load_from_memory_with_format(bytes, format) {
        log::warn!("Embedded cover does not decode: {e}");
        return None;
    }

    let ext = format.extensions_str().first().copied().unwrap_or("img");
    let path = dest_base.with_extension(ext);
    match std::fs::write(&path, bytes) {
        Ok(()) => Some(path),
        Err(e) => {
            log::error!("Failed to write cover to {}: {e}", path.display());
            None
        }
    }
}

/// Fits `image` into an exact `size`x`size` RGB canvas and stores it as JPEG
/// at `dest`.
///
/// An image that already is `size`x`size` RGB is returned as is. The input
/// file is never modified. Blocking.
pub fn normalize_to_square(image: &Path, size: u32, dest: &Path) -> Result<PathBuf, MediaError> {
    let img = ImageReader::open(image)?.with_guessed_format()?.decode()?;

    if img.width() == size && img.height() == size && img.color() == ColorType::Rgb8 {
        return Ok(image.to_path_buf());
    }

    let fitted = img.resize(size, size, FilterType::Lanczos3).to_rgb8();
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([0, 0, 0]));
    let x = (size - fitted.width()) / 2;
    let y = (size - fitted.height()) / 2;
    imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);

    canvas.save_with_format(dest, ImageFormat::Jpeg)?;
    log::debug!("Cover {} normalized to {}", image.display(), dest.display());
    Ok(dest.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::media::tags::test_support::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn normalizes_to_exact_square() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("wide.png");
        std::fs::write(&src, png_bytes(300, 120)).unwrap();
        let dest = dir.path().join("wide_512.jpg");

        let out = normalize_to_square(&src, 512, &dest).unwrap();

        assert_eq!(out, dest);
        let img = image::open(&out).unwrap();
        assert_eq!((img.width(), img.height()), (512, 512));
        assert_eq!(img.color(), ColorType::Rgb8);
        // source is untouched
        let original = image::open(&src).unwrap();
        assert_eq!((original.width(), original.height()), (300, 120));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tall.png");
        std::fs::write(&src, png_bytes(90, 400)).unwrap();

        let once = normalize_to_square(&src, 128, &dir.path().join("once.jpg")).unwrap();
        let twice_dest = dir.path().join("twice.jpg");
        let twice = normalize_to_square(&once, 128, &twice_dest).unwrap();

        assert_eq!(twice, once);
        assert!(!twice_dest.exists());
        let a = image::open(&once).unwrap();
        let b = image::open(&twice).unwrap();
        assert_eq!((a.width(), a.height(), a.color()), (b.width(), b.height(), b.color()));
    }

    #[test]
    fn undecodable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.jpg");
        std::fs::write(&src, b"\xFF\xD8\xFF garbage").unwrap();

        assert!(normalize_to_square(&src, 64, &dir.path().join("out.jpg")).is_err());
    }

    #[test]
    fn persists_only_decodable_pictures() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("cover_1");

        assert!(persist_picture(b"", &base).is_none());
        assert!(persist_picture(b"\x89PNG\r\n\x1a\nbroken", &base).is_none());
        assert!(!dir.path().join("cover_1.png").exists());

        let path = persist_picture(&png_bytes(4, 4), &base).unwrap();
        assert_eq!(path, dir.path().join("cover_1.png"));
        assert!(path.exists());
    }

    #[test]
    fn extracts_embedded_cover_from_mp3() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("track.mp3");
        std::fs::write(&audio, mp3_with_picture("image/png", &png_bytes(16, 16))).unwrap();

        let cover = extract_embedded_cover(&audio, &dir.path().join("cover_track")).unwrap();

        assert_eq!(cover.extension().unwrap(), "png");
        let img = image::open(&cover).unwrap();
        assert_eq!((img.width(), img.height()), (16, 16));
    }

    #[test]
    fn extracts_embedded_cover_from_flac() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("track.flac");
        let file = flac_with_picture("Band", "Song", "image/png", &png_bytes(24, 24));
        std::fs::write(&audio, file).unwrap();

        let cover = extract_embedded_cover(&audio, &dir.path().join("cover_track")).unwrap();

        assert_eq!(cover, dir.path().join("cover_track.png"));
        let img = image::open(&cover).unwrap();
        assert_eq!((img.width(), img.height()), (24, 24));
    }

    #[test]
    fn corrupted_embedded_cover_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let truncated = b"\xFF\xD8\xFF\xE0 truncated jpeg";

        let mp3 = dir.path().join("track.mp3");
        std::fs::write(&mp3, mp3_with_picture("image/jpeg", truncated)).unwrap();
        assert!(extract_embedded_cover(&mp3, &dir.path().join("cover_mp3")).is_none());

        let flac = dir.path().join("track.flac");
        std::fs::write(&flac, flac_with_picture("A", "B", "image/jpeg", truncated)).unwrap();
        assert!(extract_embedded_cover(&flac, &dir.path().join("cover_flac")).is_none());

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn audio_without_cover_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("plain.mp3");
        std::fs::write(&audio, mpeg_frames(20)).unwrap();

        assert!(extract_embedded_cover(&audio, &dir.path().join("cover_plain")).is_none());
    }
}
