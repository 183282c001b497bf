use image::{Rgb, RgbImage};
use rustthumb::generate::{CapabilitySet, GenerationError, GenerationPipeline};
use std::fs;
use std::io::Write;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

fn pipeline() -> GenerationPipeline {
    GenerationPipeline::new(CapabilitySet::none(), 8)
}

#[test]
fn test_text_file_is_rendered_not_copied() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hello.txt");
    fs::write(&path, "Hello\nWorld").unwrap();

    let thumb = pipeline().generate(&path, 128).unwrap();

    assert_eq!(thumb.dimensions(), (128, 128));
    let raw = fs::read(&path).unwrap();
    assert_ne!(thumb.as_raw().as_slice(), raw.as_slice());
    assert!(thumb.as_raw().len() > raw.len());

    // Something other than a single flat colour was drawn.
    let first = *thumb.get_pixel(0, 0);
    assert!(thumb.pixels().any(|p| *p != first));
}

#[test]
fn test_jpeg_is_downscaled_to_exact_square() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("wide.jpg");
    RgbImage::from_fn(400, 200, |x, _| Rgb([(x % 256) as u8, 80, 160]))
        .save(&path)
        .unwrap();

    let thumb = pipeline().generate(&path, 64).unwrap();
    assert_eq!(thumb.dimensions(), (64, 64));
    // Letterboxed: top row transparent, centre opaque.
    assert_eq!(thumb.get_pixel(32, 0)[3], 0);
    assert_eq!(thumb.get_pixel(32, 32)[3], 255);
}

#[test]
fn test_zero_byte_supported_file_fails_cleanly() {
    let dir = tempdir().unwrap();
    for name in ["empty.jpg", "empty.txt", "empty.wav", "empty.apk"] {
        let path = dir.path().join(name);
        fs::File::create(&path).unwrap();
        let err = pipeline().generate(&path, 64).unwrap_err();
        assert!(
            matches!(err, GenerationError::Failed { .. }),
            "{name}: unexpected {err:?}"
        );
    }
}

#[test]
fn test_corrupt_files_fail_without_panicking() {
    let dir = tempdir().unwrap();
    let garbage = vec![0xAB_u8; 4096];
    for name in ["bad.png", "bad.jpg", "bad.wav", "bad.mp3", "bad.apk"] {
        let path = dir.path().join(name);
        fs::write(&path, &garbage).unwrap();
        let err = pipeline().generate(&path, 64).unwrap_err();
        assert!(!err.is_unsupported(), "{name}: unexpected {err:?}");
    }
}

#[test]
fn test_missing_tools_report_unsupported() {
    let dir = tempdir().unwrap();
    for name in ["clip.mp4", "doc.pdf"] {
        let path = dir.path().join(name);
        fs::write(&path, b"some bytes").unwrap();
        let err = pipeline().generate(&path, 64).unwrap_err();
        assert!(err.is_unsupported(), "{name}: unexpected {err:?}");
    }
}

#[test]
fn test_iso_without_seven_zip_gets_generic_disc() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("install.iso");
    fs::write(&path, vec![0_u8; 2048]).unwrap();

    let thumb = pipeline().generate(&path, 96).unwrap();
    assert_eq!(thumb.dimensions(), (96, 96));
    // The hole in the middle is transparent, the ring is not.
    assert_eq!(thumb.get_pixel(48, 48)[3], 0);
    assert!(thumb.pixels().any(|p| p[3] == 255));
}

#[test]
fn test_apk_icon_is_extracted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("app.apk");

    let icon = image::RgbaImage::from_pixel(48, 48, image::Rgba([200, 30, 30, 255]));
    let mut png = std::io::Cursor::new(Vec::new());
    icon.write_to(&mut png, image::ImageFormat::Png).unwrap();

    let file = fs::File::create(&path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    zip.start_file("AndroidManifest.xml", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(b"binary manifest").unwrap();
    zip.start_file("res/mipmap-mdpi/ic_launcher.png", SimpleFileOptions::default())
        .unwrap();
    zip.write_all(png.get_ref()).unwrap();
    zip.finish().unwrap();

    let thumb = pipeline().generate(&path, 64).unwrap();
    assert_eq!(thumb.dimensions(), (64, 64));
    let centre = thumb.get_pixel(32, 32);
    assert!(centre[0] > 150 && centre[1] < 90, "centre was {centre:?}");
}

#[test]
fn test_unknown_and_directory_paths_are_unsupported() {
    let dir = tempdir().unwrap();
    let odd = dir.path().join("data.xyz");
    fs::write(&odd, b"??").unwrap();
    assert!(matches!(
        pipeline().generate(&odd, 64),
        Err(GenerationError::Unsupported(_))
    ));

    let folder = dir.path().join("folder.png");
    fs::create_dir(&folder).unwrap();
    assert!(matches!(
        pipeline().generate(&folder, 64),
        Err(GenerationError::Unsupported(_))
    ));
}
