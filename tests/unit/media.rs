use std::io::Cursor;

use super::*;

fn png_bytes(rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(1, 1, rgba.to_vec()).unwrap();
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("noderender-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn decode_premultiplies() {
    let frame = decode_image(&png_bytes([100, 50, 200, 128])).unwrap();
    assert_eq!((frame.width, frame.height), (1, 1));
    assert_eq!(
        frame.data,
        vec![
            ((100u16 * 128 + 127) / 255) as u8,
            ((50u16 * 128 + 127) / 255) as u8,
            ((200u16 * 128 + 127) / 255) as u8,
            128
        ]
    );
}

#[test]
fn decode_rejects_garbage() {
    assert!(decode_image(b"not an image").is_err());
}

#[test]
fn still_images_are_read_once_and_cached() {
    let dir = scratch_dir("still");
    std::fs::write(dir.join("a.png"), png_bytes([1, 2, 3, 255])).unwrap();

    let source = StillImageSource::new(&dir);
    let footage = FootageRef::new("a.png");
    let first = source.frame(&footage, FrameIndex(0)).unwrap();
    assert_eq!(first.data, vec![1, 2, 3, 255]);

    std::fs::remove_file(dir.join("a.png")).unwrap();
    let again = source.frame(&footage, FrameIndex(40)).unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(source.cached(), 1);
}

#[test]
fn missing_footage_is_none() {
    let source = StillImageSource::new(scratch_dir("missing"));
    assert!(source.frame(&FootageRef::new("nope.png"), FrameIndex(0)).is_none());

    let mut other_stream = FootageRef::new("nope.png");
    other_stream.stream = 2;
    assert!(source.frame(&other_stream, FrameIndex(0)).is_none());
    assert!(NoFootage.frame(&FootageRef::new("x"), FrameIndex(0)).is_none());
}

#[test]
fn inserted_frames_resolve_against_root() {
    let source = StillImageSource::new("/footage");
    source.insert("logo.png", FrameRGBA::transparent(2, 2).unwrap());
    let frame = source
        .frame(&FootageRef::new("/footage/logo.png"), FrameIndex(0))
        .unwrap();
    assert_eq!(frame.width, 2);
}
