use super::*;
use crate::raster::{Color, Point, RasterError};

fn scribbled() -> Raster {
    let mut r = Raster::new(12, 9);
    r.stroke_segment(Point::new(1.0, 1.0), Point::new(10.0, 7.0), 2.0, Color::rgba(40, 90, 200, 220));
    r
}

#[tokio::test]
async fn capture_then_apply_restores_surface() {
    let mut surface = scribbled();
    let snap = Snapshot::capture(&surface).await.unwrap();

    surface.stroke_segment(Point::new(0.0, 8.0), Point::new(11.0, 0.0), 3.0, Color::WHITE);
    assert_ne!(&surface, snap.raster());

    snap.apply(&mut surface).await.unwrap();
    assert_eq!(&surface, snap.raster());
}

#[tokio::test]
async fn applying_twice_is_idempotent() {
    let snap = Snapshot::new(scribbled());
    let mut surface = Raster::filled(12, 9, Color::BLACK);

    snap.apply(&mut surface).await.unwrap();
    let once = surface.clone();
    snap.apply(&mut surface).await.unwrap();
    assert_eq!(surface, once);
}

#[tokio::test]
async fn apply_replaces_dimensions() {
    let snap = Snapshot::new(Raster::filled(3, 2, Color::WHITE));
    let mut surface = Raster::new(10, 10);
    snap.apply(&mut surface).await.unwrap();
    assert_eq!((surface.width(), surface.height()), (3, 2));
}

#[tokio::test]
async fn capture_is_frozen() {
    let mut surface = scribbled();
    let snap = Snapshot::capture(&surface).await.unwrap();
    let frozen = snap.raster().clone();
    surface.clear();
    assert_eq!(snap.raster(), &frozen);
}

#[test]
fn encode_decode_preserves_pixels() {
    let snap = Snapshot::new(scribbled());
    let bytes = snap.encode();
    assert_eq!(&bytes[..4], b"CHBS");
    assert_eq!(bytes.len(), 12 + 12 * 9 * 4);
    assert_eq!(Snapshot::decode(&bytes).unwrap(), snap);
}

#[test]
fn decode_rejects_short_input() {
    assert!(matches!(Snapshot::decode(b"CHB"), Err(SnapshotDecodeError::Truncated(3))));
}

#[test]
fn decode_rejects_bad_magic() {
    let mut bytes = Snapshot::new(Raster::new(1, 1)).encode();
    bytes[0] = b'X';
    assert!(matches!(Snapshot::decode(&bytes), Err(SnapshotDecodeError::Magic)));
}

#[test]
fn decode_rejects_length_mismatch() {
    let mut bytes = Snapshot::new(Raster::new(2, 2)).encode();
    bytes.pop();
    assert!(matches!(Snapshot::decode(&bytes), Err(SnapshotDecodeError::Raster(_))));
}

#[test]
fn decode_rejects_dimensions_that_overflow() {
    let mut bytes = b"CHBS".to_vec();
    bytes.extend_from_slice(&u32::MAX.to_be_bytes());
    bytes.extend_from_slice(&u32::MAX.to_be_bytes());
    let err = Snapshot::decode(&bytes).unwrap_err();
    assert!(matches!(err, SnapshotDecodeError::Raster(RasterError::TooLarge { width: u32::MAX, height: u32::MAX })));
}

#[test]
fn clones_compare_equal_without_copying() {
    let snap = Snapshot::new(scribbled());
    let copy = snap.clone();
    assert!(std::ptr::eq(snap.raster(), copy.raster()));
    assert_eq!(snap, copy);
}
