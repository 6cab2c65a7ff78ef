use super::*;

#[test]
fn mul_div255_rounds_to_nearest() {
    assert_eq!(mul_div255_u8(255, 255), 255);
    assert_eq!(mul_div255_u8(128, 255), 128);
    assert_eq!(mul_div255_u8(0, 200), 0);
    assert_eq!(mul_div255_u16(255, 128), 128);
}

#[test]
fn over_opaque_source_replaces_destination() {
    assert_eq!(over([10, 20, 30, 255], [200, 0, 0, 255], 1.0), [200, 0, 0, 255]);
}

#[test]
fn over_transparent_or_zero_opacity_keeps_destination() {
    let dst = [10, 20, 30, 255];
    assert_eq!(over(dst, [0, 0, 0, 0], 1.0), dst);
    assert_eq!(over(dst, [255, 255, 255, 255], 0.0), dst);
}

#[test]
fn over_half_opacity_mixes() {
    let out = over([0, 0, 0, 255], [255, 255, 255, 255], 0.5);
    assert_eq!(out[3], 255);
    assert!(out[0] >= 127 && out[0] <= 129);
}

#[test]
fn fade_scales_all_channels() {
    assert_eq!(fade([255, 128, 0, 255], 0.0), [0, 0, 0, 0]);
    assert_eq!(fade([255, 128, 0, 255], 1.0), [255, 128, 0, 255]);
}
