pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

pub(crate) fn opacity_to_u8(opacity: f32) -> u16 {
    ((opacity.clamp(0.0, 1.0) * 255.0).round() as i32).clamp(0, 255) as u16
}

/// Source-over of premultiplied `src` onto `dst`, with `src` scaled by `opacity`.
pub(crate) fn over(dst: [u8; 4], src: [u8; 4], opacity: f32) -> [u8; 4] {
    let op = opacity_to_u8(opacity);
    let sa = mul_div255_u8(u16::from(src[3]), op);
    if op == 0 || sa == 0 {
        return dst;
    }

    let inv = 255u16 - u16::from(sa);
    let mut out = [0u8; 4];
    out[3] = sa.saturating_add(mul_div255_u8(u16::from(dst[3]), inv));
    for i in 0..3 {
        let sc = mul_div255_u8(u16::from(src[i]), op);
        let dc = mul_div255_u8(u16::from(dst[i]), inv);
        out[i] = sc.saturating_add(dc);
    }
    out
}

/// Scale every premultiplied channel by `opacity`.
pub(crate) fn fade(px: [u8; 4], opacity: f32) -> [u8; 4] {
    let op = opacity_to_u8(opacity);
    px.map(|c| mul_div255_u8(u16::from(c), op))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
