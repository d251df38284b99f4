//! Hilbert curve ordering for point batches.
//!
//! Inserting points in Hilbert order keeps consecutive insertions spatially
//! close, so the point-location walk started from the previous insertion's
//! cell stays short. Used for seed insertion and for Lloyd rebuilds.

use crate::geometry::point::Point3;

/// Bits per axis used by [`hilbert_order`].
pub const DEFAULT_HILBERT_BITS: u32 = 16;

/// Quantizes `value` from `[min, max]` onto the integer grid `[0, 2^bits)`.
///
/// Degenerate or non-finite inputs map to 0; out-of-range values clamp.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
#[must_use]
pub fn quantize(value: f64, min: f64, max: f64, bits: u32) -> u32 {
    debug_assert!(bits > 0 && bits <= 31, "bits must be in range [1, 31]");
    let max_val = (1_u32 << bits) - 1;
    let extent = max - min;
    if !extent.is_finite() || extent <= 0.0 {
        return 0;
    }
    let t = (value - min) / extent;
    if !t.is_finite() {
        return 0;
    }
    let scaled = t.clamp(0.0, 1.0) * f64::from(max_val);
    (scaled as u32).min(max_val)
}

/// Hilbert index of integer grid coordinates, each `bits` wide.
///
/// Skilling's transpose algorithm ("Programming the Hilbert curve", 2004).
/// Successive indices visit adjacent grid cells.
#[must_use]
pub fn hilbert_index_from_quantized<const D: usize>(coords: &[u32; D], bits: u32) -> u128 {
    if D == 0 {
        return 0;
    }
    let mut transposed = *coords;

    // Transform axes into transposed form.
    let highest_bit_mask: u32 = 1_u32 << (bits - 1);
    let mut bit_mask = highest_bit_mask;
    while bit_mask > 1 {
        let low = bit_mask - 1;
        if transposed[0] & bit_mask != 0 {
            transposed[0] ^= low;
        }
        let (first, rest) = transposed.split_at_mut(1);
        for coord in rest {
            if *coord & bit_mask != 0 {
                first[0] ^= low;
            } else {
                let toggle = (first[0] ^ *coord) & low;
                first[0] ^= toggle;
                *coord ^= toggle;
            }
        }
        bit_mask >>= 1;
    }

    // Gray encode.
    let mut prev = transposed[0];
    for coord in transposed.iter_mut().skip(1) {
        *coord ^= prev;
        prev = *coord;
    }
    let mut gray_mask: u32 = 0;
    bit_mask = highest_bit_mask;
    while bit_mask > 1 {
        if transposed[D - 1] & bit_mask != 0 {
            gray_mask ^= bit_mask - 1;
        }
        bit_mask >>= 1;
    }
    for coord in &mut transposed {
        *coord ^= gray_mask;
    }

    let mut index: u128 = 0;
    for bit_pos in (0..bits).rev() {
        for &coord in &transposed {
            index = (index << 1) | u128::from((coord >> bit_pos) & 1);
        }
    }
    index
}

/// Hilbert index of `point` inside the axis-aligned box `[lower, upper]`.
#[must_use]
pub fn hilbert_index(point: Point3, lower: Point3, upper: Point3, bits: u32) -> u128 {
    let q = [
        quantize(point.x(), lower.x(), upper.x(), bits),
        quantize(point.y(), lower.y(), upper.y(), bits),
        quantize(point.z(), lower.z(), upper.z(), bits),
    ];
    hilbert_index_from_quantized(&q, bits)
}

/// Axis-aligned bounding box of finite points, or `None` if there are none.
#[must_use]
pub fn bounding_box(points: &[Point3]) -> Option<(Point3, Point3)> {
    let mut iter = points.iter().filter(|p| p.is_finite());
    let first = *iter.next()?;
    let (mut lo, mut hi) = (first.coords(), first.coords());
    for p in iter {
        for (axis, c) in p.coords().into_iter().enumerate() {
            lo[axis] = lo[axis].min(c);
            hi[axis] = hi[axis].max(c);
        }
    }
    Some((Point3::from(lo), Point3::from(hi)))
}

/// Indices of `points` in Hilbert order over their bounding box. Ties keep
/// input order, so the result is deterministic.
#[must_use]
pub fn hilbert_order(points: &[Point3]) -> Vec<usize> {
    let Some((lower, upper)) = bounding_box(points) else {
        return (0..points.len()).collect();
    };
    let mut keyed: Vec<(u128, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, &p)| (hilbert_index(p, lower, upper, DEFAULT_HILBERT_BITS), i))
        .collect();
    keyed.sort_unstable();
    keyed.into_iter().map(|(_, i)| i).collect()
}
