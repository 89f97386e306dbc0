//! Frame-to-matrix transcoding.
//!
//! Driver frames are row-major, packed and interleaved. The transcoder first
//! brings the destination descriptor in line with the frame (one resize at
//! most), then copies row by row through the destination strides. Every
//! check happens before the first byte is written.

use crate::error::{Result, TranscodeError};
use crate::matrix::{ElementType, MatrixBuffer, MatrixInfo};

/// Borrowed view of a driver frame.
///
/// `data` is `None` when the driver handed out a null buffer.
#[derive(Debug, Clone, Copy)]
pub struct SourceFrame<'a> {
    pub width: usize,
    pub height: usize,
    pub bytes_per_pixel: usize,
    pub data: Option<&'a [u8]>,
}

/// Destination cell layout for one kind of frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub element_type: ElementType,
    pub planecount: usize,
}

impl FrameLayout {
    /// Single-plane float32 depth samples.
    pub const DEPTH: Self = Self {
        element_type: ElementType::Float32,
        planecount: 1,
    };

    /// Four-plane char color, planes in `[A, R, G, B]` order.
    pub const COLOR: Self = Self {
        element_type: ElementType::Char,
        planecount: 4,
    };

    pub const fn bytes_per_pixel(self) -> usize {
        self.planecount * self.element_type.size()
    }

    /// Matrix descriptor holding a `width` x `height` frame.
    pub fn info_for(self, width: usize, height: usize) -> MatrixInfo {
        MatrixInfo::new(self.element_type, self.planecount, &[width, height])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelOrder {
    Passthrough,
    Reversed,
}

/// Copy a float32 depth frame into `dst`, sample for sample.
///
/// No scaling, clamping or NaN filtering is applied.
pub fn copy_depth<M: MatrixBuffer + ?Sized>(frame: &SourceFrame<'_>, dst: &mut M) -> Result<()> {
    transcode(frame, dst, FrameLayout::DEPTH, PixelOrder::Passthrough)
}

/// Copy a BGRA color frame into a 4-plane `dst`.
///
/// The four bytes of each pixel are written in reverse, so source
/// `[B, G, R, A]` lands as planes `[A, R, G, B]`.
pub fn copy_color<M: MatrixBuffer + ?Sized>(frame: &SourceFrame<'_>, dst: &mut M) -> Result<()> {
    transcode(frame, dst, FrameLayout::COLOR, PixelOrder::Reversed)
}

/// Resize `dst` to `expected` unless type, planes and dims already match.
///
/// Returns `true` when a resize happened.
pub fn ensure_layout<M: MatrixBuffer + ?Sized>(dst: &mut M, expected: &MatrixInfo) -> bool {
    if dst.info().same_layout(expected) {
        return false;
    }
    let mismatch = TranscodeError::DimensionMismatch {
        expected: expected.to_string(),
        actual: dst.info().to_string(),
    };
    tracing::debug!("{mismatch}; resizing destination");
    dst.resize(expected.clone());
    true
}

fn transcode<M: MatrixBuffer + ?Sized>(
    frame: &SourceFrame<'_>,
    dst: &mut M,
    layout: FrameLayout,
    order: PixelOrder,
) -> Result<()> {
    let src = validate_source(frame, layout)?;
    let (width, height) = (frame.width, frame.height);
    let bpp = layout.bytes_per_pixel();

    let expected = layout.info_for(width, height);
    ensure_layout(dst, &expected);

    let info = dst.info().clone();
    if info.dimcount() != 2 || !info.same_layout(&expected) {
        return Err(TranscodeError::DimensionMismatch {
            expected: expected.to_string(),
            actual: info.to_string(),
        });
    }

    let (step, row_stride) = match info.dimstride.as_slice() {
        [step, row_stride] => (*step, *row_stride),
        strides => {
            return Err(TranscodeError::InvalidDestination(format!(
                "{} strides for a 2D matrix",
                strides.len()
            )))
        }
    };
    if step < bpp {
        return Err(TranscodeError::InvalidDestination(format!(
            "cell stride {step} is smaller than {bpp} bytes"
        )));
    }
    let overflow = || TranscodeError::InvalidDestination("matrix strides overflow".to_string());
    let row_span = (width - 1)
        .checked_mul(step)
        .and_then(|n| n.checked_add(bpp))
        .ok_or_else(overflow)?;
    if row_stride < row_span {
        return Err(TranscodeError::InvalidDestination(format!(
            "row stride {row_stride} is smaller than {row_span} bytes"
        )));
    }
    let required = (height - 1)
        .checked_mul(row_stride)
        .and_then(|n| n.checked_add(row_span))
        .ok_or_else(overflow)?;

    let data = dst
        .data_mut()
        .ok_or_else(|| TranscodeError::InvalidDestination("matrix has no data".to_string()))?;
    if data.len() < required {
        return Err(TranscodeError::InvalidDestination(format!(
            "matrix holds {} bytes, frame needs {required}",
            data.len()
        )));
    }

    let contiguous = order == PixelOrder::Passthrough && step == bpp;
    for (y, src_row) in src.chunks_exact(width * bpp).take(height).enumerate() {
        let start = y * row_stride;
        let dst_row = &mut data[start..start + row_span];
        if contiguous {
            dst_row.copy_from_slice(src_row);
            continue;
        }
        for (px, cell) in src_row.chunks_exact(bpp).zip(dst_row.chunks_mut(step)) {
            write_pixel(px, &mut cell[..bpp], order);
        }
    }
    Ok(())
}

fn write_pixel(px: &[u8], out: &mut [u8], order: PixelOrder) {
    match order {
        PixelOrder::Passthrough => out.copy_from_slice(px),
        PixelOrder::Reversed => {
            for (o, p) in out.iter_mut().zip(px.iter().rev()) {
                *o = *p;
            }
        }
    }
}

/// Check the frame buffer and return exactly `width * height` pixels of it.
fn validate_source<'a>(frame: &SourceFrame<'a>, layout: FrameLayout) -> Result<&'a [u8]> {
    let data = frame
        .data
        .ok_or_else(|| TranscodeError::InvalidSource("frame buffer is null".to_string()))?;
    if frame.width == 0 || frame.height == 0 {
        return Err(TranscodeError::InvalidSource(format!(
            "empty frame {}x{}",
            frame.width, frame.height
        )));
    }
    if frame.bytes_per_pixel != layout.bytes_per_pixel() {
        return Err(TranscodeError::InvalidSource(format!(
            "{} bytes per pixel, expected {}",
            frame.bytes_per_pixel,
            layout.bytes_per_pixel()
        )));
    }
    let needed = frame
        .width
        .checked_mul(frame.height)
        .and_then(|n| n.checked_mul(frame.bytes_per_pixel))
        .ok_or_else(|| TranscodeError::InvalidSource("frame size overflows".to_string()))?;
    if data.len() < needed {
        return Err(TranscodeError::InvalidSource(format!(
            "frame holds {} bytes, {needed} expected",
            data.len()
        )));
    }
    Ok(&data[..needed])
}
