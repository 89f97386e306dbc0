use std::fmt;

use parking_lot::{Mutex, MutexGuard};

/// Row alignment in bytes used when the host lays out a matrix.
pub const ROW_ALIGN: usize = 16;

/// Cell element type of a matrix plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Char,
    Long,
    Float32,
    Float64,
}

impl ElementType {
    /// Size of one element in bytes.
    pub const fn size(self) -> usize {
        match self {
            Self::Char => 1,
            Self::Long | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Host type name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::Long => "long",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matrix descriptor: element type, planes, dimensions and byte strides.
///
/// `dimstride[0]` is the byte step between neighbouring cells of a row and
/// `dimstride[1]` the byte step between rows. Rows are padded to
/// [`ROW_ALIGN`], so `dimstride[1]` may exceed `dim[0] * dimstride[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixInfo {
    pub element_type: ElementType,
    pub planecount: usize,
    pub dim: Vec<usize>,
    pub dimstride: Vec<usize>,
}

impl MatrixInfo {
    /// Build a descriptor with host-computed strides.
    pub fn new(element_type: ElementType, planecount: usize, dim: &[usize]) -> Self {
        let cell = planecount * element_type.size();
        let mut dimstride = Vec::with_capacity(dim.len());
        for (i, _) in dim.iter().enumerate() {
            let stride = match i {
                0 => cell,
                1 => (dim[0] * cell).next_multiple_of(ROW_ALIGN),
                _ => dimstride[i - 1] * dim[i - 1],
            };
            dimstride.push(stride);
        }
        Self {
            element_type,
            planecount,
            dim: dim.to_vec(),
            dimstride,
        }
    }

    pub fn dimcount(&self) -> usize {
        self.dim.len()
    }

    /// Bytes in one cell (all planes).
    pub fn cell_bytes(&self) -> usize {
        self.planecount * self.element_type.size()
    }

    /// Total bytes spanned by the matrix data.
    pub fn byte_len(&self) -> usize {
        match (self.dim.last(), self.dimstride.last()) {
            (Some(&d), Some(&s)) => d * s,
            _ => 0,
        }
    }

    /// Whether type, planecount and dimensions match, ignoring strides.
    pub fn same_layout(&self, other: &MatrixInfo) -> bool {
        self.element_type == other.element_type
            && self.planecount == other.planecount
            && self.dim == other.dim
    }
}

impl fmt::Display for MatrixInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dim.iter().map(|d| d.to_string()).collect();
        write!(
            f,
            "{} {} [{}]",
            self.element_type,
            self.planecount,
            dims.join("x")
        )
    }
}

/// Write access to a host matrix for the duration of one transcode.
///
/// Implemented by [`MatrixData`]; the transcoder only goes through this
/// trait so the ordering of resizes and writes can be observed in tests.
pub trait MatrixBuffer {
    /// Current descriptor.
    fn info(&self) -> &MatrixInfo;

    /// Replace the descriptor and reallocate. Strides in `info` are
    /// recomputed by the host.
    fn resize(&mut self, info: MatrixInfo);

    /// Mutable cell data, `None` when the matrix holds no allocation.
    fn data_mut(&mut self) -> Option<&mut [u8]>;
}

/// Owned matrix storage.
#[derive(Debug, Clone)]
pub struct MatrixData {
    info: MatrixInfo,
    data: Option<Vec<u8>>,
}

impl MatrixData {
    /// Allocate zeroed storage for `info`.
    pub fn new(info: MatrixInfo) -> Self {
        let info = MatrixInfo::new(info.element_type, info.planecount, &info.dim);
        let len = info.byte_len();
        let data = (len > 0).then(|| vec![0u8; len]);
        Self { info, data }
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    /// Bytes of the cell at `(x, y)` in a 2D matrix.
    pub fn cell(&self, x: usize, y: usize) -> Option<&[u8]> {
        if self.info.dimcount() != 2 || x >= self.info.dim[0] || y >= self.info.dim[1] {
            return None;
        }
        let offset = y * self.info.dimstride[1] + x * self.info.dimstride[0];
        self.data
            .as_deref()?
            .get(offset..offset + self.info.cell_bytes())
    }

    /// Plane 0 of a float32 cell.
    pub fn read_f32(&self, x: usize, y: usize) -> Option<f32> {
        if self.info.element_type != ElementType::Float32 {
            return None;
        }
        let cell = self.cell(x, y)?;
        Some(bytemuck::pod_read_unaligned(&cell[..4]))
    }
}

impl MatrixBuffer for MatrixData {
    fn info(&self) -> &MatrixInfo {
        &self.info
    }

    fn resize(&mut self, info: MatrixInfo) {
        *self = MatrixData::new(info);
    }

    fn data_mut(&mut self) -> Option<&mut [u8]> {
        self.data.as_deref_mut()
    }
}

/// A host matrix shared between the host and the capture path.
///
/// Readers and the transcoder take the lock for the whole access; the guard
/// releases it on every exit path.
#[derive(Debug)]
pub struct Matrix {
    inner: Mutex<MatrixData>,
}

impl Matrix {
    pub fn new(info: MatrixInfo) -> Self {
        Self {
            inner: Mutex::new(MatrixData::new(info)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MatrixData> {
        self.inner.lock()
    }

    /// Snapshot of the current descriptor.
    pub fn info(&self) -> MatrixInfo {
        self.inner.lock().info.clone()
    }
}
