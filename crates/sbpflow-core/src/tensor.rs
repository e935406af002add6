use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Cpu,
    Cuda { device_id: u32 },
}

impl Device {
    pub fn is_gpu(&self) -> bool {
        matches!(self, Device::Cuda { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F64,
    F32,
    F16,
    I64,
    I32,
    I8,
    U8,
}

impl DType {
    pub fn size_of(self) -> usize {
        match self {
            DType::F64 | DType::I64 => 8,
            DType::F32 | DType::I32 => 4,
            DType::F16 => 2,
            DType::I8 | DType::U8 => 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }
    pub fn rank(&self) -> usize {
        self.0.len()
    }
    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>().max(1)
    }
    /// Extent along `axis`, `None` when the axis is out of rank.
    pub fn at(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }
    pub fn dims(&self) -> &[usize] {
        &self.0
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

/// Data type and shape of one operand.
///
/// Descriptors are produced during blob-desc inference and owned by the operand slot
/// that holds them; an inference pass never changes the rank of a shape it has set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobDesc {
    pub data_type: DType,
    pub shape: Shape,
}

impl BlobDesc {
    pub fn new(data_type: DType, shape: Shape) -> Self {
        Self { data_type, shape }
    }

    pub fn byte_len(&self) -> usize {
        self.shape.numel() * self.data_type.size_of()
    }
}

impl fmt::Display for BlobDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{}", self.data_type, self.shape)
    }
}

/// A tensor payload carried between actors. Cloning shares the underlying buffer.
#[derive(Clone, Debug)]
pub struct Tensor {
    pub desc: BlobDesc,
    pub device: Device,
    data: Bytes,
}

impl Tensor {
    pub fn from_cpu_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            desc: BlobDesc::new(dtype, shape),
            device: Device::Cpu,
            data: bytes,
        }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Bytes actually carried, which may disagree with `desc.byte_len()`.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// True when the carried bytes cover exactly what the descriptor declares.
    pub fn is_consistent(&self) -> bool {
        self.data.len() == self.desc.byte_len()
    }
}
