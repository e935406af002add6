use std::fmt;

use serde::{Deserialize, Serialize};

/// Smallest epsilon the cuDNN batch-normalization path accepts.
pub const CUDNN_BN_MIN_EPSILON: f32 = 1e-5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Cpu,
    Gpu,
}

/// Configuration of one operator instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperatorConf {
    pub name: String,
    #[serde(default)]
    pub device_type: DeviceType,
    #[serde(default)]
    pub enable_cudnn: bool,
    #[serde(flatten)]
    pub op_type: OpTypeConf,
}

impl OperatorConf {
    pub fn new(name: impl Into<String>, op_type: OpTypeConf) -> Self {
        Self {
            name: name.into(),
            device_type: DeviceType::Cpu,
            enable_cudnn: false,
            op_type,
        }
    }

    pub fn on_gpu(mut self, enable_cudnn: bool) -> Self {
        self.device_type = DeviceType::Gpu;
        self.enable_cudnn = enable_cudnn;
        self
    }

    /// True when the operator will run on the GPU through cuDNN.
    pub fn dev_is_gpu_and_enable_cudnn(&self) -> bool {
        self.device_type == DeviceType::Gpu && self.enable_cudnn
    }

    pub fn kind(&self) -> OpKind {
        self.op_type.kind()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpTypeConf {
    Normalization(NormalizationConf),
    Matmul(MatmulConf),
}

impl OpTypeConf {
    pub fn kind(&self) -> OpKind {
        match self {
            OpTypeConf::Normalization(_) => OpKind::Normalization,
            OpTypeConf::Matmul(_) => OpKind::Matmul,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Normalization,
    Matmul,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpKind::Normalization => write!(f, "normalization"),
            OpKind::Matmul => write!(f, "matmul"),
        }
    }
}

/// Batch normalization. `moving_mean`, `moving_variance`, `gamma` and `beta` name
/// the logical blobs that supply those parameters; `None` means the operator has to
/// provide them itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConf {
    #[serde(default = "default_norm_axis")]
    pub axis: usize,
    #[serde(default = "default_momentum")]
    pub momentum: f32,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
    #[serde(default = "default_true")]
    pub is_training: bool,
    #[serde(default)]
    pub moving_mean: Option<String>,
    #[serde(default)]
    pub moving_variance: Option<String>,
    #[serde(default)]
    pub gamma: Option<String>,
    #[serde(default)]
    pub beta: Option<String>,
}

impl Default for NormalizationConf {
    fn default() -> Self {
        Self {
            axis: default_norm_axis(),
            momentum: default_momentum(),
            epsilon: default_epsilon(),
            is_training: true,
            moving_mean: None,
            moving_variance: None,
            gamma: None,
            beta: None,
        }
    }
}

impl NormalizationConf {
    /// Conf with every parameter supplied from outside.
    pub fn with_all_params() -> Self {
        Self {
            moving_mean: Some("moving_mean".to_string()),
            moving_variance: Some("moving_variance".to_string()),
            gamma: Some("gamma".to_string()),
            beta: Some("beta".to_string()),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatmulConf {
    #[serde(default)]
    pub transpose_a: bool,
    #[serde(default)]
    pub transpose_b: bool,
}

fn default_norm_axis() -> usize {
    1
}

fn default_momentum() -> f32 {
    0.99
}

fn default_epsilon() -> f32 {
    1e-3
}

fn default_true() -> bool {
    true
}
