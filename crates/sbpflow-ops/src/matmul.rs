use sbpflow_core::{BlobDesc, ParallelContext, Shape};

use crate::conf::{MatmulConf, OpTypeConf, OperatorConf};
use crate::error::{OpError, Result};
use crate::operator::{required_desc, required_flag, OpBindings, Operator};
use crate::sbp::{SbpSignatureBuilder, SbpSignatureList};
use crate::{BlobDescMap, HasBatchDimMap};

/// `out[m, n] = a[m, k] * b[k, n]`, either side optionally transposed.
#[derive(Debug)]
pub struct MatmulOp {
    op_conf: OperatorConf,
    conf: MatmulConf,
    bindings: OpBindings,
}

impl MatmulOp {
    pub fn init_from_op_conf(op_conf: OperatorConf) -> Result<Self> {
        let OpTypeConf::Matmul(conf) = &op_conf.op_type else {
            return Err(OpError::InvalidConfig(format!(
                "`{}` is not a matmul conf",
                op_conf.name
            )));
        };
        let conf = conf.clone();
        let mut bindings = OpBindings::new();
        bindings.enroll_input("a")?;
        bindings.enroll_input("b")?;
        bindings.enroll_output("out", true)?;
        Ok(Self {
            op_conf,
            conf,
            bindings,
        })
    }

    /// Axes of `a` holding m and k.
    fn a_axes(&self) -> (usize, usize) {
        if self.conf.transpose_a {
            (1, 0)
        } else {
            (0, 1)
        }
    }

    /// Axes of `b` holding k and n.
    fn b_axes(&self) -> (usize, usize) {
        if self.conf.transpose_b {
            (1, 0)
        } else {
            (0, 1)
        }
    }
}

fn matrix_dims(bn: &str, desc: &BlobDesc) -> Result<[usize; 2]> {
    match desc.shape.dims() {
        &[rows, cols] => Ok([rows, cols]),
        _ => Err(OpError::InvalidConfig(format!(
            "`{bn}` must be a matrix, got shape {}",
            desc.shape
        ))),
    }
}

impl Operator for MatmulOp {
    fn op_conf(&self) -> &OperatorConf {
        &self.op_conf
    }

    fn bindings(&self) -> &OpBindings {
        &self.bindings
    }

    fn infer_blob_descs(
        &self,
        blob_descs: &mut BlobDescMap,
        _parallel_ctx: &ParallelContext,
    ) -> Result<()> {
        let a = required_desc(blob_descs, "a")?;
        let b = required_desc(blob_descs, "b")?;
        if a.data_type != b.data_type {
            return Err(OpError::DescMismatch {
                bn: "b".to_string(),
                expected: format!("{:?}", a.data_type),
                actual: format!("{:?}", b.data_type),
            });
        }
        let a_dims = matrix_dims("a", a)?;
        let b_dims = matrix_dims("b", b)?;
        let (m_axis, ka_axis) = self.a_axes();
        let (kb_axis, n_axis) = self.b_axes();
        if a_dims[ka_axis] != b_dims[kb_axis] {
            return Err(OpError::DescMismatch {
                bn: "b".to_string(),
                expected: format!("contraction extent {}", a_dims[ka_axis]),
                actual: format!("contraction extent {}", b_dims[kb_axis]),
            });
        }
        let out = BlobDesc::new(
            a.data_type,
            Shape::from_slice(&[a_dims[m_axis], b_dims[n_axis]]),
        );
        blob_descs.insert("out".to_string(), out);
        Ok(())
    }

    fn infer_has_batch_dim(&self, has_batch_dim: &mut HasBatchDimMap) -> Result<()> {
        let a = required_flag(has_batch_dim, "a")?;
        has_batch_dim.insert("out".to_string(), a);
        Ok(())
    }

    fn get_sbp_signatures(&self, _logical: &BlobDescMap) -> Result<SbpSignatureList> {
        let (m_axis, ka_axis) = self.a_axes();
        let (kb_axis, n_axis) = self.b_axes();
        Ok(SbpSignatureList::from_iter([
            SbpSignatureBuilder::new()
                .split("a", m_axis)
                .broadcast(["b"])
                .split("out", 0)
                .build(),
            SbpSignatureBuilder::new()
                .broadcast(["a"])
                .split("b", n_axis)
                .split("out", 1)
                .build(),
            SbpSignatureBuilder::new()
                .split("a", ka_axis)
                .split("b", kb_axis)
                .partial_sum(["out"])
                .build(),
        ]))
    }
}
