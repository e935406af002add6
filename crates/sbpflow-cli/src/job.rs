use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{ensure, Context, Result};
use sbpflow_core::{BlobDesc, ParallelContext};
use sbpflow_ops::{
    BlobDescMap, HasBatchDimMap, OpKind, OpRegistry, OperatorConf, SbpSignatureList,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A list of operators together with the descs and batch flags of their inputs.
#[derive(Clone, Debug, Deserialize)]
pub struct JobConf {
    pub ops: Vec<JobOp>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct JobOp {
    pub conf: OperatorConf,
    #[serde(default)]
    pub blob_descs: BTreeMap<String, BlobDesc>,
    #[serde(default)]
    pub has_batch_dim: BTreeMap<String, bool>,
}

/// Everything inferred for one operator.
#[derive(Clone, Debug, Serialize)]
pub struct OpReport {
    pub name: String,
    pub kind: OpKind,
    pub blob_descs: BTreeMap<String, BlobDesc>,
    pub has_batch_dim: BTreeMap<String, bool>,
    pub sbp_signatures: SbpSignatureList,
    /// Indexed by signature, then by worker.
    pub shard_descs: Vec<Vec<BTreeMap<String, BlobDesc>>>,
}

pub fn load_job(path: &Path) -> Result<JobConf> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid job {}", path.display()))
}

pub fn infer_job(job: JobConf, parallel_num: usize) -> Result<Vec<OpReport>> {
    ensure!(parallel_num > 0, "parallel_num must be positive");
    let registry = OpRegistry::with_builtin();
    let mut reports = Vec::with_capacity(job.ops.len());
    for job_op in job.ops {
        let name = job_op.conf.name.clone();
        let op = registry
            .construct(job_op.conf)
            .with_context(|| format!("failed to construct `{name}`"))?;

        let mut blob_descs: BlobDescMap = job_op.blob_descs.into_iter().collect();
        op.infer_blob_descs(&mut blob_descs, &ParallelContext::single())
            .with_context(|| format!("blob desc inference failed for `{name}`"))?;

        let mut has_batch_dim: HasBatchDimMap = job_op.has_batch_dim.into_iter().collect();
        op.infer_has_batch_dim(&mut has_batch_dim)
            .with_context(|| format!("batch dim inference failed for `{name}`"))?;

        let sbp_signatures = op
            .sbp_signatures_checked(&blob_descs, parallel_num)
            .with_context(|| format!("no valid sbp signatures for `{name}`"))?;
        let shard_descs = shard_descs(&sbp_signatures, &blob_descs, parallel_num)
            .with_context(|| format!("sharding failed for `{name}`"))?;
        debug!(op = %name, signatures = sbp_signatures.len(), "operator inferred");

        reports.push(OpReport {
            kind: op.op_conf().kind(),
            name,
            blob_descs: blob_descs.into_iter().collect(),
            has_batch_dim: has_batch_dim.into_iter().collect(),
            sbp_signatures,
            shard_descs,
        });
    }
    info!(ops = reports.len(), parallel_num, "job inferred");
    Ok(reports)
}

fn shard_descs(
    signatures: &SbpSignatureList,
    logical: &BlobDescMap,
    parallel_num: usize,
) -> Result<Vec<Vec<BTreeMap<String, BlobDesc>>>> {
    let mut per_signature = Vec::with_capacity(signatures.len());
    for signature in signatures {
        let mut per_worker: Vec<BTreeMap<String, BlobDesc>> = Vec::with_capacity(parallel_num);
        for parallel_id in 0..parallel_num {
            let ctx = ParallelContext::new(parallel_id, parallel_num);
            per_worker.push(signature.shard_descs(logical, &ctx)?.into_iter().collect());
        }
        per_signature.push(per_worker);
    }
    Ok(per_signature)
}

#[cfg(test)]
mod tests {
    use sbpflow_core::{DType, Shape};
    use sbpflow_ops::SbpParallel;

    use super::*;

    fn job(json: &str) -> JobConf {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn normalization_job_fills_params_and_stats() {
        let job = job(r#"{
            "ops": [{
                "conf": {
                    "name": "bn",
                    "type": "normalization",
                    "axis": 1,
                    "gamma": "w/gamma",
                    "beta": "w/beta"
                },
                "blob_descs": { "in": { "data_type": "f32", "shape": [8, 3] } },
                "has_batch_dim": { "in": true }
            }]
        }"#);
        let reports = infer_job(job, 4).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.kind, OpKind::Normalization);

        let param = BlobDesc::new(DType::F32, Shape::from_slice(&[3]));
        assert_eq!(report.blob_descs["out"], report.blob_descs["in"]);
        assert_eq!(report.blob_descs["moving_mean"], param);
        assert_eq!(report.blob_descs["inv_variance"], param);
        assert!(!report.blob_descs.contains_key("gamma"));

        assert!(report.has_batch_dim["out"]);
        assert!(!report.has_batch_dim["mean"]);

        let signature = report.sbp_signatures.iter().next().unwrap();
        assert_eq!(signature.get("in"), Some(SbpParallel::Split(0)));
        assert_eq!(signature.get("gamma"), Some(SbpParallel::Broadcast));

        assert_eq!(report.shard_descs.len(), 1);
        assert_eq!(report.shard_descs[0].len(), 4);
        for worker in &report.shard_descs[0] {
            assert_eq!(worker["in"].shape, Shape::from_slice(&[2, 3]));
            assert_eq!(worker["out"].shape, Shape::from_slice(&[2, 3]));
            assert!(!worker.contains_key("moving_mean"));
        }
    }

    #[test]
    fn too_many_workers_for_the_batch_fails() {
        let job = job(r#"{
            "ops": [{
                "conf": { "name": "mm", "type": "matmul" },
                "blob_descs": {
                    "a": { "data_type": "f32", "shape": [2, 4] },
                    "b": { "data_type": "f32", "shape": [4, 8] }
                },
                "has_batch_dim": { "a": true, "b": false }
            }]
        }"#);
        let err = infer_job(job, 3).unwrap_err();
        assert_eq!(err.to_string(), "no valid sbp signatures for `mm`");
    }

    #[test]
    fn missing_input_desc_names_the_operator() {
        let job = job(r#"{ "ops": [{ "conf": { "name": "bn", "type": "normalization",
            "gamma": "g", "beta": "b" } }] }"#);
        let err = infer_job(job, 1).unwrap_err();
        assert_eq!(err.to_string(), "blob desc inference failed for `bn`");
    }
}
