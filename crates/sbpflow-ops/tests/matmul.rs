use anyhow::Result;
use sbpflow_core::{BlobDesc, DType, ParallelContext, Shape};
use sbpflow_ops::{
    construct_op, BlobDescMap, HasBatchDimMap, MatmulConf, OpError, OpTypeConf, Operator,
    OperatorConf, SbpParallel,
};

fn desc(dims: &[usize]) -> BlobDesc {
    BlobDesc::new(DType::F32, Shape::from_slice(dims))
}

fn matmul(transpose_a: bool, transpose_b: bool) -> OperatorConf {
    OperatorConf::new(
        "mm",
        OpTypeConf::Matmul(MatmulConf {
            transpose_a,
            transpose_b,
        }),
    )
}

#[test]
fn infers_output_shape_with_transposes() -> Result<()> {
    let op = construct_op(matmul(true, false))?;
    let mut descs = BlobDescMap::from([
        ("a".to_string(), desc(&[5, 8])),
        ("b".to_string(), desc(&[5, 3])),
    ]);
    op.infer_blob_descs(&mut descs, &ParallelContext::single())?;
    assert_eq!(descs["out"], desc(&[8, 3]));
    Ok(())
}

#[test]
fn contraction_mismatch_fails() -> Result<()> {
    let op = construct_op(matmul(false, false))?;
    let mut descs = BlobDescMap::from([
        ("a".to_string(), desc(&[4, 8])),
        ("b".to_string(), desc(&[7, 3])),
    ]);
    let err = op
        .infer_blob_descs(&mut descs, &ParallelContext::single())
        .unwrap_err();
    assert!(matches!(err, OpError::DescMismatch { .. }));
    Ok(())
}

#[test]
fn batch_dim_follows_left_operand() -> Result<()> {
    let op = construct_op(matmul(false, false))?;
    let mut flags = HasBatchDimMap::from([("a".to_string(), true), ("b".to_string(), false)]);
    op.infer_has_batch_dim(&mut flags)?;
    assert!(flags["out"]);
    Ok(())
}

#[test]
fn emits_three_consistent_signatures() -> Result<()> {
    let op = construct_op(matmul(false, true))?;
    let mut logical = BlobDescMap::from([
        ("a".to_string(), desc(&[16, 32])),
        ("b".to_string(), desc(&[8, 32])),
    ]);
    op.infer_blob_descs(&mut logical, &ParallelContext::single())?;
    assert_eq!(logical["out"], desc(&[16, 8]));

    let list = op.sbp_signatures_checked(&logical, 4)?;
    let sigs: Vec<_> = list.iter().collect();
    assert_eq!(sigs.len(), 3);

    assert_eq!(sigs[0].get("a"), Some(SbpParallel::Split(0)));
    assert_eq!(sigs[0].get("b"), Some(SbpParallel::Broadcast));
    assert_eq!(sigs[0].get("out"), Some(SbpParallel::Split(0)));

    assert_eq!(sigs[1].get("a"), Some(SbpParallel::Broadcast));
    assert_eq!(sigs[1].get("b"), Some(SbpParallel::Split(0)));
    assert_eq!(sigs[1].get("out"), Some(SbpParallel::Split(1)));

    assert_eq!(sigs[2].get("a"), Some(SbpParallel::Split(1)));
    assert_eq!(sigs[2].get("b"), Some(SbpParallel::Split(1)));
    assert_eq!(sigs[2].get("out"), Some(SbpParallel::PartialSum));
    Ok(())
}

#[test]
fn signatures_json_is_stable() -> Result<()> {
    let op = construct_op(matmul(false, false))?;
    let list = op.get_sbp_signatures(&BlobDescMap::new())?;
    let json = serde_json::to_string(&list)?;
    assert_eq!(
        json,
        r#"[{"a":{"split":0},"b":"broadcast","out":{"split":0}},{"a":"broadcast","b":{"split":1},"out":{"split":1}},{"a":{"split":1},"b":{"split":0},"out":"partial_sum"}]"#
    );
    Ok(())
}
