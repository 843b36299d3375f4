//! Behavioral tests for value estimators.
//!
//! Test categories:
//! 1. Lifecycle (unbuilt evaluation, double build, context registration)
//! 2. Evaluation ordering for single and batched calls
//! 3. Bulk assignment preconditions (keys, order, shapes, no partial writes)
//! 4. Capture / rebuild round trips
//! 5. Default-unimplemented capability

use burn::backend::NdArray;

use super::*;
use crate::core::{ExecutionContext, ParamMap, ParamValue, VariableState};

type TestBackend = NdArray<f32>;

fn new_ctx() -> ExecutionContext<TestBackend> {
    ExecutionContext::new(Default::default())
}

fn config() -> ValueNetConfig {
    ValueNetConfig::new(3, 4, "vf").with_hidden_sizes(vec![8, 8])
}

fn built_net(ctx: &mut ExecutionContext<TestBackend>) -> MlpValueNet<TestBackend> {
    let mut net = MlpValueNet::new(config());
    net.build_graph(ctx).unwrap();
    net
}

fn shifted(values: &ParamMap<ParamValue>, delta: f32) -> ParamMap<ParamValue> {
    values.map(|_, v| ParamValue::new(v.shape.clone(), v.data.iter().map(|x| x + delta).collect()))
}

fn max_diff(a: &ParamMap<ParamValue>, b: &ParamMap<ParamValue>) -> f32 {
    a.values()
        .zip(b.values())
        .map(|(x, y)| x.max_abs_diff(y).unwrap_or(f32::INFINITY))
        .fold(0.0, f32::max)
}

// =============================================================================
// LIFECYCLE
// =============================================================================

#[test]
fn should_fail_evaluation_before_build() {
    let ctx = new_ctx();
    let net = MlpValueNet::<TestBackend>::new(config());

    assert!(matches!(
        net.get_state_value(&[0.0; 3], 0),
        Err(ValueNetError::UnbuiltNetwork)
    ));
    assert!(matches!(
        net.get_next_state_values(&[vec![vec![0.0; 3]]], &[0]),
        Err(ValueNetError::UnbuiltNetwork)
    ));
    assert!(matches!(net.get_params(), Err(ValueNetError::UnbuiltNetwork)));
    assert!(matches!(
        net.get_param_values(&ctx),
        Err(ValueNetError::UnbuiltNetwork)
    ));
}

#[test]
fn should_fail_to_build_twice() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    assert!(matches!(
        net.build_graph(&mut ctx),
        Err(ValueNetError::AlreadyBuilt)
    ));
}

#[test]
fn should_register_uninitialized_variables_on_build() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);
    let names = net.config().param_names();

    assert_eq!(names.len(), 6);
    assert_eq!(ctx.n_variables(), 6);
    assert_eq!(ctx.state("vf/hidden_0/W"), Some(VariableState::Uninitialized));

    let resolved = ctx.initialize_uninitialized().unwrap();
    assert_eq!(resolved.len(), 6);
    assert_eq!(ctx.state("vf/output/b"), Some(VariableState::Initialized));
}

#[test]
fn should_name_and_shape_params_in_layer_order() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);
    let params = net.get_params().unwrap();

    let keys: Vec<&str> = params.keys().collect();
    assert_eq!(
        keys,
        vec![
            "vf/hidden_0/W",
            "vf/hidden_0/b",
            "vf/hidden_1/W",
            "vf/hidden_1/b",
            "vf/output/W",
            "vf/output/b"
        ]
    );
    assert_eq!(params.get("vf/hidden_0/W").unwrap().shape(), vec![7, 8]);
    assert_eq!(params.get("vf/output/b").unwrap().shape(), vec![1]);
}

// =============================================================================
// EVALUATION
// =============================================================================

#[test]
fn should_match_single_values_in_batched_order() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);

    let groups = vec![
        vec![vec![0.1, 0.2, 0.3], vec![-1.0, 0.5, 2.0]],
        vec![],
        vec![vec![3.0, -2.0, 0.0]],
    ];
    let task_ids = vec![0, 1, 3];
    let batched = net.get_state_values(&groups, &task_ids).unwrap();

    assert_eq!(batched.len(), 3);
    assert_eq!(batched[0].len(), 2);
    assert!(batched[1].is_empty());
    assert_eq!(batched[2].len(), 1);

    for (g, group) in groups.iter().enumerate() {
        for (i, obs) in group.iter().enumerate() {
            let single = net.get_state_value(obs, task_ids[g]).unwrap();
            assert!((single - batched[g][i]).abs() < 1e-5);
        }
    }
}

#[test]
fn should_change_value_with_task_encoding() {
    let mut ctx = new_ctx();
    let mut net = MlpValueNet::<TestBackend>::new(
        ValueNetConfig::new(2, 3, "linear").with_hidden_sizes(vec![]),
    );
    net.build_graph(&mut ctx).unwrap();

    // output/W is [5, 1]: two observation weights then three task weights
    let mut values = net.get_param_values(&ctx).unwrap();
    values.insert(
        "linear/output/W",
        ParamValue::new(vec![5, 1], vec![0.0, 0.0, 1.0, 2.0, 3.0]),
    );
    values.insert("linear/output/b", ParamValue::new(vec![1], vec![0.5]));
    net.set_params(&ctx, &values).unwrap();

    for task in 0..3 {
        let v = net.get_state_value(&[7.0, -7.0], task).unwrap();
        assert!((v - (task as f32 + 1.5)).abs() < 1e-5);
    }
}

#[test]
fn should_reject_invalid_inputs() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);

    assert!(matches!(
        net.get_state_value(&[0.0; 2], 0),
        Err(ValueNetError::ObservationDim { expected: 3, found: 2 })
    ));
    assert!(matches!(
        net.get_state_value(&[0.0; 3], 4),
        Err(ValueNetError::TaskOutOfRange { task_id: 4, task_id_dim: 4 })
    ));
    assert!(matches!(
        net.get_state_values(&[vec![vec![0.0; 3]]], &[0, 1]),
        Err(ValueNetError::BatchMismatch { groups: 1, task_ids: 2 })
    ));
}

#[test]
fn should_answer_next_state_values_from_target_network() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let obs = [0.3, -0.4, 1.0];

    let v = net.get_state_value(&obs, 1).unwrap();
    let next = net.get_next_state_value(&obs, 1).unwrap();
    assert!((v - next).abs() < 1e-6);

    let values = net.get_param_values(&ctx).unwrap();
    net.set_params(&ctx, &shifted(&values, 0.5)).unwrap();
    let v = net.get_state_value(&obs, 1).unwrap();
    let next = net.get_next_state_value(&obs, 1).unwrap();
    assert!((v - next).abs() > 1e-4);

    net.update_target(1.0).unwrap();
    let next = net.get_next_state_value(&obs, 1).unwrap();
    assert!((v - next).abs() < 1e-5);
}

#[test]
fn should_move_target_partially_on_soft_update() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let values = net.get_param_values(&ctx).unwrap();
    net.set_params(&ctx, &shifted(&values, 1.0)).unwrap();

    net.update_target(0.25).unwrap();
    let target = net.target_param_values().unwrap();
    let expected = shifted(&values, 0.25);
    assert!(max_diff(&target, &expected) < 1e-5);
}

// =============================================================================
// BULK ASSIGNMENT
// =============================================================================

#[test]
fn should_round_trip_values_through_set_params() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let new_values = shifted(&net.get_param_values(&ctx).unwrap(), 0.1);

    net.set_params(&ctx, &new_values).unwrap();
    // Second call reuses the cached assignment plan
    net.set_params(&ctx, &new_values).unwrap();

    assert!(max_diff(&net.get_param_values(&ctx).unwrap(), &new_values) < 1e-6);
}

#[test]
fn should_reject_key_mismatch_without_writing() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let original = net.get_param_values(&ctx).unwrap();
    let changed = shifted(&original, 1.0);

    let mut extra = changed.clone();
    extra.insert("vf/extra", ParamValue::zeros(vec![1]));
    let missing: ParamMap<ParamValue> = changed.clone().into_iter().skip(1).collect();
    let reordered: ParamMap<ParamValue> = changed.clone().into_iter().rev().collect();

    for bad in [extra, missing, reordered] {
        let err = net.set_params(&ctx, &bad).unwrap_err();
        assert!(matches!(err, ValueNetError::ParameterMismatch(_)), "{err}");
        assert_eq!(max_diff(&net.get_param_values(&ctx).unwrap(), &original), 0.0);
    }
}

#[test]
fn should_reject_shape_mismatch_without_writing() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let original = net.get_param_values(&ctx).unwrap();

    let mut bad = shifted(&original, 1.0);
    bad.insert("vf/output/b", ParamValue::zeros(vec![2]));
    let err = net.set_params(&ctx, &bad).unwrap_err();

    assert!(matches!(err, ValueNetError::ShapeMismatch { ref name, .. } if name == "vf/output/b"));
    assert_eq!(max_diff(&net.get_param_values(&ctx).unwrap(), &original), 0.0);
}

#[test]
fn should_reject_truncated_value_without_writing() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let original = net.get_param_values(&ctx).unwrap();

    let mut bad = shifted(&original, 1.0);
    bad.insert("vf/output/W", ParamValue { shape: vec![8, 1], data: vec![0.5; 3] });
    let err = net.set_params(&ctx, &bad).unwrap_err();

    assert!(matches!(
        err,
        ValueNetError::ElementCount { ref name, found: 3, .. } if name == "vf/output/W"
    ));
    assert_eq!(max_diff(&net.get_param_values(&ctx).unwrap(), &original), 0.0);
}

#[test]
fn should_block_parameter_access_on_closed_context() {
    let mut ctx = new_ctx();
    let mut net = built_net(&mut ctx);
    let values = net.get_param_values(&ctx).unwrap();
    ctx.close();

    assert!(matches!(net.get_param_values(&ctx), Err(ValueNetError::Context(_))));
    assert!(matches!(net.set_params(&ctx, &values), Err(ValueNetError::Context(_))));
}

// =============================================================================
// CAPTURE / REBUILD
// =============================================================================

#[test]
fn should_preserve_parameters_through_serialize() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);
    ctx.initialize_uninitialized().unwrap();

    let state = net.serialize(&ctx).unwrap();
    assert_eq!(state.constructor_args, config());

    let mut fresh = new_ctx();
    let restored = MlpValueNet::<TestBackend>::deserialize(state.clone(), &mut fresh).unwrap();

    let diff = max_diff(&restored.get_param_values(&fresh).unwrap(), &state.parameter_values);
    assert!(diff < 1e-6);
    assert_eq!(fresh.state("vf/hidden_1/W"), Some(VariableState::Restored));

    let obs = [1.0, 2.0, 3.0];
    let a = net.get_state_value(&obs, 2).unwrap();
    let b = restored.get_state_value(&obs, 2).unwrap();
    assert!((a - b).abs() < 1e-5);
}

#[test]
fn should_round_trip_through_json() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);
    let json = net.to_json(&ctx).unwrap();

    let restored = MlpValueNet::<TestBackend>::from_json(&json, &mut ctx).unwrap();
    let diff = max_diff(
        &restored.get_param_values(&ctx).unwrap(),
        &net.get_param_values(&ctx).unwrap(),
    );
    assert!(diff < 1e-6);
}

#[test]
fn should_fail_to_restore_malformed_state_record() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);
    let mut state = net.serialize(&ctx).unwrap();
    state.parameter_values = state.parameter_values.map(|name, v| {
        if name == "vf/hidden_0/W" {
            ParamValue { shape: v.shape.clone(), data: v.data[..1].to_vec() }
        } else {
            v.clone()
        }
    });

    let mut fresh = new_ctx();
    let err = MlpValueNet::<TestBackend>::deserialize(state, &mut fresh).unwrap_err();
    assert!(matches!(
        err,
        ValueNetError::ElementCount { ref name, ref shape, found: 1 }
            if name == "vf/hidden_0/W" && shape == &vec![7, 8]
    ));
}

#[test]
fn should_keep_restored_variables_on_restore() {
    let mut ctx = new_ctx();
    let net = built_net(&mut ctx);
    let state = net.serialize(&ctx).unwrap();

    let _restored = MlpValueNet::<TestBackend>::deserialize(state, &mut ctx).unwrap();
    assert_eq!(ctx.state("vf/output/W"), Some(VariableState::Restored));
    assert!(ctx.initialize_uninitialized().unwrap().is_empty());
}

// =============================================================================
// UNIMPLEMENTED CAPABILITY
// =============================================================================

struct BareEstimator;

impl ValueEstimator<TestBackend> for BareEstimator {}

#[test]
fn should_report_unimplemented_by_default() {
    let mut ctx = new_ctx();
    let mut bare = BareEstimator;

    assert!(matches!(
        bare.build_graph(&mut ctx),
        Err(ValueNetError::Unimplemented("build_graph"))
    ));
    assert!(matches!(
        bare.get_state_value(&[0.0], 0),
        Err(ValueNetError::Unimplemented("get_state_value"))
    ));
    assert!(matches!(
        bare.get_next_state_values(&[], &[]),
        Err(ValueNetError::Unimplemented("get_next_state_values"))
    ));
    assert!(matches!(
        bare.set_params(&ctx, &ParamMap::new()),
        Err(ValueNetError::Unimplemented("set_params"))
    ));
}
