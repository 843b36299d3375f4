//! Off-Policy Assisted MAML on 2-D Point Navigation
//!
//! Each task is a goal position; the policy must learn a meta-initialization
//! that reaches any goal after one inner step.
//!
//! ```text
//! cargo run --release --bin train_point [config.json]
//! ```
//!
//! The optional JSON file overrides `TrainerConfig` fields, e.g.
//! `{"n_itr": 50, "num_inner_grad_steps": 1, "seeds": [1, 2, 3]}`.
//! Metrics go to stdout and `progress.csv`; snapshots to `./checkpoints`.
//! Rerunning resumes the iteration count after the last snapshot.

use anyhow::Context;
use burn::backend::NdArray;

use meta_rl::{
    init_tracing, CSVLogger, Checkpointer, CheckpointerConfig, ConsoleLogger, CriticSet,
    ExecutionContext, FirstOrderMaml, LinearFeatureBaseline, MamlConfig, MetaEnv,
    MetaSampleProcessor, MetaSampler, MetaTrainer, MlpValueNet, MultiLogger, PointEnv,
    PointEnvConfig, PointPolicy, PointPolicyConfig, ProcessorConfig, SamplerConfig, SnapshotMode,
    TrainerConfig, ValueEstimator, ValueNetConfig,
};

type B = NdArray<f32>;

fn load_config() -> anyhow::Result<TrainerConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path))?;
            Ok(TrainerConfig::from_json_str(&json)?)
        }
        None => Ok(TrainerConfig::default()
            .with_n_itr(100)
            .with_seeds(vec![1, 2, 3])
            .build()?),
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let checkpointer = Checkpointer::new(
        CheckpointerConfig::new("./checkpoints").with_mode(SnapshotMode::Gap(10)),
    )?;
    let mut config = load_config()?;
    config.start_itr = config.start_itr.max(checkpointer.resume_itr()?).min(config.n_itr);

    println!("=== Off-Policy Assisted MAML ===");
    println!("Environment: PointEnv (2-D goals)");
    println!(
        "  Iterations: {}..{} | Inner steps: {} | Off-policy batch: {}",
        config.start_itr, config.n_itr, config.num_inner_grad_steps, config.sample_batch_size
    );
    println!();

    let env = PointEnv::new(PointEnvConfig::default().with_n_tasks(40))?;
    let sampler = MetaSampler::new(env.clone(), SamplerConfig::default())?;
    let processor =
        MetaSampleProcessor::new(LinearFeatureBaseline::default(), ProcessorConfig::default())?;
    let policy = PointPolicy::new(PointPolicyConfig::new(env.observation_dim(), env.action_dim()));
    let algo = FirstOrderMaml::new(MamlConfig::default())?;

    let mut ctx = ExecutionContext::<B>::new(Default::default());
    let mut critic = |name: &str| -> anyhow::Result<MlpValueNet<B>> {
        let mut net = MlpValueNet::new(ValueNetConfig::new(env.observation_dim(), env.n_tasks(), name));
        net.build_graph(&mut ctx)?;
        Ok(net)
    };
    let critics = CriticSet::new(critic("critic_1")?, critic("critic_2")?, critic("baseline_value")?);

    let logger = MultiLogger::new()
        .add(ConsoleLogger::new())
        .add(CSVLogger::new("progress.csv")?);

    let mut trainer = MetaTrainer::new(
        algo, env, sampler, processor, policy, critics, config, ctx, logger, checkpointer,
    )?;
    let result = trainer.train()?;

    if let (Some(first), Some(last)) = (result.step_average_return.first(), result.step_average_return.last()) {
        println!("Step_1-AverageReturn: {:.3} -> {:.3}", first, last);
    }
    if let Some(test) = result.test_step_average_return.last() {
        println!("test-Step_1-AverageReturn (final): {:.3}", test);
    }
    Ok(())
}
