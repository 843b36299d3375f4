//! MLP state-value network.
//!
//! Input is the observation concatenated with a one-hot encoding of the task
//! id, output is a single scalar:
//!
//! ```text
//! [obs | one_hot(task_id)] -> hidden_0 -> ... -> hidden_n -> output (1)
//! ```
//!
//! A target copy of the network answers the next-state queries and is moved
//! towards the online weights with [`MlpValueNet::update_target`].

use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation::{relu, sigmoid, tanh};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use super::value_net::{
    ParamHandle, PersistentEstimator, Result, ValueEstimator, ValueNetError,
};
use crate::core::{soft_update, ExecutionContext, ParamMap, ParamValue, TaskId};

/// Element-wise nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Relu,
    Tanh,
    Sigmoid,
    Identity,
}

impl Activation {
    fn apply<B: Backend>(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        match self {
            Activation::Relu => relu(x),
            Activation::Tanh => tanh(x),
            Activation::Sigmoid => sigmoid(x),
            Activation::Identity => x,
        }
    }
}

/// Constructor arguments of [`MlpValueNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueNetConfig {
    /// Dimensionality of the observation space
    pub ob_dim: usize,
    /// Number of task slots in the one-hot task encoding
    pub task_id_dim: usize,
    /// Name used for scoping parameter names
    pub name: String,
    /// Sizes of the hidden layers
    pub hidden_sizes: Vec<usize>,
    /// Nonlinearity between hidden layers
    pub hidden_nonlinearity: Activation,
    /// Nonlinearity after the output layer (`None` = linear output)
    pub output_nonlinearity: Option<Activation>,
}

impl ValueNetConfig {
    pub fn new(ob_dim: usize, task_id_dim: usize, name: impl Into<String>) -> Self {
        Self {
            ob_dim,
            task_id_dim,
            name: name.into(),
            hidden_sizes: vec![32, 32],
            hidden_nonlinearity: Activation::Relu,
            output_nonlinearity: None,
        }
    }

    pub fn with_hidden_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.hidden_sizes = sizes;
        self
    }

    pub fn with_hidden_nonlinearity(mut self, activation: Activation) -> Self {
        self.hidden_nonlinearity = activation;
        self
    }

    pub fn with_output_nonlinearity(mut self, activation: Option<Activation>) -> Self {
        self.output_nonlinearity = activation;
        self
    }

    pub fn input_dim(&self) -> usize {
        self.ob_dim + self.task_id_dim
    }

    /// Parameter names in assignment order.
    pub fn param_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(2 * (self.hidden_sizes.len() + 1));
        for i in 0..self.hidden_sizes.len() {
            names.push(format!("{}/hidden_{}/W", self.name, i));
            names.push(format!("{}/hidden_{}/b", self.name, i));
        }
        names.push(format!("{}/output/W", self.name));
        names.push(format!("{}/output/b", self.name));
        names
    }
}

/// Layers of the value network.
#[derive(Module, Debug)]
pub struct ValueMlp<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
}

impl<B: Backend> ValueMlp<B> {
    fn new(config: &ValueNetConfig, device: &B::Device) -> Self {
        let mut hidden = Vec::with_capacity(config.hidden_sizes.len());
        let mut d_in = config.input_dim();
        for &d_out in &config.hidden_sizes {
            hidden.push(LinearConfig::new(d_in, d_out).init(device));
            d_in = d_out;
        }
        Self {
            hidden,
            output: LinearConfig::new(d_in, 1).init(device),
        }
    }

    fn forward(
        &self,
        input: Tensor<B, 2>,
        hidden_act: Activation,
        output_act: Option<Activation>,
    ) -> Tensor<B, 2> {
        let mut x = input;
        for layer in &self.hidden {
            x = hidden_act.apply(layer.forward(x));
        }
        let out = self.output.forward(x);
        match output_act {
            Some(act) => act.apply(out),
            None => out,
        }
    }

    fn layers(&self) -> impl Iterator<Item = &Linear<B>> {
        self.hidden.iter().chain(std::iter::once(&self.output))
    }

    fn layers_mut(&mut self) -> impl Iterator<Item = &mut Linear<B>> {
        self.hidden.iter_mut().chain(std::iter::once(&mut self.output))
    }

    fn handles(&self, names: &[String]) -> ParamMap<ParamHandle<B>> {
        let mut map = ParamMap::new();
        let mut names = names.iter();
        for layer in self.layers() {
            if let Some(name) = names.next() {
                map.insert(name.clone(), ParamHandle::Matrix(layer.weight.clone()));
            }
            if let (Some(name), Some(bias)) = (names.next(), layer.bias.as_ref()) {
                map.insert(name.clone(), ParamHandle::Vector(bias.clone()));
            }
        }
        map
    }

    fn values(&self, names: &[String]) -> Result<ParamMap<ParamValue>> {
        let mut map = ParamMap::new();
        for (name, handle) in self.handles(names).iter() {
            let shape = handle.shape();
            let data = match handle {
                ParamHandle::Matrix(p) => p.val().into_data().to_vec::<f32>(),
                ParamHandle::Vector(p) => p.val().into_data().to_vec::<f32>(),
            }
            .map_err(|e| ValueNetError::Tensor(format!("{:?}", e)))?;
            map.insert(name, ParamValue::new(shape, data));
        }
        Ok(map)
    }

    /// Write `values` in layer order. Callers validate keys and shapes first.
    fn assign(&mut self, values: &ParamMap<ParamValue>, device: &B::Device) {
        let mut values = values.values();
        for layer in self.layers_mut() {
            if let Some(w) = values.next() {
                let tensor = Tensor::<B, 2>::from_data(
                    TensorData::new(w.data.clone(), [w.shape[0], w.shape[1]]),
                    device,
                );
                layer.weight = Param::initialized(layer.weight.id.clone(), tensor);
            }
            if let Some(bias) = layer.bias.as_mut() {
                if let Some(b) = values.next() {
                    let tensor = Tensor::<B, 1>::from_data(
                        TensorData::new(b.data.clone(), [b.shape[0]]),
                        device,
                    );
                    *bias = Param::initialized(bias.id.clone(), tensor);
                }
            }
        }
    }
}

/// Built state: online network, its target copy, and the device.
#[derive(Debug)]
struct Graph<B: Backend> {
    online: ValueMlp<B>,
    target: ValueMlp<B>,
    device: B::Device,
}

/// MLP-backed state-value estimator.
#[derive(Debug)]
pub struct MlpValueNet<B: Backend> {
    config: ValueNetConfig,
    graph: Option<Graph<B>>,
    /// Ordered names and expected shapes; built on the first `set_params`.
    assign_plan: Option<Vec<(String, Vec<usize>)>>,
}

impl<B: Backend> MlpValueNet<B> {
    pub fn new(config: ValueNetConfig) -> Self {
        Self {
            config,
            graph: None,
            assign_plan: None,
        }
    }

    pub fn config(&self) -> &ValueNetConfig {
        &self.config
    }

    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }

    fn graph(&self) -> Result<&Graph<B>> {
        self.graph.as_ref().ok_or(ValueNetError::UnbuiltNetwork)
    }

    /// Soft-update the target network towards the online weights.
    pub fn update_target(&mut self, tau: f32) -> Result<()> {
        let names = self.config.param_names();
        let graph = self.graph.as_mut().ok_or(ValueNetError::UnbuiltNetwork)?;
        let online = graph.online.values(&names)?;
        let target = graph.target.values(&names)?;
        let updated = soft_update(&online, &target, tau)?;
        graph.target.assign(&updated, &graph.device);
        Ok(())
    }

    /// Materialized target-network parameters.
    pub fn target_param_values(&self) -> Result<ParamMap<ParamValue>> {
        self.graph()?.target.values(&self.config.param_names())
    }

    fn encode(&self, observation: &[f32], task_id: TaskId, row: &mut Vec<f32>) -> Result<()> {
        if observation.len() != self.config.ob_dim {
            return Err(ValueNetError::ObservationDim {
                expected: self.config.ob_dim,
                found: observation.len(),
            });
        }
        if task_id >= self.config.task_id_dim {
            return Err(ValueNetError::TaskOutOfRange {
                task_id,
                task_id_dim: self.config.task_id_dim,
            });
        }
        row.extend_from_slice(observation);
        let start = row.len();
        row.resize(start + self.config.task_id_dim, 0.0);
        row[start + task_id] = 1.0;
        Ok(())
    }

    fn evaluate(
        &self,
        net: &ValueMlp<B>,
        device: &B::Device,
        groups: &[Vec<Vec<f32>>],
        task_ids: &[TaskId],
    ) -> Result<Vec<Vec<f32>>> {
        if groups.len() != task_ids.len() {
            return Err(ValueNetError::BatchMismatch {
                groups: groups.len(),
                task_ids: task_ids.len(),
            });
        }

        let n_rows: usize = groups.iter().map(Vec::len).sum();
        if n_rows == 0 {
            return Ok(groups.iter().map(|_| Vec::new()).collect());
        }

        let width = self.config.input_dim();
        let mut flat = Vec::with_capacity(n_rows * width);
        for (group, &task_id) in groups.iter().zip(task_ids) {
            for obs in group {
                self.encode(obs, task_id, &mut flat)?;
            }
        }

        let input = Tensor::<B, 2>::from_data(TensorData::new(flat, [n_rows, width]), device);
        let output = net.forward(
            input,
            self.config.hidden_nonlinearity,
            self.config.output_nonlinearity,
        );
        let values = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| ValueNetError::Tensor(format!("{:?}", e)))?;

        let mut values = values.into_iter();
        Ok(groups
            .iter()
            .map(|group| values.by_ref().take(group.len()).collect())
            .collect())
    }
}

impl<B: Backend> ValueEstimator<B> for MlpValueNet<B> {
    fn build_graph(&mut self, ctx: &mut ExecutionContext<B>) -> Result<()> {
        if self.graph.is_some() {
            return Err(ValueNetError::AlreadyBuilt);
        }
        let device = ctx.device().clone();
        let online = ValueMlp::new(&self.config, &device);
        let target = online.clone();
        ctx.register(self.config.param_names())?;
        self.graph = Some(Graph {
            online,
            target,
            device,
        });
        Ok(())
    }

    fn get_state_value(&self, observation: &[f32], task_id: TaskId) -> Result<f32> {
        let graph = self.graph()?;
        let values = self.evaluate(
            &graph.online,
            &graph.device,
            &[vec![observation.to_vec()]],
            &[task_id],
        )?;
        Ok(values[0][0])
    }

    fn get_state_values(
        &self,
        observations: &[Vec<Vec<f32>>],
        task_ids: &[TaskId],
    ) -> Result<Vec<Vec<f32>>> {
        let graph = self.graph()?;
        self.evaluate(&graph.online, &graph.device, observations, task_ids)
    }

    fn get_next_state_value(&self, next_observation: &[f32], task_id: TaskId) -> Result<f32> {
        let graph = self.graph()?;
        let values = self.evaluate(
            &graph.target,
            &graph.device,
            &[vec![next_observation.to_vec()]],
            &[task_id],
        )?;
        Ok(values[0][0])
    }

    fn get_next_state_values(
        &self,
        next_observations: &[Vec<Vec<f32>>],
        task_ids: &[TaskId],
    ) -> Result<Vec<Vec<f32>>> {
        let graph = self.graph()?;
        self.evaluate(&graph.target, &graph.device, next_observations, task_ids)
    }

    fn get_params(&self) -> Result<ParamMap<ParamHandle<B>>> {
        Ok(self.graph()?.online.handles(&self.config.param_names()))
    }

    fn get_param_values(&self, ctx: &ExecutionContext<B>) -> Result<ParamMap<ParamValue>> {
        ctx.ensure_open()?;
        self.graph()?.online.values(&self.config.param_names())
    }

    fn set_params(&mut self, ctx: &ExecutionContext<B>, values: &ParamMap<ParamValue>) -> Result<()> {
        ctx.ensure_open()?;

        if self.assign_plan.is_none() {
            let plan = self
                .get_params()?
                .iter()
                .map(|(name, handle)| (name.to_owned(), handle.shape()))
                .collect();
            self.assign_plan = Some(plan);
        }
        let plan = self.assign_plan.as_ref().ok_or(ValueNetError::UnbuiltNetwork)?;

        let expected: ParamMap<()> = plan.iter().map(|(name, _)| (name.clone(), ())).collect();
        expected.ensure_same_keys(values)?;
        for ((name, shape), value) in plan.iter().zip(values.values()) {
            if *shape != value.shape {
                return Err(ValueNetError::ShapeMismatch {
                    name: name.clone(),
                    expected: shape.clone(),
                    found: value.shape.clone(),
                });
            }
            value.ensure_consistent(name)?;
        }

        let graph = self.graph.as_mut().ok_or(ValueNetError::UnbuiltNetwork)?;
        graph.online.assign(values, &graph.device);
        Ok(())
    }
}

impl<B: Backend> PersistentEstimator<B> for MlpValueNet<B> {
    type Args = ValueNetConfig;

    fn constructor_args(&self) -> ValueNetConfig {
        self.config.clone()
    }

    fn from_args(args: ValueNetConfig) -> Self {
        Self::new(args)
    }
}
