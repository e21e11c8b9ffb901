use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};

use crate::domain::task::Task;
use crate::ml::backbone::{FeatureExtractor, ResNet, ResNetConfig};

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally; do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct MultiTaskConfig {
    pub backbone: ResNetConfig,
}

impl MultiTaskConfig {
    /// Fresh backbone + heads. Used when rebuilding a model before
    /// loading a saved record into it.
    pub fn init<B: Backend>(&self, device: &B::Device) -> MultiTaskModel<B> {
        MultiTaskModel::new(self.backbone.init(device), device)
    }
}

/// Shared trunk with one linear head per task.
#[derive(Module, Debug)]
pub struct MultiTaskModel<B: Backend> {
    pub backbone:    ResNet<B>,
    pub leaf_head:   Linear<B>,
    pub shape_head:  Linear<B>,
    pub trunk_head:  Linear<B>,
    pub trunk2_head: Linear<B>,
}

/// Full parameter record of the model (used as the best snapshot)
pub type MultiTaskRecord<B> = <MultiTaskModel<B> as Module<B>>::Record;

/// Logits of every head, each `[batch, classes(task)]` and row-aligned
/// with the input images.
#[derive(Debug, Clone)]
pub struct TaskLogits<B: Backend> {
    pub leaf:   Tensor<B, 2>,
    pub shape:  Tensor<B, 2>,
    pub trunk:  Tensor<B, 2>,
    pub trunk2: Tensor<B, 2>,
}

impl<B: Backend> TaskLogits<B> {
    pub fn get(&self, task: Task) -> &Tensor<B, 2> {
        match task {
            Task::Leaf   => &self.leaf,
            Task::Shape  => &self.shape,
            Task::Trunk  => &self.trunk,
            Task::Trunk2 => &self.trunk2,
        }
    }
}

impl<B: Backend> MultiTaskModel<B> {
    /// Takes ownership of a (usually pretrained) backbone, strips its
    /// classifier and sizes the four heads from its feature width.
    pub fn new(backbone: ResNet<B>, device: &B::Device) -> Self {
        let backbone = backbone.strip_classifier();
        let dim  = backbone.feature_dim();
        let head = |task: Task| -> Linear<B> { LinearConfig::new(dim, task.num_classes()).init(device) };
        Self {
            leaf_head:   head(Task::Leaf),
            shape_head:  head(Task::Shape),
            trunk_head:  head(Task::Trunk),
            trunk2_head: head(Task::Trunk2),
            backbone,
        }
    }

    /// images [batch, 3, H, W] → four logit tensors
    pub fn forward(&self, images: Tensor<B, 4>) -> TaskLogits<B> {
        let features = self.backbone.forward_features(images);
        TaskLogits {
            leaf:   self.leaf_head.forward(features.clone()),
            shape:  self.shape_head.forward(features.clone()),
            trunk:  self.trunk_head.forward(features.clone()),
            trunk2: self.trunk2_head.forward(features),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::testing::{tiny_config, TestBackend};

    #[test]
    fn test_heads_sized_per_task() {
        let device = Default::default();
        let model: MultiTaskModel<TestBackend> = tiny_config().init(&device);
        let images = Tensor::<TestBackend, 4>::zeros([3, 3, 32, 32], &device);

        let logits = model.forward(images);
        for task in Task::ALL {
            assert_eq!(logits.get(task).dims(), [3, task.num_classes()]);
        }
    }

    #[test]
    fn test_injected_backbone_loses_classifier() {
        let device = Default::default();
        let backbone: ResNet<TestBackend> = ResNetConfig::new([1, 1, 1, 1]).with_base_width(4).init(&device);
        // tiny trunk: 128 features → 1000 ImageNet classes
        let with_fc = backbone.num_params();

        let model = MultiTaskModel::new(backbone, &device);
        assert_eq!(with_fc - model.backbone.num_params(), 128 * 1000 + 1000);
    }
}
