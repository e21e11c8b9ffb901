// ============================================================
// Layer 5 — ResNet Backbone
// ============================================================
// Bottleneck ResNet (He et al., 2016). ResNet50 is the default:
//
//   stem     7×7/2 conv → BN → ReLU → 3×3/2 max-pool
//   stage 1  3 bottlenecks,  64 → 256 channels
//   stage 2  4 bottlenecks, 128 → 512 channels, stride 2
//   stage 3  6 bottlenecks, 256 → 1024 channels, stride 2
//   stage 4  3 bottlenecks, 512 → 2048 channels, stride 2
//   pool     global average → [batch, 2048]
//   fc       optional ImageNet classifier (stripped for multi-task use)
//
// The classifier is kept as an `Option` so a full pretrained
// record (with fc) can be loaded before it is stripped.
//
// Reference: Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Linear, LinearConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

const EXPANSION: usize = 4;

/// A pretrained-style feature extractor the multi-task model can sit on.
pub trait FeatureExtractor<B: Backend> {
    /// Width of the pooled feature vector
    fn feature_dim(&self) -> usize;

    /// images [batch, 3, H, W] → features [batch, feature_dim]
    fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Bottleneck blocks per stage
    pub blocks: [usize; 4],
    /// Channels of the stem and of the first stage's bottleneck
    #[config(default = 64)]
    pub base_width: usize,
    /// Classes of the pretrained classifier head
    #[config(default = 1000)]
    pub num_classes: usize,
}

impl ResNetConfig {
    pub fn resnet50() -> Self {
        Self::new([3, 4, 6, 3])
    }

    pub fn feature_dim(&self) -> usize {
        self.base_width * 8 * EXPANSION
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        let w = self.base_width;
        let stem_conv: Conv2d<B> = Conv2dConfig::new([3, w], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let stem_bn: BatchNorm<B, 2> = BatchNormConfig::new(w).init(device);
        let stem_pool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut in_channels = w;
        let mut stages = Vec::with_capacity(4);
        for (i, &count) in self.blocks.iter().enumerate() {
            let planes = w << i;
            let stride = if i == 0 { 1 } else { 2 };
            let stage: Vec<Bottleneck<B>> = (0..count)
                .map(|b| {
                    let block = Bottleneck::new(in_channels, planes, if b == 0 { stride } else { 1 }, device);
                    in_channels = planes * EXPANSION;
                    block
                })
                .collect();
            stages.push(stage);
        }

        ResNet {
            stem_conv,
            stem_bn,
            stem_pool,
            stages,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: Some(LinearConfig::new(self.feature_dim(), self.num_classes).init(device)),
            feature_dim: self.feature_dim(),
        }
    }
}

// ─── Bottleneck ───────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn:   BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    conv1:      Conv2d<B>,
    bn1:        BatchNorm<B, 2>,
    conv2:      Conv2d<B>,
    bn2:        BatchNorm<B, 2>,
    conv3:      Conv2d<B>,
    bn3:        BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * EXPANSION;
        let conv1x1 = |i: usize, o: usize, s: usize| -> Conv2d<B> {
            Conv2dConfig::new([i, o], [1, 1])
                .with_stride([s, s])
                .with_bias(false)
                .init(device)
        };

        let downsample = (stride != 1 || in_channels != out_channels).then(|| Downsample {
            conv: conv1x1(in_channels, out_channels, stride),
            bn:   BatchNormConfig::new(out_channels).init(device),
        });

        Self {
            conv1: conv1x1(in_channels, planes, 1),
            bn1:   BatchNormConfig::new(planes).init(device),
            conv2: Conv2dConfig::new([planes, planes], [3, 3])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            bn2:   BatchNormConfig::new(planes).init(device),
            conv3: conv1x1(planes, out_channels, 1),
            bn3:   BatchNormConfig::new(out_channels).init(device),
            downsample,
        }
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(ds) => ds.bn.forward(ds.conv.forward(x.clone())),
            None => x.clone(),
        };
        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        let out = relu(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));
        relu(out + identity)
    }
}

// ─── ResNet ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    stem_conv:   Conv2d<B>,
    stem_bn:     BatchNorm<B, 2>,
    stem_pool:   MaxPool2d,
    stages:      Vec<Vec<Bottleneck<B>>>,
    pool:        AdaptiveAvgPool2d,
    fc:          Option<Linear<B>>,
    feature_dim: usize,
}

impl<B: Backend> ResNet<B> {
    /// Drop the final classification layer, keeping only the trunk.
    pub fn strip_classifier(self) -> Self {
        Self { fc: None, ..self }
    }
}

impl<B: Backend> FeatureExtractor<B> for ResNet<B> {
    fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    fn forward_features(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.stem_bn.forward(self.stem_conv.forward(images)));
        let mut x = self.stem_pool.forward(x);
        for stage in &self.stages {
            for block in stage {
                x = block.forward(x);
            }
        }
        // [batch, C, 1, 1] → [batch, C]
        self.pool.forward(x).flatten::<2>(1, 3)
    }
}
