use burn::{
    module::Param,
    nn::{
        conv::{Conv3d, Conv3dConfig, ConvTranspose3d, ConvTranspose3dConfig},
        Dropout, DropoutConfig, Initializer, PaddingConfig3d,
    },
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

use crate::error::TrainError;

/// Weight-initialisation policy applied to every `Conv3d` layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform on weights, biases untouched
    Glorot,
    /// Keep burn's default initialisation
    Default,
}

impl WeightInit {
    /// Name used in the run identity
    pub fn label(&self) -> &'static str {
        match self {
            WeightInit::Glorot  => "Glorot",
            WeightInit::Default => "Default",
        }
    }

    /// Re-draw the weight of a Conv3d according to the policy.
    ///
    /// Fans follow the usual convention for convolutions:
    ///   fan_in  = in_channels  · kd · kh · kw
    ///   fan_out = out_channels · kd · kh · kw
    pub fn apply<B: Backend>(&self, mut conv: Conv3d<B>) -> Conv3d<B> {
        if let WeightInit::Glorot = self {
            let dims      = conv.weight.val().dims();
            let device    = conv.weight.val().device();
            let receptive = dims[2] * dims[3] * dims[4];

            let weight: Param<Tensor<B, 5>> = Initializer::XavierUniform { gain: 1.0 }.init_with(
                dims,
                Some(dims[1] * receptive),
                Some(dims[0] * receptive),
                &device,
            );
            conv.weight = weight;
        }
        conv
    }
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct UNet3dConfig {
    pub in_channels:  usize,
    pub out_channels: usize,
    /// Channel width of the first level; level i uses filters · 2^i
    pub filters:      usize,
    #[config(default = 2)]
    pub depth:        usize,
    #[config(default = 0.0)]
    pub dropout:      f64,
    #[config(default = "WeightInit::Glorot")]
    pub weight_init:  WeightInit,
}

impl UNet3dConfig {
    fn validate(&self) -> crate::error::Result<()> {
        for (name, value) in [
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("filters", self.filters),
        ] {
            if value == 0 {
                return Err(TrainError::Configuration(format!("{name} must be positive")));
            }
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(TrainError::Configuration(format!(
                "dropout must lie in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }

    /// Every spatial dim must survive `depth` halvings exactly.
    pub fn check_input(&self, shape: [usize; 3]) -> crate::error::Result<()> {
        let stride = 1usize << self.depth;
        if shape.iter().any(|&s| s == 0 || s % stride != 0) {
            return Err(TrainError::Configuration(format!(
                "volume shape {shape:?} must be divisible by {stride} for depth {}",
                self.depth
            )));
        }
        Ok(())
    }

    fn width(&self, level: usize) -> usize {
        self.filters << level
    }

    /// Build the network and apply the weight-init policy to every Conv3d.
    pub fn init<B: Backend>(&self, device: &B::Device) -> crate::error::Result<UNet3d<B>> {
        self.validate()?;

        let mut encoders    = Vec::with_capacity(self.depth);
        let mut downsamples = Vec::with_capacity(self.depth);
        for level in 0..self.depth {
            let input = if level == 0 { self.in_channels } else { self.width(level - 1) };
            encoders.push(ConvBlock::new(input, self.width(level), device));
            downsamples.push(
                Conv3dConfig::new([self.width(level), self.width(level)], [2, 2, 2])
                    .with_stride([2, 2, 2])
                    .init(device),
            );
        }

        let bottleneck_in = if self.depth == 0 { self.in_channels } else { self.width(self.depth - 1) };
        let bottleneck    = ConvBlock::new(bottleneck_in, self.width(self.depth), device);

        // Decoder stages are stored deepest first, the order forward() walks them
        let mut upsamples = Vec::with_capacity(self.depth);
        let mut decoders  = Vec::with_capacity(self.depth);
        for level in (0..self.depth).rev() {
            upsamples.push(
                ConvTranspose3dConfig::new([self.width(level + 1), self.width(level)], [2, 2, 2])
                    .with_stride([2, 2, 2])
                    .init(device),
            );
            decoders.push(ConvBlock::new(2 * self.width(level), self.width(level), device));
        }

        let head = Conv3dConfig::new([self.width(0), self.out_channels], [1, 1, 1]).init(device);

        let model = UNet3d {
            encoders,
            downsamples,
            bottleneck,
            upsamples,
            decoders,
            head,
            dropout: DropoutConfig::new(self.dropout).init(),
        };

        let policy = self.weight_init;
        let model  = model.map_conv3d(&|conv| policy.apply(conv));
        tracing::debug!(
            "Applied {} init to {} Conv3d layers",
            policy.label(),
            model.conv3d_layers().len()
        );
        Ok(model)
    }
}

// ─── Building block ───────────────────────────────────────────────────────────
/// Two 3×3×3 same-padded convolutions, each followed by ReLU.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv1: Conv3d<B>,
    pub conv2: Conv3d<B>,
}

impl<B: Backend> ConvBlock<B> {
    fn new(channels_in: usize, channels_out: usize, device: &B::Device) -> Self {
        let conv = |i, o| {
            Conv3dConfig::new([i, o], [3, 3, 3])
                .with_padding(PaddingConfig3d::Same)
                .init(device)
        };
        Self {
            conv1: conv(channels_in, channels_out),
            conv2: conv(channels_out, channels_out),
        }
    }

    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let x = relu(self.conv1.forward(x));
        relu(self.conv2.forward(x))
    }

    fn map_conv3d(self, f: &impl Fn(Conv3d<B>) -> Conv3d<B>) -> Self {
        Self { conv1: f(self.conv1), conv2: f(self.conv2) }
    }
}

// ─── UNet3d ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct UNet3d<B: Backend> {
    pub encoders:    Vec<ConvBlock<B>>,
    pub downsamples: Vec<Conv3d<B>>,
    pub bottleneck:  ConvBlock<B>,
    pub upsamples:   Vec<ConvTranspose3d<B>>,
    pub decoders:    Vec<ConvBlock<B>>,
    pub head:        Conv3d<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> UNet3d<B> {
    /// input: [batch, in_channels, D, H, W] → [batch, out_channels, D, H, W]
    pub fn forward(&self, x: Tensor<B, 5>) -> Tensor<B, 5> {
        let mut skips = Vec::with_capacity(self.encoders.len());
        let mut x     = x;

        for (encoder, down) in self.encoders.iter().zip(&self.downsamples) {
            let features = encoder.forward(x);
            skips.push(features.clone());
            x = down.forward(features);
        }

        x = self.dropout.forward(self.bottleneck.forward(x));

        for ((up, decoder), skip) in self
            .upsamples
            .iter()
            .zip(&self.decoders)
            .zip(skips.into_iter().rev())
        {
            let upsampled = up.forward(x);
            x = decoder.forward(Tensor::cat(vec![upsampled, skip], 1));
        }

        self.head.forward(x)
    }

    /// Rebuild the model with `f` applied to every Conv3d layer
    /// (transposed convolutions are a different operator and are skipped).
    pub fn map_conv3d(self, f: &impl Fn(Conv3d<B>) -> Conv3d<B>) -> Self {
        Self {
            encoders:    self.encoders.into_iter().map(|b| b.map_conv3d(f)).collect(),
            downsamples: self.downsamples.into_iter().map(f).collect(),
            bottleneck:  self.bottleneck.map_conv3d(f),
            upsamples:   self.upsamples,
            decoders:    self.decoders.into_iter().map(|b| b.map_conv3d(f)).collect(),
            head:        f(self.head),
            dropout:     self.dropout,
        }
    }

    pub fn conv3d_layers(&self) -> Vec<&Conv3d<B>> {
        let blocks = self
            .encoders
            .iter()
            .chain(std::iter::once(&self.bottleneck))
            .chain(&self.decoders);

        blocks
            .flat_map(|b| [&b.conv1, &b.conv2])
            .chain(&self.downsamples)
            .chain(std::iter::once(&self.head))
            .collect()
    }
}
