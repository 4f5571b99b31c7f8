// dermasense/core/vision/src/swin.rs

//! Swin Transformer image classifier.
//!
//! Inference-only port of the hierarchical shifted-window transformer, laid out
//! so that state dicts saved from timm's `swin_*_patch4_window7_224` models load
//! by name. Activations are kept channels-last (`[B, H, W, C]`) between blocks.

use candle_core::{IndexOp, Module, Result, Tensor, D};
use candle_nn::{
    conv2d, layer_norm, linear, linear_no_bias, Conv2d, Conv2dConfig, LayerNorm, Linear,
    VarBuilder,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Architecture hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwinConfig {
    pub image_size: usize,
    pub patch_size: usize,
    pub in_channels: usize,
    pub embed_dim: usize,
    pub depths: Vec<usize>,
    pub num_heads: Vec<usize>,
    pub window_size: usize,
    pub mlp_ratio: usize,
    pub layer_norm_eps: f64,
    pub num_classes: usize,
}

impl SwinConfig {
    /// swin_tiny_patch4_window7_224
    pub fn tiny(num_classes: usize) -> Self {
        Self {
            image_size: 224,
            patch_size: 4,
            in_channels: 3,
            embed_dim: 96,
            depths: vec![2, 2, 6, 2],
            num_heads: vec![3, 6, 12, 24],
            window_size: 7,
            mlp_ratio: 4,
            layer_norm_eps: 1e-5,
            num_classes,
        }
    }

    /// swin_small_patch4_window7_224
    pub fn small(num_classes: usize) -> Self {
        Self {
            depths: vec![2, 2, 18, 2],
            ..Self::tiny(num_classes)
        }
    }

    /// swin_base_patch4_window7_224
    pub fn base(num_classes: usize) -> Self {
        Self {
            embed_dim: 128,
            depths: vec![2, 2, 18, 2],
            num_heads: vec![4, 8, 16, 32],
            ..Self::tiny(num_classes)
        }
    }

    /// Resolve a timm model name.
    pub fn from_model_name(name: &str, num_classes: usize) -> Option<Self> {
        match name {
            "swin_tiny_patch4_window7_224" => Some(Self::tiny(num_classes)),
            "swin_small_patch4_window7_224" => Some(Self::small(num_classes)),
            "swin_base_patch4_window7_224" => Some(Self::base(num_classes)),
            _ => None,
        }
    }

    pub fn num_stages(&self) -> usize {
        self.depths.len()
    }

    /// Token grid side length entering stage `stage` (after its downsample).
    pub fn stage_resolution(&self, stage: usize) -> usize {
        (self.image_size / self.patch_size) >> stage
    }

    pub fn stage_dim(&self, stage: usize) -> usize {
        self.embed_dim << stage
    }

    /// Width of the pooled feature vector fed to the head.
    pub fn num_features(&self) -> usize {
        self.stage_dim(self.num_stages().saturating_sub(1))
    }

    /// Window size and shift for a stage, shrinking the window when the token
    /// grid is no larger than it.
    fn window_and_shift(&self, stage: usize) -> (usize, usize) {
        let resolution = self.stage_resolution(stage);
        if resolution <= self.window_size {
            (resolution, 0)
        } else {
            (self.window_size, self.window_size / 2)
        }
    }
}

/// Flattened index into the relative position bias table for every
/// (query, key) pair inside one window.
pub fn relative_position_index(window_size: usize) -> Vec<u32> {
    let n = window_size * window_size;
    let span = 2 * window_size - 1;
    let mut index = Vec::with_capacity(n * n);
    for i in 0..n {
        let (hi, wi) = (i / window_size, i % window_size);
        for j in 0..n {
            let (hj, wj) = (j / window_size, j % window_size);
            let dh = hi + window_size - 1 - hj;
            let dw = wi + window_size - 1 - wj;
            index.push((dh * span + dw) as u32);
        }
    }
    index
}

/// Additive attention mask for shifted windows, `[num_windows, N, N]`.
///
/// After the cyclic shift a window can contain tokens from up to four
/// non-adjacent image regions; pairs from different regions get -100.
pub fn shifted_window_mask(
    resolution: usize,
    window_size: usize,
    shift: usize,
    device: &candle_core::Device,
) -> Result<Tensor> {
    let n = window_size * window_size;
    let per_side = resolution / window_size;
    let region = |p: usize| {
        if p < resolution - window_size {
            0
        } else if p < resolution - shift {
            1
        } else {
            2
        }
    };

    let mut mask = Vec::with_capacity(per_side * per_side * n * n);
    for wh in 0..per_side {
        for ww in 0..per_side {
            let ids: Vec<usize> = (0..n)
                .map(|t| {
                    let y = wh * window_size + t / window_size;
                    let x = ww * window_size + t % window_size;
                    region(y) * 3 + region(x)
                })
                .collect();
            for &a in &ids {
                for &b in &ids {
                    mask.push(if a == b { 0f32 } else { -100f32 });
                }
            }
        }
    }
    Tensor::from_vec(mask, (per_side * per_side, n, n), device)
}

/// `[B, H, W, C]` -> `[B * nW, ws, ws, C]`
pub fn window_partition(xs: &Tensor, window_size: usize) -> Result<Tensor> {
    let (b, h, w, c) = xs.dims4()?;
    let (nh, nw) = (h / window_size, w / window_size);
    xs.reshape((b, nh, window_size, nw, window_size, c))?
        .permute((0, 1, 3, 2, 4, 5))?
        .contiguous()?
        .reshape((b * nh * nw, window_size, window_size, c))
}

/// Inverse of [`window_partition`].
pub fn window_reverse(windows: &Tensor, window_size: usize, h: usize, w: usize) -> Result<Tensor> {
    let c = windows.dim(D::Minus1)?;
    let (nh, nw) = (h / window_size, w / window_size);
    let b = windows.dim(0)? / (nh * nw);
    windows
        .reshape((b, nh, nw, window_size, window_size, c))?
        .permute((0, 1, 3, 2, 4, 5))?
        .contiguous()?
        .reshape((b, h, w, c))
}

struct PatchEmbed {
    proj: Conv2d,
    norm: LayerNorm,
}

impl PatchEmbed {
    fn new(cfg: &SwinConfig, vb: VarBuilder) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            stride: cfg.patch_size,
            ..Default::default()
        };
        let proj = conv2d(
            cfg.in_channels,
            cfg.embed_dim,
            cfg.patch_size,
            conv_cfg,
            vb.pp("proj"),
        )?;
        let norm = layer_norm(cfg.embed_dim, cfg.layer_norm_eps, vb.pp("norm"))?;
        Ok(Self { proj, norm })
    }
}

impl Module for PatchEmbed {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.proj.forward(xs)?.permute((0, 2, 3, 1))?.contiguous()?;
        self.norm.forward(&xs)
    }
}

struct WindowAttention {
    qkv: Linear,
    proj: Linear,
    relative_position_bias: Tensor,
    num_heads: usize,
    scale: f64,
}

impl WindowAttention {
    fn new(dim: usize, num_heads: usize, window_size: usize, vb: VarBuilder) -> Result<Self> {
        let n = window_size * window_size;
        let span = 2 * window_size - 1;

        let qkv = linear(dim, dim * 3, vb.pp("qkv"))?;
        let proj = linear(dim, dim, vb.pp("proj"))?;
        let table = vb.get_with_hints(
            (span * span, num_heads),
            "relative_position_bias_table",
            candle_nn::Init::Const(0.),
        )?;

        let index = Tensor::from_vec(relative_position_index(window_size), n * n, table.device())?;
        let relative_position_bias = table
            .index_select(&index, 0)?
            .reshape((n, n, num_heads))?
            .permute((2, 0, 1))?
            .contiguous()?
            .unsqueeze(0)?;

        Ok(Self {
            qkv,
            proj,
            relative_position_bias,
            num_heads,
            scale: 1.0 / ((dim / num_heads) as f64).sqrt(),
        })
    }

    /// `xs`: `[B_, N, C]` tokens grouped by window; `mask`: `[nW, N, N]`.
    fn forward(&self, xs: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (b, n, c) = xs.dims3()?;
        let head_dim = c / self.num_heads;

        let qkv = self
            .qkv
            .forward(xs)?
            .reshape((b, n, 3, self.num_heads, head_dim))?
            .permute((2, 0, 3, 1, 4))?;
        let q = qkv.i(0)?.contiguous()?.affine(self.scale, 0.)?;
        let k = qkv.i(1)?.contiguous()?;
        let v = qkv.i(2)?.contiguous()?;

        let attn = q.matmul(&k.t()?)?;
        let attn = attn.broadcast_add(&self.relative_position_bias)?;
        let attn = match mask {
            Some(mask) => {
                let nw = mask.dim(0)?;
                attn.reshape((b / nw, nw, self.num_heads, n, n))?
                    .broadcast_add(&mask.unsqueeze(1)?.unsqueeze(0)?)?
                    .reshape((b, self.num_heads, n, n))?
            }
            None => attn,
        };
        let attn = candle_nn::ops::softmax_last_dim(&attn)?;

        let xs = attn.matmul(&v)?.transpose(1, 2)?.reshape((b, n, c))?;
        self.proj.forward(&xs)
    }
}

struct Mlp {
    fc1: Linear,
    fc2: Linear,
}

impl Mlp {
    fn new(dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            fc1: linear(dim, hidden, vb.pp("fc1"))?,
            fc2: linear(hidden, dim, vb.pp("fc2"))?,
        })
    }
}

impl Module for Mlp {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        self.fc2.forward(&self.fc1.forward(xs)?.gelu_erf()?)
    }
}

struct SwinBlock {
    norm1: LayerNorm,
    attn: WindowAttention,
    norm2: LayerNorm,
    mlp: Mlp,
    window_size: usize,
    shift_size: usize,
    attn_mask: Option<Tensor>,
}

impl SwinBlock {
    fn new(
        cfg: &SwinConfig,
        dim: usize,
        resolution: usize,
        num_heads: usize,
        window_size: usize,
        shift_size: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let norm1 = layer_norm(dim, cfg.layer_norm_eps, vb.pp("norm1"))?;
        let attn = WindowAttention::new(dim, num_heads, window_size, vb.pp("attn"))?;
        let norm2 = layer_norm(dim, cfg.layer_norm_eps, vb.pp("norm2"))?;
        let mlp = Mlp::new(dim, dim * cfg.mlp_ratio, vb.pp("mlp"))?;
        let attn_mask = if shift_size > 0 {
            Some(shifted_window_mask(
                resolution,
                window_size,
                shift_size,
                vb.device(),
            )?)
        } else {
            None
        };

        Ok(Self {
            norm1,
            attn,
            norm2,
            mlp,
            window_size,
            shift_size,
            attn_mask,
        })
    }
}

impl Module for SwinBlock {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, h, w, c) = xs.dims4()?;
        let ws = self.window_size;
        let shift = self.shift_size as i32;

        let x = self.norm1.forward(xs)?;
        let x = if shift > 0 {
            x.roll(-shift, 1)?.roll(-shift, 2)?
        } else {
            x
        };

        let windows = window_partition(&x, ws)?;
        let num_windows = windows.dim(0)?;
        let windows = windows.reshape((num_windows, ws * ws, c))?;
        let attn = self.attn.forward(&windows, self.attn_mask.as_ref())?;
        let attn = attn.reshape((num_windows, ws, ws, c))?;
        let x = window_reverse(&attn, ws, h, w)?;

        let x = if shift > 0 {
            x.roll(shift, 1)?.roll(shift, 2)?
        } else {
            x
        };
        debug_assert_eq!(x.dims(), &[b, h, w, c]);

        let xs = (xs + x)?;
        let y = self.mlp.forward(&self.norm2.forward(&xs)?)?;
        xs + y
    }
}

/// 2x2 neighbourhood merge halving resolution and doubling channels.
struct PatchMerging {
    norm: LayerNorm,
    reduction: Linear,
}

impl PatchMerging {
    fn new(dim: usize, eps: f64, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            norm: layer_norm(4 * dim, eps, vb.pp("norm"))?,
            reduction: linear_no_bias(4 * dim, 2 * dim, vb.pp("reduction"))?,
        })
    }
}

impl Module for PatchMerging {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let (b, h, w, c) = xs.dims4()?;
        let xs = xs
            .reshape((b, h / 2, 2, w / 2, 2, c))?
            .permute((0, 1, 3, 4, 2, 5))?
            .contiguous()?
            .reshape((b, h / 2, w / 2, 4 * c))?;
        self.reduction.forward(&self.norm.forward(&xs)?)
    }
}

struct SwinStage {
    downsample: Option<PatchMerging>,
    blocks: Vec<SwinBlock>,
}

impl SwinStage {
    fn new(cfg: &SwinConfig, stage: usize, vb: VarBuilder) -> Result<Self> {
        let dim = cfg.stage_dim(stage);
        let resolution = cfg.stage_resolution(stage);
        let (window_size, shift) = cfg.window_and_shift(stage);

        let downsample = if stage > 0 {
            Some(PatchMerging::new(
                cfg.stage_dim(stage - 1),
                cfg.layer_norm_eps,
                vb.pp("downsample"),
            )?)
        } else {
            None
        };

        let vb_blocks = vb.pp("blocks");
        let blocks = (0..cfg.depths[stage])
            .map(|i| {
                let shift_size = if i % 2 == 1 { shift } else { 0 };
                SwinBlock::new(
                    cfg,
                    dim,
                    resolution,
                    cfg.num_heads[stage],
                    window_size,
                    shift_size,
                    vb_blocks.pp(i),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(
            stage,
            dim, resolution, window_size, shift, depth = blocks.len(), "Built Swin stage"
        );
        Ok(Self { downsample, blocks })
    }
}

impl Module for SwinStage {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = match &self.downsample {
            Some(downsample) => downsample.forward(xs)?,
            None => xs.clone(),
        };
        for block in &self.blocks {
            xs = block.forward(&xs)?;
        }
        Ok(xs)
    }
}

/// Swin Transformer with a linear classification head.
pub struct SwinTransformer {
    patch_embed: PatchEmbed,
    stages: Vec<SwinStage>,
    norm: LayerNorm,
    head: Linear,
    config: SwinConfig,
}

impl SwinTransformer {
    pub fn new(cfg: &SwinConfig, vb: VarBuilder) -> Result<Self> {
        if cfg.depths.len() != cfg.num_heads.len() {
            candle_core::bail!(
                "depths ({}) and num_heads ({}) differ in length",
                cfg.depths.len(),
                cfg.num_heads.len()
            );
        }

        let patch_embed = PatchEmbed::new(cfg, vb.pp("patch_embed"))?;
        let vb_layers = vb.pp("layers");
        let stages = (0..cfg.num_stages())
            .map(|i| SwinStage::new(cfg, i, vb_layers.pp(i)))
            .collect::<Result<Vec<_>>>()?;
        let norm = layer_norm(cfg.num_features(), cfg.layer_norm_eps, vb.pp("norm"))?;
        let head = linear(cfg.num_features(), cfg.num_classes, vb.pp("head").pp("fc"))?;

        Ok(Self {
            patch_embed,
            stages,
            norm,
            head,
            config: cfg.clone(),
        })
    }

    pub fn config(&self) -> &SwinConfig {
        &self.config
    }

    /// Pooled `[B, num_features]` embedding before the head.
    pub fn forward_features(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self.patch_embed.forward(xs)?;
        for stage in &self.stages {
            xs = stage.forward(&xs)?;
        }
        self.norm.forward(&xs)?.mean((1, 2))
    }
}

impl Module for SwinTransformer {
    /// `[B, 3, S, S]` normalised pixels -> `[B, num_classes]` logits.
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let features = self.forward_features(xs)?;
        self.head.forward(&features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn small_config() -> SwinConfig {
        SwinConfig {
            image_size: 56,
            patch_size: 4,
            in_channels: 3,
            embed_dim: 8,
            depths: vec![2, 2],
            num_heads: vec![1, 2],
            window_size: 7,
            mlp_ratio: 2,
            layer_norm_eps: 1e-5,
            num_classes: 5,
        }
    }

    #[test]
    fn test_presets() {
        let tiny = SwinConfig::from_model_name("swin_tiny_patch4_window7_224", 23).unwrap();
        assert_eq!(tiny.num_features(), 768);
        assert_eq!(tiny.stage_resolution(3), 7);

        let base = SwinConfig::from_model_name("swin_base_patch4_window7_224", 23).unwrap();
        assert_eq!(base.num_features(), 1024);
        assert_eq!(base.depths, vec![2, 2, 18, 2]);

        assert!(SwinConfig::from_model_name("vit_base_patch16_224", 23).is_none());
    }

    #[test]
    fn test_last_stage_disables_shift() {
        let cfg = SwinConfig::tiny(23);
        assert_eq!(cfg.window_and_shift(0), (7, 3));
        assert_eq!(cfg.window_and_shift(2), (7, 3));
        assert_eq!(cfg.window_and_shift(3), (7, 0));

        let small = small_config();
        assert_eq!(small.window_and_shift(0), (7, 3));
        assert_eq!(small.window_and_shift(1), (7, 0));
    }

    #[test]
    fn test_relative_position_index() {
        let index = relative_position_index(2);
        // span 3: diagonal maps to the centre of the 3x3 table
        assert_eq!(index.len(), 16);
        assert_eq!(index[0], 4);
        assert_eq!(index[5], 4);
        // query (0,0), key (1,1): offset (-1,-1) -> (0,0) in the table
        assert_eq!(index[3], 0);
        // query (1,1), key (0,0): offset (+1,+1) -> (2,2)
        assert_eq!(index[12], 8);

        let index = relative_position_index(7);
        assert_eq!(index.iter().max(), Some(&168));
    }

    #[test]
    fn test_shifted_window_mask() {
        let mask = shifted_window_mask(4, 2, 1, &Device::Cpu).unwrap();
        assert_eq!(mask.dims(), &[4, 4, 4]);

        let values = mask.to_vec3::<f32>().unwrap();
        // top-left window lies entirely in one region
        assert!(values[0].iter().flatten().all(|v| *v == 0.0));
        // bottom-right window spans four regions
        let last = &values[3];
        for i in 0..4 {
            assert_eq!(last[i][i], 0.0);
        }
        assert_eq!(last[0][3], -100.0);
    }

    #[test]
    fn test_window_partition_roundtrip() {
        let xs = Tensor::arange(0f32, 2.0 * 4.0 * 4.0 * 3.0, &Device::Cpu)
            .unwrap()
            .reshape((2, 4, 4, 3))
            .unwrap();
        let windows = window_partition(&xs, 2).unwrap();
        assert_eq!(windows.dims(), &[8, 2, 2, 3]);

        // first window holds the top-left 2x2 patch of image 0
        let first = windows.i(0).unwrap().to_vec3::<f32>().unwrap();
        assert_eq!(first[0][1][0], 3.0);
        assert_eq!(first[1][0][0], 12.0);

        let back = window_reverse(&windows, 2, 4, 4).unwrap();
        let diff = (back - &xs).unwrap().abs().unwrap().sum_all().unwrap();
        assert_eq!(diff.to_scalar::<f32>().unwrap(), 0.0);
    }

    #[test]
    fn test_forward_shape() {
        let cfg = small_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let model = SwinTransformer::new(&cfg, vb).unwrap();

        let xs = Tensor::randn(0f32, 1.0, (1, 3, 56, 56), &Device::Cpu).unwrap();
        let logits = model.forward(&xs).unwrap();
        assert_eq!(logits.dims(), &[1, 5]);

        let features = model.forward_features(&xs).unwrap();
        assert_eq!(features.dims(), &[1, 16]);
    }

    #[test]
    fn test_parameter_names_match_timm() {
        let cfg = small_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        SwinTransformer::new(&cfg, vb).unwrap();

        let data = varmap.data().lock().unwrap();
        for name in [
            "patch_embed.proj.weight",
            "patch_embed.norm.bias",
            "layers.0.blocks.1.attn.relative_position_bias_table",
            "layers.0.blocks.0.mlp.fc1.weight",
            "layers.1.downsample.reduction.weight",
            "layers.1.downsample.norm.weight",
            "norm.weight",
            "head.fc.weight",
            "head.fc.bias",
        ] {
            assert!(data.contains_key(name), "missing {}", name);
        }
        assert!(!data.contains_key("layers.0.downsample.reduction.weight"));
        assert!(!data.contains_key("layers.1.downsample.reduction.bias"));
    }

    #[test]
    fn test_mismatched_heads_rejected() {
        let mut cfg = small_config();
        cfg.num_heads = vec![1];
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        assert!(SwinTransformer::new(&cfg, vb).is_err());
    }
}
