// dermasense/core/vision/src/checkpoint.rs

use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::types::VisionError;

/// Nested entries probed when a pickled checkpoint has no tensors at the top
/// level (training scripts often save `{"state_dict": ..., "epoch": ...}`).
const NESTED_KEYS: [&str; 2] = ["state_dict", "model"];

/// Buffers recomputed at load time rather than read from the file.
const DERIVED_BUFFERS: [&str; 2] = ["relative_position_index", "attn_mask"];

/// Read a checkpoint into a name -> tensor map with keys normalised to the
/// layout [`crate::swin::SwinTransformer`] expects.
///
/// `.safetensors` files are read directly; anything else is treated as a
/// PyTorch pickle. Tensors stay on the CPU; the var builder moves them.
pub fn load_state_dict(
    path: &Path,
    key: Option<&str>,
) -> Result<HashMap<String, Tensor>, VisionError> {
    if !path.exists() {
        return Err(VisionError::WeightsNotFound(path.to_path_buf()));
    }

    let is_safetensors = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("safetensors"))
        .unwrap_or(false);

    let raw: Vec<(String, Tensor)> = if is_safetensors {
        candle_core::safetensors::load(path, &Device::Cpu)?
            .into_iter()
            .collect()
    } else {
        read_pickle(path, key)?
    };

    let state_dict = normalize_keys(raw);
    info!(
        "Loaded {} tensors from checkpoint {}",
        state_dict.len(),
        path.display()
    );
    Ok(state_dict)
}

fn read_pickle(path: &Path, key: Option<&str>) -> Result<Vec<(String, Tensor)>, VisionError> {
    if let Some(key) = key {
        return Ok(candle_core::pickle::read_all_with_key(path, Some(key))?);
    }

    let top_level = candle_core::pickle::read_all_with_key(path, None)?;
    if top_level.iter().any(|(name, _)| looks_like_weight(name)) {
        return Ok(top_level);
    }

    for nested in NESTED_KEYS {
        match candle_core::pickle::read_all_with_key(path, Some(nested)) {
            Ok(tensors) if !tensors.is_empty() => {
                debug!("Using nested '{}' entry of checkpoint", nested);
                return Ok(tensors);
            }
            Ok(_) => {}
            Err(e) => debug!("No usable '{}' entry: {}", nested, e),
        }
    }

    warn!(
        "Checkpoint {} has no recognisable weights at the top level",
        path.display()
    );
    Ok(top_level)
}

fn looks_like_weight(name: &str) -> bool {
    let name = name.strip_prefix("module.").unwrap_or(name);
    name.starts_with("patch_embed.") || name.starts_with("layers.")
}

/// Apply [`remap_key`] to every entry. Legacy layout is detected once for the
/// whole checkpoint.
pub fn normalize_keys(raw: Vec<(String, Tensor)>) -> HashMap<String, Tensor> {
    let stripped: Vec<(String, Tensor)> = raw
        .into_iter()
        .map(|(name, t)| match name.strip_prefix("module.") {
            Some(rest) => (rest.to_string(), t),
            None => (name, t),
        })
        .collect();

    let legacy = is_legacy_layout(stripped.iter().map(|(name, _)| name.as_str()));
    if legacy {
        debug!("Remapping legacy Swin checkpoint layout");
    }

    stripped
        .into_iter()
        .filter_map(|(name, t)| remap_key(&name, legacy).map(|name| (name, t)))
        .collect()
}

/// Older timm releases stored the classifier as `head.*` and attached each
/// patch-merging layer to the end of the preceding stage.
pub fn is_legacy_layout<'a>(names: impl IntoIterator<Item = &'a str>) -> bool {
    let mut has_head = false;
    for name in names {
        if name.starts_with("head.fc.") {
            return false;
        }
        if name.starts_with("head.") {
            has_head = true;
        }
    }
    has_head
}

/// Map one checkpoint key onto the current layout; `None` drops it.
pub fn remap_key(name: &str, legacy: bool) -> Option<String> {
    if DERIVED_BUFFERS.iter().any(|b| name.ends_with(b)) {
        return None;
    }
    if !legacy {
        return Some(name.to_string());
    }

    if let Some(rest) = name.strip_prefix("head.") {
        return Some(format!("head.fc.{}", rest));
    }

    if let Some(rest) = name.strip_prefix("layers.") {
        if let Some((stage, tail)) = rest.split_once('.') {
            if tail.starts_with("downsample.") {
                if let Ok(stage) = stage.parse::<usize>() {
                    return Some(format!("layers.{}.{}", stage + 1, tail));
                }
            }
        }
    }

    Some(name.to_string())
}
