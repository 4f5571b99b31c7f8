// dermasense/core/vision/src/device.rs

use candle_core::Device;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::types::VisionError;

/// Requested compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    /// First available of CUDA, Metal, CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
    Metal,
}

impl DevicePreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevicePreference::Auto => "auto",
            DevicePreference::Cpu => "cpu",
            DevicePreference::Cuda => "cuda",
            DevicePreference::Metal => "metal",
        }
    }
}

impl fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(DevicePreference::Auto),
            "cpu" => Ok(DevicePreference::Cpu),
            "cuda" | "gpu" => Ok(DevicePreference::Cuda),
            "metal" | "mps" => Ok(DevicePreference::Metal),
            other => Err(format!("unknown device '{}'", other)),
        }
    }
}

/// Resolve a preference to a concrete device.
///
/// An explicitly requested accelerator that is not compiled in or not present
/// is an error rather than a silent CPU fallback.
pub fn select_device(preference: DevicePreference) -> Result<Device, VisionError> {
    let device = match preference {
        DevicePreference::Auto => {
            if candle_core::utils::cuda_is_available() {
                Device::new_cuda(0)?
            } else if candle_core::utils::metal_is_available() {
                Device::new_metal(0)?
            } else {
                debug!("No accelerator available, using CPU");
                Device::Cpu
            }
        }
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => Device::new_cuda(0)
            .map_err(|e| VisionError::DeviceUnavailable(format!("cuda: {}", e)))?,
        DevicePreference::Metal => Device::new_metal(0)
            .map_err(|e| VisionError::DeviceUnavailable(format!("metal: {}", e)))?,
    };

    info!("Selected compute device: {}", device_name(&device));
    Ok(device)
}

/// Short device name reported by the health endpoint.
pub fn device_name(device: &Device) -> &'static str {
    match device {
        Device::Cpu => "cpu",
        Device::Cuda(_) => "cuda",
        Device::Metal(_) => "metal",
    }
}
