use candle_core::Device;
use tracing::info;

/// Metal when the feature is on and a GPU is present, otherwise CPU.
pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!(device = "metal", "selected embedding device");
            return dev;
        }
    }
    info!(device = "cpu", "selected embedding device");
    Device::Cpu
}
