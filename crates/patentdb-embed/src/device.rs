use candle_core::Device;
use tracing::info;

/// Pick the best available compute device.
///
/// `APP_FORCE_CPU=1` pins CPU even when an accelerator is compiled in.
/// Accelerator init failure degrades to CPU instead of aborting.
pub fn select_device() -> Device {
    let force_cpu = std::env::var("APP_FORCE_CPU")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if force_cpu {
        info!("device: CPU (forced via APP_FORCE_CPU)");
        return Device::Cpu;
    }

    #[cfg(feature = "cuda")]
    {
        if let Ok(dev) = Device::new_cuda(0) {
            info!("device: CUDA");
            return dev;
        }
    }
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("device: Metal (MPS)");
            return dev;
        }
    }
    info!("device: CPU");
    Device::Cpu
}
