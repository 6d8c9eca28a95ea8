use candle_core::Device;
use log::{info, warn};
use once_cell::sync::Lazy;

/// Device shared by both Q-networks; CUDA when available, CPU otherwise.
pub static DEVICE: Lazy<Device> = Lazy::new(|| match Device::new_cuda(0) {
    Ok(device) => {
        info!("Successfully initialized CUDA device.");
        device
    }
    Err(err_cuda) => {
        warn!(
            "Failed to initialize CUDA device: {:?}. Falling back to CPU.",
            err_cuda
        );
        Device::Cpu
    }
});
