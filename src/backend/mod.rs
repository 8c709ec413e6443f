//! Backend implementations and the factory that stacks them.
//!
//! - [`native`]: libc through the native library dispatch layer
//! - [`emulated`]: std-only emulation with an in-process resource table
//! - [`hybrid`]: emulated during image build time, native afterwards
//! - [`logging`]: decorator recording every call

pub mod emulated;
pub mod hybrid;
pub mod logging;
pub mod native;

use crate::config::types::{BackendKind, ConfigError, SupportConfig};
use crate::core::support::PosixSupport;
use std::sync::Arc;

pub use emulated::EmulatedPosixSupport;
pub use hybrid::{BuildPhase, ImageBuildtimePosixSupport};
pub use logging::{LogValue, LoggingPosixSupport};
pub use native::NativePosixSupport;

/// Build-time hybrid over a native and an emulated backend from the same configuration.
pub fn create_image_buildtime_backend(
    config: &SupportConfig,
) -> Result<Arc<ImageBuildtimePosixSupport>, ConfigError> {
    let native = NativePosixSupport::from_config(config)?;
    let emulated = EmulatedPosixSupport::from_config(config)?;
    Ok(Arc::new(ImageBuildtimePosixSupport::new(
        Arc::new(native),
        Arc::new(emulated),
        BuildPhase::BuildTime,
    )))
}

/// Wrap `backend` in the logging decorator when the configuration asks for it.
pub fn with_logging(config: &SupportConfig, backend: Arc<dyn PosixSupport>) -> Arc<dyn PosixSupport> {
    if config.logging {
        Arc::new(LoggingPosixSupport::new(backend))
    } else {
        backend
    }
}

/// Validate `config` and build the backend stack it describes.
///
/// `ImageBuildtime` starts in the build-time phase; callers that must end the build use
/// [`create_image_buildtime_backend`] to keep a handle on the hybrid.
pub fn create_backend(config: &SupportConfig) -> Result<Arc<dyn PosixSupport>, ConfigError> {
    config.validate()?;
    log::info!(
        "Posix backend selection: backend={}, logging={}, native_access={}",
        config.backend,
        config.logging,
        config.native_access
    );
    let backend: Arc<dyn PosixSupport> = match config.backend {
        BackendKind::Native => Arc::new(NativePosixSupport::from_config(config)?),
        BackendKind::Emulated => Arc::new(EmulatedPosixSupport::from_config(config)?),
        BackendKind::ImageBuildtime => create_image_buildtime_backend(config)?,
    };
    Ok(with_logging(config, backend))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emulated_stack() {
        let config = SupportConfig {
            backend: BackendKind::Emulated,
            ..Default::default()
        };
        assert_eq!(create_backend(&config).unwrap().get_backend(), "emulated");
    }

    #[test]
    fn test_logging_is_transparent_for_backend_name() {
        let config = SupportConfig {
            backend: BackendKind::Native,
            logging: true,
            ..Default::default()
        };
        assert_eq!(create_backend(&config).unwrap().get_backend(), "native");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = SupportConfig {
            native_access: false,
            ..Default::default()
        };
        assert!(matches!(create_backend(&config), Err(ConfigError::Inconsistent(_))));
    }
}
