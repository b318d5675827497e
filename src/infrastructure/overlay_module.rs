use crate::infrastructure::error::InfraError;
use async_trait::async_trait;

/// Capability surface of the Android floating-overlay native module.
///
/// Platforms without an overlay wire in [`NoopOverlayModule`] at
/// composition time, so the bridge and its callers stay free of
/// platform branching.
#[async_trait]
pub trait OverlayModule: Send + Sync {
    fn start_overlay(&self) -> Result<(), InfraError>;
    fn stop_overlay(&self) -> Result<(), InfraError>;
    fn update_count(&self, count: u32) -> Result<(), InfraError>;
    fn collapse_overlay(&self) -> Result<(), InfraError>;

    async fn can_draw_overlays(&self) -> Result<bool, InfraError>;
    async fn request_overlay_permission(&self) -> Result<bool, InfraError>;
    async fn is_expanded(&self) -> Result<bool, InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct NoopOverlayModule;

#[async_trait]
impl OverlayModule for NoopOverlayModule {
    fn start_overlay(&self) -> Result<(), InfraError> {
        Ok(())
    }

    fn stop_overlay(&self) -> Result<(), InfraError> {
        Ok(())
    }

    fn update_count(&self, _count: u32) -> Result<(), InfraError> {
        Ok(())
    }

    fn collapse_overlay(&self) -> Result<(), InfraError> {
        Ok(())
    }

    async fn can_draw_overlays(&self) -> Result<bool, InfraError> {
        Ok(false)
    }

    async fn request_overlay_permission(&self) -> Result<bool, InfraError> {
        Ok(false)
    }

    async fn is_expanded(&self) -> Result<bool, InfraError> {
        Ok(false)
    }
}
