//! Security universe port.

use crate::domain::error::EngineError;
use crate::domain::security::Security;

pub trait UniversePort: Send + Sync {
    /// Securities of `universe` (all universes when empty), restricted to
    /// `asset_types` when non-empty.
    fn list_securities(
        &self,
        universe: &str,
        asset_types: &[String],
    ) -> Result<Vec<Security>, EngineError>;
}
