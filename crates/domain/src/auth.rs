//! Authorization contract consumed by the command processor.
//!
//! The mechanics of authentication and permission storage live outside
//! this subsystem; only the check is consumed here.

use async_trait::async_trait;

use crate::device::DeviceId;
use crate::error::Result;

#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns `Ok(())` when the user may issue `command` against the
    /// device, `CoreError::Authorization` otherwise.
    async fn authorize(
        &self,
        user_id: Option<&str>,
        device_id: &DeviceId,
        command: &str,
    ) -> Result<()>;
}

/// Permits everything. Used for internal callers (automations, scenes)
/// and in tests.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _: Option<&str>, _: &DeviceId, _: &str) -> Result<()> {
        Ok(())
    }
}
