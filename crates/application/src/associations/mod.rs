//! Association set and deterministic control-proxy resolution.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tracing::info;

use domain::association::{Association, AssociationTarget};
use domain::device::DeviceId;
use domain::error::{CoreError, Result};
use domain::store::AssociationStore;

/// Holds the active association set and answers resolution queries as a
/// pure function of it. Callers never cache results; administrative
/// reconfiguration swaps the whole set atomically.
pub struct AssociationResolver {
    store: Arc<dyn AssociationStore>,
    set: RwLock<Vec<Association>>,
}

impl AssociationResolver {
    pub fn new(store: Arc<dyn AssociationStore>) -> Self {
        Self {
            store,
            set: RwLock::new(Vec::new()),
        }
    }

    pub async fn load(&self) -> Result<()> {
        let set = self.store.list().await?;
        info!(count = set.len(), "Association set loaded");
        *self.set.write().unwrap_or_else(|e| e.into_inner()) = set;
        Ok(())
    }

    /// Associations whose source is `source_id` and whose type attributes
    /// readings (monitors or monitors_and_controls).
    pub fn monitoring_targets(&self, source_id: &DeviceId) -> Vec<Association> {
        self.set
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|a| a.source_device_id == *source_id && a.kind.monitors())
            .cloned()
            .collect()
    }

    /// Highest-priority control-capable association targeting the device.
    ///
    /// Priority: exact-device target beats group target; then
    /// monitors_and_controls beats controls; then most recent
    /// `configured_at`. A pure monitors association is never a proxy.
    pub fn control_proxy(
        &self,
        target_id: &DeviceId,
        group_id: Option<&str>,
    ) -> Option<Association> {
        self.set
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|a| a.kind.controls() && a.targets_device(target_id, group_id))
            .max_by_key(|a| {
                (
                    a.targets_exact_device(),
                    a.kind.control_rank(),
                    a.configured_at,
                )
            })
            .cloned()
    }

    /// True when an association directly links the two devices in either
    /// direction. Consulted by the registry's address-uniqueness check.
    pub fn links(&self, a: &DeviceId, b: &DeviceId) -> bool {
        self.set
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|assoc| {
                let device_target = match &assoc.target {
                    AssociationTarget::Device { device_id } => Some(device_id),
                    AssociationTarget::Group { .. } => None,
                };
                match device_target {
                    Some(t) => {
                        (assoc.source_device_id == *a && t == b)
                            || (assoc.source_device_id == *b && t == a)
                    }
                    None => false,
                }
            })
    }

    /// Replaces the association set atomically.
    ///
    /// Two control-capable associations for the same target sharing a
    /// `configured_at` would make proxy resolution ambiguous; such a set
    /// is rejected outright rather than resolved by guesswork.
    pub async fn configure(&self, set: Vec<Association>) -> Result<()> {
        // Attribution writes onto a single target state; a group has no
        // state of its own, so monitoring must name a device
        for assoc in &set {
            if assoc.kind.monitors()
                && matches!(assoc.target, AssociationTarget::Group { .. })
            {
                return Err(CoreError::validation(format!(
                    "monitoring association {} must target a device, not a group",
                    assoc.id
                )));
            }
        }

        let mut per_target: HashMap<&AssociationTarget, Vec<DateTime<Utc>>> = HashMap::new();
        for assoc in set.iter().filter(|a| a.kind.controls()) {
            let stamps = per_target.entry(&assoc.target).or_default();
            if stamps.contains(&assoc.configured_at) {
                return Err(CoreError::validation(format!(
                    "conflicting control associations for the same target share configured_at {}",
                    assoc.configured_at
                )));
            }
            stamps.push(assoc.configured_at);
        }

        self.store.replace_all(&set).await?;
        info!(count = set.len(), "Association set replaced");
        *self.set.write().unwrap_or_else(|e| e.into_inner()) = set;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::association::AssociationType;
    use infrastructure::storage::memory::MemoryAssociationStore;

    fn resolver() -> AssociationResolver {
        AssociationResolver::new(Arc::new(MemoryAssociationStore::new()))
    }

    fn assoc(
        id: &str,
        source: &str,
        target: AssociationTarget,
        kind: AssociationType,
        configured_at: DateTime<Utc>,
    ) -> Association {
        Association {
            id: id.to_string(),
            source_device_id: DeviceId::new(source).unwrap(),
            target,
            kind,
            metrics: Vec::new(),
            command_map: HashMap::new(),
            configured_at,
        }
    }

    fn device_target(id: &str) -> AssociationTarget {
        AssociationTarget::Device {
            device_id: DeviceId::new(id).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_monitoring_association_may_not_target_a_group() {
        let r = resolver();
        let err = r
            .configure(vec![assoc(
                "meter",
                "meter-7",
                AssociationTarget::Group {
                    group_id: "plant-room".to_string(),
                },
                AssociationType::Monitors,
                Utc::now(),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_exact_device_beats_group() {
        let r = resolver();
        let now = Utc::now();
        r.configure(vec![
            assoc(
                "group",
                "relay-group",
                AssociationTarget::Group {
                    group_id: "room-1".to_string(),
                },
                AssociationType::Controls,
                now,
            ),
            assoc(
                "exact",
                "relay-1-ch3",
                device_target("pump-chw-1"),
                AssociationType::Controls,
                now - Duration::hours(1),
            ),
        ])
        .await
        .unwrap();

        let hit = r
            .control_proxy(&DeviceId::new("pump-chw-1").unwrap(), Some("room-1"))
            .unwrap();
        assert_eq!(hit.id, "exact");
    }

    #[tokio::test]
    async fn test_monitors_and_controls_beats_controls() {
        let r = resolver();
        let now = Utc::now();
        r.configure(vec![
            assoc(
                "plain",
                "relay-a",
                device_target("pump-1"),
                AssociationType::Controls,
                now,
            ),
            assoc(
                "both",
                "relay-b",
                device_target("pump-1"),
                AssociationType::MonitorsAndControls,
                now - Duration::hours(1),
            ),
        ])
        .await
        .unwrap();

        let hit = r
            .control_proxy(&DeviceId::new("pump-1").unwrap(), None)
            .unwrap();
        assert_eq!(hit.id, "both");
    }

    #[tokio::test]
    async fn test_most_recent_configured_at_breaks_ties() {
        let r = resolver();
        let now = Utc::now();
        r.configure(vec![
            assoc(
                "older",
                "relay-a",
                device_target("pump-1"),
                AssociationType::Controls,
                now - Duration::hours(2),
            ),
            assoc(
                "newer",
                "relay-b",
                device_target("pump-1"),
                AssociationType::Controls,
                now,
            ),
        ])
        .await
        .unwrap();

        // Deterministic and idempotent under an unchanged set
        for _ in 0..3 {
            let hit = r
                .control_proxy(&DeviceId::new("pump-1").unwrap(), None)
                .unwrap();
            assert_eq!(hit.id, "newer");
        }
    }

    #[tokio::test]
    async fn test_pure_monitors_is_never_a_proxy() {
        let r = resolver();
        r.configure(vec![assoc(
            "mon",
            "meter-1",
            device_target("pump-1"),
            AssociationType::Monitors,
            Utc::now(),
        )])
        .await
        .unwrap();

        assert!(
            r.control_proxy(&DeviceId::new("pump-1").unwrap(), None)
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_same_configured_at_conflict_rejected() {
        let r = resolver();
        let now = Utc::now();
        let err = r
            .configure(vec![
                assoc(
                    "a",
                    "relay-a",
                    device_target("pump-1"),
                    AssociationType::Controls,
                    now,
                ),
                assoc(
                    "b",
                    "relay-b",
                    device_target("pump-1"),
                    AssociationType::Controls,
                    now,
                ),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        // Rejected set never becomes active
        assert!(
            r.control_proxy(&DeviceId::new("pump-1").unwrap(), None)
                .is_none()
        );
    }
}
