//! Alert aggregation: every reading from every device a user owns.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::debug;

use crate::error::AggregatorError;
use crate::models::{AlertBundle, SensorKind};
use crate::store::SensorStore;

// ---

pub struct AlertAggregator {
    store: Arc<dyn SensorStore>,
}

impl AlertAggregator {
    // ---
    pub fn new(store: Arc<dyn SensorStore>) -> Self {
        Self { store }
    }

    /// Resolve the user's devices, then fetch readings for every sensor kind.
    ///
    /// The per-kind fetches run concurrently; the result keeps the fixed
    /// [`SensorKind::ALL`] order and always has an entry for each kind. Any
    /// failed fetch fails the whole request.
    #[tracing::instrument(name = "user_alerts", skip(self))]
    pub async fn user_alerts(&self, user_id: i64) -> Result<AlertBundle, AggregatorError> {
        // ---
        let devices = self.store.owned_device_serials(user_id).await?;
        if devices.is_empty() {
            debug!("User {} owns no devices", user_id);
            return Ok(AlertBundle::empty(user_id));
        }

        let fetches = SensorKind::ALL
            .map(|kind| self.store.readings_for_devices(kind, &devices));
        let per_kind = try_join_all(fetches).await?;

        let alerts = SensorKind::ALL.into_iter().zip(per_kind).collect();

        Ok(AlertBundle {
            user_id,
            devices,
            alerts,
        })
    }
}
