pub mod command;
pub mod coordinator;
pub mod location_index;
pub mod matching;
pub mod state_machine;

use tracing::{info, warn};

use crate::notify::DeliveryReport;
use crate::store::PartyStore;

/// Clears push tokens that a delivery reported as invalid. Failures here
/// are logged and never surface to the caller.
pub(crate) async fn clear_invalid_tokens(parties: &dyn PartyStore, reports: &[DeliveryReport]) {
    for report in reports {
        let Some(token) = report.invalid_token_for(report.party_id) else {
            continue;
        };

        match parties.clear_push_token(report.party_id, token).await {
            Ok(true) => info!(party_id = %report.party_id, "cleared invalid push token"),
            Ok(false) => {}
            Err(err) => {
                warn!(party_id = %report.party_id, error = %err, "failed to clear invalid push token")
            }
        }
    }
}
