// ── Composite network creation ──

use serde_json::json;
use tracing::info;

use super::requests::{CreateNetworkRequest, NetworkTopology};
use crate::connection::Connection;
use crate::error::CoreError;
use crate::model::OpaqueRef;

impl Connection {
    /// Create a network and attach it to a VLAN or bond.
    ///
    /// The request is validated before any remote call. Calls then run in
    /// dependency order; when a later step fails the network created by
    /// the first step is left in place for the caller to remove.
    pub async fn create_network(
        &self,
        request: &CreateNetworkRequest,
    ) -> Result<OpaqueRef, CoreError> {
        let topology = request.validate()?;

        let record = json!({
            "name_label": request.name_label.trim(),
            "name_description": request.name_description,
            "MTU": request.mtu,
            "other_config": request.other_config,
        });
        let network = self.call_for_ref("network.create", &[record]).await?;
        info!(%network, name = %request.name_label.trim(), "network created");

        match topology {
            NetworkTopology::Internal => {}
            NetworkTopology::Vlan { pif, tag } => {
                let vlan_pif = self
                    .call_for_ref(
                        "pool.create_VLAN_from_PIF",
                        &[json!(pif), json!(network), json!(tag)],
                    )
                    .await?;
                info!(%network, %vlan_pif, tag, "VLAN attached");
            }
            NetworkTopology::Bond { pifs, mode } => {
                let bond = self
                    .call_for_ref(
                        "Bond.create",
                        &[
                            json!(network),
                            json!(pifs),
                            json!(""),
                            json!(mode.to_string()),
                            json!({}),
                        ],
                    )
                    .await?;
                info!(%network, %bond, %mode, members = pifs.len(), "bond attached");
            }
        }

        Ok(network)
    }
}
