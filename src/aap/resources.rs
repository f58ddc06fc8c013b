//! Inventory and host records.

use serde_json::{Value, json};

use crate::remote::{HostId, HostRequest, InventoryId, InventoryRequest, RemoteError};

use super::wire::CreatedRecord;
use super::{AapClient, parse_body, require_id};

impl AapClient {
    pub(super) async fn post_inventory(
        &self,
        request: &InventoryRequest,
    ) -> Result<InventoryId, RemoteError> {
        const OPERATION: &str = "create inventory";
        let payload = json!({
            "name": request.name,
            "description": request.description,
            "organization": request.organization_id,
        });
        let body = self
            .post(OPERATION, &self.endpoint("inventories/"), &payload)
            .await?;
        let record: CreatedRecord = parse_body(OPERATION, &body)?;
        require_id(OPERATION, record.id, &body).map(InventoryId::new)
    }

    pub(super) async fn post_host(&self, request: &HostRequest) -> Result<HostId, RemoteError> {
        const OPERATION: &str = "create host";
        // The controller expects host variables as a YAML/JSON document string.
        let variables = Value::Object(request.variables()).to_string();
        let payload = json!({
            "name": request.address,
            "inventory": request.inventory_id,
            "variables": variables,
        });
        let body = self
            .post(OPERATION, &self.endpoint("hosts/"), &payload)
            .await?;
        let record: CreatedRecord = parse_body(OPERATION, &body)?;
        require_id(OPERATION, record.id, &body).map(HostId::new)
    }
}
