use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use crate::errors::NavError;
use crate::models::{CreditRequest, RemoteRecord};
use crate::payloads::{build_client_payload, LabelTranslator, PassthroughLabels};
use crate::soap::{normalize_records, NavPage, NavTransport};

/// Customer records in NAV.
#[async_trait]
pub trait ClientGateway: Send + Sync {
    /// Creates the NAV customer for the request's applicant.
    async fn create_client(
        &self,
        cr: &CreditRequest,
        locality_name: &str,
    ) -> Result<RemoteRecord, NavError>;

    /// `None` when NAV has no customer with that number.
    async fn get_client(&self, client_no: &str) -> Result<Option<RemoteRecord>, NavError>;

    async fn list_clients(&self) -> Result<Vec<RemoteRecord>, NavError>;

    async fn delete_client(&self, remote_key: &str) -> Result<(), NavError>;
}

/// [`ClientGateway`] backed by the `CustomerList` page.
#[derive(Clone)]
pub struct NavClientService {
    transport: Arc<dyn NavTransport>,
    labels: Arc<dyn LabelTranslator>,
}

impl NavClientService {
    pub fn new(transport: Arc<dyn NavTransport>) -> Self {
        Self {
            transport,
            labels: Arc::new(PassthroughLabels),
        }
    }

    pub fn with_labels(mut self, labels: Arc<dyn LabelTranslator>) -> Self {
        self.labels = labels;
        self
    }

    async fn call(
        &self,
        operation: &str,
        params: Value,
    ) -> Result<Map<String, Value>, NavError> {
        self.transport
            .invoke(NavPage::CustomerList, operation, params)
            .await
            .map_err(|e| {
                e.log(operation);
                e
            })
    }
}

/// Fails unless NAV returned both the record key and the customer number.
fn created_customer(result: &Map<String, Value>) -> Result<RemoteRecord, NavError> {
    let record = match result.get("CustomerList") {
        Some(Value::Object(fields)) => RemoteRecord::new(fields.clone()),
        _ => {
            return Err(NavError::UnexpectedResponse(
                "Error adding client in NAV".to_string(),
            ))
        }
    };
    if record.key().is_none() || record.get_str("No").is_none() {
        return Err(NavError::UnexpectedResponse(
            "NAV customer record has no Key or No".to_string(),
        ));
    }
    Ok(record)
}

#[async_trait]
impl ClientGateway for NavClientService {
    async fn create_client(
        &self,
        cr: &CreditRequest,
        locality_name: &str,
    ) -> Result<RemoteRecord, NavError> {
        let payload = build_client_payload(cr, locality_name, self.labels.as_ref());
        let params = json!({ "CustomerList": payload });

        tracing::info!(credit_request_id = ?cr.id(), "Creating client in NAV");
        let result = self.call("Create", params).await?;

        let record = created_customer(&result).map_err(|e| {
            e.log("Create");
            e
        })?;
        tracing::info!(
            credit_request_id = ?cr.id(),
            "NAV client {} created",
            record.get_str("No").unwrap_or_default()
        );
        Ok(record)
    }

    async fn get_client(&self, client_no: &str) -> Result<Option<RemoteRecord>, NavError> {
        let result = self
            .call(
                "ReadByRecId",
                json!({ "recId": format!("Customer: {}", client_no) }),
            )
            .await?;

        Ok(match result.get("CustomerList") {
            Some(Value::Object(fields)) => Some(RemoteRecord::new(fields.clone())),
            _ => None,
        })
    }

    async fn list_clients(&self) -> Result<Vec<RemoteRecord>, NavError> {
        let result = self.call("ReadMultiple", json!({ "setSize": 0 })).await?;

        let clients = normalize_records(
            result
                .get("ReadMultiple_Result")
                .and_then(|list| list.get("CustomerList")),
        );
        tracing::debug!("NAV returned {} clients", clients.len());
        Ok(clients)
    }

    async fn delete_client(&self, remote_key: &str) -> Result<(), NavError> {
        tracing::info!("Deleting NAV client {}", remote_key);
        let result = self.call("Delete", json!({ "Key": remote_key })).await?;

        if result.get("Delete_Result").and_then(Value::as_str) == Some("true") {
            Ok(())
        } else {
            let err = NavError::UnexpectedResponse("Error deleting client in NAV".to_string());
            err.log("Delete");
            Err(err)
        }
    }
}
