//! Handoff of an approved credit request to NAV.
//!
//! The steps run strictly in order: create the customer, then the contract
//! (which attaches goods and validates on the NAV side). When the contract
//! fails after the customer exists, the customer is deleted again. A failed
//! compensation is logged for manual cleanup and does not change what the
//! caller is told.

use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::client_gateway::ClientGateway;
use crate::contract_gateway::ContractGateway;
use crate::errors::NavError;
use crate::models::{CreditRequest, OfferDetails, RemoteRecord};

/// Progress of a single handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStage {
    NotStarted,
    ClientCreated,
    ContractCreated,
    GoodsAttached,
    Validated,
    Done,
}

impl HandoffStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffStage::NotStarted => "not_started",
            HandoffStage::ClientCreated => "client_created",
            HandoffStage::ContractCreated => "contract_created",
            HandoffStage::GoodsAttached => "goods_attached",
            HandoffStage::Validated => "validated",
            HandoffStage::Done => "done",
        }
    }
}

impl fmt::Display for HandoffStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandoffFailureReason {
    MissingCreditRequest,
    MissingOfferDetails,
    ClientCreationFailed,
    ContractCreationFailed,
}

impl HandoffFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandoffFailureReason::MissingCreditRequest => "missing-credit-request",
            HandoffFailureReason::MissingOfferDetails => "missing-offer-details",
            HandoffFailureReason::ClientCreationFailed => "client-creation-failed",
            HandoffFailureReason::ContractCreationFailed => "contract-creation-failed",
        }
    }
}

/// Terminal failure of a handoff.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffFailure {
    pub reason: HandoffFailureReason,
    /// A compensating delete of the NAV customer was issued.
    pub compensated: bool,
    /// The compensating delete itself failed; the NAV customer is orphaned.
    pub compensation_failed: bool,
    pub cause: Option<NavError>,
}

impl HandoffFailure {
    fn missing(reason: HandoffFailureReason) -> Self {
        Self {
            reason,
            compensated: false,
            compensation_failed: false,
            cause: None,
        }
    }

    /// Caller-facing message.
    pub fn message(&self) -> &'static str {
        match self.reason {
            HandoffFailureReason::MissingCreditRequest => "Credit Request not properly defined!",
            HandoffFailureReason::MissingOfferDetails => {
                "Credit request offer not properly defined!"
            }
            HandoffFailureReason::ClientCreationFailed => "Creating client in NAV failed!",
            HandoffFailureReason::ContractCreationFailed => "Creating contract in NAV failed!",
        }
    }

    /// Every failure is reported to callers as HTTP 500.
    pub fn status_code(&self) -> u16 {
        500
    }
}

impl fmt::Display for HandoffFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for HandoffFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Input of one handoff. The request and offer are optional so that a
/// missing one is reported as a handoff failure rather than a decode error.
#[derive(Debug, Clone)]
pub struct HandoffRequest {
    pub credit_request: Option<CreditRequest>,
    pub offer_details: Option<OfferDetails>,
    pub created_by: String,
    pub locality_name: String,
    pub vendor_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HandoffSuccess {
    pub client: RemoteRecord,
    pub contract: RemoteRecord,
    /// Stages passed through, in order.
    pub stages: Vec<HandoffStage>,
}

impl HandoffSuccess {
    pub fn to_json(&self) -> Value {
        json!({
            "navClient": self.client,
            "navContract": self.contract,
        })
    }
}

pub struct HandoffOrchestrator {
    clients: Arc<dyn ClientGateway>,
    contracts: Arc<dyn ContractGateway>,
}

impl HandoffOrchestrator {
    pub fn new(clients: Arc<dyn ClientGateway>, contracts: Arc<dyn ContractGateway>) -> Self {
        Self { clients, contracts }
    }

    pub async fn run(&self, request: HandoffRequest) -> Result<HandoffSuccess, HandoffFailure> {
        let handoff_id = Uuid::new_v4();

        let Some(cr) = request.credit_request.as_ref() else {
            tracing::warn!(%handoff_id, "Handoff refused: no credit request");
            return Err(HandoffFailure::missing(
                HandoffFailureReason::MissingCreditRequest,
            ));
        };
        let Some(offer) = request.offer_details.as_ref() else {
            tracing::warn!(%handoff_id, credit_request_id = ?cr.id(), "Handoff refused: no offer details");
            return Err(HandoffFailure::missing(
                HandoffFailureReason::MissingOfferDetails,
            ));
        };

        tracing::info!(%handoff_id, credit_request_id = ?cr.id(), "Starting NAV handoff");
        let mut stages = vec![HandoffStage::NotStarted];

        let client = self
            .clients
            .create_client(cr, &request.locality_name)
            .await
            .map_err(|e| {
                tracing::error!(%handoff_id, credit_request_id = ?cr.id(), "Creating client in NAV failed: {}", e);
                HandoffFailure {
                    reason: HandoffFailureReason::ClientCreationFailed,
                    compensated: false,
                    compensation_failed: false,
                    cause: Some(e),
                }
            })?;
        stages.push(HandoffStage::ClientCreated);

        let contract_result = match client.get_str("No") {
            Some(customer_no) => {
                self.contracts
                    .create_contract(cr, &request.created_by, offer, &request.vendor_id, customer_no)
                    .await
            }
            None => Err(NavError::UnexpectedResponse(
                "NAV customer record has no No".to_string(),
            )),
        };

        let contract = match contract_result {
            Ok(contract) => contract,
            Err(e) => {
                tracing::error!(%handoff_id, credit_request_id = ?cr.id(), "Creating contract in NAV failed: {}", e);
                let compensation_failed = !self.compensate(handoff_id, &client).await;
                return Err(HandoffFailure {
                    reason: HandoffFailureReason::ContractCreationFailed,
                    compensated: true,
                    compensation_failed,
                    cause: Some(e),
                });
            }
        };

        stages.push(HandoffStage::ContractCreated);
        if contract.get("goods").is_some() {
            stages.push(HandoffStage::GoodsAttached);
        }
        stages.push(HandoffStage::Validated);
        stages.push(HandoffStage::Done);

        tracing::info!(%handoff_id, credit_request_id = ?cr.id(), "NAV handoff done");
        Ok(HandoffSuccess {
            client,
            contract,
            stages,
        })
    }

    /// Deletes the customer created earlier in this handoff. Returns false
    /// when the customer is left behind in NAV.
    async fn compensate(&self, handoff_id: Uuid, client: &RemoteRecord) -> bool {
        let Some(key) = client.key() else {
            tracing::error!(
                %handoff_id,
                alert = "manual-cleanup-required",
                client_no = client.get_str("No").unwrap_or_default(),
                "NAV client has no key, cannot delete it"
            );
            return false;
        };

        match self.clients.delete_client(key).await {
            Ok(()) => {
                tracing::warn!(%handoff_id, remote_client_key = key, "NAV client deleted after contract failure");
                true
            }
            Err(e) => {
                tracing::error!(
                    %handoff_id,
                    alert = "manual-cleanup-required",
                    remote_client_key = key,
                    "Deleting orphaned NAV client failed: {}",
                    e
                );
                false
            }
        }
    }
}
