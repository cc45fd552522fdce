use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::NavError;
use crate::models::{CreditRequest, OfferDetails, RemoteRecord};
use crate::payloads::{build_contract_goods_payload, build_contract_payload};
use crate::soap::{normalize_records, NavPage, NavTransport};

/// Single field/value criterion for NAV `ReadMultiple` calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavFilter {
    #[serde(rename = "Field")]
    pub field: String,
    #[serde(rename = "Criteria")]
    pub criteria: String,
}

impl NavFilter {
    pub fn new(field: impl Into<String>, criteria: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            criteria: criteria.into(),
        }
    }

    /// An empty map means no filter. NAV takes one criterion per call, so a
    /// map with several entries is refused instead of silently narrowed.
    pub fn from_map(filter: &HashMap<String, String>) -> Result<Option<Self>, NavError> {
        match filter.len() {
            0 => Ok(None),
            1 => Ok(filter
                .iter()
                .next()
                .map(|(field, criteria)| Self::new(field.as_str(), criteria.as_str()))),
            n => Err(NavError::InvalidFilter(format!(
                "expected a single criterion, got {}",
                n
            ))),
        }
    }

    /// Parses `field=value`.
    pub fn parse(expr: &str) -> Result<Self, NavError> {
        match expr.split_once('=') {
            Some((field, criteria)) if !field.trim().is_empty() => {
                Ok(Self::new(field.trim(), criteria.trim()))
            }
            _ => Err(NavError::InvalidFilter(format!(
                "'{}' is not of the form field=value",
                expr
            ))),
        }
    }
}

/// Contracts and contract goods in NAV.
#[async_trait]
pub trait ContractGateway: Send + Sync {
    /// Creates the contract, attaches goods when the request has products,
    /// then validates it. Goods always go in before validation: NAV only
    /// accepts lines on a draft contract.
    async fn create_contract(
        &self,
        cr: &CreditRequest,
        created_by: &str,
        offer: &OfferDetails,
        vendor_id: &str,
        remote_customer_no: &str,
    ) -> Result<RemoteRecord, NavError>;

    async fn add_contract_goods(
        &self,
        cr: &CreditRequest,
        vendor_id: &str,
        contract_no: &str,
    ) -> Result<Vec<RemoteRecord>, NavError>;

    async fn validate_contract(&self, remote_contract_key: &str) -> Result<(), NavError>;

    async fn get_contract(&self, contract_no: &str) -> Result<Option<RemoteRecord>, NavError>;

    async fn list_contracts(
        &self,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError>;

    async fn delete_contract(&self, remote_contract_key: &str) -> Result<(), NavError>;

    async fn list_contract_goods(
        &self,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError>;

    /// Deletes every goods line matching `filter`; returns the deleted lines.
    async fn delete_contract_goods(
        &self,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError>;
}

/// [`ContractGateway`] backed by the `ContractList` and `ContractGoods` pages.
#[derive(Clone)]
pub struct NavContractService {
    transport: Arc<dyn NavTransport>,
    insurance_vendor_no: String,
}

impl NavContractService {
    pub fn new(transport: Arc<dyn NavTransport>, insurance_vendor_no: impl Into<String>) -> Self {
        Self {
            transport,
            insurance_vendor_no: insurance_vendor_no.into(),
        }
    }

    async fn call(
        &self,
        page: NavPage,
        operation: &str,
        params: Value,
    ) -> Result<Map<String, Value>, NavError> {
        self.transport
            .invoke(page, operation, params)
            .await
            .map_err(|e| {
                e.log(operation);
                e
            })
    }

    async fn read_multiple(
        &self,
        page: NavPage,
        record_element: &str,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError> {
        let params = json!({ "filter": filter, "setSize": page_size });
        let result = self.call(page, "ReadMultiple", params).await?;

        let records = normalize_records(
            result
                .get("ReadMultiple_Result")
                .and_then(|list| list.get(record_element)),
        );
        tracing::debug!(
            page = page.name(),
            "NAV returned {} {} records",
            records.len(),
            record_element
        );
        Ok(records)
    }

    async fn delete_by_key(&self, page: NavPage, key: &str) -> Result<(), NavError> {
        let result = self.call(page, "Delete", json!({ "Key": key })).await?;
        if result.get("Delete_Result").and_then(Value::as_str) == Some("true") {
            Ok(())
        } else {
            let err = NavError::UnexpectedResponse(format!(
                "Error deleting {} record {} from NAV",
                page.name(),
                key
            ));
            err.log("Delete");
            Err(err)
        }
    }
}

fn unexpected(operation: &str, message: &str) -> NavError {
    let err = NavError::UnexpectedResponse(message.to_string());
    err.log(operation);
    err
}

#[async_trait]
impl ContractGateway for NavContractService {
    async fn create_contract(
        &self,
        cr: &CreditRequest,
        created_by: &str,
        offer: &OfferDetails,
        vendor_id: &str,
        remote_customer_no: &str,
    ) -> Result<RemoteRecord, NavError> {
        let payload = build_contract_payload(
            cr,
            created_by,
            offer,
            remote_customer_no,
            &self.insurance_vendor_no,
        )
        .map_err(|e| {
            e.log("Create");
            e
        })?;
        let params = json!({ "ContractList": payload });

        tracing::info!(
            credit_request_id = ?cr.id(),
            customer_no = remote_customer_no,
            "Creating contract in NAV"
        );
        let result = self.call(NavPage::ContractList, "Create", params).await?;

        let mut contract = match result.get("ContractList") {
            Some(Value::Object(fields)) => RemoteRecord::new(fields.clone()),
            _ => return Err(unexpected("Create", "Error adding contract in NAV")),
        };
        let key = contract
            .key()
            .map(str::to_string)
            .ok_or_else(|| unexpected("Create", "NAV contract record has no Key"))?;

        if !cr.products().is_empty() {
            let contract_no = contract
                .get_str("Contract_No")
                .map(str::to_string)
                .ok_or_else(|| unexpected("Create", "NAV contract record has no Contract_No"))?;
            let goods = self.add_contract_goods(cr, vendor_id, &contract_no).await?;
            contract.insert(
                "goods",
                Value::Array(goods.into_iter().map(RemoteRecord::into_value).collect()),
            );
        }

        self.validate_contract(&key).await?;

        tracing::info!(
            credit_request_id = ?cr.id(),
            "NAV contract {} created and validated",
            contract.get_str("Contract_No").unwrap_or_default()
        );
        Ok(contract)
    }

    async fn add_contract_goods(
        &self,
        cr: &CreditRequest,
        vendor_id: &str,
        contract_no: &str,
    ) -> Result<Vec<RemoteRecord>, NavError> {
        let lines = build_contract_goods_payload(cr, vendor_id, contract_no);
        tracing::info!("Attaching {} goods lines to NAV contract {}", lines.len(), contract_no);

        let params = json!({ "ContractGoods_List": { "ContractGoods": lines } });
        let result = self
            .call(NavPage::ContractGoods, "CreateMultiple", params)
            .await?;

        match result.get("ContractGoods_List") {
            Some(list) => Ok(normalize_records(list.get("ContractGoods"))),
            None => Err(unexpected(
                "CreateMultiple",
                "Error adding contract products in NAV",
            )),
        }
    }

    async fn validate_contract(&self, remote_contract_key: &str) -> Result<(), NavError> {
        self.call(
            NavPage::ContractList,
            "ValidateContract",
            json!({ "contract": remote_contract_key }),
        )
        .await?;
        Ok(())
    }

    async fn get_contract(&self, contract_no: &str) -> Result<Option<RemoteRecord>, NavError> {
        let result = self
            .call(
                NavPage::ContractList,
                "ReadByRecId",
                json!({ "recId": format!("Credit Contract: {}", contract_no) }),
            )
            .await?;

        Ok(match result.get("ContractList") {
            Some(Value::Object(fields)) => Some(RemoteRecord::new(fields.clone())),
            _ => None,
        })
    }

    async fn list_contracts(
        &self,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError> {
        self.read_multiple(NavPage::ContractList, "ContractList", filter, page_size)
            .await
    }

    async fn delete_contract(&self, remote_contract_key: &str) -> Result<(), NavError> {
        tracing::info!("Deleting NAV contract {}", remote_contract_key);
        self.delete_by_key(NavPage::ContractList, remote_contract_key)
            .await
    }

    async fn list_contract_goods(
        &self,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError> {
        self.read_multiple(NavPage::ContractGoods, "ContractGoods", filter, page_size)
            .await
    }

    async fn delete_contract_goods(
        &self,
        filter: Option<&NavFilter>,
        page_size: u32,
    ) -> Result<Vec<RemoteRecord>, NavError> {
        let goods = self.list_contract_goods(filter, page_size).await?;

        for line in &goods {
            let key = line
                .key()
                .ok_or_else(|| unexpected("Delete", "NAV goods line has no Key"))?;
            self.delete_by_key(NavPage::ContractGoods, key).await?;
        }

        tracing::info!("Deleted {} NAV goods lines", goods.len());
        Ok(goods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_from_map() {
        let empty = HashMap::new();
        assert_eq!(NavFilter::from_map(&empty).unwrap(), None);

        let mut one = HashMap::new();
        one.insert("Contract_No".to_string(), "CR-1".to_string());
        assert_eq!(
            NavFilter::from_map(&one).unwrap(),
            Some(NavFilter::new("Contract_No", "CR-1"))
        );

        one.insert("Vendor_No".to_string(), "V-1".to_string());
        assert!(matches!(
            NavFilter::from_map(&one),
            Err(NavError::InvalidFilter(_))
        ));
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!(
            NavFilter::parse("Contract_No = CR-1").unwrap(),
            NavFilter::new("Contract_No", "CR-1")
        );
        assert!(NavFilter::parse("Contract_No").is_err());
        assert!(NavFilter::parse("=CR-1").is_err());
    }

    #[test]
    fn test_filter_wire_names() {
        let json = serde_json::to_value(NavFilter::new("No", "C1")).unwrap();
        assert_eq!(json, json!({"Field": "No", "Criteria": "C1"}));
    }
}
