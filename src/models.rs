use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::customer::Customer;
use crate::errors::{NavError, StatusError};
use crate::status::CreditRequestStatus;

// ============ Credit Request ============

/// Kind of financing requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditRequestType {
    /// Financing tied to goods bought from a vendor.
    BuyGoods,
    /// Personal-needs credit.
    Credit,
}

impl CreditRequestType {
    pub fn code(&self) -> u8 {
        match self {
            CreditRequestType::BuyGoods => 1,
            CreditRequestType::Credit => 2,
        }
    }

    /// Contract type name expected by NAV.
    pub fn nav_contract_type(&self) -> &'static str {
        match self {
            CreditRequestType::BuyGoods => "Goods",
            CreditRequestType::Credit => "Personal_Needs",
        }
    }
}

impl TryFrom<u8> for CreditRequestType {
    type Error = NavError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(CreditRequestType::BuyGoods),
            2 => Ok(CreditRequestType::Credit),
            other => Err(NavError::InvalidRequestType(other)),
        }
    }
}

/// Line item financed by a credit request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    id: Option<i64>,
    pub category_id: i64,
    pub name: String,
    price: f64,
    /// Back-reference to the owning request, written only by the request.
    credit_request_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(category_id: i64, name: impl Into<String>, price: f64) -> Result<Self, NavError> {
        if !price.is_finite() || price < 0.0 {
            return Err(NavError::InvalidRequestState(format!(
                "product price must be a non-negative amount, got {}",
                price
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: None,
            category_id,
            name: name.into(),
            price,
            credit_request_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn credit_request_id(&self) -> Option<i64> {
        self.credit_request_id
    }
}

/// Loan terms of a credit request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditRequestDetail {
    pub loan_amount: f64,
    pub down_payment: f64,
    pub installments: u32,
    pub payment_day: u8,
}

/// Contract generated locally for a credit request, before it reaches NAV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalContract {
    pub number: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditRequest {
    id: Option<i64>,
    #[serde(default)]
    status: CreditRequestStatus,
    /// Raw type code as stored; see [`CreditRequest::request_type`].
    #[serde(rename = "type")]
    pub type_code: u8,
    pub order_no: Option<String>,
    pub product_code: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    #[serde(default)]
    products: Vec<Product>,
    customer: Option<Customer>,
    detail: Option<CreditRequestDetail>,
    pub contract: Option<LocalContract>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CreditRequest {
    pub fn new(request_type: CreditRequestType) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            status: CreditRequestStatus::New,
            type_code: request_type.code(),
            order_no: None,
            product_code: None,
            created_by: None,
            assigned_to: None,
            products: Vec::new(),
            customer: None,
            detail: None,
            contract: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Assigns the record id and points every product back at it.
    pub fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
        for product in self.products.iter_mut() {
            product.credit_request_id = Some(id);
        }
    }

    pub fn request_type(&self) -> Result<CreditRequestType, NavError> {
        CreditRequestType::try_from(self.type_code)
    }

    // ---- status ----

    pub fn status(&self) -> CreditRequestStatus {
        self.status
    }

    /// Moves `new` to `in_progress`; no-op in any other state.
    pub fn auto_advance_status(&mut self) {
        let next = self.status.auto_advanced();
        if next != self.status {
            self.status = next;
            self.updated_at = Utc::now();
        }
    }

    pub fn transition_to(&mut self, target: CreditRequestStatus) -> Result<(), StatusError> {
        self.status = self.status.transition(target)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Parses an externally supplied status name, then applies the transition.
    pub fn transition_to_named(&mut self, status: &str) -> Result<(), StatusError> {
        let target: CreditRequestStatus = status.parse()?;
        self.transition_to(target)
    }

    /// Administrative reset for resubmission: drops the identity and puts the
    /// request back at the start of its lifecycle.
    pub fn reset(&mut self) {
        self.clear_identity();
        self.status = CreditRequestStatus::New;
        self.updated_at = Utc::now();
    }

    /// Detaches the identity so the request can be replayed in a simulation.
    pub fn to_simulator(&mut self) {
        self.clear_identity();
    }

    fn clear_identity(&mut self) {
        self.id = None;
        for product in self.products.iter_mut() {
            product.credit_request_id = None;
        }
    }

    // ---- products ----

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Swaps in a new product set. Previous products are detached and
    /// handed back to the caller.
    pub fn replace_products(&mut self, products: Vec<Product>) -> Vec<Product> {
        let mut old = std::mem::take(&mut self.products);
        for product in old.iter_mut() {
            product.credit_request_id = None;
        }
        for product in products {
            self.add_product(product);
        }
        old
    }

    pub fn add_product(&mut self, mut product: Product) -> &mut Self {
        product.credit_request_id = self.id;
        self.products.push(product);
        self
    }

    // ---- owned records ----

    pub fn customer(&self) -> Option<&Customer> {
        self.customer.as_ref()
    }

    pub fn customer_or_create(&mut self) -> &mut Customer {
        self.customer.get_or_insert_with(Customer::default)
    }

    pub fn set_customer(&mut self, customer: Customer) -> &mut Self {
        self.customer = Some(customer);
        self
    }

    pub fn detail(&self) -> Option<&CreditRequestDetail> {
        self.detail.as_ref()
    }

    pub fn detail_or_create(&mut self) -> &mut CreditRequestDetail {
        self.detail.get_or_insert_with(CreditRequestDetail::default)
    }

    pub fn set_detail(&mut self, detail: CreditRequestDetail) -> &mut Self {
        self.detail = Some(detail);
        self
    }
}

// ============ Handoff Inputs ============

/// Offer accepted by the customer, copied onto the NAV contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferDetails {
    pub financial_product: String,
    pub interest: f64,
    pub insurance: f64,
    pub analysis_fee: f64,
    pub aegrm: f64,
    pub broker_fee: f64,
    pub monthly_fee: f64,
}

// ============ NAV Records ============

/// Loosely-typed record returned by NAV (customer, contract, goods line).
///
/// Only a handful of fields are read locally; the rest is passed through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteRecord(Map<String, Value>);

impl RemoteRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Remote key used to address the record in later calls.
    pub fn key(&self) -> Option<&str> {
        self.get_str("Key")
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for RemoteRecord {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product(name: &str, price: f64) -> Product {
        Product::new(1, name, price).unwrap()
    }

    #[test]
    fn test_request_type_codes() {
        assert_eq!(CreditRequestType::try_from(1u8), Ok(CreditRequestType::BuyGoods));
        assert_eq!(CreditRequestType::try_from(2u8), Ok(CreditRequestType::Credit));
        assert_eq!(
            CreditRequestType::try_from(3u8),
            Err(NavError::InvalidRequestType(3))
        );
        assert_eq!(CreditRequestType::BuyGoods.nav_contract_type(), "Goods");
        assert_eq!(CreditRequestType::Credit.nav_contract_type(), "Personal_Needs");
    }

    #[test]
    fn test_negative_price_rejected() {
        assert!(Product::new(1, "TV", -1.0).is_err());
        assert!(Product::new(1, "TV", f64::NAN).is_err());
        assert!(Product::new(1, "Gift", 0.0).is_ok());
    }

    #[test]
    fn test_replace_products_detaches_previous_set() {
        let mut cr = CreditRequest::new(CreditRequestType::BuyGoods);
        cr.assign_id(10);
        cr.add_product(product("Fridge", 1200.0));
        assert_eq!(cr.products()[0].credit_request_id(), Some(10));

        let old = cr.replace_products(vec![product("TV", 900.0), product("Soundbar", 300.0)]);

        assert_eq!(old.len(), 1);
        assert_eq!(old[0].credit_request_id(), None);
        let names: Vec<_> = cr.products().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["TV", "Soundbar"]);
        assert!(cr.products().iter().all(|p| p.credit_request_id() == Some(10)));
    }

    #[test]
    fn test_auto_advance_status() {
        let mut cr = CreditRequest::new(CreditRequestType::Credit);
        assert_eq!(cr.status(), CreditRequestStatus::New);
        cr.auto_advance_status();
        assert_eq!(cr.status(), CreditRequestStatus::InProgress);
        cr.auto_advance_status();
        assert_eq!(cr.status(), CreditRequestStatus::InProgress);
    }

    #[test]
    fn test_transition_to_named_rejects_unknown_status() {
        let mut cr = CreditRequest::new(CreditRequestType::Credit);
        assert_eq!(
            cr.transition_to_named("archived"),
            Err(StatusError::UnknownStatus("archived".into()))
        );
        assert_eq!(cr.status(), CreditRequestStatus::New);
        cr.transition_to_named("canceled").unwrap();
        assert_eq!(cr.status(), CreditRequestStatus::Canceled);
    }

    #[test]
    fn test_reset_clears_identity() {
        let mut cr = CreditRequest::new(CreditRequestType::BuyGoods);
        cr.assign_id(5);
        cr.add_product(product("Laptop", 3000.0));
        cr.auto_advance_status();

        cr.reset();

        assert_eq!(cr.id(), None);
        assert_eq!(cr.status(), CreditRequestStatus::New);
        assert_eq!(cr.products()[0].credit_request_id(), None);
    }

    #[test]
    fn test_to_simulator_keeps_status() {
        let mut cr = CreditRequest::new(CreditRequestType::BuyGoods);
        cr.assign_id(5);
        cr.auto_advance_status();
        cr.to_simulator();
        assert_eq!(cr.id(), None);
        assert_eq!(cr.status(), CreditRequestStatus::InProgress);
    }

    #[test]
    fn test_stored_document_round_trip() {
        let mut cr = CreditRequest::new(CreditRequestType::BuyGoods);
        cr.assign_id(77);
        cr.add_product(product("Phone", 1500.5));
        cr.customer_or_create().first_name = "Maria".into();

        let doc = serde_json::to_value(&cr).unwrap();
        assert_eq!(doc["type"], json!(1));
        assert_eq!(doc["status"], json!("new"));

        let back: CreditRequest = serde_json::from_value(doc).unwrap();
        assert_eq!(back.id(), Some(77));
        assert_eq!(back.products()[0].credit_request_id(), Some(77));
        assert_eq!(back.customer().unwrap().first_name, "Maria");
    }

    #[test]
    fn test_remote_record_accessors() {
        let mut record: RemoteRecord = serde_json::from_value(json!({
            "Key": "12;abc",
            "No": "C0001"
        }))
        .unwrap();
        assert_eq!(record.key(), Some("12;abc"));
        assert_eq!(record.get_str("No"), Some("C0001"));
        assert_eq!(record.get_str("Missing"), None);

        record.insert("goods", json!([]));
        assert_eq!(record.into_value()["goods"], json!([]));
    }
}
