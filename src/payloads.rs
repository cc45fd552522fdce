//! Wire payloads for the NAV pages.
//!
//! Everything here is pure: a credit request (plus caller input) goes in, a
//! serializable payload comes out. Field names follow the NAV page schemas.

use serde::Serialize;

use crate::errors::NavError;
use crate::models::{CreditRequest, OfferDetails};

pub const COUNTRY_CODE: &str = "RO";
pub const CONTRACT_STATUS: &str = "Draft";
pub const PAYMENT_SCHEDULE_TYPE: &str = "Equal";
/// Empty currency code means the company's local currency.
pub const CURRENCY_CODE: &str = "";
pub const EXCHANGE_RATE: u32 = 1;

/// Address lines in NAV hold at most this many characters.
pub const ADDRESS_LINE_WIDTH: usize = 50;

/// Renders address labels in the operator's language.
pub trait LabelTranslator: Send + Sync {
    fn label(&self, label: &str) -> String;
}

/// Leaves labels untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughLabels;

impl LabelTranslator for PassthroughLabels {
    fn label(&self, label: &str) -> String {
        label.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientPayload {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Address_2")]
    pub address_2: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "Phone_No")]
    pub phone_no: Option<String>,
    #[serde(rename = "VAT_Registration_No")]
    pub vat_registration_no: Option<String>,
    #[serde(rename = "Post_Code")]
    pub post_code: Option<String>,
    #[serde(rename = "County")]
    pub county: &'static str,
    #[serde(rename = "E_Mail")]
    pub e_mail: Option<String>,
    #[serde(rename = "Country_Region_Code")]
    pub country_region_code: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractPayload {
    #[serde(rename = "Contract_No")]
    pub contract_no: String,
    #[serde(rename = "Contract_Date")]
    pub contract_date: String,
    #[serde(rename = "Contract_Status")]
    pub contract_status: &'static str,
    #[serde(rename = "Customer_No")]
    pub customer_no: String,
    #[serde(rename = "Responsible_Employee")]
    pub responsible_employee: String,
    #[serde(rename = "Payment_Schedule_Type")]
    pub payment_schedule_type: &'static str,
    #[serde(rename = "No_of_Installments")]
    pub no_of_installments: u32,
    #[serde(rename = "Payment_Day_of_Month")]
    pub payment_day_of_month: u8,
    #[serde(rename = "Contract_Type")]
    pub contract_type: &'static str,
    #[serde(rename = "Financial_Product")]
    pub financial_product: String,
    #[serde(rename = "Currency_Code")]
    pub currency_code: &'static str,
    #[serde(rename = "Exchange_Rate")]
    pub exchange_rate: u32,
    /// Only meaningful for goods contracts; NAV derives it from the lines.
    #[serde(rename = "Item_Price")]
    pub item_price: u32,
    #[serde(rename = "Funded_Amount")]
    pub funded_amount: f64,
    #[serde(rename = "Advance_Percent")]
    pub advance_percent: f64,
    #[serde(rename = "Interest")]
    pub interest: f64,
    #[serde(rename = "Insurance_Percent")]
    pub insurance_percent: f64,
    #[serde(rename = "Analysis_Fee")]
    pub analysis_fee: f64,
    #[serde(rename = "AEGRM")]
    pub aegrm: f64,
    #[serde(rename = "Broker_Fee")]
    pub broker_fee: f64,
    #[serde(rename = "Monthly_Fee")]
    pub monthly_fee: f64,
    #[serde(rename = "Insurance_Vendor_No")]
    pub insurance_vendor_no: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContractGoodsLine {
    #[serde(rename = "Contract_No")]
    pub contract_no: String,
    #[serde(rename = "Line_No")]
    pub line_no: usize,
    #[serde(rename = "Object")]
    pub object: String,
    #[serde(rename = "Quantity")]
    pub quantity: u32,
    #[serde(rename = "Amount")]
    pub amount: f64,
    #[serde(rename = "Vendor_No")]
    pub vendor_no: String,
    #[serde(rename = "Description")]
    pub description: String,
}

/// `down_payment * 100 / loan_amount`; a non-positive loan amount is refused.
pub fn advance_percent(down_payment: f64, loan_amount: f64) -> Result<f64, NavError> {
    if !loan_amount.is_finite() || loan_amount <= 0.0 {
        return Err(NavError::InvalidRequestState(format!(
            "loan amount must be positive to compute the advance percent, got {}",
            loan_amount
        )));
    }
    Ok(down_payment * 100.0 / loan_amount)
}

/// Joins `Label value` segments with ", ".
pub fn compose_address(fields: &[(&str, &str)], labels: &dyn LabelTranslator) -> String {
    fields
        .iter()
        .map(|(label, value)| format!("{} {}", labels.label(label), value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Greedy word wrap on any whitespace, which is folded into single spaces.
/// Words longer than `width` keep a line of their own and are never split.
pub fn wrap_words(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

pub fn build_client_payload(
    cr: &CreditRequest,
    locality_name: &str,
    labels: &dyn LabelTranslator,
) -> ClientPayload {
    let customer = cr.customer();
    let address = customer
        .and_then(|c| c.identity_card())
        .and_then(|card| card.address());

    let full_address = address
        .map(|a| compose_address(&a.full_address_fields(), labels))
        .unwrap_or_default();
    let mut lines = wrap_words(&full_address, ADDRESS_LINE_WIDTH).into_iter();

    ClientPayload {
        name: customer.map(|c| c.full_name()).unwrap_or_default(),
        address: lines.next().unwrap_or_default(),
        address_2: lines.next().unwrap_or_default(),
        city: locality_name.to_string(),
        phone_no: customer.and_then(|c| c.phone.clone()),
        vat_registration_no: customer.and_then(|c| c.cnp.clone()),
        post_code: address.and_then(|a| a.postal_code.clone()),
        county: COUNTRY_CODE,
        e_mail: customer.and_then(|c| c.email.clone()),
        country_region_code: COUNTRY_CODE,
    }
}

pub fn build_contract_payload(
    cr: &CreditRequest,
    created_by: &str,
    offer: &OfferDetails,
    remote_customer_no: &str,
    insurance_vendor_no: &str,
) -> Result<ContractPayload, NavError> {
    let contract_type = cr.request_type()?.nav_contract_type();
    let contract = cr.contract.as_ref().ok_or_else(|| {
        NavError::InvalidRequestState("credit request has no local contract".to_string())
    })?;
    let detail = cr.detail().cloned().unwrap_or_default();

    Ok(ContractPayload {
        contract_no: contract.number.clone(),
        contract_date: contract.created_at.format("%Y-%m-%d").to_string(),
        contract_status: CONTRACT_STATUS,
        customer_no: remote_customer_no.to_string(),
        responsible_employee: created_by.to_string(),
        payment_schedule_type: PAYMENT_SCHEDULE_TYPE,
        no_of_installments: detail.installments,
        payment_day_of_month: detail.payment_day,
        contract_type,
        financial_product: offer.financial_product.clone(),
        currency_code: CURRENCY_CODE,
        exchange_rate: EXCHANGE_RATE,
        item_price: 0,
        funded_amount: detail.loan_amount,
        advance_percent: advance_percent(detail.down_payment, detail.loan_amount)?,
        interest: offer.interest,
        insurance_percent: offer.insurance,
        analysis_fee: offer.analysis_fee,
        aegrm: offer.aegrm,
        broker_fee: offer.broker_fee,
        monthly_fee: offer.monthly_fee,
        insurance_vendor_no: insurance_vendor_no.to_string(),
    })
}

/// One line per product, numbered from zero in collection order.
pub fn build_contract_goods_payload(
    cr: &CreditRequest,
    vendor_id: &str,
    contract_no: &str,
) -> Vec<ContractGoodsLine> {
    cr.products()
        .iter()
        .enumerate()
        .map(|(line_no, product)| ContractGoodsLine {
            contract_no: contract_no.to_string(),
            line_no,
            object: product.name.clone(),
            quantity: 1,
            amount: product.price(),
            vendor_no: vendor_id.to_string(),
            description: product.name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::customer::{Address, Customer};
    use crate::models::{CreditRequestDetail, CreditRequestType, LocalContract, Product};
    use chrono::{TimeZone, Utc};

    struct RomanianLabels;

    impl LabelTranslator for RomanianLabels {
        fn label(&self, label: &str) -> String {
            match label {
                "Street" => "Str.".to_string(),
                "Number" => "Nr.".to_string(),
                other => other.to_string(),
            }
        }
    }

    fn offer() -> OfferDetails {
        OfferDetails {
            financial_product: "CREDIT-12".into(),
            interest: 12.5,
            insurance: 0.3,
            analysis_fee: 50.0,
            aegrm: 30.0,
            broker_fee: 0.0,
            monthly_fee: 10.0,
        }
    }

    fn request_with_customer() -> CreditRequest {
        let mut cr = CreditRequest::new(CreditRequestType::BuyGoods);
        let mut customer = Customer::new("Ion", "Popescu");
        customer.cnp = Some("1800101123456".into());
        customer.phone = Some("0212223344".into());
        customer.email = Some("ion@example.ro".into());
        *customer.identity_card_or_create().address_or_create() = Address {
            street: Some("Main".into()),
            street_number: Some("12".into()),
            building: Some("B2".into()),
            postal_code: Some("010101".into()),
            ..Default::default()
        };
        cr.set_customer(customer);
        cr.set_detail(CreditRequestDetail {
            loan_amount: 10000.0,
            down_payment: 2000.0,
            installments: 24,
            payment_day: 15,
        });
        cr.contract = Some(LocalContract {
            number: "CR-2024-0001".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 10, 30, 0).unwrap(),
        });
        cr
    }

    #[test]
    fn test_advance_percent() {
        assert_eq!(advance_percent(2000.0, 10000.0).unwrap(), 20.0);
        assert_eq!(advance_percent(0.0, 10000.0).unwrap(), 0.0);
        assert!(matches!(
            advance_percent(2000.0, 0.0),
            Err(NavError::InvalidRequestState(_))
        ));
    }

    #[test]
    fn test_compose_address_skips_absent_fields() {
        let address = Address {
            street: Some("Main".into()),
            street_number: Some("12".into()),
            building: Some("B2".into()),
            ..Default::default()
        };
        let composed = compose_address(&address.full_address_fields(), &PassthroughLabels);
        assert_eq!(composed, "Street Main, Number 12, Building B2");

        let translated = compose_address(&address.full_address_fields(), &RomanianLabels);
        assert_eq!(translated, "Str. Main, Nr. 12, Building B2");
    }

    #[test]
    fn test_wrap_words() {
        assert_eq!(wrap_words("", 50), Vec::<String>::new());
        assert_eq!(wrap_words("one two three", 7), vec!["one two", "three"]);
        assert_eq!(
            wrap_words("a verylongwordthatdoesnotfit b", 5),
            vec!["a", "verylongwordthatdoesnotfit", "b"]
        );
    }

    #[test]
    fn test_wrap_words_breaks_on_tabs_and_newlines() {
        let text = format!("{}\t{}\n{}", "a".repeat(30), "b".repeat(30), "c".repeat(10));
        let lines = wrap_words(&text, ADDRESS_LINE_WIDTH);

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "a".repeat(30));
        assert_eq!(lines[1], format!("{} {}", "b".repeat(30), "c".repeat(10)));
        for line in &lines {
            assert!(line.chars().count() <= ADDRESS_LINE_WIDTH);
            assert!(!line.contains(&['\t', '\n'][..]));
        }
    }

    #[test]
    fn test_client_payload() {
        let cr = request_with_customer();
        let payload = build_client_payload(&cr, "Bucuresti", &PassthroughLabels);

        assert_eq!(payload.name, "Ion Popescu");
        assert_eq!(payload.address, "Street Main, Number 12, Building B2");
        assert_eq!(payload.address_2, "");
        assert_eq!(payload.city, "Bucuresti");
        assert_eq!(payload.post_code.as_deref(), Some("010101"));
        assert_eq!(payload.vat_registration_no.as_deref(), Some("1800101123456"));
        assert_eq!(payload.county, "RO");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["Country_Region_Code"], "RO");
        assert_eq!(json["E_Mail"], "ion@example.ro");
    }

    #[test]
    fn test_client_payload_truncates_long_address() {
        let mut cr = request_with_customer();
        let address = cr
            .customer_or_create()
            .identity_card_or_create()
            .address_or_create();
        address.street = Some("Bulevardul Mareșal Constantin Prezan Foarte Lung".into());
        address.staircase = Some("Scara Principala Din Spate".into());
        address.floor = Some("Etajul Al Doisprezecelea".into());
        address.apartment_number = Some("Apartamentul Numarul O Suta Douazeci".into());

        let payload = build_client_payload(&cr, "Cluj", &PassthroughLabels);

        assert!(payload.address.chars().count() <= ADDRESS_LINE_WIDTH);
        assert!(payload.address_2.chars().count() <= ADDRESS_LINE_WIDTH);
        assert!(!payload.address_2.is_empty());
    }

    #[test]
    fn test_client_payload_without_customer() {
        let cr = CreditRequest::new(CreditRequestType::Credit);
        let payload = build_client_payload(&cr, "Iasi", &PassthroughLabels);
        assert_eq!(payload.name, "");
        assert_eq!(payload.address, "");
        assert_eq!(payload.phone_no, None);
    }

    #[test]
    fn test_contract_payload() {
        let cr = request_with_customer();
        let payload = build_contract_payload(&cr, "agent-7", &offer(), "C0001", "FZ-000003").unwrap();

        assert_eq!(payload.contract_no, "CR-2024-0001");
        assert_eq!(payload.contract_date, "2024-03-09");
        assert_eq!(payload.contract_status, "Draft");
        assert_eq!(payload.customer_no, "C0001");
        assert_eq!(payload.responsible_employee, "agent-7");
        assert_eq!(payload.contract_type, "Goods");
        assert_eq!(payload.advance_percent, 20.0);
        assert_eq!(payload.funded_amount, 10000.0);
        assert_eq!(payload.no_of_installments, 24);
        assert_eq!(payload.insurance_percent, 0.3);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["Payment_Schedule_Type"], "Equal");
        assert_eq!(json["Currency_Code"], "");
        assert_eq!(json["Exchange_Rate"], 1);
        assert_eq!(json["Item_Price"], 0);
        assert_eq!(json["Insurance_Vendor_No"], "FZ-000003");
    }

    #[test]
    fn test_contract_payload_preconditions() {
        let mut cr = request_with_customer();
        cr.type_code = 9;
        assert_eq!(
            build_contract_payload(&cr, "agent", &offer(), "C1", "FZ").unwrap_err(),
            NavError::InvalidRequestType(9)
        );

        let mut cr = request_with_customer();
        cr.contract = None;
        assert!(matches!(
            build_contract_payload(&cr, "agent", &offer(), "C1", "FZ"),
            Err(NavError::InvalidRequestState(_))
        ));

        let mut cr = request_with_customer();
        cr.detail_or_create().loan_amount = 0.0;
        assert!(matches!(
            build_contract_payload(&cr, "agent", &offer(), "C1", "FZ"),
            Err(NavError::InvalidRequestState(_))
        ));
    }

    #[test]
    fn test_goods_lines_numbered_in_order() {
        let mut cr = request_with_customer();
        cr.add_product(Product::new(3, "Fridge", 1200.0).unwrap());
        cr.add_product(Product::new(4, "Oven", 800.0).unwrap());

        let lines = build_contract_goods_payload(&cr, "V-100", "NAV-C-9");

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line_no, 0);
        assert_eq!(lines[0].object, "Fridge");
        assert_eq!(lines[1].line_no, 1);
        assert_eq!(lines[1].amount, 800.0);
        assert!(lines
            .iter()
            .all(|l| l.quantity == 1 && l.vendor_no == "V-100" && l.contract_no == "NAV-C-9"));
    }
}
