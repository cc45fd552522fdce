use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    #[serde(rename = "m")]
    Male,
    #[serde(rename = "f")]
    Female,
}

/// Postal address attached to an identity document or used for correspondence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub id: Option<i64>,
    pub street: Option<String>,
    pub street_number: Option<String>,
    pub building: Option<String>,
    pub staircase: Option<String>,
    pub floor: Option<String>,
    pub apartment_number: Option<String>,
    pub postal_code: Option<String>,
    pub region_id: Option<i64>,
    pub locality_id: Option<i64>,
}

impl Address {
    /// Labeled address parts in postal order, skipping the empty ones.
    pub fn full_address_fields(&self) -> Vec<(&'static str, &str)> {
        [
            ("Street", self.street.as_deref()),
            ("Number", self.street_number.as_deref()),
            ("Building", self.building.as_deref()),
            ("Staircase", self.staircase.as_deref()),
            ("Floor", self.floor.as_deref()),
            ("Apartment", self.apartment_number.as_deref()),
        ]
        .into_iter()
        .filter_map(|(label, value)| match value {
            Some(v) if !v.trim().is_empty() => Some((label, v)),
            _ => None,
        })
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityCard {
    pub series: Option<String>,
    pub number: Option<String>,
    pub issued_by: Option<String>,
    pub expires_on: Option<NaiveDate>,
    address: Option<Address>,
    customer_id: Option<i64>,
}

impl IdentityCard {
    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn address_or_create(&mut self) -> &mut Address {
        self.address.get_or_insert_with(Address::default)
    }

    pub fn set_address(&mut self, address: Address) -> &mut Self {
        self.address = Some(address);
        self
    }
}

/// Financial detail declared by the customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomerDetail {
    pub monthly_income: Option<f64>,
    pub monthly_expenses: Option<f64>,
    pub dependents: Option<u32>,
    customer_id: Option<i64>,
}

impl CustomerDetail {
    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Employment {
    pub employer_name: Option<String>,
    pub position: Option<String>,
    pub started_on: Option<NaiveDate>,
    customer_id: Option<i64>,
}

impl Employment {
    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfessionalStatus {
    pub status: String,
    pub since: Option<NaiveDate>,
    customer_id: Option<i64>,
}

impl ProfessionalStatus {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Agreement {
    pub terms_accepted: bool,
    pub marketing_accepted: bool,
    pub accepted_at: Option<DateTime<Utc>>,
    customer_id: Option<i64>,
}

impl Agreement {
    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }
}

/// Politically exposed person declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Political {
    pub exposed: bool,
    pub position: Option<String>,
    customer_id: Option<i64>,
}

impl Political {
    pub fn customer_id(&self) -> Option<i64> {
        self.customer_id
    }
}

/// Customer aggregate. Owns every sub-record; each sub-record points back at
/// the customer through `customer_id`, which only the aggregate writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    /// Personal numeric code, sent to NAV as the VAT registration number.
    pub cnp: Option<String>,
    pub mobile_phone: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub correspondence_address: Option<Address>,
    identity_card: Option<IdentityCard>,
    detail: Option<CustomerDetail>,
    employment: Option<Employment>,
    #[serde(default)]
    professional_status: Vec<ProfessionalStatus>,
    /// Set while a batch of professional statuses is being added.
    #[serde(skip)]
    professional_status_dirty: bool,
    agreement: Option<Agreement>,
    political: Option<Political>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Customer {
    fn default() -> Self {
        Self::new("", "")
    }
}

impl Customer {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            cnp: None,
            mobile_phone: None,
            phone: None,
            email: None,
            gender: None,
            correspondence_address: None,
            identity_card: None,
            detail: None,
            employment: None,
            professional_status: Vec::new(),
            professional_status_dirty: false,
            agreement: None,
            political: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Assigns the record id and rewires every sub-record to it.
    pub fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
        if let Some(card) = self.identity_card.as_mut() {
            card.customer_id = Some(id);
        }
        if let Some(detail) = self.detail.as_mut() {
            detail.customer_id = Some(id);
        }
        if let Some(employment) = self.employment.as_mut() {
            employment.customer_id = Some(id);
        }
        for status in self.professional_status.iter_mut() {
            status.customer_id = Some(id);
        }
        if let Some(agreement) = self.agreement.as_mut() {
            agreement.customer_id = Some(id);
        }
        if let Some(political) = self.political.as_mut() {
            political.customer_id = Some(id);
        }
    }

    pub fn full_name(&self) -> String {
        [self.first_name.as_str(), self.last_name.as_str()].join(" ")
    }

    pub fn identity_card(&self) -> Option<&IdentityCard> {
        self.identity_card.as_ref()
    }

    pub fn identity_card_or_create(&mut self) -> &mut IdentityCard {
        let customer_id = self.id;
        self.identity_card.get_or_insert_with(|| IdentityCard {
            customer_id,
            ..Default::default()
        })
    }

    pub fn set_identity_card(&mut self, mut card: IdentityCard) -> &mut Self {
        card.customer_id = self.id;
        self.identity_card = Some(card);
        self
    }

    pub fn detail(&self) -> Option<&CustomerDetail> {
        self.detail.as_ref()
    }

    pub fn detail_or_create(&mut self) -> &mut CustomerDetail {
        let customer_id = self.id;
        self.detail.get_or_insert_with(|| CustomerDetail {
            customer_id,
            ..Default::default()
        })
    }

    pub fn set_detail(&mut self, mut detail: CustomerDetail) -> &mut Self {
        detail.customer_id = self.id;
        self.detail = Some(detail);
        self
    }

    pub fn employment(&self) -> Option<&Employment> {
        self.employment.as_ref()
    }

    pub fn employment_or_create(&mut self) -> &mut Employment {
        let customer_id = self.id;
        self.employment.get_or_insert_with(|| Employment {
            customer_id,
            ..Default::default()
        })
    }

    pub fn set_employment(&mut self, mut employment: Employment) -> &mut Self {
        employment.customer_id = self.id;
        self.employment = Some(employment);
        self
    }

    pub fn agreement(&self) -> Option<&Agreement> {
        self.agreement.as_ref()
    }

    pub fn agreement_or_create(&mut self) -> &mut Agreement {
        let customer_id = self.id;
        self.agreement.get_or_insert_with(|| Agreement {
            customer_id,
            ..Default::default()
        })
    }

    pub fn set_agreement(&mut self, mut agreement: Agreement) -> &mut Self {
        agreement.customer_id = self.id;
        self.agreement = Some(agreement);
        self
    }

    pub fn political(&self) -> Option<&Political> {
        self.political.as_ref()
    }

    pub fn political_or_create(&mut self) -> &mut Political {
        let customer_id = self.id;
        self.political.get_or_insert_with(|| Political {
            customer_id,
            ..Default::default()
        })
    }

    pub fn set_political(&mut self, mut political: Political) -> &mut Self {
        political.customer_id = self.id;
        self.political = Some(political);
        self
    }

    pub fn professional_status(&self) -> &[ProfessionalStatus] {
        &self.professional_status
    }

    /// Adds a status to the current batch. The first addition of a batch
    /// detaches the previous history; call [`Customer::finish_professional_status_batch`]
    /// to close the batch.
    pub fn add_professional_status(&mut self, mut status: ProfessionalStatus) -> &mut Self {
        if self.professional_status.contains(&status) {
            return self;
        }
        if !self.professional_status_dirty {
            for old in self.professional_status.iter_mut() {
                old.customer_id = None;
            }
            self.professional_status.clear();
            self.professional_status_dirty = true;
        }
        status.customer_id = self.id;
        self.professional_status.push(status);
        self
    }

    pub fn finish_professional_status_batch(&mut self) {
        self.professional_status_dirty = false;
    }

    /// Appends to the history without replacing it.
    pub fn push_professional_status(&mut self, mut status: ProfessionalStatus) -> &mut Self {
        status.customer_id = self.id;
        self.professional_status.push(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_address_fields_skips_absent_parts() {
        let address = Address {
            street: Some("Main".into()),
            street_number: Some("12".into()),
            building: Some("B2".into()),
            floor: Some("".into()),
            ..Default::default()
        };
        assert_eq!(
            address.full_address_fields(),
            vec![("Street", "Main"), ("Number", "12"), ("Building", "B2")]
        );
    }

    #[test]
    fn test_full_address_fields_keeps_order() {
        let address = Address {
            apartment_number: Some("7".into()),
            street: Some("Lipscani".into()),
            staircase: Some("A".into()),
            ..Default::default()
        };
        let labels: Vec<_> = address
            .full_address_fields()
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        assert_eq!(labels, vec!["Street", "Staircase", "Apartment"]);
    }

    #[test]
    fn test_or_create_materializes_once_and_wires_back_reference() {
        let mut customer = Customer::new("Ana", "Pop");
        customer.assign_id(42);
        assert!(customer.detail().is_none());

        customer.detail_or_create().monthly_income = Some(5000.0);
        assert_eq!(customer.detail().unwrap().customer_id(), Some(42));

        // Second call returns the existing record untouched
        let detail = customer.detail_or_create();
        assert_eq!(detail.monthly_income, Some(5000.0));
    }

    #[test]
    fn test_setters_wire_back_reference() {
        let mut customer = Customer::new("Ana", "Pop");
        customer.assign_id(7);
        customer.set_political(Political {
            exposed: true,
            ..Default::default()
        });
        assert_eq!(customer.political().unwrap().customer_id(), Some(7));
        assert!(customer.political().unwrap().exposed);
    }

    #[test]
    fn test_assign_id_rewires_existing_children() {
        let mut customer = Customer::new("Ana", "Pop");
        customer.identity_card_or_create();
        customer.agreement_or_create();
        customer.push_professional_status(ProfessionalStatus::new("employee"));
        assert_eq!(customer.identity_card().unwrap().customer_id(), None);

        customer.assign_id(3);
        assert_eq!(customer.identity_card().unwrap().customer_id(), Some(3));
        assert_eq!(customer.agreement().unwrap().customer_id(), Some(3));
        assert_eq!(customer.professional_status()[0].customer_id(), Some(3));
    }

    #[test]
    fn test_professional_status_batch_replaces_history() {
        let mut customer = Customer::new("Ana", "Pop");
        customer.assign_id(1);
        customer.push_professional_status(ProfessionalStatus::new("student"));

        customer
            .add_professional_status(ProfessionalStatus::new("employee"))
            .add_professional_status(ProfessionalStatus::new("freelancer"));
        customer.finish_professional_status_batch();

        let statuses: Vec<_> = customer
            .professional_status()
            .iter()
            .map(|s| s.status.as_str())
            .collect();
        assert_eq!(statuses, vec!["employee", "freelancer"]);

        customer.add_professional_status(ProfessionalStatus::new("retired"));
        assert_eq!(customer.professional_status().len(), 1);
    }

    #[test]
    fn test_full_name() {
        assert_eq!(Customer::new("Ion", "Ionescu").full_name(), "Ion Ionescu");
    }

    #[test]
    fn test_identity_card_address_or_create() {
        let mut customer = Customer::new("Ion", "Ionescu");
        customer
            .identity_card_or_create()
            .address_or_create()
            .postal_code = Some("010101".into());
        assert_eq!(
            customer
                .identity_card()
                .and_then(|card| card.address())
                .and_then(|a| a.postal_code.as_deref()),
            Some("010101")
        );
    }
}
