//! Credit NAV API Library
//!
//! Back office for credit origination: credit request and customer records,
//! the credit request lifecycle, and the handoff of approved requests to the
//! NAV ERP over SOAP.
//!
//! # Modules
//!
//! - `circuit_breaker`: Circuit breaker guarding NAV calls.
//! - `client_gateway`: NAV customer operations.
//! - `config`: Configuration management.
//! - `contract_gateway`: NAV contract and contract goods operations.
//! - `customer`: Customer aggregate and its sub-records.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `handoff`: Ordered, compensating NAV handoff.
//! - `models`: Credit request models and NAV records.
//! - `payloads`: NAV wire payload builders.
//! - `soap`: SOAP transport and XML mapping.
//! - `status`: Credit request status machine.
//! - `store`: Credit request persistence.

pub mod circuit_breaker;
pub mod client_gateway;
pub mod config;
pub mod contract_gateway;
pub mod customer;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod handoff;
pub mod models;
pub mod payloads;
pub mod soap;
pub mod status;
pub mod store;
