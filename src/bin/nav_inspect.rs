//! Operator tool to read customers, contracts and contract goods from NAV.
//!
//! Usage:
//!   nav_inspect clients
//!   nav_inspect client <no>
//!   nav_inspect contracts [field=value]
//!   nav_inspect contract <no>
//!   nav_inspect goods [field=value]

use serde_json::Value;
use std::env;
use std::sync::Arc;

use credit_nav_api::client_gateway::{ClientGateway, NavClientService};
use credit_nav_api::config::NavConfig;
use credit_nav_api::contract_gateway::{ContractGateway, NavContractService, NavFilter};
use credit_nav_api::models::RemoteRecord;
use credit_nav_api::soap::{NavTransport, SoapTransport};

const USAGE: &str =
    "usage: nav_inspect clients | client <no> | contracts [field=value] | contract <no> | goods [field=value]";

fn print_records(records: Vec<RemoteRecord>) -> anyhow::Result<()> {
    let values: Vec<Value> = records.into_iter().map(RemoteRecord::into_value).collect();
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

fn print_record(record: Option<RemoteRecord>, what: &str, no: &str) -> anyhow::Result<()> {
    match record {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("No {} {} in NAV", what, no),
    }
    Ok(())
}

fn filter_arg(arg: Option<&String>) -> anyhow::Result<Option<NavFilter>> {
    arg.map(|expr| NavFilter::parse(expr))
        .transpose()
        .map_err(anyhow::Error::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "credit_nav_api=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        anyhow::bail!(USAGE);
    };

    let nav = NavConfig::from_env()?;
    let transport: Arc<dyn NavTransport> = Arc::new(SoapTransport::new(&nav)?);
    let clients = NavClientService::new(transport.clone());
    let contracts = NavContractService::new(transport, nav.insurance_vendor_no.clone());

    match (command.as_str(), args.get(1)) {
        ("clients", None) => print_records(clients.list_clients().await?)?,
        ("client", Some(no)) => print_record(clients.get_client(no).await?, "client", no)?,
        ("contracts", filter) => {
            let filter = filter_arg(filter)?;
            print_records(contracts.list_contracts(filter.as_ref(), 0).await?)?
        }
        ("contract", Some(no)) => {
            print_record(contracts.get_contract(no).await?, "contract", no)?
        }
        ("goods", filter) => {
            let filter = filter_arg(filter)?;
            print_records(contracts.list_contract_goods(filter.as_ref(), 0).await?)?
        }
        _ => anyhow::bail!(USAGE),
    }

    Ok(())
}
