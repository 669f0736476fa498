//! # Category, Supplier and Customer Commands
//!
//! The small reference records products and sales point at. Each group
//! has `add`, `list` and `delete`; records are addressed by id or name
//! (customers also by phone).

use chrono::Utc;
use clap::{Args, Subcommand};
use serde_json::json;
use tally_core::{Category, Customer, Supplier};
use tracing::info;

use super::{or_dash, table};
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Categories
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum CategoryCommand {
    /// Add a category
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },

    /// List categories with their product counts
    List,

    /// Delete a category; its products become uncategorized
    Delete { key: String },
}

pub async fn run_category(state: &AppState, command: CategoryCommand) -> Result<String, ApiError> {
    match command {
        CategoryCommand::Add { name, description } => {
            let now = Utc::now();
            let category = state
                .db
                .categories()
                .insert(&Category {
                    id: String::new(),
                    name,
                    description,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            info!(id = %category.id, name = %category.name, "Category added");
            state.render(&category, |c| format!("Added category {} ({})", c.name, c.id))
        }
        CategoryCommand::List => {
            let categories = state.db.categories().list().await?;
            let products = state.db.products().list().await?;

            let rows: Vec<Vec<String>> = categories
                .iter()
                .map(|c| {
                    let count = products
                        .iter()
                        .filter(|p| p.category_id.as_deref() == Some(c.id.as_str()))
                        .count();
                    vec![c.name.clone(), count.to_string(), or_dash(&c.description)]
                })
                .collect();

            state.render(&categories, |categories| {
                if categories.is_empty() {
                    return "No categories".to_string();
                }
                table(&["Name", "Products", "Description"], &rows, &[1])
            })
        }
        CategoryCommand::Delete { key } => {
            let category = state
                .db
                .categories()
                .lookup(&key)
                .await?
                .ok_or_else(|| ApiError::not_found("Category", &key))?;
            state.db.categories().delete(&category.id).await?;
            info!(id = %category.id, "Category deleted");
            state.render(&json!({ "deleted": category.id }), |_| {
                format!("Deleted category {}", category.name)
            })
        }
    }
}

// =============================================================================
// Suppliers
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum SupplierCommand {
    /// Add a supplier
    Add(NewSupplier),

    /// List suppliers
    List,

    /// Delete a supplier; its products keep no supplier
    Delete { key: String },
}

#[derive(Debug, Args)]
pub struct NewSupplier {
    pub name: String,
    /// Person to ask for
    #[arg(long)]
    pub contact: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

pub async fn run_supplier(state: &AppState, command: SupplierCommand) -> Result<String, ApiError> {
    match command {
        SupplierCommand::Add(new) => {
            let now = Utc::now();
            let supplier = state
                .db
                .suppliers()
                .insert(&Supplier {
                    id: String::new(),
                    name: new.name,
                    contact_name: new.contact,
                    phone: new.phone,
                    email: new.email,
                    address: new.address,
                    notes: new.notes,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            info!(id = %supplier.id, name = %supplier.name, "Supplier added");
            state.render(&supplier, |s| format!("Added supplier {} ({})", s.name, s.id))
        }
        SupplierCommand::List => {
            let suppliers = state.db.suppliers().list().await?;
            state.render(&suppliers, |suppliers| {
                if suppliers.is_empty() {
                    return "No suppliers".to_string();
                }
                let rows: Vec<Vec<String>> = suppliers
                    .iter()
                    .map(|s| {
                        vec![
                            s.name.clone(),
                            or_dash(&s.contact_name),
                            or_dash(&s.phone),
                            or_dash(&s.email),
                        ]
                    })
                    .collect();
                table(&["Name", "Contact", "Phone", "Email"], &rows, &[])
            })
        }
        SupplierCommand::Delete { key } => {
            let supplier = state
                .db
                .suppliers()
                .lookup(&key)
                .await?
                .ok_or_else(|| ApiError::not_found("Supplier", &key))?;
            state.db.suppliers().delete(&supplier.id).await?;
            info!(id = %supplier.id, "Supplier deleted");
            state.render(&json!({ "deleted": supplier.id }), |_| {
                format!("Deleted supplier {}", supplier.name)
            })
        }
    }
}

// =============================================================================
// Customers
// =============================================================================

#[derive(Debug, Subcommand)]
pub enum CustomerCommand {
    /// Add a customer
    Add(NewCustomer),

    /// List customers, optionally filtered by name, phone or email
    List {
        #[arg(long)]
        search: Option<String>,
    },

    /// Delete a customer; past sales keep no customer
    Delete { key: String },
}

#[derive(Debug, Args)]
pub struct NewCustomer {
    pub name: String,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub email: Option<String>,
    #[arg(long)]
    pub address: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

pub async fn run_customer(state: &AppState, command: CustomerCommand) -> Result<String, ApiError> {
    match command {
        CustomerCommand::Add(new) => {
            let now = Utc::now();
            let customer = state
                .db
                .customers()
                .insert(&Customer {
                    id: String::new(),
                    name: new.name,
                    phone: new.phone,
                    email: new.email,
                    address: new.address,
                    notes: new.notes,
                    created_at: now,
                    updated_at: now,
                })
                .await?;
            info!(id = %customer.id, name = %customer.name, "Customer added");
            state.render(&customer, |c| format!("Added customer {} ({})", c.name, c.id))
        }
        CustomerCommand::List { search } => {
            let customers = match search {
                Some(query) => state.db.customers().search(&query, 100).await?,
                None => state.db.customers().list().await?,
            };
            state.render(&customers, |customers| {
                if customers.is_empty() {
                    return "No customers".to_string();
                }
                let rows: Vec<Vec<String>> = customers
                    .iter()
                    .map(|c| vec![c.name.clone(), or_dash(&c.phone), or_dash(&c.email)])
                    .collect();
                table(&["Name", "Phone", "Email"], &rows, &[])
            })
        }
        CustomerCommand::Delete { key } => {
            let customer = state
                .db
                .customers()
                .lookup(&key)
                .await?
                .ok_or_else(|| ApiError::not_found("Customer", &key))?;
            state.db.customers().delete(&customer.id).await?;
            info!(id = %customer.id, "Customer deleted");
            state.render(&json!({ "deleted": customer.id }), |_| {
                format!("Deleted customer {}", customer.name)
            })
        }
    }
}
