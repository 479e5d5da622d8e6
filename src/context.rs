//! Read-only snapshot of business data sent with each inference request.
//!
//! The host application owns the live records; the engine only ever sees an
//! immutable snapshot taken at submission time. Field names serialize in
//! camelCase to match the inference endpoint's JSON contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the business data visible to the assistant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusinessSnapshot {
    /// Completed sales.
    pub sales: Vec<SaleRecord>,
    /// Recorded expenses.
    pub expenses: Vec<ExpenseRecord>,
    /// Product catalogue with stock levels.
    pub products: Vec<ProductRecord>,
    /// Known customers.
    pub customers: Vec<CustomerRecord>,
    /// Application users.
    pub users: Vec<UserRecord>,
    /// Display currency code (e.g. "USD").
    pub currency: String,
    /// Name of the signed-in user, if any.
    pub current_user: Option<String>,
}

/// One completed sale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: String,
    /// Customer the sale is attributed to.
    pub customer: String,
    /// Sale total in the snapshot currency.
    pub total: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One recorded expense.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    pub id: String,
    pub description: String,
    /// Expense amount in the snapshot currency.
    pub amount: f64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// One catalogue product.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    /// Selling price per unit.
    pub price: f64,
    /// Acquisition cost per unit.
    pub cost: f64,
    /// Units currently in stock.
    pub stock: u32,
    /// Stock level at which the product should be reordered.
    pub reorder_level: u32,
}

/// One known customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRecord {
    pub id: String,
    pub name: String,
}

/// One application user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl BusinessSnapshot {
    /// Parse a snapshot from the host application's JSON state.
    ///
    /// Unknown fields are ignored; missing collections default to empty.
    ///
    /// # Errors
    ///
    /// Returns an error if present fields have the wrong shape.
    pub fn from_json(value: serde_json::Value) -> crate::error::Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            crate::error::AssistantError::Config(format!("invalid business snapshot: {e}"))
        })
    }

    /// Sum of all sale totals.
    #[must_use]
    pub fn total_revenue(&self) -> f64 {
        self.sales.iter().map(|s| s.total).sum()
    }

    /// Sum of all expense amounts.
    #[must_use]
    pub fn total_expenses(&self) -> f64 {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    /// Revenue minus expenses.
    #[must_use]
    pub fn net(&self) -> f64 {
        self.total_revenue() - self.total_expenses()
    }
}
