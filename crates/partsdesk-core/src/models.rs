//! Inventory and service-ticket records
//!
//! Every field that has been observed with more than one wire encoding is
//! marked with the matching lenient decoder. Fields without a marker are
//! decoded strictly.

use serde::{Deserialize, Serialize};

use crate::{lenient, oid};

/// A spare part ("repuesto") held in inventory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparePart {
    #[serde(rename = "_id", default, deserialize_with = "oid::object_id")]
    pub id: Option<String>,

    /// Internal part code; some rows store it as a number
    #[serde(default, deserialize_with = "lenient::string")]
    pub code: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub brand: Option<String>,

    #[serde(default, deserialize_with = "lenient::int")]
    pub stock: Option<i64>,

    #[serde(default, deserialize_with = "lenient::int")]
    pub min_stock: Option<i64>,

    #[serde(default, deserialize_with = "lenient::float")]
    pub price: Option<f64>,

    /// Device models this part fits; older rows use a comma-separated string
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub compatible_models: Vec<String>,

    #[serde(default, deserialize_with = "lenient::string_list")]
    pub tags: Vec<String>,
}

/// A service ticket for a device brought in for repair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTicket {
    #[serde(rename = "_id", default, deserialize_with = "oid::object_id")]
    pub id: Option<String>,

    /// Human-facing ticket number
    #[serde(default, deserialize_with = "lenient::int")]
    pub number: Option<i64>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub status: Option<String>,

    #[serde(default, deserialize_with = "oid::object_id")]
    pub client_id: Option<String>,

    #[serde(default, deserialize_with = "oid::object_id_list")]
    pub technician_ids: Vec<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub device: Option<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub problem: Option<String>,

    /// Identifiers of the spare parts consumed by the repair
    #[serde(default, deserialize_with = "oid::object_id_list")]
    pub part_ids: Vec<String>,

    #[serde(default, deserialize_with = "lenient::float")]
    pub total: Option<f64>,

    #[serde(default, deserialize_with = "lenient::string_list")]
    pub notes: Vec<String>,

    #[serde(default, deserialize_with = "lenient::string")]
    pub created_at: Option<String>,
}
