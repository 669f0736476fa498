//! # Data Transfer
//!
//! Export file envelope and import conflict resolution.
//!
//! ## File Format
//! ```text
//! {
//!   "version": "1.0",
//!   "dataType": "products" | "customers" | "suppliers" | "categories" | "sales" | "all",
//!   "exportedAt": "2026-03-07T10:15:00Z",
//!   "data": [ ...records... ]          // or {categories, suppliers, products, customers} for "all"
//! }
//! ```
//!
//! ## Import Matching
//! ```text
//! incoming record
//!      │ validate ──── fails ──► error tally (index + message)
//!      ▼
//!  match by id ──► match by name (trimmed, case-insensitive) ──► match by alternate key
//!      │                                                        (barcode / phone)
//!      ├── matched,  Overwrite    ──► Update (existing id + created_at kept)
//!      ├── matched,  KeepExisting ──► Skip
//!      └── no match               ──► Insert (blank id gets a fresh UUID)
//! ```
//!
//! Records inserted or updated earlier in the same batch take part in
//! matching, so a file that lists the same product twice yields one row.
//! Resolution is pure; `tally-db` applies the resulting plan.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::TransferError;
use crate::types::{Category, Customer, Product, Supplier};
use crate::validation::{
    validate_category, validate_customer, validate_product, validate_supplier, ValidationResult,
};

/// Version written into every export file.
pub const EXPORT_FORMAT_VERSION: &str = "1.0";

/// Major version this build can read.
const SUPPORTED_MAJOR: &str = "1";

// =============================================================================
// Data Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Products,
    Customers,
    Suppliers,
    Categories,
    Sales,
    All,
}

impl DataType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            DataType::Products => "products",
            DataType::Customers => "customers",
            DataType::Suppliers => "suppliers",
            DataType::Categories => "categories",
            DataType::Sales => "sales",
            DataType::All => "all",
        }
    }

    /// Whether files of this type can be read back by `import`.
    pub fn is_importable(&self) -> bool {
        !matches!(self, DataType::Sales)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "products" => Ok(DataType::Products),
            "customers" => Ok(DataType::Customers),
            "suppliers" => Ok(DataType::Suppliers),
            "categories" => Ok(DataType::Categories),
            "sales" => Ok(DataType::Sales),
            "all" => Ok(DataType::All),
            other => Err(TransferError::UnsupportedDataType(other.to_string())),
        }
    }
}

// =============================================================================
// Envelope
// =============================================================================

/// Wrapper written around every exported payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportEnvelope<T> {
    pub version: String,
    pub data_type: DataType,
    pub exported_at: DateTime<Utc>,
    pub data: T,
}

impl<T: Serialize> ExportEnvelope<T> {
    pub fn new(data_type: DataType, data: T, exported_at: DateTime<Utc>) -> Self {
        ExportEnvelope {
            version: EXPORT_FORMAT_VERSION.to_string(),
            data_type,
            exported_at,
            data,
        }
    }

    pub fn to_json(&self) -> Result<String, TransferError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Payload of a full backup (`dataType: "all"`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub suppliers: Vec<Supplier>,
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub customers: Vec<Customer>,
}

/// Decoded import file.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportPayload {
    Products(Vec<Product>),
    Customers(Vec<Customer>),
    Suppliers(Vec<Supplier>),
    Categories(Vec<Category>),
    All(Bundle),
}

impl ImportPayload {
    pub fn data_type(&self) -> DataType {
        match self {
            ImportPayload::Products(_) => DataType::Products,
            ImportPayload::Customers(_) => DataType::Customers,
            ImportPayload::Suppliers(_) => DataType::Suppliers,
            ImportPayload::Categories(_) => DataType::Categories,
            ImportPayload::All(_) => DataType::All,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    version: String,
    data_type: String,
    data: serde_json::Value,
}

/// Parses an import file.
///
/// ```rust
/// use tally_core::transfer::{parse_envelope, ImportPayload};
///
/// let json = r#"{"version":"1.0","dataType":"categories","exportedAt":"2026-01-01T00:00:00Z",
///               "data":[{"name":"Drinks"}]}"#;
/// match parse_envelope(json).unwrap() {
///     ImportPayload::Categories(c) => assert_eq!(c[0].name, "Drinks"),
///     _ => unreachable!(),
/// }
/// ```
pub fn parse_envelope(json: &str) -> Result<ImportPayload, TransferError> {
    let raw: RawEnvelope = serde_json::from_str(json)?;

    let major = raw.version.trim().split('.').next().unwrap_or_default();
    if major != SUPPORTED_MAJOR {
        return Err(TransferError::UnsupportedVersion(raw.version));
    }

    let data_type: DataType = raw.data_type.parse()?;
    let payload = match data_type {
        DataType::Products => ImportPayload::Products(decode(data_type, raw.data)?),
        DataType::Customers => ImportPayload::Customers(decode(data_type, raw.data)?),
        DataType::Suppliers => ImportPayload::Suppliers(decode(data_type, raw.data)?),
        DataType::Categories => ImportPayload::Categories(decode(data_type, raw.data)?),
        DataType::All => ImportPayload::All(decode(data_type, raw.data)?),
        DataType::Sales => {
            return Err(TransferError::UnsupportedDataType(data_type.to_string()));
        }
    };

    Ok(payload)
}

fn decode<T: DeserializeOwned>(
    data_type: DataType,
    data: serde_json::Value,
) -> Result<T, TransferError> {
    serde_json::from_value(data).map_err(|e| TransferError::PayloadMismatch {
        data_type: data_type.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Import Record Trait
// =============================================================================

/// A record type that can be matched and merged during import.
pub trait ImportRecord: Clone {
    /// Singular noun used in messages ("product").
    const KIND: &'static str;

    fn record_id(&self) -> &str;

    fn record_name(&self) -> &str;

    /// Secondary unique key, normalized for comparison.
    fn alternate_key(&self) -> Option<String> {
        None
    }

    fn validate(&self) -> ValidationResult<()>;

    /// Incoming values laid over `existing`: id and `created_at` come from
    /// `existing`, blank optional fields do not erase existing values.
    fn merged_onto(&self, existing: &Self, now: DateTime<Utc>) -> Self;

    fn with_id(self, id: String) -> Self;
}

fn keep_existing(incoming: &Option<String>, existing: &Option<String>) -> Option<String> {
    match incoming.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Some(v.to_string()),
        _ => existing.clone(),
    }
}

fn normalized_phone(phone: &Option<String>) -> Option<String> {
    let digits: String = phone
        .as_deref()?
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    (!digits.is_empty()).then_some(digits)
}

impl ImportRecord for Product {
    const KIND: &'static str = "product";

    fn record_id(&self) -> &str {
        &self.id
    }

    fn record_name(&self) -> &str {
        &self.name
    }

    fn alternate_key(&self) -> Option<String> {
        let barcode = self.barcode.as_deref()?.trim();
        (!barcode.is_empty()).then(|| barcode.to_string())
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_product(self)
    }

    /// Stock on hand is not taken from the file for existing products;
    /// quantity changes go through stock movements.
    fn merged_onto(&self, existing: &Self, now: DateTime<Utc>) -> Self {
        Product {
            id: existing.id.clone(),
            name: self.name.trim().to_string(),
            barcode: keep_existing(&self.barcode, &existing.barcode),
            description: keep_existing(&self.description, &existing.description),
            price_cents: self.price_cents,
            cost_cents: self.cost_cents,
            quantity: existing.quantity,
            min_stock: self.min_stock,
            category_id: keep_existing(&self.category_id, &existing.category_id),
            supplier_id: keep_existing(&self.supplier_id, &existing.supplier_id),
            bulk_pricing: self.bulk_pricing.clone(),
            created_at: existing.created_at,
            updated_at: now,
        }
    }

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

impl ImportRecord for Customer {
    const KIND: &'static str = "customer";

    fn record_id(&self) -> &str {
        &self.id
    }

    fn record_name(&self) -> &str {
        &self.name
    }

    fn alternate_key(&self) -> Option<String> {
        normalized_phone(&self.phone)
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_customer(self)
    }

    fn merged_onto(&self, existing: &Self, now: DateTime<Utc>) -> Self {
        Customer {
            id: existing.id.clone(),
            name: self.name.trim().to_string(),
            phone: keep_existing(&self.phone, &existing.phone),
            email: keep_existing(&self.email, &existing.email),
            address: keep_existing(&self.address, &existing.address),
            notes: keep_existing(&self.notes, &existing.notes),
            created_at: existing.created_at,
            updated_at: now,
        }
    }

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

impl ImportRecord for Supplier {
    const KIND: &'static str = "supplier";

    fn record_id(&self) -> &str {
        &self.id
    }

    fn record_name(&self) -> &str {
        &self.name
    }

    fn alternate_key(&self) -> Option<String> {
        normalized_phone(&self.phone)
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_supplier(self)
    }

    fn merged_onto(&self, existing: &Self, now: DateTime<Utc>) -> Self {
        Supplier {
            id: existing.id.clone(),
            name: self.name.trim().to_string(),
            contact_name: keep_existing(&self.contact_name, &existing.contact_name),
            phone: keep_existing(&self.phone, &existing.phone),
            email: keep_existing(&self.email, &existing.email),
            address: keep_existing(&self.address, &existing.address),
            notes: keep_existing(&self.notes, &existing.notes),
            created_at: existing.created_at,
            updated_at: now,
        }
    }

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

impl ImportRecord for Category {
    const KIND: &'static str = "category";

    fn record_id(&self) -> &str {
        &self.id
    }

    fn record_name(&self) -> &str {
        &self.name
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_category(self)
    }

    fn merged_onto(&self, existing: &Self, now: DateTime<Utc>) -> Self {
        Category {
            id: existing.id.clone(),
            name: self.name.trim().to_string(),
            description: keep_existing(&self.description, &existing.description),
            created_at: existing.created_at,
            updated_at: now,
        }
    }

    fn with_id(mut self, id: String) -> Self {
        self.id = id;
        self
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// What to do when an incoming record matches an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    #[default]
    Overwrite,
    KeepExisting,
}

impl FromStr for ConflictPolicy {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "keep_existing" | "keep" | "skip" => Ok(ConflictPolicy::KeepExisting),
            other => Err(TransferError::PayloadMismatch {
                data_type: "policy".to_string(),
                reason: format!("unknown conflict policy '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MatchedBy {
    Id,
    Name,
    AlternateKey,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportAction<T> {
    Insert(T),
    Update { record: T, matched_by: MatchedBy },
    Skip { existing_id: String, matched_by: MatchedBy },
}

/// Outcome counts of one import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub messages: Vec<String>,
}

impl ImportSummary {
    pub fn merge(&mut self, other: ImportSummary) {
        self.imported += other.imported;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.messages.extend(other.messages);
    }

    pub fn total(&self) -> usize {
        self.imported + self.updated + self.skipped + self.errors
    }
}

/// Maps ids used inside an import file to the ids the records ended up with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRemap {
    map: HashMap<String, String>,
}

impl IdRemap {
    pub fn insert(&mut self, incoming: &str, resolved: &str) {
        if !incoming.trim().is_empty() {
            self.map.insert(incoming.to_string(), resolved.to_string());
        }
    }

    pub fn get(&self, incoming: &str) -> Option<&str> {
        self.map.get(incoming).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Rewrites a foreign key through the remap. References that resolve
    /// to nothing in `valid` are cleared.
    pub fn rewrite(&self, reference: &Option<String>, valid: &HashSet<String>) -> Option<String> {
        let id = reference.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let resolved = self.get(id).unwrap_or(id);
        valid.contains(resolved).then(|| resolved.to_string())
    }
}

/// An incoming record carried by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSource {
    /// 1-based position in the file.
    pub position: usize,
    pub name: String,
}

/// The result of resolving one batch against existing rows.
#[derive(Debug, Clone)]
pub struct ImportPlan<T> {
    pub actions: Vec<ImportAction<T>>,
    /// Parallel to `actions`: every incoming record folded into that action,
    /// in file order.
    pub sources: Vec<Vec<ImportSource>>,
    pub remap: IdRemap,
    /// Every id that exists once the plan is applied.
    pub known_ids: HashSet<String>,
    pub summary: ImportSummary,
}

impl<T> ImportPlan<T> {
    pub fn inserts(&self) -> impl Iterator<Item = &T> {
        self.actions.iter().filter_map(|a| match a {
            ImportAction::Insert(r) => Some(r),
            _ => None,
        })
    }

    pub fn updates(&self) -> impl Iterator<Item = &T> {
        self.actions.iter().filter_map(|a| match a {
            ImportAction::Update { record, .. } => Some(record),
            _ => None,
        })
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Lookup tables over existing rows plus everything accepted so far.
struct MatchIndex<T> {
    records: Vec<T>,
    /// Index of the action that produced each record (None for rows that
    /// already existed and were not touched yet).
    action_of: Vec<Option<usize>>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    by_alt: HashMap<String, usize>,
}

impl<T: ImportRecord> MatchIndex<T> {
    fn new(existing: &[T]) -> Self {
        let mut index = MatchIndex {
            records: Vec::with_capacity(existing.len()),
            action_of: Vec::with_capacity(existing.len()),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            by_alt: HashMap::new(),
        };
        for record in existing {
            index.push(record.clone(), None);
        }
        index
    }

    fn push(&mut self, record: T, action: Option<usize>) -> usize {
        let slot = self.records.len();
        self.records.push(record);
        self.action_of.push(action);
        self.reindex(slot);
        slot
    }

    fn reindex(&mut self, slot: usize) {
        let record = &self.records[slot];
        self.by_id.insert(record.record_id().to_string(), slot);
        self.by_name.entry(name_key(record.record_name())).or_insert(slot);
        if let Some(alt) = record.alternate_key() {
            self.by_alt.entry(alt).or_insert(slot);
        }
    }

    fn find(&self, record: &T) -> Option<(usize, MatchedBy)> {
        let id = record.record_id().trim();
        if !id.is_empty() {
            if let Some(&slot) = self.by_id.get(id) {
                return Some((slot, MatchedBy::Id));
            }
        }
        if let Some(&slot) = self.by_name.get(&name_key(record.record_name())) {
            return Some((slot, MatchedBy::Name));
        }
        record
            .alternate_key()
            .and_then(|alt| self.by_alt.get(&alt).copied())
            .map(|slot| (slot, MatchedBy::AlternateKey))
    }
}

/// Resolves incoming records against existing rows.
pub fn resolve<T: ImportRecord>(
    incoming: Vec<T>,
    existing: &[T],
    policy: ConflictPolicy,
    now: DateTime<Utc>,
) -> ImportPlan<T> {
    let mut index = MatchIndex::new(existing);
    let mut actions: Vec<ImportAction<T>> = Vec::new();
    let mut sources: Vec<Vec<ImportSource>> = Vec::new();
    let mut remap = IdRemap::default();
    let mut summary = ImportSummary::default();

    for (position, record) in incoming.into_iter().enumerate() {
        if let Err(e) = record.validate() {
            summary.errors += 1;
            summary.messages.push(format!(
                "{} #{} ({}): {}",
                T::KIND,
                position + 1,
                record.record_name().trim(),
                e
            ));
            continue;
        }

        let incoming_id = record.record_id().trim().to_string();
        let source = ImportSource {
            position: position + 1,
            name: record.record_name().trim().to_string(),
        };

        match index.find(&record) {
            Some((slot, matched_by)) => {
                let target_id = index.records[slot].record_id().to_string();
                remap.insert(&incoming_id, &target_id);

                if policy == ConflictPolicy::KeepExisting {
                    summary.skipped += 1;
                    sources.push(vec![source]);
                    actions.push(ImportAction::Skip {
                        existing_id: target_id,
                        matched_by,
                    });
                    continue;
                }

                let merged = record.merged_onto(&index.records[slot], now);
                summary.updated += 1;

                match index.action_of[slot] {
                    // Same record earlier in this batch: fold into that action.
                    Some(action) => {
                        match &mut actions[action] {
                            ImportAction::Insert(r) | ImportAction::Update { record: r, .. } => {
                                *r = merged.clone();
                            }
                            ImportAction::Skip { .. } => {}
                        }
                        sources[action].push(source);
                    }
                    None => {
                        index.action_of[slot] = Some(actions.len());
                        sources.push(vec![source]);
                        actions.push(ImportAction::Update {
                            record: merged.clone(),
                            matched_by,
                        });
                    }
                }

                index.records[slot] = merged;
                index.reindex(slot);
            }
            None => {
                let id = if incoming_id.is_empty() {
                    Uuid::new_v4().to_string()
                } else {
                    incoming_id.clone()
                };
                remap.insert(&incoming_id, &id);

                let record = record.with_id(id);
                summary.imported += 1;
                index.push(record.clone(), Some(actions.len()));
                sources.push(vec![source]);
                actions.push(ImportAction::Insert(record));
            }
        }
    }

    let known_ids = index.by_id.keys().cloned().collect();

    ImportPlan {
        actions,
        sources,
        remap,
        known_ids,
        summary,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BulkPriceTier;

    fn product(id: &str, name: &str, barcode: Option<&str>) -> Product {
        Product {
            id: id.to_string(),
            name: name.to_string(),
            barcode: barcode.map(str::to_string),
            description: None,
            price_cents: 100,
            cost_cents: 60,
            quantity: 10,
            min_stock: 2,
            category_id: None,
            supplier_id: None,
            bulk_pricing: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn customer(id: &str, name: &str, phone: Option<&str>) -> Customer {
        Customer {
            id: id.to_string(),
            name: name.to_string(),
            phone: phone.map(str::to_string),
            email: None,
            address: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_envelope_rejects_bad_input() {
        assert!(matches!(
            parse_envelope("not json"),
            Err(TransferError::InvalidJson(_))
        ));

        let v2 = r#"{"version":"2.0","dataType":"products","exportedAt":"2026-01-01T00:00:00Z","data":[]}"#;
        assert!(matches!(
            parse_envelope(v2),
            Err(TransferError::UnsupportedVersion(_))
        ));

        let sales = r#"{"version":"1.0","dataType":"sales","exportedAt":"2026-01-01T00:00:00Z","data":[]}"#;
        assert!(matches!(
            parse_envelope(sales),
            Err(TransferError::UnsupportedDataType(_))
        ));

        let mismatch = r#"{"version":"1.0","dataType":"products","exportedAt":"2026-01-01T00:00:00Z","data":{"x":1}}"#;
        assert!(matches!(
            parse_envelope(mismatch),
            Err(TransferError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn test_envelope_round_trip_all() {
        let bundle = Bundle {
            products: vec![product("p1", "Cola", Some("123456"))],
            ..Bundle::default()
        };
        let json = ExportEnvelope::new(DataType::All, bundle.clone(), Utc::now())
            .to_json()
            .unwrap();
        assert!(json.contains("\"dataType\": \"all\""));
        assert!(json.contains("\"exportedAt\""));

        match parse_envelope(&json).unwrap() {
            ImportPayload::All(b) => assert_eq!(b.products, bundle.products),
            other => panic!("unexpected payload {:?}", other.data_type()),
        }
    }

    #[test]
    fn test_resolve_matches_id_name_then_barcode() {
        let existing = vec![
            product("p1", "Cola", Some("111111")),
            product("p2", "Bread", Some("222222")),
            product("p3", "Milk", Some("333333")),
        ];
        let incoming = vec![
            product("p1", "Cola Zero", None),
            product("", "  bread ", None),
            product("", "Fresh Milk", Some("333333")),
            product("", "Eggs", None),
        ];

        let plan = resolve(incoming, &existing, ConflictPolicy::Overwrite, Utc::now());
        assert_eq!(plan.summary.updated, 3);
        assert_eq!(plan.summary.imported, 1);

        let matched: Vec<MatchedBy> = plan
            .actions
            .iter()
            .filter_map(|a| match a {
                ImportAction::Update { matched_by, .. } => Some(*matched_by),
                _ => None,
            })
            .collect();
        assert_eq!(
            matched,
            vec![MatchedBy::Id, MatchedBy::Name, MatchedBy::AlternateKey]
        );

        // barcode kept when incoming is blank; stock not taken from file
        let cola = plan.updates().next().unwrap();
        assert_eq!(cola.id, "p1");
        assert_eq!(cola.barcode.as_deref(), Some("111111"));

        let eggs = plan.inserts().next().unwrap();
        assert!(Uuid::parse_str(&eggs.id).is_ok());
    }

    #[test]
    fn test_keep_existing_skips_matches() {
        let existing = vec![customer("c1", "Ana", Some("0812 345 678"))];
        let incoming = vec![customer("", "Ana Maria", Some("0812-345-678"))];

        let plan = resolve(incoming, &existing, ConflictPolicy::KeepExisting, Utc::now());
        assert_eq!(plan.summary.skipped, 1);
        assert!(matches!(
            plan.actions[0],
            ImportAction::Skip {
                matched_by: MatchedBy::AlternateKey,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicates_in_batch_collapse() {
        let mut second = product("", "Rice", None);
        second.price_cents = 250;
        second.bulk_pricing = vec![BulkPriceTier::new(10, 230)];
        let incoming = vec![product("", "Rice", None), second];

        let plan = resolve(incoming, &[], ConflictPolicy::Overwrite, Utc::now());
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.summary.imported, 1);
        assert_eq!(plan.summary.updated, 1);
        let positions: Vec<usize> = plan.sources[0].iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![1, 2]);

        let rice = plan.inserts().next().unwrap();
        assert_eq!(rice.price_cents, 250);
        assert_eq!(rice.bulk_pricing.len(), 1);
    }

    #[test]
    fn test_invalid_records_are_tallied() {
        let mut bad = product("", "", None);
        bad.price_cents = -5;
        let incoming = vec![bad, product("", "Tea", None)];

        let plan = resolve(incoming, &[], ConflictPolicy::Overwrite, Utc::now());
        assert_eq!(plan.summary.errors, 1);
        assert_eq!(plan.summary.imported, 1);
        assert!(plan.summary.messages[0].starts_with("product #1"));
    }

    #[test]
    fn test_id_remap_rewrites_and_clears() {
        let existing = vec![Category {
            id: "cat-local".to_string(),
            name: "Drinks".to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }];
        let incoming = vec![Category {
            id: "cat-remote".to_string(),
            name: "drinks".to_string(),
            description: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }];

        let plan = resolve(incoming, &existing, ConflictPolicy::Overwrite, Utc::now());
        assert_eq!(plan.remap.get("cat-remote"), Some("cat-local"));
        assert_eq!(
            plan.remap
                .rewrite(&Some("cat-remote".to_string()), &plan.known_ids),
            Some("cat-local".to_string())
        );
        assert_eq!(
            plan.remap.rewrite(&Some("ghost".to_string()), &plan.known_ids),
            None
        );
    }
}
