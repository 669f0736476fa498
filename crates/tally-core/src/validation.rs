//! # Validation Module
//!
//! Input validation for Tally POS records.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Command input (CLI args / import file)                        │
//! │  ├── Type validation (parsing, deserialization)                        │
//! │  └── THIS MODULE: Business rule validation                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL / CHECK constraints                                      │
//! │  └── UNIQUE / foreign key constraints                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_name, validate_quantity};
//!
//! validate_name("name", "Cola 330ml").unwrap();
//! validate_quantity(5).unwrap();
//! ```

use crate::error::ValidationError;
use crate::pricing::validate_tiers;
use crate::types::{Category, Customer, Product, Supplier};
use crate::{MAX_CART_ITEMS, MAX_CURRENCY_DECIMALS, MAX_ITEM_QUANTITY, MAX_PRICE_CENTS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 200;
const MAX_BARCODE_LEN: usize = 64;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a display name (product, customer, supplier, category).
///
/// ```rust
/// use tally_core::validation::validate_name;
///
/// assert!(validate_name("name", "Rice 1kg").is_ok());
/// assert!(validate_name("name", "   ").is_err());
/// ```
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates a barcode: digits/letters and hyphens, no whitespace.
///
/// ```rust
/// use tally_core::validation::validate_barcode;
///
/// assert!(validate_barcode("5449000000996").is_ok());
/// assert!(validate_barcode("54 49").is_err());
/// ```
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.len() > MAX_BARCODE_LEN {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_BARCODE_LEN,
        });
    }

    if !barcode.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, digits and hyphens".to_string(),
        });
    }

    Ok(())
}

/// Validates a phone number: at least 6 digits; `+`, spaces, dashes,
/// dots and parentheses allowed.
pub fn validate_phone(phone: &str) -> ValidationResult<()> {
    let phone = phone.trim();
    let digits = phone.chars().filter(|c| c.is_ascii_digit()).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')' | '.'));

    if !allowed || digits < 6 {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must contain at least 6 digits".to_string(),
        });
    }

    Ok(())
}

/// Validates an email address (shape only: `local@domain.tld`).
pub fn validate_email(email: &str) -> ValidationResult<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "email".to_string(),
            reason: "must look like name@example.com".to_string(),
        });
    }

    Ok(())
}

/// Validates a search query and returns it trimmed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity (1..=MAX_ITEM_QUANTITY).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates an amount in cents that may be zero but not negative
/// (prices, costs, stock levels).
///
/// ```rust
/// use tally_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("price", 0).is_ok());
/// assert!(validate_non_negative("price", -100).is_err());
/// ```
pub fn validate_non_negative(field: &str, value: i64) -> ValidationResult<()> {
    if value < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a unit price or cost in cents (0..=MAX_PRICE_CENTS).
///
/// ```rust
/// use tally_core::validation::validate_price;
///
/// assert!(validate_price("price", 150).is_ok());
/// assert!(validate_price("price", -1).is_err());
/// assert!(validate_price("price", i64::MAX / 999).is_err());
/// ```
pub fn validate_price(field: &str, cents: i64) -> ValidationResult<()> {
    validate_non_negative(field, cents)?;
    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }
    Ok(())
}

/// Validates the number of minor digits a currency shows.
pub fn validate_currency_decimals(decimals: u8) -> ValidationResult<()> {
    if decimals > MAX_CURRENCY_DECIMALS {
        return Err(ValidationError::OutOfRange {
            field: "currency_decimals".to_string(),
            min: 0,
            max: MAX_CURRENCY_DECIMALS as i64,
        });
    }
    Ok(())
}

/// Validates a tax rate in basis points (0% to 100%).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

/// Validates a percentage discount in basis points (0% to 100%).
pub fn validate_discount_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

/// Validates that one more line fits in the cart.
pub fn validate_cart_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cart items".to_string(),
            min: 0,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

/// Validates a UUID string.
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Record Validators
// =============================================================================

fn validate_optional(value: &Option<String>, check: fn(&str) -> ValidationResult<()>) -> ValidationResult<()> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => check(v),
        _ => Ok(()),
    }
}

/// Validates every business rule on a product.
pub fn validate_product(product: &Product) -> ValidationResult<()> {
    validate_name("name", &product.name)?;
    validate_optional(&product.barcode, validate_barcode)?;
    validate_price("price", product.price_cents)?;
    validate_price("cost", product.cost_cents)?;
    validate_non_negative("quantity", product.quantity)?;
    validate_non_negative("min_stock", product.min_stock)?;
    validate_tiers(&product.bulk_pricing)?;
    Ok(())
}

pub fn validate_category(category: &Category) -> ValidationResult<()> {
    validate_name("name", &category.name)
}

pub fn validate_supplier(supplier: &Supplier) -> ValidationResult<()> {
    validate_name("name", &supplier.name)?;
    validate_optional(&supplier.phone, validate_phone)?;
    validate_optional(&supplier.email, validate_email)?;
    Ok(())
}

pub fn validate_customer(customer: &Customer) -> ValidationResult<()> {
    validate_name("name", &customer.name)?;
    validate_optional(&customer.phone, validate_phone)?;
    validate_optional(&customer.email, validate_email)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BulkPriceTier;
    use chrono::Utc;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("name", "Cola 330ml").is_ok());
        assert!(validate_name("name", "").is_err());
        assert!(validate_name("name", &"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("5449000000996").is_ok());
        assert!(validate_barcode("ABC-123").is_ok());
        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("12 34").is_err());
    }

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("+1 (555) 010-2030").is_ok());
        assert!(validate_phone("0812345678").is_ok());
        assert!(validate_phone("123").is_err());
        assert!(validate_phone("call me").is_err());
    }

    #[test]
    fn test_validate_email() {
        assert!(validate_email("ana@shop.com").is_ok());
        assert!(validate_email("ana@shop").is_err());
        assert!(validate_email("@shop.com").is_err());
        assert!(validate_email("ana shop@x.com").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("").is_err());
        assert!(validate_uuid("not-a-uuid").is_err());
    }

    #[test]
    fn test_validate_product_rules() {
        let mut product = Product {
            id: String::new(),
            name: "Sugar".to_string(),
            barcode: Some("  ".to_string()),
            description: None,
            price_cents: 300,
            cost_cents: 200,
            quantity: 10,
            min_stock: 2,
            category_id: None,
            supplier_id: None,
            bulk_pricing: vec![BulkPriceTier::new(10, 270)],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        // blank optional barcode is treated as absent
        assert!(validate_product(&product).is_ok());

        product.quantity = -1;
        assert_eq!(
            validate_product(&product),
            Err(ValidationError::Negative {
                field: "quantity".to_string()
            })
        );

        product.quantity = 1;
        product.bulk_pricing = vec![BulkPriceTier::new(0, 270)];
        assert!(validate_product(&product).is_err());

        product.bulk_pricing = vec![BulkPriceTier::new(10, MAX_PRICE_CENTS + 1)];
        assert!(validate_product(&product).is_err());

        product.bulk_pricing = Vec::new();
        product.price_cents = i64::MAX / 999;
        assert_eq!(
            validate_product(&product),
            Err(ValidationError::OutOfRange {
                field: "price".to_string(),
                min: 0,
                max: MAX_PRICE_CENTS,
            })
        );
    }

    #[test]
    fn test_validate_currency_decimals() {
        assert!(validate_currency_decimals(0).is_ok());
        assert!(validate_currency_decimals(4).is_ok());
        assert!(validate_currency_decimals(5).is_err());
        assert!(validate_currency_decimals(20).is_err());
    }
}
