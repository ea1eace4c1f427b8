//! Record validation
//!
//! [`transform`] is a pure function: it never touches the store and is safe to
//! call from any number of workers at once.

use crate::error::RecordError;
use crate::models::{columns, Product, RawRecord};

/// Convert one raw row into an unsaved [`Product`]
///
/// Rules are checked in order and the first failure wins:
/// 1. SKU and name are non-empty
/// 2. price parses as a finite, non-negative decimal
/// 3. stock parses as a non-negative integer
///
/// A row shorter than the column layout fails before any of them.
pub fn transform(record: &RawRecord) -> Result<Product, RecordError> {
    if record.fields.len() < columns::REQUIRED {
        return Err(RecordError::TooFewFields {
            expected: columns::REQUIRED,
            found: record.fields.len(),
        });
    }

    let sku = record.field(columns::SKU);
    let name = record.field(columns::NAME);
    if sku.is_empty() || name.is_empty() {
        return Err(RecordError::MissingRequiredField);
    }

    let price = parse_price(record.field(columns::PRICE))?;
    let stock = parse_stock(record.field(columns::STOCK))?;

    Ok(Product::new(
        sku,
        name,
        record.field(columns::DESCRIPTION),
        price,
        stock,
    ))
}

fn parse_price(raw: &str) -> Result<f64, RecordError> {
    let invalid = |reason: &str| RecordError::InvalidPrice {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let price: f64 = raw.parse().map_err(|_| invalid("not a decimal number"))?;
    if !price.is_finite() {
        return Err(invalid("must be finite"));
    }
    if price < 0.0 {
        return Err(invalid("must not be negative"));
    }
    Ok(price)
}

fn parse_stock(raw: &str) -> Result<i64, RecordError> {
    let invalid = |reason: &str| RecordError::InvalidStock {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let stock: i64 = raw.parse().map_err(|_| invalid("not an integer"))?;
    if stock < 0 {
        return Err(invalid("must not be negative"));
    }
    Ok(stock)
}
