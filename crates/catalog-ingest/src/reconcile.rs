//! Insert-versus-update decision for a validated product

use crate::error::RecordError;
use crate::models::Product;
use crate::store::ProductStore;

/// Look `product` up by SKU and decide whether it is an insert or an update
///
/// On update the stored identity and creation time are carried over; the
/// returned flag is `true`. Performs exactly one read and never writes.
pub async fn reconcile(
    store: &dyn ProductStore,
    mut product: Product,
) -> Result<(Product, bool), RecordError> {
    let existing = store
        .find_by_sku(&product.sku)
        .await
        .map_err(|e| RecordError::LookupFailed(e.to_string()))?;

    match existing {
        Some(existing) => {
            product.id = existing.id;
            product.created_at = existing.created_at;
            Ok((product, true))
        },
        None => {
            product.id = None;
            product.created_at = None;
            Ok((product, false))
        },
    }
}
