//! WebAssembly bindings for Lot Ledger
//!
//! Exposes the stateless helpers front ends need without a round trip:
//! - Quantity formatting
//! - Lot status and expiry
//! - Production output and movement sign
//! - FEFO allocation preview
//!
//! Quantities cross the boundary as decimal strings so no precision is lost.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use shared::{
    allocate_fefo, derive_status, expiry_date, finished_quantity, format_quantity, MovementKind,
    ProductLot,
};
use wasm_bindgen::prelude::*;

/// Initialize the WASM module
#[wasm_bindgen(start)]
pub fn init() {
    web_sys::console::debug_1(&JsValue::from_str("lotledger-wasm ready"));
}

fn parse_decimal(field: &str, value: &str) -> Result<Decimal, String> {
    value
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("{field}: invalid decimal {value:?}: {e}"))
}

fn parse_date(field: &str, value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| format!("{field}: invalid date {value:?}: {e}"))
}

fn to_js(err: String) -> JsValue {
    JsValue::from_str(&err)
}

/// Today's UTC date according to the browser clock
fn browser_today() -> Result<NaiveDate, String> {
    let now = js_sys::Date::new_0();
    NaiveDate::from_ymd_opt(
        now.get_utc_full_year() as i32,
        now.get_utc_month() + 1,
        now.get_utc_date(),
    )
    .ok_or_else(|| "browser returned an invalid date".to_string())
}

fn quantity_label(value: &str, unit: &str) -> Result<String, String> {
    Ok(format_quantity(parse_decimal("value", value)?, unit))
}

fn status_label(expiry: &str, today: &str, near_expiry_days: i32) -> Result<String, String> {
    let expiry = parse_date("expiry", expiry)?;
    let today = parse_date("today", today)?;
    Ok(derive_status(expiry, today, i64::from(near_expiry_days))
        .as_str()
        .to_string())
}

fn output_quantity(yield_per_batch: &str, batch_multiplier: &str) -> Result<String, String> {
    let yield_per_batch = parse_decimal("yield_per_batch", yield_per_batch)?;
    let batch_multiplier = parse_decimal("batch_multiplier", batch_multiplier)?;
    Ok(finished_quantity(yield_per_batch, batch_multiplier).to_string())
}

fn signed_quantity(kind: &str, quantity: &str) -> Result<String, String> {
    let kind = MovementKind::from_str(kind).ok_or_else(|| format!("unknown movement kind {kind:?}"))?;
    Ok(kind.signed(parse_decimal("quantity", quantity)?).to_string())
}

#[derive(Deserialize)]
struct PreviewRequest {
    requested: Decimal,
    today: NaiveDate,
    lots: Vec<ProductLot>,
}

fn fefo_preview(request_json: &str) -> Result<String, String> {
    let request: PreviewRequest =
        serde_json::from_str(request_json).map_err(|e| format!("Invalid preview JSON: {}", e))?;

    match allocate_fefo(request.requested, &request.lots, request.today) {
        Ok(allocations) => serde_json::to_string(&allocations).map_err(|e| e.to_string()),
        Err(unmet) => Err(format!("insufficient stock: {} unmet", unmet)),
    }
}

/// Render a quantity the way the ledger displays it ("500 g", "1.5 kg")
#[wasm_bindgen]
pub fn format_quantity_label(value: &str, unit: &str) -> Result<String, JsValue> {
    quantity_label(value, unit).map_err(to_js)
}

/// Status of a lot expiring on `expiry` as of `today` (both `YYYY-MM-DD`)
#[wasm_bindgen]
pub fn lot_status(expiry: &str, today: &str, near_expiry_days: i32) -> Result<String, JsValue> {
    status_label(expiry, today, near_expiry_days).map_err(to_js)
}

/// Status of a lot as of the browser's current UTC date
#[wasm_bindgen]
pub fn lot_status_today(expiry: &str, near_expiry_days: i32) -> Result<String, JsValue> {
    let today = browser_today().map_err(to_js)?;
    let expiry = parse_date("expiry", expiry).map_err(to_js)?;
    Ok(derive_status(expiry, today, i64::from(near_expiry_days))
        .as_str()
        .to_string())
}

/// Expiry date (`YYYY-MM-DD`) of a lot produced on `production_date`
#[wasm_bindgen]
pub fn lot_expiry(production_date: &str, shelf_life_days: i32) -> Result<String, JsValue> {
    let date = parse_date("production_date", production_date).map_err(to_js)?;
    let produced_at = date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc()).ok_or_else(|| to_js("invalid production date".to_string()))?;
    Ok(expiry_date(produced_at, shelf_life_days).format("%Y-%m-%d").to_string())
}

/// Finished units an order will produce
#[wasm_bindgen]
pub fn production_output(yield_per_batch: &str, batch_multiplier: &str) -> Result<String, JsValue> {
    output_quantity(yield_per_batch, batch_multiplier).map_err(to_js)
}

/// Contribution of a movement to stock, negative for outbound kinds
#[wasm_bindgen]
pub fn signed_movement_quantity(kind: &str, quantity: &str) -> Result<String, JsValue> {
    signed_quantity(kind, quantity).map_err(to_js)
}

/// Preview which lots a sale would consume.
///
/// Takes `{ "requested", "today", "lots": [...] }` and returns the allocations
/// as JSON.
#[wasm_bindgen]
pub fn preview_fefo_allocation(request_json: &str) -> Result<String, JsValue> {
    fefo_preview(request_json).map_err(to_js)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_label() {
        assert_eq!(quantity_label("0.5", "kg").unwrap(), "500 g");
        assert_eq!(quantity_label("2.25", "kg").unwrap(), "2.3 kg");
        assert!(quantity_label("abc", "kg").is_err());
    }

    #[test]
    fn test_status_label() {
        assert_eq!(status_label("2024-01-10", "2024-01-05", 1).unwrap(), "fresh");
        assert_eq!(status_label("2024-01-10", "2024-01-09", 1).unwrap(), "near_expiry");
        assert_eq!(status_label("2024-01-10", "2024-01-11", 1).unwrap(), "expired");
        assert!(status_label("10/01/2024", "2024-01-11", 1).is_err());
    }

    #[test]
    fn test_output_quantity() {
        assert_eq!(output_quantity("12", "1.5").unwrap(), "18.0");
    }

    #[test]
    fn test_signed_quantity() {
        assert_eq!(signed_quantity("inflow", "3").unwrap(), "3");
        assert_eq!(signed_quantity("shrinkage", "3").unwrap(), "-3");
        assert!(signed_quantity("gift", "3").is_err());
    }

    #[test]
    fn test_fefo_preview() {
        let request = r#"{
            "requested": "7",
            "today": "2024-01-01",
            "lots": [
                {"id": 2, "product_id": 1, "product_name": "Bread", "unit_name": "unit",
                 "code": "1-20240102-001", "production_order_id": null,
                 "produced_at": "2024-01-02T08:00:00Z", "expiry_date": "2024-01-12",
                 "initial_quantity": "5", "available_quantity": "5", "status": "fresh",
                 "created_by": null, "created_at": "2024-01-02T08:00:00Z"},
                {"id": 1, "product_id": 1, "product_name": "Bread", "unit_name": "unit",
                 "code": "1-20240103-001", "production_order_id": null,
                 "produced_at": "2024-01-03T08:00:00Z", "expiry_date": "2024-01-10",
                 "initial_quantity": "5", "available_quantity": "5", "status": "fresh",
                 "created_by": null, "created_at": "2024-01-03T08:00:00Z"}
            ]
        }"#;
        let json = fefo_preview(request).unwrap();
        let allocations: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(allocations[0]["lot_id"], 1);
        assert_eq!(allocations[0]["quantity"], "5");
        assert_eq!(allocations[1]["lot_id"], 2);
        assert_eq!(allocations[1]["quantity"], "2");
    }
}
