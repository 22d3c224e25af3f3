/// Cart contract shared with the commerce subsystem.
use serde::{Deserialize, Serialize};

/// One line of the cart, as handed to the price-override hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub quantity: u32,
    pub unit_price: f64,
    /// Custom tip carried by the posted form field, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_amount: Option<f64>,
}

/// Price-override hook: a line carrying a tip amount has its unit price set
/// to that amount before totals are calculated. Pure and idempotent — the
/// commerce subsystem recalculates totals repeatedly, and every pass must
/// yield the same prices. Lines without a tip are untouched.
pub fn apply_tip_overrides(lines: &mut [CartLine]) {
    for line in lines.iter_mut() {
        if let Some(tip) = line.tip_amount {
            line.unit_price = tip;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_override_is_idempotent() {
        let mut lines = vec![
            CartLine {
                product_id: "1234".to_string(),
                quantity: 1,
                unit_price: 0.0,
                tip_amount: Some(7.5),
            },
            CartLine {
                product_id: "999".to_string(),
                quantity: 2,
                unit_price: 19.99,
                tip_amount: None,
            },
        ];

        apply_tip_overrides(&mut lines);
        let first_pass = lines.clone();
        apply_tip_overrides(&mut lines);

        assert_eq!(lines, first_pass);
        assert_eq!(lines[0].unit_price, 7.5);
        assert_eq!(lines[1].unit_price, 19.99, "untipped line untouched");
    }

    #[test]
    fn test_cart_line_roundtrip_keeps_tip_field_optional() {
        let line = CartLine {
            product_id: "1234".to_string(),
            quantity: 1,
            unit_price: 19.99,
            tip_amount: None,
        };
        let encoded = serde_json::to_string(&line).unwrap();
        assert!(!encoded.contains("tip_amount"));
    }
}
