/// Tip checkout hand-off.
///
/// Validation happens before any network action; a valid tip becomes a form
/// POST (`add-to-cart` + `simulcast_tip_amount`) fired on a detached task so
/// the poll/reconcile loop is never held up — the daemon's version of
/// opening the checkout in a new browsing context.
use tracing::{info, warn};

use simulcast_proto::config::TipsConfig;

pub const FIELD_ADD_TO_CART: &str = "add-to-cart";
pub const FIELD_TIP_AMOUNT: &str = "simulcast_tip_amount";

/// Rejections surfaced inline to the client, before any network action.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TipError {
    #[error("Please enter a valid amount (minimum ${0}).")]
    InvalidAmount(f64),
    #[error("Error: Checkout not configured properly.")]
    NotConfigured,
}

/// A validated, ready-to-submit checkout form.
#[derive(Debug, Clone, PartialEq)]
pub struct TipSubmission {
    pub checkout_url: String,
    pub fields: Vec<(String, String)>,
}

pub fn prepare_tip(config: &TipsConfig, amount: f64) -> Result<TipSubmission, TipError> {
    if !amount.is_finite() || amount < config.min_amount {
        return Err(TipError::InvalidAmount(config.min_amount));
    }
    if config.checkout_url.is_empty() || config.product_id.is_empty() {
        return Err(TipError::NotConfigured);
    }

    Ok(TipSubmission {
        checkout_url: config.checkout_url.clone(),
        fields: vec![
            (FIELD_ADD_TO_CART.to_string(), config.product_id.clone()),
            (FIELD_TIP_AMOUNT.to_string(), format!("{:.2}", amount)),
        ],
    })
}

/// Fire the checkout POST in the background. The stream view must not be
/// disrupted by checkout latency, so nobody awaits this.
pub fn spawn_submit(
    client: reqwest::Client,
    submission: TipSubmission,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match client
            .post(&submission.checkout_url)
            .form(&submission.fields)
            .send()
            .await
        {
            Ok(resp) => info!(
                "checkout: tip hand-off to {} returned {}",
                submission.checkout_url,
                resp.status()
            ),
            Err(e) => warn!("checkout: tip hand-off failed: {}", e),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> TipsConfig {
        TipsConfig {
            checkout_url: "https://shop.test/checkout".to_string(),
            product_id: "1234".to_string(),
            min_amount: 1.0,
        }
    }

    #[test]
    fn test_valid_tip_builds_form() {
        let submission = prepare_tip(&configured(), 5.0).unwrap();
        assert_eq!(submission.checkout_url, "https://shop.test/checkout");
        assert_eq!(
            submission.fields,
            vec![
                ("add-to-cart".to_string(), "1234".to_string()),
                ("simulcast_tip_amount".to_string(), "5.00".to_string()),
            ]
        );
    }

    #[test]
    fn test_amount_below_minimum_is_rejected() {
        let err = prepare_tip(&configured(), 0.5).unwrap_err();
        assert_eq!(err, TipError::InvalidAmount(1.0));
        assert_eq!(
            err.to_string(),
            "Please enter a valid amount (minimum $1)."
        );
    }

    #[test]
    fn test_non_finite_amounts_are_rejected() {
        assert!(prepare_tip(&configured(), f64::NAN).is_err());
        assert!(prepare_tip(&configured(), f64::INFINITY).is_err());
    }

    #[test]
    fn test_missing_configuration_is_rejected_before_network() {
        let mut config = configured();
        config.checkout_url.clear();
        assert_eq!(prepare_tip(&config, 5.0).unwrap_err(), TipError::NotConfigured);

        let mut config = configured();
        config.product_id.clear();
        assert_eq!(prepare_tip(&config, 5.0).unwrap_err(), TipError::NotConfigured);
    }

    #[test]
    fn test_decimal_amounts_keep_two_places() {
        let submission = prepare_tip(&configured(), 2.5).unwrap();
        assert_eq!(submission.fields[1].1, "2.50");
    }
}
