// Rust guideline compliant 2026-10-07

//! Payment form input and its local validation.

use domain::{FieldError, FormField, ValidationError};
use staging::PaymentDraft;

/// Largest accepted amount, in rupees.
pub const MAX_AMOUNT: f64 = 1_000_000.0;

/// What the user typed on the payment screen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaymentForm {
    /// Merchant or recipient name.
    pub merchant: String,
    /// Amount as typed; `₹` and digit separators are accepted.
    pub amount: String,
    /// A phone call was active while paying.
    pub phone_activity: bool,
    /// Hour of day to report; `None` uses the local clock.
    pub time_hour: Option<u8>,
}

impl PaymentForm {
    /// Form with merchant and amount filled in.
    #[must_use]
    pub fn new(merchant: impl Into<String>, amount: impl Into<String>) -> Self {
        Self { merchant: merchant.into(), amount: amount.into(), ..Self::default() }
    }

    /// Flag an active phone call.
    #[must_use]
    pub fn with_phone_activity(mut self, active: bool) -> Self {
        self.phone_activity = active;
        self
    }

    /// Pin the reported hour of day.
    #[must_use]
    pub fn at_hour(mut self, hour: u8) -> Self {
        self.time_hour = Some(hour);
        self
    }
}

impl From<&PaymentDraft> for PaymentForm {
    fn from(draft: &PaymentDraft) -> Self {
        Self::new(draft.merchant.clone(), draft.amount.clone()).with_phone_activity(draft.phone_activity)
    }
}

/// Check the form and return the trimmed merchant and the parsed amount.
///
/// # Errors
///
/// Returns a [`ValidationError`] listing every offending field, merchant first.
pub fn validate(form: &PaymentForm) -> Result<(String, f64), ValidationError> {
    let merchant = form.merchant.trim();
    let merchant_error = if merchant.is_empty() {
        Some("Enter a merchant or recipient name")
    } else if merchant.chars().count() < 2 {
        Some("Name too short")
    } else {
        None
    };

    let (amount, amount_error) = match parse_amount(&form.amount) {
        None => (0.0, Some("Enter an amount")),
        Some(a) if !a.is_finite() || a < 0.0 => (0.0, Some("Enter a valid amount")),
        Some(a) if a <= 0.0 => (0.0, Some("Enter an amount")),
        Some(a) if a > MAX_AMOUNT => (0.0, Some("Amount exceeds limit (\u{20b9}10,00,000)")),
        Some(a) => (a, None),
    };

    let fields: Vec<FieldError> = [(FormField::Merchant, merchant_error), (FormField::Amount, amount_error)]
        .into_iter()
        .filter_map(|(field, message)| message.map(|m| FieldError { field, message: m.to_owned() }))
        .collect();
    if fields.is_empty() { Ok((merchant.to_owned(), amount)) } else { Err(ValidationError { fields }) }
}

fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().trim_start_matches('\u{20b9}').chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned.parse::<f64>().unwrap_or(f64::NAN))
}

/// `true` for exactly six ASCII digits, surrounding whitespace ignored.
pub(crate) fn is_otp(code: &str) -> bool {
    let code = code.trim();
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit())
}
