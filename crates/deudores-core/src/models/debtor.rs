use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize};

/// A person who owes money, their installment schedule and payment history.
///
/// Field names on the wire follow the backend's camelCase Spanish schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Debtor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "nombreDeudor")]
    pub name: String,
    #[serde(rename = "montoInicial", default)]
    pub initial_amount: f64,
    #[serde(rename = "montoCuotaSemanal", default)]
    pub weekly_installment: f64,
    #[serde(rename = "fechaInicio", default, deserialize_with = "flexible_date")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub start_date: Option<NaiveDate>,
    #[serde(rename = "fechaUltimoPago", default, deserialize_with = "flexible_date")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub last_payment_date: Option<NaiveDate>,
    #[serde(rename = "fechaProximoPago", default, deserialize_with = "flexible_date")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub next_payment_date: Option<NaiveDate>,
    #[serde(rename = "montoPendiente", default)]
    pub pending_amount: f64,
    #[serde(rename = "cobrado", default)]
    pub collected: bool,
    #[serde(rename = "historialPagos", default, skip_serializing_if = "Vec::is_empty")]
    pub payments: Vec<Payment>,
}

/// One recorded payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Payment {
    #[serde(rename = "fecha", default, deserialize_with = "flexible_date")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub date: Option<NaiveDate>,
    #[serde(rename = "monto")]
    pub amount: f64,
}

/// Body of the pay-installment request
#[derive(Debug, Clone, Serialize)]
pub struct NewPayment {
    #[serde(rename = "monto")]
    pub amount: f64,
}

impl Debtor {
    /// A debtor is active while something is still owed
    pub fn is_active(&self) -> bool {
        self.pending_amount > 0.0
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_active() {
            "Activo"
        } else {
            "No activo"
        }
    }

    pub fn total_paid(&self) -> f64 {
        self.payments.iter().map(|p| p.amount).sum()
    }

    /// Payments, most recent first
    pub fn payments_newest_first(&self) -> Vec<&Payment> {
        let mut payments: Vec<&Payment> = self.payments.iter().collect();
        payments.sort_by(|a, b| b.date.cmp(&a.date));
        payments
    }
}

/// Parse `YYYY-MM-DD` or an RFC 3339 timestamp, keeping the date part.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        .or_else(|| s.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Accepts null, an empty string, a plain date or a timestamp.
fn flexible_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_backend_debtor() {
        let json = r#"{
            "id": 7,
            "nombreDeudor": "Juan Pérez",
            "montoInicial": 1000.0,
            "montoCuotaSemanal": 100,
            "fechaInicio": "2024-03-01",
            "fechaUltimoPago": "2024-04-05T10:00:00Z",
            "fechaProximoPago": "",
            "montoPendiente": 600.5,
            "cobrado": false,
            "historialPagos": [
                {"fecha": "2024-03-08", "monto": 100},
                {"fecha": "2024-04-05", "monto": 300}
            ]
        }"#;

        let debtor: Debtor = serde_json::from_str(json).unwrap();
        assert_eq!(debtor.id, Some(7));
        assert_eq!(debtor.name, "Juan Pérez");
        assert_eq!(debtor.start_date, NaiveDate::from_ymd_opt(2024, 3, 1));
        assert_eq!(debtor.last_payment_date, NaiveDate::from_ymd_opt(2024, 4, 5));
        assert_eq!(debtor.next_payment_date, None);
        assert!(debtor.is_active());
        assert_eq!(debtor.total_paid(), 400.0);
        assert_eq!(debtor.payments_newest_first()[0].amount, 300.0);
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let debtor: Debtor = serde_json::from_str(r#"{"nombreDeudor": "Ana"}"#).unwrap();
        assert_eq!(debtor.id, None);
        assert!(debtor.payments.is_empty());
        assert!(!debtor.is_active());
        assert_eq!(debtor.status_label(), "No activo");
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let result: Result<Debtor, _> =
            serde_json::from_str(r#"{"nombreDeudor": "Ana", "fechaInicio": "ayer"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_wire_names_without_id() {
        let debtor = Debtor {
            name: "Ana".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 2),
            ..Default::default()
        };
        let value = serde_json::to_value(&debtor).unwrap();
        assert_eq!(value["nombreDeudor"], "Ana");
        assert_eq!(value["fechaInicio"], "2024-01-02");
        assert!(value.get("id").is_none());
        assert!(value.get("historialPagos").is_none());
    }
}
