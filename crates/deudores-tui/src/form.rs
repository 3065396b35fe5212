//! The "new debtor" form.

use deudores_core::models::{parse_date, Debtor};

/// Maximum length of any form field
const MAX_FIELD_LENGTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    InitialAmount,
    WeeklyInstallment,
    StartDate,
    LastPaymentDate,
    NextPaymentDate,
    PendingAmount,
    Collected,
}

impl FormField {
    pub const ALL: [FormField; 8] = [
        FormField::Name,
        FormField::InitialAmount,
        FormField::WeeklyInstallment,
        FormField::StartDate,
        FormField::LastPaymentDate,
        FormField::NextPaymentDate,
        FormField::PendingAmount,
        FormField::Collected,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Name => "Nombre del deudor",
            FormField::InitialAmount => "Monto inicial",
            FormField::WeeklyInstallment => "Cuota semanal",
            FormField::StartDate => "Fecha de inicio",
            FormField::LastPaymentDate => "Último pago",
            FormField::NextPaymentDate => "Próximo pago",
            FormField::PendingAmount => "Monto pendiente",
            FormField::Collected => "Cobrado (s/n)",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|f| f == self).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebtorForm {
    values: [String; 8],
    focus: usize,
    pub error: Option<String>,
}

impl DebtorForm {
    pub fn focus(&self) -> FormField {
        FormField::ALL[self.focus]
    }

    pub fn value(&self, field: FormField) -> &str {
        &self.values[field.index()]
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % FormField::ALL.len();
    }

    pub fn prev_field(&mut self) {
        self.focus = (self.focus + FormField::ALL.len() - 1) % FormField::ALL.len();
    }

    pub fn push(&mut self, c: char) {
        let value = &mut self.values[self.focus];
        if !c.is_control() && value.chars().count() < MAX_FIELD_LENGTH {
            value.push(c);
        }
    }

    pub fn pop(&mut self) {
        self.values[self.focus].pop();
    }

    /// Validate the form into a debtor ready to be created.
    ///
    /// An empty pending amount defaults to the initial amount and an empty
    /// collected flag to "no".
    pub fn to_debtor(&self) -> Result<Debtor, String> {
        let name = self.value(FormField::Name).trim();
        if name.is_empty() {
            return Err("El nombre es obligatorio.".to_string());
        }

        let initial_amount = parse_amount(self.value(FormField::InitialAmount))
            .ok_or("Monto inicial inválido.")?;
        let weekly_installment = parse_amount(self.value(FormField::WeeklyInstallment))
            .ok_or("Cuota semanal inválida.")?;

        let start_date = parse_optional_date(self.value(FormField::StartDate))
            .ok_or("Fecha de inicio inválida (AAAA-MM-DD).")?;
        let last_payment_date = parse_optional_date(self.value(FormField::LastPaymentDate))
            .ok_or("Fecha de último pago inválida (AAAA-MM-DD).")?;
        let next_payment_date = parse_optional_date(self.value(FormField::NextPaymentDate))
            .ok_or("Fecha de próximo pago inválida (AAAA-MM-DD).")?;

        let pending = self.value(FormField::PendingAmount);
        let pending_amount = if pending.trim().is_empty() {
            initial_amount
        } else {
            parse_amount(pending).ok_or("Monto pendiente inválido.")?
        };
        let collected =
            parse_yes_no(self.value(FormField::Collected)).ok_or("Cobrado debe ser 's' o 'n'.")?;

        Ok(Debtor {
            name: name.to_string(),
            initial_amount,
            weekly_installment,
            start_date,
            last_payment_date,
            next_payment_date,
            pending_amount,
            collected,
            ..Default::default()
        })
    }
}

/// Parse a non-negative amount, accepting a decimal comma
pub fn parse_amount(s: &str) -> Option<f64> {
    s.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Empty means no
fn parse_yes_no(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "" | "n" | "no" => Some(false),
        "s" | "si" | "sí" | "y" | "yes" => Some(true),
        _ => None,
    }
}

/// `Some(None)` for an empty field, `None` for an invalid date
fn parse_optional_date(s: &str) -> Option<Option<chrono::NaiveDate>> {
    if s.trim().is_empty() {
        Some(None)
    } else {
        parse_date(s).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn filled(values: [&str; 8]) -> DebtorForm {
        let mut form = DebtorForm::default();
        for value in values {
            for c in value.chars() {
                form.push(c);
            }
            form.next_field();
        }
        form
    }

    #[test]
    fn test_valid_form_builds_debtor() {
        let form = filled(["Ana Gómez", "1500,50", "150", "2024-05-01", "", "", "", ""]);
        let debtor = form.to_debtor().unwrap();

        assert_eq!(debtor.name, "Ana Gómez");
        assert_eq!(debtor.initial_amount, 1500.5);
        assert_eq!(debtor.pending_amount, 1500.5);
        assert_eq!(debtor.start_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(debtor.last_payment_date, None);
        assert_eq!(debtor.next_payment_date, None);
        assert!(!debtor.collected);

        let partly_paid = filled([
            "Luis Pérez",
            "1000",
            "100",
            "2024-04-01",
            "2024-05-06",
            "2024-05-13",
            "600",
            "S",
        ])
        .to_debtor()
        .unwrap();
        assert_eq!(partly_paid.last_payment_date, NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(partly_paid.next_payment_date, NaiveDate::from_ymd_opt(2024, 5, 13));
        assert_eq!(partly_paid.pending_amount, 600.0);
        assert!(partly_paid.collected);
    }

    #[test]
    fn test_invalid_fields_are_reported() {
        assert!(filled(["", "1", "1", "", "", "", "", ""]).to_debtor().is_err());
        assert!(filled(["Ana", "-5", "1", "", "", "", "", ""]).to_debtor().is_err());
        assert!(filled(["Ana", "10", "1", "mañana", "", "", "", ""]).to_debtor().is_err());
        assert!(filled(["Ana", "10", "1", "", "", "", "x", ""]).to_debtor().is_err());
        assert!(filled(["Ana", "10", "1", "", "", "", "", "quizá"]).to_debtor().is_err());
    }

    #[test]
    fn test_focus_wraps() {
        let mut form = DebtorForm::default();
        assert_eq!(form.focus(), FormField::Name);
        form.prev_field();
        assert_eq!(form.focus(), FormField::Collected);
        form.next_field();
        assert_eq!(form.focus(), FormField::Name);
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 12,5 "), Some(12.5));
        assert_eq!(parse_amount("abc"), None);
        assert_eq!(parse_amount("inf"), None);
    }
}
