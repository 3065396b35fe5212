//! CSV export of the filtered debtor list.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use super::debtor::Debtor;

/// Default export file name
pub const EXPORT_FILE_NAME: &str = "historial_deudores.csv";

const HEADER: [&str; 7] = [
    "Nombre",
    "Monto inicial",
    "Monto pendiente",
    "Fecha de inicio",
    "Último pago",
    "Próximo pago",
    "Estado",
];

/// Quote a field when it contains a separator, quote or line break
fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string()).unwrap_or_default()
}

/// Render debtors as CSV, one row per debtor, with a header row.
pub fn to_csv(debtors: &[&Debtor]) -> String {
    let mut out = HEADER.join(",");
    out.push('\n');

    for debtor in debtors {
        let row = [
            escape(&debtor.name),
            format!("{:.2}", debtor.initial_amount),
            format!("{:.2}", debtor.pending_amount),
            format_date(debtor.start_date),
            format_date(debtor.last_payment_date),
            format_date(debtor.next_payment_date),
            debtor.status_label().to_string(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }

    out
}

/// Write the CSV export to `path`.
pub fn write_csv(path: &Path, debtors: &[&Debtor]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, to_csv(debtors))
        .with_context(|| format!("Failed to write export file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_and_escaping() {
        let debtor = Debtor {
            name: "Pérez, \"Juancho\"".to_string(),
            initial_amount: 1000.0,
            pending_amount: 250.5,
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..Default::default()
        };

        let csv = to_csv(&[&debtor]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "Nombre,Monto inicial,Monto pendiente,Fecha de inicio,Último pago,Próximo pago,Estado");
        assert_eq!(lines[1], "\"Pérez, \"\"Juancho\"\"\",1000.00,250.50,01/03/2024,,,Activo");
    }

    #[test]
    fn test_write_csv_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join(EXPORT_FILE_NAME);
        write_csv(&path, &[]).unwrap();

        let contents = std::fs::read_to_string(path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
