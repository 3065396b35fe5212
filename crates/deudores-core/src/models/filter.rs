use std::cmp::Ordering;

use chrono::NaiveDate;

use super::debtor::Debtor;

/// Filter on whether a debtor still owes money
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    Active,
    Inactive,
}

impl StatusFilter {
    pub fn label(&self) -> &'static str {
        match self {
            StatusFilter::All => "Todos",
            StatusFilter::Active => "Activos",
            StatusFilter::Inactive => "No activos",
        }
    }

    /// Cycle All -> Active -> Inactive -> All
    pub fn next(&self) -> Self {
        match self {
            StatusFilter::All => StatusFilter::Active,
            StatusFilter::Active => StatusFilter::Inactive,
            StatusFilter::Inactive => StatusFilter::All,
        }
    }

    fn matches(&self, debtor: &Debtor) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Active => debtor.is_active(),
            StatusFilter::Inactive => !debtor.is_active(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebtorSortColumn {
    Name,
    Pending,
    NextPayment,
    StartDate,
}

/// In-memory filter over the debtor list.
#[derive(Debug, Clone, PartialEq)]
pub struct DebtorFilter {
    pub status: StatusFilter,
    /// Case-insensitive substring of the debtor name
    pub name: String,
    /// Keep debtors that started on or before this date
    pub started_by: Option<NaiveDate>,
    pub min_pending: f64,
    /// `None` means no upper bound
    pub max_pending: Option<f64>,
}

impl Default for DebtorFilter {
    fn default() -> Self {
        Self {
            status: StatusFilter::All,
            name: String::new(),
            started_by: None,
            min_pending: 0.0,
            max_pending: None,
        }
    }
}

impl DebtorFilter {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, debtor: &Debtor) -> bool {
        if !self.status.matches(debtor) {
            return false;
        }

        if !self.name.is_empty()
            && !debtor.name.to_lowercase().contains(&self.name.to_lowercase())
        {
            return false;
        }

        if let Some(limit) = self.started_by {
            match debtor.start_date {
                Some(start) if start <= limit => {}
                _ => return false,
            }
        }

        debtor.pending_amount >= self.min_pending
            && self.max_pending.map_or(true, |max| debtor.pending_amount <= max)
    }

    pub fn apply<'a>(&self, debtors: &'a [Debtor]) -> Vec<&'a Debtor> {
        debtors.iter().filter(|d| self.matches(d)).collect()
    }
}

/// Sort debtors in place. Ties fall back to the name.
pub fn sort_debtors(debtors: &mut [&Debtor], column: DebtorSortColumn, ascending: bool) {
    let name_cmp = |a: &Debtor, b: &Debtor| a.name.to_lowercase().cmp(&b.name.to_lowercase());

    debtors.sort_by(|a, b| {
        let cmp = match column {
            DebtorSortColumn::Name => name_cmp(a, b),
            DebtorSortColumn::Pending => a
                .pending_amount
                .partial_cmp(&b.pending_amount)
                .unwrap_or(Ordering::Equal)
                .then_with(|| name_cmp(a, b)),
            // Missing dates sort last
            DebtorSortColumn::NextPayment => cmp_dates(a.next_payment_date, b.next_payment_date)
                .then_with(|| name_cmp(a, b)),
            DebtorSortColumn::StartDate => {
                cmp_dates(a.start_date, b.start_date).then_with(|| name_cmp(a, b))
            }
        };

        if ascending {
            cmp
        } else {
            cmp.reverse()
        }
    });
}

fn cmp_dates(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Active vs. inactive totals for the summary panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub active: usize,
    pub inactive: usize,
}

impl StatusCounts {
    pub fn from_debtors(debtors: &[Debtor]) -> Self {
        let active = debtors.iter().filter(|d| d.is_active()).count();
        Self {
            active,
            inactive: debtors.len() - active,
        }
    }
}
