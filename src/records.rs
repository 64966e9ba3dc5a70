use serde::{Deserialize, Serialize, Serializer};

/// Breakdown of program-service revenue by the categories that recur across filing years.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramServiceBreakdown {
    pub membership_dues: Option<f64>,
    pub meetings_conferences: Option<f64>,
    pub education_certification: Option<f64>,
    pub project_management_fees: Option<f64>,
    pub qualified_sponsorship_payments: Option<f64>,
    /// Residual of reported program-service revenue not covered by the named categories.
    pub other_program_services: Option<f64>,
}

impl ProgramServiceBreakdown {
    pub fn named_total(&self) -> f64 {
        [
            self.membership_dues,
            self.meetings_conferences,
            self.education_certification,
            self.project_management_fees,
            self.qualified_sponsorship_payments,
        ]
        .iter()
        .map(|v| v.unwrap_or(0.0))
        .sum()
    }
}

/// Functional expense lines from Part IX that are read by element name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedExpenses {
    pub fees_for_services_legal: f64,
    pub fees_for_services_accounting: f64,
    pub fees_for_services_investment: f64,
    pub fees_for_services_other: f64,
    pub compensation_officers_directors: f64,
    pub land_building_equipment_cost: f64,
    pub advertising: f64,
    pub office_expenses: f64,
    pub information_technology: f64,
    pub royalties: f64,
    pub occupancy: f64,
    pub travel: f64,
    pub conferences_meetings: f64,
    pub interest: f64,
    pub payments_to_affiliates: f64,
    pub depreciation: f64,
    pub insurance: f64,
    pub all_other_expenses: f64,
}

/// "Other expense" lines matched by their free-text description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OtherExpenseLines {
    pub equipment_rental: Option<f64>,
    pub distance_elearning: Option<f64>,
    pub credit_card_bank_fees: Option<f64>,
    pub fees_licenses: Option<f64>,
    pub exhibit_expense: Option<f64>,
}

/// One tax year's financial snapshot extracted from a Form 990 filing.
///
/// Net income is never stored; it is always `total_revenue - total_expenses`.
/// Serialized metrics still carry it, see [`FinancialHealthMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialYearRecord {
    pub year: i32,
    pub total_revenue: f64,
    pub total_expenses: f64,

    pub program_service_revenue: f64,
    pub contributions_grants: f64,
    pub investment_income: f64,
    pub other_revenue: f64,
    #[serde(default)]
    pub program_services: ProgramServiceBreakdown,

    pub salaries_compensation: f64,
    pub other_expenses: f64,
    /// External management fees, tracked only for years before the cutover.
    #[serde(default)]
    pub management_services: Option<f64>,
    #[serde(default)]
    pub detailed_expenses: DetailedExpenses,
    #[serde(default)]
    pub other_expense_lines: OtherExpenseLines,

    pub total_assets: f64,
    pub total_liabilities: f64,
    pub net_assets: f64,

    pub total_employees: u32,
    pub total_volunteers: u32,
}

impl FinancialYearRecord {
    pub fn net_income(&self) -> f64 {
        self.total_revenue - self.total_expenses
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTrendPoint {
    pub year: i32,
    pub revenue: f64,
    pub expenses: f64,
    pub net_income: f64,
    /// Growth against the previous available record; `None` when its base is not positive.
    pub revenue_growth: Option<f64>,
    pub expense_growth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueCompositionPoint {
    pub year: i32,
    pub program_services: f64,
    pub contributions: f64,
    pub investment_income: f64,
    pub other_revenue: f64,
}

impl From<&FinancialYearRecord> for RevenueCompositionPoint {
    fn from(record: &FinancialYearRecord) -> Self {
        Self {
            year: record.year,
            program_services: record.program_service_revenue,
            contributions: record.contributions_grants,
            investment_income: record.investment_income,
            other_revenue: record.other_revenue,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialHealthMetrics {
    /// Records in ascending year order. Each serializes with its `net_income`,
    /// which is ignored when read back.
    #[serde(serialize_with = "serialize_years")]
    pub years: Vec<FinancialYearRecord>,
    pub revenue_trend: Vec<FinancialTrendPoint>,
    pub revenue_composition: Vec<RevenueCompositionPoint>,
    pub latest_year: i32,
    pub years_available: Vec<i32>,
}

#[derive(Serialize)]
struct YearWithNetIncome<'a> {
    #[serde(flatten)]
    record: &'a FinancialYearRecord,
    net_income: f64,
}

fn serialize_years<S: Serializer>(
    years: &[FinancialYearRecord],
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(years.iter().map(|record| YearWithNetIncome {
        record,
        net_income: record.net_income(),
    }))
}

impl FinancialHealthMetrics {
    pub fn latest(&self) -> Option<&FinancialYearRecord> {
        self.years.last()
    }

    pub fn previous(&self) -> Option<&FinancialYearRecord> {
        self.years.len().checked_sub(2).and_then(|i| self.years.get(i))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub latest_year: i32,
    pub previous_year: Option<i32>,
    pub total_revenue: f64,
    pub total_expenses: f64,
    pub net_income: f64,
    pub net_assets: f64,
    pub revenue_change: Option<f64>,
    pub expense_change: Option<f64>,
    pub net_income_change: f64,
    pub net_assets_change: f64,
    pub net_assets_change_pct: Option<f64>,
    /// True exactly when latest net income exceeds the previous year's.
    pub net_income_improved: bool,
    pub total_employees: u32,
    pub total_volunteers: u32,
    pub years_available: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTableRow {
    pub name: String,
    pub bold: bool,
    pub values: Vec<f64>,
    pub change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTable {
    pub years: Vec<String>,
    pub year_span: String,
    pub metrics: Vec<FinancialTableRow>,
}
