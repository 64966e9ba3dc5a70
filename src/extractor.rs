use crate::categories::{classify_other_expense, classify_program_service};
use crate::error::{DashboardError, Result};
use crate::records::{
    DetailedExpenses, FinancialYearRecord, OtherExpenseLines, ProgramServiceBreakdown,
};
use crate::utils::year_prefix;
use log::{debug, info, warn};
use roxmltree::{Document, Node};
use std::fs;
use std::path::Path;

pub const EFILE_NAMESPACE: &str = "http://www.irs.gov/efile";

/// Management services were absorbed into payroll starting with this tax year.
pub const MANAGEMENT_SERVICES_CUTOVER_YEAR: i32 = 2024;

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDocument {
    pub document: String,
    pub reason: String,
}

/// Outcome of extracting a batch of filings. Per-document failures are
/// recorded in `skipped` and never abort the batch.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub records: Vec<FinancialYearRecord>,
    pub skipped: Vec<SkippedDocument>,
}

impl ExtractionBatch {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    fn record_failure(&mut self, document: &str, error: DashboardError) {
        warn!("Skipping {}: {}", document, error);
        self.skipped.push(SkippedDocument {
            document: document.to_string(),
            reason: error.to_string(),
        });
    }
}

pub struct Form990Extractor {
    namespace: String,
}

impl Default for Form990Extractor {
    fn default() -> Self {
        Self::new()
    }
}

impl Form990Extractor {
    pub fn new() -> Self {
        Self {
            namespace: EFILE_NAMESPACE.to_string(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Extracts every `*.xml` file in `dir`, in file-name order.
    pub fn extract_directory(&self, dir: &Path) -> Result<ExtractionBatch> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("xml"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut batch = ExtractionBatch::default();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            match fs::read_to_string(&path) {
                Ok(xml) => match self.extract_str(&name, &xml) {
                    Ok(record) => batch.records.push(record),
                    Err(e) => batch.record_failure(&name, e),
                },
                Err(e) => batch.record_failure(&name, e.into()),
            }
        }

        info!(
            "Extracted {} financial records from {} ({} skipped)",
            batch.records.len(),
            dir.display(),
            batch.skipped_count()
        );
        Ok(batch)
    }

    /// Extracts a batch of in-memory documents given as `(file name, xml text)` pairs.
    pub fn extract_documents<'a, I>(&self, documents: I) -> ExtractionBatch
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut batch = ExtractionBatch::default();
        for (name, xml) in documents {
            match self.extract_str(name, xml) {
                Ok(record) => batch.records.push(record),
                Err(e) => batch.record_failure(name, e),
            }
        }
        batch
    }

    pub fn extract_str(&self, document_name: &str, xml: &str) -> Result<FinancialYearRecord> {
        let doc = Document::parse(xml).map_err(|e| DashboardError::MalformedDocument {
            document: document_name.to_string(),
            details: e.to_string(),
        })?;
        self.extract_document(document_name, &doc)
    }

    pub fn extract_document(
        &self,
        document_name: &str,
        doc: &Document,
    ) -> Result<FinancialYearRecord> {
        let root = doc.root_element();
        let year = self.resolve_year(document_name, root)?;

        let irs990 = root
            .descendants()
            .find(|n| n.has_tag_name((self.namespace.as_str(), "IRS990")))
            .ok_or_else(|| DashboardError::MissingFinancialSection(document_name.to_string()))?;

        let record = Section::new(irs990, &self.namespace).to_record(year);
        debug!(
            "Parsed {} for {}: revenue {:.0}, expenses {:.0}",
            document_name, year, record.total_revenue, record.total_expenses
        );
        Ok(record)
    }

    /// Filename year prefix first, then the filing's `TaxYr` element.
    fn resolve_year(&self, document_name: &str, root: Node) -> Result<i32> {
        let stem = Path::new(document_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        if let Some(year) = year_prefix(&stem) {
            return Ok(year);
        }

        root.descendants()
            .find(|n| n.has_tag_name((self.namespace.as_str(), "TaxYr")))
            .and_then(|n| n.text())
            .and_then(|t| t.trim().parse::<i32>().ok())
            .ok_or_else(|| DashboardError::UnresolvableYear(document_name.to_string()))
    }
}

/// Read-only view over the IRS990 element. Every lookup falls back to a default
/// instead of failing, since optional schedules vary between filing years.
struct Section<'a, 'input> {
    node: Node<'a, 'input>,
    ns: &'a str,
}

impl<'a, 'input> Section<'a, 'input> {
    fn new(node: Node<'a, 'input>, ns: &'a str) -> Self {
        Self { node, ns }
    }

    fn is(&self, node: &Node, name: &str) -> bool {
        node.has_tag_name((self.ns, name))
    }

    fn child(&self, node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
        node.children().find(|c| self.is(c, name))
    }

    fn named(&self, name: &'a str) -> impl Iterator<Item = Node<'a, 'input>> + '_ {
        self.node.descendants().filter(move |n| self.is(n, name))
    }

    /// First element matching a `Group/Child` path, searching groups at any depth.
    fn find(&self, path: &str) -> Option<Node<'a, 'input>> {
        let mut steps = path.split('/');
        let head = steps.next()?;
        let rest: Vec<&str> = steps.collect();

        self.node
            .descendants()
            .filter(|n| self.is(n, head))
            .find_map(|start| {
                rest.iter()
                    .try_fold(start, |node, step| self.child(node, step))
            })
    }

    fn text(&self, path: &str) -> Option<&'a str> {
        self.find(path).and_then(|n| n.text())
    }

    fn amount(&self, path: &str) -> f64 {
        self.text(path)
            .and_then(|t| t.trim().parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    fn count(&self, path: &str) -> u32 {
        self.text(path)
            .and_then(|t| t.trim().parse::<u32>().ok())
            .unwrap_or(0)
    }

    fn to_record(&self, year: i32) -> FinancialYearRecord {
        let program_service_revenue = self.amount("CYProgramServiceRevenueAmt");

        let management_services = if year < MANAGEMENT_SERVICES_CUTOVER_YEAR {
            Some(self.amount("FeesForServicesManagementGrp/TotalAmt"))
        } else {
            None
        };

        FinancialYearRecord {
            year,
            total_revenue: self.amount("CYTotalRevenueAmt"),
            total_expenses: self.amount("CYTotalExpensesAmt"),
            program_service_revenue,
            contributions_grants: self.amount("CYContributionsGrantsAmt"),
            investment_income: self.amount("CYInvestmentIncomeAmt"),
            other_revenue: self.amount("CYOtherRevenueAmt"),
            program_services: self.program_services(program_service_revenue),
            salaries_compensation: self.amount("CYSalariesCompEmpBnftPaidAmt"),
            other_expenses: self.amount("CYOtherExpensesAmt"),
            management_services,
            detailed_expenses: self.detailed_expenses(),
            other_expense_lines: self.other_expense_lines(),
            total_assets: self.amount("TotalAssetsEOYAmt"),
            total_liabilities: self.amount("TotalLiabilitiesEOYAmt"),
            net_assets: self.amount("NetAssetsOrFundBalancesEOYAmt"),
            total_employees: self.count("TotalEmployeeCnt"),
            total_volunteers: self.count("TotalVolunteersCnt"),
        }
    }

    fn detailed_expenses(&self) -> DetailedExpenses {
        DetailedExpenses {
            fees_for_services_legal: self.amount("FeesForServicesLegalGrp/TotalAmt"),
            fees_for_services_accounting: self.amount("FeesForServicesAccountingGrp/TotalAmt"),
            fees_for_services_investment: self.amount("FeesForSrvcInvstMgmntFeesGrp/TotalAmt"),
            fees_for_services_other: self.amount("FeesForServicesOtherGrp/TotalAmt"),
            compensation_officers_directors: self.amount("CompCurrentOfcrDirectorsGrp/TotalAmt"),
            land_building_equipment_cost: self.amount("LandBldgEquipCostOrOtherBssAmt"),
            advertising: self.amount("AdvertisingGrp/TotalAmt"),
            office_expenses: self.amount("OfficeExpensesGrp/TotalAmt"),
            information_technology: self.amount("InformationTechnologyGrp/TotalAmt"),
            royalties: self.amount("RoyaltiesGrp/TotalAmt"),
            occupancy: self.amount("OccupancyGrp/TotalAmt"),
            travel: self.amount("TravelGrp/TotalAmt"),
            conferences_meetings: self.amount("ConferencesMeetingsGrp/TotalAmt"),
            interest: self.amount("InterestGrp/TotalAmt"),
            payments_to_affiliates: self.amount("PaymentsToAffiliatesGrp/TotalAmt"),
            depreciation: self.amount("DepreciationDepletionGrp/TotalAmt"),
            insurance: self.amount("InsuranceGrp/TotalAmt"),
            all_other_expenses: self.amount("AllOtherExpensesGrp/TotalAmt"),
        }
    }

    fn program_services(&self, reported_total: f64) -> ProgramServiceBreakdown {
        let mut breakdown = ProgramServiceBreakdown::default();

        for group in self.named("ProgramServiceRevenueGrp") {
            let (Some(desc), Some(amount)) = (
                self.child(group, "Desc"),
                self.child(group, "TotalRevenueColumnAmt"),
            ) else {
                continue;
            };
            let Some(category) = desc.text().and_then(classify_program_service) else {
                continue;
            };

            let slot = breakdown.slot_mut(category);
            if slot.is_none() {
                let value = amount
                    .text()
                    .and_then(|t| t.trim().parse::<f64>().ok())
                    .unwrap_or(0.0);
                *slot = Some(value);
            }
        }

        let named_total = breakdown.named_total();
        if named_total < reported_total {
            breakdown.other_program_services = Some(reported_total - named_total);
        }
        breakdown
    }

    fn other_expense_lines(&self) -> OtherExpenseLines {
        let mut lines = OtherExpenseLines::default();

        for group in self.named("OtherExpensesGrp") {
            let Some(category) = self
                .child(group, "Desc")
                .and_then(|d| d.text())
                .and_then(classify_other_expense)
            else {
                continue;
            };

            let slot = lines.slot_mut(category);
            if slot.is_some() {
                continue;
            }
            // An unreadable amount leaves the line open for a later matching group.
            *slot = self
                .child(group, "TotalAmt")
                .and_then(|a| a.text())
                .and_then(|t| t.trim().parse::<f64>().ok());
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filing(tax_year: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<Return xmlns="http://www.irs.gov/efile" returnVersion="2023v4.0">
  <ReturnHeader><TaxYr>{}</TaxYr></ReturnHeader>
  <ReturnData>
    <IRS990>{}</IRS990>
  </ReturnData>
</Return>"#,
            tax_year, body
        )
    }

    const CORE_FIELDS: &str = r#"
      <CYTotalRevenueAmt>1000000</CYTotalRevenueAmt>
      <CYTotalExpensesAmt>1200000</CYTotalExpensesAmt>
      <CYProgramServiceRevenueAmt>800000</CYProgramServiceRevenueAmt>
      <CYContributionsGrantsAmt>150000</CYContributionsGrantsAmt>
      <CYInvestmentIncomeAmt>30000</CYInvestmentIncomeAmt>
      <CYOtherRevenueAmt>20000</CYOtherRevenueAmt>
      <CYSalariesCompEmpBnftPaidAmt>400000</CYSalariesCompEmpBnftPaidAmt>
      <CYOtherExpensesAmt>500000</CYOtherExpensesAmt>
      <TotalAssetsEOYAmt>5000000</TotalAssetsEOYAmt>
      <TotalLiabilitiesEOYAmt>1000000</TotalLiabilitiesEOYAmt>
      <NetAssetsOrFundBalancesEOYAmt>4000000</NetAssetsOrFundBalancesEOYAmt>
      <TotalEmployeeCnt>25</TotalEmployeeCnt>
      <TotalVolunteersCnt>300</TotalVolunteersCnt>
      <FeesForServicesManagementGrp><TotalAmt>300000</TotalAmt></FeesForServicesManagementGrp>
      <TravelGrp><TotalAmt>12000</TotalAmt><ProgramServicesAmt>9000</ProgramServicesAmt></TravelGrp>
      <ProgramServiceRevenueGrp>
        <Desc>MEMBERSHIP DUES</Desc>
        <TotalRevenueColumnAmt>500000</TotalRevenueColumnAmt>
      </ProgramServiceRevenueGrp>
      <ProgramServiceRevenueGrp>
        <Desc>Conferences &amp; Meetings</Desc>
        <TotalRevenueColumnAmt>200000</TotalRevenueColumnAmt>
      </ProgramServiceRevenueGrp>
      <ProgramServiceRevenueGrp>
        <Desc>ONC GRANT</Desc>
        <TotalRevenueColumnAmt>40000</TotalRevenueColumnAmt>
      </ProgramServiceRevenueGrp>
      <OtherExpensesGrp>
        <Desc>Credit card and bank fees</Desc>
        <TotalAmt>15000</TotalAmt>
      </OtherExpensesGrp>
    "#;

    #[test]
    fn test_extracts_core_fields() {
        let xml = filing("2023", CORE_FIELDS);
        let record = Form990Extractor::new()
            .extract_str("2023_990.xml", &xml)
            .unwrap();

        assert_eq!(record.year, 2023);
        assert_eq!(record.total_revenue, 1_000_000.0);
        assert_eq!(record.net_income(), -200_000.0);
        assert_eq!(record.total_employees, 25);
        assert_eq!(record.total_volunteers, 300);
        assert_eq!(record.detailed_expenses.travel, 12_000.0);
        assert_eq!(record.detailed_expenses.advertising, 0.0);
        assert_eq!(record.management_services, Some(300_000.0));
        assert_eq!(
            record.other_expense_lines.credit_card_bank_fees,
            Some(15_000.0)
        );
        assert_eq!(record.other_expense_lines.equipment_rental, None);
    }

    #[test]
    fn test_program_service_residual() {
        let xml = filing("2023", CORE_FIELDS);
        let record = Form990Extractor::new()
            .extract_str("2023_990.xml", &xml)
            .unwrap();

        let ps = &record.program_services;
        assert_eq!(ps.membership_dues, Some(500_000.0));
        assert_eq!(ps.meetings_conferences, Some(200_000.0));
        assert_eq!(ps.education_certification, None);
        assert_eq!(ps.other_program_services, Some(100_000.0));
    }

    #[test]
    fn test_no_residual_when_named_categories_cover_total() {
        let body = r#"
          <CYProgramServiceRevenueAmt>100</CYProgramServiceRevenueAmt>
          <ProgramServiceRevenueGrp>
            <Desc>Member dues</Desc>
            <TotalRevenueColumnAmt>120</TotalRevenueColumnAmt>
          </ProgramServiceRevenueGrp>
        "#;
        let record = Form990Extractor::new()
            .extract_str("2019_990.xml", &filing("2019", body))
            .unwrap();
        assert_eq!(record.program_services.membership_dues, Some(120.0));
        assert_eq!(record.program_services.other_program_services, None);
    }

    #[test]
    fn test_first_matching_group_wins() {
        let body = r#"
          <ProgramServiceRevenueGrp>
            <Desc>Membership dues</Desc>
            <TotalRevenueColumnAmt>10</TotalRevenueColumnAmt>
          </ProgramServiceRevenueGrp>
          <ProgramServiceRevenueGrp>
            <Desc>Member dues (late)</Desc>
            <TotalRevenueColumnAmt>99</TotalRevenueColumnAmt>
          </ProgramServiceRevenueGrp>
        "#;
        let record = Form990Extractor::new()
            .extract_str("2020.xml", &filing("2020", body))
            .unwrap();
        assert_eq!(record.program_services.membership_dues, Some(10.0));
    }

    #[test]
    fn test_management_services_absent_from_cutover_year() {
        let xml = filing("2024", CORE_FIELDS);
        let record = Form990Extractor::new()
            .extract_str("2024_990.xml", &xml)
            .unwrap();
        assert_eq!(record.management_services, None);

        let pre = Form990Extractor::new()
            .extract_str("2022_990.xml", &filing("2022", "<CYTotalRevenueAmt>5</CYTotalRevenueAmt>"))
            .unwrap();
        assert_eq!(pre.management_services, Some(0.0));
    }

    #[test]
    fn test_missing_and_non_numeric_fields_use_defaults() {
        let body = r#"
          <CYTotalRevenueAmt>not a number</CYTotalRevenueAmt>
          <CYTotalExpensesAmt>500</CYTotalExpensesAmt>
          <TotalEmployeeCnt>12.5</TotalEmployeeCnt>
        "#;
        let record = Form990Extractor::new()
            .extract_str("2021_990.xml", &filing("2021", body))
            .unwrap();
        assert_eq!(record.total_revenue, 0.0);
        assert_eq!(record.total_expenses, 500.0);
        assert_eq!(record.net_income(), -500.0);
        assert_eq!(record.total_employees, 0);
        assert_eq!(record.net_assets, 0.0);
    }

    #[test]
    fn test_year_falls_back_to_tax_year_element() {
        let record = Form990Extractor::new()
            .extract_str("hl7_return.xml", &filing("2018", ""))
            .unwrap();
        assert_eq!(record.year, 2018);

        let err = Form990Extractor::new()
            .extract_str("hl7_return.xml", &filing("unknown", ""))
            .unwrap_err();
        assert!(matches!(err, DashboardError::UnresolvableYear(_)));
    }

    #[test]
    fn test_filename_year_takes_precedence() {
        let record = Form990Extractor::new()
            .extract_str("2017_amended.xml", &filing("2016", ""))
            .unwrap();
        assert_eq!(record.year, 2017);
    }

    #[test]
    fn test_batch_skips_bad_documents() {
        let good = filing("2022", CORE_FIELDS);
        let no_section = r#"<Return xmlns="http://www.irs.gov/efile"><ReturnData/></Return>"#;
        let broken = "<Return><IRS990>";

        let batch = Form990Extractor::new().extract_documents(vec![
            ("2022_990.xml", good.as_str()),
            ("2021_990.xml", no_section),
            ("2020_990.xml", broken),
        ]);

        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.skipped_count(), 2);
        assert_eq!(batch.skipped[0].document, "2021_990.xml");
        assert!(batch.skipped[0].reason.contains("IRS990"));
    }

    #[test]
    fn test_foreign_namespace_is_not_matched() {
        let xml = r#"<Return xmlns="urn:other"><IRS990><CYTotalRevenueAmt>1</CYTotalRevenueAmt></IRS990></Return>"#;
        let err = Form990Extractor::new()
            .extract_str("2022.xml", xml)
            .unwrap_err();
        assert!(matches!(err, DashboardError::MissingFinancialSection(_)));

        let record = Form990Extractor::new()
            .with_namespace("urn:other")
            .extract_str("2022.xml", xml)
            .unwrap();
        assert_eq!(record.total_revenue, 1.0);
    }
}
