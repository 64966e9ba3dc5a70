// Prompt text for the external financial analysis step

use crate::records::{FinancialHealthMetrics, FinancialYearRecord};
use std::fmt::Write;

pub const ANALYSIS_INSTRUCTIONS: &str = r#"
## Financial Data Analysis Request

Analyze the financial data below and provide a structured assessment with both positive developments and critical concerns. Format your response as markdown with these sections:

1. **Critical Financial Concerns** - Issues that need attention
2. **Positive Developments** - Areas showing improvement or strength
3. **Strategic Recommendations** - Actions for long-term sustainability
"#;

pub const ANALYSIS_CONTEXT: &str = r#"
## Key Context for Analysis

### Revenue Streams
- **Program Services** (primary revenue): Membership dues, meetings, education, project management
- **Contributions & Grants**: Primarily government and foundation funding
- **Investment Income**: Market-dependent returns
- **Other Revenue**: Miscellaneous sources

### Expense Categories
- **Salaries & Compensation**: Employee costs
- **Other Expenses**: Operational costs, facilities, etc.
- **Management Services**: External management services, reported separately only for years before 2024

## Analysis Requirements

Please provide insights on:

1. **Financial Health Trends**: Multi-year patterns in revenue, expenses, and net income
2. **Revenue Diversification**: Stability and growth of the individual revenue streams and reliance on membership dues
3. **Expense Management**: Efficiency and cost control
4. **Asset Management**: Net asset trends and financial stability
5. **Structural Changes**: Shifts between external management services and internal salaries that affect year-over-year comparisons

## Output Format

Your response must be a complete markdown document that can be saved directly as `financial_insights.md`:

```markdown
# [Organization] Financial Analysis - [Latest Year]

## Critical Financial Concerns

### [Concern Title]
- **Specific Issue**: [Detailed description with data points]
- **Impact**: [Quantified impact with percentages and dollar amounts]
- **Trend**: [Multi-year trend analysis with specific metrics]

## Positive Developments

### [Positive Development Title]
- **Achievement**: [Specific accomplishment with data points]
- **Growth**: [Quantified growth with percentages and dollar amounts]
- **Comparison**: [Year-over-year comparison with specific metrics]

## Strategic Recommendations

1. **[Recommendation]**: [Specific, actionable advice]
```

**Formatting Requirements:**
- Use markdown headers (`#`, `##`, `###`) and `-` bullets
- Use **bold text** for key metrics
- Include specific dollar amounts, percentages, and year-over-year comparisons
"#;

/// Builds the full analysis prompt from the per-year figures.
pub fn build_financial_analysis_prompt(
    organization_name: &str,
    metrics: &FinancialHealthMetrics,
) -> String {
    let mut prompt = format!("# {} Financial Analysis Request\n", organization_name);
    prompt.push_str(ANALYSIS_INSTRUCTIONS);

    let span = match (metrics.years.first(), metrics.years.last()) {
        (Some(first), Some(last)) if first.year != last.year => {
            format!("{}-{}", first.year, last.year)
        }
        (Some(only), _) => only.year.to_string(),
        _ => String::new(),
    };
    let _ = write!(
        prompt,
        "\n## Financial Data ({})\n\n### Year-over-Year Summary\n",
        span
    );

    for record in &metrics.years {
        write_year(&mut prompt, record);
    }

    prompt.push_str(ANALYSIS_CONTEXT);
    prompt
}

fn write_year(out: &mut String, r: &FinancialYearRecord) {
    let ps = &r.program_services;
    let lines = [
        ("- Total Revenue", r.total_revenue),
        ("- Total Expenses", r.total_expenses),
        ("- Net Income", r.net_income()),
        ("- Net Assets", r.net_assets),
    ];

    let _ = writeln!(out, "\n**{}:**", r.year);
    for (label, value) in lines {
        let _ = writeln!(out, "{}: {}", label, currency(value));
    }
    let _ = writeln!(out, "- Employees: {}", r.total_employees);
    let _ = writeln!(
        out,
        "- Program Service Revenue: {}",
        currency(r.program_service_revenue)
    );
    for (label, value) in [
        ("Membership Dues", ps.membership_dues),
        ("Meetings & Conferences", ps.meetings_conferences),
        ("Education & Certification", ps.education_certification),
        ("Project Management Fees", ps.project_management_fees),
        ("Sponsorship Payments", ps.qualified_sponsorship_payments),
        ("Other Program Services", ps.other_program_services),
    ] {
        let _ = writeln!(out, "  - {}: {}", label, currency(value.unwrap_or(0.0)));
    }
    let _ = writeln!(
        out,
        "- Contributions & Grants: {}",
        currency(r.contributions_grants)
    );
    let _ = writeln!(out, "- Investment Income: {}", currency(r.investment_income));
    let _ = writeln!(
        out,
        "- Salaries & Compensation: {}",
        currency(r.salaries_compensation)
    );
    let _ = writeln!(out, "- Other Expenses: {}", currency(r.other_expenses));
    if let Some(management) = r.management_services.filter(|m| *m != 0.0) {
        let _ = writeln!(out, "- Management Services: {}", currency(management));
    }
}

/// Whole dollars with thousands separators, e.g. `$-1,234`.
fn currency(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0.0 {
        format!("$-{}", grouped)
    } else {
        format!("${}", grouped)
    }
}
