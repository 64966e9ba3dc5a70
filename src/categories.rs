//! Description-to-category matching tables for Form 990 line items whose labels
//! drift between filing years. Add a needle here when a new label appears.

use crate::records::{OtherExpenseLines, ProgramServiceBreakdown};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramServiceCategory {
    MembershipDues,
    MeetingsConferences,
    EducationCertification,
    ProjectManagementFees,
    SponsorshipPayments,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtherExpenseCategory {
    EquipmentRental,
    DistanceElearning,
    CreditCardBankFees,
    FeesLicenses,
    ExhibitExpense,
}

/// Rules are tried in order; the first rule with a needle contained in the
/// lowercased description classifies the line.
pub const PROGRAM_SERVICE_RULES: &[(&[&str], ProgramServiceCategory)] = &[
    (
        &["member dues", "membership dues"],
        ProgramServiceCategory::MembershipDues,
    ),
    (
        &["meetings", "conferences"],
        ProgramServiceCategory::MeetingsConferences,
    ),
    (
        &["education", "certification"],
        ProgramServiceCategory::EducationCertification,
    ),
    (
        &["project management"],
        ProgramServiceCategory::ProjectManagementFees,
    ),
    (&["sponsorship"], ProgramServiceCategory::SponsorshipPayments),
];

pub const OTHER_EXPENSE_RULES: &[(&[&str], OtherExpenseCategory)] = &[
    (&["equipment rental"], OtherExpenseCategory::EquipmentRental),
    (&["distance elearning"], OtherExpenseCategory::DistanceElearning),
    (
        &["credit card and bank fees"],
        OtherExpenseCategory::CreditCardBankFees,
    ),
    (&["fees and licenses"], OtherExpenseCategory::FeesLicenses),
    (&["exhibit expense"], OtherExpenseCategory::ExhibitExpense),
];

fn classify<C: Copy>(rules: &[(&[&str], C)], description: &str) -> Option<C> {
    let description = description.to_lowercase();
    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| description.contains(n)))
        .map(|(_, category)| *category)
}

pub fn classify_program_service(description: &str) -> Option<ProgramServiceCategory> {
    classify(PROGRAM_SERVICE_RULES, description)
}

pub fn classify_other_expense(description: &str) -> Option<OtherExpenseCategory> {
    classify(OTHER_EXPENSE_RULES, description)
}

impl ProgramServiceBreakdown {
    pub fn slot_mut(&mut self, category: ProgramServiceCategory) -> &mut Option<f64> {
        match category {
            ProgramServiceCategory::MembershipDues => &mut self.membership_dues,
            ProgramServiceCategory::MeetingsConferences => &mut self.meetings_conferences,
            ProgramServiceCategory::EducationCertification => &mut self.education_certification,
            ProgramServiceCategory::ProjectManagementFees => &mut self.project_management_fees,
            ProgramServiceCategory::SponsorshipPayments => {
                &mut self.qualified_sponsorship_payments
            }
        }
    }
}

impl OtherExpenseLines {
    pub fn slot_mut(&mut self, category: OtherExpenseCategory) -> &mut Option<f64> {
        match category {
            OtherExpenseCategory::EquipmentRental => &mut self.equipment_rental,
            OtherExpenseCategory::DistanceElearning => &mut self.distance_elearning,
            OtherExpenseCategory::CreditCardBankFees => &mut self.credit_card_bank_fees,
            OtherExpenseCategory::FeesLicenses => &mut self.fees_licenses,
            OtherExpenseCategory::ExhibitExpense => &mut self.exhibit_expense,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_drift_maps_to_same_category() {
        assert_eq!(
            classify_program_service("MEMBERSHIP DUES"),
            Some(ProgramServiceCategory::MembershipDues)
        );
        assert_eq!(
            classify_program_service("Member Dues"),
            Some(ProgramServiceCategory::MembershipDues)
        );
        assert_eq!(
            classify_program_service("Conferences & Meetings"),
            Some(ProgramServiceCategory::MeetingsConferences)
        );
    }

    #[test]
    fn test_first_rule_wins() {
        // Matches both the meetings and education needles; meetings is listed first.
        assert_eq!(
            classify_program_service("Education meetings"),
            Some(ProgramServiceCategory::MeetingsConferences)
        );
    }

    #[test]
    fn test_unmatched_descriptions() {
        assert_eq!(classify_program_service("ONC GRANT"), None);
        assert_eq!(classify_other_expense("Postage"), None);
        assert_eq!(
            classify_other_expense("Credit Card and Bank Fees"),
            Some(OtherExpenseCategory::CreditCardBankFees)
        );
    }
}
