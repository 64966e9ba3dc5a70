use crate::error::Result;
use crate::schema::{
    KpiData, KpiIndicator, KpiMeasurement, KpiMetadata, TargetOperation, TrendPreference,
};
use crate::utils::period_year;
use chrono::{DateTime, Local, TimeZone};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

pub const CATALOG_VERSION: &str = "1.0";

/// One row of the KPI export. Every column is read as text; numeric columns are
/// parsed while building the catalog so a bad cell only costs its own row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KpiCsvRow {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Time Period", default)]
    pub time_period: String,
    #[serde(rename = "Domain", default)]
    pub domain: String,
    #[serde(rename = "Indicator", default)]
    pub indicator: String,
    #[serde(rename = "Type", default)]
    pub measurement_type: String,
    #[serde(rename = "Value", default)]
    pub value: String,
    #[serde(rename = "Notes", default)]
    pub notes: String,
    #[serde(rename = "Steward", default)]
    pub steward: String,
    #[serde(rename = "Target", default)]
    pub target: String,
    #[serde(rename = "Target Type", default)]
    pub target_type: String,
    #[serde(rename = "Target Operation", default)]
    pub target_operation: String,
    #[serde(rename = "Unit", default)]
    pub unit: String,
    #[serde(rename = "Tags", default)]
    pub tags: String,
    #[serde(rename = "Image", default)]
    pub image: String,
}

#[derive(Debug, Deserialize)]
struct DefinitionRow {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Definition", default)]
    definition: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionOptions {
    /// Steward names rewritten before anything else sees them.
    pub steward_aliases: BTreeMap<String, String>,
    /// Steward listed first in the catalog metadata when present.
    pub pinned_steward: Option<String>,
    pub data_source: String,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            steward_aliases: BTreeMap::from([(
                "HL7".to_string(),
                "HL7 International".to_string(),
            )]),
            pinned_steward: Some("HL7 International".to_string()),
            data_source: "KPI Dashboard - CSV Import".to_string(),
        }
    }
}

pub fn read_rows<R: Read>(reader: R) -> Result<Vec<KpiCsvRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .flexible(true)
        .from_reader(reader);
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Indicator definitions keyed by id.
pub fn read_definitions<R: Read>(reader: R) -> Result<BTreeMap<String, String>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .flexible(true)
        .from_reader(reader);
    let mut definitions = BTreeMap::new();
    for row in csv_reader.deserialize() {
        let row: DefinitionRow = row?;
        definitions.insert(row.id, row.definition);
    }
    Ok(definitions)
}

/// Reads the KPI export (and the definitions table, if given) and builds a catalog
/// stamped with the current local time.
pub fn ingest_csv_files(
    kpi_csv: &Path,
    definitions_csv: Option<&Path>,
    options: &IngestionOptions,
) -> Result<KpiData> {
    let rows = read_rows(File::open(kpi_csv)?)?;
    let definitions = match definitions_csv {
        Some(path) if path.exists() => read_definitions(File::open(path)?)?,
        _ => BTreeMap::new(),
    };
    let data = convert_rows_to_catalog(&rows, &definitions, options, &Local::now());
    info!(
        "Ingested {} indicators over {} periods from {}",
        data.indicators.len(),
        data.metadata.time_periods.len(),
        kpi_csv.display()
    );
    Ok(data)
}

pub fn write_catalog(data: &KpiData, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(data)?)?;
    Ok(())
}

pub fn convert_rows_to_catalog<Tz: TimeZone>(
    rows: &[KpiCsvRow],
    definitions: &BTreeMap<String, String>,
    options: &IngestionOptions,
    generated_at: &DateTime<Tz>,
) -> KpiData
where
    Tz::Offset: std::fmt::Display,
{
    let mut indicators: BTreeMap<String, KpiIndicator> = BTreeMap::new();
    let mut periods = BTreeSet::new();
    let mut domains = BTreeSet::new();
    let mut stewards = BTreeSet::new();

    for row in rows {
        if row.id.is_empty()
            || row.time_period.is_empty()
            || row.domain.is_empty()
            || row.indicator.is_empty()
        {
            continue;
        }

        let row_stewards: Vec<String> = row
            .steward
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                options
                    .steward_aliases
                    .get(s)
                    .cloned()
                    .unwrap_or_else(|| s.to_string())
            })
            .collect();
        if row_stewards.is_empty() {
            debug!("Skipping {} {}: no steward", row.id, row.time_period);
            continue;
        }

        // A row with a bad value still counts towards the catalog's periods.
        periods.insert(row.time_period.clone());
        domains.insert(row.domain.clone());
        stewards.extend(row_stewards.iter().cloned());

        let value = match parse_value(&row.value) {
            Ok(value) => value,
            Err(()) => {
                warn!(
                    "Skipping {} {}: invalid value '{}'",
                    row.id, row.time_period, row.value
                );
                continue;
            }
        };
        let target = row.target.trim().parse::<f64>().ok();
        let image = non_empty(&row.image);

        let indicator = indicators
            .entry(row.id.clone())
            .and_modify(|existing| {
                if as_set(&existing.stewards) != as_set(&row_stewards) {
                    existing.stewards = row_stewards.clone();
                }
                if image.is_some() {
                    existing.image = image.clone();
                }
            })
            .or_insert_with(|| KpiIndicator {
                id: row.id.clone(),
                name: row.indicator.clone(),
                description: describe(definitions.get(&row.id), &row.indicator),
                domain: row.domain.clone(),
                stewards: row_stewards.clone(),
                measurement_type: row.measurement_type.clone(),
                unit: if row.unit.is_empty() {
                    infer_unit(&row.measurement_type, &row.indicator).to_string()
                } else {
                    row.unit.clone()
                },
                target: None,
                targets: None,
                target_operation: None,
                tags: split_tags(&row.tags),
                image: image.clone(),
                trend_direction: TrendPreference::Higher,
                measurements: BTreeMap::new(),
            });

        let mut measurement = KpiMeasurement {
            value,
            target: None,
            notes: non_empty(&row.notes),
        };

        if let Some(target) = target {
            if row.target_type.eq_ignore_ascii_case("annual") {
                indicator
                    .targets
                    .get_or_insert_with(BTreeMap::new)
                    .insert(period_year(&row.time_period).to_string(), target);
                match row.target_operation.to_ascii_lowercase().as_str() {
                    "sum" => indicator.target_operation = Some(TargetOperation::Sum),
                    "average" => indicator.target_operation = Some(TargetOperation::Average),
                    _ => {}
                }
            } else {
                // "period" and blank both mean a per-reading target.
                measurement.target = Some(target);
            }
        }

        indicator
            .measurements
            .insert(row.time_period.clone(), measurement);
    }

    let mut stewards: Vec<String> = stewards.into_iter().collect();
    if let Some(pinned) = &options.pinned_steward {
        if let Some(pos) = stewards.iter().position(|s| s == pinned) {
            let pinned = stewards.remove(pos);
            stewards.insert(0, pinned);
        }
    }

    KpiData {
        metadata: KpiMetadata {
            version: CATALOG_VERSION.to_string(),
            last_updated: generated_at.format("%Y-%m-%d").to_string(),
            data_source: options.data_source.clone(),
            time_periods: periods.into_iter().collect(),
            domains: domains.into_iter().collect(),
            stewards,
            refresh_timestamp: Some(generated_at.timestamp()),
        },
        indicators,
    }
}

/// `Ok(None)` for a blank cell, `Err` for text that is not a number.
fn parse_value(raw: &str) -> std::result::Result<Option<f64>, ()> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.strip_suffix('%')
        .unwrap_or(raw)
        .trim()
        .parse::<f64>()
        .map(Some)
        .map_err(|_| ())
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

fn as_set(stewards: &[String]) -> BTreeSet<&str> {
    stewards.iter().map(String::as_str).collect()
}

/// Definitions look like `**Name**: text`; the text after the bold name is the
/// description. Without a definition the indicator name stands in.
fn describe(definition: Option<&String>, name: &str) -> String {
    let Some(definition) = definition else {
        return name.to_string();
    };

    if !definition.contains("**") {
        return definition.replace('*', "");
    }
    match definition.split("**").nth(2) {
        Some(rest) => rest
            .trim_matches(|c| c == ':' || c == ' ')
            .trim()
            .replace('*', ""),
        None => name.to_string(),
    }
}

pub fn infer_unit(measurement_type: &str, name: &str) -> &'static str {
    match measurement_type {
        "%" => "percentage",
        "Ave per Item" => "average",
        "N" => {
            let name = name.to_lowercase();
            [
                ("members", "members"),
                ("specifications", "specifications"),
                ("standards", "specifications"),
                ("issues", "issues"),
                ("tracks", "tracks"),
                ("countries", "countries"),
                ("participants", "participants"),
                ("months", "months"),
            ]
            .iter()
            .find(|(needle, _)| name.contains(needle))
            .map(|(_, unit)| *unit)
            .unwrap_or("count")
        }
        _ => "count",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const EXPORT: &str = "\
ID,Time Period,Domain,Indicator,Type,Value,Notes,Steward,Target,Target Type,Target Operation,Unit,Tags,Image
CSDO-1,2025-T1,Standards,Published specifications,N,4,,HL7,10,annual,sum,,KPI; Core,
CSDO-1,2025-T2,Standards,Published specifications,N,5,Slipped a ballot,HL7,10,annual,sum,,KPI; Core,csdo-1.png
MEM-1,2025-T1,Membership,Member satisfaction,%,87%,,HL7;Affiliates,90,period,,,,
MEM-1,2025-T2,Membership,Member satisfaction,%,n/a,,HL7,90,period,,,,
MEM-2,2025-T1,Membership,Organizational members,N,,,,,,,,,
,2025-T1,Membership,Orphan,N,1,,HL7,,,,,,
EDU-1,2025,Education,Course completions,N,120,,Education Team,100,,,,,
";

    fn build(definitions: &BTreeMap<String, String>) -> KpiData {
        let rows = read_rows(EXPORT.as_bytes()).unwrap();
        let generated_at = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        convert_rows_to_catalog(&rows, definitions, &IngestionOptions::default(), &generated_at)
    }

    #[test]
    fn test_rows_without_id_or_steward_are_skipped() {
        let data = build(&BTreeMap::new());
        let ids: Vec<&str> = data.indicators.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["CSDO-1", "EDU-1", "MEM-1"]);
    }

    #[test]
    fn test_annual_targets_and_operation() {
        let data = build(&BTreeMap::new());
        let csdo = &data.indicators["CSDO-1"];
        assert_eq!(csdo.targets.as_ref().unwrap()["2025"], 10.0);
        assert_eq!(csdo.target_operation, Some(TargetOperation::Sum));
        assert_eq!(csdo.measurements["2025-T1"].target, None);
        assert_eq!(csdo.tags, vec!["KPI", "Core"]);
        assert_eq!(csdo.unit, "specifications");
        assert_eq!(csdo.image.as_deref(), Some("csdo-1.png"));
        assert_eq!(
            csdo.measurements["2025-T2"].notes.as_deref(),
            Some("Slipped a ballot")
        );
    }

    #[test]
    fn test_period_targets_percent_values_and_invalid_rows() {
        let data = build(&BTreeMap::new());
        let mem = &data.indicators["MEM-1"];
        assert_eq!(mem.measurements["2025-T1"].value, Some(87.0));
        assert_eq!(mem.measurements["2025-T1"].target, Some(90.0));
        // "n/a" is not a number, so the T2 row is dropped.
        assert!(!mem.measurements.contains_key("2025-T2"));
        assert_eq!(mem.stewards, vec!["HL7 International", "Affiliates"]);
        assert_eq!(mem.unit, "percentage");

        // A blank target type still means a per-reading target.
        let edu = &data.indicators["EDU-1"];
        assert_eq!(edu.measurements["2025"].target, Some(100.0));
    }

    #[test]
    fn test_metadata() {
        let data = build(&BTreeMap::new());
        let meta = &data.metadata;
        assert_eq!(meta.version, "1.0");
        assert_eq!(meta.last_updated, "2025-06-30");
        assert_eq!(meta.refresh_timestamp, Some(1_751_284_800));
        assert_eq!(meta.time_periods, vec!["2025", "2025-T1", "2025-T2"]);
        assert_eq!(meta.domains, vec!["Education", "Membership", "Standards"]);
        assert_eq!(
            meta.stewards,
            vec!["HL7 International", "Affiliates", "Education Team"]
        );
    }

    #[test]
    fn test_descriptions_from_definitions() {
        let definitions = read_definitions(
            "ID,Definition\nCSDO-1,\"**Published specifications**: Count of *normative* specs.\"\nMEM-1,Plain text with *emphasis*\n"
                .as_bytes(),
        )
        .unwrap();
        let data = build(&definitions);
        assert_eq!(
            data.indicators["CSDO-1"].description,
            "Count of normative specs."
        );
        assert_eq!(data.indicators["MEM-1"].description, "Plain text with emphasis");
        assert_eq!(data.indicators["EDU-1"].description, "Course completions");
    }

    #[test]
    fn test_short_rows_read_with_blank_trailing_columns() {
        let export = "\
ID,Time Period,Domain,Indicator,Type,Value,Notes,Steward,Target,Target Type,Target Operation,Unit,Tags,Image
A-1,2025-T1,Community,Active tracks,N,5,,HL7,8,period,,,KPI,
A-2,2025-T1,Community,Tracks,N,7,,HL7
A-3,2025-T1,Community,Orphan,N,2
";
        let rows = read_rows(export.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].steward, "HL7");
        assert_eq!(rows[1].target, "");

        let generated_at = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let data = convert_rows_to_catalog(
            &rows,
            &BTreeMap::new(),
            &IngestionOptions::default(),
            &generated_at,
        );
        // The 6-field row has no steward and is skipped like any other.
        let ids: Vec<&str> = data.indicators.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["A-1", "A-2"]);
        assert_eq!(data.indicators["A-2"].measurements["2025-T1"].value, Some(7.0));
        assert_eq!(data.indicators["A-2"].unit, "tracks");
    }

    #[test]
    fn test_rejected_value_still_lists_its_period() {
        let export = "\
ID,Time Period,Domain,Indicator,Type,Value,Notes,Steward,Target,Target Type,Target Operation,Unit,Tags,Image
A-1,2025-T1,Community,Active tracks,N,5,,HL7,,,,,,
A-1,2025-T2,Outreach,Active tracks,N,n/a,,Affiliates,,,,,,
";
        let rows = read_rows(export.as_bytes()).unwrap();
        let generated_at = Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap();
        let data = convert_rows_to_catalog(
            &rows,
            &BTreeMap::new(),
            &IngestionOptions::default(),
            &generated_at,
        );

        assert_eq!(data.metadata.time_periods, vec!["2025-T1", "2025-T2"]);
        assert_eq!(data.metadata.domains, vec!["Community", "Outreach"]);
        assert_eq!(
            data.metadata.stewards,
            vec!["HL7 International", "Affiliates"]
        );
        let measurements = &data.indicators["A-1"].measurements;
        assert_eq!(measurements.len(), 1);
        assert!(measurements.contains_key("2025-T1"));
    }

    #[test]
    fn test_csv_error_message_is_not_prefixed_twice() {
        let err = read_definitions("Name,Definition\nX,Y\n".as_bytes()).unwrap_err();
        match &err {
            crate::error::DashboardError::CsvError(inner) => {
                assert_eq!(err.to_string(), inner.to_string());
            }
            other => panic!("expected a CSV error, got {other:?}"),
        }
    }

    #[test]
    fn test_infer_unit() {
        assert_eq!(infer_unit("N", "Active Work Group Members"), "members");
        assert_eq!(infer_unit("N", "Balloted standards"), "specifications");
        assert_eq!(infer_unit("N", "Widgets"), "count");
        assert_eq!(infer_unit("Ave per Item", "Days to close"), "average");
        assert_eq!(infer_unit("Ratio", "Anything"), "count");
    }

    #[test]
    fn test_catalog_round_trips_through_json_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("processed").join("kpi_data.json");
        let data = build(&BTreeMap::new());
        write_catalog(&data, &path)?;
        let loaded: KpiData = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(loaded, data);
        Ok(())
    }
}
