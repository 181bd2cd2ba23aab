//! Laboratory: tests, results, parameters, normal ranges, templates,
//! workflow steps, equipment and quality control.
//!
//! Templates reference parameters and parameters reference normal ranges by
//! id. On create or update those relations accept nested objects (created in
//! the same unit of work as the parent), ids of existing records, or a JSON
//! string holding such an array. Reads resolve them two levels deep.

use async_trait::async_trait;
use database_layer::{document_id, Document, UnitOfWork};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::auth::Page;
use crate::error::{ApiError, ApiResult};
use crate::handlers::common::crud::stage_new;
use crate::handlers::common::{
    active_by_default, fill_display_name, text_field, CodeSpec, RecordMeta, Resource, SortOrder, WriteMode,
};
use crate::server::CareDeskServer;
use crate::validation::{is_valid_date, FieldErrors, RequestValidation};

pub const PARAMETERS_FIELD: &str = "parameters";
pub const NORMAL_RANGES_FIELD: &str = "normalRanges";
pub const RESULTS_FIELD: &str = "results";

// ============================================================================
// RESULT FLAGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResultFlag {
    Normal,
    Low,
    High,
    CriticalLow,
    CriticalHigh,
    Abnormal,
}

/// Reference interval a numeric value is judged against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReferenceBounds {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub critical_min: Option<f64>,
    pub critical_max: Option<f64>,
}

impl ReferenceBounds {
    /// Critical bounds take precedence over the normal interval.
    pub fn classify(&self, value: f64) -> ResultFlag {
        if self.critical_min.is_some_and(|limit| value < limit) {
            ResultFlag::CriticalLow
        } else if self.critical_max.is_some_and(|limit| value > limit) {
            ResultFlag::CriticalHigh
        } else if self.min_value.is_some_and(|limit| value < limit) {
            ResultFlag::Low
        } else if self.max_value.is_some_and(|limit| value > limit) {
            ResultFlag::High
        } else {
            ResultFlag::Normal
        }
    }

    fn is_empty(&self) -> bool {
        self.min_value.is_none()
            && self.max_value.is_none()
            && self.critical_min.is_none()
            && self.critical_max.is_none()
    }

    fn check(&self, errors: &mut FieldErrors) {
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            errors.check("maxValue", max >= min, "maxValue must not be below minValue");
        }
        if let (Some(min), Some(max)) = (self.critical_min, self.critical_max) {
            errors.check("criticalMax", max >= min, "criticalMax must not be below criticalMin");
        }
    }
}

// ============================================================================
// LAB TESTS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LabTestPriority {
    #[default]
    Routine,
    Urgent,
    Stat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum LabTestStatus {
    #[default]
    Ordered,
    SampleCollected,
    InProgress,
    Completed,
    Cancelled,
}

/// Normal range copied into a lab test when it is ordered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NormalRangeSnapshot {
    pub parameter_id: Option<String>,
    pub parameter_name: Option<String>,
    pub unit: Option<String>,
    pub gender: Option<RangeGender>,
    pub age_min: Option<f64>,
    pub age_max: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub critical_min: Option<f64>,
    pub critical_max: Option<f64>,
    pub text_value: Option<String>,
    pub description: Option<String>,
}

impl NormalRangeSnapshot {
    fn bounds(&self) -> ReferenceBounds {
        ReferenceBounds {
            min_value: self.min_value,
            max_value: self.max_value,
            critical_min: self.critical_min,
            critical_max: self.critical_max,
        }
    }
}

/// Result line embedded in a lab test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabTestResultEntry {
    pub parameter_id: Option<String>,
    pub parameter_name: String,
    pub value: Option<f64>,
    pub text_value: Option<String>,
    pub unit: Option<String>,
    pub flag: Option<ResultFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabTest {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub test_code: Option<String>,
    pub template_id: Option<String>,
    pub test_name: String,
    pub category: Option<String>,
    pub sample_type: Option<String>,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    #[serde(default)]
    pub priority: LabTestPriority,
    #[serde(default)]
    pub status: LabTestStatus,
    pub price: Option<f64>,
    pub sample_collected_at: Option<String>,
    pub completed_at: Option<String>,
    pub technician_id: Option<String>,
    #[serde(default)]
    pub results: Vec<LabTestResultEntry>,
    #[serde(default)]
    pub normal_ranges: Vec<NormalRangeSnapshot>,
    pub notes: Option<String>,
}

impl RequestValidation for LabTest {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("testName", &self.test_name);
        errors.required("patientId", &self.patient_id);
        if let Some(price) = self.price {
            errors.non_negative("price", price);
        }
        for (index, result) in self.results.iter().enumerate() {
            errors.required(&format!("results[{index}].parameterName"), &result.parameter_name);
        }
        errors.into_result()
    }
}

impl LabTest {
    /// Flag embedded numeric results against the snapshot range of their
    /// parameter when the caller did not flag them.
    fn flag_results(&mut self) {
        for result in self.results.iter_mut().filter(|r| r.flag.is_none()) {
            let (Some(value), Some(parameter_id)) = (result.value, result.parameter_id.as_deref()) else {
                continue;
            };
            let bounds = self
                .normal_ranges
                .iter()
                .find(|range| range.parameter_id.as_deref() == Some(parameter_id))
                .map(NormalRangeSnapshot::bounds)
                .filter(|bounds| !bounds.is_empty());
            if let Some(bounds) = bounds {
                result.flag = Some(bounds.classify(value));
            }
        }
    }
}

pub struct LabTests;

#[async_trait]
impl Resource for LabTests {
    type Record = LabTest;

    const COLLECTION: &'static str = "lab-tests";
    const LABEL: &'static str = "Lab test";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &[
        "status",
        "priority",
        "category",
        "patientId",
        "doctorId",
        "templateId",
    ];
    const SEARCH: &'static [&'static str] = &["testCode", "testName", "patientName"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const CODE: Option<CodeSpec> = Some(CodeSpec {
        field: "testCode",
        prefix: "LT",
    });

    /// Ordering from a template copies its descriptive fields and snapshots
    /// the normal ranges of its parameters.
    async fn expand(
        server: &CareDeskServer,
        _id: &str,
        payload: &mut Document,
        mode: WriteMode,
    ) -> ApiResult<UnitOfWork> {
        if mode != WriteMode::Create {
            return Ok(UnitOfWork::new());
        }
        let Some(template_id) = text_field(payload, "templateId").filter(|id| !id.is_empty()) else {
            return Ok(UnitOfWork::new());
        };
        let template = server
            .store
            .get(LabTestTemplates::COLLECTION, &template_id)
            .await?
            .ok_or_else(|| {
                ApiError::validation(format!("templateId references unknown lab test template '{template_id}'"))
            })?;

        for (target, source) in [
            ("testName", "name"),
            ("category", "category"),
            ("sampleType", "sampleType"),
            ("price", "price"),
        ] {
            let missing = payload.get(target).map_or(true, Value::is_null);
            if let (true, Some(value)) = (missing, template.get(source)) {
                payload.insert(target.to_string(), value.clone());
            }
        }

        if !payload.contains_key(NORMAL_RANGES_FIELD) {
            let snapshot = snapshot_normal_ranges(server, &template).await?;
            payload.insert(NORMAL_RANGES_FIELD.to_string(), Value::Array(snapshot));
        }
        Ok(UnitOfWork::new())
    }

    fn derive(test: &mut LabTest) -> ApiResult<()> {
        test.flag_results();
        Ok(())
    }

    /// Unflag numeric results judged against a snapshot range unless the
    /// update sends its own results.
    fn reset_derived(stored: &mut Document, changes: &Document) {
        if changes.contains_key(RESULTS_FIELD) {
            return;
        }
        let ranges = changes.get(NORMAL_RANGES_FIELD).or_else(|| stored.get(NORMAL_RANGES_FIELD));
        let ranged: Vec<String> = ranges
            .and_then(Value::as_array)
            .map(|ranges| {
                ranges
                    .iter()
                    .filter_map(|range| range.get("parameterId").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let Some(Value::Array(results)) = stored.get_mut(RESULTS_FIELD) else {
            return;
        };
        for result in results.iter_mut().filter_map(Value::as_object_mut) {
            let judged = result.get("value").is_some_and(Value::is_number)
                && result
                    .get("parameterId")
                    .and_then(Value::as_str)
                    .is_some_and(|id| ranged.iter().any(|r| r == id));
            if judged {
                result.remove("flag");
            }
        }
    }

    async fn enrich(server: &CareDeskServer, test: &mut LabTest) -> ApiResult<()> {
        fill_display_name(server, &mut test.patient_name, "patients", Some(&test.patient_id), "fullName").await?;
        fill_display_name(server, &mut test.doctor_name, "users", test.doctor_id.as_deref(), "fullName").await
    }
}

/// Copy every normal range of every parameter of a template.
async fn snapshot_normal_ranges(server: &CareDeskServer, template: &Document) -> ApiResult<Vec<Value>> {
    let parameter_ids = reference_ids(template, PARAMETERS_FIELD);
    let parameters = server
        .store
        .get_many(LabParameters::COLLECTION, &parameter_ids)
        .await?;

    let mut snapshot = Vec::new();
    for parameter in parameters {
        let range_ids = reference_ids(&parameter, NORMAL_RANGES_FIELD);
        let ranges = server
            .store
            .get_many(LabNormalRanges::COLLECTION, &range_ids)
            .await?;
        for range in ranges {
            let mut entry = Document::new();
            entry.insert("parameterId".to_string(), parameter.get("id").cloned().unwrap_or(Value::Null));
            entry.insert("parameterName".to_string(), parameter.get("name").cloned().unwrap_or(Value::Null));
            let unit = range.get("unit").or_else(|| parameter.get("unit"));
            entry.insert("unit".to_string(), unit.cloned().unwrap_or(Value::Null));
            for field in [
                "gender",
                "ageMin",
                "ageMax",
                "minValue",
                "maxValue",
                "criticalMin",
                "criticalMax",
                "textValue",
                "description",
            ] {
                if let Some(value) = range.get(field) {
                    entry.insert(field.to_string(), value.clone());
                }
            }
            snapshot.push(Value::Object(entry));
        }
    }
    Ok(snapshot)
}

// ============================================================================
// LAB RESULTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabResult {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub lab_test_id: String,
    pub parameter_id: Option<String>,
    pub parameter_name: Option<String>,
    pub value: Option<f64>,
    pub text_value: Option<String>,
    pub unit: Option<String>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub critical_min: Option<f64>,
    pub critical_max: Option<f64>,
    /// Derived from `value` and the bounds when omitted
    pub flag: Option<ResultFlag>,
    pub performed_by: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<String>,
    pub notes: Option<String>,
}

impl LabResult {
    fn bounds(&self) -> ReferenceBounds {
        ReferenceBounds {
            min_value: self.min_value,
            max_value: self.max_value,
            critical_min: self.critical_min,
            critical_max: self.critical_max,
        }
    }
}

impl RequestValidation for LabResult {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("labTestId", &self.lab_test_id);
        errors.check(
            "value",
            self.value.is_some() || self.text_value.is_some(),
            "either value or textValue is required",
        );
        self.bounds().check(&mut errors);
        errors.into_result()
    }
}

pub struct LabResults;

#[async_trait]
impl Resource for LabResults {
    type Record = LabResult;

    const COLLECTION: &'static str = "lab-results";
    const LABEL: &'static str = "Lab result";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["labTestId", "parameterId", "flag"];
    const SEARCH: &'static [&'static str] = &["parameterName"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Desc);
    const DERIVED: &'static [&'static str] = &["flag"];

    fn derive(result: &mut LabResult) -> ApiResult<()> {
        if result.flag.is_none() {
            if let Some(value) = result.value {
                result.flag = Some(result.bounds().classify(value));
            }
        }
        Ok(())
    }

    async fn enrich(server: &CareDeskServer, result: &mut LabResult) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut result.parameter_name,
            LabParameters::COLLECTION,
            result.parameter_id.as_deref(),
            "name",
        )
        .await
    }
}

// ============================================================================
// LAB PARAMETERS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResultType {
    #[default]
    Numeric,
    Text,
    Boolean,
}

/// Measured quantity of a lab test
///
/// `normalRanges` holds ids in storage and resolved ranges in responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabParameter {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub code: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub result_type: ResultType,
    #[serde(default)]
    pub normal_ranges: Vec<String>,
    pub method: Option<String>,
    pub decimal_places: Option<u8>,
    pub description: Option<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
}

impl RequestValidation for LabParameter {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.name, "name is required");
        Ok(())
    }
}

pub struct LabParameters;

#[async_trait]
impl Resource for LabParameters {
    type Record = LabParameter;

    const COLLECTION: &'static str = "lab-parameters";
    const LABEL: &'static str = "Lab parameter";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["category", "isActive", "resultType"];
    const SEARCH: &'static [&'static str] = &["name", "code"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("displayOrder", SortOrder::Asc);

    /// On update, ranges created for this parameter that the new list no
    /// longer names are deleted with the write.
    async fn expand(
        server: &CareDeskServer,
        id: &str,
        payload: &mut Document,
        mode: WriteMode,
    ) -> ApiResult<UnitOfWork> {
        let replaces = mode == WriteMode::Update && payload.contains_key(NORMAL_RANGES_FIELD);
        let mut work =
            expand_relation::<LabNormalRanges>(server, payload, NORMAL_RANGES_FIELD, Some(("parameterId", id))).await?;
        if !replaces {
            return Ok(work);
        }

        let Some(stored) = server.store.get(Self::COLLECTION, id).await? else {
            return Ok(work);
        };
        let kept = reference_ids(payload, NORMAL_RANGES_FIELD);
        let superseded: Vec<String> = reference_ids(&stored, NORMAL_RANGES_FIELD)
            .into_iter()
            .filter(|range_id| !kept.contains(range_id))
            .collect();
        for range in server.store.get_many(LabNormalRanges::COLLECTION, &superseded).await? {
            if text_field(&range, "parameterId").as_deref() == Some(id) {
                work = work.delete(LabNormalRanges::COLLECTION, document_id(&range)?);
            }
        }
        Ok(work)
    }

    async fn resolve(server: &CareDeskServer, mut document: Document) -> ApiResult<Document> {
        let ranges = load_relation::<LabNormalRanges>(server, &document, NORMAL_RANGES_FIELD).await?;
        document.insert(
            NORMAL_RANGES_FIELD.to_string(),
            Value::Array(ranges.into_iter().map(Value::Object).collect()),
        );
        Ok(document)
    }
}

// ============================================================================
// LAB NORMAL RANGES
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RangeGender {
    Male,
    Female,
    #[default]
    All,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabNormalRange {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub parameter_id: Option<String>,
    #[serde(default)]
    pub gender: RangeGender,
    pub age_min: Option<f64>,
    pub age_max: Option<f64>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub critical_min: Option<f64>,
    pub critical_max: Option<f64>,
    /// Expected value for text results ("negative")
    pub text_value: Option<String>,
    pub unit: Option<String>,
    pub description: Option<String>,
}

impl RequestValidation for LabNormalRange {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        let bounds = ReferenceBounds {
            min_value: self.min_value,
            max_value: self.max_value,
            critical_min: self.critical_min,
            critical_max: self.critical_max,
        };
        bounds.check(&mut errors);
        if let (Some(min), Some(max)) = (self.age_min, self.age_max) {
            errors.check("ageMax", max >= min, "ageMax must not be below ageMin");
        }
        for (field, value) in [("ageMin", self.age_min), ("ageMax", self.age_max)] {
            if let Some(value) = value {
                errors.non_negative(field, value);
            }
        }
        errors.into_result()
    }
}

pub struct LabNormalRanges;

#[async_trait]
impl Resource for LabNormalRanges {
    type Record = LabNormalRange;

    const COLLECTION: &'static str = "lab-normal-ranges";
    const LABEL: &'static str = "Lab normal range";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["parameterId", "gender"];
    const SEARCH: &'static [&'static str] = &["description"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("createdAt", SortOrder::Asc);
}

// ============================================================================
// LAB TEST TEMPLATES
// ============================================================================

/// Orderable test definition
///
/// `parameters` holds ids in storage and resolved parameters (with their
/// normal ranges) in responses.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabTestTemplate {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub code: Option<String>,
    pub category: Option<String>,
    pub sample_type: Option<String>,
    pub price: Option<f64>,
    /// Hours until results are expected
    pub turnaround_time: Option<f64>,
    pub preparation: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<String>,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub display_order: i64,
}

impl RequestValidation for LabTestTemplate {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("name", &self.name);
        if let Some(price) = self.price {
            errors.non_negative("price", price);
        }
        if let Some(hours) = self.turnaround_time {
            errors.non_negative("turnaroundTime", hours);
        }
        errors.into_result()
    }
}

pub struct LabTestTemplates;

#[async_trait]
impl Resource for LabTestTemplates {
    type Record = LabTestTemplate;

    const COLLECTION: &'static str = "lab-test-templates";
    const LABEL: &'static str = "Lab test template";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["category", "sampleType", "isActive"];
    const SEARCH: &'static [&'static str] = &["name", "code"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("displayOrder", SortOrder::Asc);

    /// Parameters dropped from a template stay in the catalog, since other
    /// templates may name them.
    async fn expand(
        server: &CareDeskServer,
        _id: &str,
        payload: &mut Document,
        _mode: WriteMode,
    ) -> ApiResult<UnitOfWork> {
        expand_relation::<LabParameters>(server, payload, PARAMETERS_FIELD, None).await
    }

    async fn resolve(server: &CareDeskServer, mut document: Document) -> ApiResult<Document> {
        let parameters = load_relation::<LabParameters>(server, &document, PARAMETERS_FIELD).await?;
        let mut resolved = Vec::with_capacity(parameters.len());
        for parameter in parameters {
            resolved.push(Value::Object(LabParameters::resolve(server, parameter).await?));
        }
        document.insert(PARAMETERS_FIELD.to_string(), Value::Array(resolved));
        Ok(document)
    }
}

// ============================================================================
// LAB WORKFLOWS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowStepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

/// One step in the processing of a lab test. Steps are records only; the
/// server does not advance them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabWorkflow {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub lab_test_id: String,
    pub step_name: String,
    #[serde(default)]
    pub sequence: i64,
    #[serde(default)]
    pub status: WorkflowStepStatus,
    pub assigned_to: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for LabWorkflow {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.lab_test_id, "labTestId is required");
        validate_required!(self.step_name, "stepName is required");
        validate_field!(self.sequence, self.sequence >= 0, "sequence must not be negative");
        Ok(())
    }
}

pub struct LabWorkflows;

#[async_trait]
impl Resource for LabWorkflows {
    type Record = LabWorkflow;

    const COLLECTION: &'static str = "lab-workflows";
    const LABEL: &'static str = "Lab workflow step";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["labTestId", "status", "assignedTo"];
    const SEARCH: &'static [&'static str] = &["stepName", "labTestId"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("sequence", SortOrder::Asc);
}

// ============================================================================
// LAB EQUIPMENT
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum EquipmentStatus {
    #[default]
    Operational,
    Maintenance,
    Calibration,
    OutOfService,
    Retired,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabEquipment {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: String,
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    #[serde(default)]
    pub status: EquipmentStatus,
    pub purchase_date: Option<String>,
    pub last_calibration: Option<String>,
    pub next_calibration: Option<String>,
    pub last_maintenance: Option<String>,
    pub next_maintenance: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for LabEquipment {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.required("name", &self.name);
        for (field, value) in [
            ("purchaseDate", &self.purchase_date),
            ("lastCalibration", &self.last_calibration),
            ("nextCalibration", &self.next_calibration),
            ("lastMaintenance", &self.last_maintenance),
            ("nextMaintenance", &self.next_maintenance),
        ] {
            errors.check_optional(field, value.as_deref(), is_valid_date, "dates must use YYYY-MM-DD format");
        }
        errors.into_result()
    }
}

pub struct LabEquipmentRegistry;

#[async_trait]
impl Resource for LabEquipmentRegistry {
    type Record = LabEquipment;

    const COLLECTION: &'static str = "lab-equipment";
    const LABEL: &'static str = "Lab equipment";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["status", "category", "location"];
    const SEARCH: &'static [&'static str] = &["name", "serialNumber", "model", "manufacturer"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("name", SortOrder::Asc);
    const SORTABLE: &'static [&'static str] = &["nextCalibration", "nextMaintenance"];
    const UNIQUE: &'static [&'static str] = &["serialNumber"];
}

// ============================================================================
// LAB QUALITY CONTROLS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ControlLevel {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum QcResult {
    Pass,
    Warning,
    Fail,
}

/// Quality-control run of a control sample on an instrument
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabQualityControl {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub equipment_id: Option<String>,
    pub equipment_name: Option<String>,
    pub parameter_id: Option<String>,
    pub parameter_name: Option<String>,
    pub lot_number: Option<String>,
    #[serde(default)]
    pub control_level: ControlLevel,
    pub expected_value: f64,
    pub measured_value: f64,
    /// Derived: `measuredValue - expectedValue`
    pub deviation: Option<f64>,
    /// Accepted absolute deviation
    pub tolerance: Option<f64>,
    /// Derived from `deviation` and `tolerance` when omitted
    pub result: Option<QcResult>,
    pub performed_by: Option<String>,
    /// `YYYY-MM-DD`
    pub performed_date: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for LabQualityControl {
    fn validate(&self) -> Result<(), ApiError> {
        let mut errors = FieldErrors::new();
        errors.check(
            "expectedValue",
            self.expected_value.is_finite(),
            "expectedValue must be a number",
        );
        errors.check(
            "measuredValue",
            self.measured_value.is_finite(),
            "measuredValue must be a number",
        );
        if let Some(tolerance) = self.tolerance {
            errors.non_negative("tolerance", tolerance);
        }
        errors.check_optional(
            "performedDate",
            self.performed_date.as_deref(),
            is_valid_date,
            "performedDate must be a date in YYYY-MM-DD format",
        );
        errors.into_result()
    }
}

impl LabQualityControl {
    /// Within tolerance passes, within twice the tolerance warns.
    fn evaluate(&mut self) {
        let deviation = self.measured_value - self.expected_value;
        self.deviation = Some((deviation * 10_000.0).round() / 10_000.0);
        if let (None, Some(tolerance)) = (self.result, self.tolerance) {
            self.result = Some(if deviation.abs() <= tolerance {
                QcResult::Pass
            } else if deviation.abs() <= tolerance * 2.0 {
                QcResult::Warning
            } else {
                QcResult::Fail
            });
        }
    }
}

pub struct LabQualityControls;

#[async_trait]
impl Resource for LabQualityControls {
    type Record = LabQualityControl;

    const COLLECTION: &'static str = "lab-quality-controls";
    const LABEL: &'static str = "Lab quality control";
    const PAGES: &'static [Page] = &[Page::LabTests];
    const FILTERS: &'static [&'static str] = &["equipmentId", "parameterId", "result"];
    const SEARCH: &'static [&'static str] = &["equipmentName", "parameterName", "lotNumber"];
    const DEFAULT_SORT: (&'static str, SortOrder) = ("performedDate", SortOrder::Desc);

    const DERIVED: &'static [&'static str] = &["deviation", "result"];

    fn derive(qc: &mut LabQualityControl) -> ApiResult<()> {
        qc.evaluate();
        Ok(())
    }

    async fn enrich(server: &CareDeskServer, qc: &mut LabQualityControl) -> ApiResult<()> {
        fill_display_name(
            server,
            &mut qc.equipment_name,
            LabEquipmentRegistry::COLLECTION,
            qc.equipment_id.as_deref(),
            "name",
        )
        .await?;
        fill_display_name(
            server,
            &mut qc.parameter_name,
            LabParameters::COLLECTION,
            qc.parameter_id.as_deref(),
            "name",
        )
        .await
    }
}

// ============================================================================
// RELATIONS
// ============================================================================

/// Replace the relation `field` of a payload with a list of ids.
///
/// Accepts an array or a JSON string holding an array. Id strings and
/// objects carrying the id of an existing record are references; other
/// objects are new records of `C`, staged in the returned unit of work.
/// `parent` stamps a back-reference field on created records.
pub async fn expand_relation<C: Resource>(
    server: &CareDeskServer,
    payload: &mut Document,
    field: &str,
    parent: Option<(&str, &str)>,
) -> ApiResult<UnitOfWork> {
    let Some(raw) = payload.remove(field) else {
        return Ok(UnitOfWork::new());
    };
    let items = relation_items(field, raw)?;

    let mut work = UnitOfWork::new();
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(id) => {
                ensure_exists::<C>(server, field, &id).await?;
                ids.push(id);
            }
            Value::Object(mut child) => {
                if let Some(id) = existing_reference::<C>(server, &child).await? {
                    ids.push(id);
                    continue;
                }
                if let Some((parent_field, parent_id)) = parent {
                    child.insert(parent_field.to_string(), Value::String(parent_id.to_string()));
                }
                let (created, staged) = stage_new::<C>(server, Value::Object(child)).await?;
                ids.push(document_id(&created)?.to_string());
                work = work.extend(staged);
            }
            _ => {
                return Err(ApiError::validation(format!(
                    "{field} entries must be objects or id strings"
                )))
            }
        }
    }

    payload.insert(
        field.to_string(),
        Value::Array(ids.into_iter().map(Value::String).collect()),
    );
    Ok(work)
}

fn relation_items(field: &str, raw: Value) -> ApiResult<Vec<Value>> {
    match raw {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(ApiError::validation(format!("Invalid JSON string in {field}"))),
        },
        _ => Err(ApiError::validation(format!("{field} must be an array"))),
    }
}

async fn ensure_exists<C: Resource>(server: &CareDeskServer, field: &str, id: &str) -> ApiResult<()> {
    match server.store.get(C::COLLECTION, id).await? {
        Some(_) => Ok(()),
        None => Err(ApiError::validation(format!(
            "{field} references unknown {} '{id}'",
            C::LABEL.to_lowercase()
        ))),
    }
}

async fn existing_reference<C: Resource>(server: &CareDeskServer, child: &Document) -> ApiResult<Option<String>> {
    let Some(id) = text_field(child, "id").filter(|id| !id.is_empty()) else {
        return Ok(None);
    };
    Ok(server.store.get(C::COLLECTION, &id).await?.map(|_| id))
}

/// Ids stored in a relation field; non-string entries are ignored.
pub fn reference_ids(document: &Document, field: &str) -> Vec<String> {
    document
        .get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Load the records a relation names, skipping dangling ids.
async fn load_relation<C: Resource>(
    server: &CareDeskServer,
    document: &Document,
    field: &str,
) -> ApiResult<Vec<Document>> {
    let ids = reference_ids(document, field);
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(server.store.get_many(C::COLLECTION, &ids).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_against_bounds() {
        let bounds = ReferenceBounds {
            min_value: Some(4.0),
            max_value: Some(10.0),
            critical_min: Some(2.0),
            critical_max: Some(20.0),
        };
        assert_eq!(bounds.classify(5.0), ResultFlag::Normal);
        assert_eq!(bounds.classify(3.0), ResultFlag::Low);
        assert_eq!(bounds.classify(12.0), ResultFlag::High);
        assert_eq!(bounds.classify(1.0), ResultFlag::CriticalLow);
        assert_eq!(bounds.classify(25.0), ResultFlag::CriticalHigh);
        assert_eq!(ReferenceBounds::default().classify(100.0), ResultFlag::Normal);
    }

    #[test]
    fn test_relation_items_accepts_json_string() {
        let items = relation_items(NORMAL_RANGES_FIELD, json!("[{\"minValue\": 1}, \"abc\"]")).expect("parses");
        assert_eq!(items.len(), 2);

        let err = relation_items(NORMAL_RANGES_FIELD, json!("[{oops")).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: Invalid JSON string in normalRanges");

        assert!(relation_items(NORMAL_RANGES_FIELD, json!("{\"a\": 1}")).is_err());
        assert!(relation_items(NORMAL_RANGES_FIELD, json!(42)).is_err());
        assert!(relation_items(NORMAL_RANGES_FIELD, Value::Null).expect("null").is_empty());
    }

    #[test]
    fn test_quality_control_evaluation() {
        let mut qc: LabQualityControl = serde_json::from_value(json!({
            "expectedValue": 100.0,
            "measuredValue": 103.0,
            "tolerance": 2.0
        }))
        .expect("deserializes");
        qc.evaluate();
        assert_eq!(qc.deviation, Some(3.0));
        assert_eq!(qc.result, Some(QcResult::Warning));
    }

    #[test]
    fn test_embedded_results_flagged_from_snapshot() {
        let mut test: LabTest = serde_json::from_value(json!({
            "testName": "CBC",
            "patientId": "p1",
            "normalRanges": [{"parameterId": "hb", "minValue": 12.0, "maxValue": 16.0}],
            "results": [
                {"parameterId": "hb", "parameterName": "Hemoglobin", "value": 10.5},
                {"parameterId": "wbc", "parameterName": "WBC", "value": 7.0}
            ]
        }))
        .expect("deserializes");
        test.flag_results();
        assert_eq!(test.results[0].flag, Some(ResultFlag::Low));
        assert_eq!(test.results[1].flag, None);
    }
}
