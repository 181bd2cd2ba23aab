//! Dashboard and report aggregates, recomputed from stored records on every
//! request

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::Json;
use billing_service::{InvoiceFigures, InvoiceStatus, RevenueSummary};
use chrono::{DateTime, Duration, Utc};
use database_layer::{Document, DocumentQuery};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::Page;
use crate::error::{api_success, ApiError, ApiErrorResponse, ApiResponse, ApiResult};
use crate::handlers::billing::Invoices;
use crate::handlers::common::{number_field, text_field, Resource};
use crate::handlers::healthcare::Appointments;
use crate::handlers::laboratory::LabTests;
use crate::handlers::patients::Patients;
use crate::handlers::pharmacy::{is_low_stock, Medicines, StockAlerts};
use crate::server::CareDeskServer;
use crate::utils::{parse_rfc3339, to_rfc3339};

/// Pages whose roles may read the aggregates.
pub const REPORT_PAGES: &[Page] = &[Page::Dashboard, Page::Reports];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Week,
    #[default]
    Month,
    Quarter,
    Year,
}

impl ReportPeriod {
    pub fn days(self) -> i64 {
        match self {
            ReportPeriod::Week => 7,
            ReportPeriod::Month => 30,
            ReportPeriod::Quarter => 90,
            ReportPeriod::Year => 365,
        }
    }

    fn parse(value: &str) -> ApiResult<Self> {
        match value {
            "week" => Ok(ReportPeriod::Week),
            "month" => Ok(ReportPeriod::Month),
            "quarter" => Ok(ReportPeriod::Quarter),
            "year" => Ok(ReportPeriod::Year),
            other => Err(ApiError::bad_request(format!(
                "Unknown period '{other}'; expected week, month, quarter or year"
            ))),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ReportQuery {
    /// week, month (default), quarter or year
    pub period: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientStats {
    pub total: u64,
    pub new_in_period: u64,
    pub active: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
    /// Completed share of the period's appointments, in percent
    pub completion_rate: f64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabTestStats {
    pub total: u64,
    pub by_status: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyStats {
    pub medicine_count: u64,
    pub low_stock_count: u64,
    pub active_alerts: u64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub period: ReportPeriod,
    pub from: String,
    pub to: String,
    pub patients: PatientStats,
    pub appointments: AppointmentStats,
    #[schema(value_type = Object)]
    pub revenue: RevenueSummary,
    pub lab_tests: LabTestStats,
    pub pharmacy: PharmacyStats,
}

/// Summary statistics over a time window
#[utoipa::path(
    get,
    path = "/reports/summary",
    params(ReportQuery),
    responses(
        (status = 200, description = "Aggregates for the period", body = ReportSummary),
        (status = 400, description = "Unknown period", body = ApiErrorResponse)
    ),
    tag = "reports",
    security(("bearer_auth" = []))
)]
pub async fn report_summary(
    State(server): State<CareDeskServer>,
    Query(query): Query<ReportQuery>,
) -> ApiResult<Json<ApiResponse<ReportSummary>>> {
    let period = match query.period.as_deref().filter(|p| !p.is_empty()) {
        Some(value) => ReportPeriod::parse(value)?,
        None => ReportPeriod::default(),
    };
    let to = Utc::now();
    let from = to - Duration::days(period.days());

    let patients = fetch_all(&server, Patients::COLLECTION).await?;
    let appointments = in_window(fetch_all(&server, Appointments::COLLECTION).await?, from);
    let invoices = in_window(fetch_all(&server, Invoices::COLLECTION).await?, from);
    let lab_tests = in_window(fetch_all(&server, LabTests::COLLECTION).await?, from);
    let medicines = fetch_all(&server, Medicines::COLLECTION).await?;
    let alerts = fetch_all(&server, StockAlerts::COLLECTION).await?;

    let summary = ReportSummary {
        period,
        from: to_rfc3339(from),
        to: to_rfc3339(to),
        patients: PatientStats {
            total: count(&patients),
            new_in_period: count(&in_window(patients.clone(), from)),
            active: count_status(&patients, "active"),
        },
        appointments: appointment_stats(&appointments),
        revenue: revenue(&invoices)?,
        lab_tests: LabTestStats {
            total: count(&lab_tests),
            by_status: by_status(&lab_tests),
        },
        pharmacy: PharmacyStats {
            medicine_count: count(&medicines),
            low_stock_count: count_where(&medicines, is_low_stock),
            active_alerts: count_status(&alerts, "active"),
        },
    };
    Ok(Json(api_success(summary)))
}

async fn fetch_all(server: &CareDeskServer, collection: &str) -> ApiResult<Vec<Document>> {
    Ok(server.store.find(collection, &DocumentQuery::new()).await?.documents)
}

/// Records created at or after `from`; records without a readable
/// `createdAt` are left out.
fn in_window(documents: Vec<Document>, from: DateTime<Utc>) -> Vec<Document> {
    documents
        .into_iter()
        .filter(|doc| {
            text_field(doc, "createdAt")
                .and_then(|ts| parse_rfc3339(&ts))
                .is_some_and(|created| created >= from)
        })
        .collect()
}

fn count<T>(items: &[T]) -> u64 {
    u64::try_from(items.len()).unwrap_or(u64::MAX)
}

fn count_where<F>(documents: &[Document], predicate: F) -> u64
where
    F: Fn(&Document) -> bool,
{
    documents.iter().fold(0, |n, doc| if predicate(doc) { n + 1 } else { n })
}

fn count_status(documents: &[Document], status: &str) -> u64 {
    count_where(documents, |doc| text_field(doc, "status").as_deref() == Some(status))
}

fn by_status(documents: &[Document]) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();
    for doc in documents {
        let status = text_field(doc, "status").unwrap_or_else(|| "unknown".to_string());
        *counts.entry(status).or_insert(0) += 1;
    }
    counts
}

fn appointment_stats(appointments: &[Document]) -> AppointmentStats {
    let by_status = by_status(appointments);
    let total = count(appointments);
    let completed = by_status.get("completed").copied().unwrap_or(0);
    let completion_rate = if total == 0 {
        0.0
    } else {
        (completed as f64 * 1000.0 / total as f64).round() / 10.0
    };
    AppointmentStats {
        total,
        by_status,
        completion_rate,
    }
}

fn revenue(invoices: &[Document]) -> ApiResult<RevenueSummary> {
    let figures = invoices.iter().map(|doc| InvoiceFigures {
        status: doc
            .get("status")
            .and_then(|v| serde_json::from_value::<InvoiceStatus>(v.clone()).ok())
            .unwrap_or_default(),
        total_amount: number_field(doc, "totalAmount").unwrap_or(0.0),
        paid_amount: number_field(doc, "paidAmount").unwrap_or(0.0),
    });
    Ok(RevenueSummary::from_invoices(figures)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn test_period_parsing() {
        assert_eq!(ReportPeriod::parse("quarter").expect("valid"), ReportPeriod::Quarter);
        assert_eq!(ReportPeriod::Quarter.days(), 90);
        assert!(ReportPeriod::parse("decade").is_err());
    }

    #[test]
    fn test_window_filter() {
        let now = Utc::now();
        let docs = vec![
            doc(json!({"createdAt": to_rfc3339(now - Duration::days(2))})),
            doc(json!({"createdAt": to_rfc3339(now - Duration::days(40))})),
            doc(json!({})),
        ];
        assert_eq!(in_window(docs, now - Duration::days(30)).len(), 1);
    }

    #[test]
    fn test_appointment_completion_rate() {
        let appointments = vec![
            doc(json!({"status": "completed"})),
            doc(json!({"status": "completed"})),
            doc(json!({"status": "scheduled"})),
        ];
        let stats = appointment_stats(&appointments);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_status.get("completed"), Some(&2));
        assert_eq!(stats.completion_rate, 66.7);
        assert_eq!(appointment_stats(&[]).completion_rate, 0.0);
    }
}
