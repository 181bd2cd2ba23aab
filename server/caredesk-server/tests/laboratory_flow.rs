//! Lab catalog cascades and ordering from templates.

mod common;

use axum::http::StatusCode;
use common::{id_of, number, patient_payload, TestApp};
use serde_json::{json, Value};

fn count(list: &Value) -> usize {
    list["data"].as_array().map(Vec::len).unwrap_or_default()
}

#[tokio::test]
async fn test_parameter_accepts_ranges_as_json_string() {
    let app = TestApp::new(false).await;

    let ranges = json!([
        {"gender": "male", "minValue": 13.0, "maxValue": 17.0, "unit": "g/dL"},
        {"gender": "female", "minValue": 12.0, "maxValue": 15.0, "unit": "g/dL"}
    ])
    .to_string();
    let parameter = app
        .create(
            "lab-parameters",
            json!({"name": "Hemoglobin", "code": "HGB", "unit": "g/dL", "normalRanges": ranges}),
        )
        .await;

    let resolved = parameter["normalRanges"].as_array().cloned().unwrap_or_default();
    assert_eq!(resolved.len(), 2);
    assert_eq!(resolved[0]["parameterId"], parameter["id"]);
    assert_eq!(resolved[1]["gender"], "female");

    let (_, stored_ranges) = app
        .get(&format!("/lab-normal-ranges?parameterId={}", id_of(&parameter)))
        .await;
    assert_eq!(count(&stored_ranges), 2);

    let (_, fetched) = app.get(&format!("/lab-parameters/{}", id_of(&parameter))).await;
    assert_eq!(fetched["data"]["normalRanges"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_malformed_ranges_string_is_rejected() {
    let app = TestApp::new(false).await;

    let (status, body) = app
        .post(
            "/lab-parameters",
            json!({"name": "Glucose", "normalRanges": "[{\"minValue\": 3.9,"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid JSON string in normalRanges");

    let (_, parameters) = app.get("/lab-parameters").await;
    assert_eq!(count(&parameters), 0);
}

#[tokio::test]
async fn test_invalid_nested_range_leaves_nothing_behind() {
    let app = TestApp::new(false).await;

    let (status, _) = app
        .post(
            "/lab-parameters",
            json!({
                "name": "Glucose",
                "normalRanges": [
                    {"minValue": 3.9, "maxValue": 6.1},
                    {"minValue": 10.0, "maxValue": 2.0}
                ]
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, parameters) = app.get("/lab-parameters").await;
    assert_eq!(count(&parameters), 0);
    let (_, ranges) = app.get("/lab-normal-ranges").await;
    assert_eq!(count(&ranges), 0);
}

#[tokio::test]
async fn test_ranges_may_reference_existing_records() {
    let app = TestApp::new(false).await;
    let range = app
        .create("lab-normal-ranges", json!({"minValue": 70, "maxValue": 110, "unit": "mg/dL"}))
        .await;

    let parameter = app
        .create(
            "lab-parameters",
            json!({"name": "Glucose", "normalRanges": [id_of(&range)]}),
        )
        .await;
    assert_eq!(parameter["normalRanges"][0]["id"], range["id"]);

    let (status, body) = app
        .post(
            "/lab-parameters",
            json!({"name": "Urea", "normalRanges": ["no-such-range"]}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, ranges) = app.get("/lab-normal-ranges").await;
    assert_eq!(count(&ranges), 1);
}

#[tokio::test]
async fn test_template_cascade_and_lab_order_snapshot() {
    let app = TestApp::new(false).await;

    let template = app
        .create(
            "lab-test-templates",
            json!({
                "name": "Complete Blood Count",
                "code": "CBC",
                "category": "hematology",
                "sampleType": "blood",
                "price": 120000,
                "parameters": [
                    {
                        "name": "Hemoglobin",
                        "unit": "g/dL",
                        "normalRanges": [{"minValue": 12.0, "maxValue": 17.0, "criticalMin": 7.0}]
                    },
                    {
                        "name": "Platelets",
                        "unit": "10^9/L",
                        "normalRanges": [{"minValue": 150, "maxValue": 400}]
                    }
                ]
            }),
        )
        .await;
    let parameters = template["parameters"].as_array().cloned().unwrap_or_default();
    assert_eq!(parameters.len(), 2);
    assert_eq!(parameters[0]["normalRanges"].as_array().map(Vec::len), Some(1));

    let (_, stored_parameters) = app.get("/lab-parameters").await;
    assert_eq!(count(&stored_parameters), 2);

    let patient = app.create("patients", patient_payload("A", "0901234567")).await;
    let hemoglobin_id = parameters[0]["id"].clone();
    let order = app
        .create(
            "lab-tests",
            json!({
                "templateId": id_of(&template),
                "patientId": id_of(&patient),
                "results": [
                    {"parameterId": hemoglobin_id, "parameterName": "Hemoglobin", "value": 6.5}
                ]
            }),
        )
        .await;
    assert_eq!(order["testName"], "Complete Blood Count");
    assert_eq!(order["sampleType"], "blood");
    assert_eq!(number(&order["price"]), 120000.0);
    assert_eq!(order["testCode"], "LT000001");
    assert_eq!(order["normalRanges"].as_array().map(Vec::len), Some(2));
    assert_eq!(order["results"][0]["flag"], "critical-low");
    assert_eq!(order["patientName"], "A");
}

#[tokio::test]
async fn test_lab_order_with_unknown_template_is_rejected() {
    let app = TestApp::new(false).await;
    let patient = app.create("patients", patient_payload("A", "0901234567")).await;

    let (status, _) = app
        .post(
            "/lab-tests",
            json!({"templateId": "missing", "patientId": id_of(&patient)}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_quality_control_is_evaluated() {
    let app = TestApp::new(false).await;
    let equipment = app
        .create(
            "lab-equipment",
            json!({"name": "Analyzer", "serialNumber": "SN-001"}),
        )
        .await;

    let control = app
        .create(
            "lab-quality-controls",
            json!({
                "equipmentId": id_of(&equipment),
                "lotNumber": "QC-2024-05",
                "controlLevel": "normal",
                "expectedValue": 100.0,
                "measuredValue": 104.0,
                "tolerance": 5.0,
                "performedDate": "2024-05-01"
            }),
        )
        .await;
    assert_eq!(number(&control["deviation"]), 4.0);
    assert_eq!(control["result"], "pass");
    assert_eq!(control["equipmentName"], "Analyzer");

    let (status, _) = app
        .post(
            "/lab-equipment",
            json!({"name": "Second analyzer", "serialNumber": "SN-001"}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_result_flag_follows_updated_value() {
    let app = TestApp::new(false).await;
    let result = app
        .create(
            "lab-results",
            json!({"labTestId": "lt-1", "parameterName": "Glucose", "value": 2.0, "minValue": 3.9, "maxValue": 6.1}),
        )
        .await;
    assert_eq!(result["flag"], "low");
    let uri = format!("/lab-results/{}", id_of(&result));

    let (status, updated) = app.put(&uri, json!({"value": 5.0})).await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["flag"], "normal");

    let (_, widened) = app.put(&uri, json!({"maxValue": 4.0})).await;
    assert_eq!(widened["data"]["flag"], "high");

    let (_, flagged) = app.put(&uri, json!({"flag": "abnormal"})).await;
    assert_eq!(flagged["data"]["flag"], "abnormal");
}

#[tokio::test]
async fn test_quality_control_is_reevaluated_on_update() {
    let app = TestApp::new(false).await;
    let control = app
        .create(
            "lab-quality-controls",
            json!({"expectedValue": 100.0, "measuredValue": 104.0, "tolerance": 5.0}),
        )
        .await;
    assert_eq!(control["result"], "pass");

    let (status, updated) = app
        .put(
            &format!("/lab-quality-controls/{}", id_of(&control)),
            json!({"measuredValue": 112.0}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(number(&updated["data"]["deviation"]), 12.0);
    assert_eq!(updated["data"]["result"], "fail");
}

#[tokio::test]
async fn test_embedded_results_follow_updated_ranges() {
    let app = TestApp::new(false).await;
    let patient = app.create("patients", patient_payload("A", "0901234567")).await;
    let order = app
        .create(
            "lab-tests",
            json!({
                "testName": "Hemoglobin",
                "patientId": id_of(&patient),
                "normalRanges": [{"parameterId": "hb", "minValue": 12.0, "maxValue": 17.0}],
                "results": [{"parameterId": "hb", "parameterName": "Hemoglobin", "value": 10.0}]
            }),
        )
        .await;
    assert_eq!(order["results"][0]["flag"], "low");
    let uri = format!("/lab-tests/{}", id_of(&order));

    let (_, noted) = app.put(&uri, json!({"notes": "repeat sample"})).await;
    assert_eq!(noted["data"]["results"][0]["flag"], "low");

    let (status, updated) = app
        .put(
            &uri,
            json!({"normalRanges": [{"parameterId": "hb", "minValue": 8.0, "maxValue": 17.0}]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["results"][0]["flag"], "normal");
}

#[tokio::test]
async fn test_replacing_ranges_removes_the_old_ones() {
    let app = TestApp::new(false).await;
    let shared = app
        .create("lab-normal-ranges", json!({"minValue": 1, "maxValue": 2}))
        .await;
    let parameter = app
        .create(
            "lab-parameters",
            json!({"name": "Glucose", "normalRanges": [{"minValue": 3.9, "maxValue": 6.1}, id_of(&shared)]}),
        )
        .await;
    let old_id = parameter["normalRanges"][0]["id"].as_str().unwrap_or_default().to_string();

    let (status, updated) = app
        .put(
            &format!("/lab-parameters/{}", id_of(&parameter)),
            json!({"normalRanges": [{"minValue": 4.0, "maxValue": 6.0}]}),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["data"]["normalRanges"].as_array().map(Vec::len), Some(1));

    let (status, _) = app.get(&format!("/lab-normal-ranges/{old_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/lab-normal-ranges/{}", id_of(&shared))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, owned) = app
        .get(&format!("/lab-normal-ranges?parameterId={}", id_of(&parameter)))
        .await;
    assert_eq!(count(&owned), 1);
}
