//! Invoice arithmetic and payments over HTTP.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{id_of, number, patient_payload, TestApp};
use database_layer::{
    DatabaseResult, Document, DocumentQuery, DocumentStore, MemoryStore, QueryPage, UnitOfWork,
};
use serde_json::{json, Value};

/// Memory store that commits a queued unit of work right after a chosen
/// document has been read, so the reader holds a stale copy.
#[derive(Default)]
struct InterleavingStore {
    inner: MemoryStore,
    queued: Mutex<Option<(String, String, UnitOfWork)>>,
}

impl InterleavingStore {
    fn after_read(&self, collection: &str, id: &str, work: UnitOfWork) {
        *self.queued.lock().expect("queue lock") = Some((collection.to_string(), id.to_string(), work));
    }
}

#[async_trait]
impl DocumentStore for InterleavingStore {
    fn backend(&self) -> &'static str {
        "interleaving"
    }

    async fn get(&self, collection: &str, id: &str) -> DatabaseResult<Option<Document>> {
        let found = self.inner.get(collection, id).await?;
        let due = {
            let mut queued = self.queued.lock().expect("queue lock");
            match queued.take() {
                Some((c, i, work)) if c == collection && i == id => Some(work),
                other => {
                    *queued = other;
                    None
                }
            }
        };
        if let Some(work) = due {
            self.inner.commit(work).await?;
        }
        Ok(found)
    }

    async fn find(&self, collection: &str, query: &DocumentQuery) -> DatabaseResult<QueryPage> {
        self.inner.find(collection, query).await
    }

    async fn commit(&self, work: UnitOfWork) -> DatabaseResult<Vec<Document>> {
        self.inner.commit(work).await
    }

    async fn ping(&self) -> DatabaseResult<()> {
        self.inner.ping().await
    }
}

async fn invoice_for(app: &TestApp, body: Value) -> Value {
    let patient = app.create("patients", patient_payload("Nguyen Van A", "0901234567")).await;
    let mut body = body;
    body["patientId"] = json!(id_of(&patient));
    app.create("invoices", body).await
}

#[tokio::test]
async fn test_full_payment_settles_invoice() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(
        &app,
        json!({"subtotal": 410000, "discountAmount": 0, "taxAmount": 0}),
    )
    .await;
    assert_eq!(number(&invoice["totalAmount"]), 410000.0);
    assert_eq!(number(&invoice["remainingAmount"]), 410000.0);
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["invoiceNumber"], "INV000001");
    assert_eq!(invoice["patientName"], "Nguyen Van A");

    let (status, receipt) = app
        .post(
            &format!("/invoices/{}/payments", id_of(&invoice)),
            json!({"amount": 410000, "paymentMethod": "cash"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{receipt}");
    let paid = &receipt["data"]["invoice"];
    assert_eq!(paid["status"], "paid");
    assert_eq!(number(&paid["remainingAmount"]), 0.0);
    assert_eq!(number(&paid["paidAmount"]), 410000.0);
    assert_eq!(paid["paymentMethod"], "cash");

    let transaction = &receipt["data"]["transaction"];
    assert_eq!(transaction["invoiceId"], invoice["id"]);
    assert_eq!(transaction["status"], "completed");
    assert_eq!(transaction["transactionCode"], "PAY000001");
    assert_eq!(number(&transaction["amount"]), 410000.0);
}

#[tokio::test]
async fn test_partial_payments_accumulate() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(&app, json!({"subtotal": 300000})).await;
    let uri = format!("/invoices/{}/payments", id_of(&invoice));

    let (status, first) = app
        .post(&uri, json!({"amount": 100000, "paymentMethod": "card"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["data"]["invoice"]["status"], "partial");
    assert_eq!(number(&first["data"]["invoice"]["remainingAmount"]), 200000.0);

    let (status, second) = app
        .post(&uri, json!({"amount": 200000, "paymentMethod": "bank-transfer"}))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second["data"]["invoice"]["status"], "paid");

    let (_, transactions) = app
        .get(&format!("/payment-transactions?invoiceId={}", id_of(&invoice)))
        .await;
    assert_eq!(transactions["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_overpayment_is_rejected_without_side_effects() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(&app, json!({"subtotal": 100000})).await;

    let (status, body) = app
        .post(
            &format!("/invoices/{}/payments", id_of(&invoice)),
            json!({"amount": 150000, "paymentMethod": "cash"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (_, stored) = app.get(&format!("/invoices/{}", id_of(&invoice))).await;
    assert_eq!(stored["data"]["status"], "pending");
    assert_eq!(number(&stored["data"]["paidAmount"]), 0.0);

    let (_, transactions) = app.get("/payment-transactions").await;
    assert_eq!(transactions["data"].as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn test_payment_validation() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(&app, json!({"subtotal": 100000})).await;
    let uri = format!("/invoices/{}/payments", id_of(&invoice));

    let (status, _) = app.post(&uri, json!({"amount": 0, "paymentMethod": "cash"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(&uri, json!({"amount": 1000, "paymentMethod": "cheque"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/invoices/missing/payments",
            json!({"amount": 1000, "paymentMethod": "cash"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_line_items_drive_totals() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(
        &app,
        json!({
            "services": [
                {"name": "Consultation", "quantity": 1, "unitPrice": 150000}
            ],
            "medicines": [
                {"name": "Paracetamol", "quantity": 10, "unitPrice": 2000, "discount": 10}
            ],
            "labTests": [
                {"name": "CBC", "unitPrice": 80000}
            ],
            "discountPercent": 10,
            "taxPercent": 5
        }),
    )
    .await;

    assert_eq!(number(&invoice["medicines"][0]["totalPrice"]), 18000.0);
    assert_eq!(number(&invoice["labTests"][0]["totalPrice"]), 80000.0);
    assert_eq!(number(&invoice["subtotal"]), 248000.0);
    assert_eq!(number(&invoice["discountAmount"]), 24800.0);
    assert_eq!(number(&invoice["taxAmount"]), 11160.0);
    assert_eq!(number(&invoice["totalAmount"]), 234360.0);
}

#[tokio::test]
async fn test_invoice_update_recomputes_balance() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(&app, json!({"subtotal": 200000})).await;
    let id = id_of(&invoice);

    let (status, updated) = app
        .put(&format!("/invoices/{id}"), json!({"discountAmount": 50000}))
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(number(&updated["data"]["totalAmount"]), 150000.0);
    assert_eq!(number(&updated["data"]["remainingAmount"]), 150000.0);
    assert_eq!(updated["data"]["invoiceNumber"], invoice["invoiceNumber"]);
}

#[tokio::test]
async fn test_negative_amounts_are_rejected() {
    let app = TestApp::new(false).await;
    let patient = app.create("patients", patient_payload("A", "0901234567")).await;

    let (status, _) = app
        .post(
            "/invoices",
            json!({"patientId": id_of(&patient), "subtotal": -1}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/invoices",
            json!({"patientId": id_of(&patient), "subtotal": 1000, "discountPercent": 120}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_price_list_is_unique_and_ordered() {
    let app = TestApp::new(false).await;
    app.create(
        "service-prices",
        json!({"serviceCode": "XRAY", "serviceName": "X-ray", "category": "imaging", "price": 200000, "displayOrder": 2}),
    )
    .await;
    app.create(
        "service-prices",
        json!({"serviceCode": "CONSULT", "serviceName": "Consultation", "category": "consultation", "price": 150000, "displayOrder": 1}),
    )
    .await;

    let (_, list) = app.get("/service-prices").await;
    assert_eq!(list["data"][0]["serviceCode"], "CONSULT");

    let (status, _) = app
        .post(
            "/service-prices",
            json!({"serviceCode": "XRAY", "serviceName": "Duplicate", "category": "imaging", "price": 1}),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_concurrent_payments_both_count() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(&app, json!({"subtotal": 300000})).await;
    let uri = format!("/invoices/{}/payments", id_of(&invoice));

    let (first, second) = tokio::join!(
        app.post(&uri, json!({"amount": 100000, "paymentMethod": "cash"})),
        app.post(&uri, json!({"amount": 200000, "paymentMethod": "card"})),
    );
    assert_eq!(first.0, StatusCode::CREATED, "{}", first.1);
    assert_eq!(second.0, StatusCode::CREATED, "{}", second.1);

    let (_, stored) = app.get(&format!("/invoices/{}", id_of(&invoice))).await;
    assert_eq!(number(&stored["data"]["paidAmount"]), 300000.0);
    assert_eq!(stored["data"]["status"], "paid");
}

#[tokio::test]
async fn test_update_racing_a_payment_keeps_both() {
    let app = TestApp::new(false).await;
    let invoice = invoice_for(&app, json!({"subtotal": 200000})).await;
    let id = id_of(&invoice);
    let payment_uri = format!("/invoices/{id}/payments");
    let invoice_uri = format!("/invoices/{id}");

    let (updated, paid) = tokio::join!(
        app.put(&invoice_uri, json!({"notes": "called patient"})),
        app.post(&payment_uri, json!({"amount": 50000, "paymentMethod": "cash"})),
    );
    assert_eq!(updated.0, StatusCode::OK, "{}", updated.1);
    assert_eq!(paid.0, StatusCode::CREATED, "{}", paid.1);

    let (_, stored) = app.get(&invoice_uri).await;
    assert_eq!(stored["data"]["notes"], "called patient");
    assert_eq!(number(&stored["data"]["paidAmount"]), 50000.0);
    assert_eq!(number(&stored["data"]["remainingAmount"]), 150000.0);
    assert_eq!(stored["data"]["status"], "partial");
}

#[tokio::test]
async fn test_update_keeps_payment_committed_after_its_read() {
    let store = Arc::new(InterleavingStore::default());
    let app = TestApp::with_store(store.clone()).await;
    let invoice = invoice_for(&app, json!({"subtotal": 410000})).await;
    let id = id_of(&invoice);

    store.after_read(
        "invoices",
        &id,
        UnitOfWork::new().modify("invoices", &id, |mut invoice: Document| {
            invoice.insert("paidAmount".to_string(), json!(410000.0));
            invoice.insert("remainingAmount".to_string(), json!(0.0));
            invoice.insert("status".to_string(), json!("paid"));
            Ok(invoice)
        }),
    );

    let (status, updated) = app.put(&format!("/invoices/{id}"), json!({"notes": "x"})).await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(number(&updated["data"]["paidAmount"]), 410000.0);
    assert_eq!(updated["data"]["status"], "paid");
    assert_eq!(updated["data"]["notes"], "x");

    let (_, stored) = app.get(&format!("/invoices/{id}")).await;
    assert_eq!(number(&stored["data"]["paidAmount"]), 410000.0);
    assert_eq!(number(&stored["data"]["remainingAmount"]), 0.0);
    assert_eq!(stored["data"]["status"], "paid");
}
